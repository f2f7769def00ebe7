//! Group: per-destination admission and idle-socket management
//!
//! One group exists per stream key. It owns the idle sockets for that
//! key, the lazily created attempt manager, and the admission bookkeeping
//! that decides whether a new job starts immediately or waits for a slot.

use std::cell::{Cell, RefCell};
use std::cmp::Reverse;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::time::Instant;

use hashbrown::HashSet;

use crate::alpn::NextProto;
use crate::key::StreamKey;
use crate::session::HttpNetworkSession;
use crate::stream::{RequestPriority, StreamSocket};

use super::attempt_manager::AttemptManager;
use super::job::{Job, JobId};
use super::Pool;

/// A pooled connection waiting to be reused for its key.
pub(crate) struct IdleSocket {
    pub socket: Rc<dyn StreamSocket>,
    pub negotiated_protocol: NextProto,
    pub idle_since: Instant,
}

struct PendingJob {
    id: JobId,
    job: Weak<Job>,
    priority: RequestPriority,
    seq: u64,
}

pub struct Group {
    key: StreamKey,
    pool: Weak<Pool>,
    session: Rc<HttpNetworkSession>,
    attempt_manager: RefCell<Option<Rc<AttemptManager>>>,
    // Oldest idle socket at the front.
    idle_sockets: RefCell<VecDeque<IdleSocket>>,
    /// Jobs currently holding an admission slot.
    admitted: RefCell<HashSet<JobId>>,
    /// Jobs denied admission, waiting for a freed slot.
    pending: RefCell<Vec<PendingJob>>,
    next_seq: Cell<u64>,
}

impl Group {
    pub(crate) fn new(
        key: StreamKey,
        pool: &Rc<Pool>,
        session: Rc<HttpNetworkSession>,
    ) -> Rc<Group> {
        Rc::new(Group {
            key,
            pool: Rc::downgrade(pool),
            session,
            attempt_manager: RefCell::new(None),
            idle_sockets: RefCell::new(VecDeque::new()),
            admitted: RefCell::new(HashSet::new()),
            pending: RefCell::new(Vec::new()),
            next_seq: Cell::new(0),
        })
    }

    pub fn stream_key(&self) -> &StreamKey {
        &self.key
    }

    pub fn http_network_session(&self) -> &Rc<HttpNetworkSession> {
        &self.session
    }

    /// Admission decision. On success the job holds a slot until it is
    /// destroyed; on refusal the job is queued and later resumed by a
    /// freed slot.
    pub(crate) fn can_start_job(self: &Rc<Group>, job: &Rc<Job>) -> bool {
        let pool = self.pool();
        let per_group = self.session.config().pool.max_streams_per_group;

        // An idle socket is cheaper than a refused job.
        if self.active_count() >= per_group {
            self.evict_one_idle_socket();
        }
        while pool.at_pool_limit() {
            if !pool.close_one_idle_socket() {
                break;
            }
        }

        if self.active_count() < per_group && !pool.at_pool_limit() {
            self.admitted.borrow_mut().insert(job.id());
            pool.on_slot_reserved();
            return true;
        }

        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        self.pending.borrow_mut().push(PendingJob {
            id: job.id(),
            job: Rc::downgrade(job),
            priority: job.priority(),
            seq,
        });
        tracing::debug!(
            target: "streampool::group",
            key = %self.key,
            job = job.id(),
            "job denied admission, queued"
        );
        false
    }

    /// Release bookkeeping for a job, admitted or not. Called from the
    /// job's destructor, so it must hold even when no terminal callback
    /// ever fired.
    pub(crate) fn on_job_complete(&self, job: &Job) {
        let id = job.id();
        self.pending.borrow_mut().retain(|p| p.id != id);
        let held_slot = self.admitted.borrow_mut().remove(&id);
        if let Some(manager) = self.attempt_manager_if_exists() {
            manager.on_job_complete(id);
        }
        if let Some(pool) = self.pool.upgrade() {
            if held_slot {
                pool.on_slot_released();
                pool.process_pending_jobs();
            }
            pool.maybe_remove_group(&self.key);
        }
    }

    /// The attempt manager for this group, created lazily. A manager
    /// left in a failing state is replaced so one failure episode does
    /// not poison later jobs.
    pub(crate) fn attempt_manager(self: &Rc<Group>) -> Rc<AttemptManager> {
        let mut slot = self.attempt_manager.borrow_mut();
        match &*slot {
            Some(manager) if !manager.is_failing() => manager.clone(),
            _ => {
                let manager = AttemptManager::new(self);
                *slot = Some(manager.clone());
                manager
            }
        }
    }

    pub(crate) fn attempt_manager_if_exists(&self) -> Option<Rc<AttemptManager>> {
        self.attempt_manager.borrow().clone()
    }

    /// Keep a connected socket for reuse, dropping it instead when it is
    /// dead or would exceed a ceiling.
    pub(crate) fn add_idle_socket(
        &self,
        socket: Rc<dyn StreamSocket>,
        negotiated_protocol: NextProto,
    ) {
        let Some(pool) = self.pool.upgrade() else {
            return;
        };
        if !socket.is_connected() {
            tracing::debug!(target: "streampool::group", key = %self.key, "dropping dead socket");
            return;
        }
        let per_group = self.session.config().pool.max_streams_per_group;
        if self.active_count() >= per_group || pool.at_pool_limit() {
            tracing::debug!(
                target: "streampool::group",
                key = %self.key,
                "dropping idle socket: pool limits reached"
            );
            return;
        }
        self.idle_sockets.borrow_mut().push_back(IdleSocket {
            socket,
            negotiated_protocol,
            idle_since: Instant::now(),
        });
        pool.on_idle_socket_added();
    }

    /// Pop the oldest still-connected idle socket, discarding dead ones
    /// along the way.
    pub(crate) fn take_reusable_idle_socket(&self) -> Option<IdleSocket> {
        let pool = self.pool.upgrade();
        loop {
            let candidate = self.idle_sockets.borrow_mut().pop_front()?;
            if let Some(pool) = &pool {
                pool.on_idle_socket_removed();
            }
            if candidate.socket.is_connected() {
                return Some(candidate);
            }
            tracing::debug!(
                target: "streampool::group",
                key = %self.key,
                "discarding stale idle socket"
            );
        }
    }

    /// Close the oldest idle socket to make room. Returns whether one
    /// was closed.
    pub(crate) fn evict_one_idle_socket(&self) -> bool {
        if self.idle_sockets.borrow_mut().pop_front().is_some() {
            if let Some(pool) = self.pool.upgrade() {
                pool.on_idle_socket_removed();
            }
            tracing::debug!(target: "streampool::group", key = %self.key, "evicted idle socket");
            return true;
        }
        false
    }

    pub(crate) fn idle_socket_count(&self) -> usize {
        self.idle_sockets.borrow().len()
    }

    /// Admitted jobs plus idle sockets, measured against the per-group
    /// ceiling.
    pub(crate) fn active_count(&self) -> usize {
        self.admitted.borrow().len() + self.idle_sockets.borrow().len()
    }

    pub(crate) fn best_pending_priority(&self) -> Option<RequestPriority> {
        let mut pending = self.pending.borrow_mut();
        pending.retain(|p| p.job.strong_count() > 0);
        pending.iter().map(|p| p.priority).max()
    }

    /// Admit and resume the highest-priority pending job. Resumption is
    /// posted so it never runs inside another job's destructor frame.
    pub(crate) fn resume_one_pending(self: &Rc<Group>) -> bool {
        let pool = self.pool();
        loop {
            let best = {
                let pending = self.pending.borrow();
                pending
                    .iter()
                    .enumerate()
                    .max_by_key(|(_, p)| (p.priority, Reverse(p.seq)))
                    .map(|(index, _)| index)
            };
            let Some(index) = best else {
                return false;
            };
            let entry = self.pending.borrow_mut().remove(index);
            if entry.job.strong_count() == 0 {
                continue;
            }
            self.admitted.borrow_mut().insert(entry.id);
            pool.on_slot_reserved();
            tracing::debug!(
                target: "streampool::group",
                key = %self.key,
                job = entry.id,
                "resuming pending job"
            );
            let weak = entry.job;
            self.session.task_runner().post_task(move || {
                if let Some(job) = weak.upgrade() {
                    job.resume();
                }
            });
            return true;
        }
    }

    /// Whether the pool may drop this group from its registry.
    pub(crate) fn is_unused(&self) -> bool {
        self.admitted.borrow().is_empty()
            && self.pending.borrow().is_empty()
            && self.idle_sockets.borrow().is_empty()
            && self
                .attempt_manager
                .borrow()
                .as_ref()
                .map_or(true, |manager| manager.job_count() == 0)
    }

    fn pool(&self) -> Rc<Pool> {
        self.pool.upgrade().expect("pool outlives its groups")
    }
}
