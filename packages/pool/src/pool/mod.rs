//! The stream pool: destination registry and global ceilings
//!
//! The pool maps stream keys to groups, counts streams (admitted jobs
//! plus idle sockets) against the global ceiling, and arbitrates which
//! pending job gets a freed slot.

mod attempt_manager;
mod group;
mod job;

pub use group::Group;
pub use job::{Delegate, Job, JobId};

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use hashbrown::HashMap;

use crate::alpn::{NextProto, QuicVersion};
use crate::key::StreamKey;
use crate::session::HttpNetworkSession;
use crate::stream::{RequestPriority, StreamSocket};

pub struct Pool {
    session: Rc<HttpNetworkSession>,
    groups: RefCell<HashMap<StreamKey, Rc<Group>>>,
    admitted_count: Cell<usize>,
    idle_count: Cell<usize>,
}

impl Pool {
    pub fn new(session: Rc<HttpNetworkSession>) -> Rc<Pool> {
        Rc::new(Pool {
            session,
            groups: RefCell::new(HashMap::new()),
            admitted_count: Cell::new(0),
            idle_count: Cell::new(0),
        })
    }

    pub fn session(&self) -> &Rc<HttpNetworkSession> {
        &self.session
    }

    /// Create a job for `key` on behalf of `delegate`. The caller owns
    /// the job; dropping it cancels the request and frees its slot.
    pub fn create_job(
        self: &Rc<Pool>,
        delegate: Rc<dyn Delegate>,
        key: StreamKey,
        priority: RequestPriority,
        quic_version: QuicVersion,
        expected_protocol: Option<NextProto>,
    ) -> Rc<Job> {
        let group = self.get_or_create_group(key);
        Job::new(delegate, &group, priority, quic_version, expected_protocol)
    }

    /// Return a no-longer-needed connection to the pool for reuse by
    /// later jobs with the same key. Dead sockets and sockets over a
    /// ceiling are dropped instead.
    pub fn release_socket(
        self: &Rc<Pool>,
        key: &StreamKey,
        socket: Rc<dyn StreamSocket>,
        negotiated_protocol: NextProto,
    ) {
        let group = self.get_or_create_group(key.clone());
        group.add_idle_socket(socket, negotiated_protocol);
        self.maybe_remove_group(key);
    }

    pub fn group_count(&self) -> usize {
        self.groups.borrow().len()
    }

    /// Jobs currently holding admission slots.
    pub fn active_stream_count(&self) -> usize {
        self.admitted_count.get()
    }

    pub fn idle_socket_count(&self) -> usize {
        self.idle_count.get()
    }

    fn get_or_create_group(self: &Rc<Pool>, key: StreamKey) -> Rc<Group> {
        if let Some(group) = self.groups.borrow().get(&key) {
            return group.clone();
        }
        let group = Group::new(key.clone(), self, self.session.clone());
        tracing::debug!(target: "streampool::pool", key = %key, "group created");
        self.groups.borrow_mut().insert(key, group.clone());
        group
    }

    pub(crate) fn total_active(&self) -> usize {
        self.admitted_count.get() + self.idle_count.get()
    }

    pub(crate) fn at_pool_limit(&self) -> bool {
        self.total_active() >= self.session.config().pool.max_streams_per_pool
    }

    pub(crate) fn on_slot_reserved(&self) {
        self.admitted_count.set(self.admitted_count.get() + 1);
    }

    pub(crate) fn on_slot_released(&self) {
        debug_assert!(self.admitted_count.get() > 0);
        self.admitted_count.set(self.admitted_count.get().saturating_sub(1));
    }

    pub(crate) fn on_idle_socket_added(&self) {
        self.idle_count.set(self.idle_count.get() + 1);
    }

    pub(crate) fn on_idle_socket_removed(&self) {
        debug_assert!(self.idle_count.get() > 0);
        self.idle_count.set(self.idle_count.get().saturating_sub(1));
    }

    /// Evict one idle socket from any group to make room. Returns
    /// whether a socket was closed.
    pub(crate) fn close_one_idle_socket(&self) -> bool {
        let group = self
            .groups
            .borrow()
            .values()
            .find(|group| group.idle_socket_count() > 0)
            .cloned();
        match group {
            Some(group) => group.evict_one_idle_socket(),
            None => false,
        }
    }

    /// Hand freed capacity to pending jobs, highest priority first,
    /// until ceilings are hit or nothing is waiting.
    pub(crate) fn process_pending_jobs(self: &Rc<Pool>) {
        let per_group = self.session.config().pool.max_streams_per_group;
        loop {
            if self.at_pool_limit() {
                break;
            }
            let candidate = self
                .groups
                .borrow()
                .values()
                .filter(|group| group.active_count() < per_group)
                .filter_map(|group| {
                    group
                        .best_pending_priority()
                        .map(|priority| (priority, group.clone()))
                })
                .max_by_key(|(priority, _)| *priority)
                .map(|(_, group)| group);
            match candidate {
                Some(group) => {
                    group.resume_one_pending();
                }
                None => break,
            }
        }
    }

    /// Drop the group for `key` if nothing references it anymore.
    pub(crate) fn maybe_remove_group(&self, key: &StreamKey) {
        let unused = self
            .groups
            .borrow()
            .get(key)
            .map_or(false, |group| group.is_unused());
        if unused {
            self.groups.borrow_mut().remove(key);
            tracing::debug!(target: "streampool::pool", key = %key, "unused group removed");
        }
    }
}
