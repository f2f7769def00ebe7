//! AttemptManager: racing concrete connection attempts
//!
//! One manager per group. It deduplicates concurrent attempts for the
//! destination, races TCP+TLS against QUIC when both are viable, reuses
//! idle sockets ahead of fresh attempts, and delivers exactly one
//! terminal callback to every job it serves.

use std::cell::{Cell, RefCell};
use std::cmp::Reverse;
use std::rc::{Rc, Weak};

use hashbrown::HashMap;

use crate::alpn::{NextProto, QuicVersion};
use crate::connector::{AttemptId, AttemptOutcome, AttemptResult};
use crate::error::NetError;
use crate::key::{StreamKey, UrlScheme};
use crate::session::HttpNetworkSession;
use crate::ssl::Certificate;
use crate::stream::{ConnectionAttempt, HttpStream, LoadState, RequestPriority, StreamSocket};

use super::group::Group;
use super::job::{Job, JobId};

struct JobEntry {
    job: Weak<Job>,
    priority: RequestPriority,
    allowed_bad_certs: Vec<Certificate>,
}

pub struct AttemptManager {
    group: Weak<Group>,
    session: Rc<HttpNetworkSession>,
    key: StreamKey,
    /// Jobs waiting on this manager. An entry is removed when its
    /// terminal callback is delivered or the job is destroyed.
    jobs: RefCell<HashMap<JobId, JobEntry>>,
    tcp_attempt: Cell<Option<AttemptId>>,
    quic_attempt: Cell<Option<AttemptId>>,
    is_failing: Cell<bool>,
    /// Every attempt made by this manager, pushed into each job as it
    /// happens for post-mortem diagnostics.
    history: RefCell<Vec<ConnectionAttempt>>,
}

impl AttemptManager {
    pub(crate) fn new(group: &Rc<Group>) -> Rc<AttemptManager> {
        Rc::new(AttemptManager {
            group: Rc::downgrade(group),
            session: group.http_network_session().clone(),
            key: group.stream_key().clone(),
            jobs: RefCell::new(HashMap::new()),
            tcp_attempt: Cell::new(None),
            quic_attempt: Cell::new(None),
            is_failing: Cell::new(false),
            history: RefCell::new(Vec::new()),
        })
    }

    /// Begin (or join) racing attempts on behalf of `job`.
    pub(crate) fn start_job(
        self: &Rc<AttemptManager>,
        job: &Rc<Job>,
        priority: RequestPriority,
        allowed_bad_certs: Vec<Certificate>,
        quic_version: QuicVersion,
    ) {
        let job_id = job.id();
        job.add_connection_attempts(&self.history.borrow());
        self.jobs.borrow_mut().insert(job_id, JobEntry {
            job: Rc::downgrade(job),
            priority,
            allowed_bad_certs,
        });

        // Reuse beats connecting. Delivery is posted so the caller never
        // observes a completion inside start().
        if let Some(group) = self.group.upgrade() {
            if let Some(idle) = group.take_reusable_idle_socket() {
                tracing::debug!(
                    target: "streampool::attempt",
                    key = %self.key,
                    job = job_id,
                    negotiated = %idle.negotiated_protocol,
                    "reusing idle socket"
                );
                let weak_manager = Rc::downgrade(self);
                let socket = idle.socket;
                let negotiated_protocol = idle.negotiated_protocol;
                self.session.task_runner().post_task(move || {
                    if let Some(manager) = weak_manager.upgrade() {
                        manager.deliver_ready_to_job(job_id, socket, negotiated_protocol);
                    }
                });
                return;
            }
        }

        if self.tcp_attempt.get().is_some() || self.quic_attempt.get().is_some() {
            // Attempts for this destination are already racing; the job
            // joins them and only contributes its priority.
            self.update_tcp_attempt_priority();
            return;
        }

        self.begin_tcp_attempt();
        if self.is_quic_viable(quic_version) {
            self.begin_quic_attempt(quic_version);
        }
    }

    pub(crate) fn set_job_priority(&self, job_id: JobId, priority: RequestPriority) {
        if let Some(entry) = self.jobs.borrow_mut().get_mut(&job_id) {
            entry.priority = priority;
        }
        self.update_tcp_attempt_priority();
    }

    pub(crate) fn get_load_state(&self) -> LoadState {
        if self.tcp_attempt.get().is_some() || self.quic_attempt.get().is_some() {
            LoadState::Connecting
        } else {
            LoadState::Idle
        }
    }

    /// All attempts exhausted without a winner; no further jobs may start
    /// on this manager.
    pub(crate) fn is_failing(&self) -> bool {
        self.is_failing.get()
    }

    pub(crate) fn job_count(&self) -> usize {
        self.jobs.borrow().len()
    }

    /// The job is gone (destroyed or served); stop tracking it, and stop
    /// attempting once nobody is waiting.
    pub(crate) fn on_job_complete(&self, job_id: JobId) {
        self.jobs.borrow_mut().remove(&job_id);
        if self.jobs.borrow().is_empty() {
            self.cancel_inflight_attempts();
        }
    }

    fn is_quic_viable(&self, quic_version: QuicVersion) -> bool {
        self.key.destination().scheme() == UrlScheme::Https
            && (quic_version != QuicVersion::Unspecified || self.session.config().enable_quic)
    }

    fn begin_tcp_attempt(self: &Rc<AttemptManager>) {
        let weak = Rc::downgrade(self);
        let allowed_bad_certs = self.collect_allowed_bad_certs();
        let id = self.session.connector().start_tcp_attempt(
            &self.key,
            self.max_priority(),
            &allowed_bad_certs,
            Box::new(move |result| {
                if let Some(manager) = weak.upgrade() {
                    manager.on_attempt_complete(result);
                }
            }),
        );
        self.tcp_attempt.set(Some(id));
        tracing::debug!(
            target: "streampool::attempt",
            key = %self.key,
            attempt = id,
            "tcp attempt started"
        );
    }

    fn begin_quic_attempt(self: &Rc<AttemptManager>, quic_version: QuicVersion) {
        let weak = Rc::downgrade(self);
        let id = self.session.connector().start_quic_attempt(
            &self.key,
            quic_version,
            Box::new(move |result| {
                if let Some(manager) = weak.upgrade() {
                    manager.on_attempt_complete(result);
                }
            }),
        );
        self.quic_attempt.set(Some(id));
        tracing::debug!(
            target: "streampool::attempt",
            key = %self.key,
            attempt = id,
            "quic attempt started"
        );
    }

    fn on_attempt_complete(self: &Rc<AttemptManager>, result: AttemptResult) {
        let is_tcp = self.tcp_attempt.get() == Some(result.id);
        let is_quic = self.quic_attempt.get() == Some(result.id);
        if !is_tcp && !is_quic {
            tracing::debug!(
                target: "streampool::attempt",
                attempt = result.id,
                "ignoring stale attempt completion"
            );
            return;
        }
        if is_tcp {
            self.tcp_attempt.set(None);
        } else {
            self.quic_attempt.set(None);
        }

        match result.outcome {
            AttemptOutcome::Ready {
                socket,
                negotiated_protocol,
            } => {
                self.record_attempt(result.endpoint, Ok(()));
                self.cancel_inflight_attempts();
                tracing::debug!(
                    target: "streampool::attempt",
                    key = %self.key,
                    negotiated = %negotiated_protocol,
                    "attempt won"
                );
                if negotiated_protocol.is_multiplexed() {
                    // One connection serves every waiting job.
                    for (_, entry) in self.drain_jobs() {
                        if let Some(job) = entry.job.upgrade() {
                            job.on_stream_ready(
                                HttpStream::new(socket.clone(), negotiated_protocol),
                                negotiated_protocol,
                            );
                        }
                    }
                } else {
                    self.deliver_to_best_job(socket, negotiated_protocol);
                    // An HTTP/1.1 socket serves one stream; keep
                    // attempting for whoever is still waiting.
                    if !self.jobs.borrow().is_empty() {
                        self.begin_tcp_attempt();
                    }
                }
            }
            AttemptOutcome::Failed {
                error,
                details,
                resolve_error_info,
            } => {
                self.record_attempt(result.endpoint, Err(error));
                if self.tcp_attempt.get().is_some() || self.quic_attempt.get().is_some() {
                    // The other attempt may still win.
                    tracing::debug!(
                        target: "streampool::attempt",
                        key = %self.key,
                        error = %error,
                        "attempt failed, racing attempt still in flight"
                    );
                    return;
                }
                self.is_failing.set(true);
                tracing::debug!(
                    target: "streampool::attempt",
                    key = %self.key,
                    error = %error,
                    "all attempts exhausted"
                );
                for (_, entry) in self.drain_jobs() {
                    if let Some(job) = entry.job.upgrade() {
                        job.on_stream_failed(error, details.clone(), resolve_error_info.clone());
                    }
                }
            }
            AttemptOutcome::CertificateError { error, ssl_info } => {
                self.record_attempt(result.endpoint, Err(error));
                self.cancel_inflight_attempts();
                self.is_failing.set(true);
                for (_, entry) in self.drain_jobs() {
                    if let Some(job) = entry.job.upgrade() {
                        job.on_certificate_error(error, ssl_info.clone());
                    }
                }
            }
            AttemptOutcome::NeedsClientAuth { cert_request_info } => {
                self.record_attempt(result.endpoint, Err(NetError::SslClientAuthCertNeeded));
                self.cancel_inflight_attempts();
                self.is_failing.set(true);
                for (_, entry) in self.drain_jobs() {
                    if let Some(job) = entry.job.upgrade() {
                        job.on_needs_client_auth(cert_request_info.clone());
                    }
                }
            }
        }
    }

    /// Reuse-path delivery, posted from `start_job`.
    fn deliver_ready_to_job(
        &self,
        job_id: JobId,
        socket: Rc<dyn StreamSocket>,
        negotiated_protocol: NextProto,
    ) {
        let entry = self.jobs.borrow_mut().remove(&job_id);
        if let Some(entry) = entry {
            if let Some(job) = entry.job.upgrade() {
                job.on_stream_ready(
                    HttpStream::new(socket, negotiated_protocol),
                    negotiated_protocol,
                );
            }
        }
    }

    /// Hand a non-multiplexed stream to the highest-priority waiting job
    /// (oldest wins ties).
    fn deliver_to_best_job(&self, socket: Rc<dyn StreamSocket>, negotiated_protocol: NextProto) {
        let best_id = self
            .jobs
            .borrow()
            .iter()
            .max_by_key(|(id, entry)| (entry.priority, Reverse(**id)))
            .map(|(id, _)| *id);
        let Some(best_id) = best_id else {
            // Nobody is waiting anymore; pool the socket instead.
            if let Some(group) = self.group.upgrade() {
                group.add_idle_socket(socket, negotiated_protocol);
            }
            return;
        };
        let entry = self.jobs.borrow_mut().remove(&best_id);
        if let Some(entry) = entry {
            if let Some(job) = entry.job.upgrade() {
                job.on_stream_ready(
                    HttpStream::new(socket, negotiated_protocol),
                    negotiated_protocol,
                );
            }
        }
    }

    fn record_attempt(&self, endpoint: Option<std::net::SocketAddr>, result: Result<(), NetError>) {
        let attempt = ConnectionAttempt { endpoint, result };
        self.history.borrow_mut().push(attempt.clone());
        for entry in self.jobs.borrow().values() {
            if let Some(job) = entry.job.upgrade() {
                job.add_connection_attempts(std::slice::from_ref(&attempt));
            }
        }
    }

    fn update_tcp_attempt_priority(&self) {
        if let Some(id) = self.tcp_attempt.get() {
            self.session
                .connector()
                .set_tcp_attempt_priority(id, self.max_priority());
        }
    }

    fn cancel_inflight_attempts(&self) {
        if let Some(id) = self.tcp_attempt.take() {
            self.session.connector().cancel_attempt(id);
        }
        if let Some(id) = self.quic_attempt.take() {
            self.session.connector().cancel_attempt(id);
        }
    }

    fn collect_allowed_bad_certs(&self) -> Vec<Certificate> {
        let mut certs: Vec<Certificate> = Vec::new();
        for entry in self.jobs.borrow().values() {
            for cert in &entry.allowed_bad_certs {
                if !certs.contains(cert) {
                    certs.push(cert.clone());
                }
            }
        }
        certs
    }

    fn max_priority(&self) -> RequestPriority {
        self.jobs
            .borrow()
            .values()
            .map(|entry| entry.priority)
            .max()
            .unwrap_or_default()
    }

    fn drain_jobs(&self) -> Vec<(JobId, JobEntry)> {
        self.jobs.borrow_mut().drain().collect()
    }
}
