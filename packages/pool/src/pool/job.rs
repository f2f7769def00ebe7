//! Job: one request for a stream to a destination
//!
//! A job carries per-request protocol policy (the allowed-ALPN set) and a
//! small state machine: admission-gated start, optional dormancy and
//! resumption, then exactly one terminal callback delivered to the
//! delegate. How connections are actually made belongs to the group's
//! attempt manager; the job only supplies policy and receives results.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::alpn::{AlpnSet, NextProto, QuicVersion};
use crate::error::{NetError, NetErrorDetails, ResolveErrorInfo};
use crate::ports;
use crate::proxy::ProxyInfo;
use crate::ssl::{Certificate, SslCertRequestInfo, SslInfo};
use crate::stream::{ConnectionAttempt, ConnectionAttempts, HttpStream, LoadState, RequestPriority};

use super::group::Group;

/// Stable identity of a job within its pool.
pub type JobId = u64;

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// The caller that owns a job and receives its terminal callback.
///
/// All callbacks run on the pool's sequence. Exactly one of the four
/// result callbacks fires per job, unless the job is destroyed first.
pub trait Delegate {
    /// Whether plain HTTP/1.1 is acceptable for this request.
    fn is_http1_allowed(&self) -> bool;

    /// Certificates the caller already chose to tolerate despite
    /// validation errors.
    fn allowed_bad_certs(&self) -> Vec<Certificate>;

    /// The proxy settings resolved for this request.
    fn proxy_info(&self) -> ProxyInfo;

    fn on_stream_ready(&self, job: &Job, stream: HttpStream, negotiated_protocol: NextProto);

    fn on_stream_failed(
        &self,
        job: &Job,
        error: NetError,
        details: NetErrorDetails,
        resolve_error_info: ResolveErrorInfo,
    );

    fn on_certificate_error(&self, job: &Job, error: NetError, ssl_info: SslInfo);

    fn on_needs_client_auth(&self, job: &Job, cert_request_info: Rc<SslCertRequestInfo>);
}

fn calculate_allowed_alpns(expected_protocol: Option<NextProto>, is_http1_allowed: bool) -> AlpnSet {
    // An `Unknown` hint carries no information; treat it as no hint so
    // the set never ends up empty.
    let mut allowed_alpns = match expected_protocol {
        None | Some(NextProto::Unknown) => AlpnSet::all(),
        Some(proto) => AlpnSet::from(proto),
    };
    if !is_http1_allowed {
        let mut http11_protocols = AlpnSet::from(NextProto::Unknown);
        http11_protocols.insert(NextProto::Http11);
        allowed_alpns.remove_all(http11_protocols);
    }
    allowed_alpns
}

pub struct Job {
    id: JobId,
    delegate: Rc<dyn Delegate>,
    // Non-owning: the group (via the pool) outlives its jobs.
    group: Weak<Group>,
    priority: Cell<RequestPriority>,
    quic_version: QuicVersion,
    allowed_alpns: AlpnSet,
    span: tracing::Span,
    create_time: Instant,
    resume_time: Cell<Option<Instant>>,
    connection_attempts: RefCell<ConnectionAttempts>,
}

impl Job {
    pub(crate) fn new(
        delegate: Rc<dyn Delegate>,
        group: &Rc<Group>,
        priority: RequestPriority,
        quic_version: QuicVersion,
        expected_protocol: Option<NextProto>,
    ) -> Rc<Job> {
        // Programming error, not a runtime error: a caller that refuses
        // HTTP/1.1 must not ask for it.
        assert!(
            delegate.is_http1_allowed() || expected_protocol != Some(NextProto::Http11),
            "expected protocol must not be HTTP/1.1 when HTTP/1.1 is disallowed"
        );
        let id = NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed);
        let span = tracing::debug_span!(
            target: "streampool::job",
            "stream_job",
            job = id,
            destination = %group.stream_key().destination(),
        );
        Rc::new(Job {
            id,
            allowed_alpns: calculate_allowed_alpns(expected_protocol, delegate.is_http1_allowed()),
            delegate,
            group: Rc::downgrade(group),
            priority: Cell::new(priority),
            quic_version,
            span,
            create_time: Instant::now(),
            resume_time: Cell::new(None),
            connection_attempts: RefCell::new(Vec::new()),
        })
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn priority(&self) -> RequestPriority {
        self.priority.get()
    }

    pub fn allowed_alpns(&self) -> AlpnSet {
        self.allowed_alpns
    }

    /// Ask the group for admission; if denied the job stays dormant until
    /// a freed slot resumes it.
    pub fn start(self: &Rc<Job>) {
        let group = self.group();
        if !group.can_start_job(self) {
            let _entered = self.span.enter();
            tracing::debug!(target: "streampool::job", "job queued: pool limits reached");
            return;
        }
        self.start_internal();
    }

    /// Run the start sequence unconditionally. The caller is responsible
    /// for admission having been satisfied already.
    pub fn resume(self: &Rc<Job>) {
        self.resume_time.set(Some(Instant::now()));
        self.start_internal();
    }

    /// Time spent dormant between creation and resumption; zero if the
    /// job was never resumed.
    pub fn create_to_resume_time(&self) -> Duration {
        match self.resume_time.get() {
            Some(resume_time) => resume_time.duration_since(self.create_time),
            None => Duration::ZERO,
        }
    }

    pub fn get_load_state(&self) -> LoadState {
        match self.group().attempt_manager_if_exists() {
            Some(manager) => manager.get_load_state(),
            None => LoadState::Idle,
        }
    }

    /// Reprioritize in-flight work. A no-op until an attempt manager
    /// exists; there is nothing to reprioritize before that.
    pub fn set_priority(&self, priority: RequestPriority) {
        self.priority.set(priority);
        if let Some(manager) = self.group().attempt_manager_if_exists() {
            manager.set_job_priority(self.id, priority);
        }
    }

    /// Diagnostic history of attempts made on this job's behalf.
    pub fn connection_attempts(&self) -> ConnectionAttempts {
        self.connection_attempts.borrow().clone()
    }

    pub(crate) fn add_connection_attempts(&self, attempts: &[ConnectionAttempt]) {
        self.connection_attempts
            .borrow_mut()
            .extend_from_slice(attempts);
    }

    fn start_internal(self: &Rc<Job>) {
        let _entered = self.span.enter();
        let group = self.group();
        let attempt_manager = group.attempt_manager();
        debug_assert!(!attempt_manager.is_failing());

        let destination = group.stream_key().destination();
        if !ports::is_port_allowed_for_scheme(destination.port(), destination.scheme()) {
            tracing::debug!(
                target: "streampool::job",
                port = destination.port(),
                "destination port is unsafe"
            );
            // Posted, never inline: callers must not observe a
            // synchronous failure from a method that can also succeed
            // asynchronously.
            let weak = Rc::downgrade(self);
            group.http_network_session().task_runner().post_task(move || {
                if let Some(job) = weak.upgrade() {
                    job.on_stream_failed(
                        NetError::UnsafePort,
                        NetErrorDetails::default(),
                        ResolveErrorInfo::default(),
                    );
                }
            });
            return;
        }

        attempt_manager.start_job(
            self,
            self.priority.get(),
            self.delegate.allowed_bad_certs(),
            self.quic_version,
        );
    }

    pub(crate) fn on_stream_ready(&self, stream: HttpStream, negotiated_protocol: NextProto) {
        let _entered = self.span.enter();
        if !self.allowed_alpns.contains(negotiated_protocol) {
            let h2_or_h3_required = !self.delegate.is_http1_allowed();
            let is_h2_or_h3 = matches!(negotiated_protocol, NextProto::Http2 | NextProto::Http3);
            let error = if h2_or_h3_required && !is_h2_or_h3 {
                NetError::H2OrQuicRequired
            } else {
                NetError::AlpnNegotiationFailed
            };
            tracing::debug!(
                target: "streampool::job",
                negotiated = %negotiated_protocol,
                error = %error,
                "negotiated protocol rejected by policy"
            );
            self.on_stream_failed(error, NetErrorDetails::default(), ResolveErrorInfo::default());
            return;
        }

        let group = self.group();
        group
            .http_network_session()
            .proxy_resolution_service()
            .report_success(&self.delegate.proxy_info());
        tracing::debug!(
            target: "streampool::job",
            negotiated = %negotiated_protocol,
            "stream ready"
        );
        self.delegate.on_stream_ready(self, stream, negotiated_protocol);
    }

    pub(crate) fn on_stream_failed(
        &self,
        error: NetError,
        details: NetErrorDetails,
        resolve_error_info: ResolveErrorInfo,
    ) {
        let _entered = self.span.enter();
        tracing::debug!(target: "streampool::job", error = %error, "stream failed");
        self.delegate
            .on_stream_failed(self, error, details, resolve_error_info);
    }

    pub(crate) fn on_certificate_error(&self, error: NetError, ssl_info: SslInfo) {
        let _entered = self.span.enter();
        tracing::debug!(target: "streampool::job", error = %error, "certificate error");
        self.delegate.on_certificate_error(self, error, ssl_info);
    }

    pub(crate) fn on_needs_client_auth(&self, cert_request_info: Rc<SslCertRequestInfo>) {
        let _entered = self.span.enter();
        tracing::debug!(target: "streampool::job", "client authentication required");
        self.delegate.on_needs_client_auth(self, cert_request_info);
    }

    fn group(&self) -> Rc<Group> {
        self.group.upgrade().expect("group outlives its jobs")
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        // Unconditional, even for jobs that never produced a terminal
        // callback: cancellation must free the admission slot.
        if let Some(group) = self.group.upgrade() {
            group.on_job_complete(self);
        }
    }
}
