//! Shared test harness: a scriptable transport connector and a recording
//! delegate, driven entirely through the pool's task sequence.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::rc::Rc;

use streampool::{
    AttemptCallback, AttemptId, AttemptOutcome, AttemptResult, Certificate, Delegate,
    HttpNetworkSession, HttpStream, Job, JobId, NetError, NetErrorDetails, NextProto, Pool,
    ProxyInfo, QuicVersion, RequestPriority, ResolveErrorInfo, SequencedTaskRunner, SessionConfig,
    SslCertRequestInfo, SslInfo, StreamKey, StreamSocket, TransportConnector,
};

/// A socket whose connectedness tests can flip.
pub struct FakeSocket {
    connected: Cell<bool>,
    peer: SocketAddr,
}

impl FakeSocket {
    pub fn connected() -> Rc<FakeSocket> {
        Rc::new(FakeSocket {
            connected: Cell::new(true),
            peer: test_endpoint(),
        })
    }

    pub fn close(&self) {
        self.connected.set(false);
    }
}

impl StreamSocket for FakeSocket {
    fn is_connected(&self) -> bool {
        self.connected.get()
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.peer)
    }
}

pub fn test_endpoint() -> SocketAddr {
    "192.0.2.1:443".parse().expect("valid test endpoint")
}

/// Transport connector that completes attempts from a script, posting
/// every completion through the task runner. Unscripted attempts hang.
pub struct FakeConnector {
    runner: RefCell<Option<Rc<SequencedTaskRunner>>>,
    next_id: Cell<AttemptId>,
    pub tcp_started: RefCell<Vec<(AttemptId, RequestPriority)>>,
    pub quic_started: RefCell<Vec<(AttemptId, QuicVersion)>>,
    pub priority_updates: RefCell<Vec<(AttemptId, RequestPriority)>>,
    pub cancelled: RefCell<Vec<AttemptId>>,
    tcp_script: RefCell<VecDeque<AttemptOutcome>>,
    quic_script: RefCell<VecDeque<AttemptOutcome>>,
}

impl FakeConnector {
    pub fn new() -> Rc<FakeConnector> {
        Rc::new(FakeConnector {
            runner: RefCell::new(None),
            next_id: Cell::new(1),
            tcp_started: RefCell::new(Vec::new()),
            quic_started: RefCell::new(Vec::new()),
            priority_updates: RefCell::new(Vec::new()),
            cancelled: RefCell::new(Vec::new()),
            tcp_script: RefCell::new(VecDeque::new()),
            quic_script: RefCell::new(VecDeque::new()),
        })
    }

    pub fn attach_runner(&self, runner: Rc<SequencedTaskRunner>) {
        *self.runner.borrow_mut() = Some(runner);
    }

    pub fn push_tcp_outcome(&self, outcome: AttemptOutcome) {
        self.tcp_script.borrow_mut().push_back(outcome);
    }

    pub fn push_quic_outcome(&self, outcome: AttemptOutcome) {
        self.quic_script.borrow_mut().push_back(outcome);
    }

    fn start_attempt(
        &self,
        script: &RefCell<VecDeque<AttemptOutcome>>,
        on_complete: AttemptCallback,
    ) -> AttemptId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        if let Some(outcome) = script.borrow_mut().pop_front() {
            let runner = self
                .runner
                .borrow()
                .clone()
                .expect("runner attached before attempts start");
            runner.post_task(move || {
                on_complete(AttemptResult {
                    id,
                    endpoint: Some(test_endpoint()),
                    outcome,
                });
            });
        }
        // Unscripted attempts never complete; the callback is dropped.
        id
    }
}

impl TransportConnector for FakeConnector {
    fn start_tcp_attempt(
        &self,
        _key: &StreamKey,
        priority: RequestPriority,
        _allowed_bad_certs: &[Certificate],
        on_complete: AttemptCallback,
    ) -> AttemptId {
        let id = self.start_attempt(&self.tcp_script, on_complete);
        self.tcp_started.borrow_mut().push((id, priority));
        id
    }

    fn start_quic_attempt(
        &self,
        _key: &StreamKey,
        quic_version: QuicVersion,
        on_complete: AttemptCallback,
    ) -> AttemptId {
        let id = self.start_attempt(&self.quic_script, on_complete);
        self.quic_started.borrow_mut().push((id, quic_version));
        id
    }

    fn set_tcp_attempt_priority(&self, id: AttemptId, priority: RequestPriority) {
        self.priority_updates.borrow_mut().push((id, priority));
    }

    fn cancel_attempt(&self, id: AttemptId) {
        self.cancelled.borrow_mut().push(id);
    }
}

/// Delegate that records every callback. `report_counts_at_ready`
/// captures the proxy service's success count at the moment each stream
/// was delivered, to observe ordering.
pub struct RecordingDelegate {
    pub http1_allowed: bool,
    pub proxy: ProxyInfo,
    pub bad_certs: Vec<Certificate>,
    pub session: RefCell<Option<Rc<HttpNetworkSession>>>,
    pub ready: RefCell<Vec<(JobId, NextProto)>>,
    pub report_counts_at_ready: RefCell<Vec<usize>>,
    pub failed: RefCell<Vec<(JobId, NetError)>>,
    pub failure_details: RefCell<Vec<(NetErrorDetails, ResolveErrorInfo)>>,
    pub cert_errors: RefCell<Vec<(JobId, NetError)>>,
    pub client_auth: RefCell<Vec<(JobId, String)>>,
}

impl RecordingDelegate {
    pub fn new() -> Rc<RecordingDelegate> {
        Rc::new(RecordingDelegate {
            http1_allowed: true,
            proxy: ProxyInfo::direct(),
            bad_certs: Vec::new(),
            session: RefCell::new(None),
            ready: RefCell::new(Vec::new()),
            report_counts_at_ready: RefCell::new(Vec::new()),
            failed: RefCell::new(Vec::new()),
            failure_details: RefCell::new(Vec::new()),
            cert_errors: RefCell::new(Vec::new()),
            client_auth: RefCell::new(Vec::new()),
        })
    }

    pub fn http1_disallowed() -> Rc<RecordingDelegate> {
        Rc::new(RecordingDelegate {
            http1_allowed: false,
            proxy: ProxyInfo::direct(),
            bad_certs: Vec::new(),
            session: RefCell::new(None),
            ready: RefCell::new(Vec::new()),
            report_counts_at_ready: RefCell::new(Vec::new()),
            failed: RefCell::new(Vec::new()),
            failure_details: RefCell::new(Vec::new()),
            cert_errors: RefCell::new(Vec::new()),
            client_auth: RefCell::new(Vec::new()),
        })
    }

    pub fn callback_count(&self) -> usize {
        self.ready.borrow().len()
            + self.failed.borrow().len()
            + self.cert_errors.borrow().len()
            + self.client_auth.borrow().len()
    }
}

impl Delegate for RecordingDelegate {
    fn is_http1_allowed(&self) -> bool {
        self.http1_allowed
    }

    fn allowed_bad_certs(&self) -> Vec<Certificate> {
        self.bad_certs.clone()
    }

    fn proxy_info(&self) -> ProxyInfo {
        self.proxy.clone()
    }

    fn on_stream_ready(&self, job: &Job, stream: HttpStream, negotiated_protocol: NextProto) {
        assert_eq!(stream.negotiated_protocol(), negotiated_protocol);
        if let Some(session) = self.session.borrow().as_ref() {
            self.report_counts_at_ready
                .borrow_mut()
                .push(session.proxy_resolution_service().report_count());
        }
        self.ready.borrow_mut().push((job.id(), negotiated_protocol));
    }

    fn on_stream_failed(
        &self,
        job: &Job,
        error: NetError,
        details: NetErrorDetails,
        resolve_error_info: ResolveErrorInfo,
    ) {
        self.failed.borrow_mut().push((job.id(), error));
        self.failure_details
            .borrow_mut()
            .push((details, resolve_error_info));
    }

    fn on_certificate_error(&self, job: &Job, error: NetError, _ssl_info: SslInfo) {
        self.cert_errors.borrow_mut().push((job.id(), error));
    }

    fn on_needs_client_auth(&self, job: &Job, cert_request_info: Rc<SslCertRequestInfo>) {
        self.client_auth
            .borrow_mut()
            .push((job.id(), cert_request_info.host_and_port.clone()));
    }
}

pub struct Harness {
    pub runner: Rc<SequencedTaskRunner>,
    pub connector: Rc<FakeConnector>,
    pub session: Rc<HttpNetworkSession>,
    pub pool: Rc<Pool>,
}

pub fn harness() -> Harness {
    harness_with(SessionConfig::default())
}

pub fn harness_with(config: SessionConfig) -> Harness {
    let runner = SequencedTaskRunner::new();
    let connector = FakeConnector::new();
    connector.attach_runner(runner.clone());
    let session = HttpNetworkSession::new(config, runner.clone(), connector.clone())
        .expect("valid session config");
    let pool = Pool::new(session.clone());
    Harness {
        runner,
        connector,
        session,
        pool,
    }
}

pub fn key(url: &str) -> StreamKey {
    StreamKey::from_url(&url::Url::parse(url).expect("valid url")).expect("supported scheme")
}

pub fn ready(negotiated_protocol: NextProto) -> AttemptOutcome {
    AttemptOutcome::Ready {
        socket: FakeSocket::connected(),
        negotiated_protocol,
    }
}

pub fn failed(error: NetError) -> AttemptOutcome {
    AttemptOutcome::Failed {
        error,
        details: NetErrorDetails::default(),
        resolve_error_info: ResolveErrorInfo::default(),
    }
}
