//! Transport connector boundary
//!
//! The pool decides *when* to attempt a connection and *who* receives the
//! result; the connector owns DNS, TCP, TLS and QUIC. Implementations
//! must deliver every completion by posting it through the session's
//! [`SequencedTaskRunner`](crate::task::SequencedTaskRunner) — never
//! inline from `start_*` — so the pool observes all completions
//! asynchronously, in sequence order.

use std::net::SocketAddr;
use std::rc::Rc;

use crate::alpn::{NextProto, QuicVersion};
use crate::error::{NetError, NetErrorDetails, ResolveErrorInfo};
use crate::key::StreamKey;
use crate::ssl::{Certificate, SslCertRequestInfo, SslInfo};
use crate::stream::{RequestPriority, StreamSocket};

/// Identifies one in-flight attempt; stale completions carry an id the
/// pool no longer tracks and are ignored.
pub type AttemptId = u64;

/// How a single connection attempt ended.
pub enum AttemptOutcome {
    /// The transport is connected and a protocol was negotiated.
    Ready {
        socket: Rc<dyn StreamSocket>,
        negotiated_protocol: NextProto,
    },
    /// The attempt failed; diagnostics are forwarded verbatim.
    Failed {
        error: NetError,
        details: NetErrorDetails,
        resolve_error_info: ResolveErrorInfo,
    },
    /// The server certificate failed validation; the delegate decides
    /// whether to retry with relaxed validation.
    CertificateError { error: NetError, ssl_info: SslInfo },
    /// The server asked for a client certificate.
    NeedsClientAuth {
        cert_request_info: Rc<SslCertRequestInfo>,
    },
}

/// A completed attempt, delivered to the callback passed at start.
pub struct AttemptResult {
    pub id: AttemptId,
    pub endpoint: Option<SocketAddr>,
    pub outcome: AttemptOutcome,
}

pub type AttemptCallback = Box<dyn FnOnce(AttemptResult)>;

/// The transport layer as the pool sees it.
pub trait TransportConnector {
    /// Begin a TCP (+TLS for https) connection attempt to the key's
    /// destination through its proxy chain. `allowed_bad_certs` lists
    /// certificates the caller already chose to tolerate.
    fn start_tcp_attempt(
        &self,
        key: &StreamKey,
        priority: RequestPriority,
        allowed_bad_certs: &[Certificate],
        on_complete: AttemptCallback,
    ) -> AttemptId;

    /// Begin a QUIC connection attempt.
    fn start_quic_attempt(
        &self,
        key: &StreamKey,
        quic_version: QuicVersion,
        on_complete: AttemptCallback,
    ) -> AttemptId;

    /// Reprioritize an in-flight TCP attempt. Unknown ids are ignored.
    fn set_tcp_attempt_priority(&self, id: AttemptId, priority: RequestPriority);

    /// Abandon an in-flight attempt. Its callback may still fire; the
    /// pool discards completions for ids it no longer tracks.
    fn cancel_attempt(&self, id: AttemptId);
}
