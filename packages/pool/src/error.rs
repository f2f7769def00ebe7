//! Error taxonomy for stream establishment
//!
//! Two families: policy rejections synthesized by the pool itself
//! (unsafe port, ALPN policy) and transport-origin failures received from
//! connection attempts and forwarded untouched, together with the
//! structured diagnostics that accompany them.

/// Errors surfaced through `Delegate::on_stream_failed` and
/// `Delegate::on_certificate_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NetError {
    // Synthesized by the pool.
    #[error("connection to an unsafe port was refused")]
    UnsafePort,
    #[error("HTTP/2 or QUIC is required but the server negotiated neither")]
    H2OrQuicRequired,
    #[error("ALPN negotiation produced no acceptable protocol")]
    AlpnNegotiationFailed,

    // Transport-origin, forwarded verbatim.
    #[error("connection refused")]
    ConnectionRefused,
    #[error("connection reset")]
    ConnectionReset,
    #[error("connection attempt timed out")]
    ConnectionTimedOut,
    #[error("hostname could not be resolved")]
    NameNotResolved,
    #[error("SSL protocol error")]
    SslProtocolError,
    #[error("certificate signed by unknown authority")]
    CertAuthorityInvalid,
    #[error("certificate date invalid")]
    CertDateInvalid,
    #[error("certificate common name invalid")]
    CertCommonNameInvalid,
    #[error("server requested a client certificate")]
    SslClientAuthCertNeeded,
    #[error("QUIC protocol error")]
    QuicProtocolError,
    #[error("QUIC handshake failed")]
    QuicHandshakeFailed,
}

impl NetError {
    /// Whether this error is a certificate trust failure, which the
    /// delegate may retry with relaxed validation.
    pub fn is_certificate_error(self) -> bool {
        matches!(
            self,
            NetError::CertAuthorityInvalid
                | NetError::CertDateInvalid
                | NetError::CertCommonNameInvalid
        )
    }
}

/// Additional diagnostics attached to a failure, forwarded verbatim to
/// the delegate. Empty for pool-synthesized failures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetErrorDetails {
    /// QUIC was attempted and deemed broken for this destination.
    pub quic_broken: bool,
    /// Transport-level QUIC error description, if any.
    pub quic_connection_error: Option<String>,
}

/// DNS resolution diagnostics attached to a failure, forwarded verbatim.
/// Empty for pool-synthesized failures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveErrorInfo {
    /// The underlying resolution error, if resolution was the cause.
    pub error: Option<NetError>,
    /// The failure came from a secure (DoH) resolver.
    pub is_secure_network_error: bool,
}
