//! Certificate and TLS value types
//!
//! The pool never inspects certificate contents; these are opaque values
//! carried between the transport layer and the delegate.

use std::fmt;

/// An opaque server or client certificate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Certificate {
    subject: String,
    der: Vec<u8>,
}

impl Certificate {
    pub fn new(subject: impl Into<String>, der: Vec<u8>) -> Certificate {
        Certificate {
            subject: subject.into(),
            der,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }
}

impl fmt::Display for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cert({})", self.subject)
    }
}

/// Bit set of certificate validation problems.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CertStatus(u32);

impl CertStatus {
    pub const DATE_INVALID: CertStatus = CertStatus(1 << 0);
    pub const AUTHORITY_INVALID: CertStatus = CertStatus(1 << 1);
    pub const COMMON_NAME_INVALID: CertStatus = CertStatus(1 << 2);
    pub const REVOKED: CertStatus = CertStatus(1 << 3);

    pub fn has(self, status: CertStatus) -> bool {
        self.0 & status.0 != 0
    }

    pub fn insert(&mut self, status: CertStatus) {
        self.0 |= status.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// TLS connection details delivered with a certificate error.
#[derive(Debug, Clone, Default)]
pub struct SslInfo {
    /// The server certificate that failed validation, if available.
    pub cert: Option<Certificate>,
    /// Validation problems found.
    pub cert_status: CertStatus,
    /// The error cannot be overridden by the user.
    pub is_fatal_cert_error: bool,
}

/// The server's client-certificate request, delivered through
/// `Delegate::on_needs_client_auth` so a prompt can be surfaced.
#[derive(Debug, Clone)]
pub struct SslCertRequestInfo {
    /// `host:port` of the server that asked for client auth.
    pub host_and_port: String,
    /// DER-encoded names of acceptable certificate authorities.
    pub cert_authorities: Vec<Vec<u8>>,
    /// The request came from a proxy rather than the origin.
    pub is_proxy: bool,
}
