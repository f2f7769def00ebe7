//! Next-protocol identifiers and ALPN set arithmetic
//!
//! Protocol negotiation happens deep inside the transport layer; the pool
//! only needs stable identifiers for the negotiated protocol and a small
//! set type for the per-job allowed-ALPN policy.

use std::fmt;

use hashbrown::HashMap;
use once_cell::sync::Lazy;

/// A protocol that ALPN (or its absence) can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NextProto {
    /// No protocol was negotiated, or the token was not recognized.
    Unknown,
    /// HTTP/1.1 over TCP (possibly TLS without ALPN).
    Http11,
    /// HTTP/2 over TLS.
    Http2,
    /// HTTP/3 over QUIC.
    Http3,
}

/// Canonical ALPN token table, read-only after startup.
static ALPN_TOKENS: Lazy<HashMap<&'static str, NextProto>> = Lazy::new(|| {
    let mut table = HashMap::new();
    table.insert("http/1.1", NextProto::Http11);
    table.insert("h2", NextProto::Http2);
    table.insert("h3", NextProto::Http3);
    table
});

impl NextProto {
    /// The canonical ALPN token for this protocol.
    pub fn as_alpn(self) -> &'static str {
        match self {
            NextProto::Unknown => "unknown",
            NextProto::Http11 => "http/1.1",
            NextProto::Http2 => "h2",
            NextProto::Http3 => "h3",
        }
    }

    /// Look up an ALPN token. Unrecognized tokens map to `Unknown`.
    pub fn from_alpn(token: &str) -> NextProto {
        ALPN_TOKENS.get(token).copied().unwrap_or(NextProto::Unknown)
    }

    /// Whether a single connection of this protocol can serve several
    /// streams at once.
    pub fn is_multiplexed(self) -> bool {
        matches!(self, NextProto::Http2 | NextProto::Http3)
    }

    fn bit(self) -> u8 {
        match self {
            NextProto::Unknown => 1 << 0,
            NextProto::Http11 => 1 << 1,
            NextProto::Http2 => 1 << 2,
            NextProto::Http3 => 1 << 3,
        }
    }
}

impl fmt::Display for NextProto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_alpn())
    }
}

/// A small set of [`NextProto`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlpnSet(u8);

const ALL_PROTOS: u8 = 0b1111;

impl AlpnSet {
    /// The empty set.
    pub fn empty() -> AlpnSet {
        AlpnSet(0)
    }

    /// Every known protocol, including `Unknown`.
    pub fn all() -> AlpnSet {
        AlpnSet(ALL_PROTOS)
    }

    /// The singleton set containing only `proto`.
    pub fn from(proto: NextProto) -> AlpnSet {
        AlpnSet(proto.bit())
    }

    pub fn contains(self, proto: NextProto) -> bool {
        self.0 & proto.bit() != 0
    }

    pub fn insert(&mut self, proto: NextProto) {
        self.0 |= proto.bit();
    }

    pub fn remove(&mut self, proto: NextProto) {
        self.0 &= !proto.bit();
    }

    /// Remove every member of `other` from this set.
    pub fn remove_all(&mut self, other: AlpnSet) {
        self.0 &= !other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// The QUIC version requested for an individual job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuicVersion {
    /// No specific version requested; the session decides whether QUIC is
    /// attempted at all.
    #[default]
    Unspecified,
    /// RFC 9000.
    V1,
    /// RFC 9369.
    V2,
}
