//! Sockets, streams and scheduling primitives
//!
//! `StreamSocket` is the narrow surface the pool requires of the
//! transport layer: enough to tell whether a pooled connection is still
//! usable. How bytes move on an established stream is not this crate's
//! concern.

use std::fmt;
use std::net::SocketAddr;
use std::rc::Rc;

use crate::alpn::NextProto;
use crate::error::NetError;

/// A connected transport-layer socket (TCP+TLS or QUIC), owned by the
/// transport layer and handed to the pool as an opaque object.
pub trait StreamSocket {
    /// Whether the underlying connection is still established.
    fn is_connected(&self) -> bool;

    /// The remote endpoint, if known.
    fn peer_addr(&self) -> Option<SocketAddr>;
}

/// A ready, protocol-negotiated stream handed to the delegate.
///
/// Multiplexed protocols share one socket between several streams, so the
/// socket is reference counted.
pub struct HttpStream {
    socket: Rc<dyn StreamSocket>,
    negotiated_protocol: NextProto,
}

impl HttpStream {
    pub fn new(socket: Rc<dyn StreamSocket>, negotiated_protocol: NextProto) -> HttpStream {
        HttpStream {
            socket,
            negotiated_protocol,
        }
    }

    pub fn negotiated_protocol(&self) -> NextProto {
        self.negotiated_protocol
    }

    pub fn socket(&self) -> &Rc<dyn StreamSocket> {
        &self.socket
    }
}

impl fmt::Debug for HttpStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpStream")
            .field("negotiated_protocol", &self.negotiated_protocol)
            .field("peer_addr", &self.socket.peer_addr())
            .finish()
    }
}

/// One historical connection attempt, kept for post-mortem diagnostics
/// returned to the delegate. Never used for retry decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionAttempt {
    pub endpoint: Option<SocketAddr>,
    pub result: Result<(), NetError>,
}

pub type ConnectionAttempts = Vec<ConnectionAttempt>;

/// What a job is currently waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Nothing in flight: dormant, queued, or already complete.
    Idle,
    /// Resolving the destination host.
    ResolvingHost,
    /// A transport connection attempt is in flight.
    Connecting,
    /// TLS handshake in progress.
    SslHandshake,
}

/// Relative scheduling priority of a job's connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum RequestPriority {
    Idle,
    Lowest,
    #[default]
    Low,
    Medium,
    Highest,
}
