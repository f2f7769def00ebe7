//! # streampool
//!
//! Connection-establishment orchestration for HTTP clients: turns a
//! request's destination into a ready, protocol-negotiated stream across
//! HTTP/1.1, HTTP/2 and HTTP/3 (QUIC), while sharing a bounded pool of
//! connections per destination.
//!
//! ## Features
//!
//! - **Protocol racing**: TCP+TLS and QUIC attempts race per destination,
//!   first winner serves the waiting jobs
//! - **Connection pooling** with per-destination and pool-wide ceilings
//! - **Priority scheduling** of queued jobs and in-flight attempts
//! - **ALPN policy enforcement** at the single point the negotiated
//!   protocol becomes known
//! - **Unsafe-port rejection** before any attempt starts
//! - **Structured failure fan-out**: transport failures, certificate
//!   errors and client-auth requests each reach the delegate distinctly
//!
//! The transport itself (sockets, TLS, QUIC handshakes, DNS) lives behind
//! [`TransportConnector`] and [`StreamSocket`]; this crate decides *when*
//! connections are attempted and *who* receives them, not how bytes move.
//!
//! All state belongs to one logical sequence: asynchronous work is posted
//! to a [`SequencedTaskRunner`] and callbacks never interleave.

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod alpn;
pub mod config;
pub mod connector;
pub mod error;
pub mod key;
pub mod pool;
pub mod ports;
pub mod proxy;
pub mod session;
pub mod ssl;
pub mod stream;
pub mod task;

pub use alpn::{AlpnSet, NextProto, QuicVersion};
pub use config::{PoolConfig, SessionConfig};
pub use connector::{AttemptCallback, AttemptId, AttemptOutcome, AttemptResult, TransportConnector};
pub use error::{NetError, NetErrorDetails, ResolveErrorInfo};
pub use key::{PrivacyMode, SchemeHostPort, StreamKey, StreamKeyError, UrlScheme};
pub use pool::{Delegate, Group, Job, JobId, Pool};
pub use proxy::{ProxyChain, ProxyInfo, ProxyResolutionService, ProxyScheme, ProxyServer};
pub use session::HttpNetworkSession;
pub use ssl::{CertStatus, Certificate, SslCertRequestInfo, SslInfo};
pub use stream::{
    ConnectionAttempt, ConnectionAttempts, HttpStream, LoadState, RequestPriority, StreamSocket,
};
pub use task::SequencedTaskRunner;
