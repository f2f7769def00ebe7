//! Destination identity for connection reuse
//!
//! Two requests may share a group (and its idle sockets) exactly when
//! their stream keys compare equal: same scheme/host/port, same proxy
//! chain, same privacy partition.

use std::fmt;

use url::Url;

use crate::proxy::ProxyChain;

/// Schemes the pool establishes streams for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlScheme {
    Http,
    Https,
}

impl UrlScheme {
    pub fn as_str(self) -> &'static str {
        match self {
            UrlScheme::Http => "http",
            UrlScheme::Https => "https",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            UrlScheme::Http => 80,
            UrlScheme::Https => 443,
        }
    }
}

/// The destination endpoint of a stream key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemeHostPort {
    scheme: UrlScheme,
    host: String,
    port: u16,
}

impl SchemeHostPort {
    pub fn new(scheme: UrlScheme, host: impl Into<String>, port: u16) -> SchemeHostPort {
        SchemeHostPort {
            scheme,
            host: host.into(),
            port,
        }
    }

    pub fn scheme(&self) -> UrlScheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for SchemeHostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }
}

/// Whether credentials (cookies, cached auth) may be used on this
/// connection. Part of the key: privacy-enabled streams never share
/// sockets with ordinary ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrivacyMode {
    #[default]
    Disabled,
    Enabled,
}

/// Errors constructing a stream key from a URL.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamKeyError {
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
}

/// Immutable identity of a connection-reuse bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    destination: SchemeHostPort,
    proxy_chain: ProxyChain,
    privacy_mode: PrivacyMode,
    /// Opaque network-partition tag; keys with different tags never share
    /// sockets even for the same destination.
    network_partition: Option<String>,
}

impl StreamKey {
    pub fn new(
        destination: SchemeHostPort,
        proxy_chain: ProxyChain,
        privacy_mode: PrivacyMode,
        network_partition: Option<String>,
    ) -> StreamKey {
        StreamKey {
            destination,
            proxy_chain,
            privacy_mode,
            network_partition,
        }
    }

    /// Key for a direct, non-partitioned destination taken from `url`.
    pub fn from_url(url: &Url) -> Result<StreamKey, StreamKeyError> {
        let scheme = match url.scheme() {
            "http" => UrlScheme::Http,
            "https" => UrlScheme::Https,
            other => return Err(StreamKeyError::UnsupportedScheme(other.to_string())),
        };
        let host = url.host_str().ok_or(StreamKeyError::MissingHost)?;
        let port = url.port().unwrap_or_else(|| scheme.default_port());
        Ok(StreamKey::new(
            SchemeHostPort::new(scheme, host, port),
            ProxyChain::Direct,
            PrivacyMode::Disabled,
            None,
        ))
    }

    pub fn destination(&self) -> &SchemeHostPort {
        &self.destination
    }

    pub fn proxy_chain(&self) -> &ProxyChain {
        &self.proxy_chain
    }

    pub fn privacy_mode(&self) -> PrivacyMode {
        self.privacy_mode
    }

    pub fn network_partition(&self) -> Option<&str> {
        self.network_partition.as_deref()
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} via {}", self.destination, self.proxy_chain)?;
        if self.privacy_mode == PrivacyMode::Enabled {
            f.write_str(" (private)")?;
        }
        Ok(())
    }
}
