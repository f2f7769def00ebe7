//! Proxy chain identity and the proxy-resolution feedback contract
//!
//! Proxy chain *resolution* is out of scope; the pool only needs the
//! resolved chain as part of the connection-reuse key, and a way to report
//! back that a chain produced a working stream.

use std::cell::{Cell, RefCell};
use std::fmt;

/// Proxy protocol spoken to an individual proxy server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyScheme {
    Http,
    Https,
    Socks5,
}

impl ProxyScheme {
    pub fn as_str(self) -> &'static str {
        match self {
            ProxyScheme::Http => "http",
            ProxyScheme::Https => "https",
            ProxyScheme::Socks5 => "socks5",
        }
    }
}

/// One hop in a proxy chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyServer {
    pub scheme: ProxyScheme,
    pub host: String,
    pub port: u16,
}

impl fmt::Display for ProxyServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }
}

/// The resolved, ordered chain of proxies for a destination. Part of the
/// stream key: streams established through different chains never share a
/// reuse bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProxyChain {
    /// No proxy; connect straight to the destination.
    Direct,
    /// Connect through the listed servers in order.
    Proxied(Vec<ProxyServer>),
}

impl ProxyChain {
    pub fn is_direct(&self) -> bool {
        matches!(self, ProxyChain::Direct)
    }
}

impl fmt::Display for ProxyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyChain::Direct => f.write_str("direct"),
            ProxyChain::Proxied(servers) => {
                for (i, server) in servers.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{server}")?;
                }
                Ok(())
            }
        }
    }
}

/// Proxy settings a delegate resolved for its request.
#[derive(Debug, Clone)]
pub struct ProxyInfo {
    pub chain: ProxyChain,
}

impl ProxyInfo {
    pub fn direct() -> ProxyInfo {
        ProxyInfo {
            chain: ProxyChain::Direct,
        }
    }
}

/// Receives success feedback once a policy-conformant stream has been
/// established through a proxy chain, marking that chain as currently
/// working for future fallback decisions.
#[derive(Debug, Default)]
pub struct ProxyResolutionService {
    recently_good: RefCell<Vec<ProxyChain>>,
    reports: Cell<usize>,
}

impl ProxyResolutionService {
    pub fn new() -> ProxyResolutionService {
        ProxyResolutionService::default()
    }

    /// Record that `info.chain` just produced a working stream.
    pub fn report_success(&self, info: &ProxyInfo) {
        self.reports.set(self.reports.get() + 1);
        let mut good = self.recently_good.borrow_mut();
        if !good.contains(&info.chain) {
            tracing::debug!(
                target: "streampool::proxy",
                chain = %info.chain,
                "proxy chain reported working"
            );
            good.push(info.chain.clone());
        }
    }

    pub fn is_recently_good(&self, chain: &ProxyChain) -> bool {
        self.recently_good.borrow().contains(chain)
    }

    /// Total number of `report_success` calls.
    pub fn report_count(&self) -> usize {
        self.reports.get()
    }
}
