//! Shared network-session facilities
//!
//! One `HttpNetworkSession` backs one pool: the task sequence everything
//! runs on, the transport connector, and the proxy-resolution feedback
//! service.

use std::rc::Rc;

use crate::config::SessionConfig;
use crate::connector::TransportConnector;
use crate::proxy::ProxyResolutionService;
use crate::task::SequencedTaskRunner;

pub struct HttpNetworkSession {
    config: SessionConfig,
    task_runner: Rc<SequencedTaskRunner>,
    connector: Rc<dyn TransportConnector>,
    proxy_resolution_service: ProxyResolutionService,
}

impl HttpNetworkSession {
    pub fn new(
        config: SessionConfig,
        task_runner: Rc<SequencedTaskRunner>,
        connector: Rc<dyn TransportConnector>,
    ) -> Result<Rc<HttpNetworkSession>, String> {
        config.validate()?;
        tracing::debug!(
            target: "streampool::session",
            enable_quic = config.enable_quic,
            max_streams_per_pool = config.pool.max_streams_per_pool,
            max_streams_per_group = config.pool.max_streams_per_group,
            "session created"
        );
        Ok(Rc::new(HttpNetworkSession {
            config,
            task_runner,
            connector,
            proxy_resolution_service: ProxyResolutionService::new(),
        }))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn task_runner(&self) -> &Rc<SequencedTaskRunner> {
        &self.task_runner
    }

    pub fn connector(&self) -> &Rc<dyn TransportConnector> {
        &self.connector
    }

    pub fn proxy_resolution_service(&self) -> &ProxyResolutionService {
        &self.proxy_resolution_service
    }
}
