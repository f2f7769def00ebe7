//! Session and pool configuration

/// Connection-count ceilings for the pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum streams (admitted jobs plus idle sockets) across the whole
    /// pool.
    pub max_streams_per_pool: usize,
    /// Maximum streams per destination group.
    pub max_streams_per_group: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_streams_per_pool: 256,
            max_streams_per_group: 6,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_streams_per_group == 0 {
            return Err("max_streams_per_group must be greater than 0".to_string());
        }
        if self.max_streams_per_pool < self.max_streams_per_group {
            return Err(
                "max_streams_per_pool must be at least max_streams_per_group".to_string(),
            );
        }
        Ok(())
    }
}

/// Session-wide settings shared by every group.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Whether QUIC attempts may be raced against TCP for https
    /// destinations that did not request a specific QUIC version.
    pub enable_quic: bool,
    pub pool: PoolConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enable_quic: true,
            pool: PoolConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.pool.validate()
    }
}
