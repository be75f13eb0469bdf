//! Connection providers for Silo storage nodes.
//!
//! A [`ConnectionProvider`] hands out [`ConnectionLease`]s for a node
//! address. Two strategies exist behind the same trait:
//!
//! - [`StandaloneProvider`] opens a fresh connection per lease and closes it
//!   on release.
//! - [`ConnectionPool`] keeps idle connections per address and never lets
//!   idle + leased exceed its capacity.
//!
//! Providers are explicit instances; each SDK owns one and shuts it down on
//! close.

pub mod connector;
pub mod error;
pub mod lease;
pub mod pool;
pub mod standalone;

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;

pub use connector::{Connection, Connector};
pub use error::ConnectionError;
pub use lease::ConnectionLease;
pub use pool::ConnectionPool;
pub use standalone::StandaloneProvider;

/// How connections are obtained for segment transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolingMode {
    /// One connection per request, closed after use.
    Standalone,
    /// Bounded pool of reusable connections per node address.
    Pooled,
}

impl PoolingMode {
    /// Maps the boolean `use_pool` flag used by configuration.
    pub fn from_flag(use_pool: bool) -> Self {
        if use_pool {
            PoolingMode::Pooled
        } else {
            PoolingMode::Standalone
        }
    }
}

impl fmt::Display for PoolingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolingMode::Standalone => f.write_str("standalone"),
            PoolingMode::Pooled => f.write_str("pooled"),
        }
    }
}

/// Connection accounting for one node address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderStats {
    /// Connections parked in the pool (always 0 for standalone).
    pub idle: usize,
    /// Connections currently leased out.
    pub leased: usize,
    /// Highest number of simultaneously leased connections seen.
    pub peak_leased: usize,
    /// Connections opened over the provider's lifetime.
    pub opened: u64,
    /// Connections closed instead of being reused.
    pub discarded: u64,
}

/// Supplies connections to storage nodes.
pub trait ConnectionProvider: Send + Sync {
    /// Connection type handed out in leases.
    type Conn: Connection;

    /// Leases a connection to `addr`, waiting if the provider is at capacity.
    fn acquire<'a>(
        &'a self,
        addr: &'a str,
    ) -> BoxFuture<'a, Result<ConnectionLease<Self::Conn>, ConnectionError>>;

    /// Gives a lease back. Equivalent to dropping it.
    fn release(&self, lease: ConnectionLease<Self::Conn>) {
        drop(lease);
    }

    /// Closes idle connections and refuses further leases. Idempotent.
    fn shutdown(&self);

    /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
    fn is_closed(&self) -> bool;

    /// Returns connection accounting for `addr`.
    fn stats(&self, addr: &str) -> ProviderStats;

    /// Returns the strategy this provider implements.
    fn mode(&self) -> PoolingMode;
}

/// Builds the provider selected by `mode`.
///
/// `capacity` bounds the pool per address; standalone providers ignore it.
pub fn build_provider<K: Connector>(
    mode: PoolingMode,
    connector: K,
    capacity: usize,
) -> Result<Arc<dyn ConnectionProvider<Conn = K::Conn>>, ConnectionError> {
    let provider: Arc<dyn ConnectionProvider<Conn = K::Conn>> = match mode {
        PoolingMode::Standalone => Arc::new(StandaloneProvider::new(connector)),
        PoolingMode::Pooled => Arc::new(ConnectionPool::new(connector, capacity)?),
    };
    Ok(provider)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeConnector;

    #[test]
    fn pooling_mode_from_flag() {
        assert_eq!(PoolingMode::from_flag(true), PoolingMode::Pooled);
        assert_eq!(PoolingMode::from_flag(false), PoolingMode::Standalone);
        assert_eq!(PoolingMode::Pooled.to_string(), "pooled");
    }

    #[tokio::test]
    async fn build_provider_selects_strategy() {
        let standalone =
            build_provider(PoolingMode::Standalone, FakeConnector::default(), 4).unwrap();
        assert_eq!(standalone.mode(), PoolingMode::Standalone);

        let pooled = build_provider(PoolingMode::Pooled, FakeConnector::default(), 4).unwrap();
        assert_eq!(pooled.mode(), PoolingMode::Pooled);
    }

    #[test]
    fn build_pool_rejects_zero_capacity() {
        let result = build_provider(PoolingMode::Pooled, FakeConnector::default(), 0);
        assert!(matches!(result, Err(ConnectionError::InvalidCapacity(0))));
    }
}
