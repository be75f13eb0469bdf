//! One connection per lease.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use tracing::{debug, trace};

use crate::lease::LeaseHome;
use crate::{
    Connection, ConnectionError, ConnectionLease, ConnectionProvider, Connector, PoolingMode,
    ProviderStats,
};

/// Opens a new connection for every lease and closes it on release.
pub struct StandaloneProvider<K: Connector> {
    connector: K,
    ledger: Arc<Ledger>,
}

#[derive(Default)]
struct Ledger {
    closed: AtomicBool,
    stats: Mutex<HashMap<String, ProviderStats>>,
}

impl Ledger {
    fn update<T>(&self, addr: &str, f: impl FnOnce(&mut ProviderStats) -> T) -> T {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        f(stats.entry(addr.to_string()).or_default())
    }
}

impl<C: Connection> LeaseHome<C> for Ledger {
    fn check_in(&self, addr: &str, conn: C) {
        self.update(addr, |s| {
            s.leased = s.leased.saturating_sub(1);
            s.discarded += 1;
        });
        trace!(addr, broken = conn.is_broken(), "closing standalone connection");
        drop(conn);
    }

    fn pooled(&self) -> bool {
        false
    }
}

impl<K: Connector> StandaloneProvider<K> {
    pub fn new(connector: K) -> Self {
        Self {
            connector,
            ledger: Arc::new(Ledger::default()),
        }
    }
}

impl<K: Connector> ConnectionProvider for StandaloneProvider<K> {
    type Conn = K::Conn;

    fn acquire<'a>(
        &'a self,
        addr: &'a str,
    ) -> BoxFuture<'a, Result<ConnectionLease<K::Conn>, ConnectionError>> {
        Box::pin(async move {
            if self.is_closed() {
                return Err(ConnectionError::Closed);
            }

            let conn = self.connector.connect(addr).await?;
            self.ledger.update(addr, |s| {
                s.opened += 1;
                s.leased += 1;
                s.peak_leased = s.peak_leased.max(s.leased);
            });

            let home: Arc<dyn LeaseHome<K::Conn>> = self.ledger.clone();
            Ok(ConnectionLease::new(conn, addr, home))
        })
    }

    fn shutdown(&self) {
        if !self.ledger.closed.swap(true, Ordering::SeqCst) {
            debug!("standalone connection provider shut down");
        }
    }

    fn is_closed(&self) -> bool {
        self.ledger.closed.load(Ordering::SeqCst)
    }

    fn stats(&self, addr: &str) -> ProviderStats {
        self.ledger.update(addr, |s| *s)
    }

    fn mode(&self) -> PoolingMode {
        PoolingMode::Standalone
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeConnector;

    const ADDR: &str = "127.0.0.1:5500";

    #[tokio::test]
    async fn every_acquire_opens_a_new_connection() {
        let provider = StandaloneProvider::new(FakeConnector::default());

        let first = provider.acquire(ADDR).await.unwrap();
        let first_id = first.id;
        assert!(!first.is_pooled());
        provider.release(first);

        let second = provider.acquire(ADDR).await.unwrap();
        assert_ne!(second.id, first_id);
        drop(second);

        let stats = provider.stats(ADDR);
        assert_eq!(stats.opened, 2);
        assert_eq!(stats.discarded, 2);
        assert_eq!(stats.leased, 0);
        assert_eq!(stats.idle, 0);
    }

    #[tokio::test]
    async fn tracks_peak_leased() {
        let provider = StandaloneProvider::new(FakeConnector::default());

        let a = provider.acquire(ADDR).await.unwrap();
        let b = provider.acquire(ADDR).await.unwrap();
        let c = provider.acquire(ADDR).await.unwrap();
        assert_eq!(provider.stats(ADDR).leased, 3);
        drop((a, b, c));

        let stats = provider.stats(ADDR);
        assert_eq!(stats.leased, 0);
        assert_eq!(stats.peak_leased, 3);
    }

    #[tokio::test]
    async fn connect_failure_surfaces() {
        let connector = FakeConnector::default();
        connector.refuse.store(true, Ordering::SeqCst);
        let provider = StandaloneProvider::new(connector);

        let err = provider.acquire(ADDR).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Connect { .. }));
        assert_eq!(provider.stats(ADDR).leased, 0);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_refuses_new_leases() {
        let provider = StandaloneProvider::new(FakeConnector::default());
        let lease = provider.acquire(ADDR).await.unwrap();

        provider.shutdown();
        provider.shutdown();
        assert!(provider.is_closed());

        let err = provider.acquire(ADDR).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Closed));

        // Outstanding leases still close normally.
        drop(lease);
        assert_eq!(provider.stats(ADDR).leased, 0);
    }
}
