//! Bounded pool of reusable connections.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::BoxFuture;
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

use crate::lease::LeaseHome;
use crate::{
    Connection, ConnectionError, ConnectionLease, ConnectionProvider, Connector, PoolingMode,
    ProviderStats,
};

/// Keeps idle connections per node address for reuse.
///
/// For every address, idle plus leased connections never exceed `capacity`.
/// When the limit is reached, [`acquire`](ConnectionProvider::acquire) waits
/// until a lease ends. Broken connections are closed on check-in and free
/// their slot.
///
/// After [`shutdown`](ConnectionProvider::shutdown), idle connections are
/// closed immediately and leased ones are closed as they come back.
pub struct ConnectionPool<K: Connector> {
    connector: K,
    shared: Arc<PoolShared<K::Conn>>,
}

struct PoolShared<C> {
    capacity: usize,
    state: Mutex<PoolState<C>>,
}

struct PoolState<C> {
    nodes: HashMap<String, NodeSlots<C>>,
    closed: bool,
}

struct NodeSlots<C> {
    idle: Vec<C>,
    leased: usize,
    peak_leased: usize,
    opened: u64,
    discarded: u64,
    available: Arc<Notify>,
}

impl<C> Default for NodeSlots<C> {
    fn default() -> Self {
        Self {
            idle: Vec::new(),
            leased: 0,
            peak_leased: 0,
            opened: 0,
            discarded: 0,
            available: Arc::new(Notify::new()),
        }
    }
}

impl<C> NodeSlots<C> {
    fn outstanding(&self) -> usize {
        self.idle.len() + self.leased
    }

    fn lease_one(&mut self) {
        self.leased += 1;
        self.peak_leased = self.peak_leased.max(self.leased);
    }
}

enum Checkout<C> {
    Idle(C),
    Reserved,
    Full,
}

impl<C: Connection> PoolShared<C> {
    fn lock(&self) -> MutexGuard<'_, PoolState<C>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wakeup signal for waiters on `addr`.
    fn signal(&self, addr: &str) -> Arc<Notify> {
        let mut state = self.lock();
        let slots = state.nodes.entry(addr.to_string()).or_default();
        Arc::clone(&slots.available)
    }

    /// Takes an idle connection or reserves a slot for a new one.
    fn checkout(&self, addr: &str) -> Result<Checkout<C>, ConnectionError> {
        let mut state = self.lock();
        if state.closed {
            return Err(ConnectionError::Closed);
        }
        let slots = state.nodes.entry(addr.to_string()).or_default();

        while let Some(conn) = slots.idle.pop() {
            if conn.is_broken() {
                slots.discarded += 1;
                continue;
            }
            slots.lease_one();
            return Ok(Checkout::Idle(conn));
        }

        if slots.outstanding() < self.capacity {
            slots.lease_one();
            slots.opened += 1;
            return Ok(Checkout::Reserved);
        }
        Ok(Checkout::Full)
    }

    /// Gives back a slot reserved by `checkout` whose connect failed.
    fn cancel_reservation(&self, addr: &str) {
        let available = {
            let mut state = self.lock();
            let slots = state.nodes.entry(addr.to_string()).or_default();
            slots.leased = slots.leased.saturating_sub(1);
            slots.opened = slots.opened.saturating_sub(1);
            Arc::clone(&slots.available)
        };
        available.notify_one();
    }
}

/// Slot reserved for a connection being opened. Freed on drop unless the
/// connect succeeded, which also covers an acquire cancelled mid-connect.
struct Reservation<'a, C: Connection> {
    shared: &'a PoolShared<C>,
    addr: &'a str,
    armed: bool,
}

impl<C: Connection> Drop for Reservation<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.cancel_reservation(self.addr);
        }
    }
}

impl<C: Connection> LeaseHome<C> for PoolShared<C> {
    fn check_in(&self, addr: &str, conn: C) {
        let (discard, available) = {
            let mut state = self.lock();
            let closed = state.closed;
            let slots = state.nodes.entry(addr.to_string()).or_default();
            slots.leased = slots.leased.saturating_sub(1);
            let discard = if closed || conn.is_broken() {
                slots.discarded += 1;
                Some(conn)
            } else {
                slots.idle.push(conn);
                None
            };
            (discard, Arc::clone(&slots.available))
        };

        if let Some(conn) = discard {
            trace!(addr, broken = conn.is_broken(), "closing pooled connection");
            drop(conn);
        }
        available.notify_one();
    }

    fn pooled(&self) -> bool {
        true
    }
}

impl<K: Connector> ConnectionPool<K> {
    /// Creates a pool allowing up to `capacity` connections per address.
    pub fn new(connector: K, capacity: usize) -> Result<Self, ConnectionError> {
        if capacity == 0 {
            return Err(ConnectionError::InvalidCapacity(capacity));
        }
        Ok(Self {
            connector,
            shared: Arc::new(PoolShared {
                capacity,
                state: Mutex::new(PoolState {
                    nodes: HashMap::new(),
                    closed: false,
                }),
            }),
        })
    }

    /// Maximum connections per node address.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    fn lease(&self, conn: K::Conn, addr: &str) -> ConnectionLease<K::Conn> {
        let home: Arc<dyn LeaseHome<K::Conn>> = self.shared.clone();
        ConnectionLease::new(conn, addr, home)
    }
}

impl<K: Connector> ConnectionProvider for ConnectionPool<K> {
    type Conn = K::Conn;

    fn acquire<'a>(
        &'a self,
        addr: &'a str,
    ) -> BoxFuture<'a, Result<ConnectionLease<K::Conn>, ConnectionError>> {
        Box::pin(async move {
            let available = self.shared.signal(addr);
            loop {
                // Register interest before inspecting state so a release
                // between the check and the await is not missed.
                let notified = available.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                match self.shared.checkout(addr)? {
                    Checkout::Idle(conn) => {
                        trace!(addr, "reusing pooled connection");
                        return Ok(self.lease(conn, addr));
                    }
                    Checkout::Reserved => {
                        let mut reservation = Reservation {
                            shared: &self.shared,
                            addr,
                            armed: true,
                        };
                        return match self.connector.connect(addr).await {
                            Ok(conn) => {
                                reservation.armed = false;
                                debug!(addr, "opened pooled connection");
                                Ok(self.lease(conn, addr))
                            }
                            Err(e) => {
                                warn!(addr, error = %e, "pooled connect failed");
                                Err(e)
                            }
                        };
                    }
                    Checkout::Full => {
                        trace!(addr, "pool exhausted, waiting for a release");
                        notified.await;
                    }
                }
            }
        })
    }

    fn shutdown(&self) {
        let mut drained: Vec<K::Conn> = Vec::new();
        let signals: Vec<Arc<Notify>> = {
            let mut state = self.shared.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state
                .nodes
                .values_mut()
                .map(|slots| {
                    slots.discarded += slots.idle.len() as u64;
                    drained.append(&mut slots.idle);
                    Arc::clone(&slots.available)
                })
                .collect()
        };
        debug!(closed_idle = drained.len(), "connection pool shut down");
        drop(drained);
        for available in signals {
            available.notify_waiters();
        }
    }

    fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    fn stats(&self, addr: &str) -> ProviderStats {
        let state = self.shared.lock();
        state
            .nodes
            .get(addr)
            .map(|slots| ProviderStats {
                idle: slots.idle.len(),
                leased: slots.leased,
                peak_leased: slots.peak_leased,
                opened: slots.opened,
                discarded: slots.discarded,
            })
            .unwrap_or_default()
    }

    fn mode(&self) -> PoolingMode {
        PoolingMode::Pooled
    }
}
