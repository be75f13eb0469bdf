//! Leased connections.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::Connection;

/// Where a lease goes back to when it ends.
pub(crate) trait LeaseHome<C>: Send + Sync {
    /// Takes the connection back; reuses or closes it.
    fn check_in(&self, addr: &str, conn: C);

    /// Returns `true` if connections may be reused.
    fn pooled(&self) -> bool;
}

/// A connection leased from a [`ConnectionProvider`](crate::ConnectionProvider).
///
/// The connection goes back to its provider when the lease is dropped, so a
/// lease abandoned mid-call (for example by cancellation) is still accounted
/// for. Connections that report [`Connection::is_broken`] are closed instead
/// of being reused.
pub struct ConnectionLease<C: Connection> {
    conn: Option<C>,
    addr: String,
    home: Arc<dyn LeaseHome<C>>,
}

impl<C: Connection> ConnectionLease<C> {
    pub(crate) fn new(conn: C, addr: &str, home: Arc<dyn LeaseHome<C>>) -> Self {
        Self {
            conn: Some(conn),
            addr: addr.to_string(),
            home,
        }
    }

    /// Node address this connection points at.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Returns `true` if the connection came from a pool.
    pub fn is_pooled(&self) -> bool {
        self.home.pooled()
    }

    /// Ends the lease, returning the connection to its provider.
    pub fn release(self) {
        drop(self);
    }
}

impl<C: Connection> Deref for ConnectionLease<C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.conn
            .as_ref()
            .expect("lease holds its connection until dropped")
    }
}

impl<C: Connection> DerefMut for ConnectionLease<C> {
    fn deref_mut(&mut self) -> &mut C {
        self.conn
            .as_mut()
            .expect("lease holds its connection until dropped")
    }
}

impl<C: Connection> Drop for ConnectionLease<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.home.check_in(&self.addr, conn);
        }
    }
}

impl<C: Connection + std::fmt::Debug> std::fmt::Debug for ConnectionLease<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionLease")
            .field("addr", &self.addr)
            .field("pooled", &self.is_pooled())
            .field("conn", &self.conn)
            .finish()
    }
}
