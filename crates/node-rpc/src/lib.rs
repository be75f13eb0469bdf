//! Request/response RPC between Silo clients and storage nodes.
//!
//! A connection carries a sequence of frames (see [`wire`]). The client side
//! is [`NodeClient`], opened through [`TcpConnector`] so it can be handed out
//! by a `silo-connection` provider. The server side is [`NodeServer`], which
//! keeps objects in an in-memory [`ObjectStore`].

pub mod client;
pub mod error;
pub mod rpc;
pub mod server;
pub mod store;
pub mod wire;

pub use client::{ClientOptions, NodeClient, TcpConnector};
pub use error::RpcError;
pub use rpc::{FetchedSegment, NodeRpc};
pub use server::{NodeServer, ServerStats};
pub use store::{ObjectStore, StoreError};

/// TCP read/write buffer size (256 KB).
pub const SOCKET_BUFFER_SIZE: usize = 256 * 1024;
