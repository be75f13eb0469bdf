//! Transfer sessions against one storage node.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use silo_connection::{
    ConnectionLease, ConnectionProvider, Connector, PoolingMode, ProviderStats, build_provider,
};
use silo_node_rpc::{NodeClient, NodeRpc, TcpConnector};
use silo_protocol::BucketInfo;
use silo_protocol::constants::PROTOCOL_VERSION;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SdkConfig;
use crate::error::SdkError;
use crate::types::TransferEvent;
use crate::validation::validate_bucket_name;

/// Capacity of the event channel.
const EVENT_CHANNEL_SIZE: usize = 256;

/// Chunked upload/download client for one storage node.
///
/// Every segment transfer leases its own connection from the provider
/// selected at construction, so standalone and pooled modes behave the same
/// to callers and differ only in connection reuse.
///
/// [`close`](Self::close) cancels running transfers and shuts the provider
/// down. It is also called on drop.
pub struct Sdk<C: NodeRpc = NodeClient> {
    pub(crate) config: SdkConfig,
    pub(crate) concurrency: usize,
    pub(crate) chunk_size: u64,
    pub(crate) provider: Arc<dyn ConnectionProvider<Conn = C>>,
    owns_provider: bool,
    pub(crate) cancel: CancellationToken,
    closed: AtomicBool,
    pub(crate) events_tx: mpsc::Sender<TransferEvent>,
    events_rx: Option<mpsc::Receiver<TransferEvent>>,
}

impl Sdk<NodeClient> {
    /// Connects to the node at `node_address`.
    ///
    /// Fails with [`SdkError::Configuration`] if `max_concurrency` or
    /// `chunk_size` is not positive and with [`SdkError::Connection`] if the
    /// node cannot be reached.
    pub async fn new(
        node_address: &str,
        max_concurrency: i64,
        chunk_size: i64,
        use_pool: bool,
    ) -> Result<Self, SdkError> {
        Self::from_config(SdkConfig::new(
            node_address,
            max_concurrency,
            chunk_size,
            use_pool,
        ))
        .await
    }

    pub async fn from_config(config: SdkConfig) -> Result<Self, SdkError> {
        let connector = TcpConnector::new(config.client_options());
        Self::with_connector(config, connector).await
    }
}

impl<C: NodeRpc> Sdk<C> {
    /// Builds the provider selected by `config.use_pool` around `connector`.
    pub async fn with_connector<K>(config: SdkConfig, connector: K) -> Result<Self, SdkError>
    where
        K: Connector<Conn = C>,
    {
        config.validate()?;
        let mode = PoolingMode::from_flag(config.use_pool);
        let provider = build_provider(mode, connector, config.concurrency())?;
        Self::build(config, provider, true).await
    }

    /// Uses a provider owned by the caller, which may be shared with other
    /// sessions. [`close`](Self::close) leaves it running.
    pub async fn with_provider(
        config: SdkConfig,
        provider: Arc<dyn ConnectionProvider<Conn = C>>,
    ) -> Result<Self, SdkError> {
        config.validate()?;
        Self::build(config, provider, false).await
    }

    async fn build(
        config: SdkConfig,
        provider: Arc<dyn ConnectionProvider<Conn = C>>,
        owns_provider: bool,
    ) -> Result<Self, SdkError> {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let sdk = Self {
            concurrency: config.concurrency(),
            chunk_size: config.chunk_size_bytes(),
            config,
            provider,
            owns_provider,
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
            events_tx,
            events_rx: Some(events_rx),
        };

        let pong = {
            let mut lease = sdk.lease().await?;
            lease.ping().await?
        };
        if pong.protocol_version != PROTOCOL_VERSION {
            warn!(
                node = %sdk.config.node_address,
                node_version = pong.protocol_version,
                our_version = PROTOCOL_VERSION,
                "protocol version mismatch"
            );
        }

        info!(
            node = %sdk.config.node_address,
            concurrency = sdk.concurrency,
            chunk_size = sdk.chunk_size,
            mode = %sdk.provider.mode(),
            "sdk connected"
        );
        Ok(sdk)
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn mode(&self) -> PoolingMode {
        self.provider.mode()
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<TransferEvent>> {
        self.events_rx.take()
    }

    /// Connection accounting for the node.
    pub fn stats(&self) -> ProviderStats {
        self.provider.stats(&self.config.node_address)
    }

    /// Creates a bucket on the node.
    pub async fn create_bucket(&self, name: &str) -> Result<BucketInfo, SdkError> {
        self.ensure_open()?;
        validate_bucket_name(name)?;
        let mut lease = self.lease().await?;
        let bucket = lease.create_bucket(name).await?;
        info!(bucket = name, "bucket created");
        Ok(bucket)
    }

    /// Cancels running transfers and releases connections. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        if self.owns_provider {
            self.provider.shutdown();
        }
        info!(node = %self.config.node_address, "sdk closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_open(&self) -> Result<(), SdkError> {
        if self.is_closed() {
            return Err(SdkError::Closed);
        }
        Ok(())
    }

    pub(crate) async fn lease(&self) -> Result<ConnectionLease<C>, SdkError> {
        let lease = self.provider.acquire(&self.config.node_address).await?;
        debug!(pooled = lease.is_pooled(), "connection leased");
        Ok(lease)
    }

    pub(crate) fn emit(&self, event: TransferEvent) {
        emit(&self.events_tx, event);
    }
}

/// Sends an event without waiting. Dropped if the channel is full or closed.
pub(crate) fn emit(tx: &mpsc::Sender<TransferEvent>, event: TransferEvent) {
    let _ = tx.try_send(event);
}

impl<C: NodeRpc> Drop for Sdk<C> {
    fn drop(&mut self) {
        self.close();
    }
}
