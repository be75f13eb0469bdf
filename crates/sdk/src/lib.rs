//! Chunked upload/download client for Silo storage nodes.
//!
//! An [`Sdk`] splits files into fixed-size segments and moves them with a
//! bounded number of concurrent transfers. Uploads read the source once, in
//! order; downloads reassemble segments in order no matter when they arrive.
//! The first failing segment cancels the rest of its transfer.
//!
//! ```no_run
//! # async fn run() -> Result<(), silo_sdk::SdkError> {
//! let sdk = silo_sdk::Sdk::new("127.0.0.1:5500", 8, 4 * 1024 * 1024, true).await?;
//! sdk.create_bucket("backups").await?;
//!
//! let file = tokio::fs::File::open("disk.img").await?;
//! let size = file.metadata().await?.len() as i64;
//! let upload = sdk.create_file_upload("backups", "disk.img", size, file)?;
//! sdk.upload(upload).await?;
//!
//! let download = sdk.create_file_download("backups", "disk.img").await?;
//! let mut out = tokio::fs::File::create("restored.img").await?;
//! sdk.download(&download, &mut out).await?;
//! sdk.close();
//! # Ok(())
//! # }
//! ```

pub mod config;
mod download;
pub mod error;
mod sdk;
pub mod types;
mod upload;
pub mod validation;

pub use config::{DEFAULT_MAX_CONCURRENCY, SdkConfig};
pub use error::SdkError;
pub use sdk::Sdk;
pub use types::{
    Direction, DownloadResult, FileDownload, FileUpload, TransferEvent, UploadResult,
};

pub use silo_connection::{PoolingMode, ProviderStats};
pub use silo_protocol::{BucketInfo, ObjectInfo};
pub use silo_transfer::{DEFAULT_CHUNK_SIZE, TransferProgress};
