//! Chunked uploads.

use std::sync::Arc;

use silo_node_rpc::NodeRpc;
use silo_protocol::{BeginUploadRequest, CommitUploadRequest};
use silo_transfer::{
    ProgressTracker, SegmentPlan, SegmentReader, TransferError, TransferScheduler, checksum_bytes,
};
use tokio::io::AsyncRead;
use tracing::{info, warn};

use crate::error::SdkError;
use crate::sdk::{Sdk, emit};
use crate::types::{Direction, FileUpload, TransferEvent, UploadResult};
use crate::validation::{validate_bucket_name, validate_object_name};

impl<C: NodeRpc> Sdk<C> {
    /// Validates an upload of `size` bytes read from `reader`.
    ///
    /// Nothing is sent to the node until [`upload`](Self::upload) runs.
    pub fn create_file_upload<R>(
        &self,
        bucket: &str,
        name: &str,
        size: i64,
        reader: R,
    ) -> Result<FileUpload<R>, SdkError>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.ensure_open()?;
        validate_bucket_name(bucket)?;
        validate_object_name(name)?;
        let size = u64::try_from(size).map_err(|_| {
            SdkError::Validation(format!("file size must not be negative, got {size}"))
        })?;

        Ok(FileUpload {
            bucket: bucket.to_string(),
            name: name.to_string(),
            size,
            reader,
        })
    }

    /// Uploads a file in segments of the configured chunk size.
    ///
    /// Segments are read from the source in order but sent concurrently,
    /// each on its own leased connection. The object is committed only after
    /// every segment is stored; the first failing segment aborts the rest.
    pub async fn upload<R>(&self, upload: FileUpload<R>) -> Result<UploadResult, SdkError>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.ensure_open()?;
        let FileUpload {
            bucket,
            name,
            size,
            reader,
        } = upload;
        let plan = SegmentPlan::new(size, self.chunk_size)?;

        info!(bucket = %bucket, name = %name, size, segments = plan.len(), "upload started");
        self.emit(TransferEvent::Started {
            direction: Direction::Upload,
            bucket: bucket.clone(),
            name: name.clone(),
            size,
            segments: plan.len(),
        });

        match self.run_upload(&bucket, &name, plan, reader).await {
            Ok(result) => {
                info!(
                    bucket = %bucket,
                    name = %name,
                    segments = result.segments,
                    elapsed_ms = result.elapsed.as_millis() as u64,
                    "upload completed"
                );
                self.emit(TransferEvent::Completed {
                    direction: Direction::Upload,
                    bucket,
                    name,
                    bytes: result.object.size,
                });
                Ok(result)
            }
            Err(e) => {
                warn!(bucket = %bucket, name = %name, error = %e, "upload failed");
                self.emit(TransferEvent::Failed {
                    direction: Direction::Upload,
                    bucket,
                    name,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run_upload<R>(
        &self,
        bucket: &str,
        name: &str,
        plan: SegmentPlan,
        reader: R,
    ) -> Result<UploadResult, SdkError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let begin = BeginUploadRequest {
            bucket: bucket.to_string(),
            name: name.to_string(),
            size: plan.total_size(),
            chunk_size: plan.chunk_size(),
        };
        let transfer_id: Arc<str> = {
            let mut lease = self.lease().await?;
            lease.begin_upload(&begin).await?.into()
        };

        let scheduler = TransferScheduler::with_parent(self.concurrency, &self.cancel)?;
        let mut reader = SegmentReader::new(reader, &plan);
        let progress = Arc::new(ProgressTracker::new(plan.total_size(), plan.len()));
        let addr: Arc<str> = self.config.node_address.as_str().into();
        let bucket_name: Arc<str> = bucket.into();
        let object_name: Arc<str> = name.into();
        let provider = &self.provider;
        let events = &self.events_tx;

        let stats = scheduler
            .run(&mut reader, |segment, payload| {
                let provider = Arc::clone(provider);
                let addr = Arc::clone(&addr);
                let transfer_id = Arc::clone(&transfer_id);
                let progress = Arc::clone(&progress);
                let events = events.clone();
                let bucket = Arc::clone(&bucket_name);
                let name = Arc::clone(&object_name);

                async move {
                    let index = segment.index;
                    let checksum = checksum_bytes(&payload);
                    let mut lease = provider
                        .acquire(&addr)
                        .await
                        .map_err(|e| TransferError::segment(index, e))?;
                    let stored = lease
                        .send_segment(&transfer_id, index, &payload, &checksum)
                        .await
                        .map_err(|e| TransferError::segment(index, e))?;
                    lease.release();

                    if stored.size != segment.len {
                        return Err(TransferError::LengthMismatch {
                            index,
                            expected: segment.len,
                            actual: stored.size,
                        });
                    }

                    emit(
                        &events,
                        TransferEvent::SegmentCompleted {
                            direction: Direction::Upload,
                            bucket: bucket.to_string(),
                            name: name.to_string(),
                            index,
                            progress: progress.record(segment.len),
                        },
                    );
                    Ok(segment.len)
                }
            })
            .await?;

        let commit = CommitUploadRequest {
            transfer_id: transfer_id.to_string(),
            segment_count: plan.len(),
            checksum: reader.checksum(),
        };
        let object = {
            let mut lease = self.lease().await?;
            lease.commit_upload(&commit).await?
        };

        Ok(UploadResult {
            object,
            transfer_id: transfer_id.to_string(),
            segments: stats.segments,
            peak_in_flight: stats.peak_in_flight,
            elapsed: stats.elapsed,
        })
    }
}
