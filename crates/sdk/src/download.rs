//! Chunked downloads.

use std::sync::Arc;

use silo_node_rpc::{NodeRpc, RpcError};
use silo_transfer::{
    ProgressTracker, Reassembler, SegmentPlan, TransferError, TransferScheduler, verify_checksum,
};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::SdkError;
use crate::sdk::{Sdk, emit};
use crate::types::{Direction, DownloadResult, FileDownload, TransferEvent};
use crate::validation::{validate_bucket_name, validate_object_name};

impl<C: NodeRpc> Sdk<C> {
    /// Looks up a committed object and prepares its download.
    ///
    /// Fails with [`SdkError::NotFound`] if the bucket or object is missing.
    pub async fn create_file_download(
        &self,
        bucket: &str,
        name: &str,
    ) -> Result<FileDownload, SdkError> {
        self.ensure_open()?;
        validate_bucket_name(bucket)?;
        validate_object_name(name)?;

        let mut lease = self.lease().await?;
        let info = lease.object_info(bucket, name).await?;
        Ok(FileDownload { info })
    }

    /// Downloads an object into `writer`.
    ///
    /// Segments are fetched concurrently and may arrive in any order; the
    /// writer always receives them in index order. Every segment's checksum
    /// is verified, and so is the whole object's when the node reports one.
    pub async fn download<W>(
        &self,
        download: &FileDownload,
        writer: &mut W,
    ) -> Result<DownloadResult, SdkError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        self.ensure_open()?;
        let info = &download.info;

        info!(bucket = %info.bucket, name = %info.name, size = info.size, "download started");
        self.emit(TransferEvent::Started {
            direction: Direction::Download,
            bucket: info.bucket.clone(),
            name: info.name.clone(),
            size: info.size,
            segments: info.segment_count,
        });

        match self.run_download(download, writer).await {
            Ok(result) => {
                info!(
                    bucket = %info.bucket,
                    name = %info.name,
                    bytes = result.bytes,
                    peak_pending = result.peak_pending,
                    elapsed_ms = result.elapsed.as_millis() as u64,
                    "download completed"
                );
                self.emit(TransferEvent::Completed {
                    direction: Direction::Download,
                    bucket: info.bucket.clone(),
                    name: info.name.clone(),
                    bytes: result.bytes,
                });
                Ok(result)
            }
            Err(e) => {
                warn!(bucket = %info.bucket, name = %info.name, error = %e, "download failed");
                self.emit(TransferEvent::Failed {
                    direction: Direction::Download,
                    bucket: info.bucket.clone(),
                    name: info.name.clone(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run_download<W>(
        &self,
        download: &FileDownload,
        writer: &mut W,
    ) -> Result<DownloadResult, SdkError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let info = &download.info;
        let plan = SegmentPlan::new(info.size, info.chunk_size)?;
        if plan.len() != info.segment_count {
            return Err(SdkError::Rpc(RpcError::Protocol(format!(
                "object reports {} segments, its size and chunk size give {}",
                info.segment_count,
                plan.len()
            ))));
        }

        let scheduler = TransferScheduler::with_parent(self.concurrency, &self.cancel)?;
        let signal = scheduler.failure_signal();
        let consumer_signal = signal.clone();
        let (tx, mut rx) = mpsc::channel::<(u64, Vec<u8>)>(self.concurrency);

        let provider = Arc::clone(&self.provider);
        let events = self.events_tx.clone();
        let progress = Arc::new(ProgressTracker::new(plan.total_size(), plan.len()));
        let addr: Arc<str> = self.config.node_address.as_str().into();
        let bucket: Arc<str> = info.bucket.as_str().into();
        let name: Arc<str> = info.name.as_str().into();
        let mut segments = plan.iter();

        let produce = async move {
            let result = scheduler
                .run(&mut segments, |segment, ()| {
                    let provider = Arc::clone(&provider);
                    let addr = Arc::clone(&addr);
                    let bucket = Arc::clone(&bucket);
                    let name = Arc::clone(&name);
                    let progress = Arc::clone(&progress);
                    let events = events.clone();
                    let tx = tx.clone();

                    async move {
                        let index = segment.index;
                        let fetched = {
                            let mut lease = provider
                                .acquire(&addr)
                                .await
                                .map_err(|e| TransferError::segment(index, e))?;
                            lease
                                .fetch_segment(&bucket, &name, index)
                                .await
                                .map_err(|e| TransferError::segment(index, e))?
                        };

                        if fetched.index != index {
                            return Err(TransferError::segment(
                                index,
                                RpcError::Protocol(format!(
                                    "asked for segment {index}, node sent {}",
                                    fetched.index
                                )),
                            ));
                        }
                        let len = fetched.data.len() as u64;
                        if len != segment.len {
                            return Err(TransferError::LengthMismatch {
                                index,
                                expected: segment.len,
                                actual: len,
                            });
                        }
                        verify_checksum(index, &fetched.data, &fetched.checksum)?;

                        // The receiver only goes away once the run failed.
                        tx.send((index, fetched.data))
                            .await
                            .map_err(|_| TransferError::Cancelled)?;

                        emit(
                            &events,
                            TransferEvent::SegmentCompleted {
                                direction: Direction::Download,
                                bucket: bucket.to_string(),
                                name: name.to_string(),
                                index,
                                progress: progress.record(len),
                            },
                        );
                        Ok(len)
                    }
                })
                .await;
            drop(tx);
            result
        };

        let consume = async move {
            let mut reassembler = Reassembler::new(writer, plan);
            while let Some((index, data)) = rx.recv().await {
                if let Err(e) = reassembler.accept(index, data).await {
                    consumer_signal.fail(e);
                    return None;
                }
            }
            Some(reassembler)
        };

        let (run, reassembler) = tokio::join!(produce, consume);
        let stats = run?;
        let Some(reassembler) = reassembler else {
            return Err(signal.take_error().unwrap_or(TransferError::Cancelled).into());
        };
        let written = reassembler.finish(Some(info.checksum.as_str())).await?;

        Ok(DownloadResult {
            bytes: written.bytes_written,
            segments: stats.segments,
            checksum: written.checksum,
            peak_in_flight: stats.peak_in_flight,
            peak_pending: written.peak_pending,
            elapsed: stats.elapsed,
        })
    }
}
