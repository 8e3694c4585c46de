//! Artifact retrieval.
//!
//! [`RetrievalGateway::get`] resolves an id and opens the blob by descriptor
//! before returning, so a sweep or deferred timer that unlinks the name while
//! the transfer is in flight cannot cut it short. Deferred deletion is armed
//! only after the caller has received every byte; an aborted, failed or
//! timed-out transfer leaves the artifact reachable until the next sweep.
//!
//! Two ways to consume a [`Download`]:
//!
//! * [`Download::send_to`] copies into any `AsyncWrite`, bounded by the
//!   transfer timeout as a whole.
//! * [`Download::into_stream`] yields chunks for a streaming response body.
//!   All reads share one deadline, and the timer is armed when the consumer
//!   polls past the last chunk. Dropping the stream early arms nothing.

use crate::artifact::Artifact;
use crate::deferred::DeferredDeletionScheduler;
use crate::error::DocForgeError;
use crate::store::ArtifactStore;
use futures::stream;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tokio_stream::Stream;
use tracing::{debug, info, warn};

/// Read size for streamed transfers.
const CHUNK_SIZE: usize = 64 * 1024;

/// A boxed stream of artifact chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, DocForgeError>> + Send>>;

/// Resolves ids to open downloads and arms deferred deletion on completion.
#[derive(Debug, Clone)]
pub struct RetrievalGateway {
    store: Arc<ArtifactStore>,
    deferred: Arc<DeferredDeletionScheduler>,
    grace: Duration,
    transfer_timeout: Duration,
}

impl RetrievalGateway {
    pub fn new(
        store: Arc<ArtifactStore>,
        deferred: Arc<DeferredDeletionScheduler>,
        grace: Duration,
        transfer_timeout: Duration,
    ) -> Self {
        Self {
            store,
            deferred,
            grace,
            transfer_timeout,
        }
    }

    /// Resolve `id` and open it for transfer.
    ///
    /// `Ok(None)` covers every flavour of "not there": rejected id, never
    /// created, swept, or reclaimed after an earlier download.
    pub async fn get(&self, id: &str) -> Result<Option<Download>, DocForgeError> {
        let Some(artifact) = self.store.resolve(id).await? else {
            return Ok(None);
        };
        let Some(file) = self.store.open_blob(&artifact).await? else {
            debug!("Artifact {} vanished before it could be opened", artifact.id);
            return Ok(None);
        };
        Ok(Some(Download {
            artifact,
            file,
            deferred: Arc::clone(&self.deferred),
            grace: self.grace,
            transfer_timeout: self.transfer_timeout,
        }))
    }
}

/// An artifact opened for one transfer.
#[derive(Debug)]
pub struct Download {
    artifact: Artifact,
    file: File,
    deferred: Arc<DeferredDeletionScheduler>,
    grace: Duration,
    transfer_timeout: Duration,
}

impl Download {
    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    /// Copy the whole artifact into `writer`, then arm deferred deletion.
    ///
    /// Returns the number of bytes written.
    pub async fn send_to<W>(self, writer: &mut W) -> Result<u64, DocForgeError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let Download {
            artifact,
            mut file,
            deferred,
            grace,
            transfer_timeout,
        } = self;
        let id = artifact.id;

        let transfer = async {
            let n = tokio::io::copy(&mut file, writer).await?;
            writer.flush().await?;
            Ok::<u64, std::io::Error>(n)
        };

        let written = match tokio::time::timeout(transfer_timeout, transfer).await {
            Ok(Ok(n)) => n,
            Ok(Err(source)) => {
                warn!("Transfer of {} failed: {}", id, source);
                return Err(DocForgeError::TransferFailed {
                    id: id.to_string(),
                    source,
                });
            }
            Err(_) => {
                warn!("Transfer of {} timed out", id);
                return Err(DocForgeError::TransferTimeout {
                    id: id.to_string(),
                    secs: transfer_timeout.as_secs(),
                });
            }
        };

        info!("Delivered artifact {} ({} bytes)", id, written);
        deferred.arm_once(&id, grace);
        Ok(written)
    }

    /// Turn the download into a chunk stream that arms deferred deletion when
    /// it reaches the end.
    pub fn into_stream(self) -> ByteStream {
        let deadline = Instant::now() + self.transfer_timeout;
        let state = StreamState {
            file: self.file,
            artifact: self.artifact,
            deferred: self.deferred,
            grace: self.grace,
            timeout: self.transfer_timeout,
            deadline,
            delivered: 0,
        };

        let s = stream::unfold(Some(state), |state| async move {
            let mut state = state?;
            let mut buf = vec![0u8; CHUNK_SIZE];
            let id = state.artifact.id.to_string();

            let read = tokio::time::timeout_at(state.deadline, state.file.read(&mut buf)).await;
            match read {
                Ok(Ok(0)) => {
                    info!(
                        "Streamed artifact {} ({} bytes)",
                        state.artifact.id, state.delivered
                    );
                    state.deferred.arm_once(&state.artifact.id, state.grace);
                    None
                }
                Ok(Ok(n)) => {
                    buf.truncate(n);
                    state.delivered += n as u64;
                    Some((Ok(buf), Some(state)))
                }
                Ok(Err(source)) => {
                    warn!("Stream of {} failed: {}", id, source);
                    Some((Err(DocForgeError::TransferFailed { id, source }), None))
                }
                Err(_) => {
                    warn!("Stream of {} timed out", id);
                    let secs = state.timeout.as_secs();
                    Some((Err(DocForgeError::TransferTimeout { id, secs }), None))
                }
            }
        });

        Box::pin(s)
    }
}

struct StreamState {
    file: File,
    artifact: Artifact,
    deferred: Arc<DeferredDeletionScheduler>,
    grace: Duration,
    timeout: Duration,
    deadline: Instant,
    delivered: u64,
}
