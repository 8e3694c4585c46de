//! The `DocForge` facade: one object owning the store, both schedulers, the
//! gateway and the assembler.
//!
//! ```text
//! assemble(request) ──▶ Assembler::execute (spawn_blocking) ──▶ store.create ──▶ receipt
//! retrieve(id)      ──▶ gateway.get ──▶ Download ──▶ (transfer) ──▶ deferred.arm_once
//! start_sweeper()   ──▶ SweepScheduler::spawn (every sweep_interval)
//! ```
//!
//! Nothing is persisted until an operation has fully succeeded, so a
//! validation or codec failure leaves the store untouched.

use crate::artifact::Artifact;
use crate::assembler::codec::{DocumentCodec, PdfiumCodec};
use crate::assembler::raster::{ImageRasterCodec, RasterCodec};
use crate::clock::{SystemTimeSource, TimeSource};
use crate::config::ForgeConfig;
use crate::deferred::DeferredDeletionScheduler;
use crate::error::DocForgeError;
use crate::gateway::{Download, RetrievalGateway};
use crate::request::{Assembler, AssemblyRequest, Operation};
use crate::store::{ArtifactStore, StoredArtifact};
use crate::sweep::{SweepReport, SweepScheduler};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// What a client gets back from a successful assembly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssemblyReceipt {
    #[serde(flatten)]
    pub artifact: Artifact,
    pub operation: Operation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
    pub duration_ms: u64,
}

/// Artifact lifecycle manager and document assembler.
#[derive(Debug)]
pub struct DocForge {
    config: ForgeConfig,
    assembler: Arc<Assembler>,
    store: Arc<ArtifactStore>,
    deferred: Arc<DeferredDeletionScheduler>,
    sweeper: Arc<SweepScheduler>,
    gateway: RetrievalGateway,
}

impl DocForge {
    /// Open with the production codecs and the system clock.
    pub async fn open(config: ForgeConfig) -> Result<Self, DocForgeError> {
        let documents = Arc::new(PdfiumCodec::new(config.pdfium_library_path.clone()));
        Self::with_parts(
            config,
            documents,
            Arc::new(ImageRasterCodec),
            Arc::new(SystemTimeSource),
        )
        .await
    }

    /// Open with explicit collaborators.
    pub async fn with_parts(
        config: ForgeConfig,
        documents: Arc<dyn DocumentCodec>,
        rasters: Arc<dyn RasterCodec>,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self, DocForgeError> {
        let store = Arc::new(ArtifactStore::open(&config.store_root, clock).await?);
        let deferred = Arc::new(DeferredDeletionScheduler::new(Arc::clone(&store)));
        let sweeper = Arc::new(
            SweepScheduler::new(
                Arc::clone(&store),
                config.artifact_ttl,
                config.sweep_interval,
            )
            .with_deferred(Arc::clone(&deferred)),
        );
        let gateway = RetrievalGateway::new(
            Arc::clone(&store),
            Arc::clone(&deferred),
            config.download_grace,
            config.transfer_timeout,
        );
        let assembler = Arc::new(Assembler::new(
            documents,
            rasters,
            config.page,
            config.jpeg_quality,
        ));

        info!(
            "DocForge ready: store={}, ttl={}s, sweep every {}s, grace {}s",
            config.store_root.display(),
            config.artifact_ttl.as_secs(),
            config.sweep_interval.as_secs(),
            config.download_grace.as_secs()
        );

        Ok(Self {
            config,
            assembler,
            store,
            deferred,
            sweeper,
            gateway,
        })
    }

    /// Start the background sweep loop. Abort the handle to stop it.
    pub fn start_sweeper(&self) -> JoinHandle<()> {
        self.sweeper.spawn()
    }

    /// Run the operation and persist its output as a new artifact.
    ///
    /// # Errors
    /// Validation and codec errors from the operation; nothing is stored.
    /// [`DocForgeError::ArtifactWriteFailed`] if persisting fails.
    pub async fn assemble(
        &self,
        request: AssemblyRequest,
    ) -> Result<AssemblyReceipt, DocForgeError> {
        let start = Instant::now();
        let operation = request.operation;
        let assembler = Arc::clone(&self.assembler);

        let output = tokio::task::spawn_blocking(move || assembler.execute(&request))
            .await
            .map_err(|e| DocForgeError::Internal(format!("Assembly task panicked: {}", e)))??;

        let artifact = self.store.create(output.content_kind, output.bytes).await?;
        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Assembled {} → {} in {}ms",
            operation, artifact.id, duration_ms
        );

        Ok(AssemblyReceipt {
            artifact,
            operation,
            page_count: output.page_count,
            duration_ms,
        })
    }

    /// Open an artifact for download.
    ///
    /// # Errors
    /// [`DocForgeError::NotFound`] for unknown, rejected, or reclaimed ids.
    pub async fn retrieve(&self, id: &str) -> Result<Download, DocForgeError> {
        match self.gateway.get(id).await? {
            Some(download) => Ok(download),
            None => {
                debug!("Retrieval of {:?}: not found", id);
                Err(DocForgeError::NotFound { id: id.to_string() })
            }
        }
    }

    /// Run one sweep pass now, outside the background loop.
    pub async fn sweep_now(&self) -> SweepReport {
        self.sweeper.run_pass().await
    }

    pub async fn list(&self) -> Result<Vec<StoredArtifact>, DocForgeError> {
        self.store.list().await
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    pub fn deferred(&self) -> &Arc<DeferredDeletionScheduler> {
        &self.deferred
    }

    pub fn sweeper(&self) -> &Arc<SweepScheduler> {
        &self.sweeper
    }

    pub fn gateway(&self) -> &RetrievalGateway {
        &self.gateway
    }
}
