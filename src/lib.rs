//! # edgequake-docforge
//!
//! Assemble documents on request and keep the results only as long as
//! somebody needs them.
//!
//! ## Why this crate?
//!
//! Services that merge PDFs, typeset text or convert images for a client
//! produce files that are downloaded once and never looked at again. Keeping
//! them costs disk; deleting them immediately breaks slow or retried
//! downloads. This crate stores each output as an *ephemeral artifact* and
//! reclaims it through whichever of two triggers fires first:
//!
//! - a **sweep** every 5 minutes removes anything older than 30 minutes;
//! - a **deferred deletion** removes an artifact 5 minutes after its first
//!   complete download.
//!
//! ## Lifecycle
//!
//! ```text
//! request ──▶ assemble (merge | layout | transcode) ──▶ store.create ──▶ id
//!                                                                      │
//!   client ──▶ retrieve(id) ──▶ stream bytes ──▶ arm_once(id, 5 min) ◀─┘
//!                                                      │
//!           sweep (age ≥ 30 min) ──┬───────────────────┘
//!                                  ▼
//!                               deleted
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docforge::{AssemblyRequest, DocForge, ForgeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let forge = DocForge::open(ForgeConfig::default()).await?;
//!     let _sweeper = forge.start_sweeper();
//!
//!     let receipt = forge
//!         .assemble(AssemblyRequest::layout("Hello from docforge"))
//!         .await?;
//!     println!("stored {}", receipt.artifact.id);
//!
//!     let download = forge.retrieve(receipt.artifact.id.as_str()).await?;
//!     let mut out = tokio::io::stdout();
//!     download.send_to(&mut out).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docforge` binary and [`input`] loading of local or URL inputs (clap + anyhow + tracing-subscriber + reqwest) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-docforge = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod artifact;
pub mod assembler;
pub mod clock;
pub mod config;
pub mod deferred;
pub mod error;
pub mod gateway;
#[cfg(feature = "cli")]
pub mod input;
pub mod request;
pub mod service;
pub mod store;
pub mod sweep;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use artifact::{Artifact, ArtifactId, ContentKind};
pub use assembler::{
    layout_text_to_pages, merge_documents, transcode_raster, DocumentCodec, ImageRasterCodec,
    PageGeometry, PdfiumCodec, RasterCodec, RasterKind, TextLayout,
};
pub use clock::{SystemTimeSource, TimeSource};
pub use config::{ForgeConfig, ForgeConfigBuilder};
pub use deferred::{ArmState, DeferredDeletionScheduler};
pub use error::DocForgeError;
pub use gateway::{ByteStream, Download, RetrievalGateway};
pub use request::{Assembler, AssemblyOutput, AssemblyRequest, Operation};
pub use service::{AssemblyReceipt, DocForge};
pub use store::{ArtifactStore, BlobRemover, FsBlobRemover, StoredArtifact};
pub use sweep::{SweepReport, SweepScheduler};
