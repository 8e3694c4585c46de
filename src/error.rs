//! Error types for the edgequake-docforge library.
//!
//! A single enum, [`DocForgeError`], covers every failure the core can
//! report. Variants are grouped by how a caller is expected to react:
//!
//! * **Validation**: the request itself is wrong (bad content kind, too few
//!   merge inputs, unsupported transcode target, malformed text). Nothing was
//!   persisted; retrying the same request will fail again.
//! * **Lookup**: the artifact does not exist (never created, already swept,
//!   already reclaimed after download). This is an expected outcome and is
//!   never logged as a failure.
//! * **I/O and codec**: the environment failed. Creation failures surface to
//!   the caller; deletion failures on the background paths are logged and
//!   swallowed by the schedulers and never reach this type's callers.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-docforge library.
#[derive(Debug, Error)]
pub enum DocForgeError {
    // ── Validation errors ─────────────────────────────────────────────────
    /// An input does not carry the content kind the operation expects.
    #[error("Input {index} is not a valid {expected}: first bytes {magic:?}")]
    InvalidContentKind {
        index: usize,
        expected: &'static str,
        magic: Vec<u8>,
    },

    /// Merge needs at least two documents.
    #[error("Merge requires at least 2 documents, got {got}")]
    TooFewInputs { got: usize },

    /// The operation takes a fixed number of inputs.
    #[error("Operation '{operation}' takes exactly {expected} input(s), got {got}")]
    WrongInputCount {
        operation: &'static str,
        expected: usize,
        got: usize,
    },

    /// Transcode target (or declared source) is outside the supported set.
    #[error("Unsupported raster kind '{kind}'\nSupported: png, jpeg, webp")]
    UnsupportedRasterKind { kind: String },

    /// Operation selector string could not be parsed.
    #[error("Unknown operation '{operation}'\nExpected: merge, layout, transcode:<png|jpeg|webp>")]
    UnknownOperation { operation: String },

    /// Text input cannot be laid out.
    #[error("Malformed text input: {reason}")]
    MalformedText { reason: String },

    // ── Lookup errors ─────────────────────────────────────────────────────
    /// The requested artifact is unknown, already deleted, or the id was
    /// rejected by the allow-list.
    #[error("Artifact '{id}' not found")]
    NotFound { id: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// The store root could not be created or scanned.
    #[error("Artifact store at '{path}' is unavailable: {source}")]
    StoreUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing a new artifact failed; nothing became visible.
    #[error("Failed to write artifact '{id}': {source}")]
    ArtifactWriteFailed {
        id: String,
        #[source]
        source: std::io::Error,
    },

    /// Unlinking an artifact failed for a reason other than absence.
    #[error("Failed to delete artifact '{id}': {source}")]
    ArtifactDeleteFailed {
        id: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading an artifact or writing it to the caller failed mid-transfer.
    #[error("Transfer of artifact '{id}' failed: {source}")]
    TransferFailed {
        id: String,
        #[source]
        source: std::io::Error,
    },

    /// The transfer did not finish within the configured bound.
    #[error("Transfer of artifact '{id}' timed out after {secs}s")]
    TransferTimeout { id: String, secs: u64 },

    /// Caller-side input could not be loaded (missing file, failed download,
    /// over the size cap).
    #[error("Failed to load input '{input}': {reason}")]
    InputUnavailable { input: String, reason: String },

    // ── Codec errors ──────────────────────────────────────────────────────
    /// The document codec rejected or failed on an input.
    #[error("Document codec failed: {detail}")]
    DocumentCodec { detail: String },

    /// The raster codec failed to decode or encode an image.
    #[error("Raster codec failed: {detail}")]
    RasterCodec { detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Place libpdfium next to the executable, install it system-wide,\n\
or set DOCFORGE_PDFIUM_PATH to the directory containing it.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DocForgeError {
    /// True for errors caused by the request itself. Nothing was persisted.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DocForgeError::InvalidContentKind { .. }
                | DocForgeError::TooFewInputs { .. }
                | DocForgeError::WrongInputCount { .. }
                | DocForgeError::UnsupportedRasterKind { .. }
                | DocForgeError::UnknownOperation { .. }
                | DocForgeError::MalformedText { .. }
        )
    }

    /// True when the artifact simply is not there.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DocForgeError::NotFound { .. })
    }
}
