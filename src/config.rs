//! Configuration for the artifact lifecycle and the assembler.
//!
//! All behaviour is controlled through [`ForgeConfig`], built via its
//! [`ForgeConfigBuilder`]. The defaults are the production constants:
//! artifacts live at most 30 minutes, the sweeper wakes every 5 minutes, and
//! a successful download reclaims the artifact 5 minutes later.

use crate::assembler::layout::PageGeometry;
use crate::error::DocForgeError;
use std::path::PathBuf;
use std::time::Duration;

/// Maximum age before an artifact becomes eligible for sweep.
pub const DEFAULT_ARTIFACT_TTL: Duration = Duration::from_secs(30 * 60);

/// Pause between two sweep passes.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Grace period between a successful download and deferred deletion.
pub const DEFAULT_DOWNLOAD_GRACE: Duration = Duration::from_secs(5 * 60);

/// Upper bound on a single artifact transfer.
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(120);

/// Encode quality used for lossy raster targets.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Largest input the caller accepts per document. Enforced by the caller
/// (the CLI input loader), not by the assembler or the store.
pub const MAX_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// Configuration for a [`crate::DocForge`] instance.
///
/// # Example
/// ```rust
/// use edgequake_docforge::ForgeConfig;
/// use std::time::Duration;
///
/// let config = ForgeConfig::builder()
///     .store_root("/tmp/docforge")
///     .download_grace(Duration::from_secs(60))
///     .build()
///     .unwrap();
/// assert_eq!(config.artifact_ttl, Duration::from_secs(1800));
/// ```
#[derive(Debug, Clone)]
pub struct ForgeConfig {
    /// Directory holding artifact blobs. Created on open.
    pub store_root: PathBuf,

    /// Age at which the sweeper deletes an artifact. Default: 30 min.
    pub artifact_ttl: Duration,

    /// Interval between sweep passes. Default: 5 min.
    pub sweep_interval: Duration,

    /// Delay between a completed download and deletion. Default: 5 min.
    pub download_grace: Duration,

    /// Bound on one transfer, from first read to last write. Default: 120 s.
    pub transfer_timeout: Duration,

    /// Quality (1–100) for lossy raster targets. Default: 90.
    pub jpeg_quality: u8,

    /// Page geometry for the text layout operation. Default: A4 portrait.
    pub page: PageGeometry,

    /// Directory containing libpdfium. If None, the working directory is tried
    /// first, then the system library search path.
    pub pdfium_library_path: Option<PathBuf>,

    /// Per-input size cap applied by callers. Default: 10 MiB.
    pub max_input_bytes: usize,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            store_root: std::env::temp_dir().join("docforge-artifacts"),
            artifact_ttl: DEFAULT_ARTIFACT_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            download_grace: DEFAULT_DOWNLOAD_GRACE,
            transfer_timeout: DEFAULT_TRANSFER_TIMEOUT,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            page: PageGeometry::default(),
            pdfium_library_path: None,
            max_input_bytes: MAX_INPUT_BYTES,
        }
    }
}

impl ForgeConfig {
    /// Create a new builder for `ForgeConfig`.
    pub fn builder() -> ForgeConfigBuilder {
        ForgeConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ForgeConfig`].
#[derive(Debug)]
pub struct ForgeConfigBuilder {
    config: ForgeConfig,
}

impl ForgeConfigBuilder {
    pub fn store_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.store_root = root.into();
        self
    }

    pub fn artifact_ttl(mut self, ttl: Duration) -> Self {
        self.config.artifact_ttl = ttl;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    pub fn download_grace(mut self, grace: Duration) -> Self {
        self.config.download_grace = grace;
        self
    }

    pub fn transfer_timeout(mut self, timeout: Duration) -> Self {
        self.config.transfer_timeout = timeout;
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality;
        self
    }

    pub fn page(mut self, page: PageGeometry) -> Self {
        self.config.page = page;
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn max_input_bytes(mut self, n: usize) -> Self {
        self.config.max_input_bytes = n;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ForgeConfig, DocForgeError> {
        let c = &self.config;
        for (name, value) in [
            ("artifact_ttl", c.artifact_ttl),
            ("sweep_interval", c.sweep_interval),
            ("transfer_timeout", c.transfer_timeout),
        ] {
            if value.is_zero() {
                return Err(DocForgeError::InvalidConfig(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        if !(1..=100).contains(&c.jpeg_quality) {
            return Err(DocForgeError::InvalidConfig(format!(
                "jpeg_quality must be between 1 and 100, got {}",
                c.jpeg_quality
            )));
        }
        if c.max_input_bytes == 0 {
            return Err(DocForgeError::InvalidConfig(
                "max_input_bytes must be ≥ 1".into(),
            ));
        }
        c.page.validate().map_err(|e| {
            DocForgeError::InvalidConfig(format!("page geometry: {e}"))
        })?;
        Ok(self.config)
    }
}
