//! Raster transcoding between PNG, JPEG and WebP.
//!
//! JPEG is encoded lossy at the requested quality. PNG and WebP are encoded
//! lossless; the WebP encoder shipped with `image` has no lossy mode, so the
//! quality setting is ignored for it.

use crate::artifact::ContentKind;
use crate::error::DocForgeError;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;
use tracing::debug;

/// Raster formats the assembler reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterKind {
    Png,
    Jpeg,
    Webp,
}

impl RasterKind {
    pub fn name(self) -> &'static str {
        match self {
            RasterKind::Png => "png",
            RasterKind::Jpeg => "jpeg",
            RasterKind::Webp => "webp",
        }
    }

    pub fn image_format(self) -> ImageFormat {
        match self {
            RasterKind::Png => ImageFormat::Png,
            RasterKind::Jpeg => ImageFormat::Jpeg,
            RasterKind::Webp => ImageFormat::WebP,
        }
    }

    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(RasterKind::Png),
            ImageFormat::Jpeg => Some(RasterKind::Jpeg),
            ImageFormat::WebP => Some(RasterKind::Webp),
            _ => None,
        }
    }

    pub fn content_kind(self) -> ContentKind {
        match self {
            RasterKind::Png => ContentKind::Png,
            RasterKind::Jpeg => ContentKind::Jpeg,
            RasterKind::Webp => ContentKind::Webp,
        }
    }

    /// Encoder settings for this target at `quality`.
    pub fn encode_params(self, quality: u8) -> EncodeParams {
        match self {
            RasterKind::Jpeg => EncodeParams::Lossy {
                quality: quality.clamp(1, 100),
            },
            RasterKind::Png | RasterKind::Webp => EncodeParams::Lossless,
        }
    }
}

impl fmt::Display for RasterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RasterKind {
    type Err = DocForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(RasterKind::Png),
            "jpeg" | "jpg" => Ok(RasterKind::Jpeg),
            "webp" => Ok(RasterKind::Webp),
            _ => Err(DocForgeError::UnsupportedRasterKind {
                kind: s.to_string(),
            }),
        }
    }
}

/// How a target kind is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeParams {
    Lossless,
    Lossy { quality: u8 },
}

/// Decodes and encodes raster images.
pub trait RasterCodec: Send + Sync {
    /// Identify the format of `bytes` from their signature.
    fn sniff(&self, bytes: &[u8]) -> Option<RasterKind>;

    fn decode(&self, bytes: &[u8], kind: RasterKind) -> Result<DynamicImage, DocForgeError>;

    fn encode(
        &self,
        image: &DynamicImage,
        kind: RasterKind,
        params: EncodeParams,
    ) -> Result<Vec<u8>, DocForgeError>;
}

/// [`RasterCodec`] backed by the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageRasterCodec;

fn raster_error(e: image::ImageError) -> DocForgeError {
    DocForgeError::RasterCodec {
        detail: e.to_string(),
    }
}

impl RasterCodec for ImageRasterCodec {
    fn sniff(&self, bytes: &[u8]) -> Option<RasterKind> {
        image::guess_format(bytes)
            .ok()
            .and_then(RasterKind::from_image_format)
    }

    fn decode(&self, bytes: &[u8], kind: RasterKind) -> Result<DynamicImage, DocForgeError> {
        image::load_from_memory_with_format(bytes, kind.image_format()).map_err(raster_error)
    }

    fn encode(
        &self,
        image: &DynamicImage,
        kind: RasterKind,
        params: EncodeParams,
    ) -> Result<Vec<u8>, DocForgeError> {
        let mut buf = Vec::new();
        match (kind, params) {
            (RasterKind::Jpeg, EncodeParams::Lossy { quality }) => {
                // JPEG has no alpha channel.
                let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
                rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))
                    .map_err(raster_error)?;
            }
            (RasterKind::Webp, _) => {
                let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
                rgba.write_with_encoder(WebPEncoder::new_lossless(&mut buf))
                    .map_err(raster_error)?;
            }
            (kind, _) => {
                image
                    .write_to(&mut Cursor::new(&mut buf), kind.image_format())
                    .map_err(raster_error)?;
            }
        }
        Ok(buf)
    }
}

/// Decode `bytes` and re-encode them as `target`.
///
/// When `source` is given it must match what the bytes actually are.
///
/// # Errors
/// - [`DocForgeError::InvalidContentKind`] when the bytes are not a
///   supported raster or disagree with `source`.
/// - [`DocForgeError::RasterCodec`] when decoding or encoding fails.
pub fn transcode_raster(
    codec: &dyn RasterCodec,
    bytes: &[u8],
    source: Option<RasterKind>,
    target: RasterKind,
    quality: u8,
) -> Result<Vec<u8>, DocForgeError> {
    let magic = || bytes.iter().take(8).copied().collect::<Vec<u8>>();

    let sniffed = codec
        .sniff(bytes)
        .ok_or_else(|| DocForgeError::InvalidContentKind {
            index: 0,
            expected: source.map(RasterKind::name).unwrap_or("raster image"),
            magic: magic(),
        })?;

    if let Some(declared) = source {
        if declared != sniffed {
            return Err(DocForgeError::InvalidContentKind {
                index: 0,
                expected: declared.name(),
                magic: magic(),
            });
        }
    }

    let image = codec.decode(bytes, sniffed)?;
    let params = target.encode_params(quality);
    let out = codec.encode(&image, target, params)?;

    debug!(
        "Transcoded {}x{} {} → {} ({} → {} bytes)",
        image.width(),
        image.height(),
        sniffed,
        target,
        bytes.len(),
        out.len()
    );
    Ok(out)
}
