//! Document assembly: the operations that produce artifacts.
//!
//! All three are pure, synchronous functions over byte buffers. Nothing here
//! touches the store; the service persists the output only after an
//! operation has fully succeeded.
//!
//! ```text
//! merge      [pdf, pdf, ...] ──▶ codec.concatenate ──▶ pdf
//! layout     text ──▶ layout_text_to_pages ──▶ codec.render_layout ──▶ pdf
//! transcode  raster ──▶ decode ──▶ encode(target) ──▶ raster
//! ```
//!
//! 1. [`merge`]: validate `%PDF` magic, then append pages in input order
//! 2. [`layout`]: greedy word wrap and pagination, independent of any codec
//! 3. [`raster`]: PNG / JPEG / WebP conversion via the `image` crate
//! 4. [`codec`]: the [`codec::DocumentCodec`] seam and its pdfium backend

pub mod codec;
pub mod layout;
pub mod merge;
pub mod raster;

pub use codec::{ConcatenatedDocument, DocumentCodec, PdfiumCodec};
pub use layout::{layout_text_to_pages, LayoutLine, LayoutPage, PageGeometry, TextLayout};
pub use merge::{merge_documents, MergedDocument};
pub use raster::{transcode_raster, EncodeParams, ImageRasterCodec, RasterCodec, RasterKind};
