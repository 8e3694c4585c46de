//! Assembly requests and their single dispatch point.
//!
//! An [`Operation`] is parsed once from its selector string (`merge`,
//! `layout`, `transcode:<kind>`) and from then on is a closed enum; there is
//! no string matching past this boundary. [`Assembler::execute`] is the only
//! place that maps an operation to an assembler function.

use crate::artifact::ContentKind;
use crate::assembler::codec::DocumentCodec;
use crate::assembler::layout::{layout_text_to_pages, PageGeometry};
use crate::assembler::merge::merge_documents;
use crate::assembler::raster::{transcode_raster, RasterCodec, RasterKind};
use crate::error::DocForgeError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// What to do with a request's inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "target", rename_all = "lowercase")]
pub enum Operation {
    /// Concatenate two or more PDFs.
    Merge,
    /// Convert one raster image to the given kind.
    Transcode(RasterKind),
    /// Paginate one UTF-8 text into a PDF.
    Layout,
}

impl Operation {
    /// Content kind of the artifact this operation produces.
    pub fn output_kind(self) -> ContentKind {
        match self {
            Operation::Merge | Operation::Layout => ContentKind::Pdf,
            Operation::Transcode(target) => target.content_kind(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Merge => f.write_str("merge"),
            Operation::Layout => f.write_str("layout"),
            Operation::Transcode(kind) => write!(f, "transcode:{}", kind),
        }
    }
}

impl FromStr for Operation {
    type Err = DocForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once(':') {
            Some((op, target)) if op.eq_ignore_ascii_case("transcode") => {
                Ok(Operation::Transcode(target.parse()?))
            }
            None if s.eq_ignore_ascii_case("merge") => Ok(Operation::Merge),
            None if s.eq_ignore_ascii_case("layout") => Ok(Operation::Layout),
            _ => Err(DocForgeError::UnknownOperation {
                operation: s.to_string(),
            }),
        }
    }
}

/// Raw inputs plus the operation to run on them.
#[derive(Debug, Clone)]
pub struct AssemblyRequest {
    pub operation: Operation,
    pub inputs: Vec<Vec<u8>>,
    /// Declared kind of a transcode input. Checked against the bytes.
    pub source_kind: Option<RasterKind>,
}

impl AssemblyRequest {
    pub fn new(operation: Operation, inputs: Vec<Vec<u8>>) -> Self {
        Self {
            operation,
            inputs,
            source_kind: None,
        }
    }

    pub fn merge(documents: Vec<Vec<u8>>) -> Self {
        Self::new(Operation::Merge, documents)
    }

    pub fn layout(text: impl Into<String>) -> Self {
        Self::new(Operation::Layout, vec![text.into().into_bytes()])
    }

    pub fn transcode(image: Vec<u8>, target: RasterKind) -> Self {
        Self::new(Operation::Transcode(target), vec![image])
    }

    pub fn with_source_kind(mut self, kind: RasterKind) -> Self {
        self.source_kind = Some(kind);
        self
    }

    fn single_input(&self) -> Result<&[u8], DocForgeError> {
        match self.inputs.as_slice() {
            [only] => Ok(only),
            other => Err(DocForgeError::WrongInputCount {
                operation: match self.operation {
                    Operation::Layout => "layout",
                    _ => "transcode",
                },
                expected: 1,
                got: other.len(),
            }),
        }
    }
}

/// Bytes produced by one operation, ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyOutput {
    pub bytes: Vec<u8>,
    pub content_kind: ContentKind,
    /// Pages in the output, for document operations.
    pub page_count: Option<usize>,
}

/// Runs operations against a pair of codecs.
///
/// Synchronous and CPU-bound; call from a blocking thread.
#[derive(Clone)]
pub struct Assembler {
    documents: Arc<dyn DocumentCodec>,
    rasters: Arc<dyn RasterCodec>,
    geometry: PageGeometry,
    jpeg_quality: u8,
}

impl fmt::Debug for Assembler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assembler")
            .field("geometry", &self.geometry)
            .field("jpeg_quality", &self.jpeg_quality)
            .finish()
    }
}

impl Assembler {
    pub fn new(
        documents: Arc<dyn DocumentCodec>,
        rasters: Arc<dyn RasterCodec>,
        geometry: PageGeometry,
        jpeg_quality: u8,
    ) -> Self {
        Self {
            documents,
            rasters,
            geometry,
            jpeg_quality,
        }
    }

    pub fn execute(&self, request: &AssemblyRequest) -> Result<AssemblyOutput, DocForgeError> {
        debug!(
            "Executing {} on {} input(s)",
            request.operation,
            request.inputs.len()
        );
        let content_kind = request.operation.output_kind();

        match request.operation {
            Operation::Merge => {
                let merged = merge_documents(self.documents.as_ref(), &request.inputs)?;
                Ok(AssemblyOutput {
                    bytes: merged.bytes,
                    content_kind,
                    page_count: Some(merged.page_count),
                })
            }
            Operation::Layout => {
                let raw = request.single_input()?;
                let text = std::str::from_utf8(raw).map_err(|e| DocForgeError::MalformedText {
                    reason: format!("not UTF-8: {}", e),
                })?;
                let layout = layout_text_to_pages(text, &self.geometry)?;
                let bytes = self.documents.render_layout(&layout)?;
                Ok(AssemblyOutput {
                    bytes,
                    content_kind,
                    page_count: Some(layout.pages.len()),
                })
            }
            Operation::Transcode(target) => {
                let raw = request.single_input()?;
                let bytes = transcode_raster(
                    self.rasters.as_ref(),
                    raw,
                    request.source_kind,
                    target,
                    self.jpeg_quality,
                )?;
                Ok(AssemblyOutput {
                    bytes,
                    content_kind,
                    page_count: None,
                })
            }
        }
    }
}
