//! Document codec: the seam between assembly logic and a PDF engine.
//!
//! The assembler never touches PDF internals. It hands raw bytes and laid-out
//! pages to a [`DocumentCodec`] and gets serialized PDF bytes back. The
//! production implementation is [`PdfiumCodec`]; tests substitute an
//! in-memory fake.
//!
//! ## Why bind per call?
//!
//! pdfium keeps thread-local state and the codec always runs inside
//! `spawn_blocking`, on whichever pool thread is free. Binding at the start
//! of each call keeps every pdfium handle on the thread that created it.

use crate::assembler::layout::TextLayout;
use crate::error::DocForgeError;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use tracing::debug;

/// Output of [`DocumentCodec::concatenate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcatenatedDocument {
    pub bytes: Vec<u8>,
    /// Pages contributed by each input, in input order.
    pub page_counts: Vec<usize>,
}

/// Opens documents as page sources and writes new documents.
///
/// Implementations are synchronous; callers run them on a blocking thread.
pub trait DocumentCodec: Send + Sync {
    /// Append every page of every source, in order, to one new document.
    fn concatenate(&self, sources: &[&[u8]]) -> Result<ConcatenatedDocument, DocForgeError>;

    /// Write a document with one page per layout page and each non-empty
    /// line drawn at its baseline.
    fn render_layout(&self, layout: &TextLayout) -> Result<Vec<u8>, DocForgeError>;
}

/// [`DocumentCodec`] backed by the pdfium library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumCodec {
    library_dir: Option<PathBuf>,
}

impl PdfiumCodec {
    /// `library_dir` is searched for the platform's libpdfium first; when
    /// `None`, the working directory and then the system search path are used.
    pub fn new(library_dir: Option<PathBuf>) -> Self {
        Self { library_dir }
    }

    fn bind(&self) -> Result<Pdfium, DocForgeError> {
        let bindings = match &self.library_dir {
            Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| DocForgeError::PdfiumBindingFailed(format!("{:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }
}

fn codec_error(context: &'static str) -> impl Fn(PdfiumError) -> DocForgeError {
    move |e| DocForgeError::DocumentCodec {
        detail: format!("{}: {:?}", context, e),
    }
}

impl DocumentCodec for PdfiumCodec {
    fn concatenate(&self, sources: &[&[u8]]) -> Result<ConcatenatedDocument, DocForgeError> {
        let pdfium = self.bind()?;
        let mut merged = pdfium
            .create_new_pdf()
            .map_err(codec_error("create output document"))?;

        let mut page_counts = Vec::with_capacity(sources.len());
        for (index, bytes) in sources.iter().enumerate() {
            let source = pdfium.load_pdf_from_byte_slice(bytes, None).map_err(|e| {
                DocForgeError::DocumentCodec {
                    detail: format!("input {} could not be opened: {:?}", index, e),
                }
            })?;
            let pages = source.pages().len() as usize;

            merged
                .pages_mut()
                .append(&source)
                .map_err(codec_error("append pages"))?;

            debug!("Appended input {} → {} pages", index, pages);
            page_counts.push(pages);
        }

        let bytes = merged
            .save_to_bytes()
            .map_err(codec_error("serialize merged document"))?;
        Ok(ConcatenatedDocument { bytes, page_counts })
    }

    fn render_layout(&self, layout: &TextLayout) -> Result<Vec<u8>, DocForgeError> {
        let pdfium = self.bind()?;
        let mut document = pdfium
            .create_new_pdf()
            .map_err(codec_error("create output document"))?;

        let g = layout.geometry;
        let font = document.fonts_mut().helvetica();

        for (index, laid_out) in layout.pages.iter().enumerate() {
            let mut page = document
                .pages_mut()
                .create_page_at_end(PdfPagePaperSize::Custom(
                    PdfPoints::new(g.width),
                    PdfPoints::new(g.height),
                ))
                .map_err(codec_error("create page"))?;

            for line in laid_out.lines.iter().filter(|l| !l.text.is_empty()) {
                page.objects_mut()
                    .create_text_object(
                        PdfPoints::new(g.margin),
                        PdfPoints::new(line.y),
                        &line.text,
                        font,
                        PdfPoints::new(g.font_size),
                    )
                    .map_err(codec_error("draw text"))?;
            }

            debug!("Rendered page {} → {} lines", index + 1, laid_out.lines.len());
        }

        document
            .save_to_bytes()
            .map_err(codec_error("serialize text document"))
    }
}
