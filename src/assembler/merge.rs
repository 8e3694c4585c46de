//! Document merge: concatenate the pages of several PDFs in input order.

use crate::assembler::codec::DocumentCodec;
use crate::error::DocForgeError;
use serde::Serialize;
use tracing::info;

/// Leading bytes of every PDF file.
pub const PDF_MAGIC: &[u8] = b"%PDF";

/// A merged document and where its pages came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergedDocument {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub page_count: usize,
    /// Pages contributed by each input, in input order.
    pub source_page_counts: Vec<usize>,
}

/// Check the `%PDF` magic of input `index`.
pub fn ensure_pdf(index: usize, bytes: &[u8]) -> Result<(), DocForgeError> {
    if bytes.starts_with(PDF_MAGIC) {
        return Ok(());
    }
    Err(DocForgeError::InvalidContentKind {
        index,
        expected: "PDF document",
        magic: bytes.iter().take(PDF_MAGIC.len()).copied().collect(),
    })
}

/// Merge `documents` into one, first input's pages first.
///
/// Every input is validated before the codec sees any of them, so a bad
/// input never produces partial output.
///
/// # Errors
/// - [`DocForgeError::TooFewInputs`] for fewer than two documents.
/// - [`DocForgeError::InvalidContentKind`] for an input without `%PDF` magic.
/// - [`DocForgeError::DocumentCodec`] when the codec cannot open or write.
pub fn merge_documents<D: AsRef<[u8]>>(
    codec: &dyn DocumentCodec,
    documents: &[D],
) -> Result<MergedDocument, DocForgeError> {
    if documents.len() < 2 {
        return Err(DocForgeError::TooFewInputs {
            got: documents.len(),
        });
    }
    for (index, doc) in documents.iter().enumerate() {
        ensure_pdf(index, doc.as_ref())?;
    }

    let sources: Vec<&[u8]> = documents.iter().map(AsRef::as_ref).collect();
    let out = codec.concatenate(&sources)?;

    if out.page_counts.len() != documents.len() {
        return Err(DocForgeError::Internal(format!(
            "codec reported pages for {} of {} inputs",
            out.page_counts.len(),
            documents.len()
        )));
    }

    let page_count = out.page_counts.iter().sum();
    info!(
        "Merged {} documents → {} pages ({} bytes)",
        documents.len(),
        page_count,
        out.bytes.len()
    );

    Ok(MergedDocument {
        bytes: out.bytes,
        page_count,
        source_page_counts: out.page_counts,
    })
}
