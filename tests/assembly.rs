//! Assembly through the `DocForge` facade with an in-memory document codec.
//!
//! The fake codec treats `%PDF` followed by newline-separated chunks as a
//! document whose pages are those chunks, which makes page order directly
//! observable in the merged bytes. Raster tests use the real `image` codec.

use edgequake_docforge::assembler::ConcatenatedDocument;
use edgequake_docforge::{
    AssemblyRequest, ContentKind, DocForge, DocForgeError, DocumentCodec, ForgeConfig,
    ImageRasterCodec, Operation, RasterKind, SystemTimeSource, TextLayout,
};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

struct PageListCodec;

impl DocumentCodec for PageListCodec {
    fn concatenate(&self, sources: &[&[u8]]) -> Result<ConcatenatedDocument, DocForgeError> {
        let mut bytes = b"%PDF".to_vec();
        let mut page_counts = Vec::with_capacity(sources.len());
        for src in sources {
            let pages: Vec<&[u8]> = src[4..]
                .split(|b| *b == b'\n')
                .filter(|p| !p.is_empty())
                .collect();
            page_counts.push(pages.len());
            for page in pages {
                bytes.push(b'\n');
                bytes.extend_from_slice(page);
            }
        }
        Ok(ConcatenatedDocument { bytes, page_counts })
    }

    fn render_layout(&self, layout: &TextLayout) -> Result<Vec<u8>, DocForgeError> {
        let mut out = String::from("%PDF");
        for page in &layout.pages {
            out.push('\n');
            let lines: Vec<&str> = page.lines.iter().map(|l| l.text.as_str()).collect();
            out.push_str(&lines.join(" / "));
        }
        Ok(out.into_bytes())
    }
}

async fn forge(dir: &TempDir) -> DocForge {
    let config = ForgeConfig::builder()
        .store_root(dir.path())
        .build()
        .unwrap();
    DocForge::with_parts(
        config,
        Arc::new(PageListCodec),
        Arc::new(ImageRasterCodec),
        Arc::new(SystemTimeSource),
    )
    .await
    .unwrap()
}

async fn fetch(forge: &DocForge, id: &str) -> Vec<u8> {
    let mut sink = Vec::new();
    forge
        .retrieve(id)
        .await
        .unwrap()
        .send_to(&mut sink)
        .await
        .unwrap();
    sink
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
        Rgba([x as u8, y as u8, 200, 255])
    }));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

// ── Merge ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn merge_keeps_input_and_page_order() {
    let dir = TempDir::new().unwrap();
    let forge = forge(&dir).await;

    let receipt = forge
        .assemble(AssemblyRequest::merge(vec![
            b"%PDF\na1\na2\na3".to_vec(),
            b"%PDF\nb1\nb2".to_vec(),
        ]))
        .await
        .unwrap();

    assert_eq!(receipt.page_count, Some(5));
    assert_eq!(receipt.operation, Operation::Merge);
    assert_eq!(receipt.artifact.content_kind, ContentKind::Pdf);
    assert!(receipt.artifact.id.as_str().ends_with(".pdf"));

    let bytes = fetch(&forge, receipt.artifact.id.as_str()).await;
    assert_eq!(bytes, b"%PDF\na1\na2\na3\nb1\nb2".to_vec());
}

#[tokio::test]
async fn rejected_merge_stores_nothing() {
    let dir = TempDir::new().unwrap();
    let forge = forge(&dir).await;

    let err = forge
        .assemble(AssemblyRequest::merge(vec![b"%PDF\nonly".to_vec()]))
        .await
        .unwrap_err();
    assert!(matches!(err, DocForgeError::TooFewInputs { got: 1 }));

    let err = forge
        .assemble(AssemblyRequest::merge(vec![b"%PDF\np".to_vec(), png(2, 2)]))
        .await
        .unwrap_err();
    assert!(matches!(err, DocForgeError::InvalidContentKind { index: 1, .. }));

    assert!(forge.list().await.unwrap().is_empty());
}

// ── Layout ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn empty_text_yields_one_page() {
    let dir = TempDir::new().unwrap();
    let forge = forge(&dir).await;

    let receipt = forge.assemble(AssemblyRequest::layout("")).await.unwrap();
    assert_eq!(receipt.page_count, Some(1));
    assert_eq!(fetch(&forge, receipt.artifact.id.as_str()).await, b"%PDF\n");
}

#[tokio::test]
async fn long_text_spans_pages_and_packs_words() {
    let dir = TempDir::new().unwrap();
    let forge = forge(&dir).await;

    let text = "word ".repeat(5000);
    let receipt = forge.assemble(AssemblyRequest::layout(text)).await.unwrap();
    let pages = receipt.page_count.unwrap();
    assert!(pages > 1, "expected overflow, got {pages} page(s)");

    let bytes = fetch(&forge, receipt.artifact.id.as_str()).await;
    let rendered = String::from_utf8(bytes).unwrap();
    let first_page = rendered.lines().nth(1).unwrap();
    let first_line = first_page.split(" / ").next().unwrap();
    assert!(first_line.split(' ').count() > 1);
}

#[tokio::test]
async fn non_utf8_text_is_malformed() {
    let dir = TempDir::new().unwrap();
    let forge = forge(&dir).await;

    let request = AssemblyRequest::new(Operation::Layout, vec![vec![0xff, 0xfe, b'a']]);
    let err = forge.assemble(request).await.unwrap_err();
    assert!(matches!(err, DocForgeError::MalformedText { .. }));
    assert!(forge.list().await.unwrap().is_empty());
}

// ── Transcode ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn png_to_webp_artifact_decodes() {
    let dir = TempDir::new().unwrap();
    let forge = forge(&dir).await;

    let request =
        AssemblyRequest::transcode(png(24, 12), RasterKind::Webp).with_source_kind(RasterKind::Png);
    let receipt = forge.assemble(request).await.unwrap();
    assert_eq!(receipt.artifact.content_kind, ContentKind::Webp);
    assert!(receipt.artifact.id.as_str().ends_with(".webp"));
    assert_eq!(receipt.page_count, None);

    let bytes = fetch(&forge, receipt.artifact.id.as_str()).await;
    let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::WebP).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (24, 12));
}

#[tokio::test]
async fn unsupported_target_is_rejected_at_parse() {
    let err = "transcode:gif".parse::<Operation>().unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn transcode_takes_exactly_one_input() {
    let dir = TempDir::new().unwrap();
    let forge = forge(&dir).await;

    let request = AssemblyRequest::new(
        Operation::Transcode(RasterKind::Jpeg),
        vec![png(2, 2), png(2, 2)],
    );
    let err = forge.assemble(request).await.unwrap_err();
    assert!(matches!(err, DocForgeError::WrongInputCount { got: 2, .. }));
}

// ── Retrieval ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_id_is_not_found() {
    let dir = TempDir::new().unwrap();
    let forge = forge(&dir).await;

    let err = forge
        .retrieve("1700000000000-000000000000.pdf")
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = forge.retrieve("../../etc/passwd").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn concurrent_assemblies_get_distinct_ids() {
    let dir = TempDir::new().unwrap();
    let forge = Arc::new(forge(&dir).await);

    let mut tasks = Vec::new();
    for i in 0..10 {
        let forge = Arc::clone(&forge);
        tasks.push(tokio::spawn(async move {
            forge
                .assemble(AssemblyRequest::layout(format!("document {i}")))
                .await
                .map(|r| r.artifact.id)
        }));
    }

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap().unwrap());
    }
    ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    ids.dedup();
    assert_eq!(ids.len(), 10);
    assert_eq!(forge.list().await.unwrap().len(), 10);
}
