//! Caller-side input loading: read a local path or download an HTTP(S) URL
//! into memory, refusing anything larger than the configured cap.
//!
//! The assembler itself never sees a path or URL and never enforces a size
//! limit. This module is what the CLI uses to turn its arguments into the
//! byte buffers an [`AssemblyRequest`](crate::request::AssemblyRequest)
//! carries.

use crate::error::DocForgeError;
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load `input` (a path or URL) fully into memory.
///
/// # Errors
/// [`DocForgeError::InputUnavailable`] when the file cannot be read, the
/// download fails, or the content exceeds `max_bytes`.
pub async fn load_input(
    input: &str,
    max_bytes: usize,
    timeout: Duration,
) -> Result<Vec<u8>, DocForgeError> {
    if is_url(input) {
        download_url(input, max_bytes, timeout).await
    } else {
        read_local(input, max_bytes).await
    }
}

fn unavailable(input: &str, reason: impl ToString) -> DocForgeError {
    DocForgeError::InputUnavailable {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}

fn too_large(input: &str, max_bytes: usize) -> DocForgeError {
    unavailable(input, format!("larger than the {} byte limit", max_bytes))
}

async fn read_local(path_str: &str, max_bytes: usize) -> Result<Vec<u8>, DocForgeError> {
    let path = Path::new(path_str);
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| unavailable(path_str, e))?;

    let declared = file
        .metadata()
        .await
        .map_err(|e| unavailable(path_str, e))?
        .len();
    if declared > max_bytes as u64 {
        return Err(too_large(path_str, max_bytes));
    }

    // The file may grow between stat and read; read at most one byte past
    // the cap so growth is detected without buffering it all.
    let mut bytes = Vec::with_capacity(declared as usize);
    file.take(max_bytes as u64 + 1)
        .read_to_end(&mut bytes)
        .await
        .map_err(|e| unavailable(path_str, e))?;
    if bytes.len() > max_bytes {
        return Err(too_large(path_str, max_bytes));
    }

    debug!("Loaded {} ({} bytes)", path.display(), bytes.len());
    Ok(bytes)
}

async fn download_url(
    url: &str,
    max_bytes: usize,
    timeout: Duration,
) -> Result<Vec<u8>, DocForgeError> {
    info!("Downloading input from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| unavailable(url, e))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            unavailable(url, format!("timed out after {}s", timeout.as_secs()))
        } else {
            unavailable(url, e)
        }
    })?;

    if !response.status().is_success() {
        return Err(unavailable(url, format!("HTTP {}", response.status())));
    }
    if let Some(len) = response.content_length() {
        if len > max_bytes as u64 {
            return Err(too_large(url, max_bytes));
        }
    }

    let mut bytes = Vec::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| unavailable(url, e))?;
        if bytes.len() + chunk.len() > max_bytes {
            return Err(too_large(url, max_bytes));
        }
        bytes.extend_from_slice(&chunk);
    }

    info!("Downloaded {} bytes from {}", bytes.len(), url);
    Ok(bytes)
}
