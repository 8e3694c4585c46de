//! Artifact descriptors and the id allow-list.
//!
//! An artifact id is the only thing a client ever hands back to us, and it is
//! joined onto the store root to find the blob. [`ArtifactId::parse`] is
//! therefore the single gate against path traversal: it accepts one path
//! component made of `[A-Za-z0-9_.-]`, never starting with a dot and never
//! containing `..`. Everything else is rejected before touching the
//! filesystem.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Longest id accepted from a client.
pub const MAX_ID_LEN: usize = 128;

static RE_ARTIFACT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-][A-Za-z0-9_.-]*$").unwrap());

/// Why a candidate id was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdRejection {
    Empty,
    TooLong,
    LeadingDot,
    ParentReference,
    ForbiddenCharacter,
}

impl fmt::Display for IdRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            IdRejection::Empty => "empty id",
            IdRejection::TooLong => "id longer than 128 characters",
            IdRejection::LeadingDot => "id starts with a dot",
            IdRejection::ParentReference => "id contains '..'",
            IdRejection::ForbiddenCharacter => "id contains a character outside [A-Za-z0-9_.-]",
        };
        f.write_str(reason)
    }
}

/// A validated, path-safe artifact id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ArtifactId(String);

impl ArtifactId {
    /// Validate a client-supplied id against the allow-list.
    pub fn parse(candidate: &str) -> Result<Self, IdRejection> {
        if candidate.is_empty() {
            return Err(IdRejection::Empty);
        }
        if candidate.len() > MAX_ID_LEN {
            return Err(IdRejection::TooLong);
        }
        if candidate.starts_with('.') {
            return Err(IdRejection::LeadingDot);
        }
        if candidate.contains("..") {
            return Err(IdRejection::ParentReference);
        }
        if !RE_ARTIFACT_ID.is_match(candidate) {
            return Err(IdRejection::ForbiddenCharacter);
        }
        Ok(Self(candidate.to_string()))
    }

    /// Mint a fresh id: `{unix_millis}-{12 hex chars}.{extension}`.
    pub fn generate(kind: ContentKind, now: DateTime<Utc>) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}-{}.{}",
            now.timestamp_millis(),
            &suffix[..12],
            kind.extension()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Content kind encoded in the id's extension.
    pub fn content_kind(&self) -> Option<ContentKind> {
        self.0
            .rsplit_once('.')
            .and_then(|(_, ext)| ContentKind::from_extension(ext))
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ArtifactId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Kind of bytes an artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Pdf,
    Png,
    Jpeg,
    Webp,
}

impl ContentKind {
    pub fn extension(self) -> &'static str {
        match self {
            ContentKind::Pdf => "pdf",
            ContentKind::Png => "png",
            ContentKind::Jpeg => "jpg",
            ContentKind::Webp => "webp",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ContentKind::Pdf => "application/pdf",
            ContentKind::Png => "image/png",
            ContentKind::Jpeg => "image/jpeg",
            ContentKind::Webp => "image/webp",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(ContentKind::Pdf),
            "png" => Some(ContentKind::Png),
            "jpg" | "jpeg" => Some(ContentKind::Jpeg),
            "webp" => Some(ContentKind::Webp),
            _ => None,
        }
    }
}

/// Descriptor of one stored artifact. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artifact {
    pub id: ArtifactId,
    /// Location of the blob under the store root.
    #[serde(skip)]
    pub physical_key: PathBuf,
    /// Blob modification time; the reference point for TTL.
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub content_kind: ContentKind,
}
