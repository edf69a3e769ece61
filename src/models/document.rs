use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{DocumentId, PermissionLevel, UserId};

/// Ingestion status of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Processing,
    Ready,
    Error,
}

impl DocumentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(Self::Processing),
            "ready" => Ok(Self::Ready),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown document status: {other}")),
        }
    }
}

/// A document as seen by one viewer.
///
/// `raw_text` is treated as immutable once the document is ready; annotation
/// offsets are only meaningful against it. `permission_level` is computed per
/// viewer and is `None` when the viewer holds no access at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub owner_id: UserId,
    pub title: Option<String>,
    pub raw_text: Option<String>,
    pub status: DocumentStatus,
    pub mime_type: Option<String>,
    pub bytes: Option<i64>,
    pub page_count: Option<i64>,
    pub public_access: bool,
    pub permission_level: Option<PermissionLevel>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Document {
    /// Returns the title, or a placeholder for untitled documents.
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or("Untitled Document")
    }

    /// Returns the raw text, or an empty string when none was extracted.
    pub fn text(&self) -> &str {
        self.raw_text.as_deref().unwrap_or("")
    }
}
