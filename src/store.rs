//! Annotation persistence and change notification.
//!
//! [`AnnotationStore`] is the only channel through which annotations are
//! mutated. Every successful mutation is announced on the document's realtime
//! channel; subscribers treat inserts and updates as a cue to re-list (the
//! payload lacks the joined author) and apply deletes locally.

mod feed;
mod identity;

pub use feed::{ChangeFeed, RealtimeEvent, Subscription};
pub use identity::{IdentityProvider, StaticIdentity};

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::models::{Annotation, AnnotationId, AnnotationWithUser, Document, DocumentId, UserId};

/// Errors surfaced by the annotation and document stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A mutation was attempted with no resolvable identity.
    #[error("user not authenticated")]
    Unauthenticated,

    /// The row policy refused the operation for the current identity.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A referenced row does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// The payload violates the annotation shape or the document text.
    #[error("invalid annotation: {0}")]
    InvalidAnnotation(String),

    /// A share link token is unknown, revoked or past its expiry.
    #[error("share link is invalid or has expired")]
    LinkUnavailable,

    /// A user or document operation was given unusable input.
    #[error("invalid input: {0}")]
    Invalid(String),

    /// Any failure of the underlying database.
    #[error("transport error: {0}")]
    Transport(#[from] rusqlite::Error),
}

/// What happens to descendant comments when an annotation is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletePolicy {
    /// Remove only the named row; descendants stay behind as orphans.
    #[default]
    Orphan,
    /// Remove the named row and every comment whose parent chain reaches it.
    Cascade,
}

impl fmt::Display for DeletePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Orphan => f.write_str("orphan"),
            Self::Cascade => f.write_str("cascade"),
        }
    }
}

impl FromStr for DeletePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "orphan" => Ok(Self::Orphan),
            "cascade" => Ok(Self::Cascade),
            other => Err(format!("unknown delete policy: {other} (expected orphan or cascade)")),
        }
    }
}

/// CRUD and change notification for annotations, scoped per document.
pub trait AnnotationStore {
    /// Every highlight and comment on the document, oldest first, each joined
    /// with its author. An empty document yields an empty list.
    fn list(&self, document_id: DocumentId) -> Result<Vec<AnnotationWithUser>, StoreError>;

    /// Anchors a highlight to `[start, end)` of the document's raw text.
    /// The author is the current identity.
    fn create_highlight(
        &self,
        document_id: DocumentId,
        start: usize,
        end: usize,
        text: &str,
    ) -> Result<Annotation, StoreError>;

    /// Attaches a comment to a highlight or to another comment.
    fn create_comment(
        &self,
        document_id: DocumentId,
        parent_id: AnnotationId,
        content: &str,
    ) -> Result<Annotation, StoreError>;

    /// Removes the named annotation.
    fn delete(&self, annotation_id: AnnotationId) -> Result<(), StoreError>;

    /// Opens the realtime channel for one document.
    fn subscribe(&self, document_id: DocumentId) -> Subscription;
}

/// Lookup of a document as seen by one viewer.
pub trait DocumentSource {
    /// Returns `None` when the document does not exist.
    fn get_document(
        &self,
        document_id: DocumentId,
        viewer: Option<UserId>,
    ) -> Result<Option<Document>, StoreError>;
}
