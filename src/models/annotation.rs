use std::fmt;
use std::ops::{Deref, Range};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{AnnotationId, Author, DocumentId, UserId};

/// Variant tag of an annotation row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    /// A root anchored to a character range of the document text.
    Highlight,
    /// A text body attached to a highlight or to another comment.
    Comment,
}

impl AnnotationKind {
    /// Returns the storage name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Highlight => "highlight",
            Self::Comment => "comment",
        }
    }
}

impl fmt::Display for AnnotationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnnotationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "highlight" => Ok(Self::Highlight),
            "comment" => Ok(Self::Comment),
            other => Err(format!("unknown annotation type: {other}")),
        }
    }
}

/// A highlight or comment row, immutable once written.
///
/// Highlights have no parent, no content and a `[selection_start, selection_end)`
/// range measured in UTF-16 code units of the document's raw text. Comments have
/// a parent and content and no selection fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    pub document_id: DocumentId,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: AnnotationKind,
    pub parent_id: Option<AnnotationId>,
    pub content: Option<String>,
    pub selection_start: Option<usize>,
    pub selection_end: Option<usize>,
    pub selection_text: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Annotation {
    /// Builds a highlight row.
    pub fn highlight(
        id: AnnotationId,
        document_id: DocumentId,
        user_id: UserId,
        range: Range<usize>,
        selection_text: impl Into<String>,
        created_at: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            document_id,
            user_id,
            kind: AnnotationKind::Highlight,
            parent_id: None,
            content: None,
            selection_start: Some(range.start),
            selection_end: Some(range.end),
            selection_text: Some(selection_text.into()),
            created_at,
            updated_at: created_at,
        }
    }

    /// Builds a comment row attached to `parent_id`.
    pub fn comment(
        id: AnnotationId,
        document_id: DocumentId,
        user_id: UserId,
        parent_id: AnnotationId,
        content: impl Into<String>,
        created_at: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            document_id,
            user_id,
            kind: AnnotationKind::Comment,
            parent_id: Some(parent_id),
            content: Some(content.into()),
            selection_start: None,
            selection_end: None,
            selection_text: None,
            created_at,
            updated_at: created_at,
        }
    }

    pub fn is_highlight(&self) -> bool {
        self.kind == AnnotationKind::Highlight
    }

    pub fn is_comment(&self) -> bool {
        self.kind == AnnotationKind::Comment
    }

    /// Returns the anchored range for a well-formed highlight.
    pub fn range(&self) -> Option<Range<usize>> {
        match (self.kind, self.selection_start, self.selection_end) {
            (AnnotationKind::Highlight, Some(start), Some(end)) => Some(start..end),
            _ => None,
        }
    }

    /// Checks the highlight-root / comment-node shape.
    ///
    /// Returns a description of the first violated field, if any.
    pub fn shape_violation(&self) -> Option<&'static str> {
        match self.kind {
            AnnotationKind::Highlight => {
                if self.parent_id.is_some() {
                    Some("highlight must not have a parent")
                } else if self.content.is_some() {
                    Some("highlight must not have content")
                } else if self.range().is_none() || self.selection_text.is_none() {
                    Some("highlight requires selection fields")
                } else if self.selection_start > self.selection_end {
                    Some("highlight start must not exceed end")
                } else {
                    None
                }
            }
            AnnotationKind::Comment => {
                if self.parent_id.is_none() {
                    Some("comment requires a parent")
                } else if self.content.is_none() {
                    Some("comment requires content")
                } else if self.selection_start.is_some()
                    || self.selection_end.is_some()
                    || self.selection_text.is_some()
                {
                    Some("comment must not have selection fields")
                } else {
                    None
                }
            }
        }
    }
}

/// An annotation joined with its author's profile at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationWithUser {
    #[serde(flatten)]
    pub annotation: Annotation,
    pub user: Author,
}

impl Deref for AnnotationWithUser {
    type Target = Annotation;

    fn deref(&self) -> &Annotation {
        &self.annotation
    }
}

/// A highlight with every comment whose parent chain resolves to it.
///
/// Comments are kept flat in list order; nesting is rebuilt separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationThread {
    pub highlight: AnnotationWithUser,
    pub comments: Vec<AnnotationWithUser>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(seconds: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(seconds).unwrap()
    }

    #[test]
    fn highlight_constructor_satisfies_shape() {
        let h = Annotation::highlight(
            AnnotationId::new(1),
            DocumentId::new(1),
            UserId::new(1),
            4..9,
            "quick",
            at(0),
        );

        assert!(h.is_highlight());
        assert_eq!(h.range(), Some(4..9));
        assert_eq!(h.shape_violation(), None);
    }

    #[test]
    fn comment_constructor_satisfies_shape() {
        let c = Annotation::comment(
            AnnotationId::new(2),
            DocumentId::new(1),
            UserId::new(1),
            AnnotationId::new(1),
            "nice",
            at(0),
        );

        assert!(c.is_comment());
        assert_eq!(c.range(), None);
        assert_eq!(c.shape_violation(), None);
    }

    #[test]
    fn shape_violation_reports_mixed_fields() {
        let mut c = Annotation::comment(
            AnnotationId::new(2),
            DocumentId::new(1),
            UserId::new(1),
            AnnotationId::new(1),
            "nice",
            at(0),
        );
        c.selection_start = Some(3);

        assert_eq!(
            c.shape_violation(),
            Some("comment must not have selection fields")
        );
    }

    #[test]
    fn kind_serializes_under_type_key() {
        let h = Annotation::highlight(
            AnnotationId::new(1),
            DocumentId::new(1),
            UserId::new(1),
            0..3,
            "The",
            at(0),
        );
        let json = serde_json::to_value(&h).unwrap();

        assert_eq!(json["type"], "highlight");
        assert_eq!(json["parent_id"], serde_json::Value::Null);
        assert_eq!(json["selection_end"], 3);
    }

    #[test]
    fn kind_parses_from_storage_name() {
        assert_eq!("comment".parse(), Ok(AnnotationKind::Comment));
        assert!("note".parse::<AnnotationKind>().is_err());
    }
}
