use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Error returned when an identifier cannot be parsed from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} id: {input:?}")]
pub struct ParseIdError {
    kind: &'static str,
    input: String,
}

macro_rules! database_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates a new identifier from a database row id.
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the underlying row id.
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<i64>().map(Self).map_err(|_| ParseIdError {
                    kind: $kind,
                    input: s.to_string(),
                })
            }
        }
    };
}

database_id!(
    /// Unique identifier for an annotation (highlight or comment).
    AnnotationId,
    "annotation"
);

database_id!(
    /// Unique identifier for a document.
    DocumentId,
    "document"
);

database_id!(
    /// Unique identifier for a user profile.
    UserId,
    "user"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotation_id_serializes_as_raw_integer() {
        let id = AnnotationId::new(42);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "42");

        let deserialized: AnnotationId = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, id);
    }

    #[test]
    fn ids_parse_from_trimmed_text() {
        assert_eq!("7".parse::<DocumentId>(), Ok(DocumentId::new(7)));
        assert_eq!(" 12 ".parse::<UserId>(), Ok(UserId::new(12)));
    }

    #[test]
    fn parse_error_names_the_id_kind() {
        let err = "abc".parse::<AnnotationId>().unwrap_err();
        assert_eq!(err.to_string(), "invalid annotation id: \"abc\"");
    }

    #[test]
    fn ids_are_not_interchangeable() {
        // These would fail to compile:
        // let doc: DocumentId = AnnotationId::new(1);
        let annotation = AnnotationId::new(1);
        let document = DocumentId::new(1);

        assert_eq!(annotation.get(), document.get());
    }
}
