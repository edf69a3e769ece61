mod annotation;
mod author;
mod document;
mod ids;
mod permission_level;
mod share_link;

pub use annotation::{Annotation, AnnotationKind, AnnotationThread, AnnotationWithUser};
pub use author::Author;
pub use document::{Document, DocumentStatus};
pub use ids::{AnnotationId, DocumentId, ParseIdError, UserId};
pub use permission_level::PermissionLevel;
pub use share_link::ShareLink;
