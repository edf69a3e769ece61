pub mod config;
pub mod db;
pub mod export;
pub mod models;
pub mod offsets;
pub mod permissions;
pub mod render;
pub mod service;
pub mod store;
pub mod threads;
pub mod tui;
pub mod utils;
pub mod viewer;

pub use config::Config;
pub use db::Database;
pub use models::{
    Annotation, AnnotationId, AnnotationKind, AnnotationThread, AnnotationWithUser, Author,
    Document, DocumentId, DocumentStatus, PermissionLevel, ShareLink, UserId,
};
pub use service::Library;
pub use store::{
    AnnotationStore, ChangeFeed, DeletePolicy, DocumentSource, IdentityProvider, RealtimeEvent,
    StaticIdentity, StoreError, Subscription,
};
pub use viewer::{ViewState, ViewerController, ViewerError};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_accessible_from_crate_root() {
        let db = Database::in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn types_accessible_from_crate_root() {
        let library = Library::new(Database::in_memory().unwrap());
        let viewer = ViewerController::over(&library);

        assert_eq!(viewer.state(), &ViewState::Loading);
        assert_eq!(DeletePolicy::default().to_string(), "orphan");
        assert_eq!(AnnotationKind::Highlight.to_string(), "highlight");
    }
}
