//! Capability resolution for annotation operations.
//!
//! Pure functions of the viewer's permission level and identity; safe to call
//! on every render.

use crate::models::{Annotation, PermissionLevel, UserId};

/// What the current viewer may do with annotations on one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotationPermissions {
    pub can_view: bool,
    pub can_create: bool,
    current_user: Option<UserId>,
    document_owner: UserId,
}

impl AnnotationPermissions {
    /// Resolves capabilities from `(permission_level, current_user, document_owner)`.
    ///
    /// # Examples
    ///
    /// ```
    /// use marginalia::models::{PermissionLevel, UserId};
    /// use marginalia::permissions::AnnotationPermissions;
    ///
    /// let owner = UserId::new(1);
    /// let perms = AnnotationPermissions::resolve(Some(PermissionLevel::View), Some(UserId::new(2)), owner);
    /// assert!(perms.can_view);
    /// assert!(!perms.can_create);
    /// ```
    pub fn resolve(
        permission_level: Option<PermissionLevel>,
        current_user: Option<UserId>,
        document_owner: UserId,
    ) -> Self {
        let can_create = matches!(
            permission_level,
            Some(PermissionLevel::Owner | PermissionLevel::Edit | PermissionLevel::Comment)
        );

        Self {
            can_view: permission_level.is_some(),
            can_create,
            current_user,
            document_owner,
        }
    }

    /// Capabilities of a viewer who cannot see the document at all.
    pub fn none(document_owner: UserId) -> Self {
        Self::resolve(None, None, document_owner)
    }

    /// Document owners may delete anything on their document; everyone else
    /// only their own annotations. Anonymous viewers can never delete.
    pub fn can_delete(&self, annotation: &Annotation) -> bool {
        match self.current_user {
            Some(user) => user == self.document_owner || user == annotation.user_id,
            None => false,
        }
    }
}

/// Computes the permission level a viewer holds on a document.
///
/// Owners get `Owner`; otherwise an explicit share wins; otherwise public
/// documents grant `Public`; otherwise the viewer has no access.
pub fn resolve_level(
    owner: UserId,
    viewer: Option<UserId>,
    share: Option<PermissionLevel>,
    public_access: bool,
) -> Option<PermissionLevel> {
    if viewer == Some(owner) {
        return Some(PermissionLevel::Owner);
    }
    if viewer.is_some()
        && let Some(level) = share
    {
        return Some(level);
    }
    public_access.then_some(PermissionLevel::Public)
}
