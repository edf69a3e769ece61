use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{DocumentId, PermissionLevel, UserId};

/// A token that grants `permission_level` on a document to whoever redeems it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLink {
    pub token: String,
    pub document_id: DocumentId,
    pub shared_by: UserId,
    pub permission_level: PermissionLevel,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl ShareLink {
    /// Whether the link can still be redeemed at `at`.
    pub fn is_usable(&self, at: OffsetDateTime) -> bool {
        self.is_active && at < self.expires_at
    }
}
