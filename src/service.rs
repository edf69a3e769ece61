use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use time::{Duration, OffsetDateTime};

use crate::Database;
use crate::models::{
    Annotation, AnnotationId, AnnotationKind, AnnotationWithUser, Author, Document,
    DocumentId, DocumentStatus, PermissionLevel, ShareLink, UserId,
};
use crate::offsets::slice_utf16;
use crate::permissions::{AnnotationPermissions, resolve_level};
use crate::store::{
    AnnotationStore, ChangeFeed, DeletePolicy, DocumentSource, IdentityProvider, RealtimeEvent,
    StaticIdentity, StoreError, Subscription,
};
use crate::utils::{from_timestamp, now, to_timestamp};

const DOCUMENT_COLUMNS: &str = "d.id, d.owner_id, d.title, d.raw_text, d.status, d.mime_type, \
     d.bytes, d.page_count, d.public_access, d.created_at, d.updated_at, \
     (SELECT s.permission_level FROM document_shares s WHERE s.document_id = d.id AND s.user_id = ?2)";

const SHARE_LINK_COLUMNS: &str =
    "token, document_id, shared_by, permission_level, is_active, created_at, expires_at";

const ANNOTATION_COLUMNS: &str = "a.id, a.document_id, a.user_id, a.type, a.parent_id, a.content, \
     a.selection_start, a.selection_end, a.selection_text, a.created_at, a.updated_at";

/// SQLite-backed annotation store, document store and user registry.
///
/// Library owns a Database instance, the realtime [`ChangeFeed`] it publishes
/// to, and the identity mutations are attributed to. It also acts as the row
/// policy: creating requires a level that permits annotating, deleting
/// requires ownership of the annotation or the document, and managing a
/// document requires owning it.
///
/// # Examples
///
/// ```
/// use marginalia::{Database, Library, StaticIdentity};
///
/// # fn main() -> anyhow::Result<()> {
/// let library = Library::new(Database::in_memory()?);
/// let ada = library.create_user("ada", Some("Ada Lovelace"))?;
///
/// let library = library.with_identity(StaticIdentity::user(ada.id));
/// let doc = library.create_document(Some("Notes"), "The quick brown fox", None)?;
/// assert_eq!(doc.text(), "The quick brown fox");
/// # Ok(())
/// # }
/// ```
pub struct Library {
    db: Database,
    feed: ChangeFeed,
    identity: Box<dyn IdentityProvider>,
    delete_policy: DeletePolicy,
}

impl Library {
    /// Creates an anonymous library over `db` with its own change feed.
    pub fn new(db: Database) -> Self {
        Self {
            db,
            feed: ChangeFeed::default(),
            identity: Box::new(StaticIdentity::anonymous()),
            delete_policy: DeletePolicy::default(),
        }
    }

    /// Attributes mutations to `identity`.
    pub fn with_identity(mut self, identity: impl IdentityProvider + 'static) -> Self {
        self.identity = Box::new(identity);
        self
    }

    /// Publishes to a shared feed, so sessions over the same data see each
    /// other's changes.
    pub fn with_feed(mut self, feed: ChangeFeed) -> Self {
        self.feed = feed;
        self
    }

    pub fn with_delete_policy(mut self, policy: DeletePolicy) -> Self {
        self.delete_policy = policy;
        self
    }

    /// Returns a reference to the underlying database.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Gives the connection back, e.g. to reopen it under another identity.
    pub fn into_database(self) -> Database {
        self.db
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub fn delete_policy(&self) -> DeletePolicy {
        self.delete_policy
    }

    fn conn(&self) -> &Connection {
        self.db.connection()
    }

    fn require_user(&self) -> Result<UserId, StoreError> {
        self.identity.current_user().ok_or(StoreError::Unauthenticated)
    }

    // --- users ---

    /// Registers a user. Usernames are unique, ignoring case.
    ///
    /// # Errors
    ///
    /// `Invalid` for a blank or already taken username.
    pub fn create_user(&self, username: &str, full_name: Option<&str>) -> Result<Author, StoreError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(StoreError::Invalid("username cannot be empty".to_string()));
        }
        let full_name = full_name.map(str::trim).filter(|n| !n.is_empty());

        let inserted = self.conn().execute(
            "INSERT INTO users (username, full_name, created_at) VALUES (?1, ?2, ?3)",
            params![username, full_name, to_timestamp(now())],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(StoreError::Invalid(format!(
                    "username {username:?} is already taken"
                )));
            }
            Err(e) => return Err(e.into()),
        }

        let id = UserId::new(self.conn().last_insert_rowid());
        tracing::info!(user = %id, username, "created user");

        Ok(Author {
            id,
            username: username.to_string(),
            full_name: full_name.map(String::from),
        })
    }

    /// Looks a user up by username, ignoring case.
    pub fn find_user(&self, username: &str) -> Result<Option<Author>, StoreError> {
        let author = self
            .conn()
            .query_row(
                "SELECT id, username, full_name FROM users WHERE username = ?1",
                [username.trim()],
                author_from_row,
            )
            .optional()?;
        Ok(author)
    }

    pub fn get_user(&self, id: UserId) -> Result<Option<Author>, StoreError> {
        let author = self
            .conn()
            .query_row(
                "SELECT id, username, full_name FROM users WHERE id = ?1",
                [id.get()],
                author_from_row,
            )
            .optional()?;
        Ok(author)
    }

    // --- documents ---

    /// Creates a ready document owned by the current user.
    pub fn create_document(
        &self,
        title: Option<&str>,
        raw_text: &str,
        mime_type: Option<&str>,
    ) -> Result<Document, StoreError> {
        let owner = self.require_user()?;
        let now = to_timestamp(now());
        let bytes = i64::try_from(raw_text.len()).ok();

        self.conn().execute(
            "INSERT INTO documents (owner_id, title, raw_text, status, mime_type, bytes, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'ready', ?4, ?5, ?6, ?6)",
            params![owner.get(), title, raw_text, mime_type, bytes, now],
        )?;
        let id = DocumentId::new(self.conn().last_insert_rowid());
        tracing::info!(document = %id, owner = %owner, "created document");

        self.expect_document(id, Some(owner))
    }

    /// Creates a document whose text has not been extracted yet.
    pub fn create_processing_document(
        &self,
        title: Option<&str>,
        mime_type: Option<&str>,
        bytes: Option<i64>,
    ) -> Result<Document, StoreError> {
        let owner = self.require_user()?;
        let now = to_timestamp(now());

        self.conn().execute(
            "INSERT INTO documents (owner_id, title, status, mime_type, bytes, created_at, updated_at)
             VALUES (?1, ?2, 'processing', ?3, ?4, ?5, ?5)",
            params![owner.get(), title, mime_type, bytes, now],
        )?;
        let id = DocumentId::new(self.conn().last_insert_rowid());
        tracing::info!(document = %id, owner = %owner, "created processing document");

        self.expect_document(id, Some(owner))
    }

    /// Stores the extracted text and marks the document ready.
    pub fn finalize_document(
        &self,
        id: DocumentId,
        raw_text: &str,
        page_count: Option<i64>,
    ) -> Result<Document, StoreError> {
        let owner = self.require_owner(id)?;
        self.conn().execute(
            "UPDATE documents SET raw_text = ?2, page_count = ?3, status = 'ready', updated_at = ?4
             WHERE id = ?1",
            params![id.get(), raw_text, page_count, to_timestamp(now())],
        )?;
        tracing::info!(document = %id, "document ready");

        self.expect_document(id, Some(owner))
    }

    /// Marks the document as failed extraction.
    pub fn mark_document_failed(&self, id: DocumentId) -> Result<Document, StoreError> {
        let owner = self.require_owner(id)?;
        self.set_status(id, DocumentStatus::Error)?;
        tracing::warn!(document = %id, "document extraction failed");

        self.expect_document(id, Some(owner))
    }

    fn set_status(&self, id: DocumentId, status: DocumentStatus) -> Result<(), StoreError> {
        self.conn().execute(
            "UPDATE documents SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.get(), status.as_str(), to_timestamp(now())],
        )?;
        Ok(())
    }

    /// Grants `user` a share on the document, replacing any earlier share.
    ///
    /// # Errors
    ///
    /// `Invalid` for levels other than view, comment and edit, or when
    /// sharing with the owner.
    pub fn share_document(
        &self,
        id: DocumentId,
        user: UserId,
        level: PermissionLevel,
    ) -> Result<(), StoreError> {
        let owner = self.require_owner(id)?;
        if !level.is_shareable() {
            return Err(StoreError::Invalid(format!("cannot share at level {level}")));
        }
        if user == owner {
            return Err(StoreError::Invalid("owners already hold every permission".to_string()));
        }
        if self.get_user(user)?.is_none() {
            return Err(StoreError::NotFound {
                entity: "user",
                id: user.get(),
            });
        }

        self.conn().execute(
            "INSERT INTO document_shares (document_id, user_id, permission_level, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (document_id, user_id) DO UPDATE SET permission_level = excluded.permission_level",
            params![id.get(), user.get(), level.as_str(), to_timestamp(now())],
        )?;
        tracing::info!(document = %id, user = %user, %level, "shared document");

        Ok(())
    }

    /// Opens or closes read access for everyone, including anonymous viewers.
    pub fn set_public_access(&self, id: DocumentId, public: bool) -> Result<(), StoreError> {
        self.require_owner(id)?;
        self.conn().execute(
            "UPDATE documents SET public_access = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.get(), public, to_timestamp(now())],
        )?;
        tracing::info!(document = %id, public, "changed public access");
        Ok(())
    }

    // --- share links ---

    /// Returns a link granting `level` on the document for `ttl`.
    ///
    /// An active, unexpired link the current owner already made at the same
    /// level is returned instead of minting a new token.
    ///
    /// # Errors
    ///
    /// `Forbidden` unless the current user owns the document; `Invalid` for
    /// levels other than view, comment and edit, or a lifetime that is not
    /// positive.
    pub fn create_share_link(
        &self,
        id: DocumentId,
        level: PermissionLevel,
        ttl: Duration,
    ) -> Result<ShareLink, StoreError> {
        let owner = self.require_owner(id)?;
        if !level.is_shareable() {
            return Err(StoreError::Invalid(format!("cannot share at level {level}")));
        }
        if !ttl.is_positive() {
            return Err(StoreError::Invalid("share link lifetime must be positive".to_string()));
        }
        let created = now();
        let expires = created
            .checked_add(ttl)
            .ok_or_else(|| StoreError::Invalid("share link lifetime is too long".to_string()))?;

        let existing = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {SHARE_LINK_COLUMNS} FROM share_links
                     WHERE document_id = ?1 AND shared_by = ?2 AND permission_level = ?3
                       AND is_active = 1 AND expires_at > ?4
                     ORDER BY expires_at DESC LIMIT 1"
                ),
                params![id.get(), owner.get(), level.as_str(), to_timestamp(created)],
                share_link_from_row,
            )
            .optional()?;
        if let Some(link) = existing {
            tracing::debug!(document = %id, %level, "reusing share link");
            return Ok(link);
        }

        self.conn().execute(
            "INSERT INTO share_links (document_id, shared_by, token, permission_level, created_at, expires_at)
             VALUES (?1, ?2, lower(hex(randomblob(16))), ?3, ?4, ?5)",
            params![
                id.get(),
                owner.get(),
                level.as_str(),
                to_timestamp(created),
                to_timestamp(expires)
            ],
        )?;
        let link = self.conn().query_row(
            &format!("SELECT {SHARE_LINK_COLUMNS} FROM share_links WHERE id = ?1"),
            [self.conn().last_insert_rowid()],
            share_link_from_row,
        )?;
        tracing::info!(document = %id, %level, expires_at = %link.expires_at, "created share link");

        Ok(link)
    }

    /// Looks up a link by token, whether or not it is still usable.
    pub fn get_share_link(&self, token: &str) -> Result<Option<ShareLink>, StoreError> {
        let link = self
            .conn()
            .query_row(
                &format!("SELECT {SHARE_LINK_COLUMNS} FROM share_links WHERE token = ?1"),
                [token.trim()],
                share_link_from_row,
            )
            .optional()?;
        Ok(link)
    }

    /// Deactivates a link so it can no longer be redeemed. Owner only.
    pub fn revoke_share_link(&self, token: &str) -> Result<(), StoreError> {
        let link = self.get_share_link(token)?.ok_or(StoreError::LinkUnavailable)?;
        self.require_owner(link.document_id)?;
        self.conn().execute(
            "UPDATE share_links SET is_active = 0 WHERE token = ?1",
            [&link.token],
        )?;
        tracing::info!(document = %link.document_id, "revoked share link");
        Ok(())
    }

    /// Redeems a link for the current user and returns the document as they
    /// now see it.
    ///
    /// The link's level is written as the user's share. A user who already
    /// holds at least that level (the owner included) keeps what they have.
    ///
    /// # Errors
    ///
    /// `LinkUnavailable` for unknown, revoked or expired tokens;
    /// `Unauthenticated` without an identity.
    pub fn redeem_share_link(&self, token: &str) -> Result<Document, StoreError> {
        let user = self.require_user()?;
        let link = self
            .get_share_link(token)?
            .filter(|link| link.is_usable(now()))
            .ok_or(StoreError::LinkUnavailable)?;

        let document = self.expect_document(link.document_id, Some(user))?;
        if document
            .permission_level
            .is_some_and(|held| held.rank() >= link.permission_level.rank())
        {
            tracing::debug!(document = %document.id, user = %user, "share link grants nothing new");
            return Ok(document);
        }

        self.conn().execute(
            "INSERT INTO document_shares (document_id, user_id, permission_level, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (document_id, user_id) DO UPDATE SET permission_level = excluded.permission_level",
            params![
                link.document_id.get(),
                user.get(),
                link.permission_level.as_str(),
                to_timestamp(now())
            ],
        )?;
        tracing::info!(
            document = %link.document_id,
            user = %user,
            level = %link.permission_level,
            "redeemed share link"
        );

        self.expect_document(link.document_id, Some(user))
    }

    /// Documents `user` owns or has been shared, newest first.
    pub fn list_documents_for(&self, user: UserId) -> Result<Vec<Document>, StoreError> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents d
             WHERE d.owner_id = ?1
                OR EXISTS (SELECT 1 FROM document_shares s WHERE s.document_id = d.id AND s.user_id = ?2)
             ORDER BY d.created_at DESC, d.id DESC"
        ))?;

        let rows = stmt.query_map(params![user.get(), user.get()], |row| {
            document_from_row(row, Some(user))
        })?;

        let mut documents = Vec::new();
        for row in rows {
            documents.push(row?);
        }
        Ok(documents)
    }

    fn load_document(
        &self,
        id: DocumentId,
        viewer: Option<UserId>,
    ) -> Result<Option<Document>, StoreError> {
        let document = self
            .conn()
            .query_row(
                &format!("SELECT {DOCUMENT_COLUMNS} FROM documents d WHERE d.id = ?1"),
                params![id.get(), viewer.map(UserId::get)],
                |row| document_from_row(row, viewer),
            )
            .optional()?;
        Ok(document)
    }

    fn expect_document(
        &self,
        id: DocumentId,
        viewer: Option<UserId>,
    ) -> Result<Document, StoreError> {
        self.load_document(id, viewer)?.ok_or(StoreError::NotFound {
            entity: "document",
            id: id.get(),
        })
    }

    fn require_owner(&self, id: DocumentId) -> Result<UserId, StoreError> {
        let user = self.require_user()?;
        let document = self.expect_document(id, Some(user))?;
        if document.owner_id != user {
            return Err(StoreError::Forbidden(format!(
                "only the owner may manage document {id}"
            )));
        }
        Ok(user)
    }

    /// Loads the document for an annotation write and checks the actor may
    /// annotate it.
    fn annotatable_document(
        &self,
        id: DocumentId,
        user: UserId,
    ) -> Result<Document, StoreError> {
        let document = self.expect_document(id, Some(user))?;
        let permissions =
            AnnotationPermissions::resolve(document.permission_level, Some(user), document.owner_id);
        if !permissions.can_create {
            return Err(StoreError::Forbidden(format!(
                "cannot annotate document {id}"
            )));
        }
        Ok(document)
    }

    /// Looks up a single annotation row, without its author.
    pub fn get_annotation(&self, id: AnnotationId) -> Result<Option<Annotation>, StoreError> {
        let annotation = self
            .conn()
            .query_row(
                &format!("SELECT {ANNOTATION_COLUMNS} FROM annotations a WHERE a.id = ?1"),
                [id.get()],
                annotation_from_row,
            )
            .optional()?;
        Ok(annotation)
    }

    fn insert_annotation(&self, annotation: &Annotation) -> Result<AnnotationId, StoreError> {
        let start = annotation.selection_start.map(to_column).transpose()?;
        let end = annotation.selection_end.map(to_column).transpose()?;

        self.conn().execute(
            "INSERT INTO annotations
             (document_id, user_id, type, parent_id, content, selection_start, selection_end, selection_text, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                annotation.document_id.get(),
                annotation.user_id.get(),
                annotation.kind.as_str(),
                annotation.parent_id.map(AnnotationId::get),
                annotation.content,
                start,
                end,
                annotation.selection_text,
                to_timestamp(annotation.created_at),
                to_timestamp(annotation.updated_at),
            ],
        )?;

        Ok(AnnotationId::new(self.conn().last_insert_rowid()))
    }

    /// Ids removed by deleting `id` under the current policy, the named row
    /// first.
    fn doomed_ids(&self, id: AnnotationId) -> Result<Vec<AnnotationId>, StoreError> {
        match self.delete_policy {
            DeletePolicy::Orphan => Ok(vec![id]),
            DeletePolicy::Cascade => {
                // UNION (not UNION ALL) stops the recursion on parent cycles.
                let mut stmt = self.conn().prepare(
                    "WITH RECURSIVE doomed(id) AS (
                         SELECT ?1
                         UNION
                         SELECT a.id FROM annotations a
                         JOIN doomed ON a.parent_id = doomed.id
                         WHERE a.type = 'comment'
                     )
                     SELECT id FROM doomed",
                )?;
                let rows = stmt.query_map([id.get()], |row| row.get::<_, i64>(0))?;

                let mut ids = vec![id];
                for row in rows {
                    let found = AnnotationId::new(row?);
                    if found != id {
                        ids.push(found);
                    }
                }
                Ok(ids)
            }
        }
    }
}

impl AnnotationStore for Library {
    fn list(&self, document_id: DocumentId) -> Result<Vec<AnnotationWithUser>, StoreError> {
        tracing::debug!(document = %document_id, "listing annotations");

        let mut stmt = self.conn().prepare(&format!(
            "SELECT {ANNOTATION_COLUMNS}, u.username, u.full_name
             FROM annotations a
             JOIN users u ON u.id = a.user_id
             WHERE a.document_id = ?1
             ORDER BY a.created_at, a.id"
        ))?;

        let rows = stmt.query_map([document_id.get()], |row| {
            let annotation = annotation_from_row(row)?;
            let user = Author {
                id: annotation.user_id,
                username: row.get(11)?,
                full_name: row.get(12)?,
            };
            Ok(AnnotationWithUser { annotation, user })
        })?;

        let mut annotations = Vec::new();
        for row in rows {
            annotations.push(row?);
        }
        Ok(annotations)
    }

    fn create_highlight(
        &self,
        document_id: DocumentId,
        start: usize,
        end: usize,
        text: &str,
    ) -> Result<Annotation, StoreError> {
        tracing::debug!(document = %document_id, start, end, "creating highlight");
        let user = self.require_user()?;
        let document = self.annotatable_document(document_id, user)?;

        if start > end {
            return Err(StoreError::InvalidAnnotation(format!(
                "selection {start}..{end} is reversed"
            )));
        }
        let slice = slice_utf16(document.text(), start..end)
            .map_err(|e| StoreError::InvalidAnnotation(e.to_string()))?;
        if slice != text {
            return Err(StoreError::InvalidAnnotation(
                "selection text does not match the document text".to_string(),
            ));
        }

        let mut annotation = Annotation::highlight(
            AnnotationId::new(0),
            document_id,
            user,
            start..end,
            text,
            now(),
        );
        annotation.id = self.insert_annotation(&annotation)?;

        tracing::info!(annotation = %annotation.id, document = %document_id, "created highlight");
        self.feed
            .publish(document_id, RealtimeEvent::Insert(annotation.clone()));

        Ok(annotation)
    }

    fn create_comment(
        &self,
        document_id: DocumentId,
        parent_id: AnnotationId,
        content: &str,
    ) -> Result<Annotation, StoreError> {
        tracing::debug!(document = %document_id, parent = %parent_id, "creating comment");
        let user = self.require_user()?;
        self.annotatable_document(document_id, user)?;

        let parent = self.get_annotation(parent_id)?.ok_or(StoreError::NotFound {
            entity: "annotation",
            id: parent_id.get(),
        })?;
        if parent.document_id != document_id {
            return Err(StoreError::InvalidAnnotation(format!(
                "parent {parent_id} belongs to another document"
            )));
        }

        let mut annotation =
            Annotation::comment(AnnotationId::new(0), document_id, user, parent_id, content, now());
        annotation.id = self.insert_annotation(&annotation)?;

        tracing::info!(annotation = %annotation.id, parent = %parent_id, "created comment");
        self.feed
            .publish(document_id, RealtimeEvent::Insert(annotation.clone()));

        Ok(annotation)
    }

    fn delete(&self, annotation_id: AnnotationId) -> Result<(), StoreError> {
        tracing::debug!(annotation = %annotation_id, policy = %self.delete_policy, "deleting annotation");
        let user = self.require_user()?;

        let annotation = self
            .get_annotation(annotation_id)?
            .ok_or(StoreError::NotFound {
                entity: "annotation",
                id: annotation_id.get(),
            })?;
        let document = self.expect_document(annotation.document_id, Some(user))?;
        let permissions =
            AnnotationPermissions::resolve(document.permission_level, Some(user), document.owner_id);
        if !permissions.can_delete(&annotation) {
            return Err(StoreError::Forbidden(format!(
                "cannot delete annotation {annotation_id}"
            )));
        }

        let ids = self.doomed_ids(annotation_id)?;
        let tx = self.conn().unchecked_transaction()?;
        for id in &ids {
            tx.execute("DELETE FROM annotations WHERE id = ?1", [id.get()])?;
        }
        tx.commit()?;

        tracing::info!(annotation = %annotation_id, removed = ids.len(), "deleted annotation");
        for id in ids {
            self.feed
                .publish(annotation.document_id, RealtimeEvent::Delete { id });
        }

        Ok(())
    }

    fn subscribe(&self, document_id: DocumentId) -> Subscription {
        tracing::debug!(document = %document_id, "opening realtime subscription");
        self.feed.subscribe(document_id)
    }
}

impl DocumentSource for Library {
    fn get_document(
        &self,
        document_id: DocumentId,
        viewer: Option<UserId>,
    ) -> Result<Option<Document>, StoreError> {
        tracing::debug!(document = %document_id, "loading document");
        self.load_document(document_id, viewer)
    }
}

impl IdentityProvider for Library {
    fn current_user(&self) -> Option<UserId> {
        self.identity.current_user()
    }
}

fn to_column(value: usize) -> Result<i64, StoreError> {
    i64::try_from(value)
        .map_err(|_| StoreError::InvalidAnnotation(format!("offset {value} is too large")))
}

fn conversion_error(
    idx: usize,
    ty: Type,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, err.into())
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: String| conversion_error(idx, Type::Text, e))
}

fn offset_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<usize>> {
    let raw: Option<i64> = row.get(idx)?;
    raw.map(|v| usize::try_from(v).map_err(|e| conversion_error(idx, Type::Integer, e)))
        .transpose()
}

fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    Ok(from_timestamp(row.get(idx)?))
}

fn author_from_row(row: &Row<'_>) -> rusqlite::Result<Author> {
    Ok(Author {
        id: UserId::new(row.get(0)?),
        username: row.get(1)?,
        full_name: row.get(2)?,
    })
}

fn annotation_from_row(row: &Row<'_>) -> rusqlite::Result<Annotation> {
    let kind: AnnotationKind = parse_column(row, 3)?;
    Ok(Annotation {
        id: AnnotationId::new(row.get(0)?),
        document_id: DocumentId::new(row.get(1)?),
        user_id: UserId::new(row.get(2)?),
        kind,
        parent_id: row.get::<_, Option<i64>>(4)?.map(AnnotationId::new),
        content: row.get(5)?,
        selection_start: offset_column(row, 6)?,
        selection_end: offset_column(row, 7)?,
        selection_text: row.get(8)?,
        created_at: time_column(row, 9)?,
        updated_at: time_column(row, 10)?,
    })
}

fn share_link_from_row(row: &Row<'_>) -> rusqlite::Result<ShareLink> {
    Ok(ShareLink {
        token: row.get(0)?,
        document_id: DocumentId::new(row.get(1)?),
        shared_by: UserId::new(row.get(2)?),
        permission_level: parse_column(row, 3)?,
        is_active: row.get(4)?,
        created_at: time_column(row, 5)?,
        expires_at: time_column(row, 6)?,
    })
}

fn document_from_row(row: &Row<'_>, viewer: Option<UserId>) -> rusqlite::Result<Document> {
    let owner_id = UserId::new(row.get(1)?);
    let public_access: bool = row.get(8)?;
    let share: Option<String> = row.get(11)?;
    let share = share
        .map(|s| s.parse::<PermissionLevel>())
        .transpose()
        .map_err(|e| conversion_error(11, Type::Text, e))?;

    Ok(Document {
        id: DocumentId::new(row.get(0)?),
        owner_id,
        title: row.get(2)?,
        raw_text: row.get(3)?,
        status: parse_column(row, 4)?,
        mime_type: row.get(5)?,
        bytes: row.get(6)?,
        page_count: row.get(7)?,
        public_access,
        permission_level: resolve_level(owner_id, viewer, share, public_access),
        created_at: time_column(row, 9)?,
        updated_at: time_column(row, 10)?,
    })
}
