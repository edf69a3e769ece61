//! Screen-level state for reading and annotating one document.
//!
//! [`ViewerController`] drives the document through
//! `Loading -> {NotFound | Error | Processing | Ready}` and, once ready, owns
//! the annotation list, the realtime subscription, search and selection.
//! Mutations are never applied optimistically: every successful write is
//! followed by a full re-list.

use std::ops::Range;

use regex::RegexBuilder;
use thiserror::Error;

use crate::models::{
    Annotation, AnnotationId, AnnotationThread, AnnotationWithUser, Document, DocumentId,
    DocumentStatus, UserId,
};
use crate::offsets::{OffsetError, Selection, byte_index, measure_selection, utf16_len};
use crate::permissions::AnnotationPermissions;
use crate::render::{normalize_newlines, render_html};
use crate::store::{
    AnnotationStore, DocumentSource, IdentityProvider, RealtimeEvent, StoreError, Subscription,
};
use crate::threads::{ThreadIndex, build_threads};

/// Errors returned by viewer actions. Local state is untouched when one is
/// returned, so the caller can keep its input and retry.
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("document is not ready")]
    NotReady,

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("selection is empty")]
    EmptySelection,

    #[error("comment cannot be empty")]
    EmptyComment,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Offset(#[from] OffsetError),
}

/// Where the viewer is in the document lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewState {
    Loading,
    /// The document does not exist or the viewer holds no access to it.
    NotFound,
    /// Loading failed, or extraction failed for the document.
    Error(String),
    /// Text extraction has not finished.
    Processing,
    Ready,
}

/// The search match currently in focus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchMatch {
    /// Zero-based position in the match list.
    pub index: usize,
    pub total: usize,
    /// UTF-16 range in the raw text.
    pub range: Range<usize>,
}

#[derive(Debug, Default)]
struct SearchState {
    query: String,
    matches: Vec<Range<usize>>,
    current: usize,
}

pub struct ViewerController<'a> {
    documents: &'a dyn DocumentSource,
    store: &'a dyn AnnotationStore,
    identity: &'a dyn IdentityProvider,
    state: ViewState,
    document: Option<Document>,
    current_user: Option<UserId>,
    annotations: Vec<AnnotationWithUser>,
    subscription: Option<Subscription>,
    selected: Option<AnnotationId>,
    search: SearchState,
}

impl<'a> ViewerController<'a> {
    pub fn new(
        documents: &'a dyn DocumentSource,
        store: &'a dyn AnnotationStore,
        identity: &'a dyn IdentityProvider,
    ) -> Self {
        Self {
            documents,
            store,
            identity,
            state: ViewState::Loading,
            document: None,
            current_user: None,
            annotations: Vec::new(),
            subscription: None,
            selected: None,
            search: SearchState::default(),
        }
    }

    /// A controller over one backend that plays every collaborator role.
    pub fn over<B>(backend: &'a B) -> Self
    where
        B: DocumentSource + AnnotationStore + IdentityProvider,
    {
        Self::new(backend, backend, backend)
    }

    /// Mounts the viewer on a document.
    ///
    /// Any previous subscription is released first. Annotations are loaded and
    /// the realtime channel opened only when the document is ready.
    pub fn open(&mut self, document_id: DocumentId) -> &ViewState {
        self.unmount();
        self.reset();

        self.current_user = self.identity.current_user();
        tracing::debug!(document = %document_id, user = ?self.current_user, "opening document");

        self.state = match self.documents.get_document(document_id, self.current_user) {
            Err(e) => {
                tracing::warn!(document = %document_id, error = %e, "document load failed");
                ViewState::Error(e.to_string())
            }
            Ok(None) => ViewState::NotFound,
            Ok(Some(document)) if document.permission_level.is_none() => {
                tracing::debug!(document = %document_id, "no access to document");
                ViewState::NotFound
            }
            Ok(Some(document)) => {
                let state = match document.status {
                    DocumentStatus::Processing => ViewState::Processing,
                    DocumentStatus::Error => {
                        ViewState::Error("document processing failed".to_string())
                    }
                    DocumentStatus::Ready => ViewState::Ready,
                };
                self.document = Some(document);
                state
            }
        };

        if self.state == ViewState::Ready {
            self.reload_annotations();
            self.subscription = Some(self.store.subscribe(document_id));
        }

        &self.state
    }

    /// Releases the realtime subscription. Safe to call repeatedly.
    pub fn unmount(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.close();
        }
    }

    fn reset(&mut self) {
        self.state = ViewState::Loading;
        self.document = None;
        self.annotations.clear();
        self.selected = None;
        self.search = SearchState::default();
    }

    /// Re-lists annotations. A failed load degrades to an empty list so the
    /// document stays readable.
    pub fn reload_annotations(&mut self) {
        let Some(document_id) = self.document_id() else {
            return;
        };
        match self.store.list(document_id) {
            Ok(annotations) => self.annotations = annotations,
            Err(e) => {
                tracing::warn!(document = %document_id, error = %e, "failed to load annotations");
                self.annotations.clear();
            }
        }
        if let Some(id) = self.selected
            && !self.annotations.iter().any(|a| a.id == id)
        {
            self.selected = None;
        }
    }

    /// Applies pending realtime changes and returns how many were seen.
    ///
    /// Inserts and updates trigger one re-list per batch; deletes are applied
    /// locally and clear the selection when it pointed at the removed row.
    pub fn pump_realtime(&mut self) -> usize {
        let Some(subscription) = self.subscription.as_mut() else {
            return 0;
        };
        let events = subscription.poll();
        let mut refetch = subscription.take_lagged();

        for event in &events {
            match event {
                RealtimeEvent::Insert(_) | RealtimeEvent::Update(_) => refetch = true,
                RealtimeEvent::Delete { id } => self.remove_local(*id),
            }
        }

        if refetch {
            self.reload_annotations();
        }
        events.len()
    }

    fn remove_local(&mut self, id: AnnotationId) {
        self.annotations.retain(|a| a.id != id);
        if self.selected == Some(id) {
            self.selected = None;
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ViewState::Ready
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn document_id(&self) -> Option<DocumentId> {
        self.document.as_ref().map(|d| d.id)
    }

    pub fn current_user(&self) -> Option<UserId> {
        self.current_user
    }

    pub fn annotations(&self) -> &[AnnotationWithUser] {
        &self.annotations
    }

    pub fn threads(&self) -> Vec<AnnotationThread> {
        build_threads(&self.annotations)
    }

    pub fn thread_index(&self) -> ThreadIndex<'_> {
        ThreadIndex::new(&self.annotations)
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.as_ref().is_some_and(Subscription::is_open)
    }

    pub fn permissions(&self) -> AnnotationPermissions {
        match &self.document {
            Some(doc) => {
                AnnotationPermissions::resolve(doc.permission_level, self.current_user, doc.owner_id)
            }
            None => AnnotationPermissions::none(UserId::new(0)),
        }
    }

    // --- selection ---

    pub fn selected(&self) -> Option<AnnotationId> {
        self.selected
    }

    /// Selects an annotation, or clears the selection with `None`.
    pub fn select(&mut self, id: Option<AnnotationId>) {
        self.selected = id;
    }

    /// Selection handler for highlight clicks: clicking the selected
    /// highlight again deselects it.
    pub fn toggle_selected(&mut self, id: AnnotationId) {
        self.selected = if self.selected == Some(id) {
            None
        } else {
            Some(id)
        };
    }

    // --- mutations ---

    fn ready_document(&self) -> Result<DocumentId, ViewerError> {
        match (&self.state, &self.document) {
            (ViewState::Ready, Some(doc)) => Ok(doc.id),
            _ => Err(ViewerError::NotReady),
        }
    }

    /// Measures `[start, end)` against the raw text and highlights it.
    pub fn highlight_range(&mut self, start: usize, end: usize) -> Result<Annotation, ViewerError> {
        self.ready_document()?;
        let text = self.document.as_ref().map(Document::text).unwrap_or("");
        let selection = measure_selection(text, start, end)?;
        self.create_highlight(&selection)
    }

    /// Persists a highlight for a measured selection, then re-lists.
    ///
    /// Nothing is added locally if the store refuses the write.
    pub fn create_highlight(&mut self, selection: &Selection) -> Result<Annotation, ViewerError> {
        let document_id = self.ready_document()?;
        if !self.permissions().can_create {
            return Err(ViewerError::Forbidden("you cannot annotate this document"));
        }
        if selection.is_blank() {
            return Err(ViewerError::EmptySelection);
        }

        let annotation = self.store.create_highlight(
            document_id,
            selection.start,
            selection.end,
            &selection.text,
        )?;
        self.reload_annotations();
        Ok(annotation)
    }

    /// Replies to a highlight or comment, then re-lists.
    pub fn add_comment(
        &mut self,
        parent_id: AnnotationId,
        content: &str,
    ) -> Result<Annotation, ViewerError> {
        let document_id = self.ready_document()?;
        let content = content.trim();
        if content.is_empty() {
            return Err(ViewerError::EmptyComment);
        }
        if !self.permissions().can_create {
            return Err(ViewerError::Forbidden("you cannot comment on this document"));
        }

        let annotation = self.store.create_comment(document_id, parent_id, content)?;
        self.reload_annotations();
        Ok(annotation)
    }

    /// Deletes an annotation, then re-lists.
    ///
    /// The row stays in the local list until the store confirms.
    pub fn delete_annotation(&mut self, id: AnnotationId) -> Result<(), ViewerError> {
        self.ready_document()?;
        if let Some(annotation) = self.annotations.iter().find(|a| a.id == id)
            && !self.permissions().can_delete(annotation)
        {
            return Err(ViewerError::Forbidden("you cannot delete this annotation"));
        }

        self.store.delete(id)?;
        if self.selected == Some(id) {
            self.selected = None;
        }
        self.reload_annotations();
        Ok(())
    }

    // --- search ---

    /// Replaces the search query and recomputes matches against the raw text.
    ///
    /// Matching is case-insensitive, literal and overlapping. A blank query
    /// clears the results. Matches that cross a highlight edge are counted
    /// here but left unmarked by [`render_html`], which only marks within
    /// one text run.
    pub fn set_search(&mut self, query: &str) {
        self.search = SearchState {
            query: query.to_string(),
            matches: Vec::new(),
            current: 0,
        };
        if query.trim().is_empty() {
            return;
        }
        let Some(text) = self.document.as_ref().and_then(|d| d.raw_text.as_deref()) else {
            return;
        };
        self.search.matches = find_matches(text, query);
        tracing::debug!(query, matches = self.search.matches.len(), "search updated");
    }

    pub fn clear_search(&mut self) {
        self.set_search("");
    }

    pub fn search_query(&self) -> &str {
        &self.search.query
    }

    /// Start offsets (UTF-16) of every match, ascending.
    pub fn match_offsets(&self) -> Vec<usize> {
        self.search.matches.iter().map(|m| m.start).collect()
    }

    /// Every match as a UTF-16 range, ascending by start.
    pub fn matches(&self) -> &[Range<usize>] {
        &self.search.matches
    }

    pub fn current_match(&self) -> Option<SearchMatch> {
        let range = self.search.matches.get(self.search.current)?;
        Some(SearchMatch {
            index: self.search.current,
            total: self.search.matches.len(),
            range: range.clone(),
        })
    }

    /// Moves to the next match, wrapping to the first.
    pub fn next_match(&mut self) -> Option<SearchMatch> {
        let total = self.search.matches.len();
        if total == 0 {
            return None;
        }
        self.search.current = (self.search.current + 1) % total;
        self.current_match()
    }

    /// Moves to the previous match, wrapping to the last.
    pub fn previous_match(&mut self) -> Option<SearchMatch> {
        let total = self.search.matches.len();
        if total == 0 {
            return None;
        }
        self.search.current = (self.search.current + total - 1) % total;
        self.current_match()
    }

    /// A one-line snippet around the current match, up to `radius` characters
    /// either side.
    pub fn match_context(&self, radius: usize) -> Option<String> {
        let current = self.current_match()?;
        let text = self.document.as_ref()?.raw_text.as_deref()?;
        let start = byte_index(text, current.range.start).ok()?;
        let end = byte_index(text, current.range.end).ok()?;

        let before: String = {
            let mut chars: Vec<char> = text[..start].chars().rev().take(radius).collect();
            chars.reverse();
            chars.into_iter().collect()
        };
        let after: String = text[end..].chars().take(radius).collect();

        let mut snippet = String::new();
        if before.len() < start {
            snippet.push_str("...");
        }
        snippet.push_str(&before);
        snippet.push_str(&text[start..end]);
        snippet.push_str(&after);
        if end + after.len() < text.len() {
            snippet.push_str("...");
        }

        Some(normalize_newlines(&snippet).replace("\n\n", " "))
    }

    // --- rendering ---

    /// Body markup with highlights, the current selection and search marks.
    pub fn rendered_html(&self) -> String {
        let text = self.document.as_ref().map(Document::text).unwrap_or("");
        let term = Some(self.search.query.as_str()).filter(|q| !q.trim().is_empty());
        render_html(text, &self.annotations, term, self.selected)
    }
}

impl Drop for ViewerController<'_> {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Overlapping, case-insensitive literal matches of `query`, as UTF-16 ranges.
fn find_matches(text: &str, query: &str) -> Vec<Range<usize>> {
    let re = match RegexBuilder::new(&regex::escape(query))
        .case_insensitive(true)
        .build()
    {
        Ok(re) => re,
        Err(e) => {
            tracing::warn!(error = %e, "search pattern rejected");
            return Vec::new();
        }
    };

    let mut matches = Vec::new();
    let mut from = 0;
    // Byte and UTF-16 position of the previous match start; matches arrive in
    // order, so only the gap since the last one is measured.
    let (mut byte, mut unit) = (0, 0);
    while let Some(found) = re.find_at(text, from) {
        unit += utf16_len(&text[byte..found.start()]);
        byte = found.start();
        matches.push(unit..unit + utf16_len(found.as_str()));

        // Step one character so overlapping occurrences are found too.
        let step = text[found.start()..].chars().next().map_or(1, char::len_utf8);
        from = found.start() + step;
        if from > text.len() {
            break;
        }
    }
    matches
}
