use crate::models::{AnnotationId, AnnotationThread, DocumentId};
use crate::viewer::{ViewState, ViewerController};

/// Application state for the TUI.
///
/// Wraps one [`ViewerController`] and adds what only the terminal needs:
/// panel focus, the search input buffer, document scroll and a status line.
pub struct App<'a> {
    viewer: ViewerController<'a>,
    /// Search input buffer, mirrored into the viewer on every keystroke
    search_input: String,
    /// Currently focused panel
    focus: Focus,
    /// Scroll offset for the document pane
    document_scroll: u16,
    /// One-line feedback shown in the status bar
    status: Option<String>,
}

/// Panel focus state for keyboard navigation.
///
/// Determines which panel receives keyboard input and how keys are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    /// Search bar is focused (typing updates the query)
    SearchInput,
    /// Document pane is focused (j/k scroll, n/N jump between matches)
    Document,
    /// Thread sidebar is focused (j/k move between threads, d deletes)
    Threads,
}

impl<'a> App<'a> {
    /// Creates an App over `viewer`, focused on the document.
    pub fn new(viewer: ViewerController<'a>) -> Self {
        Self {
            viewer,
            search_input: String::new(),
            focus: Focus::Document,
            document_scroll: 0,
            status: None,
        }
    }

    /// Opens a document in the wrapped viewer.
    pub fn open(&mut self, document_id: DocumentId) {
        self.search_input.clear();
        self.document_scroll = 0;
        let state = self.viewer.open(document_id).clone();
        self.status = match state {
            ViewState::Ready => None,
            ViewState::NotFound => Some("Document not found".to_string()),
            ViewState::Processing => Some("Document is still processing".to_string()),
            ViewState::Error(message) => Some(format!("Error: {message}")),
            ViewState::Loading => None,
        };
    }

    pub fn viewer(&self) -> &ViewerController<'a> {
        &self.viewer
    }

    pub fn search_input(&self) -> &str {
        &self.search_input
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    pub fn document_scroll(&self) -> u16 {
        self.document_scroll
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Applies pending realtime changes. Called once per event-loop tick.
    pub fn tick(&mut self) {
        let seen = self.viewer.pump_realtime();
        if seen > 0 {
            tracing::debug!(events = seen, "applied realtime changes");
        }
    }

    // --- focus ---

    /// Cycles focus: `SearchInput` -> `Document` -> `Threads` -> `SearchInput`.
    pub fn next_focus(&mut self) {
        self.focus = match self.focus {
            Focus::SearchInput => Focus::Document,
            Focus::Document => Focus::Threads,
            Focus::Threads => Focus::SearchInput,
        };
        self.auto_select_on_threads_focus();
    }

    /// Cycles focus in reverse Tab order.
    pub fn prev_focus(&mut self) {
        self.focus = match self.focus {
            Focus::SearchInput => Focus::Threads,
            Focus::Document => Focus::SearchInput,
            Focus::Threads => Focus::Document,
        };
        self.auto_select_on_threads_focus();
    }

    pub fn set_focus(&mut self, focus: Focus) {
        self.focus = focus;
        self.auto_select_on_threads_focus();
    }

    fn auto_select_on_threads_focus(&mut self) {
        if self.focus == Focus::Threads && self.selected_position().is_none() {
            self.select_next_thread();
        }
    }

    // --- search ---

    pub fn push_search_char(&mut self, c: char) {
        self.search_input.push(c);
        self.viewer.set_search(&self.search_input);
        self.report_match();
    }

    pub fn pop_search_char(&mut self) {
        self.search_input.pop();
        self.viewer.set_search(&self.search_input);
        self.report_match();
    }

    pub fn next_match(&mut self) {
        self.viewer.next_match();
        self.report_match();
    }

    pub fn previous_match(&mut self) {
        self.viewer.previous_match();
        self.report_match();
    }

    fn report_match(&mut self) {
        self.status = match self.viewer.current_match() {
            Some(m) => {
                let context = self.viewer.match_context(24).unwrap_or_default();
                Some(format!("Match {}/{}: {context}", m.index + 1, m.total))
            }
            None if self.search_input.trim().is_empty() => None,
            None => Some("No matches".to_string()),
        };
    }

    // --- threads ---

    /// Sidebar threads, newest highlight first.
    pub fn threads(&self) -> Vec<AnnotationThread> {
        self.viewer.threads()
    }

    /// Position of the selected highlight in the sidebar.
    pub fn selected_position(&self) -> Option<usize> {
        let selected = self.viewer.selected()?;
        self.threads()
            .iter()
            .position(|t| t.highlight.id == selected)
    }

    /// Moves the selection down the sidebar, wrapping at the end.
    pub fn select_next_thread(&mut self) {
        let threads = self.threads();
        if threads.is_empty() {
            return;
        }
        let next = self
            .selected_position()
            .map_or(0, |p| (p + 1) % threads.len());
        self.viewer.select(Some(threads[next].highlight.id));
    }

    /// Moves the selection up the sidebar, wrapping at the start.
    pub fn select_previous_thread(&mut self) {
        let threads = self.threads();
        if threads.is_empty() {
            return;
        }
        let previous = self
            .selected_position()
            .map_or(threads.len() - 1, |p| (p + threads.len() - 1) % threads.len());
        self.viewer.select(Some(threads[previous].highlight.id));
    }

    pub fn clear_selection(&mut self) {
        self.viewer.select(None);
    }

    pub fn selected_annotation(&self) -> Option<AnnotationId> {
        self.viewer.selected()
    }

    /// Deletes the selected highlight. Refusals and failures go to the
    /// status line and leave the thread in place.
    pub fn delete_selected(&mut self) {
        let Some(id) = self.viewer.selected() else {
            return;
        };
        self.status = match self.viewer.delete_annotation(id) {
            Ok(()) => Some("Annotation deleted".to_string()),
            Err(e) => {
                tracing::warn!(annotation = %id, error = %e, "delete failed");
                Some(format!("Cannot delete: {e}"))
            }
        };
    }

    // --- scrolling ---

    pub fn scroll_document_down(&mut self, lines: u16) {
        self.document_scroll = self.document_scroll.saturating_add(lines);
    }

    pub fn scroll_document_up(&mut self, lines: u16) {
        self.document_scroll = self.document_scroll.saturating_sub(lines);
    }
}
