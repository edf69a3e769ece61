//! Keyboard event handling for the TUI.
//!
//! Maps crossterm keyboard events to application state changes.
//! Key behavior depends on which panel has focus.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use super::app::{App, Focus};

/// Handles a keyboard event and updates the app state accordingly.
///
/// Returns `true` if the application should quit, `false` otherwise.
///
/// # Event Handling
///
/// - `Ctrl+C`: Quit from anywhere
/// - `q`: Quit, unless the search input is being typed into
/// - `Tab` / `Shift+Tab`: Cycle focus between panels
/// - `Esc`: Leave the search input, or clear the selection
/// - `/`: Jump to the search input
/// - `n` / `N`: Next / previous search match
/// - When `Document` focused: j/k scroll
/// - When `Threads` focused: j/k move between threads, `d` deletes
pub fn handle_key_event(app: &mut App, key: KeyEvent) -> bool {
    if key.code == KeyCode::Char('c') && key.modifiers == KeyModifiers::CONTROL {
        return true;
    }

    if key.code == KeyCode::Tab {
        app.next_focus();
        return false;
    }
    if key.code == KeyCode::BackTab {
        app.prev_focus();
        return false;
    }

    if app.focus() == Focus::SearchInput {
        handle_search_input(app, key);
        return false;
    }

    match key.code {
        KeyCode::Char('q') if key.modifiers.is_empty() => return true,
        KeyCode::Esc => app.clear_selection(),
        KeyCode::Char('/') => app.set_focus(Focus::SearchInput),
        KeyCode::Char('n') if key.modifiers.is_empty() => app.next_match(),
        KeyCode::Char('N') => app.previous_match(),
        _ => match app.focus() {
            Focus::Document => handle_document(app, key),
            Focus::Threads => handle_threads(app, key),
            Focus::SearchInput => {}
        },
    }

    false
}

/// Typing edits the query; Enter and Esc hand focus back to the document.
fn handle_search_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char(c) if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT => {
            app.push_search_char(c);
        }
        KeyCode::Backspace => app.pop_search_char(),
        KeyCode::Enter | KeyCode::Esc => app.set_focus(Focus::Document),
        _ => {}
    }
}

fn handle_document(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.scroll_document_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_document_up(1),
        KeyCode::PageDown => app.scroll_document_down(10),
        KeyCode::PageUp => app.scroll_document_up(10),
        _ => {}
    }
}

fn handle_threads(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.select_next_thread(),
        KeyCode::Char('k') | KeyCode::Up => app.select_previous_thread(),
        KeyCode::Char('d') if key.modifiers.is_empty() => app.delete_selected(),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentId;
    use crate::{AnnotationStore, Database, Library, StaticIdentity, ViewerController};

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn library() -> (Library, DocumentId) {
        let library = Library::new(Database::in_memory().unwrap());
        let ada = library.create_user("ada", None).unwrap();
        let library = library.with_identity(StaticIdentity::user(ada.id));
        let doc = library
            .create_document(Some("Fox"), "the fox and the quail", None)
            .unwrap();
        library.create_highlight(doc.id, 4, 7, "fox").unwrap();
        library.create_highlight(doc.id, 16, 21, "quail").unwrap();
        (library, doc.id)
    }

    #[test]
    fn q_quits_outside_search_input() {
        let (library, doc) = library();
        let mut app = App::new(ViewerController::over(&library));
        app.open(doc);

        assert!(handle_key_event(&mut app, press(KeyCode::Char('q'))));
    }

    #[test]
    fn q_is_typed_into_search_input() {
        let (library, doc) = library();
        let mut app = App::new(ViewerController::over(&library));
        app.open(doc);
        app.set_focus(Focus::SearchInput);

        let should_quit = handle_key_event(&mut app, press(KeyCode::Char('q')));

        assert!(!should_quit);
        assert_eq!(app.search_input(), "q");
    }

    #[test]
    fn ctrl_c_quits_from_any_focus() {
        let (library, doc) = library();
        let mut app = App::new(ViewerController::over(&library));
        app.open(doc);
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);

        for focus in [Focus::SearchInput, Focus::Document, Focus::Threads] {
            app.set_focus(focus);
            assert!(handle_key_event(&mut app, ctrl_c), "{focus:?}");
        }
    }

    #[test]
    fn tab_key_cycles_focus() {
        let (library, doc) = library();
        let mut app = App::new(ViewerController::over(&library));
        app.open(doc);

        handle_key_event(&mut app, press(KeyCode::Tab));
        assert_eq!(app.focus(), Focus::Threads);
        handle_key_event(&mut app, press(KeyCode::Tab));
        assert_eq!(app.focus(), Focus::SearchInput);
        handle_key_event(&mut app, press(KeyCode::Tab));
        assert_eq!(app.focus(), Focus::Document);
        handle_key_event(&mut app, press(KeyCode::BackTab));
        assert_eq!(app.focus(), Focus::SearchInput);
    }

    #[test]
    fn search_then_jump_between_matches() {
        let (library, doc) = library();
        let mut app = App::new(ViewerController::over(&library));
        app.open(doc);

        handle_key_event(&mut app, press(KeyCode::Char('/')));
        for c in "the".chars() {
            handle_key_event(&mut app, press(KeyCode::Char(c)));
        }
        handle_key_event(&mut app, press(KeyCode::Enter));

        assert_eq!(app.focus(), Focus::Document);
        assert_eq!(app.viewer().match_offsets(), vec![0, 12]);
        assert_eq!(app.viewer().current_match().unwrap().index, 0);

        handle_key_event(&mut app, press(KeyCode::Char('n')));
        assert_eq!(app.viewer().current_match().unwrap().index, 1);
        handle_key_event(&mut app, press(KeyCode::Char('n')));
        assert_eq!(app.viewer().current_match().unwrap().index, 0);
        handle_key_event(&mut app, KeyEvent::new(KeyCode::Char('N'), KeyModifiers::SHIFT));
        assert_eq!(app.viewer().current_match().unwrap().index, 1);
    }

    #[test]
    fn backspace_on_empty_search_is_safe() {
        let (library, doc) = library();
        let mut app = App::new(ViewerController::over(&library));
        app.open(doc);
        app.set_focus(Focus::SearchInput);

        handle_key_event(&mut app, press(KeyCode::Backspace));

        assert_eq!(app.search_input(), "");
    }

    #[test]
    fn jk_moves_between_threads_when_threads_focused() {
        let (library, doc) = library();
        let mut app = App::new(ViewerController::over(&library));
        app.open(doc);
        app.set_focus(Focus::Threads);
        assert_eq!(app.selected_position(), Some(0));

        handle_key_event(&mut app, press(KeyCode::Char('j')));
        assert_eq!(app.selected_position(), Some(1));
        handle_key_event(&mut app, press(KeyCode::Char('k')));
        assert_eq!(app.selected_position(), Some(0));
    }

    #[test]
    fn jk_scrolls_when_document_focused() {
        let (library, doc) = library();
        let mut app = App::new(ViewerController::over(&library));
        app.open(doc);

        handle_key_event(&mut app, press(KeyCode::Char('j')));
        handle_key_event(&mut app, press(KeyCode::Char('j')));
        handle_key_event(&mut app, press(KeyCode::Char('k')));

        assert_eq!(app.document_scroll(), 1);
        assert_eq!(app.selected_annotation(), None);
    }

    #[test]
    fn esc_clears_selection() {
        let (library, doc) = library();
        let mut app = App::new(ViewerController::over(&library));
        app.open(doc);
        app.set_focus(Focus::Threads);
        assert!(app.selected_annotation().is_some());

        handle_key_event(&mut app, press(KeyCode::Esc));

        assert_eq!(app.selected_annotation(), None);
        assert_eq!(app.focus(), Focus::Threads);
    }

    #[test]
    fn d_deletes_selected_thread() {
        let (library, doc) = library();
        let mut app = App::new(ViewerController::over(&library));
        app.open(doc);
        app.set_focus(Focus::Threads);

        handle_key_event(&mut app, press(KeyCode::Char('d')));

        assert_eq!(app.threads().len(), 1);
    }

    #[test]
    fn d_is_ignored_in_document_pane() {
        let (library, doc) = library();
        let mut app = App::new(ViewerController::over(&library));
        app.open(doc);
        app.select_next_thread();

        handle_key_event(&mut app, press(KeyCode::Char('d')));

        assert_eq!(app.threads().len(), 2);
    }
}
