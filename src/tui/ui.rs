//! UI rendering functions for the TUI.
//!
//! Lays out the search bar, the annotated document, the thread sidebar and
//! a status line. The document pane is cut with the same segmenter as the
//! HTML renderer, so offsets and newline handling agree between the two.

use std::ops::Range;

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use time::OffsetDateTime;

use super::app::{App, Focus};
use crate::models::{AnnotationThread, AnnotationWithUser};
use crate::offsets::Utf16Cursor;
use crate::render::{HighlightSpan, highlight_spans, normalize_newlines, segment};
use crate::threads::ThreadIndex;
use crate::utils::{format_relative_time, now};
use crate::viewer::ViewState;

const QUOTE_WIDTH: usize = 36;
const COMMENT_WIDTH: usize = 48;

/// Main rendering function for the TUI.
pub fn draw(frame: &mut Frame, app: &App) {
    let size = frame.area();

    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Search input
            Constraint::Min(0),    // Document and threads
            Constraint::Length(1), // Status / shortcut bar
        ])
        .split(size);

    let content_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(main_chunks[1]);

    render_search_input(frame, app, main_chunks[0]);
    render_document(frame, app, content_chunks[0]);
    render_threads(frame, app, content_chunks[1]);
    render_status_bar(frame, app, main_chunks[2]);
}

fn border_style(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    }
}

fn render_search_input(frame: &mut Frame, app: &App, area: Rect) {
    let is_focused = app.focus() == Focus::SearchInput;

    let title = match app.viewer().current_match() {
        Some(m) => format!("Search ({}/{})", m.index + 1, m.total),
        None => "Search".to_string(),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(border_style(is_focused));

    let mut content = app.search_input().to_string();
    if is_focused {
        content.push('█');
    }

    frame.render_widget(Paragraph::new(content).block(block), area);
}

fn render_document(frame: &mut Frame, app: &App, area: Rect) {
    let viewer = app.viewer();
    let title = match viewer.document() {
        Some(doc) => match doc.permission_level {
            Some(level) => format!("{} [{}]", doc.display_title(), level),
            None => doc.display_title().to_string(),
        },
        None => "Document".to_string(),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(border_style(app.focus() == Focus::Document));

    let lines = match viewer.state() {
        ViewState::Ready => {
            let text = viewer.document().map(|d| d.text()).unwrap_or("");
            let spans = highlight_spans(viewer.annotations(), viewer.selected());
            let current = viewer.current_match().map(|m| m.range);
            document_lines(text, &spans, viewer.matches(), current)
        }
        ViewState::Loading => vec![Line::from("Loading...")],
        ViewState::NotFound => vec![Line::from("Document not found")],
        ViewState::Processing => vec![Line::from("This document is still being processed.")],
        ViewState::Error(message) => vec![Line::styled(
            format!("Processing failed: {message}"),
            Style::default().fg(Color::Red),
        )],
    };

    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.document_scroll(), 0));
    frame.render_widget(paragraph, area);
}

fn render_threads(frame: &mut Frame, app: &App, area: Rect) {
    let viewer = app.viewer();
    let threads = app.threads();
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("Threads ({})", threads.len()))
        .border_style(border_style(app.focus() == Focus::Threads));

    let index = viewer.thread_index();
    let now = now();
    let items: Vec<ListItem> = threads
        .iter()
        .map(|thread| ListItem::new(thread_lines(thread, &index, now)))
        .collect();

    let list = List::new(items).block(block).highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    );

    let mut state = ListState::default();
    state.select(app.selected_position());
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let key_style = Style::default().fg(Color::Cyan);
    let sep_style = Style::default().fg(Color::DarkGray);

    let line = match app.status() {
        Some(status) => Line::from(Span::raw(status.to_string())),
        None => {
            let mut spans = vec![
                Span::styled("q", key_style),
                Span::raw(": quit"),
                Span::styled(" | ", sep_style),
                Span::styled("Tab", key_style),
                Span::raw(": next panel"),
                Span::styled(" | ", sep_style),
                Span::styled("/", key_style),
                Span::raw(": search"),
                Span::styled(" | ", sep_style),
                Span::styled("n/N", key_style),
                Span::raw(": next/prev match"),
            ];
            match app.focus() {
                Focus::Threads => {
                    spans.push(Span::styled(" | ", sep_style));
                    spans.push(Span::styled("j/k", key_style));
                    spans.push(Span::raw(": thread"));
                    if app.viewer().permissions().can_create {
                        spans.push(Span::styled(" | ", sep_style));
                        spans.push(Span::styled("d", key_style));
                        spans.push(Span::raw(": delete"));
                    }
                }
                Focus::Document => {
                    spans.push(Span::styled(" | ", sep_style));
                    spans.push(Span::styled("j/k", key_style));
                    spans.push(Span::raw(": scroll"));
                }
                Focus::SearchInput => {}
            }
            Line::from(spans)
        }
    };

    frame.render_widget(Paragraph::new(line), area);
}

fn highlight_style(span: &HighlightSpan) -> Style {
    let mut style = Style::default().bg(Color::Yellow).fg(Color::Black);
    if span.has_replies {
        style = style.add_modifier(Modifier::UNDERLINED);
    }
    if span.selected {
        style = style.bg(Color::LightYellow).add_modifier(Modifier::BOLD);
    }
    style
}

fn match_style(current: bool) -> Style {
    if current {
        Style::default().bg(Color::Cyan).fg(Color::Black)
    } else {
        Style::default().bg(Color::Magenta).fg(Color::White)
    }
}

/// Styled lines for the document body.
///
/// Each highlight segment is further cut where search matches begin and end;
/// every piece is sliced from the raw text by UTF-16 range and
/// newline-normalized on its own. A paragraph break ends the current line and
/// leaves a blank one.
///
/// `matches` must be sorted by start. Segments and matches are swept together
/// left to right, so the cost grows with the text and the match count, not
/// their product.
fn document_lines(
    text: &str,
    spans: &[HighlightSpan],
    matches: &[Range<usize>],
    current: Option<Range<usize>>,
) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let mut line: Vec<Span<'static>> = Vec::new();
    let mut slicer = Utf16Cursor::new(text);
    // Next match not yet started, and the furthest end of those that have.
    let mut next = 0;
    let mut reach = 0;
    let mut swept = 0;

    for seg in segment(text, spans) {
        let base = seg.highlight.as_ref().map(highlight_style).unwrap_or_default();
        if seg.range.start < swept {
            // Overlapping highlight: sweep the matches again from the top.
            next = 0;
            reach = 0;
        }

        let mut pos = seg.range.start;
        while pos < seg.range.end {
            while let Some(m) = matches.get(next)
                && m.start <= pos
            {
                reach = reach.max(m.end);
                next += 1;
            }

            let mut end = seg.range.end;
            if let Some(m) = matches.get(next) {
                end = end.min(m.start);
            }
            if reach > pos {
                end = end.min(reach);
            }
            if let Some(c) = &current {
                for point in [c.start, c.end] {
                    if point > pos {
                        end = end.min(point);
                    }
                }
            }

            let in_current = current.as_ref().is_some_and(|c| c.start <= pos && pos < c.end);
            let style = if in_current {
                base.patch(match_style(true))
            } else if reach > pos {
                base.patch(match_style(false))
            } else {
                base
            };

            let range = pos..end;
            pos = end;
            let Ok(piece) = slicer.slice(range) else {
                continue;
            };
            let normalized = normalize_newlines(piece);
            for (i, part) in normalized.split("\n\n").enumerate() {
                if i > 0 {
                    lines.push(Line::from(std::mem::take(&mut line)));
                    lines.push(Line::default());
                }
                if !part.is_empty() {
                    line.push(Span::styled(part.to_string(), style));
                }
            }
        }
        swept = swept.max(seg.range.end);
    }

    if !line.is_empty() || lines.is_empty() {
        lines.push(Line::from(line));
    }
    lines
}

/// Sidebar entry for one thread: the quoted highlight, who made it and
/// when, then its comment tree indented by depth.
fn thread_lines(
    thread: &AnnotationThread,
    index: &ThreadIndex<'_>,
    now: OffsetDateTime,
) -> Vec<Line<'static>> {
    let highlight = &thread.highlight;
    let quote = normalize_newlines(highlight.selection_text.as_deref().unwrap_or(""))
        .replace("\n\n", " ");

    let mut lines = vec![
        Line::styled(
            format!("\"{}\"", truncate(&quote, QUOTE_WIDTH)),
            Style::default().fg(Color::Yellow),
        ),
        byline(highlight, now),
    ];

    for node in index.comment_tree(highlight.id) {
        let content = node.comment.content.as_deref().unwrap_or("").trim();
        lines.push(Line::from(vec![
            Span::raw("  ".repeat(node.depth + 1)),
            Span::styled(
                node.comment.user.display_name().to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::raw(": "),
            Span::raw(truncate(&content.replace('\n', " "), COMMENT_WIDTH)),
        ]));
    }
    lines.push(Line::default());
    lines
}

fn byline(annotation: &AnnotationWithUser, now: OffsetDateTime) -> Line<'static> {
    Line::styled(
        format!(
            "{} · {}",
            annotation.user.display_name(),
            format_relative_time(annotation.created_at, now)
        ),
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
    )
}

/// Cuts `s` to at most `width` characters, ending in "..." when cut.
fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let kept: String = s.chars().take(width.saturating_sub(3)).collect();
    format!("{kept}...")
}
