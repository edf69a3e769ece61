//! Safe HTML for a document body with highlight and search overlays.
//!
//! The pipeline runs in a fixed order:
//!
//! 1. The raw text is cut into segments at highlight boundaries, using UTF-16
//!    offsets into the un-normalized, un-escaped text.
//! 2. Each segment is normalized, escaped exactly once and wrapped in a
//!    highlight mark when it belongs to one.
//! 3. Search matches are marked over the finished markup, outside tags only.
//!
//! The output carries no event handlers. Highlight marks expose their id in a
//! `data-annotation-id` attribute and clicks are resolved by [`ClickDelegate`].

mod escape;
mod normalize;
mod search;
mod segments;

use std::fmt::Write as _;

pub use escape::escape_html;
pub use normalize::{normalize_newlines, paragraphs};
pub use search::mark_search_matches;
pub use segments::{HighlightSpan, Segment, highlight_spans, segment};

use crate::models::{AnnotationId, AnnotationWithUser};

/// Attribute naming the annotation a highlight mark belongs to.
pub const ANNOTATION_ID_ATTR: &str = "data-annotation-id";

/// Markup for the document body.
///
/// Identical inputs always produce byte-identical output.
///
/// # Examples
///
/// ```
/// use marginalia::render::render_html;
///
/// let html = render_html("Tom & Jerry", &[], Some("jerry"), None);
/// assert_eq!(html, r#"Tom &amp; <mark class="search-match">Jerry</mark>"#);
/// ```
pub fn render_html(
    text: &str,
    annotations: &[AnnotationWithUser],
    search_term: Option<&str>,
    selected: Option<AnnotationId>,
) -> String {
    let spans = highlight_spans(annotations, selected);
    let mut html = String::with_capacity(text.len() + spans.len() * 64);

    for segment in segment(text, &spans) {
        let body = segment_html(segment.text);
        match &segment.highlight {
            Some(span) => {
                let _ = write!(
                    html,
                    r#"<mark class="{}" {ANNOTATION_ID_ATTR}="{}">{body}</mark>"#,
                    highlight_class(span),
                    span.id
                );
            }
            None => html.push_str(&body),
        }
    }

    match search_term {
        Some(term) if !term.trim().is_empty() => mark_search_matches(&html, term),
        _ => html,
    }
}

fn segment_html(raw: &str) -> String {
    escape_html(&normalize_newlines(raw)).replace("\n\n", "<br/><br/>")
}

fn highlight_class(span: &HighlightSpan) -> String {
    let mut class = String::from("annotation-highlight");
    if span.selected {
        class.push_str(" is-selected");
    }
    if span.has_replies {
        class.push_str(" has-replies");
    }
    class
}

/// The annotation whose highlight encloses byte `position` of `markup`,
/// innermost first.
///
/// This is the delegated equivalent of walking from a click target up to the
/// nearest element carrying [`ANNOTATION_ID_ATTR`].
pub fn annotation_at(markup: &str, position: usize) -> Option<AnnotationId> {
    let mut open: Vec<Option<AnnotationId>> = Vec::new();
    let mut rest = markup.get(..position)?;

    while let Some(start) = rest.find('<') {
        let Some(len) = rest[start..].find('>') else {
            break;
        };
        let tag = &rest[start..=start + len];
        if tag.starts_with("</") {
            open.pop();
        } else if !tag.ends_with("/>") {
            open.push(attribute_id(tag));
        }
        rest = &rest[start + len + 1..];
    }

    open.into_iter().rev().flatten().next()
}

fn attribute_id(tag: &str) -> Option<AnnotationId> {
    let needle = format!(r#"{ANNOTATION_ID_ATTR}=""#);
    let value_start = tag.find(&needle)? + needle.len();
    let value_len = tag[value_start..].find('"')?;
    tag[value_start..value_start + value_len].parse().ok()
}

/// One click handler for the whole rendered body.
///
/// Clicks are resolved to the nearest enclosing highlight and forwarded to the
/// callback; clicks on plain text are ignored.
pub struct ClickDelegate<F> {
    on_highlight_click: F,
}

impl<F: FnMut(AnnotationId)> ClickDelegate<F> {
    pub fn new(on_highlight_click: F) -> Self {
        Self { on_highlight_click }
    }

    /// Dispatches a click at byte `position` of `markup`, returning the
    /// annotation it reached, if any.
    pub fn click(&mut self, markup: &str, position: usize) -> Option<AnnotationId> {
        let id = annotation_at(markup, position)?;
        (self.on_highlight_click)(id);
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Annotation, Author, DocumentId, UserId};
    use time::OffsetDateTime;

    const FOX: &str = "The quick brown fox";

    fn author() -> Author {
        Author {
            id: UserId::new(1),
            username: "ada".to_string(),
            full_name: None,
        }
    }

    fn highlight(id: i64, range: std::ops::Range<usize>, text: &str) -> AnnotationWithUser {
        AnnotationWithUser {
            annotation: Annotation::highlight(
                AnnotationId::new(id),
                DocumentId::new(1),
                UserId::new(1),
                range,
                text,
                OffsetDateTime::UNIX_EPOCH,
            ),
            user: author(),
        }
    }

    fn comment(id: i64, parent: i64) -> AnnotationWithUser {
        AnnotationWithUser {
            annotation: Annotation::comment(
                AnnotationId::new(id),
                DocumentId::new(1),
                UserId::new(1),
                AnnotationId::new(parent),
                "reply",
                OffsetDateTime::UNIX_EPOCH,
            ),
            user: author(),
        }
    }

    #[test]
    fn plain_text_is_escaped_only() {
        assert_eq!(render_html("a <b> & c", &[], None, None), "a &lt;b&gt; &amp; c");
    }

    #[test]
    fn highlight_wraps_exactly_its_range() {
        let html = render_html(FOX, &[highlight(7, 4..9, "quick")], None, None);
        assert_eq!(
            html,
            r#"The <mark class="annotation-highlight" data-annotation-id="7">quick</mark> brown fox"#
        );
    }

    #[test]
    fn search_marks_independently_of_highlights() {
        let html = render_html(FOX, &[highlight(7, 4..9, "quick")], Some("fox"), None);
        assert_eq!(
            html,
            concat!(
                r#"The <mark class="annotation-highlight" data-annotation-id="7">quick</mark>"#,
                r#" brown <mark class="search-match">fox</mark>"#
            )
        );
    }

    #[test]
    fn selected_and_replied_highlights_are_flagged() {
        let list = vec![highlight(1, 0..3, "The"), comment(2, 1)];
        let html = render_html(FOX, &list, None, Some(AnnotationId::new(1)));
        assert!(html.starts_with(
            r#"<mark class="annotation-highlight is-selected has-replies" data-annotation-id="1">The</mark>"#
        ));
    }

    #[test]
    fn search_never_touches_annotation_ids() {
        let text = "page 42 says";
        let html = render_html(text, &[highlight(42, 0..4, "page")], Some("42"), None);

        assert!(html.contains(r#"data-annotation-id="42""#));
        assert_eq!(html.matches("search-match").count(), 1);
        assert!(html.contains(r#" <mark class="search-match">42</mark> says"#));
    }

    #[test]
    fn markup_in_text_cannot_escape_a_highlight() {
        let text = r#"<script>alert("x")</script>"#;
        let html = render_html(text, &[highlight(1, 0..8, "<script>")], None, None);

        assert!(!html.contains("<script>"));
        assert!(html.starts_with(
            r#"<mark class="annotation-highlight" data-annotation-id="1">&lt;script&gt;</mark>"#
        ));
    }

    #[test]
    fn rendering_is_deterministic_and_escapes_once() {
        let text = "Tom & Jerry\n\n\nfox";
        let list = vec![highlight(1, 0..3, "Tom")];

        let first = render_html(text, &list, Some("&"), None);
        let second = render_html(text, &list, Some("&"), None);

        assert_eq!(first, second);
        assert!(!first.contains("&amp;amp;"));
    }

    #[test]
    fn newlines_are_normalized_per_segment() {
        let text = "soft\nwrap\n\n\n\nnext para";
        let start = 13;
        let html = render_html(text, &[highlight(1, start..start + 4, "next")], None, None);
        assert_eq!(
            html,
            r#"soft wrap<br/><br/><mark class="annotation-highlight" data-annotation-id="1">next</mark> para"#
        );
    }

    #[test]
    fn highlight_spanning_a_soft_wrap_renders_as_space() {
        let text = "quick\nbrown";
        let html = render_html(text, &[highlight(1, 0..11, text)], None, None);
        assert!(html.contains(">quick brown</mark>"));
    }

    #[test]
    fn clicks_resolve_to_the_enclosing_highlight() {
        let html = render_html(FOX, &[highlight(7, 4..9, "quick")], Some("ick"), None);
        let mut clicked = Vec::new();
        let mut delegate = ClickDelegate::new(|id| clicked.push(id));

        let inside_search_mark = html.find("ick</mark>").unwrap();
        assert_eq!(
            delegate.click(&html, inside_search_mark),
            Some(AnnotationId::new(7))
        );
        assert_eq!(delegate.click(&html, 1), None);
        let after = html.rfind("brown").unwrap();
        assert_eq!(delegate.click(&html, after), None);

        drop(delegate);
        assert_eq!(clicked, vec![AnnotationId::new(7)]);
    }
}
