//! Annotated Markdown export of a document.
//!
//! A pure consumer of the annotation model: the body is cut with the same
//! segmenter as the HTML renderer, highlights are marked `==like this==` and
//! numbered, and each highlight's thread follows the body in reading order.

use std::fmt::Write as _;

use time::OffsetDateTime;

use crate::models::{AnnotationWithUser, Document};
use crate::render::{highlight_spans, normalize_newlines, segment};
use crate::threads::ThreadIndex;
use crate::utils::format_date;

/// Renders `document` and its annotation threads as Markdown.
pub fn export_markdown(
    document: &Document,
    annotations: &[AnnotationWithUser],
    exported_at: OffsetDateTime,
) -> String {
    let index = ThreadIndex::new(annotations);
    let mut threads = index.threads();
    threads.sort_by_key(|t| t.highlight.selection_start);

    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", document.display_title());
    let _ = writeln!(
        out,
        "_Exported {}. {} highlight{}._\n",
        format_date(exported_at),
        threads.len(),
        if threads.len() == 1 { "" } else { "s" }
    );

    let numbers: Vec<_> = threads.iter().map(|t| t.highlight.id).collect();
    let spans = highlight_spans(annotations, None);
    for seg in segment(document.text(), &spans) {
        let body = normalize_newlines(seg.text);
        match seg
            .highlight
            .and_then(|span| numbers.iter().position(|id| *id == span.id))
        {
            Some(n) if !body.trim().is_empty() => {
                let _ = write!(out, "=={}==[{}]", body, n + 1);
            }
            _ => out.push_str(&body),
        }
    }
    out.push('\n');

    if threads.is_empty() {
        return out;
    }

    out.push_str("\n## Annotations\n");
    for (n, thread) in threads.iter().enumerate() {
        let highlight = &thread.highlight;
        let quoted = normalize_newlines(highlight.selection_text.as_deref().unwrap_or(""))
            .replace("\n\n", " ");

        let _ = writeln!(out, "\n### [{}] {}\n", n + 1, highlight.user.display_name());
        let _ = writeln!(out, "> {quoted}\n");
        let _ = writeln!(out, "_{}_", format_date(highlight.created_at));

        let tree = index.comment_tree(highlight.id);
        if !tree.is_empty() {
            out.push('\n');
        }
        for node in tree {
            let content = node.comment.content.as_deref().unwrap_or("").trim();
            let _ = writeln!(
                out,
                "{}- **{}**: {}",
                "  ".repeat(node.depth),
                node.comment.user.display_name(),
                content.replace('\n', " ")
            );
        }
    }

    out
}
