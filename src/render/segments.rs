//! Splitting raw text into plain and highlighted runs.
//!
//! Both the HTML renderer and the terminal viewer draw from these segments, so
//! every path slices the raw text at the same UTF-16 boundaries before any
//! normalization happens.

use std::ops::Range;

use crate::models::{AnnotationId, AnnotationWithUser};
use crate::offsets::{Utf16Cursor, utf16_len};
use crate::threads::ThreadIndex;

/// A highlight as the renderer sees it, with its display state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightSpan {
    pub id: AnnotationId,
    pub range: Range<usize>,
    pub selected: bool,
    pub has_replies: bool,
}

/// One contiguous run of raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment<'a> {
    pub text: &'a str,
    pub range: Range<usize>,
    pub highlight: Option<HighlightSpan>,
}

impl Segment<'_> {
    pub fn is_highlight(&self) -> bool {
        self.highlight.is_some()
    }
}

/// Display spans for every highlight in `annotations`.
///
/// `selected` and `has_replies` are derived here on every call, never stored.
pub fn highlight_spans(
    annotations: &[AnnotationWithUser],
    selected: Option<AnnotationId>,
) -> Vec<HighlightSpan> {
    let index = ThreadIndex::new(annotations);
    annotations
        .iter()
        .filter_map(|a| {
            let range = a.range()?;
            Some(HighlightSpan {
                id: a.id,
                range,
                selected: selected == Some(a.id),
                has_replies: index.has_replies(a.id),
            })
        })
        .collect()
}

/// Cuts `text` at every highlight boundary, highlights in start order.
///
/// Spans are assumed not to overlap. When they do, the later span re-emits the
/// overlapped text; this is logged, not repaired. Spans that fall outside the
/// text or split a character are skipped.
pub fn segment<'a>(text: &'a str, spans: &[HighlightSpan]) -> Vec<Segment<'a>> {
    let mut spans = spans.to_vec();
    spans.sort_by_key(|s| s.range.start);

    let len = utf16_len(text);
    let mut segments = Vec::with_capacity(spans.len() * 2 + 1);
    let mut cursor = 0;
    // Spans and the gaps between them each advance left to right.
    let mut highlights = Utf16Cursor::new(text);
    let mut gaps = Utf16Cursor::new(text);

    for span in spans {
        let Ok(slice) = highlights.slice(span.range.clone()) else {
            tracing::warn!(annotation = %span.id, range = ?span.range, len, "highlight outside document text");
            continue;
        };

        if span.range.start < cursor {
            tracing::warn!(annotation = %span.id, "overlapping highlights");
        } else if span.range.start > cursor {
            segments.extend(plain(&mut gaps, cursor..span.range.start));
        }

        cursor = span.range.end;
        segments.push(Segment {
            text: slice,
            range: span.range.clone(),
            highlight: Some(span),
        });
    }

    if cursor < len {
        segments.extend(plain(&mut gaps, cursor..len));
    }

    segments
}

fn plain<'a>(gaps: &mut Utf16Cursor<'a>, range: Range<usize>) -> Option<Segment<'a>> {
    let slice = gaps.slice(range.clone()).ok()?;
    Some(Segment {
        text: slice,
        range,
        highlight: None,
    })
}
