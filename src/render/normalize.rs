//! Newline normalization shared by every rendering path.
//!
//! Applied per segment after offset slicing, never to the whole text first,
//! so highlight offsets always refer to the raw text.

/// Drops carriage returns, collapses runs of two or more newlines to a
/// paragraph break and turns single newlines (soft wraps from extraction)
/// into spaces.
///
/// The result contains newlines only as `"\n\n"` paragraph breaks.
pub fn normalize_newlines(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut run = 0;

    for ch in segment.chars().filter(|&c| c != '\r') {
        if ch == '\n' {
            run += 1;
            continue;
        }
        flush_run(&mut out, run);
        run = 0;
        out.push(ch);
    }
    flush_run(&mut out, run);

    out
}

fn flush_run(out: &mut String, run: usize) {
    match run {
        0 => {}
        1 => out.push(' '),
        _ => out.push_str("\n\n"),
    }
}

/// Splits normalized text into paragraphs.
pub fn paragraphs(normalized: &str) -> impl Iterator<Item = &str> {
    normalized.split("\n\n")
}
