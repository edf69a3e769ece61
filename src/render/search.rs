//! Search-term marking over already annotated markup.
//!
//! Only text between tags is searched, and character entities are matched as
//! a whole so a term can never land inside an attribute or split `&amp;`.

use regex::{Captures, Regex};

use super::escape::escape_html;

const ENTITY: &str = r"(?P<entity>&(?:[a-zA-Z]+|#[0-9]+);)";

/// Wraps every case-insensitive occurrence of `term` in a search mark.
///
/// The term is a literal: it is escaped the way the text was, then
/// regex-escaped. A blank term leaves the markup untouched.
pub fn mark_search_matches(markup: &str, term: &str) -> String {
    if term.trim().is_empty() {
        return markup.to_string();
    }

    let pattern = format!("(?i)(?P<hit>{})|{ENTITY}", regex::escape(&escape_html(term)));
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(e) => {
            tracing::warn!(error = %e, "search pattern rejected");
            return markup.to_string();
        }
    };

    let mut out = String::with_capacity(markup.len());
    let mut rest = markup;

    while let Some(open) = rest.find('<') {
        out.push_str(&mark_run(&re, &rest[..open]));
        let close = rest[open..].find('>').map_or(rest.len(), |i| open + i + 1);
        out.push_str(&rest[open..close]);
        rest = &rest[close..];
    }
    out.push_str(&mark_run(&re, rest));

    out
}

fn mark_run(re: &Regex, run: &str) -> String {
    if run.is_empty() {
        return String::new();
    }
    re.replace_all(run, |caps: &Captures<'_>| match caps.name("hit") {
        Some(hit) => format!(r#"<mark class="search-match">{}</mark>"#, hit.as_str()),
        None => caps[0].to_string(),
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_case_insensitively() {
        assert_eq!(
            mark_search_matches("Fox and fox", "FOX"),
            r#"<mark class="search-match">Fox</mark> and <mark class="search-match">fox</mark>"#
        );
    }

    #[test]
    fn never_matches_inside_tags() {
        let markup = r#"<mark class="annotation-highlight" data-annotation-id="16">x</mark> 16"#;
        let marked = mark_search_matches(markup, "16");
        assert_eq!(
            marked,
            r#"<mark class="annotation-highlight" data-annotation-id="16">x</mark> <mark class="search-match">16</mark>"#
        );

        let marked = mark_search_matches(markup, "highlight");
        assert_eq!(marked, markup);
    }

    #[test]
    fn never_splits_entities() {
        let markup = "Tom &amp; Jerry";
        assert_eq!(mark_search_matches(markup, "amp"), markup);
        assert_eq!(
            mark_search_matches(markup, "&"),
            r#"Tom <mark class="search-match">&amp;</mark> Jerry"#
        );
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        assert_eq!(
            mark_search_matches("a.b axb", "a.b"),
            r#"<mark class="search-match">a.b</mark> axb"#
        );
        assert_eq!(mark_search_matches("(x)", "("), r#"<mark class="search-match">(</mark>x)"#);
    }

    #[test]
    fn blank_term_is_a_no_op() {
        assert_eq!(mark_search_matches("a b", "  "), "a b");
    }

    #[test]
    fn matches_inside_highlight_marks_nest() {
        let markup = r#"The <mark class="annotation-highlight" data-annotation-id="1">quick</mark>"#;
        assert_eq!(
            mark_search_matches(markup, "ick"),
            r#"The <mark class="annotation-highlight" data-annotation-id="1">qu<mark class="search-match">ick</mark></mark>"#
        );
    }
}
