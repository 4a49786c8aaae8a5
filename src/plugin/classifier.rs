//! Content classification for implicit input.
//!
//! Rules are tried in priority order and the first match wins. A rule that
//! does not match simply falls through to the next one.

use regex::Regex;
use std::sync::LazyLock;

static MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<[^>]+>").expect("markup pattern is valid"));

// Scheme or host, then optional path, query and fragment.
static HYPERLINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(([A-Za-z]{3,9}:(?://)?)(?:[-;:&=+$,\w]+@)?[A-Za-z0-9.-]+|(?:www.|[-;:&=+$,\w]+@)[A-Za-z0-9.-]+)((?:/[+~%/.\w\-_]*)?\??(?:[-+=&;%@.\w_]*)#?(?:[.!/\\w]*))?",
    )
    .expect("hyperlink pattern is valid")
});

// One or more `selector { property: value; ... }` rules covering the text.
static STYLESHEET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\s*[^{}\s][^{}]*\{\s*(?:[-\w]+\s*:\s*[^;{}]+;\s*)+\})+\s*$")
        .expect("stylesheet pattern is valid")
});

/// Shape of a piece of implicit content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    MarkupFragment,
    Hyperlink,
    StylesheetRule,
    PlainText,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::MarkupFragment => "markup",
            ContentKind::Hyperlink => "hyperlink",
            ContentKind::StylesheetRule => "stylesheet",
            ContentKind::PlainText => "text",
        }
    }
}

/// Classify `text` by shape.
pub fn classify(text: &str) -> ContentKind {
    if MARKUP.is_match(text) {
        ContentKind::MarkupFragment
    } else if is_hyperlink(text) {
        ContentKind::Hyperlink
    } else if STYLESHEET.is_match(text) {
        ContentKind::StylesheetRule
    } else {
        ContentKind::PlainText
    }
}

/// A link shape followed by a rule body is a selector such as `button:hover`.
fn is_hyperlink(text: &str) -> bool {
    HYPERLINK
        .find(text)
        .is_some_and(|link| !text[link.end()..].trim_start().starts_with('{'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markup() {
        assert_eq!(classify("<b>hi</b>"), ContentKind::MarkupFragment);
        assert_eq!(
            classify(r#"<img src="https://example.com/a.png">"#),
            ContentKind::MarkupFragment
        );
    }

    #[test]
    fn test_markup_must_lead() {
        assert_eq!(classify("say <b>hi</b>"), ContentKind::PlainText);
    }

    #[test]
    fn test_hyperlink() {
        assert_eq!(classify("https://example.com/x"), ContentKind::Hyperlink);
        assert_eq!(classify("www.example.com"), ContentKind::Hyperlink);
        assert_eq!(
            classify("http://localhost:8080/path?q=1#top"),
            ContentKind::Hyperlink
        );
        assert_eq!(classify("user@example.com"), ContentKind::Hyperlink);
    }

    #[test]
    fn test_stylesheet_rule() {
        assert_eq!(classify("a.card { color: red; }"), ContentKind::StylesheetRule);
        assert_eq!(
            classify("body{margin:0;} .card > p { font-size: 12px; color: #333; }"),
            ContentKind::StylesheetRule
        );
    }

    #[test]
    fn test_pseudo_class_selector_is_stylesheet() {
        assert_eq!(
            classify("button:hover { color: red; }"),
            ContentKind::StylesheetRule
        );
        assert_eq!(classify("input:focus{outline:none;}"), ContentKind::StylesheetRule);
        assert_eq!(classify("button:hover"), ContentKind::Hyperlink);
    }

    #[test]
    fn test_incomplete_rule_is_text() {
        assert_eq!(classify("a.card { color red }"), ContentKind::PlainText);
        assert_eq!(classify("{ color: red; }"), ContentKind::PlainText);
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(classify("just words"), ContentKind::PlainText);
        assert_eq!(classify("hello"), ContentKind::PlainText);
    }

    #[test]
    fn test_empty_is_text() {
        assert_eq!(classify(""), ContentKind::PlainText);
    }

    #[test]
    fn test_markup_wins_over_link() {
        assert_eq!(
            classify("<a href=\"https://example.com\">x</a>"),
            ContentKind::MarkupFragment
        );
    }
}
