//! Plain-text rendering of parsed pages.
//!
//! Approximates a browser's `innerText`: scripts and styles are skipped,
//! block elements break lines, and runs of whitespace collapse to a space.

use itertools::Itertools;
use lazy_regex::regex;
use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Node, Selector};

pub const MAX_RAW_TEXT_CHARS: usize = 5000;
pub const MAX_DIAGNOSTIC_CHARS: usize = 300;

const SKIPPED: &[&str] = &["script", "style", "noscript", "template", "head", "svg"];

const BLOCKS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr",
    "li", "main", "nav", "ol", "p", "pre", "section", "table", "tr", "ul",
];

lazy_static! {
    static ref BODY: Selector = Selector::parse("body").expect("Invalid selector");
}

pub fn inner_text(element: ElementRef) -> String {
    let mut raw = String::new();
    push_text(element, &mut raw);

    raw.split('\n')
        .map(|line| line.split_whitespace().join(" "))
        .join("\n")
        .trim()
        .to_string()
}

fn push_text(element: ElementRef, out: &mut String) {
    let name = element.value().name();
    if SKIPPED.contains(&name) {
        return;
    }

    let block = BLOCKS.contains(&name);
    if block {
        out.push('\n');
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                for (i, piece) in text.split(char::is_whitespace).enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    out.push_str(piece);
                }
            }
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    push_text(child, out);
                }
            }
            _ => {}
        }
    }

    if block {
        out.push('\n');
    } else if matches!(name, "td" | "th") {
        out.push(' ');
    }
}

/// Visible text of the whole page, preferring `<body>`.
pub fn page_text(doc: &Html) -> String {
    match doc.select(&BODY).next() {
        Some(body) => inner_text(body),
        None => inner_text(doc.root_element()),
    }
}

/// Collapses three or more consecutive newlines into exactly two.
pub fn normalize_newlines(text: &str) -> String {
    regex!(r"\n{3,}").replace_all(text, "\n\n").into_owned()
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
