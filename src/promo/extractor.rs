use super::PromoRecord;
use crate::{text, Extractor};
use itertools::Itertools;
use lazy_regex::Regex;
use lazy_static::lazy_static;
use scraper::{Html, Selector};
use tracing::debug;

/// Most specific first; generic content containers last.
const SELECTORS: &[&str] = &[
    ".promotion",
    ".promo",
    ".bonus",
    ".offer",
    ".welcome",
    "[class*='promo']",
    "[class*='bonus']",
    "[class*='offer']",
    "main",
    "article",
    ".content",
    "#content",
    ".container",
];

const PATTERNS: &[&str] = &[
    r"(?i)(\d+%)\s*(?:up to|bonus|match)[^\n]*?(?:€|£|\$|USD|EUR)?\s*(\d+[,.]?\d*)",
    r"(?i)(?:€|£|\$|USD|EUR)\s*(\d+[,.]?\d*)\s*(?:bonus|free|welcome)",
    r"(?i)(\d+)\s*free\s*spins",
    r"(?i)welcome\s*(?:bonus|package|offer)[^\n]*?(\d+%)",
    r"(?i)(\d+x)\s*wager",
];

const MATCHES_PER_SELECTOR: usize = 5;
const MIN_ELEMENT_CHARS: usize = 50;
const MIN_PROMO_CHARS: usize = 100;
const MAX_FRAGMENTS: usize = 10;
const FRAGMENT_SEPARATOR: &str = " ";

lazy_static! {
    static ref PROMO_SELECTORS: Vec<(&'static str, Option<Selector>)> = SELECTORS
        .iter()
        .map(|raw| (*raw, Selector::parse(raw).ok()))
        .collect();
    static ref BONUS_PATTERNS: Vec<(&'static str, Option<Regex>)> = PATTERNS
        .iter()
        .map(|raw| (*raw, Regex::new(raw).ok()))
        .collect();
}

type TextStrategy = fn(&Html) -> String;

#[derive(Debug)]
pub struct PromoExtractor {
    pub source_site: String,
}

impl PromoExtractor {
    pub fn new(source_site: &str) -> Self {
        PromoExtractor {
            source_site: source_site.to_string(),
        }
    }

    /// Promotion text: the first strategy producing enough text wins, the
    /// whole page being the last resort.
    pub fn promo_text(&self, doc: &Html) -> String {
        let strategies: [TextStrategy; 2] = [selector_text, text::page_text];

        let mut found = String::new();
        for strategy in strategies {
            found = strategy(doc);
            if found.chars().count() >= MIN_PROMO_CHARS {
                break;
            }
        }

        text::truncate_chars(&text::normalize_newlines(&found), text::MAX_RAW_TEXT_CHARS)
    }

    /// Bonus fragments in pattern order, deduplicated and capped.
    pub fn fragments(&self, promo_text: &str) -> Vec<String> {
        BONUS_PATTERNS
            .iter()
            .filter_map(|(raw, pattern)| {
                if pattern.is_none() {
                    debug!("Skipping invalid pattern {}", raw);
                }
                pattern.as_ref()
            })
            .flat_map(|pattern| {
                pattern
                    .captures_iter(promo_text)
                    .map(|caps| {
                        if caps.len() > 1 {
                            caps.iter()
                                .skip(1)
                                .flatten()
                                .map(|m| m.as_str())
                                .join(FRAGMENT_SEPARATOR)
                        } else {
                            caps[0].to_string()
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .filter(|fragment| !fragment.is_empty())
            .unique()
            .take(MAX_FRAGMENTS)
            .collect()
    }
}

fn selector_text(doc: &Html) -> String {
    let mut buffer = String::new();
    for (raw, selector) in PROMO_SELECTORS.iter() {
        let Some(selector) = selector else {
            debug!("Skipping invalid selector {}", raw);
            continue;
        };

        for el in doc.select(selector).take(MATCHES_PER_SELECTOR) {
            let text = text::inner_text(el);
            if text.chars().count() > MIN_ELEMENT_CHARS {
                buffer.push_str(&text);
                buffer.push_str("\n\n");
            }
        }
    }
    buffer
}

impl Extractor for PromoExtractor {
    type Output = PromoRecord;

    fn extract(&self, doc: &Html) -> PromoRecord {
        let raw_text = self.promo_text(doc);
        let fragments = self.fragments(&raw_text);

        PromoRecord {
            source_site: self.source_site.clone(),
            fragments,
            raw_text,
        }
    }
}
