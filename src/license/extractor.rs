use super::LicenseRecord;
use crate::Extractor;
use lazy_regex::regex;
use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeSet;

const WEBSITE_TLDS: &[&str] = &["com", "io", "pro", "game", "org"];
const MIN_CELLS: usize = 3;

const E: &str = "Invalid selector";
lazy_static! {
    static ref TABLE: Selector = Selector::parse("table").expect(E);
    static ref ROW: Selector = Selector::parse("tr").expect(E);
    static ref CELL: Selector = Selector::parse("td, th").expect(E);
    static ref LINK: Selector = Selector::parse("a[href]").expect(E);
}

#[derive(Debug)]
pub struct LicenseExtractor {
    /// Links containing this point back at the register itself.
    pub register_host: String,
}

impl LicenseExtractor {
    pub fn new(register_host: &str) -> Self {
        LicenseExtractor {
            register_host: register_host.to_string(),
        }
    }

    fn parse_row(&self, row: ElementRef) -> Option<LicenseRecord> {
        let cells = row.select(&CELL).collect::<Vec<_>>();
        if cells.len() < MIN_CELLS {
            return None;
        }

        let mut license_id = None;
        let mut operator = None;
        let mut websites = BTreeSet::new();

        for text in cells.iter().map(|cell| cell_text(*cell)) {
            if is_license_id(&text) {
                if license_id.is_none() {
                    license_id = Some(text);
                }
            } else if looks_like_domain(&text) {
                websites.insert(strip_url(&text));
            } else if operator.is_none() && !text.is_empty() {
                operator = Some(text);
            }
        }

        for href in cells
            .iter()
            .flat_map(|cell| cell.select(&LINK))
            .filter_map(|a| a.value().attr("href"))
            .map(str::trim)
        {
            if self.is_external(href) {
                let site = strip_url(href);
                if !site.is_empty() {
                    websites.insert(site);
                }
            }
        }

        Some(LicenseRecord {
            license_id: license_id?,
            operator: operator.unwrap_or_else(|| "Unknown".to_string()),
            websites,
        })
    }

    fn is_external(&self, href: &str) -> bool {
        !href.is_empty()
            && !href.starts_with('#')
            && !href.starts_with('/')
            && !href.starts_with("mailto:")
            && !href.starts_with("tel:")
            && !href.starts_with("javascript:")
            && !href.contains(self.register_host.as_str())
    }
}

impl Extractor for LicenseExtractor {
    type Output = Vec<LicenseRecord>;

    fn extract(&self, doc: &Html) -> Vec<LicenseRecord> {
        doc.select(&TABLE)
            .flat_map(|table| table.select(&ROW))
            .filter_map(|row| self.parse_row(row))
            .collect()
    }
}

fn cell_text(cell: ElementRef) -> String {
    cell.text().map(str::trim).collect()
}

fn is_license_id(text: &str) -> bool {
    regex!(r"^ALSI-\d+-\w+").is_match(text)
}

/// A single token whose host has one of the watched TLDs as a non-leading
/// label. Operator names such as "Acme.com Holdings" do not qualify.
fn looks_like_domain(text: &str) -> bool {
    if text.is_empty() || text.chars().any(char::is_whitespace) {
        return false;
    }

    let host = strip_url(text).to_lowercase();
    let host = host.split(&['/', '?', '#', ':'][..]).next().unwrap_or_default();
    host.split('.')
        .skip(1)
        .any(|label| WEBSITE_TLDS.contains(&label))
}

fn strip_url(url: &str) -> String {
    let url = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    url.trim_end_matches('/').to_string()
}
