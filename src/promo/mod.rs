mod extractor;

pub use extractor::PromoExtractor;

use std::fmt;

/// Whatever one promotion page offered during one run. Reported as a whole;
/// never diffed against earlier runs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PromoRecord {
    pub source_site: String,
    pub fragments: Vec<String>,
    pub raw_text: String,
}

impl fmt::Display for PromoRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Site      : {}", self.source_site)?;
        writeln!(f, "Fragments : {}", self.fragments.join(", "))?;
        writeln!(f, "Text      : {} chars", self.raw_text.chars().count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Extractor;
    use pretty_assertions::assert_eq;
    use scraper::Html;
    use std::fs;

    #[test]
    fn test_parsing_promotions_page() {
        let html = fs::read_to_string("tests/htmls/promotions.html").expect("Invalid file path");
        let doc = Html::parse_document(&html);

        let record = PromoExtractor::new("Example Casino").extract(&doc);

        assert_eq!(record.source_site, "Example Casino");
        assert!(record.raw_text.starts_with("Welcome Package"));
        assert!(!record.raw_text.contains("Cookie settings"));
        assert_eq!(
            record.fragments,
            vec![
                "100% 500".to_string(),
                "50% 250".to_string(),
                "200".to_string(),
                "150".to_string(),
                "35x".to_string(),
            ]
        );
    }

    #[test]
    fn percent_up_to_amount_keeps_both_numbers() {
        let extractor = PromoExtractor::new("x");
        assert_eq!(extractor.fragments("100% up to €200"), vec!["100% 200".to_string()]);
    }

    #[test]
    fn short_selector_text_falls_back_to_whole_page() {
        let html = format!(
            r#"<html><body><div class="promo">Tiny promo</div><section>{}</section></body></html>"#,
            "Reload every Friday and collect 50 free spins on selected slots. ".repeat(2)
        );
        let doc = Html::parse_document(&html);

        let text = PromoExtractor::new("x").promo_text(&doc);
        assert!(text.starts_with("Tiny promo"));
        assert!(text.contains("50 free spins"));
    }

    #[test]
    fn raw_text_is_normalized_and_truncated() {
        let body = "<p>Daily cashback</p><br><br><br><br><p>Spin</p>".to_string()
            + &"<p>x</p>".repeat(10)
            + &"y".repeat(6000);
        let doc = Html::parse_document(&format!("<html><body>{}</body></html>", body));

        let text = PromoExtractor::new("x").promo_text(&doc);
        assert_eq!(text.chars().count(), 5000);
        assert!(!text.contains("\n\n\n"));
    }

    #[test]
    fn fragments_are_unique_and_capped() {
        let extractor = PromoExtractor::new("x");
        let text = (1..=30)
            .map(|i| format!("{} free spins\n{} free spins", i, i))
            .collect::<Vec<_>>()
            .join("\n");

        let fragments = extractor.fragments(&text);
        assert_eq!(fragments.len(), 10);
        assert_eq!(fragments[0], "1");
        assert_eq!(fragments[1], "2");
    }
}
