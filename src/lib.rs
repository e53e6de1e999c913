use scraper::Html;

pub mod config;
pub mod detect;
pub mod fetch;
pub mod license;
pub mod notify;
pub mod promo;
pub mod runner;
pub mod storage;
pub mod text;

mod data;
mod error;
mod utils;

pub use config::{MonitorConfig, SiteTarget};
pub use data::Table;
pub use error::MonitorError;

use license::{LicenseExtractor, LicenseRecord};
use promo::{PromoExtractor, PromoRecord};

/// Pulls structured facts out of a parsed page. Extraction never fails: a
/// strategy that cannot be applied contributes nothing.
pub trait Extractor {
    type Output;

    fn extract(&self, doc: &Html) -> Self::Output;
}

#[derive(Debug, Clone, Copy)]
pub enum ExtractMode<'a> {
    Promo { source_site: &'a str },
    License { register_host: &'a str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    Promo(PromoRecord),
    Licenses(Vec<LicenseRecord>),
}

impl Extracted {
    pub fn into_promo(self) -> Option<PromoRecord> {
        match self {
            Extracted::Promo(record) => Some(record),
            Extracted::Licenses(_) => None,
        }
    }

    pub fn into_licenses(self) -> Vec<LicenseRecord> {
        match self {
            Extracted::Licenses(records) => records,
            Extracted::Promo(_) => vec![],
        }
    }
}

pub fn extract(content: &str, mode: ExtractMode) -> Extracted {
    let doc = Html::parse_document(content);
    match mode {
        ExtractMode::Promo { source_site } => {
            Extracted::Promo(PromoExtractor::new(source_site).extract(&doc))
        }
        ExtractMode::License { register_host } => {
            Extracted::Licenses(LicenseExtractor::new(register_host).extract(&doc))
        }
    }
}
