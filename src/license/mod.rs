mod extractor;

pub use extractor::LicenseExtractor;

use std::collections::BTreeSet;
use std::fmt;

/// One row of a license register. `license_id` is the natural key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseRecord {
    pub license_id: String,
    pub operator: String,
    pub websites: BTreeSet<String>,
}

impl fmt::Display for LicenseRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let websites = if self.websites.is_empty() {
            "N/A".to_string()
        } else {
            self.websites.iter().cloned().collect::<Vec<_>>().join(", ")
        };
        write!(f, "{} ({}) [{}]", self.license_id, self.operator, websites)
    }
}
