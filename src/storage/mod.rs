//! Persistence of the seen set and per-run promo results.

mod json;
mod sqlite;

pub use json::JsonStorage;
pub use sqlite::SqliteStorage;

use crate::{detect::SeenState, error::MonitorError, fetch::FetchStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One promotion page's outcome, as written to the results artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteReport {
    pub name: String,
    pub url: String,
    pub status: FetchStatus,
    pub promos: Vec<String>,
    pub raw_text: String,
    pub scraped_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    /// The persisted seen set, empty on first run.
    async fn seen_get(&self) -> Result<SeenState, MonitorError>;
    async fn seen_save(&self, state: &SeenState) -> Result<(), MonitorError>;

    async fn results_save(&self, reports: &[SiteReport]) -> Result<(), MonitorError>;
}
