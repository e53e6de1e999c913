use super::{SiteReport, Storage};
use crate::{detect::SeenState, error::MonitorError};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Whole-file JSON artifacts, rewritten on every save.
#[derive(Debug, Clone)]
pub struct JsonStorage {
    seen_path: PathBuf,
    results_path: PathBuf,
}

impl JsonStorage {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(seen_path: P, results_path: Q) -> Self {
        JsonStorage {
            seen_path: seen_path.into(),
            results_path: results_path.into(),
        }
    }

    pub async fn read_seen(path: &Path) -> Result<SeenState, MonitorError> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No seen file at {}, starting empty", path.display());
                Ok(SeenState::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write<T: Serialize + ?Sized + Sync>(path: &Path, value: &T) -> Result<(), MonitorError> {
        let raw = serde_json::to_string_pretty(value)?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");

        tokio::fs::write(&tmp, raw).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Storage for JsonStorage {
    async fn seen_get(&self) -> Result<SeenState, MonitorError> {
        JsonStorage::read_seen(&self.seen_path).await
    }

    async fn seen_save(&self, state: &SeenState) -> Result<(), MonitorError> {
        JsonStorage::write(&self.seen_path, state).await
    }

    async fn results_save(&self, reports: &[SiteReport]) -> Result<(), MonitorError> {
        JsonStorage::write(&self.results_path, reports).await
    }
}
