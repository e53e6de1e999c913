//! Page retrieval with bot-challenge and geo-block handling.
//!
//! A [`Fetcher`] drives one [`PageSession`] per site through a
//! [`PageSource`]. Every failure ends up as a [`FetchStatus`] on the
//! returned [`FetchResult`]; nothing here aborts a run.

#[cfg(feature = "browser")]
mod browser;
mod http;

#[cfg(feature = "browser")]
pub use browser::BrowserSource;
pub use http::HttpSource;

use crate::{config::MonitorConfig, error::MonitorError, text, SiteTarget};
use chrono::{DateTime, Utc};
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Success,
    MinimalContent,
    GeoBlocked,
    ChallengeTimeout,
    Error,
}

impl FetchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStatus::Success => "success",
            FetchStatus::MinimalContent => "minimal_content",
            FetchStatus::GeoBlocked => "geo_blocked",
            FetchStatus::ChallengeTimeout => "challenge_timeout",
            FetchStatus::Error => "error",
        }
    }

    /// Whether the page content is worth handing to an extractor.
    pub fn is_loaded(&self) -> bool {
        matches!(self, FetchStatus::Success | FetchStatus::MinimalContent)
    }
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub status: FetchStatus,
    /// Page HTML when loaded, otherwise a short diagnostic.
    pub content: String,
    pub fetched_at: DateTime<Utc>,
}

/// Opens independent page sessions. Nothing is shared between sessions
/// apart from connection pooling or the browser process.
#[async_trait::async_trait]
pub trait PageSource: Send + Sync {
    async fn open(&self) -> Result<Box<dyn PageSession>, MonitorError>;
}

/// One site's page. The [`Fetcher`] closes it on every path once it is open,
/// so navigation failures never leak it.
#[async_trait::async_trait]
pub trait PageSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), MonitorError>;

    async fn content(&mut self) -> Result<String, MonitorError>;

    /// Waits for the page to go quiet, at most `timeout`. Running out of
    /// time is not an error; transport failures are.
    async fn settle(&mut self, timeout: Duration) -> Result<(), MonitorError>;

    async fn close(self: Box<Self>) -> Result<(), MonitorError>;
}

pub struct Fetcher {
    source: Box<dyn PageSource>,
    config: MonitorConfig,
}

impl Fetcher {
    pub fn new<S: PageSource + 'static>(source: S, config: MonitorConfig) -> Self {
        Fetcher {
            source: Box::new(source),
            config,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub async fn fetch(&self, target: &SiteTarget) -> FetchResult {
        self.fetch_with_timeout(target, self.config.fetch_timeout)
            .await
    }

    /// `timeout` bounds opening and loading the page. A challenge cycle
    /// afterwards is bounded by `challenge_wait + settle_timeout`.
    pub async fn fetch_with_timeout(&self, target: &SiteTarget, timeout: Duration) -> FetchResult {
        let fetched_at = Utc::now();
        debug!("Visit {}", target.url);

        let (status, content) = match self.load(target, timeout).await {
            Ok(content) => (self.classify(&content), content),
            Err(MonitorError::GeoBlocked) => (
                FetchStatus::GeoBlocked,
                MonitorError::GeoBlocked.to_string(),
            ),
            Err(e @ MonitorError::ChallengeTimeout) => (FetchStatus::ChallengeTimeout, e.describe()),
            Err(e) => {
                warn!("{}: {}", target.name, e);
                (FetchStatus::Error, e.describe())
            }
        };

        FetchResult {
            status,
            content,
            fetched_at,
        }
    }

    /// `Success` when `text` is longer than `min_content_chars`.
    pub fn grade(&self, text: &str) -> FetchStatus {
        if text.chars().count() > self.config.min_content_chars {
            FetchStatus::Success
        } else {
            FetchStatus::MinimalContent
        }
    }

    async fn load(&self, target: &SiteTarget, timeout: Duration) -> Result<String, MonitorError> {
        let deadline = Instant::now() + timeout;

        let mut session = tokio::time::timeout_at(deadline, self.source.open())
            .await
            .map_err(|_| MonitorError::Timeout(timeout))??;

        let outcome = self.drive(session.as_mut(), &target.url, deadline, timeout).await;

        if let Err(e) = session.close().await {
            warn!("Failed to close session for {}: {}", target.name, e);
        }

        outcome
    }

    async fn drive(
        &self,
        session: &mut dyn PageSession,
        url: &str,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<String, MonitorError> {
        let loading = async {
            session.navigate(url).await?;
            session.content().await
        };
        let content = tokio::time::timeout_at(deadline, loading)
            .await
            .map_err(|_| MonitorError::Timeout(timeout))??;

        if self.has_marker(&content, &self.config.challenge_markers) {
            let window = self.config.challenge_wait + self.config.settle_timeout;
            // Content that made it past a challenge is taken as is.
            return tokio::time::timeout(window, self.clear_challenge(session))
                .await
                .map_err(|_| MonitorError::ChallengeTimeout)?;
        }

        if self.has_marker(&content, &self.config.geo_markers) {
            return Err(MonitorError::GeoBlocked);
        }

        Ok(content)
    }

    async fn clear_challenge(&self, session: &mut dyn PageSession) -> Result<String, MonitorError> {
        info!(
            "Challenge detected, waiting {:?}",
            self.config.challenge_wait
        );
        tokio::time::sleep(self.config.challenge_wait).await;
        session.settle(self.config.settle_timeout).await?;

        let content = session.content().await?;
        if self.challenge_persists(&content) {
            return Err(MonitorError::ChallengeTimeout);
        }
        Ok(content)
    }

    /// The interstitial is still up, or all that is left is a near-empty
    /// page still talking about the challenge.
    fn challenge_persists(&self, content: &str) -> bool {
        self.has_marker(content, &self.config.interstitial_markers)
            || (self.has_marker(content, &self.config.challenge_markers)
                && self.classify(content) == FetchStatus::MinimalContent)
    }

    fn has_marker(&self, content: &str, markers: &[String]) -> bool {
        let lowered = content.to_lowercase();
        markers
            .iter()
            .any(|marker| lowered.contains(&marker.to_lowercase()))
    }

    fn classify(&self, content: &str) -> FetchStatus {
        let doc = Html::parse_document(content);
        self.grade(&text::page_text(&doc))
    }
}
