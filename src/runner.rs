//! Drives both flows: one site at a time, paced, never aborted by a single
//! site's failure.

use crate::{
    detect::detect_new,
    error::MonitorError,
    extract,
    fetch::{FetchResult, FetchStatus, Fetcher},
    license::LicenseRecord,
    notify::{self, Notifier},
    storage::{SiteReport, Storage},
    ExtractMode, SiteTarget,
};
use chrono::Utc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub success: usize,
    pub minimal: usize,
    pub blocked: usize,
    pub challenged: usize,
    pub errors: usize,
    pub new_licenses: Vec<LicenseRecord>,
}

impl RunSummary {
    pub fn record(&mut self, status: FetchStatus) {
        self.total += 1;
        match status {
            FetchStatus::Success => self.success += 1,
            FetchStatus::MinimalContent => self.minimal += 1,
            FetchStatus::GeoBlocked => self.blocked += 1,
            FetchStatus::ChallengeTimeout => self.challenged += 1,
            FetchStatus::Error => self.errors += 1,
        }
    }
}

async fn pace(fetcher: &Fetcher, index: usize) {
    if index > 0 {
        tokio::time::sleep(fetcher.config().site_delay).await;
    }
}

/// Success versus minimal content is judged on the extracted promotion
/// text, not the whole page.
fn promo_report(fetcher: &Fetcher, target: &SiteTarget, fetched: FetchResult) -> SiteReport {
    let mut status = fetched.status;
    let (promos, raw_text) = if status.is_loaded() {
        let mode = ExtractMode::Promo {
            source_site: &target.name,
        };
        match extract(&fetched.content, mode).into_promo() {
            Some(record) => {
                status = fetcher.grade(&record.raw_text);
                (record.fragments, record.raw_text)
            }
            None => (vec![], String::new()),
        }
    } else {
        (vec![], fetched.content)
    };

    SiteReport {
        name: target.name.clone(),
        url: target.url.clone(),
        status,
        promos,
        raw_text,
        scraped_at: fetched.fetched_at,
    }
}

/// Scrapes every promotion page, saves all reports, then sends one summary.
pub async fn run_promos<S, N>(
    fetcher: &Fetcher,
    storage: &S,
    notifier: &N,
    targets: &[SiteTarget],
) -> Result<RunSummary, MonitorError>
where
    S: Storage + ?Sized,
    N: Notifier + ?Sized,
{
    info!("Starting promo scrape of {} sites", targets.len());

    let mut summary = RunSummary::default();
    let mut reports = Vec::with_capacity(targets.len());

    for (i, target) in targets.iter().enumerate() {
        pace(fetcher, i).await;
        info!("Scraping {}...", target.name);

        let report = promo_report(fetcher, target, fetcher.fetch(target).await);
        info!(
            "{}: {} - Found {} promo patterns",
            target.name,
            report.status,
            report.promos.len()
        );

        summary.record(report.status);
        reports.push(report);
    }

    storage.results_save(&reports).await?;
    notifier
        .send(&notify::promo_summary(&summary, &reports))
        .await;

    info!(
        "Success: {}, Blocked: {}, Errors: {}",
        summary.success, summary.blocked, summary.errors
    );
    Ok(summary)
}

/// Scrapes the registers, notifies about ids never seen before and saves the
/// grown seen set. When no register could be read at all, sends an error
/// notification and leaves the persisted state untouched.
pub async fn run_licenses<S, N>(
    fetcher: &Fetcher,
    storage: &S,
    notifier: &N,
    registers: &[SiteTarget],
) -> Result<RunSummary, MonitorError>
where
    S: Storage + ?Sized,
    N: Notifier + ?Sized,
{
    let seen = storage.seen_get().await?;
    info!("Loaded {} seen licenses", seen.len());

    let mut summary = RunSummary::default();
    let mut records = vec![];
    let mut failures = vec![];

    for (i, target) in registers.iter().enumerate() {
        pace(fetcher, i).await;

        let fetched = fetcher.fetch(target).await;
        summary.record(fetched.status);

        if fetched.status.is_loaded() {
            let mode = ExtractMode::License {
                register_host: &fetcher.config().register_host,
            };
            let found = extract(&fetched.content, mode).into_licenses();
            info!("Found {} total licenses on {}", found.len(), target.name);
            records.extend(found);
        } else {
            warn!("{}: {} - {}", target.name, fetched.status, fetched.content);
            failures.push(format!("{}: {}", target.name, fetched.content));
        }
    }

    if !registers.is_empty() && failures.len() == registers.len() {
        let detail = failures.join("; ");
        error!("Scraping failed: {}", detail);
        notifier.send(&notify::error_message(&detail)).await;
        return Err(MonitorError::RegisterUnavailable(detail));
    }

    let (new_records, mut updated) = detect_new(&records, &seen);
    info!("Found {} new licenses", new_records.len());

    if new_records.is_empty() {
        info!("No new licenses found");
    } else {
        notifier
            .send(&notify::license_summary(new_records.len(), Utc::now()))
            .await;
        for record in &new_records {
            notifier.send(&notify::license_message(record)).await;
            info!("Notified: {}", record.license_id);
        }
    }

    updated.last_checked_at = Some(Utc::now());
    storage.seen_save(&updated).await?;

    summary.new_licenses = new_records;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::SeenState;
    use crate::fetch::{tests::fast_config, tests::long_page, PageSession, PageSource};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::time::Duration;

    /// One fixed page per URL; unknown URLs fail to connect.
    struct MapSource(HashMap<String, String>);

    struct MapSession {
        pages: HashMap<String, String>,
        page: String,
    }

    #[async_trait::async_trait]
    impl PageSource for MapSource {
        async fn open(&self) -> Result<Box<dyn PageSession>, MonitorError> {
            Ok(Box::new(MapSession {
                pages: self.0.clone(),
                page: String::new(),
            }))
        }
    }

    #[async_trait::async_trait]
    impl PageSession for MapSession {
        async fn navigate(&mut self, url: &str) -> Result<(), MonitorError> {
            match self.pages.get(url) {
                Some(page) => {
                    self.page = page.clone();
                    Ok(())
                }
                None => Err(MonitorError::ParseError("connection refused".to_string())),
            }
        }

        async fn content(&mut self) -> Result<String, MonitorError> {
            Ok(self.page.clone())
        }

        async fn settle(&mut self, _timeout: Duration) -> Result<(), MonitorError> {
            Ok(())
        }

        async fn close(self: Box<Self>) -> Result<(), MonitorError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryStorage {
        seen: Mutex<Option<SeenState>>,
        saves: Mutex<usize>,
        reports: Mutex<Vec<SiteReport>>,
    }

    #[async_trait::async_trait]
    impl Storage for MemoryStorage {
        async fn seen_get(&self) -> Result<SeenState, MonitorError> {
            Ok(self.seen.lock().unwrap().clone().unwrap_or_default())
        }

        async fn seen_save(&self, state: &SeenState) -> Result<(), MonitorError> {
            *self.saves.lock().unwrap() += 1;
            *self.seen.lock().unwrap() = Some(state.clone());
            Ok(())
        }

        async fn results_save(&self, reports: &[SiteReport]) -> Result<(), MonitorError> {
            *self.reports.lock().unwrap() = reports.to_vec();
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier(Mutex<Vec<String>>);

    impl RecordingNotifier {
        fn messages(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, text: &str) -> bool {
            self.0.lock().unwrap().push(text.to_string());
            true
        }
    }

    fn fetcher(pages: &[(&str, String)]) -> Fetcher {
        let map = pages
            .iter()
            .map(|(url, page)| (url.to_string(), page.clone()))
            .collect();
        Fetcher::new(MapSource(map), fast_config())
    }

    fn register_page(rows: &[(&str, &str, &str)]) -> String {
        let rows = rows
            .iter()
            .map(|(id, op, site)| format!("<tr><td>{}</td><td>{}</td><td>{}</td></tr>", id, op, site))
            .collect::<String>();
        format!("<html><body><table>{}</table></body></html>", rows)
    }

    #[tokio::test]
    async fn failing_site_still_reported() {
        let targets = vec![
            SiteTarget::new("Good", "https://good.example/promotions"),
            SiteTarget::new("Down", "https://down.example/promotions"),
            SiteTarget::new("Blocked", "https://blocked.example/promotions"),
        ];
        let fetcher = fetcher(&[
            (
                "https://good.example/promotions",
                long_page("Deposit bonus: 100% up to €200 and 50 free spins"),
            ),
            (
                "https://blocked.example/promotions",
                long_page("We do not accept players from your region"),
            ),
        ]);
        let storage = MemoryStorage::default();
        let notifier = RecordingNotifier::default();

        let summary = run_promos(&fetcher, &storage, &notifier, &targets)
            .await
            .unwrap();

        assert_eq!((summary.total, summary.success, summary.blocked, summary.errors), (3, 1, 1, 1));

        let reports = storage.reports.lock().unwrap().clone();
        let statuses = reports.iter().map(|r| r.status).collect::<Vec<_>>();
        assert_eq!(
            statuses,
            vec![FetchStatus::Success, FetchStatus::Error, FetchStatus::GeoBlocked]
        );
        assert_eq!(reports[0].promos, vec!["100% 200".to_string(), "50".to_string()]);
        assert!(reports[1].raw_text.contains("connection refused"));
        assert_eq!(reports[2].raw_text, "Site geo-blocked for this location");

        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("Success: 1/3"));
        assert!(messages[0].contains("<b>Good</b>: 100% 200, 50"));
    }

    #[tokio::test]
    async fn licenses_notified_once() {
        let url = "https://register.example/licenses";
        let registers = vec![SiteTarget::new("Register", url)];
        let fetcher = fetcher(&[(
            url,
            register_page(&[
                ("ALSI-1-A", "Alpha Ltd", "alpha.com"),
                ("ALSI-2-B", "Beta Ltd", "beta.io"),
            ]),
        )]);
        let storage = MemoryStorage::default();
        let notifier = RecordingNotifier::default();

        let first = run_licenses(&fetcher, &storage, &notifier, &registers)
            .await
            .unwrap();
        let ids = first
            .new_licenses
            .iter()
            .map(|r| r.license_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["ALSI-1-A", "ALSI-2-B"]);

        let messages = notifier.messages();
        assert_eq!(messages.len(), 3);
        assert!(messages[0].contains("2 New License(s) Found!"));
        assert!(messages[1].contains("<code>ALSI-1-A</code>"));
        assert!(messages[2].contains("Operator: Beta Ltd"));

        let saved = storage.seen_get().await.unwrap();
        assert_eq!(saved.len(), 2);
        assert!(saved.last_checked_at.is_some());

        let second = run_licenses(&fetcher, &storage, &notifier, &registers)
            .await
            .unwrap();
        assert!(second.new_licenses.is_empty());
        assert_eq!(notifier.messages().len(), 3);
        assert_eq!(*storage.saves.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn unreachable_register_leaves_state_alone() {
        let registers = vec![SiteTarget::new("Register", "https://down.example/licenses")];
        let fetcher = fetcher(&[]);
        let storage = MemoryStorage::default();
        let notifier = RecordingNotifier::default();

        let result = run_licenses(&fetcher, &storage, &notifier, &registers).await;
        assert!(matches!(result, Err(MonitorError::RegisterUnavailable(_))));

        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("⚠️ License Scraper Error"));
        assert_eq!(*storage.saves.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn one_register_down_still_detects() {
        let up = "https://up.example/licenses";
        let registers = vec![
            SiteTarget::new("Down", "https://down.example/licenses"),
            SiteTarget::new("Up", up),
        ];
        let fetcher = fetcher(&[(up, register_page(&[("ALSI-7-G", "Gamma Ltd", "gamma.pro")]))]);
        let storage = MemoryStorage::default();
        let notifier = RecordingNotifier::default();

        let summary = run_licenses(&fetcher, &storage, &notifier, &registers)
            .await
            .unwrap();
        assert_eq!((summary.total, summary.minimal, summary.errors), (2, 1, 1));
        assert_eq!(summary.new_licenses.len(), 1);
        assert_eq!(summary.new_licenses[0].license_id, "ALSI-7-G");

        let messages = notifier.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[1].contains("<code>ALSI-7-G</code>"));

        let saved = storage.seen_get().await.unwrap();
        assert!(saved.contains("ALSI-7-G"));
        assert_eq!(*storage.saves.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn promo_status_follows_extracted_text() {
        let url = "https://nested.example/promotions";
        let targets = vec![SiteTarget::new("Nested", url)];
        // 70 visible chars, picked up by both `main` and `article`.
        let copy = "Reload every Friday with extra spins on selected slots this month only";
        let page = format!(
            "<html><body><main><article>{}</article></main></body></html>",
            copy
        );
        let fetcher = fetcher(&[(url, page)]);
        let storage = MemoryStorage::default();
        let notifier = RecordingNotifier::default();

        let summary = run_promos(&fetcher, &storage, &notifier, &targets)
            .await
            .unwrap();
        assert_eq!((summary.success, summary.minimal), (1, 0));

        let reports = storage.reports.lock().unwrap().clone();
        assert_eq!(reports[0].status, FetchStatus::Success);
        assert_eq!(reports[0].raw_text.matches(copy).count(), 2);
    }

    #[test]
    fn summary_counts_every_status() {
        let mut summary = RunSummary::default();
        for status in [
            FetchStatus::Success,
            FetchStatus::MinimalContent,
            FetchStatus::GeoBlocked,
            FetchStatus::ChallengeTimeout,
            FetchStatus::Error,
            FetchStatus::Error,
        ] {
            summary.record(status);
        }
        assert_eq!(
            (summary.total, summary.success, summary.minimal, summary.blocked, summary.challenged, summary.errors),
            (6, 1, 1, 1, 1, 2)
        );
    }
}
