use super::{JsonStorage, SiteReport, Storage};
use crate::{data::Table, detect::SeenState, error::MonitorError, utils};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
    Row, SqliteConnection, SqlitePool,
};
use std::path::Path;
use tracing::debug;

pub struct SeenTable {
    name: String,
    pool: SqlitePool,
}

#[async_trait::async_trait]
impl Table for SeenTable {
    type Record<'a> = &'a str;

    fn get_name(&self) -> &str {
        self.name.as_str()
    }

    fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create(&self) -> Result<(), sqlx::Error> {
        if !utils::is_table_exists(self.get_pool(), &self.name).await? {
            let query = format!(
                "CREATE TABLE {} (
                    id TEXT PRIMARY KEY,
                    created_at DATETIME
                 )",
                &self.name
            );
            sqlx::query(query.as_str()).execute(self.get_pool()).await?;
        }
        Ok(())
    }

    async fn insert<'a>(
        &self,
        conn: &mut SqliteConnection,
        id: Self::Record<'a>,
    ) -> Result<(), sqlx::Error> {
        let query = format!(
            "INSERT OR IGNORE INTO {} (id, created_at) VALUES (?, ?)",
            &self.name
        );
        sqlx::query(&query)
            .bind(id)
            .bind(Utc::now())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

/// One row per completed license check, keyed by its timestamp.
pub struct RunTable {
    name: String,
    pool: SqlitePool,
}

impl RunTable {
    async fn latest(&self) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
        let query = format!("SELECT id FROM {} ORDER BY id DESC LIMIT 1", self.name);
        let Some(row) = sqlx::query(&query).fetch_optional(&self.pool).await? else {
            return Ok(None);
        };

        let raw: String = row.try_get("id")?;
        Ok(DateTime::parse_from_rfc3339(&raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)))
    }
}

#[async_trait::async_trait]
impl Table for RunTable {
    type Record<'a> = DateTime<Utc>;

    fn get_name(&self) -> &str {
        self.name.as_str()
    }

    fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create(&self) -> Result<(), sqlx::Error> {
        if !utils::is_table_exists(self.get_pool(), &self.name).await? {
            let query = format!(
                "CREATE TABLE {} (
                    id TEXT PRIMARY KEY,
                    created_at DATETIME
                 )",
                &self.name
            );
            sqlx::query(query.as_str()).execute(self.get_pool()).await?;
        }
        Ok(())
    }

    async fn insert<'a>(
        &self,
        conn: &mut SqliteConnection,
        checked_at: Self::Record<'a>,
    ) -> Result<(), sqlx::Error> {
        let query = format!(
            "INSERT OR IGNORE INTO {} (id, created_at) VALUES (?, ?)",
            &self.name
        );
        sqlx::query(&query)
            .bind(checked_at.to_rfc3339_opts(SecondsFormat::Micros, true))
            .bind(Utc::now())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

pub struct ReportTable {
    name: String,
    pool: SqlitePool,
}

#[async_trait::async_trait]
impl Table for ReportTable {
    type Record<'a> = &'a SiteReport;

    fn get_name(&self) -> &str {
        self.name.as_str()
    }

    fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create(&self) -> Result<(), sqlx::Error> {
        if !utils::is_table_exists(self.get_pool(), &self.name).await? {
            let query = format!(
                r#"
                        CREATE TABLE {} (
                            id TEXT PRIMARY KEY,
                            created_at DATETIME,
                            name TEXT,
                            url TEXT,
                            status TEXT,
                            promos TEXT,
                            raw_text TEXT,
                            scraped_at DATETIME
                        )
                    "#,
                &self.name
            );
            sqlx::query(query.as_str()).execute(self.get_pool()).await?;
        }
        Ok(())
    }

    async fn insert<'a>(
        &self,
        conn: &mut SqliteConnection,
        report: Self::Record<'a>,
    ) -> Result<(), sqlx::Error> {
        let query = format!(
            r#"INSERT OR REPLACE INTO {} (
                id,
                name,
                url,
                status,
                promos,
                raw_text,
                scraped_at,
                created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            self.name
        );
        let id = format!(
            "{}@{}",
            report.name,
            report.scraped_at.to_rfc3339_opts(SecondsFormat::Micros, true)
        );
        sqlx::query(&query)
            .bind(id)
            .bind(report.name.as_str())
            .bind(report.url.as_str())
            .bind(report.status.as_str())
            .bind(report.promos.join("|"))
            .bind(report.raw_text.as_str())
            .bind(report.scraped_at)
            .bind(Utc::now())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

/// SQLite-backed storage: `<name>.db` with `<name>_seen`, `<name>_runs` and
/// `<name>_reports` tables.
pub struct SqliteStorage {
    pub name: String,
    pub seen: SeenTable,
    pub runs: RunTable,
    pub reports: ReportTable,
}

impl SqliteStorage {
    pub async fn new(name: &str) -> Result<SqliteStorage, MonitorError> {
        let opt = SqliteConnectOptions::new()
            .filename(format!("{}.db", name))
            .journal_mode(SqliteJournalMode::Delete)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(opt).await?;
        let s = SqliteStorage {
            name: name.to_string(),
            seen: SeenTable {
                name: format!("{}_seen", name),
                pool: pool.clone(),
            },
            runs: RunTable {
                name: format!("{}_runs", name),
                pool: pool.clone(),
            },
            reports: ReportTable {
                name: format!("{}_reports", name),
                pool,
            },
        };

        s.seen.create().await?;
        s.runs.create().await?;
        s.reports.create().await?;
        debug!("Using database {}.db", name);

        Ok(s)
    }

    /// Adds every id of a JSON seen file. Returns how many were new.
    pub async fn import_json(&self, path: &Path) -> Result<u32, MonitorError> {
        let state = JsonStorage::read_seen(path).await?;
        let before = self.seen.count().await?;
        self.write_seen(&state).await?;
        Ok(self.seen.count().await? - before)
    }

    /// Ids and the check timestamp land together or not at all.
    async fn write_seen(&self, state: &SeenState) -> Result<(), sqlx::Error> {
        let mut tx = self.seen.get_pool().begin().await?;
        for id in &state.seen_ids {
            self.seen.insert(&mut *tx, id.as_str()).await?;
        }
        if let Some(checked_at) = state.last_checked_at {
            self.runs.insert(&mut *tx, checked_at).await?;
        }
        tx.commit().await
    }
}

#[async_trait::async_trait]
impl Storage for SqliteStorage {
    async fn seen_get(&self) -> Result<SeenState, MonitorError> {
        Ok(SeenState {
            seen_ids: self.seen.ids().await?.into_iter().collect(),
            last_checked_at: self.runs.latest().await?,
        })
    }

    async fn seen_save(&self, state: &SeenState) -> Result<(), MonitorError> {
        Ok(self.write_seen(state).await?)
    }

    async fn results_save(&self, reports: &[SiteReport]) -> Result<(), MonitorError> {
        let mut tx = self.reports.get_pool().begin().await?;
        for report in reports {
            self.reports.insert(&mut *tx, report).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchStatus;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use tokio::fs;

    async fn fresh(name: &str) -> SqliteStorage {
        let file = format!("{}.db", name);
        if Path::new(&file).is_file() {
            fs::remove_file(&file).await.unwrap();
        }
        SqliteStorage::new(name).await.unwrap()
    }

    async fn remove(name: &str) {
        fs::remove_file(format!("{}.db", name)).await.unwrap();
    }

    fn state(ids: &[&str]) -> SeenState {
        SeenState {
            seen_ids: ids.iter().map(ToString::to_string).collect(),
            last_checked_at: None,
        }
    }

    #[tokio::test]
    async fn create_new_file() {
        if Path::new("test_sqlite1.db").is_file() {
            fs::remove_file("test_sqlite1.db").await.unwrap();
        }

        assert!(!Path::new("test_sqlite1.db").is_file());
        let s = SqliteStorage::new("test_sqlite1").await.unwrap();
        assert!(Path::new("test_sqlite1.db").is_file());
        assert_eq!(s.seen_get().await.unwrap(), SeenState::default());

        remove("test_sqlite1").await;
    }

    #[tokio::test]
    async fn seen_set_only_grows() {
        let s = fresh("test_sqlite2").await;

        let mut first = state(&["ALSI-1-A", "ALSI-2-B"]);
        first.last_checked_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        s.seen_save(&first).await.unwrap();

        // A smaller state never removes rows.
        let mut second = state(&["ALSI-3-C"]);
        second.last_checked_at = Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
        s.seen_save(&second).await.unwrap();

        let loaded = s.seen_get().await.unwrap();
        assert_eq!(loaded.seen_ids, state(&["ALSI-1-A", "ALSI-2-B", "ALSI-3-C"]).seen_ids);
        assert_eq!(loaded.last_checked_at, second.last_checked_at);
        assert!(loaded.contains("ALSI-3-C"));

        remove("test_sqlite2").await;
    }

    #[tokio::test]
    async fn reports_are_stored() {
        let s = fresh("test_sqlite3").await;
        let report = SiteReport {
            name: "Sikwin".to_string(),
            url: "https://sikwin.com/promotions".to_string(),
            status: FetchStatus::Success,
            promos: vec!["100% 500".to_string(), "35x".to_string()],
            raw_text: "Welcome".to_string(),
            scraped_at: Utc::now(),
        };

        s.results_save(&[report.clone(), report]).await.unwrap();
        assert_eq!(s.reports.count().await.unwrap(), 1);

        remove("test_sqlite3").await;
    }

    #[tokio::test]
    async fn rejected_report_rolls_back_batch() {
        let s = fresh("test_sqlite5").await;
        let trigger = format!(
            "CREATE TRIGGER reject_bad BEFORE INSERT ON {} WHEN NEW.name = 'Bad'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
            s.reports.get_name()
        );
        sqlx::query(&trigger).execute(s.reports.get_pool()).await.unwrap();

        let report = |name: &str| SiteReport {
            name: name.to_string(),
            url: format!("https://{}.example/promotions", name.to_lowercase()),
            status: FetchStatus::Success,
            promos: vec![],
            raw_text: String::new(),
            scraped_at: Utc::now(),
        };

        let saved = s.results_save(&[report("Good"), report("Bad")]).await;
        assert!(matches!(saved, Err(MonitorError::DatabaseError(_))));
        assert_eq!(s.reports.count().await.unwrap(), 0);

        remove("test_sqlite5").await;
    }

    #[tokio::test]
    async fn import_from_json_seen_file() {
        let s = fresh("test_sqlite4").await;
        let path = Path::new("test_sqlite4_seen.json");
        fs::write(
            path,
            r#"{"licenses": ["ALSI-1-A", "ALSI-2-B"], "last_check": "2024-05-06T07:08:09.123456"}"#,
        )
        .await
        .unwrap();

        s.seen_save(&state(&["ALSI-1-A"])).await.unwrap();
        assert_eq!(s.import_json(path).await.unwrap(), 1);

        let loaded = s.seen_get().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(
            loaded.last_checked_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap() + chrono::Duration::microseconds(123456))
        );

        fs::remove_file(path).await.unwrap();
        remove("test_sqlite4").await;
    }
}
