use futures::TryStreamExt;
use sqlx::{Row, SqliteConnection, SqlitePool};

/// A SQLite table keyed by a text `id` column, with a `created_at` column
/// giving insertion order. Rows are only ever added, through whatever
/// connection or transaction the caller holds.
#[async_trait::async_trait]
pub trait Table {
    type Record<'a>;

    fn get_name(&self) -> &str;
    fn get_pool(&self) -> &SqlitePool;

    async fn create(&self) -> Result<(), sqlx::Error>;
    async fn insert<'a>(
        &self,
        conn: &mut SqliteConnection,
        record: Self::Record<'a>,
    ) -> Result<(), sqlx::Error>;

    async fn ids(&self) -> Result<Vec<String>, sqlx::Error> {
        let query = format!("SELECT id FROM {} ORDER BY created_at, id", self.get_name());
        let mut rows = sqlx::query(&query).fetch(self.get_pool());

        let mut ids = vec![];
        while let Some(row) = rows.try_next().await? {
            ids.push(row.try_get("id")?);
        }
        Ok(ids)
    }

    async fn count(&self) -> Result<u32, sqlx::Error> {
        let query = format!("SELECT COUNT(*) FROM {}", self.get_name());
        Ok(sqlx::query(&query)
            .fetch_one(self.get_pool())
            .await?
            .try_get(0)?)
    }
}
