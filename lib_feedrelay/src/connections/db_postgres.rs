//! # PostgreSQL Feed Store
//!
//! [`FeedStore`] over a `deadpool-postgres` pool. Feeds live in one table;
//! unsigned keys are stored as `BIGINT` and must fit in `i64`.

use async_trait::async_trait;
use deadpool_postgres::{Config as DeadpoolConfig, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::{NoTls, Row};

use crate::errors::{RelayError, RelayResult};
use crate::feeds::model::Feed;
use crate::feeds::store::FeedStore;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS feeds (
    id          BIGINT PRIMARY KEY,
    unique_key  BIGINT NOT NULL UNIQUE,
    name        TEXT NOT NULL,
    server      BIGINT NOT NULL DEFAULT 0,
    channel     BIGINT NOT NULL DEFAULT 0,
    owner       BIGINT NOT NULL DEFAULT 0,
    url         TEXT NOT NULL,
    mentions    BIGINT[] NOT NULL DEFAULT '{}',
    date        TIMESTAMPTZ NOT NULL
)";

const SELECT_COLUMNS: &str = "SELECT id, unique_key, name, server, channel, owner, url, mentions, date FROM feeds";

const UPSERT: &str = "INSERT INTO feeds (id, unique_key, name, server, channel, owner, url, mentions, date)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
    ON CONFLICT (id) DO UPDATE SET
        unique_key = EXCLUDED.unique_key,
        name = EXCLUDED.name,
        server = EXCLUDED.server,
        channel = EXCLUDED.channel,
        owner = EXCLUDED.owner,
        url = EXCLUDED.url,
        mentions = EXCLUDED.mentions,
        date = EXCLUDED.date";

/// Feed records in PostgreSQL.
#[derive(Clone)]
pub struct PostgresFeedStore {
    pool: Pool,
}

impl std::fmt::Debug for PostgresFeedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresFeedStore").field("status", &self.pool.status()).finish()
    }
}

fn store_err(e: impl std::fmt::Display) -> RelayError {
    RelayError::Store(e.to_string())
}

fn to_db(n: u64, field: &str) -> RelayResult<i64> {
    i64::try_from(n).map_err(|_| RelayError::Store(format!("{field} {n} does not fit in BIGINT")))
}

fn from_db(n: i64, field: &str) -> RelayResult<u64> {
    u64::try_from(n).map_err(|_| RelayError::Store(format!("{field} {n} is negative")))
}

fn feed_from_row(row: &Row) -> RelayResult<Feed> {
    let mentions: Vec<i64> = row.try_get("mentions").map_err(store_err)?;
    Ok(Feed {
        id: row.try_get("id").map_err(store_err)?,
        unique: from_db(row.try_get("unique_key").map_err(store_err)?, "unique")?,
        name: row.try_get("name").map_err(store_err)?,
        server: from_db(row.try_get("server").map_err(store_err)?, "server")?,
        channel: from_db(row.try_get("channel").map_err(store_err)?, "channel")?,
        user: from_db(row.try_get("owner").map_err(store_err)?, "user")?,
        url: row.try_get("url").map_err(store_err)?,
        mentions: mentions
            .into_iter()
            .map(|m| from_db(m, "mention"))
            .collect::<RelayResult<Vec<u64>>>()?,
        date: row.try_get("date").map_err(store_err)?,
    })
}

impl PostgresFeedStore {
    /// Builds a pool for `database_url`. No connection is made until first use.
    pub fn connect(database_url: &str) -> RelayResult<Self> {
        let mut config = DeadpoolConfig::new();
        config.url = Some(database_url.to_string());
        config.manager = Some(ManagerConfig { recycling_method: RecyclingMethod::Fast });
        let pool = config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| RelayError::Config(format!("database pool: {e}")))?;
        Ok(Self { pool })
    }

    /// Creates the `feeds` table if it is missing.
    pub async fn ensure_schema(&self) -> RelayResult<()> {
        let client = self.pool.get().await.map_err(store_err)?;
        client.batch_execute(CREATE_TABLE).await.map_err(store_err)?;
        tracing::info!("feeds table ready");
        Ok(())
    }
}

#[async_trait]
impl FeedStore for PostgresFeedStore {
    async fn get_by_unique(&self, unique: u64) -> RelayResult<Option<Feed>> {
        let client = self.pool.get().await.map_err(store_err)?;
        let query = format!("{SELECT_COLUMNS} WHERE unique_key = $1");
        let row = client
            .query_opt(query.as_str(), &[&to_db(unique, "unique")?])
            .await
            .map_err(store_err)?;
        row.as_ref().map(feed_from_row).transpose()
    }

    async fn upsert(&self, feed: &Feed) -> RelayResult<()> {
        let client = self.pool.get().await.map_err(store_err)?;
        let mentions = feed
            .mentions
            .iter()
            .map(|m| to_db(*m, "mention"))
            .collect::<RelayResult<Vec<i64>>>()?;
        client
            .execute(
                UPSERT,
                &[
                    &feed.id,
                    &to_db(feed.unique, "unique")?,
                    &feed.name,
                    &to_db(feed.server, "server")?,
                    &to_db(feed.channel, "channel")?,
                    &to_db(feed.user, "user")?,
                    &feed.url,
                    &mentions,
                    &feed.date,
                ],
            )
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn list_all_sorted(&self) -> RelayResult<Vec<Feed>> {
        let client = self.pool.get().await.map_err(store_err)?;
        let query = format!("{SELECT_COLUMNS} ORDER BY id ASC");
        let rows = client.query(query.as_str(), &[]).await.map_err(store_err)?;
        rows.iter().map(feed_from_row).collect()
    }
}
