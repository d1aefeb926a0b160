//! PostgreSQL implementation of FeedRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Order, PostgresQueryBuilder, Query};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::debug;

use super::schema::{create_created_at_index, create_feeds_table, Feeds};
use super::{FeedRepository, PostgresConfig, RepositoryError, Result};
use crate::models::Feed;

/// PostgreSQL-backed feed repository.
pub struct PostgresFeedRepository {
    pool: PgPool,
}

impl PostgresFeedRepository {
    /// Create a repository over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against the configured database.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Create the feeds table if it does not exist.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(&create_feeds_table().to_string(PostgresQueryBuilder))
            .execute(&self.pool)
            .await?;
        sqlx::query(&create_created_at_index().to_string(PostgresQueryBuilder))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn insert_sql(feed: &Feed) -> String {
    Query::insert()
        .into_table(Feeds::Table)
        .columns([
            Feeds::Id,
            Feeds::Title,
            Feeds::Description,
            Feeds::CreatedAt,
        ])
        .values_panic([
            feed.id.as_str().into(),
            feed.title.as_str().into(),
            feed.description.as_str().into(),
            feed.created_at.to_rfc3339().into(),
        ])
        .to_string(PostgresQueryBuilder)
}

fn list_sql() -> String {
    Query::select()
        .columns([
            Feeds::Id,
            Feeds::Title,
            Feeds::Description,
            Feeds::CreatedAt,
        ])
        .from(Feeds::Table)
        .order_by(Feeds::CreatedAt, Order::Desc)
        .order_by(Feeds::Id, Order::Asc)
        .to_string(PostgresQueryBuilder)
}

#[async_trait]
impl FeedRepository for PostgresFeedRepository {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn save(&self, feed: &Feed) -> Result<()> {
        match sqlx::query(&insert_sql(feed)).execute(&self.pool).await {
            Ok(_) => {
                debug!(id = %feed.id, "Saved feed");
                Ok(())
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(RepositoryError::Duplicate(feed.id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<Feed>> {
        let rows = sqlx::query(&list_sql()).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> Result<Feed> {
                Ok(Feed {
                    id: row.try_get("id")?,
                    title: row.try_get("title")?,
                    description: row.try_get("description")?,
                    created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
                })
            })
            .collect()
    }
}
