use crate::models::{EventRow, NewEvent, Pixel, PixelEvent};
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pixels (
                id TEXT PRIMARY KEY,
                created_at BIGINT NOT NULL,
                expires_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id BIGSERIAL PRIMARY KEY,
                pixel_id TEXT NOT NULL,
                timestamp BIGINT NOT NULL,
                ip_hash TEXT NOT NULL,
                country TEXT,
                region TEXT,
                browser TEXT,
                os TEXT,
                device_type TEXT,
                params TEXT,
                notes TEXT
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_events_pixel_time ON events(pixel_id, timestamp)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_pixels_expires_at ON pixels(expires_at)")
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn create_pixel(
        &self,
        id: &str,
        created_at: i64,
        expires_at: i64,
    ) -> StorageResult<Pixel> {
        let pixel = sqlx::query_as::<_, Pixel>(
            r#"
            INSERT INTO pixels (id, created_at, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO NOTHING
            RETURNING id, created_at, expires_at
            "#,
        )
        .bind(id)
        .bind(created_at)
        .bind(expires_at)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        pixel.ok_or(StorageError::Conflict)
    }

    async fn get_pixel(&self, id: &str) -> Result<Option<Pixel>> {
        let pixel = sqlx::query_as::<_, Pixel>(
            r#"
            SELECT id, created_at, expires_at
            FROM pixels
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(pixel)
    }

    async fn delete_pixel(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM events WHERE pixel_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM pixels WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_pixels(&self) -> Result<Vec<Pixel>> {
        let pixels = sqlx::query_as::<_, Pixel>(
            r#"
            SELECT id, created_at, expires_at
            FROM pixels
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(pixels)
    }

    async fn create_event(&self, event: &NewEvent) -> Result<bool> {
        // Only insert while the pixel row exists, so a stale cache can't orphan events
        let result = sqlx::query(
            r#"
            INSERT INTO events (
                pixel_id, timestamp, ip_hash, country, region,
                browser, os, device_type, params, notes
            )
            SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10
            WHERE EXISTS (SELECT 1 FROM pixels WHERE id = $1)
            "#,
        )
        .bind(&event.pixel_id)
        .bind(event.timestamp)
        .bind(&event.ip_hash)
        .bind(event.country.as_deref())
        .bind(event.region.as_deref())
        .bind(event.browser.as_deref())
        .bind(event.os.as_deref())
        .bind(event.device_type.map(|d| d.as_str()))
        .bind(event.params_json())
        .bind(event.notes.as_deref())
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_events_by_pixel(&self, pixel_id: &str) -> Result<Vec<PixelEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, pixel_id, timestamp, ip_hash, country, region,
                   browser, os, device_type, params, notes
            FROM events
            WHERE pixel_id = $1
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(pixel_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().map(PixelEvent::from).collect())
    }

    async fn count_events(&self, pixel_id: &str) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM events WHERE pixel_id = $1")
            .bind(pixel_id)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(count)
    }
}
