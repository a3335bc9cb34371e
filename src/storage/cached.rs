use crate::models::{NewEvent, Pixel, PixelEvent};
use crate::storage::{Storage, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Cached storage wrapper that serves pixel lookups from memory
///
/// Every pixel load needs the pixel's expiry, so lookups (including misses)
/// are cached. Events are never cached: stats always read the full history.
pub struct CachedStorage {
    /// Underlying storage implementation
    inner: Arc<dyn Storage>,
    /// Read cache for pixel lookups (Moka cache)
    read_cache: Cache<String, Option<Pixel>>,
}

impl CachedStorage {
    pub fn new(inner: Arc<dyn Storage>, max_cache_entries: u64, ttl_secs: u64) -> Self {
        let read_cache = Cache::builder()
            .max_capacity(max_cache_entries)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self { inner, read_cache }
    }

    /// Invalidate cache entry for a specific pixel
    async fn invalidate_cache(&self, id: &str) {
        self.read_cache.invalidate(id).await;
    }
}

#[async_trait]
impl Storage for CachedStorage {
    async fn init(&self) -> Result<()> {
        self.inner.init().await
    }

    async fn create_pixel(
        &self,
        id: &str,
        created_at: i64,
        expires_at: i64,
    ) -> StorageResult<Pixel> {
        let pixel = self.inner.create_pixel(id, created_at, expires_at).await?;

        // Replace any cached miss for this id
        self.read_cache
            .insert(id.to_string(), Some(pixel.clone()))
            .await;

        Ok(pixel)
    }

    async fn get_pixel(&self, id: &str) -> Result<Option<Pixel>> {
        if let Some(cached) = self.read_cache.get(id).await {
            return Ok(cached);
        }

        let pixel = self.inner.get_pixel(id).await?;
        self.read_cache.insert(id.to_string(), pixel.clone()).await;

        Ok(pixel)
    }

    async fn delete_pixel(&self, id: &str) -> Result<bool> {
        let result = self.inner.delete_pixel(id).await;

        // Invalidate regardless of outcome; a failed delete may have partially applied
        self.invalidate_cache(id).await;

        result
    }

    async fn list_pixels(&self) -> Result<Vec<Pixel>> {
        self.inner.list_pixels().await
    }

    async fn create_event(&self, event: &NewEvent) -> Result<bool> {
        let inserted = self.inner.create_event(event).await?;

        // The pixel was deleted behind our back; drop the stale entry
        if !inserted {
            self.invalidate_cache(&event.pixel_id).await;
        }

        Ok(inserted)
    }

    async fn get_events_by_pixel(&self, pixel_id: &str) -> Result<Vec<PixelEvent>> {
        self.inner.get_events_by_pixel(pixel_id).await
    }

    async fn count_events(&self, pixel_id: &str) -> Result<i64> {
        self.inner.count_events(pixel_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;

    async fn create_cached_storage() -> (Arc<dyn Storage>, CachedStorage) {
        let sqlite = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
        sqlite.init().await.unwrap();
        let inner: Arc<dyn Storage> = Arc::new(sqlite);
        let cached = CachedStorage::new(Arc::clone(&inner), 100, 300);
        (inner, cached)
    }

    #[tokio::test]
    async fn test_cached_miss_is_replaced_on_create() {
        let (_inner, cached) = create_cached_storage().await;

        assert!(cached.get_pixel("p1").await.unwrap().is_none());
        cached.create_pixel("p1", 1, 2).await.unwrap();

        let pixel = cached.get_pixel("p1").await.unwrap().unwrap();
        assert_eq!(pixel.expires_at, 2);
    }

    #[tokio::test]
    async fn test_delete_invalidates_cached_pixel() {
        let (inner, cached) = create_cached_storage().await;

        cached.create_pixel("p1", 1, 2).await.unwrap();
        assert!(cached.get_pixel("p1").await.unwrap().is_some());

        assert!(cached.delete_pixel("p1").await.unwrap());
        assert!(cached.get_pixel("p1").await.unwrap().is_none());
        assert!(inner.get_pixel("p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lookups_are_served_from_cache() {
        let (inner, cached) = create_cached_storage().await;

        cached.create_pixel("p1", 1, 2).await.unwrap();
        // Bypass the wrapper: the cached copy survives until invalidated
        inner.delete_pixel("p1").await.unwrap();

        assert!(cached.get_pixel("p1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rejected_event_drops_stale_pixel() {
        let (inner, cached) = create_cached_storage().await;

        cached.create_pixel("p1", 1, 2).await.unwrap();
        inner.delete_pixel("p1").await.unwrap();
        assert!(cached.get_pixel("p1").await.unwrap().is_some());

        let event = NewEvent {
            pixel_id: "p1".to_string(),
            timestamp: 1,
            ip_hash: "h".to_string(),
            country: None,
            region: None,
            browser: None,
            os: None,
            device_type: None,
            params: Default::default(),
            notes: None,
        };
        assert!(!cached.create_event(&event).await.unwrap());

        assert!(cached.get_pixel("p1").await.unwrap().is_none());
        assert_eq!(inner.count_events("p1").await.unwrap(), 0);
    }
}
