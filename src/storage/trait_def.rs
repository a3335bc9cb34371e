use crate::models::{NewEvent, Pixel, PixelEvent};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("pixel id already exists")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables and indexes)
    async fn init(&self) -> Result<()>;

    /// Persist a new pixel
    async fn create_pixel(
        &self,
        id: &str,
        created_at: i64,
        expires_at: i64,
    ) -> StorageResult<Pixel>;

    /// Get a pixel by id
    async fn get_pixel(&self, id: &str) -> Result<Option<Pixel>>;

    /// Delete a pixel and all of its events
    ///
    /// Returns false when the pixel did not exist.
    async fn delete_pixel(&self, id: &str) -> Result<bool>;

    /// All pixels, oldest first
    async fn list_pixels(&self) -> Result<Vec<Pixel>>;

    /// Append an event
    ///
    /// Returns false, writing nothing, when the event's pixel no longer exists.
    async fn create_event(&self, event: &NewEvent) -> Result<bool>;

    /// Events of one pixel in ascending timestamp order
    async fn get_events_by_pixel(&self, pixel_id: &str) -> Result<Vec<PixelEvent>>;

    /// Number of stored events for a pixel
    async fn count_events(&self, pixel_id: &str) -> Result<i64>;
}
