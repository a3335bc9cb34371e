use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Pixel {
    pub id: String,
    pub created_at: i64,
    pub expires_at: i64,
}

impl Pixel {
    /// A pixel stops accepting events once `now` reaches `expires_at`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid pixel id: {0}")]
pub struct InvalidPixelId(pub String);

/// A validated pixel identifier.
///
/// Pixel ids are hyphenated UUID v4 strings. Anything else is rejected at the
/// HTTP boundary and never reaches storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PixelId(String);

impl PixelId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().hyphenated().to_string())
    }

    pub fn parse(raw: &str) -> Result<Self, InvalidPixelId> {
        Uuid::try_parse(raw)
            .map(|id| Self(id.hyphenated().to_string()))
            .map_err(|_| InvalidPixelId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PixelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PixelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
