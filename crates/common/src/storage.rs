//! Blob storage with time-limited signed URLs.
//!
//! Notice attachments live in object storage. The rest of the system only
//! needs to hand out read or write URLs for a blob key, check that a blob
//! exists, and delete it; how the URL is signed is up to the backend.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

/// What a signed URL allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobAccess {
    /// Download the object.
    Read,
    /// Upload (overwrite) the object.
    Write,
}

impl BlobAccess {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

/// A time-limited URL for one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrl {
    /// The URL to hand to the client.
    pub url: String,
    /// Instant after which the URL stops working.
    pub expires_at: DateTime<Utc>,
}

/// Stored object metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMetadata {
    /// Object key.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time, when the backend reports one.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Blob storage backend.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Issue a time-limited URL for reading or writing `key`.
    async fn signed_url(
        &self,
        key: &str,
        access: BlobAccess,
        ttl: Duration,
    ) -> AppResult<SignedUrl>;

    /// Metadata for `key`, or `None` if it does not exist.
    async fn metadata(&self, key: &str) -> AppResult<Option<BlobMetadata>>;

    /// Check if an object exists.
    async fn exists(&self, key: &str) -> AppResult<bool> {
        Ok(self.metadata(key).await?.is_some())
    }

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> AppResult<()>;
}

/// Local filesystem backend with HMAC-signed URLs.
pub struct LocalBlobStore {
    base_path: PathBuf,
    base_url: String,
    secret: Vec<u8>,
}

impl LocalBlobStore {
    /// Create a new local blob store.
    #[must_use]
    pub fn new(base_path: PathBuf, base_url: String, secret: &str) -> Self {
        Self {
            base_path,
            base_url,
            secret: secret.as_bytes().to_vec(),
        }
    }

    fn path_for(&self, key: &str) -> AppResult<PathBuf> {
        if key.is_empty() || key.starts_with('/') || key.split('/').any(|part| part == "..") {
            return Err(AppError::BadRequest(format!("Invalid blob key: {key}")));
        }
        Ok(self.base_path.join(key))
    }

    fn signature(&self, key: &str, access: BlobAccess, expires: i64) -> AppResult<String> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AppError::Storage(format!("Invalid signing secret: {e}")))?;
        mac.update(format!("{}\n{}\n{}", access.as_str(), key, expires).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

#[async_trait::async_trait]
impl BlobStore for LocalBlobStore {
    async fn signed_url(
        &self,
        key: &str,
        access: BlobAccess,
        ttl: Duration,
    ) -> AppResult<SignedUrl> {
        self.path_for(key)?;
        let expires_at = Utc::now() + ttl;
        let expires = expires_at.timestamp();
        let signature = self.signature(key, access, expires)?;

        Ok(SignedUrl {
            url: format!(
                "{}/{}?access={}&expires={}&signature={}",
                self.base_url.trim_end_matches('/'),
                key,
                access.as_str(),
                expires,
                signature
            ),
            expires_at,
        })
    }

    async fn metadata(&self, key: &str) -> AppResult<Option<BlobMetadata>> {
        let path = self.path_for(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(BlobMetadata {
                key: key.to_string(),
                size: meta.len(),
                updated_at: meta.modified().ok().map(DateTime::<Utc>::from),
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Storage(format!("Failed to stat {key}: {e}"))),
        }
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Storage(format!("Failed to delete {key}: {e}"))),
        }
    }
}

/// Generate a unique storage key for a case document.
#[must_use]
pub fn generate_storage_key(case_id: &str, original_name: &str) -> String {
    let now = Utc::now();
    let date_path = now.format("%Y/%m/%d").to_string();

    let extension = original_name
        .rfind('.')
        .filter(|&pos| pos > 0 && pos < original_name.len() - 1)
        .map(|pos| &original_name[pos + 1..])
        .filter(|ext| ext.len() <= 10 && !ext.is_empty())
        .unwrap_or("bin");

    format!(
        "cases/{}/{}/{}.{}",
        case_id,
        date_path,
        uuid::Uuid::new_v4(),
        extension
    )
}
