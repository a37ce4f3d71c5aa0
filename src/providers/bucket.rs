//! HTTP object store for generated images.
//!
//! Downloads a transient image URL, stores the bytes under a content-addressed
//! key (`images/ab/cd/<sha256>.<ext>`) with a plain `PUT`, and returns the
//! public URL of the stored object. Identical images land on the same key.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use super::ObjectStore;
use crate::error::ProviderError;
use crate::util::sanitize_object_name;

const BACKEND: &str = "object store";

#[derive(Clone)]
pub struct BucketStore {
  client: reqwest::Client,
  token: Option<String>,
  pub endpoint: String,
  pub bucket: String,
  /// Public base URL for stored objects; defaults to `{endpoint}/{bucket}`.
  pub public_base: Option<String>,
}

impl std::fmt::Debug for BucketStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BucketStore")
      .field("endpoint", &self.endpoint)
      .field("bucket", &self.bucket)
      .field("public_base", &self.public_base)
      .finish_non_exhaustive()
  }
}

impl BucketStore {
  pub fn new(
    endpoint: String,
    bucket: String,
    token: Option<String>,
    public_base: Option<String>,
  ) -> Result<Self, ProviderError> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(60))
      .build()
      .map_err(ProviderError::ClientBuild)?;
    Ok(Self { client, token, endpoint, bucket, public_base })
  }

  /// Construct the store if MEDIA_BUCKET_ENDPOINT is set; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let endpoint = std::env::var("MEDIA_BUCKET_ENDPOINT").ok().filter(|e| !e.is_empty())?;
    let bucket = std::env::var("MEDIA_BUCKET_NAME").unwrap_or_else(|_| "educational-media".into());
    let token = std::env::var("MEDIA_BUCKET_TOKEN").ok().filter(|t| !t.is_empty());
    let public_base = std::env::var("MEDIA_PUBLIC_URL").ok().filter(|u| !u.is_empty());
    Self::new(endpoint, bucket, token, public_base).ok()
  }

  fn object_url(&self, key: &str) -> String {
    format!("{}/{}/{}", self.endpoint.trim_end_matches('/'), self.bucket, key)
  }

  fn public_url(&self, key: &str) -> String {
    match &self.public_base {
      Some(base) => format!("{}/{}", base.trim_end_matches('/'), key),
      None => self.object_url(key),
    }
  }
}

/// `images/{h[0..2]}/{h[2..4]}/{hash}.{ext}` for the given bytes.
pub fn content_key(bytes: &[u8], extension: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(bytes);
  let hash = format!("{:x}", hasher.finalize());
  format!("images/{}/{}/{}.{}", &hash[0..2], &hash[2..4], hash, extension)
}

fn extension_for(content_type: &str) -> &'static str {
  match content_type.split(';').next().unwrap_or("").trim() {
    "image/jpeg" | "image/jpg" => "jpg",
    "image/webp" => "webp",
    "image/gif" => "gif",
    _ => "png",
  }
}

#[async_trait]
impl ObjectStore for BucketStore {
  #[instrument(level = "info", target = "providers", skip(self, source_url), fields(bucket = %self.bucket))]
  async fn publish(&self, source_url: &str, name_hint: &str) -> Result<String, ProviderError> {
    let start = Instant::now();
    let res = self
      .client
      .get(source_url)
      .send()
      .await
      .map_err(|source| ProviderError::Request { backend: BACKEND, source })?;
    if !res.status().is_success() {
      let status = res.status().as_u16();
      return Err(ProviderError::Api {
        backend: BACKEND,
        status,
        message: "failed to download source image".into(),
      });
    }

    let content_type = res
      .headers()
      .get(CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .unwrap_or("image/png")
      .to_string();
    let bytes = res
      .bytes()
      .await
      .map_err(|source| ProviderError::Decode { backend: BACKEND, source })?;
    if bytes.is_empty() {
      return Err(ProviderError::Empty(BACKEND));
    }

    let ext = extension_for(&content_type);
    let key = content_key(&bytes, ext);
    debug!(target: "providers", %key, size = bytes.len(), "Uploading image");

    let filename = format!("{}.{}", sanitize_object_name(name_hint), ext);
    let mut req = self
      .client
      .put(self.object_url(&key))
      .header(CONTENT_TYPE, content_type)
      .header(CONTENT_DISPOSITION, format!("inline; filename=\"{}\"", filename))
      .body(bytes);
    if let Some(token) = &self.token {
      req = req.header(AUTHORIZATION, format!("Bearer {}", token));
    }
    let res = req
      .send()
      .await
      .map_err(|source| ProviderError::Request { backend: BACKEND, source })?;
    if !res.status().is_success() {
      let status = res.status().as_u16();
      let message = res.text().await.unwrap_or_default();
      return Err(ProviderError::Api { backend: BACKEND, status, message });
    }

    let url = self.public_url(&key);
    info!(target: "providers", elapsed = ?start.elapsed(), %url, "Image published");
    Ok(url)
  }
}
