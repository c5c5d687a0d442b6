//! S3-compatible object store
//!
//! Uploads are sent as a presigned PUT so the request body can be streamed
//! chunk by chunk, which is what drives progress reporting.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::Region, presigning::PresigningConfig, types::ObjectCannedAcl, Client,
};
use futures::stream::{self, Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH};
use tracing::{debug, info, warn};

use super::{ObjectStore, ProgressReporter, UploadError, UploadResult};
use crate::config::StorageConfig;

/// Size of each body chunk handed to the transport
const CHUNK_SIZE: usize = 64 * 1024;

/// Object store backed by an S3 bucket
pub struct S3ObjectStore {
    client: Client,
    http: reqwest::Client,
    bucket: String,
    public_base_url: Option<String>,
    presign_expiry: Duration,
}

impl S3ObjectStore {
    /// Creates a store from the storage settings
    ///
    /// # Errors
    ///
    /// Returns `UploadError::Config` if no bucket is configured
    pub async fn connect(config: &StorageConfig) -> UploadResult<Self> {
        let bucket = config.bucket.clone().ok_or_else(|| {
            UploadError::Config(
                "no bucket configured (set storage.bucket or S3_BUCKET_NAME)".to_string(),
            )
        })?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint_url) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }
        let client = Client::from_conf(builder.build());

        info!("☁️  Initialized S3 object store for bucket: {}", bucket);
        if config.public_base_url.is_none() {
            warn!(
                "No storage.public_base_url set; objects are uploaded public-read so the \
                 gallery can fetch them, which fails on buckets with ACLs disabled"
            );
        }

        Ok(Self {
            client,
            http: reqwest::Client::new(),
            bucket,
            public_base_url: config.public_base_url.clone(),
            presign_expiry: Duration::from_secs(config.presign_expiry_secs),
        })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_file(
        &self,
        key: &str,
        source: &Path,
        progress: ProgressReporter,
    ) -> UploadResult<String> {
        let data = tokio::fs::read(source).await?;
        let total = data.len() as u64;

        let presigning = PresigningConfig::expires_in(self.presign_expiry)
            .map_err(|e| UploadError::Config(format!("Failed to create presigning config: {e}")))?;

        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_length(total as i64)
            .content_type(content_type_for(key))
            .set_acl(upload_acl(self.public_base_url.as_deref()))
            .presigned(presigning)
            .await?;

        let mut headers = HeaderMap::new();
        for (name, value) in presigned.headers() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| UploadError::S3(format!("Invalid presigned header: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| UploadError::S3(format!("Invalid presigned header: {e}")))?;
            headers.insert(name, value);
        }
        headers.insert(CONTENT_LENGTH, HeaderValue::from(total));

        debug!("PUT {} bytes to {}/{}", total, self.bucket, key);

        let response = self
            .http
            .put(presigned.uri())
            .headers(headers)
            .body(reqwest::Body::wrap_stream(chunked_body(data, progress)))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UploadError::Status(response.status().as_u16()));
        }

        Ok(public_url(
            self.public_base_url.as_deref(),
            key,
            presigned.uri(),
        ))
    }
}

impl std::fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ObjectStore")
            .field("bucket", &self.bucket)
            .field("public_base_url", &self.public_base_url)
            .finish()
    }
}

/// Split `data` into chunks, reporting progress as each chunk is pulled
fn chunked_body(
    data: Vec<u8>,
    mut progress: ProgressReporter,
) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> + Send + 'static {
    let total = data.len() as u64;
    let chunks: Vec<Vec<u8>> = data.chunks(CHUNK_SIZE).map(<[u8]>::to_vec).collect();
    let mut sent = 0u64;

    stream::iter(chunks).map(move |chunk| {
        sent += chunk.len() as u64;
        progress.report(sent, total);
        Ok(chunk)
    })
}

/// Canned ACL for new objects.
///
/// Without a public base URL the recorded URL points straight at the bucket,
/// so the object itself has to be readable. A bucket that rejects ACLs fails
/// the upload instead of recording a URL the gallery cannot load.
fn upload_acl(public_base_url: Option<&str>) -> Option<ObjectCannedAcl> {
    match public_base_url {
        Some(_) => None,
        None => Some(ObjectCannedAcl::PublicRead),
    }
}

/// URL recorded for an uploaded object: `<base>/<key>` when a public base is
/// configured, else the presigned URL without its signature query.
fn public_url(base: Option<&str>, key: &str, presigned_uri: &str) -> String {
    match base {
        Some(base) => format!("{}/{}", base.trim_end_matches('/'), key),
        None => presigned_uri
            .split('?')
            .next()
            .unwrap_or(presigned_uri)
            .to_string(),
    }
}

fn content_type_for(key: &str) -> &'static str {
    let ext = key.rsplit('.').next().unwrap_or_default().to_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;

    #[test]
    fn test_public_url_prefers_configured_base() {
        assert_eq!(
            public_url(
                Some("https://cdn.example.com/"),
                "images/a.png",
                "https://bucket.s3.amazonaws.com/images/a.png?X-Amz-Signature=abc"
            ),
            "https://cdn.example.com/images/a.png"
        );
    }

    #[test]
    fn test_public_url_strips_signature() {
        assert_eq!(
            public_url(
                None,
                "images/a.png",
                "https://bucket.s3.amazonaws.com/images/a.png?X-Amz-Signature=abc"
            ),
            "https://bucket.s3.amazonaws.com/images/a.png"
        );
    }

    #[test]
    fn test_objects_are_public_without_base_url() {
        assert_eq!(upload_acl(None), Some(ObjectCannedAcl::PublicRead));
        assert_eq!(upload_acl(Some("https://cdn.example.com")), None);
    }

    #[tokio::test]
    async fn test_presigned_put_signs_public_read_acl() {
        let config = StorageConfig {
            bucket: Some("photos".to_string()),
            region: Some("us-east-1".to_string()),
            endpoint_url: Some("http://localhost:9000".to_string()),
            force_path_style: true,
            ..StorageConfig::default()
        };
        std::env::set_var("AWS_ACCESS_KEY_ID", "test");
        std::env::set_var("AWS_SECRET_ACCESS_KEY", "test");
        let store = S3ObjectStore::connect(&config).await.unwrap();

        let presigned = store
            .client
            .put_object()
            .bucket(&store.bucket)
            .key("images/a.png")
            .set_acl(upload_acl(store.public_base_url.as_deref()))
            .presigned(PresigningConfig::expires_in(store.presign_expiry).unwrap())
            .await
            .unwrap();

        // The signer may carry the ACL as a header or hoist it into the query
        let in_headers = presigned
            .headers()
            .any(|(name, value)| name.eq_ignore_ascii_case("x-amz-acl") && value == "public-read");
        let in_query = presigned.uri().contains("x-amz-acl=public-read");
        assert!(in_headers || in_query);
    }

    #[tokio::test]
    async fn test_connect_requires_bucket() {
        let result = S3ObjectStore::connect(&StorageConfig::default()).await;
        assert!(matches!(result, Err(UploadError::Config(_))));
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type_for("images/x.JPG"), "image/jpeg");
        assert_eq!(content_type_for("images/x.png"), "image/png");
        assert_eq!(content_type_for("images/x./tmp/photo"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_chunked_body_reports_each_chunk() {
        let (tx, rx) = mpsc::unbounded();
        let data = vec![7u8; CHUNK_SIZE * 2 + 10];

        let chunks: Vec<_> = chunked_body(data, ProgressReporter::new(tx))
            .collect::<Vec<_>>()
            .await;
        let progress: Vec<f32> = rx.collect().await;

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].as_ref().unwrap().len(), 10);
        assert_eq!(progress.len(), 3);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(progress.last().copied(), Some(100.0));
    }
}
