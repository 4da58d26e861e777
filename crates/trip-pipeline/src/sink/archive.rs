//! S3-compatible artifact archive
//!
//! Artifacts land under `trips/<YYYY>/<MM>/<DD>/<file name>`, partitioned by
//! the trip's start date. Works against AWS S3 and MinIO alike.

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use tracing::{debug, info, instrument};

use trip_common::TripIdentity;

use super::{Artifact, ArtifactArchive};
use crate::config::ArchiveConfig;
use crate::error::{PipelineError, PipelineResult};

const STORE: &str = "s3";
const ROOT: &str = "trips";
const CONTENT_TYPE: &str = "application/vnd.apache.parquet";

#[derive(Debug, Clone)]
pub struct UploadResult {
    pub key: String,
    pub checksum: String,
    pub size: i64,
}

#[derive(Clone)]
pub struct S3Archive {
    client: Client,
    bucket: String,
    keep_local: bool,
}

impl S3Archive {
    pub fn new(config: &ArchiveConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "trip-archive",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        info!(bucket = %config.bucket, endpoint = ?config.endpoint, "S3 archive configured");

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            keep_local: config.keep_local,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Fails when the bucket is missing or the credentials are rejected.
    pub async fn check_bucket(&self) -> PipelineResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| PipelineError::unavailable(STORE, format!("bucket '{}': {}", self.bucket, e)))?;
        Ok(())
    }

    #[instrument(skip(self, data))]
    pub async fn upload(&self, key: &str, data: Vec<u8>) -> PipelineResult<UploadResult> {
        let checksum = calculate_sha256(&data);
        let size = data.len() as i64;

        debug!("Uploading {} bytes to s3://{}/{}", size, self.bucket, key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(CONTENT_TYPE)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| PipelineError::unavailable(STORE, format!("put {}: {}", key, e)))?;

        Ok(UploadResult {
            key: key.to_string(),
            checksum,
            size,
        })
    }
}

/// `trips/YYYY/MM/DD/<file>`, from the identity's start date.
pub fn object_key(identity: &TripIdentity, file_name: &str) -> String {
    let date = identity.start_date();
    format!(
        "{}/{}/{}/{}/{}",
        ROOT,
        &date[0..4],
        &date[4..6],
        &date[6..8],
        file_name
    )
}

fn calculate_sha256(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[async_trait]
impl ArtifactArchive for S3Archive {
    async fn archive(&self, identity: &TripIdentity, artifact: &Artifact) -> PipelineResult<String> {
        let file_name = artifact
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                PipelineError::Config(format!("artifact path {} has no file name", artifact.path.display()))
            })?;
        let key = object_key(identity, file_name);

        let data = tokio::fs::read(&artifact.path).await?;
        let uploaded = self.upload(&key, data).await?;

        info!(
            trip = %identity,
            key = %uploaded.key,
            sha256 = %uploaded.checksum,
            bytes = uploaded.size,
            "Artifact archived"
        );

        if !self.keep_local {
            tokio::fs::remove_file(&artifact.path).await?;
        }

        Ok(format!("s3://{}/{}", self.bucket, uploaded.key))
    }
}
