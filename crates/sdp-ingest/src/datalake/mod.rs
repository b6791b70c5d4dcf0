//! Object-store access for snapshot landings
//!
//! [`Datalake`] wraps an S3-compatible client (AWS S3 in production, MinIO
//! locally) scoped to one bucket. Folder discovery lists common prefixes
//! under a configured path and hands the names to the pure resolver core;
//! everything date-related happens there, not here.

use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    Client,
};
use tracing::{debug, info, instrument};

use crate::resolver::{self, DatedFolder};
use sdp_common::checksum::sha256_hex;

pub mod config;

pub use config::DatalakeConfig;

/// Result type for object-store operations
pub type Result<T> = std::result::Result<T, DatalakeError>;

/// Errors raised against the landing object store
#[derive(Debug, thiserror::Error)]
pub enum DatalakeError {
    #[error("Object store request failed: {0}")]
    Request(String),

    #[error(transparent)]
    Resolve(#[from] crate::resolver::ResolveError),

    #[error("No file matching '{fragment}' in folder '{folder}'")]
    SnapshotFileNotFound { folder: String, fragment: String },
}

/// Outcome of one artefact upload
#[derive(Debug, Clone)]
pub struct UploadResult {
    pub key: String,
    pub checksum: String,
    pub size: i64,
}

/// Client for the landing bucket
#[derive(Clone)]
pub struct Datalake {
    client: Client,
    bucket: String,
}

impl Datalake {
    pub fn new(config: DatalakeConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "sdp-datalake",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(builder.build());

        info!(bucket = %config.bucket, "Datalake client initialized");

        Self {
            client,
            bucket: config.bucket,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// List the folder names directly under a prefix
    #[instrument(skip(self))]
    pub async fn list_folders(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = ensure_trailing_slash(prefix);

        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&prefix)
            .delimiter("/")
            .send()
            .await
            .map_err(|e| DatalakeError::Request(format!("{}", DisplayErrorContext(&e))))?;

        let folders: Vec<String> = response
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(|s| s.to_string()))
            .collect();

        debug!(prefix = %prefix, folders = folders.len(), "Listed landing folders");
        Ok(folders)
    }

    /// The most recent dated snapshot folder under a prefix
    pub async fn latest_snapshot_folder(&self, prefix: &str) -> Result<DatedFolder> {
        let folders = self.list_folders(prefix).await?;
        let latest = resolver::latest_folder(&folders)?;

        info!(prefix = %prefix, folder = %latest, "Resolved latest snapshot folder");
        Ok(latest)
    }

    /// Find the snapshot file inside a dated folder
    ///
    /// The configured fragment matches against the file name, not the full
    /// key, so a fragment like "snapshot.csv" also matches
    /// "weekly_snapshot.csv". The first match in listing order wins.
    #[instrument(skip(self))]
    pub async fn find_snapshot_file(
        &self,
        prefix: &str,
        folder: &str,
        fragment: &str,
    ) -> Result<String> {
        let folder_prefix = format!("{}{}/", ensure_trailing_slash(prefix), folder);

        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&folder_prefix)
            .send()
            .await
            .map_err(|e| DatalakeError::Request(format!("{}", DisplayErrorContext(&e))))?;

        let keys: Vec<String> = response
            .contents()
            .iter()
            .filter_map(|obj| obj.key().map(|k| k.to_string()))
            .collect();

        match_snapshot_key(&keys, fragment)
            .map(|k| k.to_string())
            .ok_or_else(|| DatalakeError::SnapshotFileNotFound {
                folder: folder.to_string(),
                fragment: fragment.to_string(),
            })
    }

    /// Download one object into memory
    #[instrument(skip(self))]
    pub async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| DatalakeError::Request(format!("{}", DisplayErrorContext(&e))))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| DatalakeError::Request(e.to_string()))?
            .into_bytes()
            .to_vec();

        debug!(key = %key, bytes = data.len(), "Downloaded snapshot object");
        Ok(data)
    }

    /// Upload a processed artefact
    #[instrument(skip(self, data))]
    pub async fn upload(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<UploadResult> {
        let checksum = sha256_hex(&data);
        let size = data.len() as i64;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data));

        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }

        request
            .send()
            .await
            .map_err(|e| DatalakeError::Request(format!("{}", DisplayErrorContext(&e))))?;

        info!(key = %key, bytes = size, "Uploaded artefact");

        Ok(UploadResult {
            key: key.to_string(),
            checksum,
            size,
        })
    }
}

fn ensure_trailing_slash(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{}/", prefix)
    }
}

fn match_snapshot_key<'a>(keys: &'a [String], fragment: &str) -> Option<&'a String> {
    keys.iter().find(|key| {
        let file_name = key.rsplit('/').next().unwrap_or(key);
        file_name.contains(fragment)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_added_once() {
        assert_eq!(ensure_trailing_slash("land/records"), "land/records/");
        assert_eq!(ensure_trailing_slash("land/records/"), "land/records/");
        assert_eq!(ensure_trailing_slash(""), "");
    }

    #[test]
    fn fragment_matches_file_name_not_path() {
        let keys = vec![
            "land/snapshot.csv/readme.txt".to_string(),
            "land/2022-04-01/weekly_snapshot.csv".to_string(),
        ];

        let key = match_snapshot_key(&keys, "snapshot.csv").unwrap();
        assert_eq!(key, "land/2022-04-01/weekly_snapshot.csv");
    }

    #[test]
    fn no_matching_file_is_none() {
        let keys = vec!["land/2022-04-01/other.parquet".to_string()];
        assert!(match_snapshot_key(&keys, "snapshot.csv").is_none());
    }

    #[test]
    fn first_listing_match_wins() {
        let keys = vec![
            "land/2022-04-01/a_extract.csv".to_string(),
            "land/2022-04-01/b_extract.csv".to_string(),
        ];
        assert_eq!(
            match_snapshot_key(&keys, "extract.csv").unwrap(),
            "land/2022-04-01/a_extract.csv"
        );
    }
}
