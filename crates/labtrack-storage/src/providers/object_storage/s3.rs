//! AWS SDK object-store client.

use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Credentials};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::info;

use labtrack_core::{AppError, AppResult, ErrorKind};
use labtrack_entity::{ObjectStorageDriveDetails, StorageDrive};

use super::client::{ListPage, ObjectEntry, ObjectStoreClient, ObjectStoreConnector};

/// Object-store client for one bucket, backed by `aws-sdk-s3`.
#[derive(Debug, Clone)]
pub struct S3ObjectStoreClient {
    client: Client,
    bucket: String,
}

impl S3ObjectStoreClient {
    /// Build a client from drive details. Absent static credentials fall
    /// back to the ambient AWS credential chain.
    pub async fn connect(details: &ObjectStorageDriveDetails) -> AppResult<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(details.region.clone()));

        if let (Some(key_id), Some(secret)) = (&details.access_key_id, &details.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                key_id.clone(),
                secret.clone(),
                None,
                None,
                "labtrack-drive",
            ));
        }
        if let Some(endpoint) = &details.endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }

        let shared = loader.load().await;
        let config = S3ConfigBuilder::from(&shared)
            .force_path_style(details.force_path_style)
            .build();

        info!(
            bucket = %details.bucket,
            region = %details.region,
            endpoint = ?details.endpoint,
            "Initialized object-storage client"
        );

        Ok(Self {
            client: Client::from_conf(config),
            bucket: details.bucket.clone(),
        })
    }

    fn sdk_error<E>(action: &str, key: &str, err: E) -> AppError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        AppError::with_source(
            ErrorKind::WriteFailure,
            format!(
                "Object storage failed to {action} '{key}': {}",
                DisplayErrorContext(&err)
            ),
            err,
        )
    }
}

fn to_chrono(ts: Option<&aws_sdk_s3::primitives::DateTime>) -> Option<DateTime<Utc>> {
    ts.and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
}

/// `CopySource` is `bucket/key` with the key percent-encoded.
fn copy_source(bucket: &str, key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    format!("{bucket}/{encoded}")
}

#[async_trait]
impl ObjectStoreClient for S3ObjectStoreClient {
    async fn put_object(&self, key: &str, body: Bytes) -> AppResult<Option<String>> {
        let output = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| Self::sdk_error("write", key, e))?;
        Ok(output.e_tag().map(str::to_string))
    }

    async fn head_object(&self, key: &str) -> AppResult<Option<ObjectEntry>> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => Ok(Some(ObjectEntry {
                key: key.to_string(),
                size: output.content_length().unwrap_or_default().max(0) as u64,
                last_modified: to_chrono(output.last_modified()),
                etag: output.e_tag().map(str::to_string),
            })),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(None),
            Err(e) => Err(Self::sdk_error("inspect", key, e)),
        }
    }

    async fn get_object(&self, key: &str) -> AppResult<Bytes> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    AppError::not_found(format!("No such key '{key}'"))
                } else {
                    Self::sdk_error("read", key, e)
                }
            })?;
        let data = output
            .body
            .collect()
            .await
            .map_err(|e| Self::sdk_error("read", key, e))?;
        Ok(data.into_bytes())
    }

    async fn list_page(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        continuation: Option<String>,
        page_size: i32,
    ) -> AppResult<ListPage> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .set_delimiter(delimiter.map(str::to_string))
            .set_continuation_token(continuation)
            .max_keys(page_size)
            .send()
            .await
            .map_err(|e| Self::sdk_error("list", prefix, e))?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|o| {
                Some(ObjectEntry {
                    key: o.key()?.to_string(),
                    size: o.size().unwrap_or_default().max(0) as u64,
                    last_modified: to_chrono(o.last_modified()),
                    etag: o.e_tag().map(str::to_string),
                })
            })
            .collect();
        let common_prefixes = output
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(str::to_string))
            .collect();

        Ok(ListPage {
            objects,
            common_prefixes,
            next_token: output.next_continuation_token().map(str::to_string),
        })
    }

    async fn copy_object(&self, source_key: &str, destination_key: &str) -> AppResult<()> {
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(copy_source(&self.bucket, source_key))
            .key(destination_key)
            .send()
            .await
            .map_err(|e| Self::sdk_error("copy", source_key, e))?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> AppResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Self::sdk_error("delete", key, e))?;
        Ok(())
    }

    async fn bucket_reachable(&self) -> AppResult<bool> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!(
                    bucket = %self.bucket,
                    error = %DisplayErrorContext(&e),
                    "Bucket health check failed"
                );
                Ok(false)
            }
        }
    }
}

/// Connects drives to their buckets through the AWS SDK.
#[derive(Debug, Default, Clone)]
pub struct S3Connector;

#[async_trait]
impl ObjectStoreConnector for S3Connector {
    async fn connect(
        &self,
        _drive: &StorageDrive,
        details: &ObjectStorageDriveDetails,
    ) -> AppResult<Arc<dyn ObjectStoreClient>> {
        let client: Arc<dyn ObjectStoreClient> =
            Arc::new(S3ObjectStoreClient::connect(details).await?);
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_source_encoding() {
        assert_eq!(copy_source("bucket1", "teamA/x.txt"), "bucket1/teamA/x.txt");
        assert_eq!(
            copy_source("bucket1", "Acme Studies/é.csv"),
            "bucket1/Acme%20Studies/%C3%A9.csv"
        );
    }
}
