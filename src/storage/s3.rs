/// S3-compatible object store backend.
///
/// Works against AWS S3 or any S3-compatible gateway via an explicit
/// endpoint. Objects are keyed inside a single bucket; the key set path
/// prefix comes from the writer or reader above. S3 `CopyObject` completes
/// within the request, so `copy_status` observes a terminal state on the
/// first poll.
use async_trait::async_trait;

use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

use crate::error::{Result, StrataError};
use crate::storage::{CopyStatus, ObjectStore};

/// Configuration for an S3-compatible endpoint.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    pub region: String,
}

pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(config: &S3Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "keystrata",
        );

        let s3_config = S3ConfigBuilder::new()
            .endpoint_url(&config.endpoint)
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: S3Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn ensure_container(&self) -> Result<()> {
        match self.client.create_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let already_exists = e.as_service_error().is_some_and(|service| {
                    service.is_bucket_already_owned_by_you() || service.is_bucket_already_exists()
                });
                if already_exists {
                    Ok(())
                } else {
                    Err(StrataError::Storage(e.to_string()))
                }
            }
        }
    }

    async fn put(&self, name: &str, data: &[u8]) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(name)
            .body(ByteStream::from(data.to_vec()))
            .content_length(data.len() as i64)
            .send()
            .await
            .map_err(|e| StrataError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Vec<u8>> {
        let resp = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                if e.as_service_error().is_some_and(|s| s.is_no_such_key()) {
                    return Err(StrataError::NotFound(name.to_string()));
                }
                return Err(StrataError::Storage(e.to_string()));
            }
        };

        let bytes = resp
            .body
            .collect()
            .await
            .map_err(|e| StrataError::Storage(e.to_string()))?;
        Ok(bytes.into_bytes().to_vec())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| StrataError::Storage(e.to_string()))?;

            for object in resp.contents() {
                if let Some(key) = object.key() {
                    names.push(key.to_string());
                }
            }

            match resp.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }
        Ok(names)
    }

    async fn begin_copy(&self, src: &str, dst: &str) -> Result<()> {
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(format!("{}/{}", self.bucket, src))
            .key(dst)
            .send()
            .await
            .map_err(|e| StrataError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn copy_status(&self, dst: &str) -> Result<CopyStatus> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(dst)
            .send()
            .await
        {
            Ok(_) => Ok(CopyStatus::Success),
            Err(e) => {
                if e.as_service_error().is_some_and(|s| s.is_not_found()) {
                    // CopyObject is synchronous; an absent destination means
                    // the copy did not take effect
                    Ok(CopyStatus::Failed(format!("{dst} missing after copy")))
                } else {
                    Err(StrataError::Storage(e.to_string()))
                }
            }
        }
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
            .map_err(|e| StrataError::Storage(e.to_string()))?;
        Ok(())
    }
}
