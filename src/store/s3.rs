//! S3 backend.
//!
//! The orchestrator is synchronous, so the store owns a small tokio runtime
//! and blocks on each request.

use super::{FileStore, dir_prefix};
use crate::error::{RunError, StoreError};
use crate::types::StoreObject;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use time::OffsetDateTime;
use tokio::runtime::Runtime;
use tracing::{debug, trace};

pub struct S3Store {
    bucket: String,
    client: Client,
    rt: Runtime,
}

async fn create_client(region: Option<&str>, endpoint: Option<&str>) -> Client {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());

    if let Some(region) = region {
        loader = loader.region(Region::new(region.to_string()));
    }
    if let Some(endpoint) = endpoint {
        loader = loader.endpoint_url(endpoint);
    }

    let shared = loader.load().await;
    let builder = aws_sdk_s3::config::Builder::from(&shared);

    // path-style cho endpoint tự host (MinIO, LocalStack)
    let conf = if endpoint.is_some() {
        builder.force_path_style(true).build()
    } else {
        builder.build()
    };
    Client::from_conf(conf)
}

fn to_offset(t: &aws_sdk_s3::primitives::DateTime) -> Option<OffsetDateTime> {
    let secs = OffsetDateTime::from_unix_timestamp(t.secs()).ok()?;
    Some(secs + time::Duration::nanoseconds(i64::from(t.subsec_nanos())))
}

impl S3Store {
    pub fn connect(
        bucket: &str,
        region: Option<&str>,
        endpoint: Option<&str>,
    ) -> Result<Self, RunError> {
        if bucket.trim().is_empty() {
            return Err(RunError::Setup("S3 bucket name is empty".to_string()));
        }

        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| RunError::Setup(format!("tokio runtime: {e}")))?;

        let client = rt.block_on(create_client(region, endpoint));
        debug!(bucket, ?region, ?endpoint, "S3 client ready");

        Ok(Self {
            bucket: bucket.to_string(),
            client,
            rt,
        })
    }
}

impl FileStore for S3Store {
    fn describe(&self) -> String {
        format!("s3://{}", self.bucket)
    }

    fn list(&self, prefix: &str) -> Result<Vec<StoreObject>, StoreError> {
        let prefix = dir_prefix(prefix);
        self.rt.block_on(async {
            let mut out = Vec::new();
            let mut token: Option<String> = None;

            loop {
                let mut req = self.client.list_objects_v2().bucket(&self.bucket);
                if !prefix.is_empty() {
                    req = req.prefix(&prefix);
                }
                if let Some(t) = &token {
                    req = req.continuation_token(t);
                }

                let resp = req.send().await.map_err(|e| {
                    StoreError::Remote(format!(
                        "list s3://{}/{}: {}",
                        self.bucket,
                        prefix,
                        aws_sdk_s3::error::DisplayErrorContext(&e)
                    ))
                })?;

                for obj in resp.contents() {
                    let Some(key) = obj.key() else { continue };
                    // directory markers
                    if key.is_empty() || key.ends_with('/') {
                        continue;
                    }
                    let Some(last_modified) = obj.last_modified().and_then(to_offset) else {
                        debug!(key, "list: object without last-modified, skipped");
                        continue;
                    };
                    out.push(StoreObject {
                        key: key.to_string(),
                        size: obj.size().unwrap_or(0).max(0) as u64,
                        last_modified,
                    });
                }

                match (resp.is_truncated(), resp.next_continuation_token()) {
                    (Some(true), Some(next)) => token = Some(next.to_string()),
                    _ => break,
                }
            }

            Ok(out)
        })
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.rt.block_on(async {
            let resp = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| {
                    if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                        StoreError::NotFound(key.to_string())
                    } else {
                        StoreError::Remote(format!(
                            "get s3://{}/{}: {}",
                            self.bucket,
                            key,
                            aws_sdk_s3::error::DisplayErrorContext(&e)
                        ))
                    }
                })?;

            let data = resp.body.collect().await.map_err(|e| {
                StoreError::Remote(format!("read body s3://{}/{}: {e}", self.bucket, key))
            })?;
            let bytes = data.into_bytes().to_vec();
            trace!(key, size = bytes.len(), "downloaded object");
            Ok(bytes)
        })
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let content_type = if key.ends_with(".json") {
            "application/json"
        } else {
            "application/octet-stream"
        };
        self.rt.block_on(async {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .content_type(content_type)
                .body(ByteStream::from(bytes.to_vec()))
                .send()
                .await
                .map_err(|e| {
                    StoreError::Remote(format!(
                        "put s3://{}/{}: {}",
                        self.bucket,
                        key,
                        aws_sdk_s3::error::DisplayErrorContext(&e)
                    ))
                })?;
            Ok(())
        })
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.rt.block_on(async {
            match self
                .client
                .head_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
            {
                Ok(_) => Ok(true),
                Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
                Err(e) => Err(StoreError::Remote(format!(
                    "head s3://{}/{}: {}",
                    self.bucket,
                    key,
                    aws_sdk_s3::error::DisplayErrorContext(&e)
                ))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_bucket_rejected() {
        assert!(matches!(
            S3Store::connect("  ", None, None),
            Err(RunError::Setup(_))
        ));
    }

    #[test]
    fn test_to_offset() {
        let t = aws_sdk_s3::primitives::DateTime::from_secs_and_nanos(1_700_000_000, 500);
        let got = to_offset(&t).unwrap();
        assert_eq!(got.unix_timestamp(), 1_700_000_000);
        assert_eq!(got.nanosecond(), 500);
    }
}
