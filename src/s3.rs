//! Amazon S3 [`ObjectStore`] adapter.
//!
//! Puts uploaded files and reads them back as text using the S3 REST API
//! with AWS Signature V4 authentication. Custom endpoints (MinIO,
//! LocalStack) are addressed path-style; AWS itself virtual-hosted.
//!
//! # Object metadata
//!
//! Every put carries two user-metadata headers the extraction pipeline
//! reads back:
//!
//! | Header | Value |
//! |--------|-------|
//! | `x-amz-meta-originalname` | the file name as given by the user (URI-encoded) |
//! | `x-amz-meta-uploadtime` | RFC 3339 time of the put |

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use metastream_core::backend::{
    is_texty, ObjectStore, ProgressCallback, TextObject, UploadProgress,
};
use metastream_core::normalize::storage_key;

use crate::aws::{AwsClient, SignedCall};
use crate::config::AwsConfig;
use crate::sigv4::{encode_key_path, uri_encode, Endpoint};

pub struct S3ObjectStore {
    client: AwsClient,
    bucket: String,
    endpoint: Endpoint,
    path_style: bool,
}

impl S3ObjectStore {
    pub fn new(client: AwsClient, config: &AwsConfig) -> Self {
        let endpoint = Endpoint::resolve(
            config.s3_endpoint_url.as_deref(),
            format!("{}.s3.{}.amazonaws.com", config.bucket, config.region),
        );
        Self {
            client,
            bucket: config.bucket.clone(),
            endpoint,
            path_style: config.s3_endpoint_url.is_some(),
        }
    }

    /// Encoded request path for an object key.
    fn object_path(&self, key: &str) -> String {
        if self.path_style {
            format!("/{}/{}", uri_encode(&self.bucket), encode_key_path(key))
        } else {
            format!("/{}", encode_key_path(key))
        }
    }
}

/// The user's file name: the last key segment without the `<millis>-` stamp.
fn original_name(key: &str) -> &str {
    let name = key.rsplit('/').next().unwrap_or(key);
    match name.split_once('-') {
        Some((stamp, rest))
            if !stamp.is_empty() && !rest.is_empty() && stamp.bytes().all(|b| b.is_ascii_digit()) =>
        {
            rest
        }
        _ => name,
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<String> {
        let total = body.len() as u64;
        if let Some(report) = progress {
            report(UploadProgress { loaded: 0, total });
        }

        let path = self.object_path(key);
        let headers = vec![
            ("content-type".to_string(), content_type.to_string()),
            (
                "x-amz-meta-originalname".to_string(),
                uri_encode(original_name(key)),
            ),
            (
                "x-amz-meta-uploadtime".to_string(),
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
        ];

        let resp = self
            .client
            .send_signed(SignedCall {
                service: "s3",
                endpoint: &self.endpoint,
                method: reqwest::Method::PUT,
                path: &path,
                query: &[],
                headers: &headers,
                body,
                content_sha256_header: true,
            })
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "S3 PutObject failed (HTTP {}) for s3://{}/{}: {}",
                status,
                self.bucket,
                key,
                body.chars().take(300).collect::<String>()
            );
        }

        if let Some(report) = progress {
            report(UploadProgress {
                loaded: total,
                total,
            });
        }
        tracing::debug!("put s3://{}/{} ({} bytes)", self.bucket, key, total);
        Ok(key.to_string())
    }

    async fn get_object_text(&self, key: &str) -> Result<Option<TextObject>> {
        let key = storage_key(key);
        if key.is_empty() {
            bail!("Missing S3 key");
        }

        let path = self.object_path(&key);
        let resp = self
            .client
            .send_signed(SignedCall {
                service: "s3",
                endpoint: &self.endpoint,
                method: reqwest::Method::GET,
                path: &path,
                query: &[],
                headers: &[],
                body: Vec::new(),
                content_sha256_header: true,
            })
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "S3 GET failed with status {}. {}",
                status,
                body.chars().take(300).collect::<String>()
            );
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !is_texty(content_type.as_deref()) {
            return Ok(None);
        }

        let text = resp.text().await?;
        Ok(Some(TextObject { text, content_type }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticCredentials;
    use std::sync::Arc;

    fn config(endpoint: Option<&str>) -> AwsConfig {
        AwsConfig {
            region: "us-east-1".into(),
            bucket: "my-bucket".into(),
            table: "t".into(),
            s3_endpoint_url: endpoint.map(str::to_string),
            dynamodb_endpoint_url: None,
            comprehend_endpoint_url: None,
        }
    }

    fn store(endpoint: Option<&str>) -> S3ObjectStore {
        let client = AwsClient::new("us-east-1", Arc::new(StaticCredentials(None)));
        S3ObjectStore::new(client, &config(endpoint))
    }

    #[test]
    fn virtual_hosted_on_aws() {
        let s = store(None);
        assert_eq!(s.endpoint.host, "my-bucket.s3.us-east-1.amazonaws.com");
        assert_eq!(s.object_path("uploads/1-a b.csv"), "/uploads/1-a%20b.csv");
    }

    #[test]
    fn path_style_on_custom_endpoint() {
        let s = store(Some("http://localhost:9000"));
        assert_eq!(s.endpoint.host, "localhost:9000");
        assert_eq!(s.object_path("uploads/a.csv"), "/my-bucket/uploads/a.csv");
    }

    #[test]
    fn original_name_drops_stamp() {
        assert_eq!(original_name("uploads/1700000000000-a-b.csv"), "a-b.csv");
        assert_eq!(original_name("uploads/v2-a.csv"), "v2-a.csv");
        assert_eq!(original_name("a.csv"), "a.csv");
    }

    #[tokio::test]
    async fn unauthenticated_get_fails_before_any_request() {
        let err = store(None).get_object_text("uploads/a.csv").await.unwrap_err();
        assert_eq!(err.to_string(), "Not authenticated");
    }
}
