//! Signed HTTP calls to AWS services.
//!
//! [`AwsClient`] bundles a `reqwest` client, the region and a
//! [`CredentialsProvider`]. Each call resolves credentials (with one
//! forced refresh), signs with SigV4 and sends. The JSON protocol used by
//! DynamoDB and Comprehend (`POST /` with an `X-Amz-Target` header) is
//! handled by [`AwsClient::call_json`].

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde_json::Value;

use crate::credentials::{resolve_credentials, CredentialsProvider};
use crate::sigv4::{self, Endpoint, SigningRequest, SigningScope};

#[derive(Clone)]
pub struct AwsClient {
    http: reqwest::Client,
    region: String,
    credentials: Arc<dyn CredentialsProvider>,
}

/// One HTTP request to sign and send. `path` must already be URI-encoded.
pub struct SignedCall<'a> {
    pub service: &'a str,
    pub endpoint: &'a Endpoint,
    pub method: reqwest::Method,
    pub path: &'a str,
    pub query: &'a [(String, String)],
    pub headers: &'a [(String, String)],
    pub body: Vec<u8>,
    pub content_sha256_header: bool,
}

/// A JSON-protocol operation.
pub struct JsonTarget<'a> {
    /// Signing name, e.g. `dynamodb`.
    pub service: &'a str,
    /// Value of `X-Amz-Target`, e.g. `DynamoDB_20120810.Scan`.
    pub target: &'a str,
    /// `application/x-amz-json-1.0` or `1.1`, per service.
    pub content_type: &'a str,
}

impl AwsClient {
    pub fn new(region: impl Into<String>, credentials: Arc<dyn CredentialsProvider>) -> Self {
        Self {
            http: reqwest::Client::new(),
            region: region.into(),
            credentials,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Sign and send one request.
    pub async fn send_signed(&self, call: SignedCall<'_>) -> Result<reqwest::Response> {
        let creds = resolve_credentials(self.credentials.as_ref()).await?;
        let signed = sigv4::sign(
            &SigningRequest {
                method: call.method.as_str(),
                host: &call.endpoint.host,
                path: call.path,
                query: call.query,
                headers: call.headers,
                payload: &call.body,
                content_sha256_header: call.content_sha256_header,
            },
            &SigningScope {
                credentials: &creds,
                region: &self.region,
                service: call.service,
            },
            Utc::now(),
        );

        let url = call
            .endpoint
            .url(call.path, &sigv4::canonical_query_string(call.query));
        let mut req_builder = self.http.request(call.method, &url);
        for (name, value) in &signed {
            req_builder = req_builder.header(name.as_str(), value.as_str());
        }
        req_builder
            .body(call.body)
            .send()
            .await
            .with_context(|| format!("Failed to reach {} at {}", call.service, call.endpoint.host))
    }

    /// Call a JSON-protocol operation and return the decoded response body.
    pub async fn call_json(
        &self,
        endpoint: &Endpoint,
        target: &JsonTarget<'_>,
        payload: &Value,
    ) -> Result<Value> {
        let body = serde_json::to_vec(payload)?;
        let headers = vec![
            ("content-type".to_string(), target.content_type.to_string()),
            ("x-amz-target".to_string(), target.target.to_string()),
        ];
        let resp = self
            .send_signed(SignedCall {
                service: target.service,
                endpoint,
                method: reqwest::Method::POST,
                path: "/",
                query: &[],
                headers: &headers,
                body,
                content_sha256_header: false,
            })
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "{} failed (HTTP {}): {}",
                target.target,
                status,
                body.chars().take(500).collect::<String>()
            );
        }

        resp.json::<Value>()
            .await
            .with_context(|| format!("{} returned invalid JSON", target.target))
    }
}
