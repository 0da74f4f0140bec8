//! Amazon Comprehend [`KeyPhraseDetector`] adapter.

use anyhow::Result;
use async_trait::async_trait;
use metastream_core::phrases::{
    truncate_to_bytes, uniq_case_insensitive, KeyPhraseDetector, DEFAULT_MAX_INPUT_BYTES,
};
use serde_json::{json, Value};

use crate::aws::{AwsClient, JsonTarget};
use crate::config::AwsConfig;
use crate::sigv4::Endpoint;

pub struct ComprehendDetector {
    client: AwsClient,
    endpoint: Endpoint,
    max_input_bytes: usize,
}

impl ComprehendDetector {
    pub fn new(client: AwsClient, config: &AwsConfig) -> Self {
        let endpoint = Endpoint::resolve(
            config.comprehend_endpoint_url.as_deref(),
            format!("comprehend.{}.amazonaws.com", config.region),
        );
        Self {
            client,
            endpoint,
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
        }
    }

    pub fn with_max_input_bytes(mut self, max_input_bytes: usize) -> Self {
        self.max_input_bytes = max_input_bytes;
        self
    }
}

/// Trimmed phrase texts, case-insensitively unique, in response order.
fn parse_key_phrases(resp: &Value) -> Vec<String> {
    let texts = resp
        .get("KeyPhrases")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|kp| kp.get("Text").and_then(Value::as_str))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    uniq_case_insensitive(texts, usize::MAX)
}

#[async_trait]
impl KeyPhraseDetector for ComprehendDetector {
    async fn detect_key_phrases(&self, text: &str, language_code: &str) -> Result<Vec<String>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let input = truncate_to_bytes(text, self.max_input_bytes);
        let lang = if language_code.trim().is_empty() {
            "en"
        } else {
            language_code
        };

        let resp = self
            .client
            .call_json(
                &self.endpoint,
                &JsonTarget {
                    service: "comprehend",
                    target: "Comprehend_20171127.DetectKeyPhrases",
                    content_type: "application/x-amz-json-1.1",
                },
                &json!({ "Text": input, "LanguageCode": lang }),
            )
            .await?;
        Ok(parse_key_phrases(&resp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticCredentials;
    use std::sync::Arc;

    #[test]
    fn phrases_are_trimmed_and_unique() {
        let resp = json!({
            "KeyPhrases": [
                {"Text": " Vitamin C ", "Score": 0.99},
                {"Text": "vitamin c", "Score": 0.98},
                {"Text": "", "Score": 0.5},
                {"Score": 0.4},
                {"Text": "iron", "Score": 0.9}
            ]
        });
        assert_eq!(parse_key_phrases(&resp), vec!["Vitamin C", "iron"]);
        assert!(parse_key_phrases(&json!({})).is_empty());
    }

    #[tokio::test]
    async fn blank_text_makes_no_call() {
        let config = AwsConfig {
            region: "us-east-1".into(),
            bucket: "b".into(),
            table: "t".into(),
            s3_endpoint_url: None,
            dynamodb_endpoint_url: None,
            comprehend_endpoint_url: None,
        };
        let client = AwsClient::new("us-east-1", Arc::new(StaticCredentials(None)));
        let detector = ComprehendDetector::new(client, &config);
        // No credentials: a real call would fail.
        assert!(detector.detect_key_phrases("  \n", "en").await.unwrap().is_empty());
        assert!(detector.detect_key_phrases("text", "en").await.is_err());
    }
}
