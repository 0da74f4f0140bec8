//! Key-phrase resolution for a single record.
//!
//! Several sources can supply the phrase badges shown for a record. They
//! are tried in a fixed order and the first that yields anything wins:
//!
//! 1. `metadata.keyPhrases` written by the backend job (cap 20).
//! 2. A text-analysis call over the record's fetched content (cap 20).
//! 3. `metadata.columns`, then `metadata.topLevelKeys` (cap 10).
//! 4. A local word-frequency heuristic over short metadata strings and
//!    `metadata.preview` (top 10).
//!
//! Whatever the source, the output holds at most [`MAX_PHRASES`] entries,
//! unique under case-insensitive comparison, keeping the first-seen
//! spelling and order.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::models::CanonicalRecord;

/// Upper bound on phrases shown for one record.
pub const MAX_PHRASES: usize = 20;

/// Cap for column / top-level-key fallbacks and the local heuristic.
pub const FALLBACK_PHRASES: usize = 10;

/// Text-analysis request size limit is 5000 bytes; stay under it.
pub const DEFAULT_MAX_INPUT_BYTES: usize = 4500;

/// Words the local heuristic never surfaces.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "over", "under", "your", "file",
    "data", "dataset", "json", "csv", "xlsx", "tsv", "txt", "meta", "metadata", "null", "true",
    "false", "none", "unknown", "name",
];

/// External key-phrase extraction (a managed text-analysis API).
#[async_trait]
pub trait KeyPhraseDetector: Send + Sync {
    /// Extract key phrases from `text` in `language_code` (e.g. `"en"`).
    async fn detect_key_phrases(&self, text: &str, language_code: &str) -> Result<Vec<String>>;
}

/// Detector used when text analysis is switched off. Always empty.
pub struct NoopDetector;

#[async_trait]
impl KeyPhraseDetector for NoopDetector {
    async fn detect_key_phrases(&self, _text: &str, _language_code: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Knobs for [`resolve_phrases`].
#[derive(Debug, Clone)]
pub struct PhraseOptions {
    /// Language when the record has no `metadata.language`.
    pub language: String,
    /// Content is cut to this many bytes before detection.
    pub max_input_bytes: usize,
}

impl Default for PhraseOptions {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
        }
    }
}

/// Resolve the phrase list for `record`.
///
/// `fetched_content` is the record's object text, when it could be loaded.
/// Detector failures are logged and treated as "no phrases"; resolution
/// then continues with the structured and heuristic fallbacks.
pub async fn resolve_phrases(
    record: &CanonicalRecord,
    fetched_content: Option<&str>,
    detector: &dyn KeyPhraseDetector,
    options: &PhraseOptions,
) -> Vec<String> {
    let from_metadata = metadata_phrases(record);
    if !from_metadata.is_empty() {
        return from_metadata;
    }

    if let Some(content) = fetched_content.filter(|c| !c.trim().is_empty()) {
        let language = record
            .meta_str("language")
            .filter(|l| !l.trim().is_empty())
            .unwrap_or(options.language.as_str());
        let input = truncate_to_bytes(content, options.max_input_bytes);

        match detector.detect_key_phrases(input, language).await {
            Ok(detected) => {
                let combined = uniq_case_insensitive(
                    from_metadata
                        .into_iter()
                        .chain(detected.into_iter().map(|p| p.trim().to_string())),
                    MAX_PHRASES,
                );
                if !combined.is_empty() {
                    return combined;
                }
            }
            Err(e) => {
                tracing::warn!("key phrase detection failed for '{}': {:#}", record.filename, e);
            }
        }
    }

    local_fallback(record)
}

/// Phrases available without any network call (steps 1, 3 and 4).
pub fn local_phrases(record: &CanonicalRecord) -> Vec<String> {
    let from_metadata = metadata_phrases(record);
    if !from_metadata.is_empty() {
        return from_metadata;
    }
    local_fallback(record)
}

fn local_fallback(record: &CanonicalRecord) -> Vec<String> {
    let structured = structured_phrases(record);
    if !structured.is_empty() {
        return structured;
    }
    local_heuristic(record)
}

/// `metadata.keyPhrases`, deduplicated and capped at [`MAX_PHRASES`].
pub fn metadata_phrases(record: &CanonicalRecord) -> Vec<String> {
    uniq_case_insensitive(string_list(record.metadata.get("keyPhrases")), MAX_PHRASES)
}

/// `metadata.columns`, else `metadata.topLevelKeys`, capped at
/// [`FALLBACK_PHRASES`].
pub fn structured_phrases(record: &CanonicalRecord) -> Vec<String> {
    for key in ["columns", "topLevelKeys"] {
        let phrases =
            uniq_case_insensitive(string_list(record.metadata.get(key)), FALLBACK_PHRASES);
        if !phrases.is_empty() {
            return phrases;
        }
    }
    Vec::new()
}

/// Most frequent meaningful words across short metadata strings.
///
/// Sources: `metadata.preview`, every string value of at most 80 chars,
/// and every string element of at most 50 chars inside array values.
/// Tokens are lowercase `[a-z0-9]+` runs longer than two characters that
/// are not stop words. Ranked by count, ties by first appearance.
pub fn local_heuristic(record: &CanonicalRecord) -> Vec<String> {
    let mut sources: Vec<&str> = Vec::new();
    if let Some(preview) = record.meta_str("preview") {
        sources.push(preview);
    }
    for value in record.metadata.values() {
        match value {
            Value::String(s) if s.chars().count() <= 80 => sources.push(s),
            Value::Array(items) => sources.extend(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|s| s.chars().count() <= 50),
            ),
            _ => {}
        }
    }

    let text = sources.join(" ").to_lowercase();
    let mut counts: Vec<(&str, usize)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for word in text
        .split(|c: char| !(c.is_ascii_lowercase() || c.is_ascii_digit()))
        .filter(|w| w.len() > 2 && !STOP_WORDS.contains(w))
    {
        match index.get(word) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(word, counts.len());
                counts.push((word, 1));
            }
        }
    }

    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .into_iter()
        .take(FALLBACK_PHRASES)
        .map(|(w, _)| w.to_string())
        .collect()
}

/// Deduplicate case-insensitively, keeping first spelling and order, and
/// stop after `cap` entries. Empty strings are dropped.
pub fn uniq_case_insensitive(items: impl IntoIterator<Item = String>, cap: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        if out.len() >= cap {
            break;
        }
        if item.is_empty() {
            continue;
        }
        if seen.insert(item.to_lowercase()) {
            out.push(item);
        }
    }
    out
}

/// Longest prefix of `text` within `max_bytes` that ends on a char boundary.
pub fn truncate_to_bytes(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Array elements as strings; scalars are stringified, anything else is
/// skipped. A non-array yields nothing.
fn string_list(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn record(metadata: Value) -> CanonicalRecord {
        CanonicalRecord {
            id: "uploads/123-x.csv".into(),
            filename: "x.csv".into(),
            metadata: metadata.as_object().cloned().unwrap_or_default(),
            ..Default::default()
        }
    }

    /// Records every call; answers with a fixed result.
    struct RecordingDetector {
        calls: Mutex<Vec<(String, String)>>,
        answer: Result<Vec<String>, String>,
    }

    impl RecordingDetector {
        fn ok(phrases: &[&str]) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                answer: Ok(phrases.iter().map(|s| s.to_string()).collect()),
            }
        }

        fn failing() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                answer: Err("service unavailable".into()),
            }
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl KeyPhraseDetector for RecordingDetector {
        async fn detect_key_phrases(&self, text: &str, language_code: &str) -> Result<Vec<String>> {
            self.calls
                .lock()
                .unwrap()
                .push((text.to_string(), language_code.to_string()));
            self.answer.clone().map_err(|e| anyhow::anyhow!(e))
        }
    }

    #[tokio::test]
    async fn metadata_phrases_dedupe_case_insensitively() {
        let rec = record(json!({"keyPhrases": ["a", "A", "b"]}));
        let detector = RecordingDetector::ok(&["ignored"]);
        let phrases =
            resolve_phrases(&rec, Some("some text"), &detector, &PhraseOptions::default()).await;
        assert_eq!(phrases, vec!["a", "b"]);
        assert!(detector.calls().is_empty());
    }

    #[tokio::test]
    async fn metadata_phrases_capped_at_twenty() {
        let many: Vec<String> = (0..30).map(|i| format!("phrase {}", i)).collect();
        let rec = record(json!({ "keyPhrases": many }));
        let phrases = resolve_phrases(&rec, None, &NoopDetector, &PhraseOptions::default()).await;
        assert_eq!(phrases.len(), MAX_PHRASES);
        assert_eq!(phrases[0], "phrase 0");
    }

    #[tokio::test]
    async fn detector_used_for_content_and_input_truncated() {
        let rec = record(json!({"language": "de", "columns": ["a"]}));
        let detector =
            RecordingDetector::ok(&[" Protein Intake ", "protein intake", "", "Sodium"]);
        let content = "é".repeat(3000); // 6000 bytes
        let options = PhraseOptions::default();

        let phrases = resolve_phrases(&rec, Some(&content), &detector, &options).await;
        assert_eq!(phrases, vec!["Protein Intake", "Sodium"]);

        let calls = detector.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "de");
        assert!(calls[0].0.len() <= DEFAULT_MAX_INPUT_BYTES);
        assert_eq!(calls[0].0.len(), 4500);
    }

    #[tokio::test]
    async fn blank_content_skips_detector() {
        let rec = record(json!({"columns": ["a", "b", "c"]}));
        let detector = RecordingDetector::ok(&["x"]);
        let phrases =
            resolve_phrases(&rec, Some("   \n"), &detector, &PhraseOptions::default()).await;
        assert_eq!(phrases, vec!["a", "b", "c"]);
        assert!(detector.calls().is_empty());
    }

    #[tokio::test]
    async fn detector_failure_falls_back() {
        let rec = record(json!({"topLevelKeys": ["calories", "Calories", "fat"]}));
        let detector = RecordingDetector::failing();
        let phrases =
            resolve_phrases(&rec, Some("text"), &detector, &PhraseOptions::default()).await;
        assert_eq!(phrases, vec!["calories", "fat"]);
        assert_eq!(detector.calls().len(), 1);
    }

    #[tokio::test]
    async fn empty_detector_result_falls_back() {
        let rec = record(json!({"preview": "vitamin vitamin zinc"}));
        let detector = RecordingDetector::ok(&[]);
        let phrases =
            resolve_phrases(&rec, Some("text"), &detector, &PhraseOptions::default()).await;
        assert_eq!(phrases[0], "vitamin");
    }

    #[tokio::test]
    async fn columns_scenario_without_content() {
        let rec = record(json!({"columns": ["a", "b", "c"]}));
        let phrases = resolve_phrases(&rec, None, &NoopDetector, &PhraseOptions::default()).await;
        assert_eq!(phrases, vec!["a", "b", "c"]);
    }

    #[test]
    fn structured_fallbacks_capped_at_ten() {
        let cols: Vec<String> = (0..15).map(|i| format!("col{}", i)).collect();
        let rec = record(json!({ "columns": cols, "topLevelKeys": ["k"] }));
        assert_eq!(structured_phrases(&rec).len(), FALLBACK_PHRASES);

        let rec = record(json!({ "columns": [], "topLevelKeys": ["k", 1] }));
        assert_eq!(structured_phrases(&rec), vec!["k", "1"]);
    }

    #[test]
    fn heuristic_ranks_by_frequency_then_first_seen() {
        let rec = record(json!({
            "preview": "Protein, sodium; protein and FIBER. The fiber dataset protein",
            "extension": "csv",
            "parser": "delimited",
            "note": "x".repeat(100),
        }));
        let phrases = local_heuristic(&rec);
        assert_eq!(phrases[0], "protein");
        assert_eq!(phrases[1], "fiber");
        assert!(phrases.contains(&"sodium".to_string()));
        assert!(phrases.contains(&"delimited".to_string()));
        assert!(!phrases.iter().any(|p| p == "the" || p == "csv" || p == "dataset"));
        assert!(!phrases.iter().any(|p| p.starts_with("xxx")));
        assert!(phrases.len() <= FALLBACK_PHRASES);
    }

    #[test]
    fn heuristic_uses_short_array_strings() {
        let rec = record(json!({"tags": ["magnesium levels", "a very long tag ".repeat(5)]}));
        let phrases = local_heuristic(&rec);
        assert_eq!(phrases, vec!["magnesium", "levels"]);
    }

    #[test]
    fn heuristic_on_empty_metadata() {
        assert!(local_heuristic(&record(json!({}))).is_empty());
    }

    #[test]
    fn output_is_always_bounded_and_unique() {
        let items = (0..100).map(|i| if i % 2 == 0 { "Dup".to_string() } else { format!("p{}", i) });
        let out = uniq_case_insensitive(items, MAX_PHRASES);
        assert!(out.len() <= MAX_PHRASES);
        let lowered: HashSet<String> = out.iter().map(|s| s.to_lowercase()).collect();
        assert_eq!(lowered.len(), out.len());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_to_bytes("abc", 10), "abc");
        assert_eq!(truncate_to_bytes("abcdef", 3), "abc");
        assert_eq!(truncate_to_bytes("aé", 2), "a");
    }

    #[test]
    fn local_phrases_prefers_metadata() {
        let rec = record(json!({"keyPhrases": ["k1"], "columns": ["c1"]}));
        assert_eq!(local_phrases(&rec), vec!["k1"]);
        let rec = record(json!({"columns": ["c1"]}));
        assert_eq!(local_phrases(&rec), vec!["c1"]);
    }
}
