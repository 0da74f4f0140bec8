//! Construction of the concrete backends from [`Config`].
//!
//! Nothing here touches the network: credentials are resolved per request,
//! so commands that never call AWS work without any credentials set.

use std::sync::Arc;

use metastream_core::backend::{MetadataTable, ObjectStore};
use metastream_core::phrases::{KeyPhraseDetector, NoopDetector, PhraseOptions};
use metastream_core::visibility::VisibilityStore;

use crate::aws::AwsClient;
use crate::comprehend::ComprehendDetector;
use crate::config::Config;
use crate::credentials::EnvCredentials;
use crate::dynamo::DynamoTable;
use crate::local_storage::FileStorage;
use crate::s3::S3ObjectStore;

pub fn aws_client(config: &Config) -> AwsClient {
    AwsClient::new(config.aws.region.clone(), Arc::new(EnvCredentials))
}

pub fn metadata_table(config: &Config) -> Arc<dyn MetadataTable> {
    Arc::new(DynamoTable::new(aws_client(config), &config.aws))
}

pub fn object_store(config: &Config) -> Arc<dyn ObjectStore> {
    Arc::new(S3ObjectStore::new(aws_client(config), &config.aws))
}

/// Comprehend when `[phrases].enabled`, otherwise a detector that finds
/// nothing.
pub fn key_phrase_detector(config: &Config) -> Arc<dyn KeyPhraseDetector> {
    if config.phrases.enabled {
        Arc::new(
            ComprehendDetector::new(aws_client(config), &config.aws)
                .with_max_input_bytes(config.phrases.max_input_bytes),
        )
    } else {
        Arc::new(NoopDetector)
    }
}

pub fn phrase_options(config: &Config) -> PhraseOptions {
    PhraseOptions {
        language: config.phrases.language.clone(),
        max_input_bytes: config.phrases.max_input_bytes,
    }
}

pub fn visibility_store(config: &Config) -> VisibilityStore<FileStorage> {
    VisibilityStore::new(FileStorage::new(config.visibility.dir.clone()))
}
