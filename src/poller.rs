//! Upload-completion poller.
//!
//! After a file lands in object storage, an external job writes its
//! metadata record some seconds later. The poller scans one page of the
//! table per attempt until a record matching the upload shows up, the
//! attempt budget runs out, or the caller cancels.
//!
//! # States
//!
//! ```text
//! Idle ──▶ Polling{1} ──▶ Polling{2} ──▶ … ──▶ Polling{max}
//!              │               │                    │
//!              ▼               ▼                    ▼
//!            Found           Found          Found | TimedOut
//! ```
//!
//! Any non-terminal state moves to `Cancelled` when the token fires.
//! Cancellation is checked before each attempt and during the delay
//! between attempts. No delay follows the last attempt, so the default
//! budget (10 attempts, 3 s apart) gives up after about 27 s.
//!
//! Scan failures are logged, count as an attempt, and polling continues.
//!
//! # Concurrent uploads
//!
//! [`UploadWatcher`] keeps one poll per upload key. Watching a key that
//! is already being polled cancels only that earlier poll.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use metastream_core::backend::MetadataTable;
use metastream_core::mapper::map_record;
use metastream_core::normalize::{equalish, normalize};
use metastream_core::CanonicalRecord;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::PollSettings;

/// Attempt budget for one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    pub max_attempts: u32,
    pub interval: Duration,
    pub page_size: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval: Duration::from_millis(3000),
            page_size: 200,
        }
    }
}

impl From<&PollSettings> for PollConfig {
    fn from(settings: &PollSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            interval: settings.interval(),
            page_size: settings.page_size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling { attempt: u32 },
    Found,
    TimedOut,
    Cancelled,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PollState::Found | PollState::TimedOut | PollState::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Found(CanonicalRecord),
    TimedOut { attempts: u32 },
    Cancelled,
}

/// What was uploaded: the storage key and the user's file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub upload_key: String,
    pub file_name: String,
}

impl UploadTarget {
    pub fn new(upload_key: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            upload_key: upload_key.into(),
            file_name: file_name.into(),
        }
    }
}

/// User-facing events from a poll.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Polling {
        upload_key: String,
        attempt: u32,
        max_attempts: u32,
    },
    Found {
        upload_key: String,
        record: CanonicalRecord,
    },
    TimedOut {
        upload_key: String,
        attempts: u32,
    },
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Notifier that logs through `tracing`.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification {
            Notification::Polling {
                upload_key,
                attempt,
                max_attempts,
            } => tracing::debug!("polling for {} ({}/{})", upload_key, attempt, max_attempts),
            Notification::Found { upload_key, record } => tracing::info!(
                "processing complete for {}: record {} is ready",
                upload_key,
                record.id
            ),
            Notification::TimedOut {
                upload_key,
                attempts,
            } => tracing::info!(
                "no metadata for {} after {} attempts; it may still appear later",
                upload_key,
                attempts
            ),
        }
    }
}

/// Whether `record` is the metadata for `target`.
///
/// Compares the record's id, metadata key and filename (normalized)
/// against the normalized upload key and file name with
/// [`equalish`]. Unresolvable records never match.
pub fn record_matches(record: &CanonicalRecord, target: &UploadTarget) -> bool {
    if !record.is_resolvable() {
        return false;
    }
    let wanted = [
        normalize(Some(&target.upload_key)),
        normalize(Some(&target.file_name)),
    ];
    let candidates = [
        normalize(Some(&record.id)),
        normalize(record.metadata_key()),
        normalize(Some(&record.filename)),
    ];
    candidates
        .iter()
        .any(|c| wanted.iter().any(|w| equalish(c, w)))
}

/// Poll `table` until a record for `target` appears.
///
/// `state` receives every transition.
pub async fn poll_for_upload(
    table: &dyn MetadataTable,
    target: &UploadTarget,
    config: &PollConfig,
    notifier: &dyn Notifier,
    cancel: &CancellationToken,
    state: &watch::Sender<PollState>,
) -> PollOutcome {
    let set = |s: PollState| {
        state.send_replace(s);
    };
    set(PollState::Idle);

    for attempt in 1..=config.max_attempts {
        if cancel.is_cancelled() {
            set(PollState::Cancelled);
            return PollOutcome::Cancelled;
        }

        set(PollState::Polling { attempt });
        notifier.notify(Notification::Polling {
            upload_key: target.upload_key.clone(),
            attempt,
            max_attempts: config.max_attempts,
        });

        let scan = tokio::select! {
            _ = cancel.cancelled() => {
                set(PollState::Cancelled);
                return PollOutcome::Cancelled;
            }
            scan = table.scan_page(config.page_size, None) => scan,
        };

        match scan {
            Ok(page) => {
                let found = page
                    .records
                    .iter()
                    .map(map_record)
                    .find(|r| record_matches(r, target));
                if let Some(record) = found {
                    set(PollState::Found);
                    notifier.notify(Notification::Found {
                        upload_key: target.upload_key.clone(),
                        record: record.clone(),
                    });
                    return PollOutcome::Found(record);
                }
            }
            Err(e) => {
                tracing::warn!(
                    "poll attempt {}/{} for {} failed: {:#}",
                    attempt,
                    config.max_attempts,
                    target.upload_key,
                    e
                );
            }
        }

        if attempt < config.max_attempts {
            tokio::select! {
                _ = cancel.cancelled() => {
                    set(PollState::Cancelled);
                    return PollOutcome::Cancelled;
                }
                _ = tokio::time::sleep(config.interval) => {}
            }
        }
    }

    set(PollState::TimedOut);
    notifier.notify(Notification::TimedOut {
        upload_key: target.upload_key.clone(),
        attempts: config.max_attempts,
    });
    PollOutcome::TimedOut {
        attempts: config.max_attempts,
    }
}

struct ActivePoll {
    cancel: CancellationToken,
    state: watch::Receiver<PollState>,
    generation: u64,
}

#[derive(Default)]
struct Registry {
    polls: HashMap<String, ActivePoll>,
    next_generation: u64,
}

/// Registry of in-flight polls, keyed by upload key.
pub struct UploadWatcher {
    table: Arc<dyn MetadataTable>,
    notifier: Arc<dyn Notifier>,
    config: PollConfig,
    registry: Arc<Mutex<Registry>>,
    root: CancellationToken,
}

impl UploadWatcher {
    pub fn new(
        table: Arc<dyn MetadataTable>,
        notifier: Arc<dyn Notifier>,
        config: PollConfig,
    ) -> Self {
        Self {
            table,
            notifier,
            config,
            registry: Arc::new(Mutex::new(Registry::default())),
            root: CancellationToken::new(),
        }
    }

    /// Start polling for `target`, cancelling an earlier poll for the
    /// same upload key. Must be called inside a tokio runtime.
    pub fn watch(&self, target: UploadTarget) -> JoinHandle<PollOutcome> {
        let cancel = self.root.child_token();
        let (state_tx, state_rx) = watch::channel(PollState::Idle);
        let key = target.upload_key.clone();

        let generation = {
            let mut registry = lock(&self.registry);
            let generation = registry.next_generation;
            registry.next_generation += 1;
            if let Some(previous) = registry.polls.insert(
                key.clone(),
                ActivePoll {
                    cancel: cancel.clone(),
                    state: state_rx,
                    generation,
                },
            ) {
                tracing::debug!("re-watching {}, cancelling the earlier poll", key);
                previous.cancel.cancel();
            }
            generation
        };

        let table = Arc::clone(&self.table);
        let notifier = Arc::clone(&self.notifier);
        let config = self.config.clone();
        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            let outcome = poll_for_upload(
                table.as_ref(),
                &target,
                &config,
                notifier.as_ref(),
                &cancel,
                &state_tx,
            )
            .await;
            let mut registry = lock(&registry);
            if registry
                .polls
                .get(&key)
                .is_some_and(|p| p.generation == generation)
            {
                registry.polls.remove(&key);
            }
            outcome
        })
    }

    /// Current state of the poll for `upload_key`, if one is in flight.
    pub fn state(&self, upload_key: &str) -> Option<PollState> {
        lock(&self.registry)
            .polls
            .get(upload_key)
            .map(|p| *p.state.borrow())
    }

    /// Cancel the poll for `upload_key`. Returns whether one was running.
    pub fn cancel(&self, upload_key: &str) -> bool {
        match lock(&self.registry).polls.remove(upload_key) {
            Some(poll) => {
                poll.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Upload keys with a poll in flight.
    pub fn active(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.registry).polls.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Cancel every poll.
    pub fn shutdown(&self) {
        self.root.cancel();
        lock(&self.registry).polls.clear();
    }
}

impl Drop for UploadWatcher {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

fn lock(registry: &Mutex<Registry>) -> std::sync::MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
