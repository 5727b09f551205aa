//! Acquisition strategies and their fallback chain
//!
//! An acquisition strategy turns a playlist item into playable content,
//! either staged on the local disk or addressed by a remote URL. Strategies
//! are tried strictly in priority order and the chain stops at the first
//! success. Retry policy (count, backoff) belongs to each strategy; the
//! chain itself never retries.

mod resolver;

pub use resolver::{ResolverClient, ResolverDirectStrategy, ResolverDownloadStrategy};

use crate::error::{AcquireError, AcquisitionError, StrategyAttempt};
use crate::playlist::PlaylistItem;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Where the acquired bytes live
#[derive(Debug, Clone)]
pub enum ContentSource {
    /// A file staged in the download directory, owned by the current job
    Staged(PathBuf),
    /// A remote URL the transport can ingest directly
    Remote(String),
}

/// Result of a successful acquisition
///
/// Metadata is best effort: a missing or zero duration only widens the
/// transport timeout, it never invalidates the content.
#[derive(Debug, Clone)]
pub struct AcquiredContent {
    pub source: ContentSource,
    /// Name of the strategy that produced this content
    pub strategy: &'static str,
    pub title: Option<String>,
    pub duration_secs: Option<u64>,
}

impl AcquiredContent {
    /// Path of the staged file, if the content is local
    pub fn staged_path(&self) -> Option<&Path> {
        match &self.source {
            ContentSource::Staged(path) => Some(path),
            ContentSource::Remote(_) => None,
        }
    }

    /// Input locator handed to the transport (file path or URL)
    pub fn locator(&self) -> String {
        match &self.source {
            ContentSource::Staged(path) => path.to_string_lossy().into_owned(),
            ContentSource::Remote(url) => url.clone(),
        }
    }
}

/// Removes a partially staged file unless the acquisition completes
///
/// Staging strategies arm one of these before writing and disarm it once
/// the file is whole. An error return or a cancellation that drops the
/// in-flight future both run the drop path, so no partial file outlives
/// its acquisition.
pub(crate) struct StagingGuard {
    path: Option<PathBuf>,
}

impl StagingGuard {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    /// Keeps the file; called once the staged content is complete
    pub(crate) fn disarm(mut self) {
        self.path = None;
    }
}

impl Drop for StagingGuard {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        match std::fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "removed partial staged file"),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => {
                warn!(path = %path.display(), %error, "failed to remove partial staged file")
            }
        }
    }
}

/// A method for turning a playlist item into playable content
#[async_trait]
pub trait AcquisitionStrategy: Send + Sync {
    /// Stable name used in logs and failure diagnostics
    fn name(&self) -> &'static str;

    /// Resolves the item into content, or fails
    async fn acquire(&self, item: &PlaylistItem) -> Result<AcquiredContent, AcquireError>;
}

/// Terminal result of one run through the acquisition chain
#[derive(Debug)]
pub enum AcquisitionOutcome {
    /// The named strategy produced content
    Acquired(AcquiredContent),
    /// Every strategy failed; diagnostics carry each failure
    Exhausted(AcquisitionError),
    /// An external cancellation interrupted the chain
    Cancelled,
}

/// Runs the strategies in priority order until one succeeds
///
/// The wait on each strategy is interruptible: a cancelled token abandons
/// the in-flight acquisition and yields [`AcquisitionOutcome::Cancelled`].
pub async fn run_acquisition_chain(
    strategies: &[Arc<dyn AcquisitionStrategy>],
    item: &PlaylistItem,
    cancel: &CancellationToken,
) -> AcquisitionOutcome {
    let mut attempts = Vec::new();

    for strategy in strategies {
        if cancel.is_cancelled() {
            return AcquisitionOutcome::Cancelled;
        }

        debug!(
            strategy = strategy.name(),
            item = item.short_id(),
            "trying acquisition strategy"
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                return AcquisitionOutcome::Cancelled;
            }
            result = strategy.acquire(item) => match result {
                Ok(content) => {
                    debug!(
                        strategy = strategy.name(),
                        item = item.short_id(),
                        "acquisition succeeded"
                    );
                    return AcquisitionOutcome::Acquired(content);
                }
                Err(error) => {
                    warn!(
                        strategy = strategy.name(),
                        item = item.short_id(),
                        %error,
                        "acquisition strategy failed"
                    );
                    attempts.push(StrategyAttempt {
                        strategy: strategy.name(),
                        error,
                    });
                }
            }
        }
    }

    AcquisitionOutcome::Exhausted(AcquisitionError { attempts })
}
