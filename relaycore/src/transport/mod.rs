//! Transport strategies and their fallback chain
//!
//! A transport strategy moves acquired content to the fixed sink, usually by
//! driving an external encoder process. Strategies follow the same ordered
//! fallback discipline as acquisition. Every delivery runs under:
//!
//! - a cancellation token, registered with the shared relay state before the
//!   chain starts, so stop/skip can abort an in-flight delivery;
//! - an upper time bound derived from the content duration hint plus a
//!   safety margin. Exceeding it kills the encoder and counts as a
//!   [`DeliverError::Timeout`] for that strategy.
//!
//! Cancellation is not an error: a cancelled delivery is a deliberate
//! terminal state and the loop moves on.

mod ffmpeg;
mod gst;

pub use ffmpeg::FfmpegTransport;
pub use gst::GstTransport;

use crate::acquire::AcquiredContent;
use crate::error::{DeliverError, StrategyAttempt, TransportError};
use crate::sink::SinkDescriptor;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A method for moving playable content to the sink
#[async_trait]
pub trait TransportStrategy: Send + Sync {
    /// Stable name used in logs and failure diagnostics
    fn name(&self) -> &'static str;

    /// Delivers the content, observing `cancel` and the `limit` time bound
    ///
    /// A delivery interrupted by `cancel` returns `Ok(())` after shutting
    /// the encoder down; the chain translates the cancelled token into
    /// [`DeliveryOutcome::Cancelled`].
    async fn deliver(
        &self,
        content: &AcquiredContent,
        sink: &SinkDescriptor,
        cancel: CancellationToken,
        limit: Duration,
    ) -> Result<(), DeliverError>;
}

/// Terminal result of one run through the transport chain
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// The named strategy pushed the whole item to the sink
    Delivered { strategy: &'static str },
    /// Every strategy failed; diagnostics carry each failure
    Exhausted(TransportError),
    /// An external cancellation ended the delivery
    Cancelled,
}

/// Runs the strategies in priority order until one succeeds
pub async fn run_transport_chain(
    strategies: &[Arc<dyn TransportStrategy>],
    content: &AcquiredContent,
    sink: &SinkDescriptor,
    cancel: &CancellationToken,
    limit: Duration,
) -> DeliveryOutcome {
    let mut attempts = Vec::new();

    for strategy in strategies {
        if cancel.is_cancelled() {
            return DeliveryOutcome::Cancelled;
        }

        debug!(strategy = strategy.name(), "trying transport strategy");

        let result = strategy
            .deliver(content, sink, cancel.clone(), limit)
            .await;

        if cancel.is_cancelled() {
            return DeliveryOutcome::Cancelled;
        }

        match result {
            Ok(()) => {
                return DeliveryOutcome::Delivered {
                    strategy: strategy.name(),
                }
            }
            Err(error) => {
                warn!(
                    strategy = strategy.name(),
                    %error,
                    "transport strategy failed"
                );
                attempts.push(StrategyAttempt {
                    strategy: strategy.name(),
                    error,
                });
            }
        }
    }

    DeliveryOutcome::Exhausted(TransportError { attempts })
}

/// Forwards an encoder's stderr to the log at debug level
pub(crate) fn drain_stderr(command: &'static str, child: &mut Child) {
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("{command}: {line}");
            }
        });
    }
}

/// Waits for an encoder child under cancellation and time-limit control
///
/// On cancellation the child is killed and reaped within `grace`; a child
/// that cannot be reaped in time is detached to a background task so the
/// caller never blocks on it. On `limit` expiry the child is killed the same
/// way and the wait resolves to [`DeliverError::Timeout`].
pub(crate) async fn supervise_child(
    command: &'static str,
    mut child: Child,
    cancel: &CancellationToken,
    limit: Duration,
    grace: Duration,
) -> Result<(), DeliverError> {
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(DeliverError::ProcessFailed {
                command,
                status: status.code().unwrap_or(-1),
            }),
            Err(error) => Err(DeliverError::Io(error)),
        },
        _ = cancel.cancelled() => {
            debug!("{command}: delivery cancelled, stopping encoder");
            kill_and_reap(command, child, grace).await;
            Ok(())
        }
        _ = tokio::time::sleep(limit) => {
            warn!("{command}: delivery exceeded {limit:?}, stopping encoder");
            kill_and_reap(command, child, grace).await;
            Err(DeliverError::Timeout { limit })
        }
    }
}

/// Kills a child and waits for it within `grace`, detaching if it lingers
async fn kill_and_reap(command: &'static str, mut child: Child, grace: Duration) {
    if let Err(error) = child.start_kill() {
        warn!("{command}: failed to kill encoder: {error}");
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => debug!("{command}: encoder stopped with {status}"),
        Ok(Err(error)) => warn!("{command}: error reaping encoder: {error}"),
        Err(_) => {
            warn!("{command}: encoder did not stop within {grace:?}, detaching");
            tokio::spawn(async move {
                match child.wait().await {
                    Ok(status) => debug!("{command}: detached encoder ended with {status}"),
                    Err(error) => warn!("{command}: detached encoder wait failed: {error}"),
                }
            });
        }
    }
}
