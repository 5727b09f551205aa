//! Error types for the relay orchestrator
//!
//! Strategy-level failures (`AcquireError`, `DeliverError`) are absorbed by
//! their chain and never stop the relay loop. A fully exhausted chain
//! produces an aggregate error (`AcquisitionError`, `TransportError`) that
//! ends only the current job. Nothing in this module is fatal to the process.

use std::fmt;
use std::time::Duration;

/// Failure of one strategy, kept for chain-level diagnostics
#[derive(Debug)]
pub struct StrategyAttempt<E> {
    /// Name of the strategy that was tried
    pub strategy: &'static str,
    /// The error it produced
    pub error: E,
}

impl<E: fmt::Display> fmt::Display for StrategyAttempt<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.error)
    }
}

/// Errors produced by a single acquisition strategy
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error while staging content
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The resolver API answered but refused the request
    #[error("resolver rejected request: {0}")]
    ResolverRejected(String),

    /// The resolver answer carried no usable download URL
    #[error("resolver response missing download URL")]
    MissingDownloadUrl,

    /// The playlist item URL does not contain a recognizable video id
    #[error("cannot determine video id for '{0}'")]
    UnknownVideoId(String),
}

/// All acquisition strategies exhausted for one playlist item
#[derive(Debug, thiserror::Error)]
pub struct AcquisitionError {
    /// Failure of every strategy that was tried, in chain order
    pub attempts: Vec<StrategyAttempt<AcquireError>>,
}

impl fmt::Display for AcquisitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "all {} acquisition strategies exhausted",
            self.attempts.len()
        )?;
        for attempt in &self.attempts {
            write!(f, "; {}", attempt)?;
        }
        Ok(())
    }
}

/// Errors produced by a single transport strategy
#[derive(Debug, thiserror::Error)]
pub enum DeliverError {
    /// The external encoder process could not be spawned
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// IO error while driving the transport
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The encoder process ended with a non-zero status
    #[error("{command} exited with status {status}")]
    ProcessFailed { command: &'static str, status: i32 },

    /// The delivery exceeded its duration-derived upper bound
    #[error("delivery exceeded time limit of {limit:?}")]
    Timeout { limit: Duration },

    /// The strategy cannot handle this kind of content source
    #[error("strategy cannot deliver {0} content")]
    UnsupportedSource(&'static str),
}

/// All transport strategies exhausted for one piece of acquired content
#[derive(Debug, thiserror::Error)]
pub struct TransportError {
    /// Failure of every strategy that was tried, in chain order
    pub attempts: Vec<StrategyAttempt<DeliverError>>,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "all {} transport strategies exhausted",
            self.attempts.len()
        )?;
        for attempt in &self.attempts {
            write!(f, "; {}", attempt)?;
        }
        Ok(())
    }
}

/// A playlist must contain at least one item
#[derive(Debug, thiserror::Error)]
#[error("playlist must contain at least one item")]
pub struct EmptyPlaylist;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquisition_error_lists_every_attempt() {
        let err = AcquisitionError {
            attempts: vec![
                StrategyAttempt {
                    strategy: "resolver-download",
                    error: AcquireError::MissingDownloadUrl,
                },
                StrategyAttempt {
                    strategy: "resolver-direct",
                    error: AcquireError::ResolverRejected("quota".into()),
                },
            ],
        };

        let text = err.to_string();
        assert!(text.contains("all 2 acquisition strategies exhausted"));
        assert!(text.contains("resolver-download"));
        assert!(text.contains("resolver-direct"));
        assert!(text.contains("quota"));
    }

    #[test]
    fn timeout_is_a_distinct_transport_failure() {
        let err = DeliverError::Timeout {
            limit: Duration::from_secs(690),
        };
        assert!(err.to_string().contains("time limit"));
    }
}
