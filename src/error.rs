// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors for the batch processor.

use snafu::Snafu;

use crate::pdata::SignalKind;

/// Error type returned by downstream forwarders.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result with the crate error as the default error type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by the batch processor.
///
/// Merging and splitting never fail; everything here comes from
/// configuration, the downstream forwarder, or shutdown.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// The configuration cannot be used.
    #[snafu(display("invalid batch processor configuration: {reason}"))]
    InvalidConfig {
        /// What is wrong with it.
        reason: String,
    },

    /// A single downstream forward call failed.
    #[snafu(display("failed to forward {signal} batch of {units} units: {source}"))]
    Forward {
        /// Signal of the batch.
        signal: SignalKind,
        /// Units carried by the rejected batch.
        units: usize,
        /// Error returned by the forwarder.
        source: BoxError,
    },

    /// One or more batches of a flush failed to forward.
    #[snafu(display(
        "{} of {attempted} {signal} batches failed to forward: {}",
        errors.len(),
        join_errors(errors)
    ))]
    Flush {
        /// Signal of the flush.
        signal: SignalKind,
        /// Number of batches the flush attempted to forward.
        attempted: usize,
        /// Every forward failure, in forwarding order.
        errors: Vec<Error>,
    },

    /// The processor no longer accepts data.
    #[snafu(display("{signal} batch processor is shut down"))]
    Closed {
        /// Signal of the processor.
        signal: SignalKind,
    },

    /// The dispatcher task exited while the processor was still open, so no
    /// further data can be forwarded.
    #[snafu(display("{signal} dispatcher stopped unexpectedly, data is no longer accepted"))]
    DispatcherStopped {
        /// Signal of the processor.
        signal: SignalKind,
    },

    /// The final flush did not complete before the shutdown deadline.
    #[snafu(display(
        "{signal} batch processor did not drain before its shutdown deadline \
         ({in_flight} flushes in flight)"
    ))]
    ShutdownTimeout {
        /// Signal of the processor.
        signal: SignalKind,
        /// Flushes still queued or forwarding when the deadline passed.
        in_flight: usize,
    },

    /// The dispatcher task panicked or was cancelled.
    #[snafu(display("{signal} dispatcher task failed: {source}"))]
    DispatcherTask {
        /// Signal of the processor.
        signal: SignalKind,
        /// Join failure.
        source: tokio::task::JoinError,
    },

    /// Several processors failed to shut down cleanly.
    #[snafu(display("shutdown failed: {}", join_errors(errors)))]
    Shutdown {
        /// Failure of each processor.
        errors: Vec<Error>,
    },
}

impl Error {
    /// Signal the error relates to, when there is a single one.
    #[must_use]
    pub fn signal(&self) -> Option<SignalKind> {
        match self {
            Error::Forward { signal, .. }
            | Error::Flush { signal, .. }
            | Error::Closed { signal }
            | Error::DispatcherStopped { signal }
            | Error::ShutdownTimeout { signal, .. }
            | Error::DispatcherTask { signal, .. } => Some(*signal),
            Error::InvalidConfig { .. } | Error::Shutdown { .. } => None,
        }
    }
}

fn join_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_error_lists_every_failure() {
        let errors = vec![
            Error::Forward {
                signal: SignalKind::Logs,
                units: 3,
                source: "disk full".into(),
            },
            Error::Forward {
                signal: SignalKind::Logs,
                units: 1,
                source: "connection reset".into(),
            },
        ];
        let err = Error::Flush {
            signal: SignalKind::Logs,
            attempted: 4,
            errors,
        };

        let msg = err.to_string();
        assert!(msg.starts_with("2 of 4 logs batches failed to forward"));
        assert!(msg.contains("disk full"));
        assert!(msg.contains("connection reset"));
        assert_eq!(err.signal(), Some(SignalKind::Logs));
    }
}
