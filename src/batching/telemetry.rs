// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Counters kept by each batch processor.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::accumulator::FlushTrigger;
use crate::config::TelemetryLevel;

/// Point-in-time copy of a processor's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatcherStats {
    /// Flushes caused by reaching `send_batch_size`.
    pub size_flushes: u64,
    /// Flushes caused by the timer.
    pub timeout_flushes: u64,
    /// Flushes requested by a caller.
    pub manual_flushes: u64,
    /// Final flushes on shutdown.
    pub shutdown_flushes: u64,
    /// Batches accepted by the forwarder.
    pub batches_sent: u64,
    /// Units in accepted batches.
    pub units_sent: u64,
    /// OTLP-encoded record bytes in accepted batches. Only counted at the
    /// detailed telemetry level.
    pub bytes_sent: u64,
    /// Batches the forwarder rejected.
    pub forward_failures: u64,
}

impl BatcherStats {
    /// Total flushes of non-empty buffers.
    #[must_use]
    pub fn flushes(&self) -> u64 {
        self.size_flushes + self.timeout_flushes + self.manual_flushes + self.shutdown_flushes
    }
}

#[derive(Debug, Default)]
pub(crate) struct Telemetry {
    level: TelemetryLevel,
    size_flushes: AtomicU64,
    timeout_flushes: AtomicU64,
    manual_flushes: AtomicU64,
    shutdown_flushes: AtomicU64,
    batches_sent: AtomicU64,
    units_sent: AtomicU64,
    bytes_sent: AtomicU64,
    forward_failures: AtomicU64,
}

impl Telemetry {
    pub(crate) fn new(level: TelemetryLevel) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    /// Whether batch sizes in bytes are worth computing.
    pub(crate) fn counts_bytes(&self) -> bool {
        self.level == TelemetryLevel::Detailed
    }

    pub(crate) fn record_flush(&self, trigger: FlushTrigger) {
        let counter = match trigger {
            FlushTrigger::Size => &self.size_flushes,
            FlushTrigger::Timeout => &self.timeout_flushes,
            FlushTrigger::Manual => &self.manual_flushes,
            FlushTrigger::Shutdown => &self.shutdown_flushes,
        };
        let _ = counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sent(&self, units: usize, bytes: Option<usize>) {
        let _ = self.batches_sent.fetch_add(1, Ordering::Relaxed);
        let _ = self.units_sent.fetch_add(units as u64, Ordering::Relaxed);
        if let Some(bytes) = bytes {
            let _ = self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_failure(&self) {
        let _ = self.forward_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> BatcherStats {
        BatcherStats {
            size_flushes: self.size_flushes.load(Ordering::Relaxed),
            timeout_flushes: self.timeout_flushes.load(Ordering::Relaxed),
            manual_flushes: self.manual_flushes.load(Ordering::Relaxed),
            shutdown_flushes: self.shutdown_flushes.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            units_sent: self.units_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            forward_failures: self.forward_failures.load(Ordering::Relaxed),
        }
    }
}
