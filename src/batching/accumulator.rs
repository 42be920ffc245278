// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! The resident buffer of one signal and its flush thresholds.
//!
//! The accumulator never blocks or spawns; it only decides when the resident
//! buffer has to leave and hands it over. Time is passed in by the caller so
//! the decision is deterministic under a paused clock.

use std::time::Duration;

use tokio::time::Instant;

use crate::pdata::{Record, SignalBatch};

/// Why a buffer was flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlushTrigger {
    /// The resident buffer reached `send_batch_size` units.
    Size,
    /// The resident buffer waited `timeout` since the previous flush.
    Timeout,
    /// A caller asked for a flush.
    Manual,
    /// The processor is shutting down.
    Shutdown,
}

impl FlushTrigger {
    /// Lowercase name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            FlushTrigger::Size => "size",
            FlushTrigger::Timeout => "timeout",
            FlushTrigger::Manual => "manual",
            FlushTrigger::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Buffers one signal until a size or time threshold is crossed.
#[derive(Debug)]
pub struct Accumulator<R> {
    resident: SignalBatch<R>,
    send_batch_size: usize,
    timeout: Duration,
    last_flush: Instant,
}

impl<R: Record> Accumulator<R> {
    /// Creates an empty accumulator whose timer starts at `now`.
    #[must_use]
    pub fn new(send_batch_size: usize, timeout: Duration, now: Instant) -> Self {
        Self {
            resident: SignalBatch::new(),
            send_batch_size,
            timeout,
            last_flush: now,
        }
    }

    /// Merges `batch` into the resident buffer and detaches the buffer when it
    /// has reached `send_batch_size` units.
    ///
    /// Empty input leaves the buffer unchanged.
    pub fn add(&mut self, batch: SignalBatch<R>, now: Instant) -> Option<SignalBatch<R>> {
        self.merge(batch);
        if self.threshold_reached() {
            self.flush(now)
        } else {
            None
        }
    }

    /// Merges `batch` into the resident buffer without checking thresholds.
    pub fn merge(&mut self, batch: SignalBatch<R>) {
        self.resident.merge(batch);
    }

    /// True iff the resident buffer holds data and at least
    /// `send_batch_size` units.
    #[must_use]
    pub fn threshold_reached(&self) -> bool {
        !self.resident.is_empty() && self.resident.unit_count() >= self.send_batch_size
    }

    /// Detaches the resident buffer, leaving an empty one behind, and
    /// restarts the timer. Returns `None` when there was nothing to detach.
    pub fn flush(&mut self, now: Instant) -> Option<SignalBatch<R>> {
        self.last_flush = now;
        let buffer = std::mem::take(&mut self.resident);
        (!buffer.is_empty()).then_some(buffer)
    }

    /// Flushes when the timer has expired at `now`.
    ///
    /// An expired timer restarts even when the buffer is empty.
    pub fn flush_if_expired(&mut self, now: Instant) -> Option<SignalBatch<R>> {
        if self.is_expired(now) {
            self.flush(now)
        } else {
            None
        }
    }

    /// True iff `now` is at or past [`Self::deadline`].
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline()
    }

    /// When the timer fires next.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.last_flush + self.timeout
    }

    /// Units currently resident.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.resident.unit_count()
    }

    /// True iff nothing is resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resident.is_empty()
    }
}
