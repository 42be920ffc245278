// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Splitting and forwarding of detached buffers.
//!
//! A detached buffer is cut into batches of at most `send_batch_max_size`
//! units which are handed to the downstream [`Forwarder`] one at a time, in
//! order. A failed forward does not stop the rest of the flush; failures are
//! collected into a single [`Error::Flush`].

use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::accumulator::FlushTrigger;
use super::split::Splits;
use super::telemetry::{BatcherStats, Telemetry};
use crate::error::{BoxError, Error, Result};
use crate::pdata::{Record, SignalBatch};

/// The next stage of the pipeline.
///
/// `forward` may wait; the dispatcher does not start the next batch of a
/// flush until the previous call has returned.
#[async_trait]
pub trait Forwarder<R: Record>: Send + Sync {
    /// Delivers one batch downstream.
    async fn forward(&self, batch: SignalBatch<R>) -> Result<(), BoxError>;
}

#[async_trait]
impl<R: Record, F: Forwarder<R> + ?Sized> Forwarder<R> for Arc<F> {
    async fn forward(&self, batch: SignalBatch<R>) -> Result<(), BoxError> {
        (**self).forward(batch).await
    }
}

/// Forwards into a bounded channel; a full channel holds the dispatcher back.
#[async_trait]
impl<R: Record> Forwarder<R> for mpsc::Sender<SignalBatch<R>> {
    async fn forward(&self, batch: SignalBatch<R>) -> Result<(), BoxError> {
        self.send(batch)
            .await
            .map_err(|_| format!("{} channel closed", R::SIGNAL).into())
    }
}

/// Splits detached buffers and forwards the pieces.
pub struct Dispatcher<R: Record> {
    forwarder: Arc<dyn Forwarder<R>>,
    max_batch_size: Option<NonZeroUsize>,
    telemetry: Arc<Telemetry>,
}

impl<R: Record> Dispatcher<R> {
    /// Creates a dispatcher. `None` forwards every buffer whole.
    #[must_use]
    pub fn new(forwarder: Arc<dyn Forwarder<R>>, max_batch_size: Option<NonZeroUsize>) -> Self {
        Self::with_telemetry(forwarder, max_batch_size, Arc::default())
    }

    pub(crate) fn with_telemetry(
        forwarder: Arc<dyn Forwarder<R>>,
        max_batch_size: Option<NonZeroUsize>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            forwarder,
            max_batch_size,
            telemetry,
        }
    }

    /// Counters of this dispatcher.
    #[must_use]
    pub fn stats(&self) -> BatcherStats {
        self.telemetry.snapshot()
    }

    /// Forwards `buffer`, split to the size limit, in order.
    ///
    /// Every piece is attempted even after a failure. An empty buffer is
    /// ignored.
    pub async fn dispatch(&self, buffer: SignalBatch<R>, trigger: FlushTrigger) -> Result<()> {
        if buffer.is_empty() {
            return Ok(());
        }
        self.telemetry.record_flush(trigger);

        let units = buffer.unit_count();
        let max_units = self.max_batch_size.map_or(0, NonZeroUsize::get);
        let mut attempted = 0;
        let mut errors = Vec::new();

        for batch in Splits::new(buffer, max_units) {
            attempted += 1;
            let batch_units = batch.unit_count();
            let bytes = self.telemetry.counts_bytes().then(|| batch.encoded_len());

            match self.forwarder.forward(batch).await {
                Ok(()) => self.telemetry.record_sent(batch_units, bytes),
                Err(source) => {
                    self.telemetry.record_failure();
                    warn!(
                        signal = %R::SIGNAL,
                        units = batch_units,
                        error = %source,
                        "forward failed"
                    );
                    errors.push(Error::Forward {
                        signal: R::SIGNAL,
                        units: batch_units,
                        source,
                    });
                }
            }
        }

        debug!(
            signal = %R::SIGNAL,
            %trigger,
            units,
            batches = attempted,
            failed = errors.len(),
            "flushed"
        );

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Flush {
                signal: R::SIGNAL,
                attempted,
                errors,
            })
        }
    }
}

impl<R: Record> std::fmt::Debug for Dispatcher<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("signal", &R::SIGNAL)
            .field("max_batch_size", &self.max_batch_size)
            .finish_non_exhaustive()
    }
}
