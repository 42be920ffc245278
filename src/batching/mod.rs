// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Batching of telemetry buffers.
//!
//! Data moves through three stages, one instance per signal:
//!
//! ```text
//! accept ─▶ Accumulator ─(flush)─▶ queue ─▶ Dispatcher ─(split)─▶ Forwarder
//! ```
//!
//! The [`Accumulator`] merges incoming batches until `send_batch_size` units
//! or `timeout` is reached. The [`Dispatcher`] cuts each flushed buffer into
//! batches of at most `send_batch_max_size` units with [`split`] and forwards
//! them in order. [`BatchProcessor`] runs both behind a timer.

mod accumulator;
mod dispatcher;
mod processor;
mod split;
mod telemetry;

pub use accumulator::{Accumulator, FlushTrigger};
pub use dispatcher::{Dispatcher, Forwarder};
pub use processor::{
    BatchProcessor, LogsBatcher, MetricsBatcher, SignalBatchers, State, TracesBatcher,
};
pub use split::{split, Splits};
pub use telemetry::BatcherStats;
