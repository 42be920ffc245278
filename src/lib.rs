// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Size- and time-bounded batching of OpenTelemetry metrics, traces and logs.
//!
//! Incoming OTLP data is converted into a [`SignalBatch`], accumulated per
//! signal, and forwarded downstream in batches whose unit count (data points,
//! spans or log records) never exceeds the configured maximum.

#![warn(missing_docs)]

pub mod batching;
pub mod config;
pub mod error;
pub mod pdata;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use batching::{split, BatchProcessor, Forwarder, SignalBatchers};
pub use config::{Config, TelemetryLevel};
pub use error::{Error, Result};
pub use pdata::{Record, SignalBatch, SignalKind};
