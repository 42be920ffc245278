// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Running batch processors.
//!
//! A [`BatchProcessor`] owns one signal's resident buffer and two tasks:
//!
//! - a timer task that flushes the buffer once it has waited `timeout`;
//! - a dispatcher task that splits and forwards detached buffers, one flush
//!   at a time.
//!
//! Detached buffers travel from the resident buffer to the dispatcher through
//! a bounded queue. The decision to flush and the enqueue happen under the
//! same lock, so flushes reach the forwarder in the order they were taken. The
//! lock is never held across an await; when the queue is full the caller
//! waits for a slot first and takes the buffer afterwards.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use opentelemetry_proto::tonic::logs::v1::LogRecord;
use opentelemetry_proto::tonic::trace::v1::Span;
use serde::Serialize;
use snafu::{ensure, ResultExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use super::accumulator::{Accumulator, FlushTrigger};
use super::dispatcher::{Dispatcher, Forwarder};
use super::telemetry::{BatcherStats, Telemetry};
use crate::config::Config;
use crate::error::{self, Error, Result};
use crate::pdata::{Metric, Record, SignalBatch};

/// Lifecycle of a batch processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    /// Nothing buffered, nothing being forwarded.
    Idle,
    /// Data is buffered and waiting for a threshold.
    Accumulating,
    /// At least one detached buffer is queued or being forwarded.
    Flushing,
    /// Shut down, or the dispatcher has stopped; no data is accepted.
    Closed,
}

/// Counts a detached buffer as in flight until it is dropped.
///
/// Travels with the buffer, so a flush stops counting whether it is
/// forwarded, discarded with the queue, or unwound by a panicking forwarder.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn new(count: &Arc<AtomicUsize>) -> Self {
        let _ = count.fetch_add(1, Ordering::SeqCst);
        Self(count.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let _ = self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A detached buffer on its way to the dispatcher.
struct Pending<R> {
    buffer: SignalBatch<R>,
    trigger: FlushTrigger,
    /// Receives the outcome instead of the error channel.
    done: Option<oneshot::Sender<Result<()>>>,
    in_flight: InFlight,
}

struct Resident<R> {
    accumulator: Accumulator<R>,
    /// `None` once shutdown has started or the dispatcher is gone.
    queue: Option<mpsc::Sender<Pending<R>>>,
    dispatcher_stopped: bool,
}

impl<R: Record> Resident<R> {
    /// Fails when the processor is shut down or its dispatcher has exited.
    fn check_open(&mut self) -> Result<()> {
        ensure!(
            !self.dispatcher_stopped,
            error::DispatcherStoppedSnafu { signal: R::SIGNAL }
        );
        let Some(queue) = self.queue.as_ref() else {
            return error::ClosedSnafu { signal: R::SIGNAL }.fail();
        };
        if queue.is_closed() {
            return self.stop_dispatching();
        }
        Ok(())
    }

    /// Refuses all further data after the dispatcher exited on its own.
    fn stop_dispatching(&mut self) -> Result<()> {
        self.queue = None;
        self.dispatcher_stopped = true;
        error!(
            signal = %R::SIGNAL,
            resident_units = self.accumulator.unit_count(),
            "dispatcher stopped, refusing further data"
        );
        error::DispatcherStoppedSnafu { signal: R::SIGNAL }.fail()
    }
}

struct Shared<R> {
    resident: Mutex<Resident<R>>,
    in_flight: Arc<AtomicUsize>,
    telemetry: Arc<Telemetry>,
}

impl<R: Record> Shared<R> {
    fn lock(&self) -> MutexGuard<'_, Resident<R>> {
        self.resident.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Detaches the resident buffer if `trigger` still applies to it.
    fn take_pending(
        &self,
        accumulator: &mut Accumulator<R>,
        trigger: FlushTrigger,
        done: Option<oneshot::Sender<Result<()>>>,
    ) -> Option<Pending<R>> {
        let now = Instant::now();
        let buffer = match trigger {
            FlushTrigger::Size if !accumulator.threshold_reached() => None,
            FlushTrigger::Timeout => accumulator.flush_if_expired(now),
            _ => accumulator.flush(now),
        }?;
        Some(Pending {
            buffer,
            trigger,
            done,
            in_flight: InFlight::new(&self.in_flight),
        })
    }

    /// Hands the resident buffer to the dispatcher when `trigger` applies,
    /// waiting for queue space if needed.
    ///
    /// Returns whether a buffer was queued. Fails with `Closed` once shutdown
    /// has started, in which case the resident data belongs to the shutdown
    /// flush, and with `DispatcherStopped` when the dispatcher is gone.
    async fn enqueue(
        &self,
        trigger: FlushTrigger,
        done: Option<oneshot::Sender<Result<()>>>,
    ) -> Result<bool> {
        let queue = {
            let mut guard = self.lock();
            let resident = &mut *guard;
            resident.check_open()?;
            let Some(queue) = resident.queue.as_ref() else {
                return error::ClosedSnafu { signal: R::SIGNAL }.fail();
            };
            let reserved = match queue.try_reserve() {
                Ok(permit) => {
                    let pending = self.take_pending(&mut resident.accumulator, trigger, done);
                    let queued = pending.is_some();
                    if let Some(pending) = pending {
                        permit.send(pending);
                    }
                    return Ok(queued);
                }
                Err(TrySendError::Full(())) => Some(queue.clone()),
                Err(TrySendError::Closed(())) => None,
            };
            match reserved {
                Some(queue) => queue,
                None => return resident.stop_dispatching().map(|()| false),
            }
        };

        debug!(signal = %R::SIGNAL, %trigger, "flush queue full, waiting");
        let reserved = queue.reserve_owned().await;
        let mut guard = self.lock();
        let resident = &mut *guard;
        resident.check_open()?;
        let Ok(permit) = reserved else {
            return resident.stop_dispatching().map(|()| false);
        };
        let pending = self.take_pending(&mut resident.accumulator, trigger, done);
        let queued = pending.is_some();
        if let Some(pending) = pending {
            let _ = permit.send(pending);
        }
        Ok(queued)
    }
}

struct Tasks {
    timer: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

/// Accumulates, splits and forwards one signal.
///
/// All methods take `&self`; share the processor behind an [`Arc`] to feed it
/// from several producers.
pub struct BatchProcessor<R: Record> {
    shared: Arc<Shared<R>>,
    tasks: Mutex<Option<Tasks>>,
}

/// Batch processor for metrics.
pub type MetricsBatcher = BatchProcessor<Metric>;
/// Batch processor for traces.
pub type TracesBatcher = BatchProcessor<Span>;
/// Batch processor for logs.
pub type LogsBatcher = BatchProcessor<LogRecord>;

impl<R: Record> BatchProcessor<R> {
    /// Validates `config` and spawns the timer and dispatcher tasks.
    ///
    /// Flush failures that no caller is waiting for are sent to `errors`, or
    /// logged when there is no error channel. Must be called from within a
    /// Tokio runtime.
    pub fn start(
        config: &Config,
        forwarder: Arc<dyn Forwarder<R>>,
        errors: Option<mpsc::UnboundedSender<Error>>,
    ) -> Result<Self> {
        config.validate()?;

        let telemetry = Arc::new(Telemetry::new(config.telemetry_level));
        let (queue, pending) = mpsc::channel(config.pending_flushes);
        let shared = Arc::new(Shared {
            resident: Mutex::new(Resident {
                accumulator: Accumulator::new(
                    config.send_batch_size,
                    config.timeout,
                    Instant::now(),
                ),
                queue: Some(queue),
                dispatcher_stopped: false,
            }),
            in_flight: Arc::new(AtomicUsize::new(0)),
            telemetry: telemetry.clone(),
        });
        let dispatcher =
            Dispatcher::with_telemetry(forwarder, config.max_batch_size(), telemetry);

        let tasks = Tasks {
            dispatcher: tokio::spawn(run_dispatcher(dispatcher, pending, errors)),
            timer: tokio::spawn(run_timer(shared.clone())),
        };

        info!(
            signal = %R::SIGNAL,
            timeout = ?config.timeout,
            send_batch_size = config.send_batch_size,
            send_batch_max_size = config.send_batch_max_size,
            telemetry_level = ?config.telemetry_level,
            "batch processor started"
        );

        Ok(Self {
            shared,
            tasks: Mutex::new(Some(tasks)),
        })
    }

    /// Buffers `batch`, flushing when the buffer reaches `send_batch_size`.
    ///
    /// Only waits when flushes are queuing up faster than the forwarder
    /// drains them. Fails without buffering once the processor is shut down
    /// or its dispatcher has exited.
    pub async fn accept(&self, batch: SignalBatch<R>) -> Result<()> {
        let threshold_reached = {
            let mut guard = self.shared.lock();
            guard.check_open()?;
            guard.accumulator.merge(batch);
            guard.accumulator.threshold_reached()
        };

        if threshold_reached {
            match self.shared.enqueue(FlushTrigger::Size, None).await {
                // A concurrent shutdown takes the resident data with it.
                Ok(_) | Err(Error::Closed { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Flushes the resident buffer and waits until every batch of it has
    /// been handed to the forwarder.
    ///
    /// Returns the forward failures of this flush.
    pub async fn flush(&self) -> Result<()> {
        let (done, outcome) = oneshot::channel();
        if !self.shared.enqueue(FlushTrigger::Manual, Some(done)).await? {
            return Ok(());
        }
        // No answer means the dispatcher died with the flush in hand.
        outcome
            .await
            .unwrap_or_else(|_| error::DispatcherStoppedSnafu { signal: R::SIGNAL }.fail())
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> State {
        let guard = self.shared.lock();
        let in_flight = self.shared.in_flight.load(Ordering::SeqCst);
        if in_flight > 0 {
            State::Flushing
        } else if guard.queue.as_ref().map_or(true, mpsc::Sender::is_closed) {
            State::Closed
        } else if guard.accumulator.is_empty() {
            State::Idle
        } else {
            State::Accumulating
        }
    }

    /// Units waiting in the resident buffer.
    #[must_use]
    pub fn resident_units(&self) -> usize {
        self.shared.lock().accumulator.unit_count()
    }

    /// Counters since start.
    #[must_use]
    pub fn stats(&self) -> BatcherStats {
        self.shared.telemetry.snapshot()
    }

    /// Stops accepting data, flushes what is resident and waits for every
    /// queued flush to be forwarded.
    ///
    /// Gives up at `deadline`, abandoning whatever is still being forwarded.
    /// Nothing is abandoned when nothing was resident or queued, whatever the
    /// deadline. Calling it again is a no-op.
    pub async fn shutdown(&self, deadline: Instant) -> Result<()> {
        let Some(tasks) = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return Ok(());
        };

        let result = self.drain(tasks, deadline).await;
        info!(signal = %R::SIGNAL, stats = ?self.stats(), "batch processor stopped");
        result
    }

    /// Sends the final buffer and waits for the dispatcher to drain the queue.
    async fn drain(&self, tasks: Tasks, deadline: Instant) -> Result<()> {
        tasks.timer.abort();
        let _ = tasks.timer.await;
        let mut dispatcher = tasks.dispatcher;

        let (done, mut outcome) = oneshot::channel();
        let (pending, queue) = {
            let mut guard = self.shared.lock();
            let resident = &mut *guard;
            let pending =
                self.shared
                    .take_pending(&mut resident.accumulator, FlushTrigger::Shutdown, Some(done));
            (pending, resident.queue.take())
        };

        match (pending, queue) {
            (Some(pending), Some(queue)) => match time::timeout_at(deadline, queue.reserve()).await {
                Ok(Ok(permit)) => permit.send(pending),
                // The dispatcher is gone; joining it below reports why.
                Ok(Err(_closed)) => drop(pending),
                Err(_elapsed) => return self.abandon(dispatcher).await,
            },
            (Some(pending), None) => warn!(
                signal = %R::SIGNAL,
                units = pending.buffer.unit_count(),
                "dispatcher stopped, discarding buffered data"
            ),
            (None, _) => {}
        }

        let joined = time::timeout_at(deadline, &mut dispatcher).await;
        let joined = match joined {
            Ok(joined) => joined,
            Err(_elapsed) if self.shared.in_flight.load(Ordering::SeqCst) > 0 => {
                return self.abandon(dispatcher).await;
            }
            // Nothing left to forward; the dispatcher only has to notice the
            // closed queue.
            Err(_elapsed) => (&mut dispatcher).await,
        };
        joined.context(error::DispatcherTaskSnafu { signal: R::SIGNAL })?;

        // Settled: the dispatcher has answered or dropped `done`.
        outcome.try_recv().unwrap_or(Ok(()))
    }

    /// Cancels the dispatcher and reports what it was still holding.
    async fn abandon(&self, dispatcher: JoinHandle<()>) -> Result<()> {
        let in_flight = self.shared.in_flight.load(Ordering::SeqCst);
        dispatcher.abort();
        let _ = dispatcher.await;
        warn!(signal = %R::SIGNAL, in_flight, "shutdown deadline exceeded");
        error::ShutdownTimeoutSnafu {
            signal: R::SIGNAL,
            in_flight,
        }
        .fail()
    }
}

impl<R: Record> Drop for BatchProcessor<R> {
    fn drop(&mut self) {
        let tasks = self
            .tasks
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(tasks) = tasks else {
            return;
        };
        tasks.timer.abort();

        // Closing the queue lets the dispatcher finish what is queued and exit.
        let mut guard = self.shared.lock();
        let _ = guard.queue.take();
        if !guard.accumulator.is_empty() {
            warn!(
                signal = %R::SIGNAL,
                units = guard.accumulator.unit_count(),
                "batch processor dropped without shutdown, discarding buffered data"
            );
        }
    }
}

async fn run_timer<R: Record>(shared: Arc<Shared<R>>) {
    loop {
        let deadline = shared.lock().accumulator.deadline();
        time::sleep_until(deadline).await;
        if let Err(err) = shared.enqueue(FlushTrigger::Timeout, None).await {
            debug!(signal = %R::SIGNAL, error = %err, "timer stopped");
            break;
        }
    }
}

async fn run_dispatcher<R: Record>(
    dispatcher: Dispatcher<R>,
    mut queue: mpsc::Receiver<Pending<R>>,
    errors: Option<mpsc::UnboundedSender<Error>>,
) {
    while let Some(Pending {
        buffer,
        trigger,
        done,
        in_flight,
    }) = queue.recv().await
    {
        let result = dispatcher.dispatch(buffer, trigger).await;
        drop(in_flight);

        let unclaimed = match done {
            Some(done) => done.send(result).err().unwrap_or(Ok(())),
            None => result,
        };
        if let Err(err) = unclaimed {
            report(errors.as_ref(), err);
        }
    }
    debug!(signal = %R::SIGNAL, "dispatcher stopped");
}

fn report(errors: Option<&mpsc::UnboundedSender<Error>>, err: Error) {
    let Some(errors) = errors else {
        error!(error = %err, "flush failed");
        return;
    };
    if let Err(mpsc::error::SendError(err)) = errors.send(err) {
        error!(error = %err, "flush failed and the error channel is closed");
    }
}

/// One processor per signal, sharing a configuration.
pub struct SignalBatchers {
    metrics: MetricsBatcher,
    traces: TracesBatcher,
    logs: LogsBatcher,
}

impl SignalBatchers {
    /// Starts the three processors. They share nothing but `config` and the
    /// error channel.
    pub fn start(
        config: &Config,
        metrics: Arc<dyn Forwarder<Metric>>,
        traces: Arc<dyn Forwarder<Span>>,
        logs: Arc<dyn Forwarder<LogRecord>>,
        errors: Option<mpsc::UnboundedSender<Error>>,
    ) -> Result<Self> {
        Ok(Self {
            metrics: BatchProcessor::start(config, metrics, errors.clone())?,
            traces: BatchProcessor::start(config, traces, errors.clone())?,
            logs: BatchProcessor::start(config, logs, errors)?,
        })
    }

    /// The metrics processor.
    #[must_use]
    pub fn metrics(&self) -> &MetricsBatcher {
        &self.metrics
    }

    /// The traces processor.
    #[must_use]
    pub fn traces(&self) -> &TracesBatcher {
        &self.traces
    }

    /// The logs processor.
    #[must_use]
    pub fn logs(&self) -> &LogsBatcher {
        &self.logs
    }

    /// Shuts the three processors down concurrently.
    pub async fn shutdown(&self, deadline: Instant) -> Result<()> {
        let (metrics, traces, logs) = tokio::join!(
            self.metrics.shutdown(deadline),
            self.traces.shutdown(deadline),
            self.logs.shutdown(deadline),
        );
        let mut errors: Vec<Error> = [metrics, traces, logs]
            .into_iter()
            .filter_map(Result::err)
            .collect();
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => error::ShutdownSnafu { errors }.fail(),
        }
    }
}
