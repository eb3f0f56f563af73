//! Scheduler loop
//!
//! Walks the configuration repository and applies every process and thread
//! specification through an [`AffinityControl`], either once or repeatedly
//! on a fixed interval. The loop runs on one dedicated worker thread and
//! can be stopped at any time through its [`SchedulerHandle`].
//!
//! A failed primitive call is logged and counted, and the pass continues
//! with the next call. Nothing is retried within a pass.

use crate::control::AffinityControl;
use crate::error::{EngineError, Result};
use crate::model::{ConfigRepository, ProcessSpec};
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Lifecycle of the scheduler loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Created, not started
    Idle,
    /// Applying the repository
    Applying,
    /// Waiting for the next periodic pass
    Sleeping,
    /// Finished; no further passes
    Terminated,
}

impl LoopState {
    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Applying => 1,
            Self::Sleeping => 2,
            Self::Terminated => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Applying,
            2 => Self::Sleeping,
            _ => Self::Terminated,
        }
    }
}

/// Counters shared between the worker and its handle
#[derive(Debug)]
pub struct LoopStats {
    /// Completed passes
    pub passes: AtomicU64,
    /// Primitive calls attempted
    pub calls: AtomicU64,
    /// Primitive calls that failed
    pub failures: AtomicU64,
    state: AtomicU8,
}

impl Default for LoopStats {
    fn default() -> Self {
        Self {
            passes: AtomicU64::new(0),
            calls: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            state: AtomicU8::new(LoopState::Idle.as_u8()),
        }
    }
}

impl LoopStats {
    /// Current loop state
    pub fn state(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: LoopState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Completed passes so far
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }
}

/// Outcome of one applying pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    /// 1-based pass number
    pub pass: u64,
    /// Primitive calls attempted
    pub attempted: usize,
    /// Primitive calls that failed
    pub failed: usize,
    /// Time spent in the pass
    pub elapsed: Duration,
}

impl PassReport {
    /// True if every call succeeded
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Outcome of a finished loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSummary {
    /// Completed passes
    pub passes: u64,
    /// Primitive calls attempted across all passes
    pub calls: u64,
    /// Failed primitive calls across all passes
    pub failures: u64,
    /// True if the loop ended because it was stopped
    pub cancelled: bool,
}

/// Applies a repository through a control, once or periodically
pub struct SchedulerLoop<C> {
    repository: Arc<ConfigRepository>,
    control: C,
    interval: Option<Duration>,
    stats: Arc<LoopStats>,
}

impl<C: AffinityControl> SchedulerLoop<C> {
    /// Create a loop; `interval` of `None` runs exactly one pass
    pub fn new(repository: Arc<ConfigRepository>, control: C, interval: Option<Duration>) -> Self {
        Self {
            repository,
            control,
            interval,
            stats: Arc::new(LoopStats::default()),
        }
    }

    /// Shared counters
    pub fn stats(&self) -> Arc<LoopStats> {
        Arc::clone(&self.stats)
    }

    /// Current state
    pub fn state(&self) -> LoopState {
        self.stats.state()
    }

    /// Configured interval
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Apply every specification in the repository once
    pub fn run_pass(&mut self) -> PassReport {
        let started = Instant::now();
        let pass = self.stats.passes() + 1;
        let mut attempted = 0;
        let mut failed = 0;

        tracing::debug!("Pass {}: applying {} process(es)", pass, self.repository.len());

        for process in self.repository.iter() {
            apply_process(&self.control, process, |outcome| {
                attempted += 1;
                if let Err(e) = outcome {
                    failed += 1;
                    tracing::warn!("Pass {}: {}", pass, e);
                }
            });
        }

        self.stats.passes.fetch_add(1, Ordering::Relaxed);
        self.stats.calls.fetch_add(attempted as u64, Ordering::Relaxed);
        self.stats.failures.fetch_add(failed as u64, Ordering::Relaxed);

        let report = PassReport {
            pass,
            attempted,
            failed,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            "Pass {} done: {} call(s), {} failed, took {}",
            report.pass,
            report.attempted,
            report.failed,
            humantime::format_duration(report.elapsed)
        );
        report
    }

    /// Run until finished or until `stop` fires or disconnects
    pub fn run(mut self, stop: Receiver<()>) -> LoopSummary {
        let mut cancelled = false;
        self.stats.set_state(LoopState::Applying);

        loop {
            match stop.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => {
                    cancelled = true;
                    break;
                }
                Err(TryRecvError::Empty) => {}
            }

            self.run_pass();

            let Some(interval) = self.interval else {
                break;
            };

            self.stats.set_state(LoopState::Sleeping);
            match stop.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => self.stats.set_state(LoopState::Applying),
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    cancelled = true;
                    break;
                }
            }
        }

        self.stats.set_state(LoopState::Terminated);
        let summary = LoopSummary {
            passes: self.stats.passes(),
            calls: self.stats.calls.load(Ordering::Relaxed),
            failures: self.stats.failures.load(Ordering::Relaxed),
            cancelled,
        };
        tracing::info!(
            "Scheduler loop terminated after {} pass(es){}",
            summary.passes,
            if cancelled { " (stopped)" } else { "" }
        );
        summary
    }
}

impl<C: AffinityControl + 'static> SchedulerLoop<C> {
    /// Start the loop on a dedicated worker thread
    pub fn spawn(self) -> Result<SchedulerHandle> {
        let (stop_tx, stop_rx) = bounded(1);
        let stats = self.stats();
        let interval = self.interval;

        let thread = std::thread::Builder::new()
            .name("scheduler-loop".to_string())
            .spawn(move || self.run(stop_rx))
            .map_err(|e| EngineError::io("scheduler-loop thread", e))?;

        Ok(SchedulerHandle {
            stop: stop_tx,
            thread,
            stats,
            interval,
        })
    }
}

/// Issue every primitive call for one process in order, reporting each outcome
fn apply_process<C: AffinityControl>(
    control: &C,
    process: &ProcessSpec,
    mut record: impl FnMut(Result<()>),
) {
    let name = process.name.as_str();

    if process.priority.is_set() {
        record(control.set_process_priority(name, process.priority));
    }
    if let Some(cpus) = &process.affinity {
        record(control.set_process_affinity(name, cpus));
    }

    for thread in &process.threads {
        if thread.priority.is_set() {
            record(control.set_thread_priority(
                name,
                thread.name(),
                thread.priority,
                thread.is_managed(),
            ));
        }
        if let Some(cpus) = &thread.affinity {
            record(control.set_thread_affinity(name, thread.name(), cpus, thread.is_managed()));
        }
    }
}

/// Handle to a running scheduler worker
pub struct SchedulerHandle {
    stop: Sender<()>,
    thread: JoinHandle<LoopSummary>,
    stats: Arc<LoopStats>,
    interval: Option<Duration>,
}

impl SchedulerHandle {
    /// Ask the worker to stop; wakes it if it is sleeping
    pub fn stop(&self) {
        // A full channel means a stop is already pending.
        let _ = self.stop.try_send(());
    }

    /// Shared counters of the running loop
    pub fn stats(&self) -> Arc<LoopStats> {
        Arc::clone(&self.stats)
    }

    /// Current loop state
    pub fn state(&self) -> LoopState {
        self.stats.state()
    }

    /// True if the loop re-applies on an interval rather than running once
    pub fn is_periodic(&self) -> bool {
        self.interval.is_some()
    }

    /// True once the worker thread has exited
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the worker to finish
    pub fn join(self) -> Result<LoopSummary> {
        self.thread.join().map_err(|_| EngineError::WorkerPanicked)
    }
}
