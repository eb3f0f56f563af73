//! Timeout wrapper for control primitives
//!
//! Each primitive call runs on a short-lived helper thread while the caller
//! waits on a channel for at most the configured timeout. A call that does
//! not finish in time is reported as [`EngineError::Timeout`] and left to
//! complete in the background; its result is discarded.
//!
//! While such a call is still running, further calls of the same operation
//! on the same target are refused instead of spawning another helper, so a
//! hung primitive costs at most one thread per target.

use super::AffinityControl;
use crate::error::{EngineError, Result};
use crate::model::{CpuSet, Priority};
use crossbeam::channel::{bounded, RecvTimeoutError};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

type InFlight = Arc<Mutex<HashSet<String>>>;

fn lock(in_flight: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Removes a call's key once its helper thread is done, even on panic
struct InFlightGuard {
    in_flight: InFlight,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.key);
    }
}

/// Bounds every primitive call of an inner control with a timeout
pub struct TimedControl {
    inner: Arc<dyn AffinityControl>,
    timeout: Duration,
    in_flight: InFlight,
}

impl TimedControl {
    /// Wrap `inner` so that no primitive call blocks longer than `timeout`
    pub fn new(inner: Arc<dyn AffinityControl>, timeout: Duration) -> Self {
        Self {
            inner,
            timeout,
            in_flight: Arc::default(),
        }
    }

    /// Configured timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Helper threads still running, including ones that timed out
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    fn call<F>(&self, operation: &'static str, target: &str, call: F) -> Result<()>
    where
        F: FnOnce(&dyn AffinityControl) -> Result<()> + Send + 'static,
    {
        let key = format!("{} {}", operation, target);
        {
            let mut in_flight = lock(&self.in_flight);
            if !in_flight.insert(key.clone()) {
                tracing::warn!(
                    "{} on {} is still running from an earlier pass, skipping",
                    operation,
                    target
                );
                return Err(EngineError::control(
                    operation,
                    target,
                    "earlier call has not finished",
                ));
            }
        }

        let (tx, rx) = bounded(1);
        let inner = Arc::clone(&self.inner);
        let guard = InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            key,
        };

        std::thread::Builder::new()
            .name("control-call".to_string())
            .spawn(move || {
                let _guard = guard;
                // The receiver is gone if the caller already timed out.
                let _ = tx.send(call(inner.as_ref()));
            })
            .map_err(|e| EngineError::io("control-call thread", e))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(EngineError::Timeout(self.timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(EngineError::control(
                "complete call",
                self.inner.name(),
                "control call panicked",
            )),
        }
    }
}

impl AffinityControl for TimedControl {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn init(&self) -> Result<()> {
        self.inner.init()
    }

    fn set_process_affinity(&self, process: &str, cpus: &CpuSet) -> Result<()> {
        let (owned, cpus) = (process.to_string(), cpus.clone());
        self.call("set affinity", process, move |c| {
            c.set_process_affinity(&owned, &cpus)
        })
    }

    fn set_process_priority(&self, process: &str, priority: Priority) -> Result<()> {
        let owned = process.to_string();
        self.call("set priority", process, move |c| {
            c.set_process_priority(&owned, priority)
        })
    }

    fn set_thread_affinity(
        &self,
        process: &str,
        thread: &str,
        cpus: &CpuSet,
        is_managed: bool,
    ) -> Result<()> {
        let target = format!("{}/{}", process, thread);
        let (process, thread, cpus) = (process.to_string(), thread.to_string(), cpus.clone());
        self.call("set affinity", &target, move |c| {
            c.set_thread_affinity(&process, &thread, &cpus, is_managed)
        })
    }

    fn set_thread_priority(
        &self,
        process: &str,
        thread: &str,
        priority: Priority,
        is_managed: bool,
    ) -> Result<()> {
        let target = format!("{}/{}", process, thread);
        let (process, thread) = (process.to_string(), thread.to_string());
        self.call("set priority", &target, move |c| {
            c.set_thread_priority(&process, &thread, priority, is_managed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::testing::{Call, RecordingControl};
    use crate::control::DryRunControl;

    /// Sleeps in every primitive call
    struct SlowControl(Duration);

    impl AffinityControl for SlowControl {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn init(&self) -> Result<()> {
            Ok(())
        }

        fn set_process_affinity(&self, _process: &str, _cpus: &CpuSet) -> Result<()> {
            std::thread::sleep(self.0);
            Ok(())
        }

        fn set_process_priority(&self, _process: &str, _priority: Priority) -> Result<()> {
            std::thread::sleep(self.0);
            Ok(())
        }

        fn set_thread_affinity(&self, _: &str, _: &str, _: &CpuSet, _: bool) -> Result<()> {
            std::thread::sleep(self.0);
            Ok(())
        }

        fn set_thread_priority(&self, _: &str, _: &str, _: Priority, _: bool) -> Result<()> {
            std::thread::sleep(self.0);
            Ok(())
        }
    }

    #[test]
    fn test_slow_call_times_out() {
        let control = TimedControl::new(
            Arc::new(SlowControl(Duration::from_secs(2))),
            Duration::from_millis(50),
        );
        let started = std::time::Instant::now();
        let result = control.set_process_priority("p", Priority::new(1));
        assert!(matches!(result, Err(EngineError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_hung_target_is_skipped_until_it_finishes() {
        let control = TimedControl::new(
            Arc::new(SlowControl(Duration::from_millis(300))),
            Duration::from_millis(20),
        );
        let cpus = CpuSet::new(vec![0]).unwrap();

        assert!(matches!(
            control.set_process_affinity("p", &cpus),
            Err(EngineError::Timeout(_))
        ));
        assert_eq!(control.in_flight(), 1);

        // Same call again: refused without a new helper thread
        assert!(matches!(
            control.set_process_affinity("p", &cpus),
            Err(EngineError::Control { .. })
        ));
        assert_eq!(control.in_flight(), 1);

        // Other operations and targets are unaffected
        assert!(matches!(
            control.set_process_priority("p", Priority::new(1)),
            Err(EngineError::Timeout(_))
        ));
        assert_eq!(control.in_flight(), 2);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while control.in_flight() > 0 {
            assert!(std::time::Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(matches!(
            control.set_process_affinity("p", &cpus),
            Err(EngineError::Timeout(_))
        ));
    }

    #[test]
    fn test_fast_call_passes_through() {
        let inner = Arc::new(RecordingControl::failing_on(&["bad"]));
        let control = TimedControl::new(inner.clone(), Duration::from_secs(5));
        let cpus = CpuSet::new(vec![1, 3]).unwrap();

        assert!(control.set_thread_affinity("p", "t", &cpus, true).is_ok());
        assert!(matches!(
            control.set_process_priority("bad", Priority::new(1)),
            Err(EngineError::NotFound { .. })
        ));
        assert_eq!(
            inner.calls()[0],
            Call::ThreadAffinity("p".into(), "t".into(), vec![1, 3], true)
        );
    }

    #[test]
    fn test_name_and_init_delegate() {
        let control = TimedControl::new(Arc::new(DryRunControl::new()), Duration::from_secs(1));
        assert_eq!(control.name(), "dry-run");
        assert!(control.init().is_ok());
        assert_eq!(control.timeout(), Duration::from_secs(1));
    }
}
