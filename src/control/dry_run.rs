//! Control that only logs what it would do

use super::AffinityControl;
use crate::error::Result;
use crate::model::{CpuSet, Priority};

/// Logs every call at info level and always succeeds
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunControl;

impl DryRunControl {
    /// Create a dry-run control
    pub fn new() -> Self {
        Self
    }
}

fn thread_kind(is_managed: bool) -> &'static str {
    if is_managed {
        "managed"
    } else {
        "native"
    }
}

impl AffinityControl for DryRunControl {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    fn init(&self) -> Result<()> {
        tracing::info!("Dry run: no scheduling changes will be made");
        Ok(())
    }

    fn set_process_affinity(&self, process: &str, cpus: &CpuSet) -> Result<()> {
        tracing::info!("[dry-run] process '{}' -> cores {}", process, cpus);
        Ok(())
    }

    fn set_process_priority(&self, process: &str, priority: Priority) -> Result<()> {
        tracing::info!("[dry-run] process '{}' -> priority {}", process, priority);
        Ok(())
    }

    fn set_thread_affinity(
        &self,
        process: &str,
        thread: &str,
        cpus: &CpuSet,
        is_managed: bool,
    ) -> Result<()> {
        tracing::info!(
            "[dry-run] {} thread '{}' of '{}' -> cores {}",
            thread_kind(is_managed),
            thread,
            process,
            cpus
        );
        Ok(())
    }

    fn set_thread_priority(
        &self,
        process: &str,
        thread: &str,
        priority: Priority,
        is_managed: bool,
    ) -> Result<()> {
        tracing::info!(
            "[dry-run] {} thread '{}' of '{}' -> priority {}",
            thread_kind(is_managed),
            thread,
            process,
            priority
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_always_succeeds() {
        let control = DryRunControl::new();
        let cpus = CpuSet::new(vec![0, 1]).unwrap();
        assert!(control.init().is_ok());
        assert!(control.set_process_affinity("ghost", &cpus).is_ok());
        assert!(control.set_process_priority("ghost", Priority::new(3)).is_ok());
        assert!(control.set_thread_affinity("ghost", "t", &cpus, true).is_ok());
        assert!(control
            .set_thread_priority("ghost", "t", Priority::new(3), false)
            .is_ok());
        assert_eq!(control.name(), "dry-run");
    }
}
