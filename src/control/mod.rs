//! Affinity and priority control
//!
//! The scheduler only talks to the [`AffinityControl`] trait. This module
//! also provides the implementations used by the binary: the OS-backed
//! [`SystemControl`], the logging-only [`DryRunControl`], and the
//! [`TimedControl`] wrapper that bounds every call with a timeout.

mod dry_run;
mod system;
mod timed;

pub use dry_run::DryRunControl;
pub use system::SystemControl;
pub use timed::TimedControl;

use crate::error::Result;
use crate::model::{CpuSet, Priority};
use std::sync::Arc;

/// Primitives for changing process and thread scheduling
///
/// Implementations look processes up by name. Whether a name that matches
/// nothing is an error or a no-op is up to the implementation.
pub trait AffinityControl: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Prepare the control for use; called once before any other method
    fn init(&self) -> Result<()>;

    /// Restrict a process to the given cores
    fn set_process_affinity(&self, process: &str, cpus: &CpuSet) -> Result<()>;

    /// Set a process's priority
    fn set_process_priority(&self, process: &str, priority: Priority) -> Result<()>;

    /// Restrict one thread of a process to the given cores
    fn set_thread_affinity(
        &self,
        process: &str,
        thread: &str,
        cpus: &CpuSet,
        is_managed: bool,
    ) -> Result<()>;

    /// Set the priority of one thread of a process
    fn set_thread_priority(
        &self,
        process: &str,
        thread: &str,
        priority: Priority,
        is_managed: bool,
    ) -> Result<()>;
}

impl<T: AffinityControl + ?Sized> AffinityControl for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn init(&self) -> Result<()> {
        (**self).init()
    }

    fn set_process_affinity(&self, process: &str, cpus: &CpuSet) -> Result<()> {
        (**self).set_process_affinity(process, cpus)
    }

    fn set_process_priority(&self, process: &str, priority: Priority) -> Result<()> {
        (**self).set_process_priority(process, priority)
    }

    fn set_thread_affinity(
        &self,
        process: &str,
        thread: &str,
        cpus: &CpuSet,
        is_managed: bool,
    ) -> Result<()> {
        (**self).set_thread_affinity(process, thread, cpus, is_managed)
    }

    fn set_thread_priority(
        &self,
        process: &str,
        thread: &str,
        priority: Priority,
        is_managed: bool,
    ) -> Result<()> {
        (**self).set_thread_priority(process, thread, priority, is_managed)
    }
}
