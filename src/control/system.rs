//! OS-backed affinity and priority control
//!
//! On Linux, processes are found by their `comm` name through procfs and
//! threads by the `comm` name of each task. Priorities are nice values.
//! Other platforms are not supported and fail at `init`.

use super::AffinityControl;
use crate::error::{EngineError, Result};
use crate::model::{CpuSet, Priority};

/// Lowest (most favourable) nice value
pub const MIN_NICE: i32 = -20;
/// Highest (least favourable) nice value
pub const MAX_NICE: i32 = 19;

/// Kernel limit on `comm` length, excluding the terminating NUL
pub const COMM_LEN: usize = 15;

/// Truncate a name the way the kernel truncates `comm`
pub fn comm_name(name: &str) -> &str {
    if name.len() <= COMM_LEN {
        return name;
    }
    let mut end = COMM_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Does a task's `comm` refer to the configured thread name?
///
/// Managed runtimes give threads long descriptive names which the kernel
/// truncates, so those are compared in truncated form. Native thread names
/// must match exactly.
pub fn thread_matches(comm: &str, name: &str, is_managed: bool) -> bool {
    if is_managed {
        comm == comm_name(name)
    } else {
        comm == name
    }
}

fn check_nice(target: &str, priority: Priority) -> Result<i32> {
    let nice = priority.value();
    if (MIN_NICE..=MAX_NICE).contains(&nice) {
        Ok(nice)
    } else {
        Err(EngineError::control(
            "set priority",
            target,
            format!("{} is outside the nice range {}..={}", nice, MIN_NICE, MAX_NICE),
        ))
    }
}

/// Control backed by the running operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemControl;

impl SystemControl {
    /// Create a system control
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use super::*;
    use nix::errno::Errno;
    use nix::sched::{sched_setaffinity, CpuSet as NixCpuSet};
    use nix::unistd::Pid;

    /// Pids of all processes whose `comm` matches `name`
    pub(super) fn find_processes(name: &str) -> Result<Vec<i32>> {
        let wanted = comm_name(name);
        let processes = procfs::process::all_processes()
            .map_err(|e| EngineError::control("list processes", name, e))?;

        let pids: Vec<i32> = processes
            .filter_map(|p| p.ok())
            .filter(|p| p.stat().map(|s| s.comm == wanted).unwrap_or(false))
            .map(|p| p.pid)
            .collect();

        if pids.is_empty() {
            return Err(EngineError::NotFound {
                kind: "process",
                name: name.to_string(),
            });
        }
        Ok(pids)
    }

    /// Tids of every thread of every process named `name`
    ///
    /// Scheduling attributes are per thread on Linux, so a process-wide
    /// change has to visit each task.
    pub(super) fn find_process_tasks(name: &str) -> Result<Vec<i32>> {
        let mut tids = Vec::new();
        for pid in find_processes(name)? {
            match procfs::process::Process::new(pid).and_then(|p| p.tasks()) {
                Ok(tasks) => tids.extend(tasks.filter_map(|t| t.ok()).map(|t| t.tid)),
                Err(e) => tracing::debug!("Skipping pid {}: {}", pid, e),
            }
        }

        if tids.is_empty() {
            return Err(EngineError::NotFound {
                kind: "process",
                name: name.to_string(),
            });
        }
        Ok(tids)
    }

    /// Tids of all threads named `thread` inside processes named `process`
    pub(super) fn find_threads(process: &str, thread: &str, is_managed: bool) -> Result<Vec<i32>> {
        let mut tids = Vec::new();
        for pid in find_processes(process)? {
            // The process may exit between listing and reading its tasks.
            let tasks = match procfs::process::Process::new(pid).and_then(|p| p.tasks()) {
                Ok(tasks) => tasks,
                Err(e) => {
                    tracing::debug!("Skipping pid {}: {}", pid, e);
                    continue;
                }
            };
            tids.extend(
                tasks
                    .filter_map(|t| t.ok())
                    .filter(|t| {
                        t.stat()
                            .map(|s| thread_matches(&s.comm, thread, is_managed))
                            .unwrap_or(false)
                    })
                    .map(|t| t.tid),
            );
        }

        if tids.is_empty() {
            return Err(EngineError::NotFound {
                kind: "thread",
                name: format!("{}/{}", process, thread),
            });
        }
        Ok(tids)
    }

    pub(super) fn set_affinity(ids: &[i32], cpus: &CpuSet, target: &str) -> Result<()> {
        let mut set = NixCpuSet::new();
        for &core in cpus.cores() {
            set.set(core)
                .map_err(|e| EngineError::control("set affinity", target, e))?;
        }
        apply_each(ids, |id| match sched_setaffinity(Pid::from_raw(id), &set) {
            // Thread exited after it was listed.
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(EngineError::control("set affinity", target, e)),
        })
    }

    pub(super) fn set_nice(ids: &[i32], nice: i32, target: &str) -> Result<()> {
        apply_each(ids, |id| {
            // SAFETY: setpriority only reads its integer arguments.
            let result = unsafe { libc::setpriority(libc::PRIO_PROCESS, id as libc::id_t, nice) };
            if result == 0 {
                return Ok(());
            }
            let error = std::io::Error::last_os_error();
            if error.raw_os_error() == Some(libc::ESRCH) {
                Ok(())
            } else {
                Err(EngineError::control("set priority", target, error))
            }
        })
    }

    /// Apply to every id, returning the first failure after trying all of them
    fn apply_each(ids: &[i32], mut apply: impl FnMut(i32) -> Result<()>) -> Result<()> {
        let mut first_error = None;
        for &id in ids {
            if let Err(e) = apply(id) {
                tracing::debug!("id {}: {}", id, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(target_os = "linux")]
impl AffinityControl for SystemControl {
    fn name(&self) -> &'static str {
        "system"
    }

    fn init(&self) -> Result<()> {
        procfs::process::Process::myself()
            .and_then(|p| p.stat())
            .map(|_| ())
            .map_err(|e| EngineError::ControlInit(format!("/proc is not readable: {}", e)))
    }

    fn set_process_affinity(&self, process: &str, cpus: &CpuSet) -> Result<()> {
        let tids = linux::find_process_tasks(process)?;
        linux::set_affinity(&tids, cpus, process)
    }

    fn set_process_priority(&self, process: &str, priority: Priority) -> Result<()> {
        let nice = check_nice(process, priority)?;
        let tids = linux::find_process_tasks(process)?;
        linux::set_nice(&tids, nice, process)
    }

    fn set_thread_affinity(
        &self,
        process: &str,
        thread: &str,
        cpus: &CpuSet,
        is_managed: bool,
    ) -> Result<()> {
        let target = format!("{}/{}", process, thread);
        let tids = linux::find_threads(process, thread, is_managed)?;
        linux::set_affinity(&tids, cpus, &target)
    }

    fn set_thread_priority(
        &self,
        process: &str,
        thread: &str,
        priority: Priority,
        is_managed: bool,
    ) -> Result<()> {
        let target = format!("{}/{}", process, thread);
        let nice = check_nice(&target, priority)?;
        let tids = linux::find_threads(process, thread, is_managed)?;
        linux::set_nice(&tids, nice, &target)
    }
}

#[cfg(not(target_os = "linux"))]
impl AffinityControl for SystemControl {
    fn name(&self) -> &'static str {
        "system"
    }

    fn init(&self) -> Result<()> {
        Err(EngineError::ControlInit(format!(
            "affinity control is not implemented for {}",
            std::env::consts::OS
        )))
    }

    fn set_process_affinity(&self, _process: &str, _cpus: &CpuSet) -> Result<()> {
        Err(EngineError::UnsupportedOperation("process affinity".into()))
    }

    fn set_process_priority(&self, process: &str, priority: Priority) -> Result<()> {
        check_nice(process, priority)?;
        Err(EngineError::UnsupportedOperation("process priority".into()))
    }

    fn set_thread_affinity(
        &self,
        _process: &str,
        _thread: &str,
        _cpus: &CpuSet,
        _is_managed: bool,
    ) -> Result<()> {
        Err(EngineError::UnsupportedOperation("thread affinity".into()))
    }

    fn set_thread_priority(
        &self,
        _process: &str,
        _thread: &str,
        _priority: Priority,
        _is_managed: bool,
    ) -> Result<()> {
        Err(EngineError::UnsupportedOperation("thread priority".into()))
    }
}
