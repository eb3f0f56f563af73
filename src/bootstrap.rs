//! Startup sequence
//!
//! Checks that the configuration targets the running operating system,
//! initializes the control, loads the specifications and hands them to a
//! scheduler worker. Every failure here is fatal and happens before any
//! scheduling change is made.

use crate::config::ConfigLoader;
use crate::control::AffinityControl;
use crate::error::{EngineError, Result};
use crate::model::ConfigRepository;
use crate::scheduler::{SchedulerHandle, SchedulerLoop};
use std::sync::Arc;
use std::time::Duration;

/// Operating system name as used in configuration documents
pub fn host_os() -> &'static str {
    match std::env::consts::OS {
        "windows" => "windows",
        "linux" => "linux",
        _ => "other",
    }
}

/// Everything the scheduler worker needs, produced by a successful startup
#[derive(Debug)]
pub struct Prepared {
    /// Loaded specifications
    pub repository: Arc<ConfigRepository>,
    /// Wake-up interval, `None` for a single pass
    pub interval: Option<Duration>,
}

/// Drives startup from a loaded configuration to a running scheduler
#[derive(Debug, Clone)]
pub struct Bootstrap {
    loader: ConfigLoader,
    host_os: String,
}

impl Bootstrap {
    /// Create a bootstrap for the running operating system
    pub fn new(loader: ConfigLoader) -> Self {
        Self {
            loader,
            host_os: host_os().to_string(),
        }
    }

    /// Pretend to run on a different operating system
    pub fn with_host_os(mut self, os: impl Into<String>) -> Self {
        self.host_os = os.into();
        self
    }

    /// The loader in use
    pub fn loader(&self) -> &ConfigLoader {
        &self.loader
    }

    /// Fail unless the declared target matches the host, ignoring case
    pub fn check_operating_system(&self) -> Result<()> {
        let declared = self.loader.read_operating_system_target()?;
        if declared.trim().eq_ignore_ascii_case(&self.host_os) {
            Ok(())
        } else {
            Err(EngineError::OsMismatch {
                declared,
                running: self.host_os.clone(),
            })
        }
    }

    /// Run every startup step up to, but not including, starting the worker
    pub fn prepare<C: AffinityControl + ?Sized>(&self, control: &C) -> Result<Prepared> {
        self.check_operating_system()?;

        control.init().map_err(|e| match e {
            EngineError::ControlInit(_) => e,
            other => EngineError::ControlInit(other.to_string()),
        })?;
        tracing::info!("Initialized {} affinity control", control.name());

        let repository = Arc::new(self.loader.load_specs()?);
        let interval = self.loader.read_invocation_interval()?;

        Ok(Prepared {
            repository,
            interval,
        })
    }

    /// Run startup and spawn the scheduler worker
    pub fn start<C: AffinityControl + 'static>(&self, control: C) -> Result<SchedulerHandle> {
        let prepared = self.prepare(&control)?;

        match prepared.interval {
            Some(interval) => tracing::info!(
                "Applying {} process(es), {} call(s) per pass, every {}",
                prepared.repository.len(),
                prepared.repository.planned_calls(),
                humantime::format_duration(interval)
            ),
            None => tracing::info!(
                "Applying {} process(es), {} call(s), once",
                prepared.repository.len(),
                prepared.repository.planned_calls()
            ),
        }

        SchedulerLoop::new(prepared.repository, control, prepared.interval).spawn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::testing::RecordingControl;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn config(os: &str, body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"<Applications>
                 <OS OSName="{}"/>
                 <Scheduling Periodic="false"/>
                 {}
               </Applications>"#,
            os, body
        )
        .unwrap();
        file
    }

    fn bootstrap(file: &NamedTempFile, host: &str) -> Bootstrap {
        Bootstrap::new(ConfigLoader::new(Some(file.path()))).with_host_os(host)
    }

    const ONE_PROCESS: &str = r#"<ProcessInfo ProcessName="P1" Priority="5" CpusList="0,1"/>"#;

    #[test]
    fn test_host_os_is_known_value() {
        assert!(["windows", "linux", "other"].contains(&host_os()));
    }

    #[test]
    fn test_os_match_ignores_case() {
        let file = config("LiNuX", ONE_PROCESS);
        assert!(bootstrap(&file, "linux").check_operating_system().is_ok());
    }

    #[test]
    fn test_os_mismatch_never_initializes_control() {
        let file = config("windows", ONE_PROCESS);
        let control = Arc::new(RecordingControl::default());

        let result = bootstrap(&file, "linux").start(control.clone());

        assert!(matches!(result, Err(EngineError::OsMismatch { .. })));
        assert_eq!(control.init_count(), 0);
        assert!(control.calls().is_empty());
    }

    #[test]
    fn test_init_failure_aborts_before_loading() {
        let file = config("linux", ONE_PROCESS);
        let control = Arc::new(RecordingControl {
            fail_init: true,
            ..Default::default()
        });

        let result = bootstrap(&file, "linux").start(control.clone());

        assert!(matches!(result, Err(EngineError::ControlInit(_))));
        assert_eq!(control.init_count(), 1);
        assert!(control.calls().is_empty());
    }

    #[test]
    fn test_spec_load_failure_aborts() {
        let file = config(
            "linux",
            r#"<ProcessInfo ProcessName="P1" Priority="five" CpusList="0"/>"#,
        );
        let control = Arc::new(RecordingControl::default());

        let result = bootstrap(&file, "linux").start(control.clone());

        assert!(matches!(result, Err(EngineError::SpecLoad { .. })));
        assert!(control.calls().is_empty());
    }

    #[test]
    fn test_start_runs_one_shot_loop() {
        let file = config("linux", ONE_PROCESS);
        let control = Arc::new(RecordingControl::default());

        let handle = bootstrap(&file, "linux").start(control.clone()).unwrap();
        let summary = handle.join().unwrap();

        assert_eq!(summary.passes, 1);
        assert_eq!(control.init_count(), 1);
        assert_eq!(control.calls().len(), 2);
    }

    #[test]
    fn test_prepare_reports_interval() {
        let file = config("linux", ONE_PROCESS);
        let prepared = bootstrap(&file, "linux")
            .prepare(&RecordingControl::default())
            .unwrap();
        assert_eq!(prepared.interval, None);
        assert_eq!(prepared.repository.len(), 1);
    }
}
