//! Configuration loading
//!
//! Reads the XML configuration document, validates it against the schema
//! and extracts the operating system target, the invocation interval and
//! the process/thread specifications.

use super::document::{ConfigDocument, Element};
use super::schema::{parse_bool, Schema};
use crate::error::{EngineError, Result};
use crate::model::{ConfigRepository, CpuSet, Priority, ProcessSpec, ThreadSpec};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration file used when none is given on the command line
pub const DEFAULT_CONFIG_PATH: &str = "ApplicationsToConfigure.xml";

/// Fixed location of the schema document
pub const SCHEMA_PATH: &str = "ApplicationsSchema.json";

const OS_ELEMENT: &str = "OS";
const SCHEDULING_ELEMENT: &str = "Scheduling";
const PROCESS_ELEMENT: &str = "ProcessInfo";
const THREAD_ELEMENT: &str = "ThreadInfo";

/// Threads of a native process are raw OS threads; all others belong to a
/// managed runtime.
fn threads_are_managed(process_is_native: bool) -> bool {
    !process_is_native
}

/// Loader for one configuration document
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_path: PathBuf,
    schema_path: PathBuf,
}

impl ConfigLoader {
    /// Create a loader; `None` selects [`DEFAULT_CONFIG_PATH`]
    pub fn new(config_path: Option<&Path>) -> Self {
        Self {
            config_path: config_path
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
            schema_path: PathBuf::from(SCHEMA_PATH),
        }
    }

    /// Override the schema location
    pub fn with_schema_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema_path = path.into();
        self
    }

    /// Configuration document path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Schema document path
    pub fn schema_path(&self) -> &Path {
        &self.schema_path
    }

    fn document(&self) -> Result<ConfigDocument> {
        ConfigDocument::load(&self.config_path)
    }

    /// Validate the configuration document against the schema
    pub fn check_schema(&self) -> Result<()> {
        let schema = Schema::load(&self.schema_path)
            .map_err(|e| e.with_context(format!("loading schema {:?}", self.schema_path)))?;
        let document = self.document()?;
        schema.validate(&document)
    }

    /// Validate the configuration document, logging the cause on failure
    pub fn validate_schema(&self) -> bool {
        match self.check_schema() {
            Ok(()) => {
                tracing::debug!("{:?} matches schema {:?}", self.config_path, self.schema_path);
                true
            }
            Err(e) => {
                tracing::error!("{:?} failed schema validation: {}", self.config_path, e);
                false
            }
        }
    }

    /// Declared target operating system
    pub fn read_operating_system_target(&self) -> Result<String> {
        Self::operating_system_target(&self.document()?)
    }

    fn operating_system_target(document: &ConfigDocument) -> Result<String> {
        let os = document
            .root()
            .find_first(OS_ELEMENT)
            .ok_or_else(|| EngineError::spec_load(OS_ELEMENT, "element is missing"))?;
        os.attribute("OSName")
            .map(str::to_string)
            .ok_or_else(|| EngineError::spec_load(OS_ELEMENT, "missing OSName attribute"))
    }

    /// Wake-up interval for periodic mode, `None` to run once
    pub fn read_invocation_interval(&self) -> Result<Option<Duration>> {
        Self::invocation_interval(&self.document()?)
    }

    /// Wake-up interval in milliseconds, 0 meaning run once
    pub fn invocation_interval_ms(&self) -> Result<u64> {
        Ok(self
            .read_invocation_interval()?
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0))
    }

    fn invocation_interval(document: &ConfigDocument) -> Result<Option<Duration>> {
        let scheduling = document.root().find_first(SCHEDULING_ELEMENT).ok_or_else(|| {
            EngineError::InvalidInterval(format!("'{}' element is missing", SCHEDULING_ELEMENT))
        })?;

        let periodic = match scheduling.attribute("Periodic") {
            None => false,
            Some(raw) => parse_bool(raw).ok_or_else(|| {
                EngineError::InvalidInterval(format!("Periodic '{}' is not a boolean", raw))
            })?,
        };
        if !periodic {
            return Ok(None);
        }

        let raw = scheduling.attribute("PeriodicTimeToWakeUp").ok_or_else(|| {
            EngineError::InvalidInterval("periodic mode requires PeriodicTimeToWakeUp".into())
        })?;
        let millis: i64 = raw
            .trim()
            .parse()
            .map_err(|_| EngineError::InvalidInterval(format!("'{}' is not an integer", raw)))?;
        if millis <= 0 {
            return Err(EngineError::InvalidInterval(format!(
                "wake-up interval must be positive, got {}",
                millis
            )));
        }

        Ok(Some(Duration::from_millis(millis as u64)))
    }

    /// Build the repository from every process entry in document order
    ///
    /// Any malformed entry fails the whole load and no repository is
    /// returned.
    pub fn load_specs(&self) -> Result<ConfigRepository> {
        let document = self.document()?;
        let repository = Self::specs(&document)?;
        tracing::info!(
            "Loaded {} process(es) and {} thread(s) from {:?}",
            repository.len(),
            repository.thread_count(),
            document.path()
        );
        Ok(repository)
    }

    /// Whether [`load_specs`](Self::load_specs) succeeds, logging the cause
    pub fn load_specs_ok(&self) -> bool {
        match self.load_specs() {
            Ok(_) => true,
            Err(e) => {
                tracing::error!("Failed to load specs from {:?}: {}", self.config_path, e);
                false
            }
        }
    }

    fn specs(document: &ConfigDocument) -> Result<ConfigRepository> {
        let host_cpus = num_cpus::get();
        let processes = document
            .root()
            .children_named(PROCESS_ELEMENT)
            .enumerate()
            .map(|(index, element)| {
                let process = parse_process(element, index)?;
                warn_on_missing_cores(&process, host_cpus);
                Ok(process)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ConfigRepository::new(processes))
    }
}

fn parse_process(element: &Element, index: usize) -> Result<ProcessSpec> {
    let entry = format!("{}[{}]", PROCESS_ELEMENT, index);

    let name = required(element, "ProcessName", &entry)?;
    let priority = parse_priority(element, &entry)?;
    let affinity = parse_affinity(element, &entry)?;
    let is_native = match element.attribute("isNative") {
        Some(value) => parse_bool(value).ok_or_else(|| {
            EngineError::spec_load(&entry, format!("isNative '{}' is not a boolean", value))
        })?,
        None => false,
    };
    let managed = threads_are_managed(is_native);

    let mut process = ProcessSpec::new(name, priority, affinity);
    for (thread_index, thread) in element.children_named(THREAD_ELEMENT).enumerate() {
        let thread_entry = format!("{}/{}[{}]", entry, THREAD_ELEMENT, thread_index);
        let thread_name = required(thread, "ThreadName", &thread_entry)?;
        process.add_thread(ThreadSpec::new(
            thread_name,
            managed,
            parse_priority(thread, &thread_entry)?,
            parse_affinity(thread, &thread_entry)?,
        ));
    }

    Ok(process)
}

fn required<'a>(element: &'a Element, attribute: &str, entry: &str) -> Result<&'a str> {
    element
        .attribute(attribute)
        .ok_or_else(|| EngineError::spec_load(entry, format!("missing {} attribute", attribute)))
}

fn parse_priority(element: &Element, entry: &str) -> Result<Priority> {
    let raw = required(element, "Priority", entry)?;
    raw.trim()
        .parse::<i32>()
        .map(Priority::new)
        .map_err(|_| EngineError::spec_load(entry, format!("Priority '{}' is not an integer", raw)))
}

/// An absent or empty CpusList leaves affinity unchanged.
fn parse_affinity(element: &Element, entry: &str) -> Result<Option<CpuSet>> {
    match element.attribute("CpusList") {
        Some(raw) => CpuSet::parse_list(raw)
            .map_err(|e| EngineError::spec_load(entry, format!("CpusList '{}': {}", raw, e))),
        None => Ok(None),
    }
}

fn warn_on_missing_cores(process: &ProcessSpec, host_cpus: usize) {
    let sets = process
        .affinity
        .iter()
        .map(|set| (process.name.as_str(), set))
        .chain(
            process
                .threads
                .iter()
                .filter_map(|t| t.affinity.as_ref().map(|set| (t.name(), set))),
        );
    for (owner, set) in sets {
        if set.max_core() >= host_cpus {
            tracing::warn!(
                "'{}' requests cores {} but this host has {} logical CPUs",
                owner,
                set,
                host_cpus
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    const SCHEMA: &str = include_str!("../../ApplicationsSchema.json");

    fn write_config(xml: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(xml.as_bytes()).unwrap();
        file
    }

    fn loader_for(file: &NamedTempFile) -> ConfigLoader {
        ConfigLoader::new(Some(file.path()))
    }

    fn document(body: &str, scheduling: &str) -> String {
        format!(
            r#"<?xml version="1.0"?>
<Applications>
  <OS OSName="linux"/>
  {}
  {}
</Applications>"#,
            scheduling, body
        )
    }

    const ONCE: &str = r#"<Scheduling Periodic="false"/>"#;

    #[test]
    fn test_default_paths() {
        let loader = ConfigLoader::new(None);
        assert_eq!(loader.config_path(), Path::new(DEFAULT_CONFIG_PATH));
        assert_eq!(loader.schema_path(), Path::new(SCHEMA_PATH));
    }

    #[test]
    fn test_process_count_and_order() {
        let file = write_config(&document(
            r#"<ProcessInfo ProcessName="b" Priority="1" CpusList="0"/>
               <ProcessInfo ProcessName="a" Priority="2" CpusList="1"/>
               <ProcessInfo ProcessName="b" Priority="3" CpusList="0"/>"#,
            ONCE,
        ));
        let repo = loader_for(&file).load_specs().unwrap();
        let names: Vec<&str> = repo.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "b"]);
        assert_eq!(repo.processes()[2].priority, Priority::new(3));
    }

    #[test]
    fn test_cpu_lists() {
        let file = write_config(&document(
            r#"<ProcessInfo ProcessName="p" Priority="1" CpusList="0,2,5">
                 <ThreadInfo ThreadName="t" Priority="1" CpusList="3"/>
               </ProcessInfo>"#,
            ONCE,
        ));
        let repo = loader_for(&file).load_specs().unwrap();
        let process = &repo.processes()[0];
        assert_eq!(process.affinity.as_ref().unwrap().cores(), &[0, 2, 5]);
        assert_eq!(process.threads[0].affinity.as_ref().unwrap().cores(), &[3]);
    }

    #[test]
    fn test_empty_cpu_list_means_unchanged() {
        let file = write_config(&document(
            r#"<ProcessInfo ProcessName="p" Priority="1" CpusList=""/>"#,
            ONCE,
        ));
        let repo = loader_for(&file).load_specs().unwrap();
        assert!(repo.processes()[0].affinity.is_none());
    }

    #[test]
    fn test_native_flag_inverts_to_managed() {
        let file = write_config(&document(
            r#"<ProcessInfo ProcessName="native" Priority="1" CpusList="0" isNative="true">
                 <ThreadInfo ThreadName="t1" Priority="1" CpusList="0"/>
                 <ThreadInfo ThreadName="t2" Priority="1" CpusList="0"/>
               </ProcessInfo>
               <ProcessInfo ProcessName="vm" Priority="1" CpusList="0" isNative="false">
                 <ThreadInfo ThreadName="t" Priority="1" CpusList="0"/>
               </ProcessInfo>
               <ProcessInfo ProcessName="default" Priority="1" CpusList="0">
                 <ThreadInfo ThreadName="t" Priority="1" CpusList="0"/>
               </ProcessInfo>"#,
            ONCE,
        ));
        let repo = loader_for(&file).load_specs().unwrap();
        let processes = repo.processes();
        assert!(processes[0].threads.iter().all(|t| !t.is_managed()));
        assert!(processes[1].threads[0].is_managed());
        assert!(processes[2].threads[0].is_managed());
    }

    #[test]
    fn test_process_without_threads() {
        let file = write_config(&document(
            r#"<ProcessInfo ProcessName="p" Priority="-1" CpusList="1"/>"#,
            ONCE,
        ));
        let repo = loader_for(&file).load_specs().unwrap();
        assert!(repo.processes()[0].threads.is_empty());
        assert!(!repo.processes()[0].priority.is_set());
    }

    #[test]
    fn test_non_integer_priority_fails_whole_load() {
        let file = write_config(&document(
            r#"<ProcessInfo ProcessName="good" Priority="1" CpusList="0"/>
               <ProcessInfo ProcessName="bad" Priority="high" CpusList="0"/>"#,
            ONCE,
        ));
        let loader = loader_for(&file);
        match loader.load_specs() {
            Err(EngineError::SpecLoad { entry, .. }) => assert_eq!(entry, "ProcessInfo[1]"),
            other => panic!("expected spec load error, got {:?}", other),
        }
        assert!(!loader.load_specs_ok());
    }

    #[test]
    fn test_bad_thread_cpu_list_fails_load() {
        let file = write_config(&document(
            r#"<ProcessInfo ProcessName="p" Priority="1" CpusList="0">
                 <ThreadInfo ThreadName="t" Priority="1" CpusList="1,x"/>
               </ProcessInfo>"#,
            ONCE,
        ));
        let err = loader_for(&file).load_specs().unwrap_err();
        assert!(err.to_string().contains("ProcessInfo[0]/ThreadInfo[0]"), "{}", err);
    }

    #[test]
    fn test_operating_system_target() {
        let file = write_config(&document("", ONCE));
        assert_eq!(loader_for(&file).read_operating_system_target().unwrap(), "linux");

        let file = write_config(r#"<Applications><Scheduling Periodic="false"/></Applications>"#);
        assert!(loader_for(&file).read_operating_system_target().is_err());
    }

    #[test]
    fn test_one_shot_interval() {
        let file = write_config(&document("", ONCE));
        let loader = loader_for(&file);
        assert_eq!(loader.read_invocation_interval().unwrap(), None);
        assert_eq!(loader.invocation_interval_ms().unwrap(), 0);
    }

    #[test]
    fn test_periodic_interval() {
        let file = write_config(&document(
            "",
            r#"<Scheduling Periodic="TRUE" PeriodicTimeToWakeUp="500"/>"#,
        ));
        let loader = loader_for(&file);
        assert_eq!(
            loader.read_invocation_interval().unwrap(),
            Some(Duration::from_millis(500))
        );
        assert_eq!(loader.invocation_interval_ms().unwrap(), 500);
    }

    #[test]
    fn test_invalid_periodic_intervals() {
        for scheduling in [
            r#"<Scheduling Periodic="true"/>"#,
            r#"<Scheduling Periodic="true" PeriodicTimeToWakeUp="0"/>"#,
            r#"<Scheduling Periodic="true" PeriodicTimeToWakeUp="-5"/>"#,
            r#"<Scheduling Periodic="true" PeriodicTimeToWakeUp="soon"/>"#,
            r#"<Scheduling Periodic="yes" PeriodicTimeToWakeUp="500"/>"#,
            r#"<Scheduling Periodic="" PeriodicTimeToWakeUp="500"/>"#,
        ] {
            let file = write_config(&document("", scheduling));
            assert!(matches!(
                loader_for(&file).read_invocation_interval(),
                Err(EngineError::InvalidInterval(_))
            ));
        }
    }

    #[test]
    fn test_validate_schema() {
        let dir = tempdir().unwrap();
        let schema_path = dir.path().join("schema.json");
        std::fs::write(&schema_path, SCHEMA).unwrap();

        let good = write_config(&document(
            r#"<ProcessInfo ProcessName="p" Priority="1" CpusList="0"/>"#,
            ONCE,
        ));
        assert!(loader_for(&good).with_schema_path(&schema_path).validate_schema());

        let bad = write_config(&document(r#"<ProcessInfo ProcessName="p"/>"#, ONCE));
        assert!(!loader_for(&bad).with_schema_path(&schema_path).validate_schema());

        let no_schema = loader_for(&good).with_schema_path(dir.path().join("missing.json"));
        assert!(!no_schema.validate_schema());

        let missing_path = dir.path().join("missing.xml");
        let missing_config =
            ConfigLoader::new(Some(missing_path.as_path())).with_schema_path(&schema_path);
        assert!(!missing_config.validate_schema());
    }
}
