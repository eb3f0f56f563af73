//! Ordered, read-only collection of process specifications

use super::ProcessSpec;

/// All process specifications loaded from one configuration document
///
/// Built once by the loader and then only read. Entries with the same
/// process name are kept and applied independently, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigRepository {
    processes: Vec<ProcessSpec>,
}

impl ConfigRepository {
    /// Create a repository from processes in document order
    pub fn new(processes: Vec<ProcessSpec>) -> Self {
        Self { processes }
    }

    /// Processes in document order
    pub fn processes(&self) -> &[ProcessSpec] {
        &self.processes
    }

    /// Iterate processes in document order
    pub fn iter(&self) -> std::slice::Iter<'_, ProcessSpec> {
        self.processes.iter()
    }

    /// Number of process entries
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    /// True if no process entries were loaded
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Total threads across all processes
    pub fn thread_count(&self) -> usize {
        self.processes.iter().map(|p| p.threads.len()).sum()
    }

    /// Number of control calls one pass will issue
    pub fn planned_calls(&self) -> usize {
        self.processes.iter().map(ProcessSpec::planned_calls).sum()
    }
}

impl<'a> IntoIterator for &'a ConfigRepository {
    type Item = &'a ProcessSpec;
    type IntoIter = std::slice::Iter<'a, ProcessSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<ProcessSpec> for ConfigRepository {
    fn from_iter<I: IntoIterator<Item = ProcessSpec>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
