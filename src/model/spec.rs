//! Process and thread scheduling specifications

use std::fmt;

/// Scheduling priority with a sentinel for "leave unchanged"
///
/// The numeric range is interpreted by the control collaborator; the model
/// only knows about the `-1` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Priority(i32);

impl Priority {
    /// Sentinel value meaning the priority is not managed
    pub const UNCHANGED: Priority = Priority(-1);

    /// Wrap a raw priority value
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    /// Raw priority value
    pub const fn value(self) -> i32 {
        self.0
    }

    /// True unless this is the `-1` sentinel
    pub const fn is_set(self) -> bool {
        self.0 != Self::UNCHANGED.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::UNCHANGED
    }
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Non-empty set of CPU core indices, kept in document order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuSet(Vec<usize>);

impl CpuSet {
    /// Build a set from core indices, rejecting empty input and duplicates
    pub fn new(cores: Vec<usize>) -> Result<Self, String> {
        if cores.is_empty() {
            return Err("CPU set must not be empty".to_string());
        }
        for (i, core) in cores.iter().enumerate() {
            if cores[..i].contains(core) {
                return Err(format!("Duplicate CPU index: {}", core));
            }
        }
        Ok(Self(cores))
    }

    /// Parse a comma-separated CPU list (e.g., "0,2,5")
    ///
    /// An empty or whitespace-only string yields `None`, meaning affinity
    /// is left unchanged. Any token that is not a non-negative integer is
    /// an error, including empty tokens such as in "0,,1".
    pub fn parse_list(list: &str) -> Result<Option<Self>, String> {
        let list = list.trim();
        if list.is_empty() {
            return Ok(None);
        }

        let cores = list
            .split(',')
            .map(|token| {
                let token = token.trim();
                token
                    .parse::<usize>()
                    .map_err(|_| format!("Invalid CPU index: '{}'", token))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(cores).map(Some)
    }

    /// Core indices in insertion order
    pub fn cores(&self) -> &[usize] {
        &self.0
    }

    /// Number of cores in the set
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Highest core index in the set
    pub fn max_core(&self) -> usize {
        self.0.iter().copied().max().unwrap_or(0)
    }
}

impl fmt::Display for CpuSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        write!(f, "{{{}}}", parts.join(","))
    }
}

/// Desired scheduling of one thread inside a process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSpec {
    name: String,
    is_managed: bool,
    /// Priority to apply
    pub priority: Priority,
    /// Cores to pin to, `None` leaves affinity unchanged
    pub affinity: Option<CpuSet>,
}

impl ThreadSpec {
    /// Create a thread spec
    pub fn new(
        name: impl Into<String>,
        is_managed: bool,
        priority: Priority,
        affinity: Option<CpuSet>,
    ) -> Self {
        Self {
            name: name.into(),
            is_managed,
            priority,
            affinity,
        }
    }

    /// Thread name, scoped to its owning process
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True for threads scheduled by a managed runtime rather than raw OS threads
    pub fn is_managed(&self) -> bool {
        self.is_managed
    }
}

/// Desired scheduling of one process and its threads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    /// Process name used to look it up
    pub name: String,
    /// Priority to apply
    pub priority: Priority,
    /// Cores to pin to, `None` leaves affinity unchanged
    pub affinity: Option<CpuSet>,
    /// Threads in document order
    pub threads: Vec<ThreadSpec>,
}

impl ProcessSpec {
    /// Create a process spec with no threads
    pub fn new(name: impl Into<String>, priority: Priority, affinity: Option<CpuSet>) -> Self {
        Self {
            name: name.into(),
            priority,
            affinity,
            threads: Vec::new(),
        }
    }

    /// Append a thread spec
    pub fn add_thread(&mut self, thread: ThreadSpec) {
        self.threads.push(thread);
    }

    /// Builder-style thread append
    pub fn with_thread(mut self, thread: ThreadSpec) -> Self {
        self.add_thread(thread);
        self
    }

    /// Number of control calls one pass will issue for this process
    pub fn planned_calls(&self) -> usize {
        let own = usize::from(self.priority.is_set()) + usize::from(self.affinity.is_some());
        let threads: usize = self
            .threads
            .iter()
            .map(|t| usize::from(t.priority.is_set()) + usize::from(t.affinity.is_some()))
            .sum();
        own + threads
    }
}
