//! # Affinity Engine - Declarative CPU Pinning and Priority
//!
//! Affinity Engine applies CPU affinity and scheduling priority to named,
//! already-running processes and their threads. The desired policy is read
//! from an XML configuration document, validated against a structural
//! schema, and applied once or re-applied on a fixed interval.
//!
//! ## Features
//!
//! - **Schema Validation**: Documents are checked structurally before use
//! - **Process and Thread Policy**: Affinity and priority per process and per thread
//! - **Managed Threads**: Threads of managed runtimes are matched by truncated name
//! - **Periodic Re-application**: Fixed-interval passes with clean shutdown
//! - **Failure Isolation**: One unreachable process never stops the others
//! - **Dry Run**: Log what would be applied without touching the OS
//!
//! ## Quick Start
//!
//! ```no_run
//! use affinity_engine::bootstrap::Bootstrap;
//! use affinity_engine::config::ConfigLoader;
//! use affinity_engine::control::DryRunControl;
//!
//! let loader = ConfigLoader::new(None);
//! assert!(loader.validate_schema());
//!
//! let handle = Bootstrap::new(loader).start(DryRunControl::new()).unwrap();
//! let summary = handle.join().unwrap();
//! println!("Applied {} pass(es)", summary.passes);
//! ```
//!
//! ## Driving a Single Pass
//!
//! ```
//! use affinity_engine::control::DryRunControl;
//! use affinity_engine::model::{ConfigRepository, CpuSet, Priority, ProcessSpec};
//! use affinity_engine::scheduler::SchedulerLoop;
//! use std::sync::Arc;
//!
//! let repository = ConfigRepository::new(vec![ProcessSpec::new(
//!     "nginx",
//!     Priority::new(5),
//!     CpuSet::parse_list("0,1").unwrap(),
//! )]);
//!
//! let mut scheduler = SchedulerLoop::new(Arc::new(repository), DryRunControl::new(), None);
//! let report = scheduler.run_pass();
//! assert_eq!(report.attempted, 2);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bootstrap;
pub mod config;
pub mod control;
pub mod error;
pub mod model;
pub mod scheduler;

// Re-export commonly used types
pub use bootstrap::Bootstrap;
pub use config::ConfigLoader;
pub use control::AffinityControl;
pub use error::{EngineError, Result};
pub use model::{ConfigRepository, CpuSet, Priority, ProcessSpec, ThreadSpec};
pub use scheduler::{SchedulerHandle, SchedulerLoop};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
