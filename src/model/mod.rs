//! Scheduling policy data model
//!
//! Plain data describing the desired priority and affinity of processes and
//! their threads, plus the immutable repository the scheduler reads.

mod repository;
mod spec;

pub use repository::*;
pub use spec::*;
