//! Configuration module for the affinity engine
//!
//! Provides CLI settings, the XML configuration document, its structural
//! schema, and the loader that turns a document into process specifications.

pub mod document;
mod loader;
pub mod schema;
mod settings;

pub use loader::*;
pub use settings::*;
