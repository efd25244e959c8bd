pub mod error;
pub mod exec;
pub mod fixture;
pub mod model;
pub mod report;
pub mod scenario;
pub mod service;
pub mod session;
pub mod settings;
pub mod verify;

pub use error::{HarnessError, Result};

pub const TOOL_NAME: &str = "scanit";

/// JSON schema version of run reports.
/// This must be bumped only when the report layout changes semantically.
pub const SCHEMA_VERSION: &str = "0.1.0";
