//! Error taxonomy for the harness.
//!
//! `Config` and `SessionState` are local contract violations: they are raised
//! before any external collaborator is contacted. Everything else originates
//! from a process, the analysis service, a clock, or a verification mismatch.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::session::diagnostics::Diagnostic;

pub type Result<T> = std::result::Result<T, HarnessError>;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("session state violation: {0}")]
    SessionState(#[from] SessionStateError),

    #[error("build failed: {reason}")]
    ExternalBuild {
        reason: String,
        /// `None` when the build never ran or was killed by a signal.
        exit_code: Option<i32>,
        diagnostic: Option<Diagnostic>,
    },

    #[error("analysis service failure: {reason}")]
    ExternalService {
        reason: String,
        diagnostic: Option<Diagnostic>,
    },

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: Operation, after: Duration },

    #[error(transparent)]
    Assertion(#[from] AssertionFailure),

    #[error("local I/O failed: {0:#}")]
    Io(#[source] anyhow::Error),
}

impl HarnessError {
    pub fn service(reason: impl Into<String>) -> Self {
        Self::ExternalService {
            reason: reason.into(),
            diagnostic: None,
        }
    }

    /// True for errors raised without contacting any external collaborator.
    pub fn is_local_contract_violation(&self) -> bool {
        matches!(self, Self::Config(_) | Self::SessionState(_))
    }

    pub fn diagnostic(&self) -> Option<Diagnostic> {
        match self {
            Self::ExternalBuild { diagnostic, .. } | Self::ExternalService { diagnostic, .. } => {
                *diagnostic
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("project key must not be empty")]
    EmptyProjectKey,

    #[error("project key segment {index} of `{key}` is empty")]
    EmptyKeySegment { key: String, index: usize },

    #[error("invalid analysis parameter `{key}`: {reason}")]
    InvalidParameter { key: String, reason: &'static str },

    #[error("missing setting `{0}`")]
    MissingSetting(String),

    #[error("malformed properties line {line}: `{content}`")]
    MalformedProperties { line: usize, content: String },

    #[error("malformed environment parameters: {0}")]
    MalformedEnvironment(String),

    #[error("unknown scenario `{0}`")]
    UnknownScenario(String),

    #[error("invalid version `{0}`, expected `major.minor[.patch]`")]
    InvalidVersion(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionStateError {
    #[error("a session is already active for project `{project_key}`")]
    AlreadyActive { project_key: String },

    #[error("session is {state}, `end` requires a completed build")]
    NotBuilt { state: &'static str },

    #[error("session is {state}, expected `began`")]
    NotBegun { state: &'static str },

    #[error("session is {state}, results are queryable only after a successful end")]
    NotQueryable { state: &'static str },
}

/// A blocking call that carries a caller-supplied timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Begin,
    Build,
    End,
    Settlement,
    Query,
    Provision,
    Help,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Begin => "begin",
            Operation::Build => "build",
            Operation::End => "end",
            Operation::Settlement => "settlement wait",
            Operation::Query => "query",
            Operation::Provision => "provisioning",
            Operation::Help => "help",
        };
        f.write_str(name)
    }
}

/// Verification mismatch. Fails the scenario, not the harness.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{subject}: expected {expected}, found {actual}")]
pub struct AssertionFailure {
    pub subject: String,
    pub expected: String,
    pub actual: String,
}

impl AssertionFailure {
    pub fn new(
        subject: impl Into<String>,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> Self {
        Self {
            subject: subject.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}
