use serde::{Deserialize, Serialize};

use crate::exec::BuildRequest;
use crate::model::{ProjectKey, QualityProfileBinding, ServiceVersion};
use crate::service::CustomRule;
use crate::session::{BeginConfig, EndConfig};
use crate::verify::Expectation;

/// A named, self-contained verification run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub description: String,
    /// Directory under the fixtures root staged as build input.
    pub fixture: String,
    /// Checked before anything is staged; an unmet one skips the scenario.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preconditions: Vec<Precondition>,
    pub mode: Mode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "requires", rename_all = "snake_case")]
pub enum Precondition {
    MinServiceVersion { version: ServiceVersion },
    /// No released scanner version is configured; the scanner is a local
    /// build.
    LocalScannerBuild,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Mode {
    /// Only the usage command, outside any session.
    Help,
    Session(Box<SessionPlan>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPlan {
    pub provisioning: Provisioning,
    pub begin: BeginConfig,
    pub build: BuildRequest,
    pub end: EndConfig,
    pub outcome: ExpectedOutcome,
}

/// Service state established before `begin`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provisioning {
    pub project_key: ProjectKey,
    pub project_name: String,
    /// Profile backup files, relative to the fixtures root.
    pub profiles: Vec<String>,
    pub bindings: Vec<QualityProfileBinding>,
    pub rules: Vec<CustomRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExpectedOutcome {
    Success {
        /// Phrases the `begin` output must contain.
        begin_logs: Vec<String>,
        /// Checked only once the session ended successfully.
        checks: Vec<Expectation>,
    },
    /// `end` must fail; this is a valid scenario result.
    Failure {
        end_logs: Vec<String>,
        /// Checks of what the failed session left behind.
        checks: Vec<Expectation>,
    },
}

impl ExpectedOutcome {
    pub fn expects_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn checks(&self) -> &[Expectation] {
        match self {
            Self::Success { checks, .. } | Self::Failure { checks, .. } => checks,
        }
    }
}

impl Scenario {
    pub fn help(
        name: impl Into<String>,
        description: impl Into<String>,
        fixture: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            fixture: fixture.into(),
            preconditions: Vec::new(),
            mode: Mode::Help,
        }
    }

    pub fn session(
        name: impl Into<String>,
        description: impl Into<String>,
        fixture: impl Into<String>,
        plan: SessionPlan,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            fixture: fixture.into(),
            preconditions: Vec::new(),
            mode: Mode::Session(Box::new(plan)),
        }
    }

    pub fn requires(mut self, precondition: Precondition) -> Self {
        self.preconditions.push(precondition);
        self
    }

    pub fn project_key(&self) -> Option<&ProjectKey> {
        match &self.mode {
            Mode::Help => None,
            Mode::Session(plan) => Some(&plan.provisioning.project_key),
        }
    }
}
