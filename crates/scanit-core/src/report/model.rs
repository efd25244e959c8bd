use std::fmt;

use serde::{Deserialize, Serialize};

use crate::SCHEMA_VERSION;

/// Exit code when every scenario passed or was skipped.
pub const EXIT_PASSED: i32 = 0;
/// Exit code when at least one scenario failed or errored.
pub const EXIT_FAILED: i32 = 1;
/// Exit code when the harness could not start running scenarios.
pub const EXIT_HARNESS_ERROR: i32 = 2;

/// Top-level report of one harness run.
///
/// This is the stable JSON contract emitted by `scanit run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub schema_version: String,
    pub tool: ToolInfo,
    pub scenarios: Vec<ScenarioReport>,
    pub summary: Summary,
    pub exit_code: i32,
}

impl RunReport {
    /// Scenario order is kept as run.
    pub fn new(tool: ToolInfo, scenarios: Vec<ScenarioReport>) -> Self {
        let summary = Summary::of(&scenarios);
        let exit_code = if summary.passed + summary.skipped == scenarios.len() {
            EXIT_PASSED
        } else {
            EXIT_FAILED
        };
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            tool,
            scenarios,
            summary,
            exit_code,
        }
    }
}

/// Tool metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
    pub commit: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub skipped: usize,
}

impl Summary {
    fn of(scenarios: &[ScenarioReport]) -> Self {
        let mut summary = Self::default();
        for scenario in scenarios {
            match scenario.verdict {
                Verdict::Passed => summary.passed += 1,
                Verdict::Failed => summary.failed += 1,
                Verdict::Errored => summary.errored += 1,
                Verdict::Skipped => summary.skipped += 1,
            }
        }
        summary
    }
}

/// Staged project used as build input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureInfo {
    pub name: String,
    pub files: usize,
    pub digest: FixtureDigest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureDigest {
    pub algorithm: String,
    pub value: String,
}

/// `Failed` covers assertion mismatches and unexpected build or service
/// failures. `Errored` means the harness itself could not carry the
/// scenario through (timeouts, local I/O, contract violations).
/// `Skipped` scenarios had an unmet precondition and never ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Passed,
    Failed,
    Errored,
    Skipped,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Verdict::Passed => "PASSED",
            Verdict::Failed => "FAILED",
            Verdict::Errored => "ERRORED",
            Verdict::Skipped => "SKIPPED",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    pub project_key: Option<String>,
    pub fixture: Option<FixtureInfo>,
    pub verdict: Verdict,
    /// Final session state, e.g. `ended(success)`. `None` for help mode.
    pub session_state: Option<String>,
    /// Diagnostics recognised in the scanner output, in catalog order.
    pub diagnostics: Vec<String>,
    pub failures: Vec<String>,
    pub error: Option<String>,
    pub skip_reason: Option<String>,
}

impl ScenarioReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            project_key: None,
            fixture: None,
            verdict: Verdict::Passed,
            session_state: None,
            diagnostics: vec![],
            failures: vec![],
            error: None,
            skip_reason: None,
        }
    }

    pub fn fail(&mut self, failure: impl Into<String>) {
        self.failures.push(failure.into());
        if self.verdict == Verdict::Passed {
            self.verdict = Verdict::Failed;
        }
    }

    pub fn error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.verdict = Verdict::Errored;
    }

    pub fn skip(&mut self, reason: impl Into<String>) {
        self.skip_reason = Some(reason.into());
        self.verdict = Verdict::Skipped;
    }

    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Passed
    }
}
