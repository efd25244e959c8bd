use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::process::{CommandOutput, CommandRunner, CommandSpec, ProcessError};
use crate::error::{HarnessError, Operation, Result};
use crate::session::diagnostics;

/// Build property that makes every project opt out of analysis.
pub const EXCLUDE_FROM_ANALYSIS: &str = "ExcludeProjectsFromAnalysis";

/// Target plus `key=value` properties handed to the native build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub target: String,
    pub properties: BTreeMap<String, String>,
}

impl BuildRequest {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn rebuild() -> Self {
        Self::new("Rebuild")
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn exclude_all_projects(self) -> Self {
        self.property(EXCLUDE_FROM_ANALYSIS, "true")
    }

    /// `/t:<target>` then `/p:<key>=<value>` in key order.
    pub fn to_args(&self) -> Vec<String> {
        std::iter::once(format!("/t:{}", self.target))
            .chain(
                self.properties
                    .iter()
                    .map(|(k, v)| format!("/p:{k}={v}")),
            )
            .collect()
    }
}

/// How a build terminated. Non-zero exits are outcomes, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub output: CommandOutput,
}

impl BuildOutcome {
    pub fn success(&self) -> bool {
        self.output.success()
    }

    /// Converts a failed build into `ExternalBuild` for callers that did
    /// not expect it.
    pub fn into_result(self) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(HarnessError::ExternalBuild {
                reason: self.output.termination(),
                exit_code: self.output.exit_code,
                diagnostic: diagnostics::failure_reason(&self.output.logs()),
            })
        }
    }
}

/// Runs the native build tool against a staged project directory.
pub struct BuildInvoker<'a> {
    runner: &'a dyn CommandRunner,
    program: PathBuf,
}

impl<'a> BuildInvoker<'a> {
    pub fn new(runner: &'a dyn CommandRunner, program: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    pub async fn run(
        &self,
        project_dir: &Path,
        request: &BuildRequest,
        timeout: Duration,
    ) -> Result<BuildOutcome> {
        let spec = CommandSpec::new(&self.program)
            .args(request.to_args())
            .working_dir(project_dir);
        info!(command = %spec.display(), "running build");

        let output = self
            .runner
            .run(&spec, timeout)
            .await
            .map_err(|err| match err {
                ProcessError::Timeout(after) => HarnessError::Timeout {
                    operation: Operation::Build,
                    after,
                },
                other => {
                    warn!(error = %other, "build could not be executed");
                    HarnessError::ExternalBuild {
                        reason: other.to_string(),
                        exit_code: None,
                        diagnostic: None,
                    }
                }
            })?;

        if !output.success() {
            warn!(exit_code = ?output.exit_code, "build exited unsuccessfully");
        }
        Ok(BuildOutcome { output })
    }
}
