//! Drives the begin → build → end protocol for one session at a time.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::{AnalysisParam, BeginConfig, EndConfig};
use super::diagnostics::{self, Diagnostic};
use super::state::{AnalysisSession, CorrelationToken, EndOutcome, SessionRegistry, SessionState};
use crate::error::{HarnessError, Operation, Result, SessionStateError};
use crate::exec::{BuildOutcome, CommandOutput, CommandRunner, CommandSpec, ProcessError};
use crate::model::ProjectKey;
use crate::service::{AnalysisService, TaskState};
use crate::settings::Settings;

pub const HOST_URL: &str = "sonar.host.url";
pub const LOGIN: &str = "sonar.login";
pub const PASSWORD: &str = "sonar.password";

/// Caller-supplied bounds for every blocking call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Registration checks plus the `begin` command.
    pub begin: Duration,
    pub build: Duration,
    /// The `end` command plus waiting for the service to settle.
    pub end: Duration,
    pub query: Duration,
    pub poll_interval: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            begin: Duration::from_secs(300),
            build: Duration::from_secs(600),
            end: Duration::from_secs(600),
            query: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Location of the scanner executable, the connection flags it needs and
/// the analysis properties passed to every `begin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerCommand {
    pub program: PathBuf,
    pub host_url: Option<String>,
    pub login: Option<String>,
    pub password: Option<String>,
    pub properties: Vec<AnalysisParam>,
}

impl ScannerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            host_url: None,
            login: None,
            password: None,
            properties: Vec::new(),
        }
    }

    /// Connection flags plus every other resolved setting, forwarded to
    /// `begin` as `/d:` parameters.
    pub fn from_settings(program: impl Into<PathBuf>, settings: &Settings) -> Self {
        let properties = settings
            .resolved()
            .into_iter()
            .filter(|(key, _)| ![HOST_URL, LOGIN, PASSWORD].contains(key))
            .map(|(key, value)| AnalysisParam::new(key, value))
            .collect();
        Self {
            program: program.into(),
            host_url: settings.try_get(HOST_URL).map(str::to_string),
            login: settings.try_get(LOGIN).map(str::to_string),
            password: settings.try_get(PASSWORD).map(str::to_string),
            properties,
        }
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.push(AnalysisParam::new(key, value));
        self
    }

    fn credentials(&self) -> Vec<AnalysisParam> {
        let mut params = Vec::new();
        if let Some(login) = &self.login {
            params.push(AnalysisParam::new(LOGIN, login));
        }
        if let Some(password) = &self.password {
            params.push(AnalysisParam::new(PASSWORD, password));
        }
        params
    }

    fn begin_connection(&self) -> Vec<AnalysisParam> {
        let mut params = Vec::new();
        if let Some(url) = &self.host_url {
            params.push(AnalysisParam::new(HOST_URL, url));
        }
        params.extend(self.credentials());
        params.extend(self.properties.iter().cloned());
        params
    }

    fn spec(&self, working_dir: Option<&Path>, args: Vec<String>) -> CommandSpec {
        let spec = CommandSpec::new(&self.program).args(args);
        match working_dir {
            Some(dir) => spec.working_dir(dir),
            None => spec,
        }
    }
}

/// Result of a successful `begin`.
#[derive(Debug, Clone)]
pub struct BeginReport {
    pub token: CorrelationToken,
    pub output: CommandOutput,
}

/// Terminal outcome of `end` with the scanner's captured output.
#[derive(Debug, Clone)]
pub struct EndReport {
    pub outcome: EndOutcome,
    pub output: CommandOutput,
}

impl EndReport {
    /// Converts a failure outcome into `ExternalService` for callers that
    /// did not expect one.
    pub fn into_result(self) -> Result<Self> {
        match &self.outcome {
            EndOutcome::Success => Ok(self),
            EndOutcome::Failure { reason, diagnostic } => Err(HarnessError::ExternalService {
                reason: reason.clone(),
                diagnostic: *diagnostic,
            }),
        }
    }
}

pub struct SessionController {
    runner: Arc<dyn CommandRunner>,
    service: Arc<dyn AnalysisService>,
    scanner: ScannerCommand,
    registry: SessionRegistry,
    timeouts: Timeouts,
}

impl SessionController {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        service: Arc<dyn AnalysisService>,
        scanner: ScannerCommand,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            runner,
            service,
            scanner,
            registry: SessionRegistry::new(),
            timeouts,
        }
    }

    /// Shares a registry with other controllers driving the same service.
    pub fn with_registry(mut self, registry: SessionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Registers the session with the service and runs the `begin` command.
    ///
    /// Config and state violations fail before anything external is
    /// contacted.
    pub async fn begin(
        &self,
        session: &mut AnalysisSession,
        config: BeginConfig,
    ) -> Result<BeginReport> {
        if !session.state().accepts_begin() {
            let project_key = session
                .state()
                .key()
                .map(ProjectKey::to_string)
                .unwrap_or_default();
            return Err(SessionStateError::AlreadyActive { project_key }.into());
        }

        let key = match config.validate() {
            Ok(key) => key,
            Err(err) => {
                session.reject(Some(config), err.to_string());
                return Err(err.into());
            }
        };
        let lease = self.registry.claim(&key)?;
        let deadline = Instant::now() + self.timeouts.begin;

        let baseline_task = match self.check_registration(&key, deadline).await {
            Ok(baseline) => baseline,
            Err(err) => {
                session.reject(Some(config), err.to_string());
                return Err(err);
            }
        };

        let args = config.to_args(&key, &self.scanner.begin_connection());
        let spec = self.scanner.spec(Some(session.working_dir()), args);
        let output = match self.run_scanner(&spec, Operation::Begin, deadline).await {
            Ok(output) => output,
            Err(err) => {
                session.reject(Some(config), err.to_string());
                return Err(err);
            }
        };

        if !output.success() {
            let err = HarnessError::ExternalService {
                reason: format!("begin {}", output.termination()),
                diagnostic: diagnostics::failure_reason(&output.logs()),
            };
            warn!(project_key = %key, error = %err, "begin rejected");
            session.reject(Some(config), err.to_string());
            return Err(err);
        }

        let token = CorrelationToken {
            session_id: Uuid::new_v4(),
            baseline_task,
        };
        info!(project_key = %key, session = %token.session_id, "session began");
        session.start(config, lease, token.clone());
        Ok(BeginReport { token, output })
    }

    /// Records that the external build terminated, whatever its exit code.
    pub fn mark_built(&self, session: &mut AnalysisSession, build: &BuildOutcome) -> Result<()> {
        session.mark_built(build.output.exit_code)?;
        debug!(state = %session.state(), exit_code = ?build.output.exit_code, "build recorded");
        Ok(())
    }

    /// Runs `end` and, on success, blocks until the service has settled the
    /// submitted analysis.
    pub async fn end(
        &self,
        session: &mut AnalysisSession,
        config: EndConfig,
    ) -> Result<EndReport> {
        let (key, token) = session.built_token()?;
        config.validate()?;
        let deadline = Instant::now() + self.timeouts.end;

        let args = config.to_args(&self.scanner.credentials());
        let spec = self.scanner.spec(Some(session.working_dir()), args);
        let output = match self.run_scanner(&spec, Operation::End, deadline).await {
            Ok(output) => output,
            Err(err) => {
                session.finish(failure(err.to_string(), None));
                return Err(err);
            }
        };

        if !output.success() {
            let diagnostic = diagnostics::failure_reason(&output.logs());
            let reason = format!("end {}", output.termination());
            warn!(project_key = %key, session = %token.session_id, ?diagnostic, "end failed");
            let outcome = failure(reason, diagnostic);
            session.finish(outcome.clone());
            return Ok(EndReport { outcome, output });
        }

        let outcome = match self.settle(&key, &token, deadline).await {
            Ok(outcome) => outcome,
            Err(err) => {
                session.finish(failure(err.to_string(), None));
                return Err(err);
            }
        };
        info!(
            project_key = %key,
            session = %token.session_id,
            success = outcome.is_success(),
            "session ended"
        );
        session.finish(outcome.clone());
        Ok(EndReport { outcome, output })
    }

    /// Gives up on a began or built session and frees its key.
    pub fn abandon(&self, session: &mut AnalysisSession, reason: &str) {
        if matches!(session.state(), SessionState::Began { .. } | SessionState::Built { .. }) {
            warn!(state = %session.state(), reason, "abandoning session");
            session.finish(failure(format!("abandoned: {reason}"), None));
        }
    }

    /// Runs the stateless usage command; it must exit 0 and print the
    /// usage banner.
    pub async fn help(&self, working_dir: Option<&Path>) -> Result<CommandOutput> {
        let spec = self.scanner.spec(working_dir, vec!["/?".to_string()]);
        let deadline = Instant::now() + self.timeouts.begin;
        let output = self.run_scanner(&spec, Operation::Help, deadline).await?;

        if !output.success() {
            return Err(HarnessError::service(format!("usage command {}", output.termination())));
        }
        if !Diagnostic::UsageBanner.is_present_in(&output.logs()) {
            return Err(HarnessError::service("usage command printed no usage banner"));
        }
        Ok(output)
    }

    /// The project must exist and have at least one profile bound. Returns
    /// the latest background task id as the settlement baseline.
    async fn check_registration(
        &self,
        key: &ProjectKey,
        deadline: Instant,
    ) -> Result<Option<String>> {
        let budget = self.timeouts.begin;
        let exists =
            bounded(Operation::Begin, deadline, budget, self.service.project_exists(key)).await?;
        if !exists {
            return Err(HarnessError::service(format!("project `{key}` is not provisioned")));
        }

        let bindings =
            bounded(Operation::Begin, deadline, budget, self.service.profile_bindings(key)).await?;
        if bindings.is_empty() {
            return Err(HarnessError::service(format!(
                "project `{key}` has no quality profile bound"
            )));
        }

        let status =
            bounded(Operation::Begin, deadline, budget, self.service.task_status(key)).await?;
        Ok(status.current.map(|task| task.id))
    }

    async fn run_scanner(
        &self,
        spec: &CommandSpec,
        operation: Operation,
        deadline: Instant,
    ) -> Result<CommandOutput> {
        debug!(command = %spec.display(), %operation, "running scanner");
        let remaining = deadline.saturating_duration_since(Instant::now());
        self.runner
            .run(spec, remaining)
            .await
            .map_err(|err| match err {
                ProcessError::Timeout(_) => HarnessError::Timeout {
                    operation,
                    after: self.budget(operation),
                },
                other => {
                    HarnessError::service(format!("{operation} could not run the scanner: {other}"))
                }
            })
    }

    async fn settle(
        &self,
        key: &ProjectKey,
        token: &CorrelationToken,
        deadline: Instant,
    ) -> Result<EndOutcome> {
        let budget = self.timeouts.end;
        loop {
            let status =
                bounded(Operation::Settlement, deadline, budget, self.service.task_status(key))
                    .await?;

            let fresh = status
                .current
                .filter(|task| Some(&task.id) != token.baseline_task.as_ref());
            if status.queued == 0 {
                if let Some(task) = fresh {
                    match task.state {
                        TaskState::Success => return Ok(EndOutcome::Success),
                        TaskState::Failed | TaskState::Canceled => {
                            return Ok(failure(
                                format!("background task {} finished {}", task.id, task.state),
                                None,
                            ));
                        }
                        TaskState::Pending | TaskState::InProgress => {}
                    }
                }
            }

            if Instant::now() + self.timeouts.poll_interval >= deadline {
                return Err(HarnessError::Timeout {
                    operation: Operation::Settlement,
                    after: self.timeouts.end,
                });
            }
            sleep(self.timeouts.poll_interval).await;
        }
    }

    fn budget(&self, operation: Operation) -> Duration {
        match operation {
            Operation::Begin | Operation::Help => self.timeouts.begin,
            Operation::End | Operation::Settlement => self.timeouts.end,
            Operation::Build => self.timeouts.build,
            Operation::Query | Operation::Provision => self.timeouts.query,
        }
    }
}

fn failure(reason: String, diagnostic: Option<Diagnostic>) -> EndOutcome {
    EndOutcome::Failure { reason, diagnostic }
}

async fn bounded<T>(
    operation: Operation,
    deadline: Instant,
    budget: Duration,
    call: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    timeout_at(deadline, call)
        .await
        .map_err(|_| HarnessError::Timeout {
            operation,
            after: budget,
        })?
}
