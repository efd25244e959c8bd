use std::fs;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{Instrument, info, info_span, warn};

use super::model::{ExpectedOutcome, Mode, Precondition, Provisioning, Scenario, SessionPlan};
use crate::error::{AssertionFailure, HarnessError, Operation, Result};
use crate::exec::{BuildInvoker, CommandRunner};
use crate::fixture::ProjectFixture;
use crate::report::model::{RunReport, ScenarioReport, ToolInfo};
use crate::service::AnalysisService;
use crate::session::{AnalysisSession, EndOutcome, SessionController, diagnostics};
use crate::verify::{Expectation, ResultVerifier};

/// Composes provisioning, the session protocol, the build and verification
/// into one pass per scenario.
pub struct ScenarioRunner {
    controller: SessionController,
    service: Arc<dyn AnalysisService>,
    builds: Arc<dyn CommandRunner>,
    msbuild: PathBuf,
    fixtures: PathBuf,
    /// Released scanner version under test; `None` for a local build.
    scanner_version: Option<String>,
}

impl ScenarioRunner {
    pub fn new(
        controller: SessionController,
        service: Arc<dyn AnalysisService>,
        builds: Arc<dyn CommandRunner>,
        msbuild: impl Into<PathBuf>,
        fixtures: impl Into<PathBuf>,
    ) -> Self {
        Self {
            controller,
            service,
            builds,
            msbuild: msbuild.into(),
            fixtures: fixtures.into(),
            scanner_version: None,
        }
    }

    pub fn scanner_version(mut self, version: Option<String>) -> Self {
        self.scanner_version = version;
        self
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    /// Runs scenarios one after another. They share one service instance
    /// and reuse project keys, so they never overlap.
    pub async fn run_all(&self, scenarios: &[Scenario], tool: ToolInfo) -> RunReport {
        let mut reports = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            reports.push(self.run(scenario).await);
        }
        RunReport::new(tool, reports)
    }

    /// Never fails: every error is folded into the scenario's verdict.
    pub async fn run(&self, scenario: &Scenario) -> ScenarioReport {
        let span = info_span!("scenario", name = %scenario.name);
        async {
            let mut report = ScenarioReport::new(&scenario.name);
            report.project_key = scenario.project_key().map(ToString::to_string);
            info!(fixture = %scenario.fixture, "scenario started");

            match self.unmet_precondition(scenario).await {
                Ok(Some(reason)) => {
                    info!(%reason, "scenario skipped");
                    report.skip(reason);
                }
                Ok(None) => {
                    if let Err(err) = self.execute(scenario, &mut report).await {
                        classify(&mut report, err);
                    }
                }
                Err(err) => classify(&mut report, err),
            }
            info!(verdict = %report.verdict, failures = report.failures.len(), "scenario finished");
            report
        }
        .instrument(span)
        .await
    }

    /// The first precondition the environment does not meet, as a skip
    /// reason.
    async fn unmet_precondition(&self, scenario: &Scenario) -> Result<Option<String>> {
        for precondition in &scenario.preconditions {
            match precondition {
                Precondition::MinServiceVersion { version } => {
                    let budget = self.controller.timeouts().query;
                    let actual =
                        bounded(Operation::Query, budget, self.service.service_version()).await?;
                    if actual < *version {
                        return Ok(Some(format!(
                            "requires service {version} or newer, found {actual}"
                        )));
                    }
                }
                Precondition::LocalScannerBuild => {
                    if let Some(released) = &self.scanner_version {
                        return Ok(Some(format!(
                            "requires a local scanner build, found release {released}"
                        )));
                    }
                }
            }
        }
        Ok(None)
    }

    async fn execute(&self, scenario: &Scenario, report: &mut ScenarioReport) -> Result<()> {
        let fixture = ProjectFixture::stage(&self.fixtures, &scenario.fixture)?;
        report.fixture = Some(fixture.info());

        match &scenario.mode {
            Mode::Help => {
                let output = self.controller.help(Some(fixture.path())).await?;
                record_diagnostics(report, &output.logs());
                Ok(())
            }
            Mode::Session(plan) => {
                self.provision(&plan.provisioning).await?;
                let mut session = AnalysisSession::new(fixture.path());
                let result = self.drive(plan, &mut session, report).await;
                report.session_state = Some(session.state().name().to_string());
                result
            }
        }
    }

    /// Resets the project, then restores profiles, creates custom rules and
    /// binds every language before `begin` may run.
    async fn provision(&self, provisioning: &Provisioning) -> Result<()> {
        let key = &provisioning.project_key;
        let budget = self.controller.timeouts().query;
        let service = self.service.as_ref();

        bounded(Operation::Provision, budget, service.delete_project(key)).await?;
        for rule in &provisioning.rules {
            bounded(Operation::Provision, budget, service.create_rule(rule)).await?;
        }
        for profile in &provisioning.profiles {
            let path = self.fixtures.join(profile);
            let descriptor = fs::read_to_string(&path)
                .with_context(|| format!("failed to read profile: {}", path.display()))
                .map_err(HarnessError::Io)?;
            bounded(Operation::Provision, budget, service.restore_profile(&descriptor)).await?;
        }
        let create = service.create_project(key, &provisioning.project_name);
        bounded(Operation::Provision, budget, create).await?;
        for binding in &provisioning.bindings {
            bounded(Operation::Provision, budget, service.bind_profile(key, binding)).await?;
        }

        info!(
            project_key = %key,
            profiles = provisioning.profiles.len(),
            rules = provisioning.rules.len(),
            "project provisioned"
        );
        Ok(())
    }

    async fn drive(
        &self,
        plan: &SessionPlan,
        session: &mut AnalysisSession,
        report: &mut ScenarioReport,
    ) -> Result<()> {
        let began = self.controller.begin(session, plan.begin.clone()).await?;
        let logs = began.output.logs();
        record_diagnostics(report, &logs);
        if let ExpectedOutcome::Success { begin_logs, .. } = &plan.outcome {
            expect_phrases(report, "begin output", begin_logs, &logs);
        }

        let invoker = BuildInvoker::new(self.builds.as_ref(), &self.msbuild);
        let build = match invoker
            .run(session.working_dir(), &plan.build, self.controller.timeouts().build)
            .await
        {
            Ok(build) => build,
            Err(err) => {
                self.controller.abandon(session, &err.to_string());
                return Err(err);
            }
        };
        self.controller.mark_built(session, &build)?;

        // A failed build only counts as a scenario result when `end` is
        // expected to fail anyway.
        if plan.outcome.expects_success() && !build.success() {
            self.controller.abandon(session, "build failed");
            build.into_result()?;
        }

        let ended = self.controller.end(session, plan.end.clone()).await?;
        let logs = ended.output.logs();
        record_diagnostics(report, &logs);
        let budget = self.controller.timeouts().query;

        match (&plan.outcome, &ended.outcome) {
            (ExpectedOutcome::Success { checks, .. }, EndOutcome::Success) => {
                let verifier = ResultVerifier::for_session(self.service.as_ref(), session, budget)?;
                verify(&verifier, checks, report).await
            }
            (ExpectedOutcome::Success { .. }, EndOutcome::Failure { reason, diagnostic }) => {
                Err(HarnessError::ExternalService {
                    reason: reason.clone(),
                    diagnostic: *diagnostic,
                })
            }
            (ExpectedOutcome::Failure { end_logs, checks }, EndOutcome::Failure { reason, .. }) => {
                info!(reason = %reason, "end failed as expected");
                expect_phrases(report, "end output", end_logs, &logs);
                let verifier = ResultVerifier::new(self.service.as_ref(), budget);
                verify(&verifier, checks, report).await
            }
            (ExpectedOutcome::Failure { .. }, EndOutcome::Success) => {
                Err(AssertionFailure::new("end outcome", "failure", "success").into())
            }
        }
    }
}

async fn verify(
    verifier: &ResultVerifier<'_>,
    checks: &[Expectation],
    report: &mut ScenarioReport,
) -> Result<()> {
    for failure in verifier.check_all(checks).await? {
        warn!(%failure, "expectation not met");
        report.fail(failure.to_string());
    }
    Ok(())
}

fn expect_phrases(report: &mut ScenarioReport, subject: &str, phrases: &[String], logs: &str) {
    for phrase in phrases.iter().filter(|p| !logs.contains(p.as_str())) {
        let failure = AssertionFailure::new(subject, format!("to contain {phrase:?}"), "no match");
        report.fail(failure.to_string());
    }
}

fn record_diagnostics(report: &mut ScenarioReport, logs: &str) {
    for diagnostic in diagnostics::scan(logs) {
        let phrase = diagnostic.to_string();
        if !report.diagnostics.contains(&phrase) {
            report.diagnostics.push(phrase);
        }
    }
}

/// External failures are scenario failures; everything else means the
/// harness could not complete the scenario.
fn classify(report: &mut ScenarioReport, err: HarnessError) {
    match err {
        HarnessError::Assertion(failure) => report.fail(failure.to_string()),
        err @ (HarnessError::ExternalBuild { .. } | HarnessError::ExternalService { .. }) => {
            warn!(error = %err, "unexpected external failure");
            let message = match err.diagnostic() {
                Some(diagnostic) => format!("{err} ({diagnostic})"),
                None => err.to_string(),
            };
            report.fail(message);
        }
        err => {
            warn!(error = %err, "scenario errored");
            report.error(err.to_string());
        }
    }
}

async fn bounded<T>(
    operation: Operation,
    budget: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(budget, call)
        .await
        .map_err(|_| HarnessError::Timeout {
            operation,
            after: budget,
        })?
}
