mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use scanit_core::error::{ConfigError, HarnessError, Operation, SessionStateError};
use scanit_core::exec::{BuildInvoker, BuildRequest};
use scanit_core::model::{Issue, IssueFilter, Measure};
use scanit_core::service::TaskState;
use scanit_core::session::{
    AnalysisSession, BeginConfig, Diagnostic, EndConfig, EndOutcome, ScannerCommand,
    SessionController, SessionState,
};
use scanit_core::settings::{PropertyLayer, Settings};
use scanit_core::verify::{Expectation, ResultVerifier};

const PROJECT: &str = "my.project";
const FILE: &str = "my.project:my.project:1049030E-AC7A-49D0-BEDC-F414C5C7DDD8:Foo.cs";

const EXCLUDED_END_LOG: &str = "\
The exclude flag has been set so the project will not be analyzed by SonarQube.
No analysable projects were found. SonarQube analysis will not be performed. Check the build summary report for details.
";

/// Scanner that succeeds, and whose `end` publishes one issue.
fn happy_runner(service: &Arc<InMemoryService>) -> Arc<ScriptedRunner> {
    let service = service.clone();
    ScriptedRunner::new(move |spec| match spec.args.first().map(String::as_str) {
        Some("end") => {
            service.complete_analysis(
                vec![Issue::new("csharpsquid:S1134", "Take the required action.", key(FILE))],
                &[(FILE, "ncloc", 23.0), (PROJECT, "ncloc", 37.0)],
            );
            Reply::Output(output(0, "Post-processing succeeded."))
        }
        _ => Reply::Output(output(0, "ok")),
    })
}

async fn begin_and_build(
    controller: &scanit_core::session::SessionController,
    runner: &Arc<ScriptedRunner>,
    session: &mut AnalysisSession,
) {
    controller
        .begin(session, BeginConfig::new(PROJECT).name("sample").version("1.0"))
        .await
        .expect("begin succeeds");
    let build = BuildInvoker::new(runner.as_ref(), MSBUILD)
        .run(session.working_dir(), &BuildRequest::rebuild(), Duration::from_secs(5))
        .await
        .expect("build runs");
    controller.mark_built(session, &build).expect("build recorded");
}

#[tokio::test]
async fn full_cycle_makes_results_queryable() {
    let service = InMemoryService::provisioned(PROJECT);
    let runner = happy_runner(&service);
    let controller = controller(runner.clone(), service.clone(), fast_timeouts());
    let mut session = AnalysisSession::new("/work");

    begin_and_build(&controller, &runner, &mut session).await;
    assert!(matches!(session.state(), SessionState::Built { .. }));

    let report = controller.end(&mut session, EndConfig::default()).await.unwrap();
    assert_eq!(report.outcome, EndOutcome::Success);
    assert_eq!(session.state().name(), "ended(success)");
    assert!(session.is_queryable());
    assert!(!controller.registry().is_active(&key(PROJECT)));

    let verifier =
        ResultVerifier::for_session(service.as_ref(), &session, Duration::from_secs(1)).unwrap();
    assert_eq!(verifier.fetch_issues(&IssueFilter::all()).await.unwrap().len(), 1);
    assert_eq!(
        verifier.fetch_measure(&key(FILE), "ncloc").await.unwrap(),
        Measure::Present(23.0)
    );
    assert_eq!(verifier.fetch_measure(&key(FILE), "lines").await.unwrap(), Measure::Absent);

    assert_eq!(runner.verbs(), vec!["begin", "/t:Rebuild", "end"]);
}

#[tokio::test]
async fn repeated_findings_in_one_file_are_all_counted() {
    let service = InMemoryService::provisioned(PROJECT);
    let publisher = service.clone();
    let runner = ScriptedRunner::new(move |spec| match spec.args.first().map(String::as_str) {
        Some("end") => {
            let fixme = Issue::new("csharpsquid:S1134", "Take the required action.", key(FILE));
            publisher.complete_analysis(vec![fixme.clone(), fixme], &[]);
            Reply::Output(output(0, "Post-processing succeeded."))
        }
        _ => Reply::Output(output(0, "ok")),
    });
    let controller = controller(runner.clone(), service.clone(), fast_timeouts());
    let mut session = AnalysisSession::new("/work");

    begin_and_build(&controller, &runner, &mut session).await;
    controller.end(&mut session, EndConfig::default()).await.unwrap();

    let verifier =
        ResultVerifier::for_session(service.as_ref(), &session, Duration::from_secs(1)).unwrap();
    assert_eq!(verifier.fetch_issues(&IssueFilter::all()).await.unwrap().len(), 2);
    let failures = verifier
        .check_all(&[
            Expectation::issue_count(2),
            Expectation::rules_contain(["csharpsquid:S1134"]),
        ])
        .await
        .unwrap();
    assert!(failures.is_empty(), "{failures:?}");
}

#[tokio::test]
async fn begin_renders_key_name_and_version() {
    let service = InMemoryService::provisioned(PROJECT);
    let runner = happy_runner(&service);
    let controller = controller(runner.clone(), service, fast_timeouts());
    let mut session = AnalysisSession::new("/work");

    controller
        .begin(&mut session, BeginConfig::new(PROJECT).name("sample").version("1.0"))
        .await
        .unwrap();

    let begin = &runner.calls()[0];
    assert_eq!(begin.program, std::path::PathBuf::from(SCANNER));
    assert_eq!(begin.args, vec!["begin", "/k:my.project", "/n:sample", "/v:1.0"]);
    assert_eq!(begin.working_dir.as_deref(), Some(std::path::Path::new("/work")));
}

#[tokio::test]
async fn resolved_settings_are_forwarded_to_begin() {
    let service = InMemoryService::provisioned(PROJECT);
    let runner = happy_runner(&service);
    let settings = Settings::new(
        PropertyLayer::new().with("sonar.cs.opencover.reportsPaths", "cov.xml"),
        PropertyLayer::new(),
        PropertyLayer::new().with("sonar.login", "admin"),
    );
    let controller = SessionController::new(
        runner.clone(),
        service,
        ScannerCommand::from_settings(SCANNER, &settings),
        fast_timeouts(),
    );
    let mut session = AnalysisSession::new("/work");

    controller.begin(&mut session, BeginConfig::new(PROJECT)).await.unwrap();
    controller.abandon(&mut session, "done");

    assert_eq!(
        runner.calls()[0].args,
        vec![
            "begin",
            "/k:my.project",
            "/d:sonar.login=admin",
            "/d:sonar.cs.opencover.reportsPaths=cov.xml",
        ]
    );
}

#[tokio::test]
async fn empty_key_fails_fast_without_contacting_anything() {
    let service = InMemoryService::provisioned(PROJECT);
    let runner = happy_runner(&service);
    let controller = controller(runner.clone(), service.clone(), fast_timeouts());
    let mut session = AnalysisSession::new("/work");

    let err = controller.begin(&mut session, BeginConfig::new("")).await.unwrap_err();

    assert!(matches!(err, HarnessError::Config(ConfigError::EmptyProjectKey)));
    assert!(err.is_local_contract_violation());
    assert!(matches!(session.state(), SessionState::Rejected { .. }));
    assert!(service.calls().is_empty());
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn begin_is_rejected_for_unprovisioned_project() {
    let service = InMemoryService::new();
    let runner = happy_runner(&service);
    let controller = controller(runner.clone(), service.clone(), fast_timeouts());
    let mut session = AnalysisSession::new("/work");

    let err = controller.begin(&mut session, BeginConfig::new(PROJECT)).await.unwrap_err();

    assert!(matches!(err, HarnessError::ExternalService { .. }));
    assert!(err.to_string().contains("not provisioned"));
    assert!(matches!(session.state(), SessionState::Rejected { .. }));
    assert!(runner.calls().is_empty());
    assert!(!controller.registry().is_active(&key(PROJECT)));
}

#[tokio::test]
async fn begin_is_rejected_without_profile_binding() {
    let service = InMemoryService::registered(PROJECT);
    let runner = happy_runner(&service);
    let controller = controller(runner.clone(), service.clone(), fast_timeouts());
    let mut session = AnalysisSession::new("/work");

    let err = controller.begin(&mut session, BeginConfig::new(PROJECT)).await.unwrap_err();

    assert!(err.to_string().contains("no quality profile bound"));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn failing_begin_command_rejects_session() {
    let service = InMemoryService::provisioned(PROJECT);
    let runner = ScriptedRunner::new(|_| Reply::Output(output(1, "Pre-processing failed")));
    let controller = controller(runner.clone(), service, fast_timeouts());
    let mut session = AnalysisSession::new("/work");

    let err = controller.begin(&mut session, BeginConfig::new(PROJECT)).await.unwrap_err();

    assert!(matches!(err, HarnessError::ExternalService { .. }));
    assert!(matches!(session.state(), SessionState::Rejected { .. }));
    assert!(!controller.registry().is_active(&key(PROJECT)));
}

#[tokio::test]
async fn second_begin_is_already_active() {
    let service = InMemoryService::provisioned(PROJECT);
    let runner = happy_runner(&service);
    let controller = controller(runner.clone(), service, fast_timeouts());
    let mut session = AnalysisSession::new("/work");

    controller.begin(&mut session, BeginConfig::new(PROJECT)).await.unwrap();
    let err = controller.begin(&mut session, BeginConfig::new(PROJECT)).await.unwrap_err();

    assert!(matches!(
        err,
        HarnessError::SessionState(SessionStateError::AlreadyActive { ref project_key }) if project_key == PROJECT
    ));
    assert!(matches!(session.state(), SessionState::Began { .. }));
    assert_eq!(runner.verbs(), vec!["begin"]);
}

#[tokio::test]
async fn one_active_session_per_project_key() {
    let service = InMemoryService::provisioned(PROJECT);
    let runner = happy_runner(&service);
    let controller = controller(runner.clone(), service, fast_timeouts());
    let mut first = AnalysisSession::new("/a");
    let mut second = AnalysisSession::new("/b");

    begin_and_build(&controller, &runner, &mut first).await;
    let err = controller.begin(&mut second, BeginConfig::new(PROJECT)).await.unwrap_err();
    assert!(matches!(
        err,
        HarnessError::SessionState(SessionStateError::AlreadyActive { .. })
    ));
    assert_eq!(second.state(), &SessionState::Idle);

    controller.end(&mut first, EndConfig::default()).await.unwrap();
    controller.begin(&mut second, BeginConfig::new(PROJECT)).await.unwrap();
    assert!(matches!(second.state(), SessionState::Began { .. }));
}

#[tokio::test]
async fn end_without_build_is_not_built_and_queries_nothing() {
    let service = InMemoryService::provisioned(PROJECT);
    let runner = happy_runner(&service);
    let controller = controller(runner.clone(), service.clone(), fast_timeouts());
    let mut session = AnalysisSession::new("/work");

    controller.begin(&mut session, BeginConfig::new(PROJECT)).await.unwrap();
    let calls_after_begin = service.calls().len();

    let err = controller.end(&mut session, EndConfig::default()).await.unwrap_err();

    assert!(matches!(
        err,
        HarnessError::SessionState(SessionStateError::NotBuilt { state: "began" })
    ));
    assert_eq!(service.calls().len(), calls_after_begin);
    assert_eq!(runner.verbs(), vec!["begin"]);
    assert!(matches!(session.state(), SessionState::Began { .. }));

    let refused = ResultVerifier::for_session(service.as_ref(), &session, Duration::from_secs(1));
    assert!(matches!(
        refused,
        Err(HarnessError::SessionState(SessionStateError::NotQueryable { .. }))
    ));
}

#[tokio::test]
async fn end_from_idle_is_not_built() {
    let service = InMemoryService::provisioned(PROJECT);
    let runner = happy_runner(&service);
    let controller = controller(runner.clone(), service.clone(), fast_timeouts());
    let mut session = AnalysisSession::new("/work");

    let err = controller.end(&mut session, EndConfig::default()).await.unwrap_err();
    assert!(matches!(
        err,
        HarnessError::SessionState(SessionStateError::NotBuilt { state: "idle" })
    ));
    assert!(service.calls().is_empty());
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn mark_built_requires_began() {
    let service = InMemoryService::provisioned(PROJECT);
    let runner = happy_runner(&service);
    let controller = controller(runner.clone(), service, fast_timeouts());
    let mut session = AnalysisSession::new("/work");

    let build = BuildInvoker::new(runner.as_ref(), MSBUILD)
        .run(session.working_dir(), &BuildRequest::rebuild(), Duration::from_secs(1))
        .await
        .unwrap();
    let err = controller.mark_built(&mut session, &build).unwrap_err();
    assert!(matches!(
        err,
        HarnessError::SessionState(SessionStateError::NotBegun { state: "idle" })
    ));
}

#[tokio::test]
async fn failed_build_still_reaches_built() {
    let service = InMemoryService::provisioned(PROJECT);
    let runner = ScriptedRunner::new(|spec| {
        if spec.program.ends_with(MSBUILD) {
            Reply::Output(output(1, "error CS1002: ; expected"))
        } else {
            Reply::Output(output(0, "ok"))
        }
    });
    let controller = controller(runner.clone(), service, fast_timeouts());
    let mut session = AnalysisSession::new("/work");

    controller.begin(&mut session, BeginConfig::new(PROJECT)).await.unwrap();
    let build = BuildInvoker::new(runner.as_ref(), MSBUILD)
        .run(session.working_dir(), &BuildRequest::rebuild(), Duration::from_secs(1))
        .await
        .unwrap();
    assert!(!build.success());

    controller.mark_built(&mut session, &build).unwrap();
    assert!(matches!(
        session.state(),
        SessionState::Built {
            build_exit_code: Some(1),
            ..
        }
    ));
}

#[tokio::test]
async fn end_failure_carries_diagnostic() {
    let service = InMemoryService::provisioned(PROJECT);
    let runner = ScriptedRunner::new(|spec| match spec.args.first().map(String::as_str) {
        Some("end") => Reply::Output(output(1, EXCLUDED_END_LOG)),
        _ => Reply::Output(output(0, "ok")),
    });
    let controller = controller(runner.clone(), service.clone(), fast_timeouts());
    let mut session = AnalysisSession::new("/work");

    begin_and_build(&controller, &runner, &mut session).await;
    let report = controller.end(&mut session, EndConfig::default()).await.unwrap();

    match &report.outcome {
        EndOutcome::Failure { diagnostic, .. } => {
            assert_eq!(*diagnostic, Some(Diagnostic::NoAnalysableProjects));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(session.state().name(), "ended(failure)");
    assert!(!session.is_queryable());
    assert!(!controller.registry().is_active(&key(PROJECT)));

    let err = report.into_result().unwrap_err();
    assert_eq!(err.diagnostic(), Some(Diagnostic::NoAnalysableProjects));
}

#[tokio::test]
async fn end_waits_for_a_fresh_settled_task() {
    let service = InMemoryService::provisioned(PROJECT);
    service.set_tasks(task("old", TaskState::Success));
    let runner = ScriptedRunner::new(|_| Reply::Output(output(0, "ok")));
    let controller = controller(runner.clone(), service.clone(), fast_timeouts());
    let mut session = AnalysisSession::new("/work");

    begin_and_build(&controller, &runner, &mut session).await;
    service.script_tasks(vec![
        scanit_core::service::TaskStatus {
            queued: 1,
            ..task("old", TaskState::Success)
        },
        task("new", TaskState::InProgress),
        task("new", TaskState::Success),
    ]);

    let report = controller.end(&mut session, EndConfig::default()).await.unwrap();
    assert_eq!(report.outcome, EndOutcome::Success);

    let polls = service.calls().iter().filter(|c| **c == "task_status").count();
    // One baseline read at begin, then three polls.
    assert_eq!(polls, 4);
}

#[tokio::test]
async fn failed_background_task_ends_in_failure() {
    let service = InMemoryService::provisioned(PROJECT);
    let runner = ScriptedRunner::new(|_| Reply::Output(output(0, "ok")));
    let controller = controller(runner.clone(), service.clone(), fast_timeouts());
    let mut session = AnalysisSession::new("/work");

    begin_and_build(&controller, &runner, &mut session).await;
    service.script_tasks(vec![task("t1", TaskState::Failed)]);

    let report = controller.end(&mut session, EndConfig::default()).await.unwrap();
    assert!(!report.outcome.is_success());
    assert_eq!(session.state().name(), "ended(failure)");
}

#[tokio::test]
async fn settlement_times_out_when_nothing_is_processed() {
    let service = InMemoryService::provisioned(PROJECT);
    service.set_tasks(task("old", TaskState::Success));
    let runner = ScriptedRunner::new(|_| Reply::Output(output(0, "ok")));
    let timeouts = scanit_core::session::Timeouts {
        end: Duration::from_millis(100),
        ..fast_timeouts()
    };
    let controller = controller(runner.clone(), service.clone(), timeouts);
    let mut session = AnalysisSession::new("/work");

    begin_and_build(&controller, &runner, &mut session).await;
    let err = controller.end(&mut session, EndConfig::default()).await.unwrap_err();

    assert!(matches!(
        err,
        HarnessError::Timeout {
            operation: Operation::Settlement,
            ..
        }
    ));
    assert!(!err.is_local_contract_violation());
    assert_eq!(session.state().name(), "ended(failure)");
}

#[tokio::test]
async fn hanging_begin_times_out_distinctly() {
    let service = InMemoryService::provisioned(PROJECT);
    let runner = ScriptedRunner::new(|_| Reply::Hang);
    let timeouts = scanit_core::session::Timeouts {
        begin: Duration::from_millis(50),
        ..fast_timeouts()
    };
    let controller = controller(runner.clone(), service, timeouts);
    let mut session = AnalysisSession::new("/work");

    let err = controller.begin(&mut session, BeginConfig::new(PROJECT)).await.unwrap_err();

    assert!(matches!(
        err,
        HarnessError::Timeout {
            operation: Operation::Begin,
            ..
        }
    ));
    assert!(matches!(session.state(), SessionState::Rejected { .. }));
    assert!(!controller.registry().is_active(&key(PROJECT)));
}

#[tokio::test]
async fn hanging_build_times_out() {
    let runner = ScriptedRunner::new(|_| Reply::Hang);
    let err = BuildInvoker::new(runner.as_ref(), MSBUILD)
        .run(std::path::Path::new("/work"), &BuildRequest::rebuild(), Duration::from_millis(20))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        HarnessError::Timeout {
            operation: Operation::Build,
            ..
        }
    ));
}

#[tokio::test]
async fn abandon_releases_the_key() {
    let service = InMemoryService::provisioned(PROJECT);
    let runner = happy_runner(&service);
    let controller = controller(runner.clone(), service, fast_timeouts());
    let mut session = AnalysisSession::new("/work");

    controller.begin(&mut session, BeginConfig::new(PROJECT)).await.unwrap();
    assert!(controller.registry().is_active(&key(PROJECT)));

    controller.abandon(&mut session, "build could not start");
    assert_eq!(session.state().name(), "ended(failure)");
    assert!(!controller.registry().is_active(&key(PROJECT)));
}

#[tokio::test]
async fn help_is_independent_of_session_state() {
    let service = InMemoryService::new();
    let runner = ScriptedRunner::new(|spec| {
        if spec.args == ["/?"] {
            Reply::Output(output(0, "Usage:\n  SonarScanner.MSBuild.exe begin /k:project_key"))
        } else {
            Reply::Output(output(1, ""))
        }
    });
    let controller = controller(runner.clone(), service.clone(), fast_timeouts());

    let out = controller.help(None).await.unwrap();
    assert!(Diagnostic::UsageBanner.is_present_in(&out.logs()));
    assert!(service.calls().is_empty());
}

#[tokio::test]
async fn help_without_banner_fails() {
    let service = InMemoryService::new();
    let runner = ScriptedRunner::new(|_| Reply::Output(output(0, "nothing useful")));
    let controller = controller(runner, service, fast_timeouts());

    let err = controller.help(None).await.unwrap_err();
    assert!(err.to_string().contains("no usage banner"));
}
