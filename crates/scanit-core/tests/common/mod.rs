#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use scanit_core::error::Result;
use scanit_core::exec::{CommandOutput, CommandRunner, CommandSpec, ProcessError};
use scanit_core::model::{
    Issue, IssueFilter, Measure, ProjectKey, QualityProfileBinding, ServiceVersion,
};
use scanit_core::service::{AnalysisService, CustomRule, TaskSnapshot, TaskState, TaskStatus};
use scanit_core::session::{ScannerCommand, SessionController, Timeouts};
use scanit_core::HarnessError;

pub const SCANNER: &str = "scanner";
pub const MSBUILD: &str = "msbuild";
/// Reported by `InMemoryService` unless a test overrides it.
pub const SERVICE_VERSION: ServiceVersion = ServiceVersion::new(7, 9);

pub fn key(raw: &str) -> ProjectKey {
    ProjectKey::new(raw).expect("valid key")
}

pub fn output(code: i32, stdout: &str) -> CommandOutput {
    CommandOutput {
        exit_code: Some(code),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

pub fn fast_timeouts() -> Timeouts {
    Timeouts {
        begin: Duration::from_secs(5),
        build: Duration::from_secs(5),
        end: Duration::from_secs(5),
        query: Duration::from_secs(5),
        poll_interval: Duration::from_millis(5),
    }
}

/// What a scripted command does when invoked.
pub enum Reply {
    Output(CommandOutput),
    /// Never finishes within the caller's timeout.
    Hang,
}

type Handler = Box<dyn Fn(&CommandSpec) -> Reply + Send + Sync>;

/// Records every command and answers from a handler instead of spawning.
pub struct ScriptedRunner {
    handler: Handler,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new(handler: impl Fn(&CommandSpec) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().clone()
    }

    /// First argument of each call, e.g. `begin`, `end`, `/t:Rebuild`.
    pub fn verbs(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .map(|c| c.args.first().cloned().unwrap_or_default())
            .collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        timeout: Duration,
    ) -> std::result::Result<CommandOutput, ProcessError> {
        self.calls.lock().push(spec.clone());
        match (self.handler)(spec) {
            Reply::Output(output) => Ok(output),
            Reply::Hang => {
                tokio::time::sleep(timeout).await;
                Err(ProcessError::Timeout(timeout))
            }
        }
    }
}

#[derive(Default)]
struct ServiceState {
    version: Option<ServiceVersion>,
    projects: BTreeMap<ProjectKey, String>,
    bindings: HashMap<ProjectKey, Vec<QualityProfileBinding>>,
    profiles: Vec<String>,
    rules: Vec<CustomRule>,
    issues: Vec<Issue>,
    measures: HashMap<(ProjectKey, String), f64>,
    tasks: TaskStatus,
    scripted_tasks: VecDeque<TaskStatus>,
    next_task: usize,
    calls: Vec<&'static str>,
}

/// In-memory analysis service. `search_issues` ignores the filter and
/// returns every stored issue, like a server that over-matches.
#[derive(Default)]
pub struct InMemoryService {
    state: Mutex<ServiceState>,
}

impl InMemoryService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A project provisioned and bound to one C# profile.
    pub fn provisioned(project: &str) -> Arc<Self> {
        let service = Self::new();
        {
            let mut state = service.state.lock();
            state.projects.insert(key(project), project.to_string());
            state
                .bindings
                .insert(key(project), vec![QualityProfileBinding::new("cs", "ProfileForTest")]);
        }
        service
    }

    /// A project that exists but has no profile bound.
    pub fn registered(project: &str) -> Arc<Self> {
        let service = Self::new();
        service
            .state
            .lock()
            .projects
            .insert(key(project), project.to_string());
        service
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().calls.clone()
    }

    pub fn set_version(&self, version: ServiceVersion) {
        self.state.lock().version = Some(version);
    }

    pub fn profiles(&self) -> Vec<String> {
        self.state.lock().profiles.clone()
    }

    pub fn bindings(&self, project: &str) -> Vec<QualityProfileBinding> {
        self.state
            .lock()
            .bindings
            .get(&key(project))
            .cloned()
            .unwrap_or_default()
    }

    pub fn rules(&self) -> Vec<CustomRule> {
        self.state.lock().rules.clone()
    }

    /// Stores analysis results and finishes a fresh background task, as a
    /// successful `end` would.
    pub fn complete_analysis(&self, issues: Vec<Issue>, measures: &[(&str, &str, f64)]) {
        let mut state = self.state.lock();
        for issue in &issues {
            register_ancestors(&mut state.projects, &issue.component);
        }
        state.issues.extend(issues);
        for (component, metric, value) in measures {
            register_ancestors(&mut state.projects, &key(component));
            state
                .measures
                .insert((key(component), metric.to_string()), *value);
        }
        state.next_task += 1;
        let id = format!("task-{}", state.next_task);
        state.tasks = TaskStatus {
            queued: 0,
            current: Some(TaskSnapshot {
                id,
                state: TaskState::Success,
            }),
        };
    }

    pub fn set_tasks(&self, status: TaskStatus) {
        self.state.lock().tasks = status;
    }

    /// Statuses returned by successive polls; the last one sticks.
    pub fn script_tasks(&self, statuses: Vec<TaskStatus>) {
        self.state.lock().scripted_tasks = statuses.into();
    }
}

fn register_ancestors(projects: &mut BTreeMap<ProjectKey, String>, component: &ProjectKey) {
    let segments: Vec<&str> = component.segments().collect();
    for end in 1..=segments.len() {
        let ancestor = key(&segments[..end].join(":"));
        projects.entry(ancestor).or_default();
    }
}

pub fn task(id: &str, state: TaskState) -> TaskStatus {
    TaskStatus {
        queued: 0,
        current: Some(TaskSnapshot {
            id: id.to_string(),
            state,
        }),
    }
}

#[async_trait]
impl AnalysisService for InMemoryService {
    async fn service_version(&self) -> Result<ServiceVersion> {
        let mut state = self.state.lock();
        state.calls.push("service_version");
        Ok(state.version.unwrap_or(SERVICE_VERSION))
    }

    async fn create_project(&self, key: &ProjectKey, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push("create_project");
        state.projects.insert(key.clone(), name.to_string());
        Ok(())
    }

    async fn delete_project(&self, key: &ProjectKey) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push("delete_project");
        state.projects.retain(|k, _| !k.is_within(key));
        state.bindings.retain(|k, _| !k.is_within(key));
        state.issues.retain(|i| !i.component.is_within(key));
        state.measures.retain(|(k, _), _| !k.is_within(key));
        Ok(())
    }

    async fn restore_profile(&self, descriptor: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push("restore_profile");
        state.profiles.push(descriptor.to_string());
        Ok(())
    }

    async fn bind_profile(&self, key: &ProjectKey, binding: &QualityProfileBinding) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push("bind_profile");
        if !state.projects.contains_key(key) {
            return Err(HarnessError::service(format!("project `{key}` not found")));
        }
        state.bindings.entry(key.clone()).or_default().push(binding.clone());
        Ok(())
    }

    async fn create_rule(&self, rule: &CustomRule) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push("create_rule");
        if state.rules.iter().any(|r| r.custom_key == rule.custom_key) {
            return Err(HarnessError::service("rule already exists"));
        }
        state.rules.push(rule.clone());
        Ok(())
    }

    async fn project_exists(&self, key: &ProjectKey) -> Result<bool> {
        let mut state = self.state.lock();
        state.calls.push("project_exists");
        Ok(state.projects.contains_key(key))
    }

    async fn profile_bindings(&self, key: &ProjectKey) -> Result<Vec<QualityProfileBinding>> {
        let mut state = self.state.lock();
        state.calls.push("profile_bindings");
        Ok(state.bindings.get(key).cloned().unwrap_or_default())
    }

    async fn task_status(&self, _key: &ProjectKey) -> Result<TaskStatus> {
        let mut state = self.state.lock();
        state.calls.push("task_status");
        if state.scripted_tasks.len() > 1 {
            return Ok(state.scripted_tasks.pop_front().unwrap_or_default());
        }
        if let Some(last) = state.scripted_tasks.front() {
            return Ok(last.clone());
        }
        Ok(state.tasks.clone())
    }

    async fn search_issues(&self, _filter: &IssueFilter) -> Result<Vec<Issue>> {
        let mut state = self.state.lock();
        state.calls.push("search_issues");
        Ok(state.issues.clone())
    }

    async fn component_measure(&self, component: &ProjectKey, metric: &str) -> Result<Measure> {
        let mut state = self.state.lock();
        state.calls.push("component_measure");
        Ok(state
            .measures
            .get(&(component.clone(), metric.to_string()))
            .copied()
            .into())
    }
}

pub fn controller(
    runner: Arc<ScriptedRunner>,
    service: Arc<InMemoryService>,
    timeouts: Timeouts,
) -> SessionController {
    SessionController::new(runner, service, ScannerCommand::new(SCANNER), timeouts)
}

/// Fixture root holding the projects and profile backups the built-in
/// scenarios reference.
pub fn fixture_root() -> TempDir {
    let root = tempfile::tempdir().expect("create fixture root");
    write_project(root.path(), "ProjectUnderTest");
    write_project(root.path(), "ExcludedTest");
    write_project(root.path(), "ConsoleMultiLanguage");
    for profile in [
        "ProjectUnderTest/TestQualityProfile.xml",
        "ProjectUnderTest/TestQualityProfileParameters.xml",
        "ProjectUnderTest/TestQualityProfileFxCop.xml",
        "ProjectUnderTest/TestEmptyQualityProfile.xml",
        "ConsoleMultiLanguage/TestQualityProfileCSharp.xml",
        "ConsoleMultiLanguage/TestQualityProfileVBNet.xml",
    ] {
        fs::write(root.path().join(profile), format!("<profile>{profile}</profile>"))
            .expect("write profile");
    }
    root
}

fn write_project(root: &Path, name: &str) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).expect("create project dir");
    fs::write(dir.join(format!("{name}.sln")), "Microsoft Visual Studio Solution File\n")
        .expect("write solution");
    fs::write(dir.join("Foo.cs"), "class Foo {}\n").expect("write source");
}
