//! The remote analysis service as seen by the harness.
//!
//! Provisioning, registration checks, background-task status and result
//! queries. Implementations perform no retries; a failed call is reported
//! as-is and the caller decides what it means.

pub mod http;
mod wire;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    Issue, IssueFilter, Measure, ProjectKey, QualityProfileBinding, ServiceVersion,
};

pub use http::{HttpAnalysisService, ServiceConnection};

/// Rule instantiated from a parameterised template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomRule {
    pub template_key: String,
    pub custom_key: String,
    pub name: String,
    pub severity: String,
    pub description: String,
    pub params: BTreeMap<String, String>,
}

impl CustomRule {
    /// `k1=v1;k2=v2`, the template parameter encoding.
    pub fn encoded_params(&self) -> String {
        self.params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(";")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    InProgress,
    Success,
    Failed,
    Canceled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failed | TaskState::Canceled)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "PENDING",
            TaskState::InProgress => "IN_PROGRESS",
            TaskState::Success => "SUCCESS",
            TaskState::Failed => "FAILED",
            TaskState::Canceled => "CANCELED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: String,
    pub state: TaskState,
}

/// Background processing state of submitted analyses for one project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    /// Submitted reports not yet picked up.
    pub queued: usize,
    /// Most recent task that started processing.
    pub current: Option<TaskSnapshot>,
}

#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn service_version(&self) -> Result<ServiceVersion>;

    async fn create_project(&self, key: &ProjectKey, name: &str) -> Result<()>;

    /// Removes the project and everything computed for it. Missing projects
    /// are not an error.
    async fn delete_project(&self, key: &ProjectKey) -> Result<()>;

    /// Restores a profile from its backup descriptor (XML text).
    async fn restore_profile(&self, descriptor: &str) -> Result<()>;

    async fn bind_profile(&self, key: &ProjectKey, binding: &QualityProfileBinding) -> Result<()>;

    async fn create_rule(&self, rule: &CustomRule) -> Result<()>;

    async fn project_exists(&self, key: &ProjectKey) -> Result<bool>;

    async fn profile_bindings(&self, key: &ProjectKey) -> Result<Vec<QualityProfileBinding>>;

    async fn task_status(&self, key: &ProjectKey) -> Result<TaskStatus>;

    /// Issues matching `filter`. A component root that does not exist yields
    /// an empty list.
    async fn search_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>>;

    async fn component_measure(&self, component: &ProjectKey, metric: &str) -> Result<Measure>;
}
