//! JSON payloads of the analysis service web API.

use serde::Deserialize;

use super::{TaskSnapshot, TaskState, TaskStatus};
use crate::error::{HarnessError, Result};
use crate::model::{Issue, Measure, ProjectKey, QualityProfileBinding};

#[derive(Debug, Deserialize)]
pub(crate) struct IssuesPage {
    #[serde(default)]
    pub total: usize,
    #[serde(default)]
    pub issues: Vec<WireIssue>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireIssue {
    pub rule: String,
    #[serde(default)]
    pub message: String,
    pub component: String,
}

impl WireIssue {
    pub fn into_issue(self) -> Result<Issue> {
        let component = ProjectKey::new(self.component)
            .map_err(|e| HarnessError::service(format!("issue has an invalid component: {e}")))?;
        Ok(Issue::new(self.rule, self.message, component))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ComponentMeasures {
    pub component: MeasuredComponent,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MeasuredComponent {
    #[serde(default)]
    pub measures: Vec<WireMeasure>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireMeasure {
    pub metric: String,
    pub value: Option<String>,
}

impl ComponentMeasures {
    /// Exactly one measure for `metric`, otherwise absent.
    pub fn into_measure(self, metric: &str) -> Result<Measure> {
        let mut matching = self
            .component
            .measures
            .into_iter()
            .filter(|m| m.metric == metric);
        match (matching.next(), matching.next()) {
            (Some(WireMeasure { value: Some(raw), .. }), None) => raw
                .trim()
                .parse::<f64>()
                .map(Measure::Present)
                .map_err(|_| {
                    HarnessError::service(format!("measure `{metric}` has non-numeric value `{raw}`"))
                }),
            _ => Ok(Measure::Absent),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProfileSearch {
    #[serde(default)]
    pub profiles: Vec<WireProfile>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireProfile {
    pub name: String,
    pub language: String,
}

impl From<WireProfile> for QualityProfileBinding {
    fn from(profile: WireProfile) -> Self {
        QualityProfileBinding::new(profile.language, profile.name)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ComponentTasks {
    #[serde(default)]
    pub queue: Vec<WireTask>,
    pub current: Option<WireTask>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireTask {
    pub id: String,
    pub status: TaskState,
}

impl From<ComponentTasks> for TaskStatus {
    fn from(tasks: ComponentTasks) -> Self {
        TaskStatus {
            queued: tasks.queue.len(),
            current: tasks.current.map(|t| TaskSnapshot {
                id: t.id,
                state: t.status,
            }),
        }
    }
}
