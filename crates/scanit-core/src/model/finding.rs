use std::fmt;

use serde::{Deserialize, Serialize};

use super::key::ProjectKey;

/// A single rule violation owned by one component.
///
/// Equality and hashing cover exactly `rule_key`, `message` and `component`,
/// so issue sets compare independently of server ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Issue {
    pub rule_key: String,
    pub message: String,
    pub component: ProjectKey,
}

impl Issue {
    pub fn new(
        rule_key: impl Into<String>,
        message: impl Into<String>,
        component: ProjectKey,
    ) -> Self {
        Self {
            rule_key: rule_key.into(),
            message: message.into(),
            component,
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.rule_key, self.message, self.component)
    }
}

/// Value of a metric for a component.
///
/// `Absent` means the pair was never computed (excluded component,
/// unsupported metric). It is never conflated with `Present(0.0)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Measure {
    Present(f64),
    Absent,
}

impl From<Option<f64>> for Measure {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Measure::Absent, Measure::Present)
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measure::Present(v) => write!(f, "{v}"),
            Measure::Absent => f.write_str("<absent>"),
        }
    }
}

/// A language bound to a named rule profile for one project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualityProfileBinding {
    pub language: String,
    pub profile: String,
}

impl QualityProfileBinding {
    pub fn new(language: impl Into<String>, profile: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            profile: profile.into(),
        }
    }
}

/// How an issue query relates to its component key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueScope {
    /// Issues anywhere in the subtree rooted at the component.
    #[default]
    Root,
    /// Issues owned by exactly that component.
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IssueFilter {
    pub component: Option<ProjectKey>,
    pub scope: IssueScope,
}

impl IssueFilter {
    /// Every issue known to the service.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn under(root: ProjectKey) -> Self {
        Self {
            component: Some(root),
            scope: IssueScope::Root,
        }
    }

    pub fn owned_by(component: ProjectKey) -> Self {
        Self {
            component: Some(component),
            scope: IssueScope::Any,
        }
    }

    pub fn matches(&self, issue: &Issue) -> bool {
        match (&self.component, self.scope) {
            (None, _) => true,
            (Some(root), IssueScope::Root) => issue.component.is_within(root),
            (Some(component), IssueScope::Any) => issue.component == *component,
        }
    }
}
