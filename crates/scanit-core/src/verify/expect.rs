//! Declarative expectations and the pure comparisons behind them.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::AssertionFailure;
use crate::model::{Issue, IssueFilter, Measure, ProjectKey};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expectation {
    /// Exact number of issues matching the filter.
    IssueCount { filter: IssueFilter, count: usize },
    /// Every listed rule key occurs among the matching issues.
    RulesContain {
        filter: IssueFilter,
        rule_keys: BTreeSet<String>,
    },
    /// Matching issues equal this set (rule, message, component).
    IssuesEqual { filter: IssueFilter, issues: Vec<Issue> },
    /// Some matching issue has this rule and exactly this message.
    IssueWithMessage {
        filter: IssueFilter,
        rule_key: String,
        message: String,
    },
    Measure {
        component: ProjectKey,
        metric: String,
        expected: Measure,
    },
    /// The service holds no component under this key.
    NotRegistered { component: ProjectKey },
}

impl Expectation {
    pub fn issue_count(count: usize) -> Self {
        Self::IssueCount {
            filter: IssueFilter::all(),
            count,
        }
    }

    pub fn issue_count_under(root: ProjectKey, count: usize) -> Self {
        Self::IssueCount {
            filter: IssueFilter::under(root),
            count,
        }
    }

    pub fn rules_contain<I, S>(rule_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::RulesContain {
            filter: IssueFilter::all(),
            rule_keys: rule_keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn issue_with_message(rule_key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IssueWithMessage {
            filter: IssueFilter::all(),
            rule_key: rule_key.into(),
            message: message.into(),
        }
    }

    pub fn measure(component: ProjectKey, metric: impl Into<String>, value: f64) -> Self {
        Self::Measure {
            component,
            metric: metric.into(),
            expected: Measure::Present(value),
        }
    }

    pub fn measure_absent(component: ProjectKey, metric: impl Into<String>) -> Self {
        Self::Measure {
            component,
            metric: metric.into(),
            expected: Measure::Absent,
        }
    }

    /// Whether checking this needs issue data.
    pub fn issue_filter(&self) -> Option<&IssueFilter> {
        match self {
            Self::IssueCount { filter, .. }
            | Self::RulesContain { filter, .. }
            | Self::IssuesEqual { filter, .. }
            | Self::IssueWithMessage { filter, .. } => Some(filter),
            Self::Measure { .. } | Self::NotRegistered { .. } => None,
        }
    }

    /// Checks an issue expectation against already fetched issues.
    ///
    /// Counts cover every reported issue, including repeats of the same
    /// rule and message in one file; only `IssuesEqual` compares as sets.
    pub fn check_issues(&self, actual: &[Issue]) -> Result<(), AssertionFailure> {
        match self {
            Self::IssueCount { filter, count } => {
                if actual.len() == *count {
                    Ok(())
                } else {
                    Err(AssertionFailure::new(
                        format!("issue count{}", describe(filter)),
                        count,
                        actual.len(),
                    ))
                }
            }
            Self::RulesContain { filter, rule_keys } => {
                let present: BTreeSet<&str> = actual.iter().map(|i| i.rule_key.as_str()).collect();
                let missing: Vec<&str> = rule_keys
                    .iter()
                    .map(String::as_str)
                    .filter(|k| !present.contains(k))
                    .collect();
                if missing.is_empty() {
                    Ok(())
                } else {
                    Err(AssertionFailure::new(
                        format!("rule keys{}", describe(filter)),
                        format!("to contain {}", missing.join(", ")),
                        format!("[{}]", present.into_iter().collect::<Vec<_>>().join(", ")),
                    ))
                }
            }
            Self::IssuesEqual { filter, issues } => {
                let expected: HashSet<Issue> = issues.iter().cloned().collect();
                let actual: HashSet<Issue> = actual.iter().cloned().collect();
                compare_issue_sets(&expected, &actual).map_err(|mut failure| {
                    failure.subject.push_str(&describe(filter));
                    failure
                })
            }
            Self::IssueWithMessage {
                filter,
                rule_key,
                message,
            } => {
                let messages: Vec<&str> = actual
                    .iter()
                    .filter(|i| &i.rule_key == rule_key)
                    .map(|i| i.message.as_str())
                    .collect();
                if messages.iter().any(|m| m == message) {
                    Ok(())
                } else {
                    Err(AssertionFailure::new(
                        format!("message of {rule_key}{}", describe(filter)),
                        format!("{message:?}"),
                        format!("{messages:?}"),
                    ))
                }
            }
            Self::Measure { .. } | Self::NotRegistered { .. } => Ok(()),
        }
    }
}

fn describe(filter: &IssueFilter) -> String {
    match &filter.component {
        Some(component) => format!(" under {component}"),
        None => String::new(),
    }
}

/// Set equality on (rule, message, component), reporting both differences.
pub fn compare_issue_sets(
    expected: &HashSet<Issue>,
    actual: &HashSet<Issue>,
) -> Result<(), AssertionFailure> {
    let mut missing: Vec<String> = expected.difference(actual).map(Issue::to_string).collect();
    let mut unexpected: Vec<String> = actual.difference(expected).map(Issue::to_string).collect();
    if missing.is_empty() && unexpected.is_empty() {
        return Ok(());
    }
    missing.sort();
    unexpected.sort();
    Err(AssertionFailure::new(
        "issue set",
        format!("{} issues", expected.len()),
        format!("missing [{}], unexpected [{}]", missing.join("; "), unexpected.join("; ")),
    ))
}

pub fn compare_measure(
    component: &ProjectKey,
    metric: &str,
    expected: Measure,
    actual: Measure,
) -> Result<(), AssertionFailure> {
    if expected == actual {
        Ok(())
    } else {
        Err(AssertionFailure::new(
            format!("measure {metric} of {component}"),
            expected,
            actual,
        ))
    }
}
