//! Read-only queries against a settled session's analysis results.

pub mod expect;

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::{AssertionFailure, HarnessError, Operation, Result, SessionStateError};
use crate::model::{Issue, IssueFilter, Measure, ProjectKey};
use crate::service::AnalysisService;
use crate::session::AnalysisSession;

pub use expect::{Expectation, compare_issue_sets, compare_measure};

pub struct ResultVerifier<'a> {
    service: &'a dyn AnalysisService,
    timeout: Duration,
}

impl<'a> ResultVerifier<'a> {
    /// Unchecked access, for probing what a failed session left behind.
    pub fn new(service: &'a dyn AnalysisService, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    /// Refuses sessions whose results are not settled yet.
    pub fn for_session(
        service: &'a dyn AnalysisService,
        session: &AnalysisSession,
        timeout: Duration,
    ) -> Result<Self> {
        if !session.is_queryable() {
            return Err(SessionStateError::NotQueryable {
                state: session.state().name(),
            }
            .into());
        }
        Ok(Self::new(service, timeout))
    }

    /// Issues matching `filter`, one entry per reported issue. Subtree
    /// scoping is re-applied locally so sibling projects sharing a prefix
    /// never leak in.
    pub async fn fetch_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        let mut issues = self.bounded(self.service.search_issues(filter)).await?;
        let fetched = issues.len();
        issues.retain(|i| filter.matches(i));
        debug!(fetched, kept = issues.len(), component = ?filter.component, "issues fetched");
        Ok(issues)
    }

    pub async fn fetch_measure(&self, component: &ProjectKey, metric: &str) -> Result<Measure> {
        self.bounded(self.service.component_measure(component, metric))
            .await
    }

    pub async fn is_registered(&self, component: &ProjectKey) -> Result<bool> {
        self.bounded(self.service.project_exists(component)).await
    }

    /// Evaluates one expectation. Mismatches surface as
    /// `HarnessError::Assertion`; anything else is a harness failure.
    pub async fn check(&self, expectation: &Expectation) -> Result<()> {
        match expectation {
            Expectation::Measure {
                component,
                metric,
                expected,
            } => {
                let actual = self.fetch_measure(component, metric).await?;
                compare_measure(component, metric, *expected, actual)?;
            }
            Expectation::NotRegistered { component } => {
                if self.is_registered(component).await? {
                    return Err(AssertionFailure::new(
                        format!("registration of {component}"),
                        "none",
                        "a registered component",
                    )
                    .into());
                }
            }
            other => {
                let filter = other.issue_filter().cloned().unwrap_or_default();
                let issues = self.fetch_issues(&filter).await?;
                other.check_issues(&issues)?;
            }
        }
        Ok(())
    }

    /// Checks every expectation, collecting mismatches instead of stopping
    /// at the first. Non-assertion errors abort immediately.
    pub async fn check_all(&self, expectations: &[Expectation]) -> Result<Vec<AssertionFailure>> {
        let mut failures = Vec::new();
        for expectation in expectations {
            match self.check(expectation).await {
                Ok(()) => {}
                Err(HarnessError::Assertion(failure)) => failures.push(failure),
                Err(err) => return Err(err),
            }
        }
        Ok(failures)
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| HarnessError::Timeout {
                operation: Operation::Query,
                after: self.timeout,
            })?
    }
}
