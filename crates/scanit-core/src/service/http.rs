//! `AnalysisService` over the service's HTTP web API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, multipart};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::wire::{ComponentMeasures, ComponentTasks, IssuesPage, ProfileSearch};
use super::{AnalysisService, CustomRule, TaskStatus};
use crate::error::{HarnessError, Operation, Result};
use crate::model::{
    Issue, IssueFilter, IssueScope, Measure, ProjectKey, QualityProfileBinding, ServiceVersion,
};

const PAGE_SIZE: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConnection {
    pub base_url: String,
    pub login: Option<String>,
    pub password: Option<String>,
    /// Bound for each individual request.
    pub timeout: Duration,
}

impl ServiceConnection {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            login: None,
            password: None,
            timeout,
        }
    }

    pub fn credentials(mut self, login: impl Into<String>, password: Option<String>) -> Self {
        self.login = Some(login.into());
        self.password = password;
        self
    }
}

pub struct HttpAnalysisService {
    client: Client,
    connection: ServiceConnection,
}

impl HttpAnalysisService {
    pub fn new(connection: ServiceConnection) -> Result<Self> {
        let client = Client::builder()
            .timeout(connection.timeout)
            .user_agent(concat!("scanit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HarnessError::service(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, connection })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.connection.base_url.trim_end_matches('/'), path)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        debug!(url = %self.url(path), "GET");
        self.authorize(self.client.get(self.url(path)))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        debug!(url = %self.url(path), "POST");
        self.authorize(self.client.post(self.url(path)))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.connection.login {
            Some(login) => request.basic_auth(login, self.connection.password.as_deref()),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, operation: Operation) -> Result<Response> {
        request.send().await.map_err(|e| self.transport_error(e, operation))
    }

    /// Sends and requires a 2xx status.
    async fn send_ok(&self, request: RequestBuilder, operation: Operation) -> Result<Response> {
        let response = self.send(request, operation).await?;
        ensure_success(response).await
    }

    /// Sends and decodes JSON; 404 maps to `None`.
    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Option<T>> {
        let response = self.send(request, Operation::Query).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(response).await?;
        let body = response
            .json::<T>()
            .await
            .map_err(|e| self.transport_error(e, Operation::Query))?;
        Ok(Some(body))
    }

    fn transport_error(&self, err: reqwest::Error, operation: Operation) -> HarnessError {
        if err.is_timeout() {
            HarnessError::Timeout {
                operation,
                after: self.connection.timeout,
            }
        } else {
            HarnessError::service(format!("{operation} request failed: {err}"))
        }
    }
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().path().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(HarnessError::service(format!("{url} returned {status}: {body}")))
}

#[async_trait]
impl AnalysisService for HttpAnalysisService {
    /// Plain-text body such as `6.7.1.38345`.
    async fn service_version(&self) -> Result<ServiceVersion> {
        let response = self
            .send_ok(self.get("api/server/version"), Operation::Query)
            .await?;
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(e, Operation::Query))?;
        body.parse::<ServiceVersion>()
            .map_err(|e| HarnessError::service(format!("unrecognised server version: {e}")))
    }

    async fn create_project(&self, key: &ProjectKey, name: &str) -> Result<()> {
        let request = self
            .post("api/projects/create")
            .form(&[("project", key.as_str()), ("name", name)]);
        self.send_ok(request, Operation::Provision).await?;
        Ok(())
    }

    async fn delete_project(&self, key: &ProjectKey) -> Result<()> {
        let request = self
            .post("api/projects/delete")
            .form(&[("project", key.as_str())]);
        let response = self.send(request, Operation::Provision).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure_success(response).await?;
        Ok(())
    }

    async fn restore_profile(&self, descriptor: &str) -> Result<()> {
        let part = multipart::Part::text(descriptor.to_string()).file_name("profile.xml");
        let request = self
            .post("api/qualityprofiles/restore")
            .multipart(multipart::Form::new().part("backup", part));
        self.send_ok(request, Operation::Provision).await?;
        Ok(())
    }

    async fn bind_profile(&self, key: &ProjectKey, binding: &QualityProfileBinding) -> Result<()> {
        let request = self.post("api/qualityprofiles/add_project").form(&[
            ("project", key.as_str()),
            ("language", binding.language.as_str()),
            ("qualityProfile", binding.profile.as_str()),
        ]);
        self.send_ok(request, Operation::Provision).await?;
        Ok(())
    }

    async fn create_rule(&self, rule: &CustomRule) -> Result<()> {
        let params = rule.encoded_params();
        let request = self.post("api/rules/create").form(&[
            ("name", rule.name.as_str()),
            ("severity", rule.severity.as_str()),
            ("custom_key", rule.custom_key.as_str()),
            ("markdown_description", rule.description.as_str()),
            ("template_key", rule.template_key.as_str()),
            ("params", params.as_str()),
        ]);
        self.send_ok(request, Operation::Provision).await?;
        Ok(())
    }

    async fn project_exists(&self, key: &ProjectKey) -> Result<bool> {
        let request = self
            .get("api/components/show")
            .query(&[("component", key.as_str())]);
        let found: Option<serde_json::Value> = self.fetch(request).await?;
        Ok(found.is_some())
    }

    async fn profile_bindings(&self, key: &ProjectKey) -> Result<Vec<QualityProfileBinding>> {
        let request = self
            .get("api/qualityprofiles/search")
            .query(&[("project", key.as_str())]);
        let search: Option<ProfileSearch> = self.fetch(request).await?;
        Ok(search
            .map(|s| s.profiles.into_iter().map(Into::into).collect())
            .unwrap_or_default())
    }

    async fn task_status(&self, key: &ProjectKey) -> Result<TaskStatus> {
        let request = self
            .get("api/ce/component")
            .query(&[("component", key.as_str())]);
        let tasks: Option<ComponentTasks> = self.fetch(request).await?;
        Ok(tasks.map(TaskStatus::from).unwrap_or_default())
    }

    async fn search_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        let mut issues = Vec::new();
        let mut page = 1usize;
        loop {
            let mut query = vec![("ps", PAGE_SIZE.to_string()), ("p", page.to_string())];
            if let Some(component) = &filter.component {
                let param = match filter.scope {
                    IssueScope::Root => "componentRoots",
                    IssueScope::Any => "componentKeys",
                };
                query.push((param, component.to_string()));
            }

            let request = self.get("api/issues/search").query(&query);
            let Some(body) = self.fetch::<IssuesPage>(request).await? else {
                // Unknown component root: nothing was analysed under it.
                return Ok(Vec::new());
            };

            let received = body.issues.len();
            for issue in body.issues {
                issues.push(issue.into_issue()?);
            }
            if received == 0 || page * PAGE_SIZE >= body.total {
                break;
            }
            page += 1;
        }
        Ok(issues)
    }

    async fn component_measure(&self, component: &ProjectKey, metric: &str) -> Result<Measure> {
        let request = self
            .get("api/measures/component")
            .query(&[("component", component.as_str()), ("metricKeys", metric)]);
        match self.fetch::<ComponentMeasures>(request).await? {
            Some(measures) => measures.into_measure(metric),
            None => Ok(Measure::Absent),
        }
    }
}
