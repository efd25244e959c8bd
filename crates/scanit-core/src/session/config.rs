//! Begin/end configuration and its rendering to scanner arguments.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::ProjectKey;

pub const VERBOSE_PARAM: &str = "sonar.verbose";

/// One `/d:<key>=<value>` analysis parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisParam {
    pub key: String,
    pub value: String,
}

impl AnalysisParam {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let reason = if self.key.is_empty() {
            "key is empty"
        } else if self.key.contains('=') {
            "key contains `=`"
        } else if self.key.chars().any(char::is_whitespace) {
            "key contains whitespace"
        } else {
            return Ok(());
        };
        Err(ConfigError::InvalidParameter {
            key: self.key.clone(),
            reason,
        })
    }

    pub fn to_arg(&self) -> String {
        format!("/d:{}={}", self.key, self.value)
    }

    /// Parses `key=value` as accepted on the harness command line.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let (key, value) = raw.split_once('=').ok_or_else(|| ConfigError::InvalidParameter {
            key: raw.to_string(),
            reason: "expected `key=value`",
        })?;
        let param = Self::new(key.trim(), value);
        param.validate()?;
        Ok(param)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeginConfig {
    pub project_key: String,
    pub project_name: Option<String>,
    pub project_version: Option<String>,
    /// Renders `/d:sonar.verbose=true`.
    pub verbose: bool,
    pub parameters: Vec<AnalysisParam>,
    /// Raw arguments appended verbatim after all rendered flags.
    pub extra_arguments: Vec<String>,
}

impl BeginConfig {
    pub fn new(project_key: impl Into<String>) -> Self {
        Self {
            project_key: project_key.into(),
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.project_name = Some(name.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.project_version = Some(version.into());
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push(AnalysisParam::new(key, value));
        self
    }

    pub fn extra_argument(mut self, arg: impl Into<String>) -> Self {
        self.extra_arguments.push(arg.into());
        self
    }

    /// Checks the config without side effects and returns the parsed key.
    pub fn validate(&self) -> Result<ProjectKey, ConfigError> {
        let key = ProjectKey::new(self.project_key.as_str())?;
        self.parameters.iter().try_for_each(AnalysisParam::validate)?;
        Ok(key)
    }

    pub fn to_args(&self, key: &ProjectKey, connection: &[AnalysisParam]) -> Vec<String> {
        let mut args = vec!["begin".to_string(), format!("/k:{key}")];
        if let Some(name) = &self.project_name {
            args.push(format!("/n:{name}"));
        }
        if let Some(version) = &self.project_version {
            args.push(format!("/v:{version}"));
        }
        args.extend(connection.iter().map(AnalysisParam::to_arg));
        if self.verbose {
            args.push(AnalysisParam::new(VERBOSE_PARAM, "true").to_arg());
        }
        args.extend(self.parameters.iter().map(AnalysisParam::to_arg));
        args.extend(self.extra_arguments.iter().cloned());
        args
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndConfig {
    pub verbose: bool,
    pub parameters: Vec<AnalysisParam>,
}

impl EndConfig {
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push(AnalysisParam::new(key, value));
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parameters.iter().try_for_each(AnalysisParam::validate)
    }

    pub fn to_args(&self, connection: &[AnalysisParam]) -> Vec<String> {
        let mut args = vec!["end".to_string()];
        args.extend(connection.iter().map(AnalysisParam::to_arg));
        if self.verbose {
            args.push(AnalysisParam::new(VERBOSE_PARAM, "true").to_arg());
        }
        args.extend(self.parameters.iter().map(AnalysisParam::to_arg));
        args
    }
}
