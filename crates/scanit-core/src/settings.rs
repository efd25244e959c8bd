//! Layered analysis settings.
//!
//! Lookups consult the command line first, then the properties file, then
//! the environment. Keys are case-sensitive.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;

use crate::error::{ConfigError, HarnessError, Result};
use crate::session::config::AnalysisParam;

/// Environment variable holding a JSON object of analysis parameters.
pub const ENV_PARAMS_VAR: &str = "SCANIT_ANALYSIS_PARAMS";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyLayer {
    values: BTreeMap<String, String>,
}

impl PropertyLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn from_params(params: &[AnalysisParam]) -> Self {
        let mut layer = Self::new();
        for param in params {
            layer.insert(&param.key, &param.value);
        }
        layer
    }

    /// `key=value` lines; blank lines and `#` comments are skipped.
    pub fn parse_properties(text: &str) -> std::result::Result<Self, ConfigError> {
        let mut layer = Self::new();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .filter(|(key, _)| !key.trim().is_empty())
                .ok_or_else(|| ConfigError::MalformedProperties {
                    line: index + 1,
                    content: raw.to_string(),
                })?;
            layer.insert(key.trim(), value.trim());
        }
        Ok(layer)
    }

    pub fn load_properties(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read properties file: {}", path.display()))
            .map_err(HarnessError::Io)?;
        Ok(Self::parse_properties(&text)?)
    }

    /// Flat JSON object of string, number or boolean values.
    pub fn parse_env_json(json: &str) -> std::result::Result<Self, ConfigError> {
        let object: BTreeMap<String, serde_json::Value> = serde_json::from_str(json)
            .map_err(|e| ConfigError::MalformedEnvironment(e.to_string()))?;

        let mut layer = Self::new();
        for (key, value) in object {
            let value = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                other => {
                    return Err(ConfigError::MalformedEnvironment(format!(
                        "value of `{key}` must be a scalar, found {other}"
                    )));
                }
            };
            layer.insert(key, value);
        }
        Ok(layer)
    }

    /// Reads `SCANIT_ANALYSIS_PARAMS`; an unset variable is an empty layer.
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        match std::env::var(ENV_PARAMS_VAR) {
            Ok(json) if !json.trim().is_empty() => Self::parse_env_json(&json),
            _ => Ok(Self::new()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    command_line: PropertyLayer,
    file: PropertyLayer,
    environment: PropertyLayer,
}

impl Settings {
    pub fn new(
        command_line: PropertyLayer,
        file: PropertyLayer,
        environment: PropertyLayer,
    ) -> Self {
        Self {
            command_line,
            file,
            environment,
        }
    }

    pub fn try_get(&self, key: &str) -> Option<&str> {
        self.command_line
            .get(key)
            .or_else(|| self.file.get(key))
            .or_else(|| self.environment.get(key))
    }

    pub fn get(&self, key: &str) -> std::result::Result<&str, ConfigError> {
        self.try_get(key)
            .ok_or_else(|| ConfigError::MissingSetting(key.to_string()))
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.try_get(key).unwrap_or(default)
    }

    /// Every key from every layer with the value `try_get` would return.
    pub fn resolved(&self) -> BTreeMap<&str, &str> {
        let mut merged = BTreeMap::new();
        for layer in [&self.environment, &self.file, &self.command_line] {
            merged.extend(layer.iter());
        }
        merged
    }
}
