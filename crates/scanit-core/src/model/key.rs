use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Segment separator of hierarchical component keys.
pub const KEY_SEPARATOR: char = ':';

/// Hierarchical component address: `project[:module[:file]]`.
///
/// The key is validated once on construction; every segment is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectKey(String);

impl ProjectKey {
    pub fn new(key: impl Into<String>) -> Result<Self, ConfigError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(ConfigError::EmptyProjectKey);
        }
        if let Some(index) = key.split(KEY_SEPARATOR).position(str::is_empty) {
            return Err(ConfigError::EmptyKeySegment { key, index });
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(KEY_SEPARATOR)
    }

    /// True when `self` is `root` or lies in the subtree below it.
    ///
    /// Matching is segment-aware: `p:mod` is not within `p:mo`.
    pub fn is_within(&self, root: &ProjectKey) -> bool {
        match self.0.strip_prefix(root.as_str()) {
            Some("") => true,
            Some(rest) => rest.starts_with(KEY_SEPARATOR),
            None => false,
        }
    }
}

impl fmt::Display for ProjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ProjectKey {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ProjectKey {
    type Error = ConfigError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProjectKey> for String {
    fn from(key: ProjectKey) -> Self {
        key.0
    }
}
