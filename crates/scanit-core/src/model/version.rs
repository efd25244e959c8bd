use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// `major.minor[.patch]` of the analysis service. Build suffixes such as
/// `6.7.1.38345` or `7.0-SNAPSHOT` are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ServiceVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            patch: 0,
        }
    }
}

impl FromStr for ServiceVersion {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidVersion(raw.to_string());
        let release = raw.trim().split(['-', ' ']).next().unwrap_or_default();
        let mut parts = release.split('.').map(|p| p.parse::<u32>());

        let major = parts.next().and_then(|p| p.ok()).ok_or_else(invalid)?;
        let minor = parts.next().and_then(|p| p.ok()).ok_or_else(invalid)?;
        let patch = match parts.next() {
            Some(p) => p.map_err(|_| invalid())?,
            None => 0,
        };
        Ok(Self {
            major,
            minor,
            patch,
        })
    }
}

impl fmt::Display for ServiceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
