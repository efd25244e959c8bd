//! Fixed catalog of log phrases emitted by the scanner.
//!
//! The scanner does not return structured error payloads; the captured
//! stdout/stderr text is the only signal of why a command failed. Matching
//! is a plain substring test against these phrases.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Diagnostic {
    NoAnalysableProjects,
    ProjectExcluded,
    UsageBanner,
    VerboseLogging,
    Downloading,
}

impl Diagnostic {
    pub const ALL: [Diagnostic; 5] = [
        Diagnostic::NoAnalysableProjects,
        Diagnostic::ProjectExcluded,
        Diagnostic::UsageBanner,
        Diagnostic::VerboseLogging,
        Diagnostic::Downloading,
    ];

    /// Phrases that explain a failed command, most specific first.
    pub const FAILURE_REASONS: [Diagnostic; 2] =
        [Diagnostic::NoAnalysableProjects, Diagnostic::ProjectExcluded];

    pub fn phrase(&self) -> &'static str {
        match self {
            Diagnostic::NoAnalysableProjects => "No analysable projects were found",
            Diagnostic::ProjectExcluded => {
                "The exclude flag has been set so the project will not be analyzed"
            }
            Diagnostic::UsageBanner => "Usage:",
            Diagnostic::VerboseLogging => "setting the log verbosity to 'Debug'",
            Diagnostic::Downloading => "Downloading from",
        }
    }

    pub fn is_present_in(&self, logs: &str) -> bool {
        logs.contains(self.phrase())
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.phrase())
    }
}

/// Every catalog phrase found in `logs`, in catalog order.
pub fn scan(logs: &str) -> Vec<Diagnostic> {
    Diagnostic::ALL
        .into_iter()
        .filter(|d| d.is_present_in(logs))
        .collect()
}

/// The failure reason carried by `logs`, if the scanner printed one.
pub fn failure_reason(logs: &str) -> Option<Diagnostic> {
    Diagnostic::FAILURE_REASONS
        .into_iter()
        .find(|d| d.is_present_in(logs))
}
