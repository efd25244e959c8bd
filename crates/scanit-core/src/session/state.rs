use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::config::BeginConfig;
use super::diagnostics::Diagnostic;
use crate::error::SessionStateError;
use crate::model::ProjectKey;

/// Correlates a `begin` with its `end` and with the analysis it submits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationToken {
    pub session_id: Uuid,
    /// Latest background task id observed before `begin`; settlement waits
    /// for a newer one.
    pub baseline_task: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EndOutcome {
    Success,
    Failure {
        reason: String,
        diagnostic: Option<Diagnostic>,
    },
}

impl EndOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, EndOutcome::Success)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Began {
        key: ProjectKey,
        token: CorrelationToken,
    },
    Built {
        key: ProjectKey,
        token: CorrelationToken,
        build_exit_code: Option<i32>,
    },
    Ended {
        key: ProjectKey,
        token: CorrelationToken,
        outcome: EndOutcome,
    },
    Rejected {
        reason: String,
    },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Began { .. } => "began",
            SessionState::Built { .. } => "built",
            SessionState::Ended { outcome: EndOutcome::Success, .. } => "ended(success)",
            SessionState::Ended { .. } => "ended(failure)",
            SessionState::Rejected { .. } => "rejected",
        }
    }

    /// A new `begin` is allowed from here.
    pub fn accepts_begin(&self) -> bool {
        matches!(
            self,
            SessionState::Idle | SessionState::Ended { .. } | SessionState::Rejected { .. }
        )
    }

    pub fn key(&self) -> Option<&ProjectKey> {
        match self {
            SessionState::Began { key, .. }
            | SessionState::Built { key, .. }
            | SessionState::Ended { key, .. } => Some(key),
            SessionState::Idle | SessionState::Rejected { .. } => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One begin→end cycle run from a project directory.
///
/// State changes only through `SessionController`.
#[derive(Debug)]
pub struct AnalysisSession {
    working_dir: PathBuf,
    config: Option<BeginConfig>,
    state: SessionState,
    lease: Option<SessionLease>,
}

impl AnalysisSession {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            config: None,
            state: SessionState::Idle,
            lease: None,
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn config(&self) -> Option<&BeginConfig> {
        self.config.as_ref()
    }

    /// Issues and measures may be queried only after this returns true.
    pub fn is_queryable(&self) -> bool {
        matches!(
            self.state,
            SessionState::Ended {
                outcome: EndOutcome::Success,
                ..
            }
        )
    }

    pub(crate) fn start(
        &mut self,
        config: BeginConfig,
        lease: SessionLease,
        token: CorrelationToken,
    ) {
        self.state = SessionState::Began {
            key: lease.key.clone(),
            token,
        };
        self.config = Some(config);
        self.lease = Some(lease);
    }

    pub(crate) fn reject(&mut self, config: Option<BeginConfig>, reason: impl Into<String>) {
        self.config = config;
        self.lease = None;
        self.state = SessionState::Rejected {
            reason: reason.into(),
        };
    }

    pub(crate) fn mark_built(
        &mut self,
        build_exit_code: Option<i32>,
    ) -> Result<(), SessionStateError> {
        match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Began { key, token } => {
                self.state = SessionState::Built {
                    key,
                    token,
                    build_exit_code,
                };
                Ok(())
            }
            other => {
                let state = other.name();
                self.state = other;
                Err(SessionStateError::NotBegun { state })
            }
        }
    }

    /// Moves a began or built session to `Ended` and releases its key.
    pub(crate) fn finish(&mut self, outcome: EndOutcome) {
        let state = std::mem::replace(&mut self.state, SessionState::Idle);
        self.state = match state {
            SessionState::Began { key, token } | SessionState::Built { key, token, .. } => {
                SessionState::Ended {
                    key,
                    token,
                    outcome,
                }
            }
            other => other,
        };
        self.lease = None;
    }

    pub(crate) fn built_token(&self) -> Result<(ProjectKey, CorrelationToken), SessionStateError> {
        match &self.state {
            SessionState::Built { key, token, .. } => Ok((key.clone(), token.clone())),
            other => Err(SessionStateError::NotBuilt { state: other.name() }),
        }
    }
}

/// Project keys with a session in flight, shared by every controller that
/// talks to the same service.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    active: Arc<Mutex<HashSet<ProjectKey>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&self, key: &ProjectKey) -> Result<SessionLease, SessionStateError> {
        let mut active = self.active.lock();
        if !active.insert(key.clone()) {
            return Err(SessionStateError::AlreadyActive {
                project_key: key.to_string(),
            });
        }
        Ok(SessionLease {
            key: key.clone(),
            active: Arc::clone(&self.active),
        })
    }

    pub fn is_active(&self, key: &ProjectKey) -> bool {
        self.active.lock().contains(key)
    }
}

/// Exclusive hold on a project key; released on drop.
#[derive(Debug)]
pub struct SessionLease {
    key: ProjectKey,
    active: Arc<Mutex<HashSet<ProjectKey>>>,
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.active.lock().remove(&self.key);
    }
}
