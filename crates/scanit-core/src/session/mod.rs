pub mod config;
pub mod controller;
pub mod diagnostics;
pub mod state;

pub use config::{AnalysisParam, BeginConfig, EndConfig, VERBOSE_PARAM};
pub use controller::{BeginReport, EndReport, ScannerCommand, SessionController, Timeouts};
pub use diagnostics::Diagnostic;
pub use state::{
    AnalysisSession, CorrelationToken, EndOutcome, SessionLease, SessionRegistry, SessionState,
};
