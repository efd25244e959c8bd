pub mod catalog;
pub mod model;
pub mod runner;

pub use model::{ExpectedOutcome, Mode, Precondition, Provisioning, Scenario, SessionPlan};
pub use runner::ScenarioRunner;
