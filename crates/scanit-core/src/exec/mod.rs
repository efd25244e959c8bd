pub mod build;
pub mod process;

pub use build::{BuildInvoker, BuildOutcome, BuildRequest};
pub use process::{CommandOutput, CommandRunner, CommandSpec, ProcessError, TokioCommandRunner};
