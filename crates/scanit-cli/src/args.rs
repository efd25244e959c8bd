use std::path::PathBuf;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use scanit_core::session::Timeouts;

#[derive(Debug, Parser)]
#[command(
    name = "scanit",
    version,
    about = "Verification harness for the MSBuild analysis begin/build/end workflow"
)]
pub struct Args {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List built-in scenarios
    List {
        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
    /// Run scenarios against the configured analysis service
    Run(RunArgs),
    /// Only check that the scanner prints its usage banner
    HelpCheck {
        #[command(flatten)]
        connection: Connection,
    },
}

#[derive(Debug, ClapArgs)]
pub struct RunArgs {
    /// Scenario to run; repeatable, in order
    #[arg(long = "scenario", value_name = "NAME", conflicts_with = "all")]
    pub scenarios: Vec<String>,

    /// Run every built-in scenario (the default when none is named)
    #[arg(long)]
    pub all: bool,

    /// Output format
    #[arg(long, default_value = "json")]
    pub format: OutputFormat,

    /// Write output to a file instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Optional git commit hash for tool metadata
    #[arg(long)]
    pub commit: Option<String>,

    #[command(flatten)]
    pub connection: Connection,

    #[command(flatten)]
    pub timeouts: TimeoutArgs,
}

/// Where the scanner, the build tool and the service live.
#[derive(Debug, Clone, ClapArgs)]
pub struct Connection {
    /// Analysis service base URL (sonar.host.url)
    #[arg(long, env = "SCANIT_SERVER_URL")]
    pub server_url: Option<String>,

    /// Service login (sonar.login)
    #[arg(long, env = "SCANIT_LOGIN")]
    pub login: Option<String>,

    /// Service password (sonar.password)
    #[arg(long, env = "SCANIT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Scanner executable driving begin/end
    #[arg(long, env = "SCANIT_SCANNER", default_value = "SonarScanner.MSBuild.exe")]
    pub scanner: PathBuf,

    /// Released scanner version under test; leave unset for a local build
    #[arg(long, env = "SCANIT_SCANNER_VERSION")]
    pub scanner_version: Option<String>,

    /// Native build executable
    #[arg(long, env = "SCANIT_MSBUILD", default_value = "msbuild")]
    pub msbuild: PathBuf,

    /// Directory holding fixture projects and profile backups
    #[arg(long, env = "SCANIT_FIXTURES", default_value = "projects")]
    pub fixtures: PathBuf,

    /// Analysis property `key=value` passed to every begin; repeatable,
    /// beats file and environment
    #[arg(long = "property", short = 'd', value_name = "KEY=VALUE")]
    pub properties: Vec<String>,

    /// Properties file; beats the environment
    #[arg(long, env = "SCANIT_PROPERTIES_FILE")]
    pub properties_file: Option<PathBuf>,
}

#[derive(Debug, Clone, ClapArgs)]
pub struct TimeoutArgs {
    /// Seconds allowed for registration checks plus `begin`
    #[arg(long, default_value_t = 300)]
    pub begin_timeout: u64,

    /// Seconds allowed for the native build
    #[arg(long, default_value_t = 600)]
    pub build_timeout: u64,

    /// Seconds allowed for `end` plus settlement
    #[arg(long, default_value_t = 600)]
    pub end_timeout: u64,

    /// Seconds allowed for each provisioning or result query
    #[arg(long, default_value_t = 30)]
    pub query_timeout: u64,

    /// Milliseconds between settlement polls
    #[arg(long, default_value_t = 500)]
    pub poll_interval_ms: u64,
}

impl TimeoutArgs {
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            begin: Duration::from_secs(self.begin_timeout),
            build: Duration::from_secs(self.build_timeout),
            end: Duration::from_secs(self.end_timeout),
            query: Duration::from_secs(self.query_timeout),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

impl Default for TimeoutArgs {
    fn default() -> Self {
        let defaults = Timeouts::default();
        Self {
            begin_timeout: defaults.begin.as_secs(),
            build_timeout: defaults.build.as_secs(),
            end_timeout: defaults.end.as_secs(),
            query_timeout: defaults.query.as_secs(),
            poll_interval_ms: defaults.poll_interval.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}
