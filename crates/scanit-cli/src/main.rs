use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use scanit_core::exec::TokioCommandRunner;
use scanit_core::report::model::{EXIT_FAILED, EXIT_HARNESS_ERROR, EXIT_PASSED, ToolInfo};
use scanit_core::report::render;
use scanit_core::scenario::{ScenarioRunner, catalog};
use scanit_core::service::{HttpAnalysisService, ServiceConnection};
use scanit_core::session::config::AnalysisParam;
use scanit_core::session::controller::{HOST_URL, LOGIN, PASSWORD};
use scanit_core::session::{ScannerCommand, SessionController, Timeouts};
use scanit_core::settings::{PropertyLayer, Settings};

mod args;

use args::{Args, Command, Connection, OutputFormat, RunArgs};

const DEFAULT_SERVER_URL: &str = "http://localhost:9000";

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    let code = match dispatch(args).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            eprintln!("error: {err:#}");
            EXIT_HARNESS_ERROR
        }
    };
    std::process::exit(code);
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn dispatch(args: Args) -> Result<i32> {
    match args.command {
        Command::List { format } => list(format),
        Command::Run(run_args) => run(run_args).await,
        Command::HelpCheck { connection } => help_check(&connection).await,
    }
}

fn list(format: OutputFormat) -> Result<i32> {
    let scenarios = catalog::builtin()?;
    let output = match format {
        OutputFormat::Json => {
            let entries: Vec<_> = scenarios
                .iter()
                .map(|s| {
                    json!({
                        "name": s.name,
                        "description": s.description,
                        "fixture": s.fixture,
                        "project_key": s.project_key(),
                        "preconditions": s.preconditions,
                    })
                })
                .collect();
            serde_json::to_string_pretty(&entries)? + "\n"
        }
        OutputFormat::Text => scenarios
            .iter()
            .map(|s| format!("{:<24}{}\n", s.name, s.description))
            .collect(),
    };
    print!("{output}");
    Ok(EXIT_PASSED)
}

async fn run(args: RunArgs) -> Result<i32> {
    // `--all` and no `--scenario` both select the whole catalog.
    let names: &[String] = if args.all { &[] } else { &args.scenarios };
    let scenarios = catalog::select(names)?;
    let runner = scenario_runner(&args.connection, args.timeouts.timeouts())?;

    let tool = ToolInfo {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: args.commit.clone(),
    };
    info!(scenarios = scenarios.len(), "running scenarios");
    let report = runner.run_all(&scenarios, tool).await;

    let output = match args.format {
        OutputFormat::Json => serde_json::to_string_pretty(&report)? + "\n",
        OutputFormat::Text => render::render_text(&report),
    };
    write_output(args.out.as_deref(), &output)?;
    Ok(report.exit_code)
}

async fn help_check(connection: &Connection) -> Result<i32> {
    let runner = scenario_runner(connection, Timeouts::default())?;
    match runner.controller().help(None).await {
        Ok(_) => {
            println!("usage banner found");
            Ok(EXIT_PASSED)
        }
        Err(err) => {
            eprintln!("help check failed: {err}");
            Ok(EXIT_FAILED)
        }
    }
}

fn write_output(out: Option<&Path>, output: &str) -> Result<()> {
    match out {
        Some(path) => std::fs::write(path, output)
            .with_context(|| format!("failed to write report: {}", path.display())),
        None => {
            print!("{output}");
            Ok(())
        }
    }
}

/// Command line beats the properties file, which beats the environment.
fn settings(connection: &Connection) -> Result<Settings> {
    let params = connection
        .properties
        .iter()
        .map(|raw| AnalysisParam::parse(raw))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let mut command_line = PropertyLayer::from_params(&params);
    for (key, value) in [
        (HOST_URL, &connection.server_url),
        (LOGIN, &connection.login),
        (PASSWORD, &connection.password),
    ] {
        if let Some(value) = value {
            command_line.insert(key, value);
        }
    }

    let file = match &connection.properties_file {
        Some(path) => PropertyLayer::load_properties(path)?,
        None => PropertyLayer::new(),
    };
    Ok(Settings::new(command_line, file, PropertyLayer::from_env()?))
}

fn scenario_runner(connection: &Connection, timeouts: Timeouts) -> Result<ScenarioRunner> {
    let settings = settings(connection)?;

    let mut service_connection = ServiceConnection::new(
        settings.get_or(HOST_URL, DEFAULT_SERVER_URL),
        timeouts.query,
    );
    if let Some(login) = settings.try_get(LOGIN) {
        service_connection = service_connection
            .credentials(login, settings.try_get(PASSWORD).map(str::to_string));
    }
    let service = Arc::new(HttpAnalysisService::new(service_connection)?);
    let processes = Arc::new(TokioCommandRunner);

    let controller = SessionController::new(
        processes.clone(),
        service.clone(),
        ScannerCommand::from_settings(&connection.scanner, &settings),
        timeouts,
    );
    Ok(ScenarioRunner::new(
        controller,
        service,
        processes,
        &connection.msbuild,
        &connection.fixtures,
    )
    .scanner_version(connection.scanner_version.clone()))
}
