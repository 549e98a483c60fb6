use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use surfsense_api::{AppState, HttpServer};
use surfsense_core::{telemetry, AppConfig, SpoolBroker};
use surfsense_supervisor::{
    child, reload, signals, Cli, ReloadWatcher, RunOutcome, SelfExecLauncher, Supervisor,
    SupervisorConfig,
};
use tracing::info;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "fatal error");
            eprintln!("surfsense: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = AppConfig::load().context("invalid configuration")?;
    telemetry::init_tracing(&config.logging)?;

    if let Some(command) = cli.command {
        return Ok(child::run_child(command.role(), config));
    }

    let program = std::env::current_exe().context("cannot locate the running executable")?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build the async runtime")?;
    let outcome = runtime.block_on(supervise(&cli, config, program.clone()))?;
    drop(runtime);

    match outcome {
        RunOutcome::ReloadRequested => Ok(reload::restart(&program)?),
        outcome => Ok(ExitCode::from(outcome.exit_code())),
    }
}

async fn supervise(cli: &Cli, config: AppConfig, program: PathBuf) -> Result<RunOutcome> {
    let server_config = config.server.clone().with_reload(cli.reload);
    let plan = cli.launch_plan();
    info!(
        address = %server_config.address(),
        children = ?plan.roles(),
        reload = server_config.reload,
        "starting SurfSense"
    );

    let broker = SpoolBroker::open(&config.broker.spool_dir)
        .await
        .context("failed to open the task spool")?;
    let state = AppState::new(Arc::new(broker));

    let mut supervisor = Supervisor::new(
        SupervisorConfig::new(plan).with_grace(server_config.shutdown_grace),
        SelfExecLauncher::new(&program),
    );
    let _signals = signals::install(supervisor.shutdown_token())?;
    if server_config.reload {
        supervisor = supervisor.with_reload_watcher(ReloadWatcher::new(&program));
    }

    let report = supervisor
        .run(move |shutdown| async move {
            let server = HttpServer::bind(&server_config, state).await?;
            server.run(shutdown).await
        })
        .await;

    Ok(report.outcome)
}
