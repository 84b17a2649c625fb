use clap::{ArgAction, Parser, Subcommand};
use fsjob_runner::{
    config::{ConfigErrors, Context, RunnerConfig},
    executors::Executors,
    launcher::{LaunchError, Launcher},
    terminator::{TerminateError, Terminator},
    waiter::{WaitError, WaitOutcome, Waiter},
};
use std::{error::Error as _, path::PathBuf, process::exit, time::Duration};
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Runner config (YAML), defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides `rootdir` of the runner config
    #[arg(long)]
    rootdir: Option<PathBuf>,

    /// Overrides `rundir` of the runner config
    #[arg(long)]
    rundir: Option<PathBuf>,

    /// Print command lines instead of executing them
    #[arg(long)]
    dry_run: bool,

    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[arg(short, long, action = ArgAction::Count, conflicts_with = "verbose")]
    quiet: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Launch one job of GROUP per host and return
    Launch {
        group: String,
        /// One entry per job, the local host value runs on this machine
        #[arg(required = true)]
        hosts: Vec<String>,
        /// Config file handed to every worker, defaults to <run dir>/config.yaml
        #[arg(long)]
        job_config: Option<PathBuf>,
    },
    /// Launch, then block until every job left its finished marker
    Run {
        group: String,
        #[arg(required = true)]
        hosts: Vec<String>,
        #[arg(long)]
        job_config: Option<PathBuf>,
        /// Give up waiting after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Kill the jobs still pending when the wait times out
        #[arg(long, requires = "timeout_ms")]
        kill_on_timeout: bool,
    },
    /// Kill jobs recorded in the pid directory
    Kill {
        /// Only kill jobs whose pid file stem matches one of these paths
        subset: Vec<PathBuf>,
    },
}

#[derive(Error, Debug)]
enum CliError {
    #[error("Failed to load config")]
    Config(#[from] ConfigErrors),
    #[error("Launch aborted")]
    Launch(#[from] LaunchError),
    #[error("Wait aborted")]
    Wait(#[from] WaitError),
    #[error("Kill aborted")]
    Terminate(#[from] TerminateError),
    #[error("{0} jobs did not finish")]
    Unfinished(usize),
}

fn init_tracing(verbose: u8, quiet: u8) {
    let level = match (quiet, verbose) {
        (0, 0) => "info",
        (0, 1) => "debug",
        (0, _) => "trace",
        (1, _) => "warn",
        _ => "error",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<RunnerConfig, ConfigErrors> {
    let mut config = match &cli.config {
        Some(path) => RunnerConfig::load(path)?,
        None => RunnerConfig::default(),
    };

    if let Some(rootdir) = &cli.rootdir {
        config.rootdir = rootdir.clone();
    }
    if let Some(rundir) = &cli.rundir {
        config.rundir = rundir.clone();
    }

    config.preflight_checks()?;

    Ok(config)
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(&cli)?;
    let context = Context::detect(&config.propagate_env)?;
    info!(
        user = %context.username,
        host = %context.hostname,
        "Using run directory {}",
        config.rootdir.join(&config.rundir).to_string_lossy()
    );

    match cli.command {
        Commands::Launch {
            group,
            hosts,
            job_config,
        } => {
            let mut launcher =
                Launcher::new(&config, context, Executors::load(&config, cli.dry_run));
            launcher.launch(&group, hosts.as_slice(), job_config.as_deref())?;

            info!("Launched {} jobs of group={group}", launcher.records().len());
        }
        Commands::Run {
            group,
            hosts,
            job_config,
            timeout_ms,
            kill_on_timeout,
        } => {
            let mut launcher = Launcher::new(
                &config,
                context.clone(),
                Executors::load(&config, cli.dry_run),
            );
            launcher.launch(&group, hosts.as_slice(), job_config.as_deref())?;

            if cli.dry_run {
                info!("Dry run, not waiting for finished markers");
                return Ok(());
            }

            let waiter = Waiter::new(&config).with_deadline(
                timeout_ms
                    .map(Duration::from_millis)
                    .or_else(|| config.wait_timeout()),
            );

            match waiter.wait(launcher.records())? {
                WaitOutcome::Completed => {}
                outcome => {
                    let pending = outcome.pending();
                    warn!("{} jobs did not finish in time", pending.len());

                    if kill_on_timeout {
                        let mut terminator =
                            Terminator::new(&config, context, Executors::load(&config, false));
                        let report = terminator.kill_all(Some(pending))?;

                        info!(
                            "Killed {} jobs, {} kills failed",
                            report.succeeded(),
                            report.failed()
                        );
                    }

                    return Err(CliError::Unfinished(pending.len()));
                }
            }
        }
        Commands::Kill { subset } => {
            let mut terminator =
                Terminator::new(&config, context, Executors::load(&config, cli.dry_run));
            let subset = (!subset.is_empty()).then_some(subset.as_slice());
            let report = terminator.kill_all(subset)?;

            info!(
                "Killed {} jobs, {} kills failed",
                report.succeeded(),
                report.failed()
            );
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Err(error) = run(cli) {
        error!("{error}");

        let mut source = error.source();
        while let Some(cause) = source {
            error!("  caused by: {cause}");
            source = cause.source();
        }

        exit(1);
    }
}
