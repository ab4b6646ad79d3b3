//! Command-line front end: run one command under supervision and capture its output

use anyhow::{Context, Result};
use clap::Parser;
use command_supervisor::{
    Artifactory, AsyncExecutor, Descriptor, OutputNaming, Redirector, SupervisorConfig,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{Level, info};

#[derive(Parser)]
#[command(name = "supervise")]
#[command(about = "Run one command under supervision, capturing its output")]
#[command(version)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the artifacts of all runs
    #[arg(long)]
    reports_dir: Option<PathBuf>,

    /// Name of this run's artifact directory
    #[arg(long)]
    run_id: Option<String>,

    /// Seconds to wait before killing the command
    #[arg(short, long)]
    timeout: Option<f64>,

    /// Wait for the command however long it takes
    #[arg(long, conflicts_with = "timeout")]
    no_timeout: bool,

    /// Pass stdio straight through instead of capturing it
    #[arg(long)]
    passthrough: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// The command and its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;
    let exit_code = smol::block_on(run(&cli, &config))?;

    std::process::exit(shell_exit_code(exit_code));
}

fn load_config(cli: &Cli) -> Result<SupervisorConfig> {
    let mut config = match &cli.config {
        Some(path) => SupervisorConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => SupervisorConfig::new(
            cli.reports_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("reports")),
        ),
    };

    if let Some(dir) = &cli.reports_dir {
        config.reports_dir = dir.clone();
    }
    if let Some(run_id) = &cli.run_id {
        config = config.with_run_id(run_id.clone());
    }
    if cli.no_timeout {
        config = config.with_wait_timeout(None);
    } else if let Some(secs) = cli.timeout {
        config.wait_timeout_secs = Some(secs);
    }

    config.validate()?;
    Ok(config)
}

async fn run(cli: &Cli, config: &SupervisorConfig) -> Result<i32> {
    let (program, args) = cli
        .command
        .split_first()
        .context("no command given")?;

    let overrides: Vec<Redirector> = if cli.passthrough {
        Descriptor::ALL.map(Redirector::passthrough).into()
    } else {
        let mut artifactory = Artifactory::for_run(config);
        let outputs = OutputNaming::new().output_redirectors(program, &mut artifactory)?;
        for output in &outputs {
            if let Some(dir) = output.path().and_then(Path::parent) {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("creating artifact directory {}", dir.display()))?;
            }
        }
        Vec::from(outputs)
    };
    let captured: Vec<PathBuf> = overrides
        .iter()
        .filter_map(|r| r.path().map(Path::to_path_buf))
        .collect();

    let mut executor = AsyncExecutor::new(program);
    executor.start(overrides, args).await?;

    let timeout = config.wait_timeout();
    info!(
        pid = executor.pid(),
        timeout = ?timeout.map(|t: Duration| t.as_secs_f64()),
        "supervising {}",
        program
    );

    let meta = executor.wait_and_kill(timeout).await?;
    info!(exit_code = meta.exit_code, "{} finished", meta.process.command());

    for path in captured {
        println!("{}", path.display());
    }

    Ok(meta.exit_code)
}

/// Map signal deaths onto the usual 128+n shell convention
fn shell_exit_code(code: i32) -> i32 {
    if code < 0 { 128 - code } else { code.min(255) }
}
