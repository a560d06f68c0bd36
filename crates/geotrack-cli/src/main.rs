use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;
mod format;
mod style;
mod util;

use cli::{Cli, Commands};
use commands::{
    JobsArgs, ListArgs, PreviewArgs, RefreshArgs, WatchArgs, WorkerArgs, cmd_clear, cmd_config,
    cmd_jobs, cmd_list, cmd_preview, cmd_refresh, cmd_watch, cmd_worker,
};
use config::Config;
use format::FormatOptions;
use util::{open_store, open_tracker};

#[tokio::main]
async fn main() -> Result<()> {
    human_panic::setup_panic!();

    let cli = Cli::parse();

    // Handle completions command early (before tracing init)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "geotrack", &mut io::stdout());
        return Ok(());
    }

    // --quiet wins over --verbose; otherwise RUST_LOG, then warn
    let filter = if cli.quiet {
        EnvFilter::new("error")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(Config::path);
    let opts = FormatOptions::new(cli.no_color, cli.compact);

    if let Commands::Config { action } = &cli.command {
        return cmd_config(action, &config_path, &opts);
    }

    let config = Config::load(&config_path)?.with_env_overrides();
    config.validate()?;
    let db_path: PathBuf = cli.db.clone().unwrap_or_else(|| config.storage.path.clone());
    tracing::debug!("Using database {}", db_path.display());

    let output = cli.output.as_ref();
    let quiet = cli.quiet;

    match cli.command {
        Commands::Refresh { wait, timeout } => {
            let tracker = open_tracker(&config, &db_path)?;
            cmd_refresh(
                &tracker,
                RefreshArgs {
                    wait,
                    timeout: Duration::from_secs(timeout),
                    output,
                    quiet,
                    opts: &opts,
                },
            )
            .await?;
        }
        Commands::List {
            format,
            limit,
            since,
            until,
            no_header,
        } => {
            let store = open_store(&db_path)?;
            cmd_list(
                &store,
                ListArgs {
                    format,
                    limit,
                    since,
                    until,
                    output,
                    opts: &opts.with_no_header(no_header),
                },
            )?;
        }
        Commands::Watch { no_worker } => {
            let tracker = open_tracker(&config, &db_path)?;
            cmd_watch(
                &tracker,
                WatchArgs {
                    run_worker: !no_worker,
                    quiet,
                    opts: &opts,
                },
            )
            .await?;
        }
        Commands::Worker { once } => {
            let tracker = open_tracker(&config, &db_path)?;
            cmd_worker(
                &tracker,
                WorkerArgs {
                    once,
                    quiet,
                    opts: &opts,
                },
            )
            .await?;
        }
        Commands::Jobs {
            limit,
            format,
            no_header,
        } => {
            let store = open_store(&db_path)?;
            cmd_jobs(
                &store,
                JobsArgs {
                    limit,
                    format,
                    output,
                    opts: &opts.with_no_header(no_header),
                },
            )?;
        }
        Commands::Clear { yes } => {
            let store = open_store(&db_path)?;
            cmd_clear(&store, yes, quiet, &opts)?;
        }
        Commands::Preview { id, width, height } => {
            let store = open_store(&db_path)?;
            cmd_preview(
                &store,
                &config,
                PreviewArgs {
                    id,
                    width,
                    height,
                    output,
                    quiet,
                    opts: &opts,
                },
            )
            .await?;
        }
        // Handled before the config is loaded
        Commands::Config { .. } | Commands::Completions { .. } => {}
    }

    Ok(())
}
