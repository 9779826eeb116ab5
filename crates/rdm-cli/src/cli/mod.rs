//! CLI for the RDM download manager.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rdm_core::config;
use std::path::PathBuf;

use commands::run_get;

/// Top-level CLI for the RDM download manager.
#[derive(Debug, Parser)]
#[command(name = "rdm")]
#[command(about = "RDM: resumable chunked download manager", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download one or more URLs, resuming any persisted progress.
    Get {
        /// Direct HTTP/HTTPS URLs to download.
        #[arg(required = true)]
        urls: Vec<String>,

        /// Output directory (default: current directory).
        #[arg(long)]
        out: Option<PathBuf>,

        /// Run up to N downloads concurrently (default from config).
        #[arg(long, value_name = "N")]
        jobs: Option<usize>,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Get { urls, out, jobs } => {
                let out_dir = match out {
                    Some(dir) => dir,
                    None => std::env::current_dir()?,
                };
                run_get(&cfg, &urls, &out_dir, jobs).await?;
            }
        }

        Ok(())
    }
}
