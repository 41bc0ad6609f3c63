//! Command line of an adapter binary.
//!
//! Martian invokes `<adapter> martian <stage> <phase> <metadata> <files> <run_file>`;
//! developers run `<adapter> mro` to regenerate the stage definitions.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;

use crate::config::{AdapterConfig, MARTIAN_ERROR_FD, MARTIAN_LOG_FD};
use crate::registry::StageRegistry;
use crate::{martian_main_with_config, martian_make_mro};

#[derive(Debug, Parser)]
#[command(version, about = "Martian adapter for Rust stages")]
pub struct AdapterCli {
    /// Maximum level written to the Martian log
    #[arg(long, env = "MARTIAN_LOG_LEVEL", default_value = "debug", global = true)]
    log_level: LevelFilter,

    /// Seconds between heartbeat journal updates
    #[arg(long, env = "MARTIAN_HEARTBEAT_SECS", default_value_t = 120, global = true)]
    heartbeat_secs: u64,

    /// Do not copy log lines to stdout
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: AdapterCommand,
}

#[derive(Debug, Subcommand)]
enum AdapterCommand {
    /// Run one phase of a stage (invoked by Martian)
    Martian {
        /// Stage key, as in `src comp "<adapter> martian <stage>"`
        stage: String,
        /// split, main or join
        phase: String,
        /// Metadata directory holding _args, _jobinfo, ...
        metadata: PathBuf,
        /// Directory for files the stage creates
        files: PathBuf,
        /// Journal prefix
        run_file: PathBuf,
    },
    /// Print or write the MRO definitions of this adapter's stages
    Mro {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Replace the file if it exists
        #[arg(long)]
        rewrite: bool,

        /// Only these stage keys (default: all)
        #[arg(long = "stage")]
        stages: Vec<String>,
    },
}

impl AdapterCli {
    fn config(&self) -> AdapterConfig {
        AdapterConfig {
            log_level: self.log_level,
            heartbeat_interval: Duration::from_secs(self.heartbeat_secs.max(1)),
            log_fd: MARTIAN_LOG_FD,
            error_fd: MARTIAN_ERROR_FD,
            log_to_stdout: !self.quiet,
        }
    }
}

/// The whole `main` of an adapter binary.
pub fn run_adapter(adapter_name: &str, registry: &StageRegistry) -> ExitCode {
    run_adapter_from(adapter_name, registry, std::env::args_os())
}

pub fn run_adapter_from<I, T>(adapter_name: &str, registry: &StageRegistry, args: I) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match AdapterCli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match dispatch(adapter_name, registry, cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(adapter_name: &str, registry: &StageRegistry, cli: AdapterCli) -> Result<()> {
    let config = cli.config();
    match cli.command {
        AdapterCommand::Martian {
            stage,
            phase,
            metadata,
            files,
            run_file,
        } => {
            let args = vec![
                stage,
                phase,
                metadata.display().to_string(),
                files.display().to_string(),
                run_file.display().to_string(),
            ];
            martian_main_with_config(args, registry, &config)
        }
        AdapterCommand::Mro {
            file,
            rewrite,
            stages,
        } => {
            let mut stage_mros = registry.stage_mros(adapter_name)?;
            if !stages.is_empty() {
                for key in &stages {
                    if registry.get(key).is_none() {
                        bail!("Unknown stage {key}");
                    }
                }
                stage_mros.retain(|m| stages.iter().any(|key| key == m.stage_key()));
            }
            martian_make_mro(file.as_deref(), rewrite, &stage_mros)
        }
    }
}
