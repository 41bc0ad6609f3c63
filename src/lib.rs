//! Martian adapter for stages written in Rust.
//!
//! A Martian pipeline runs each `stage` of an MRO file by launching an adapter
//! executable. This crate is that adapter:
//!
//! - [`mro`] - Martian types and generation of MRO `stage` definitions
//! - [`stage`] - the [`MartianMain`]/[`MartianStage`] traits stages implement
//! - [`metadata`] - reading arguments from and writing outputs to the
//!   metadata directory
//! - [`registry`] - the stages an adapter binary knows
//! - [`cli`] - the command line of an adapter binary
//!
//! # Example
//!
//! ```no_run
//! use martian::prelude::*;
//!
//! martian_struct! {
//!     #[derive(Debug, Serialize, Deserialize)]
//!     pub struct GreetInputs {
//!         pub name: String,
//!     }
//! }
//!
//! martian_struct! {
//!     #[derive(Debug, Serialize, Deserialize)]
//!     pub struct GreetOutputs {
//!         pub greeting: String,
//!     }
//! }
//!
//! pub struct Greet;
//!
//! impl MartianMain for Greet {
//!     type StageInputs = GreetInputs;
//!     type StageOutputs = GreetOutputs;
//!
//!     fn main(&self, args: GreetInputs, _rover: MartianRover) -> Result<GreetOutputs> {
//!         Ok(GreetOutputs { greeting: format!("hello {}", args.name) })
//!     }
//! }
//!
//! impl MroMaker for Greet {
//!     fn stage_in_and_out() -> InAndOut {
//!         InAndOut::from_structs::<GreetInputs, GreetOutputs>()
//!     }
//! }
//!
//! fn main() -> std::process::ExitCode {
//!     let registry = martian_stages![main: Greet];
//!     martian::cli::run_adapter("greeter", &registry)
//! }
//! ```

#[macro_use]
mod macros;

pub mod cli;
pub mod config;
pub mod logging;
pub mod metadata;
pub mod monitor;
pub mod mro;
pub mod prelude;
pub mod registry;
pub mod stage;
pub mod types;
pub mod utils;

use std::fs::File;
use std::io::Write;
use std::panic;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use log::{error, info};

pub use config::AdapterConfig;
pub use log::LevelFilter;
pub use metadata::{ErrorSink, JsonDict, Metadata, StagePhase};
pub use mro::*;
pub use registry::StageRegistry;
pub use stage::*;
pub use types::{MartianFileType, MartianVoid};

#[doc(hidden)]
pub use serde;

use crate::logging::setup_logging;
use crate::metadata::open_log_sink;
use crate::monitor::Monitor;

/// Run the stage phase Martian asked for, with the default configuration.
///
/// `args` are `<stage_key> <split|main|join> <metadata_dir> <files_dir> <run_file>`.
pub fn martian_main(args: Vec<String>, registry: &StageRegistry) -> Result<()> {
    martian_main_with_config(args, registry, &AdapterConfig::default())
}

pub fn martian_main_with_config(
    args: Vec<String>,
    registry: &StageRegistry,
    config: &AdapterConfig,
) -> Result<()> {
    let metadata_path = Metadata::metadata_path(&args)?;

    // The log file is opened by the monitor process and should never be
    // closed by the adapter; the logger keeps it for the life of the process.
    let log_file = open_log_sink(config.log_fd, &metadata_path.join("_log"))?;
    setup_logging(log_file, config.log_level, config.log_to_stdout);
    info!("got args: {args:?}");

    let errors = Arc::new(ErrorSink::open(config.error_fd, metadata_path.join("_errors")));
    install_panic_hook(Arc::clone(&errors));

    let result = Metadata::new(&args).and_then(|mut md| run_stage(&mut md, registry, config));
    if let Err(err) = &result {
        handle_stage_error(err, &errors);
    }
    result
}

fn run_stage(md: &mut Metadata, registry: &StageRegistry, config: &AdapterConfig) -> Result<()> {
    md.update_jobinfo()?;

    let stage = registry
        .get(&md.stage_name)
        .ok_or_else(|| anyhow!("couldn't find requested stage {}", md.stage_name))?;

    let rover = md.rover();
    info!(
        "running {} {} with {} threads, {} GB",
        md.stage_name,
        md.stage_type,
        rover.get_threads(),
        rover.get_mem_gb()
    );

    let monitor = Monitor::start(md.journal(), config.heartbeat_interval, rover.get_mem_gb())?;
    let result = stage.run(md);
    monitor.stop();
    result?;

    md.complete()?;
    info!("{} {} complete", md.stage_name, md.stage_type);
    Ok(())
}

/// Report a failed stage to Martian. A [`StageError`] becomes an `ASSERT:`
/// (shown to the user as a problem with their inputs); anything else is
/// reported as a crash with its cause chain and backtrace.
pub fn handle_stage_error(err: &anyhow::Error, sink: &ErrorSink) {
    let message = match err.downcast_ref::<StageError>() {
        Some(StageError::MartianExit { message } | StageError::PipelineError { message }) => {
            format!("ASSERT: {message}")
        }
        None => format!("stage error:{err:#}\n{}", err.backtrace()),
    };
    error!("{message}");
    if let Err(e) = sink.write_errors(&message) {
        error!("Failed to report stage error: {e:#}");
    }
}

/// If a stage panics, the panic message and a backtrace go to the error sink
/// before the previous hook runs.
fn install_panic_hook(errors: Arc<ErrorSink>) {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let backtrace = std::backtrace::Backtrace::force_capture();

        let thread = thread::current();
        let thread = thread.name().unwrap_or("unnamed");

        let payload = info.payload();
        let msg = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("Box<Any>");

        let msg = match info.location() {
            Some(location) => format!(
                "thread '{thread}' panicked at '{msg}': {}:{}\n{backtrace}",
                location.file(),
                location.line(),
            ),
            None => format!("thread '{thread}' panicked at '{msg}'\n{backtrace}"),
        };

        error!("{msg}");
        let _ = errors.write_errors(&msg);
        previous(info);
    }));
}

const MRO_HEADER: &str = r#"#
# WARNING: This file is auto-generated.
# DO NOT MODIFY THIS FILE DIRECTLY
#

"#;

/// The complete MRO file for `stage_mros`: header, `filetype` declarations,
/// then every stage separated by a blank line.
pub fn make_mro_string(stage_mros: &[StageMro]) -> String {
    let mut filetype_header = FiletypeHeader::default();
    for stage_mro in stage_mros {
        filetype_header.add_stage(stage_mro);
    }
    let stages: Vec<String> = stage_mros.iter().map(ToString::to_string).collect();
    format!("{MRO_HEADER}{filetype_header}{}", stages.join("\n"))
}

/// Write the MRO for `stage_mros` to `file_name`, or stdout when `None`.
/// An existing file is only replaced when `rewrite` is set.
pub fn martian_make_mro(
    file_name: Option<&Path>,
    rewrite: bool,
    stage_mros: &[StageMro],
) -> Result<()> {
    if let Some(file_path) = file_name {
        if file_path.is_dir() {
            bail!("Error! Path {} is a directory!", file_path.display());
        }
        if file_path.exists() && !rewrite {
            bail!(
                "File {} exists. You need to explicitly mention if it is okay to rewrite.",
                file_path.display()
            );
        }
    }

    let mro_string = make_mro_string(stage_mros);
    match file_name {
        Some(f) => {
            let mut output =
                File::create(f).with_context(|| format!("Failed to create {}", f.display()))?;
            output.write_all(mro_string.as_bytes())?;
        }
        None => print!("{mro_string}"),
    }
    Ok(())
}
