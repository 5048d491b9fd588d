//! Command implementations.
//!
//! Each submodule handles a specific CLI command.

mod archive;
mod build_shared;
mod compile;
mod inspect;
mod link;
mod run;

use std::path::Path;

use tracing::error;

use crate::cli::{Cli, Commands};

/// Dispatch CLI command to the appropriate handler.
pub fn run_command(cli: &Cli) -> i32 {
    match &cli.command {
        Commands::Compile { .. } => handle_compile(cli),
        Commands::Archive { .. } => handle_archive(cli),
        Commands::Link { .. } => handle_link(cli),
        Commands::BuildShared { .. } => handle_build_shared(cli),
        Commands::Run { .. } => handle_run(cli),
        Commands::Inspect { .. } => handle_inspect(cli),
    }
}

fn handle_compile(cli: &Cli) -> i32 {
    let Commands::Compile { input, output } = &cli.command else {
        unreachable!("compile command variant mismatch");
    };
    compile::cmd_compile(input, output.as_ref())
}

fn handle_archive(cli: &Cli) -> i32 {
    let Commands::Archive {
        output,
        objects,
        append,
    } = &cli.command
    else {
        unreachable!("archive command variant mismatch");
    };
    archive::cmd_archive(output, objects, *append)
}

fn handle_link(cli: &Cli) -> i32 {
    let Commands::Link {
        program,
        libraries,
        shared,
        output,
    } = &cli.command
    else {
        unreachable!("link command variant mismatch");
    };
    link::cmd_link(program, libraries, shared, output)
}

fn handle_build_shared(cli: &Cli) -> i32 {
    let Commands::BuildShared {
        objects,
        name,
        output,
    } = &cli.command
    else {
        unreachable!("build-shared command variant mismatch");
    };
    build_shared::cmd_build_shared(objects, name.as_deref(), output.as_ref())
}

fn handle_run(cli: &Cli) -> i32 {
    let Commands::Run {
        executable,
        search_path,
        strategy,
    } = &cli.command
    else {
        unreachable!("run command variant mismatch");
    };
    run::cmd_run(executable, search_path, *strategy)
}

fn handle_inspect(cli: &Cli) -> i32 {
    let Commands::Inspect { input } = &cli.command else {
        unreachable!("inspect command variant mismatch");
    };
    inspect::cmd_inspect(input)
}

// ============================================================================
// Shared helpers
// ============================================================================

/// File stem used to name units and archive members.
pub fn file_stem(path: &Path) -> &str {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or("unit")
}

/// Read and decode one artifact file, logging any failure.
pub fn load_artifact<T>(
    path: &Path,
    decode: impl FnOnce(&[u8]) -> Result<T, ldsim::FormatError>,
) -> Option<T> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            error!(error = %e, path = %path.display(), "failed to read artifact");
            return None;
        }
    };
    match decode(&data) {
        Ok(artifact) => Some(artifact),
        Err(e) => {
            error!(error = %e, path = %path.display(), "failed to decode artifact");
            None
        }
    }
}
