//! Link command.

use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::commands::load_artifact;

/// Handle the `link` command.
pub fn cmd_link(
    program: &Path,
    libraries: &[PathBuf],
    shared: &[PathBuf],
    output: &Path,
) -> i32 {
    let Some(program) = load_artifact(program, ldsim::decode_object) else {
        return EXIT_FAILURE;
    };

    let mut archives = Vec::with_capacity(libraries.len());
    for path in libraries {
        let Some(archive) = load_artifact(path, ldsim::decode_archive) else {
            return EXIT_FAILURE;
        };
        archives.push(archive);
    }

    let mut images = Vec::with_capacity(shared.len());
    for path in shared {
        let Some(image) = load_artifact(path, ldsim::decode_shared) else {
            return EXIT_FAILURE;
        };
        images.push(image);
    }

    let exe = match ldsim::link(&program, &archives, &images) {
        Ok(exe) => exe,
        Err(e) => {
            error!("{e}");
            return EXIT_FAILURE;
        }
    };

    if let Err(e) = std::fs::write(output, ldsim::encode_executable(&exe)) {
        error!(error = %e, path = %output.display(), "failed to write executable");
        return EXIT_FAILURE;
    }

    info!(
        path = %output.display(),
        symbols = exe.resolved_symbols.len(),
        dependencies = exe.dynamic_dependencies.len(),
        "wrote executable"
    );
    EXIT_SUCCESS
}
