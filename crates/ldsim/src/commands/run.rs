//! Run command.

use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS, StrategyArg};
use crate::commands::load_artifact;

/// Handle the `run` command.
///
/// Loads the executable's shared dependencies through the search path,
/// binds every import, and reports the resulting runtime image ldd-style.
pub fn cmd_run(executable: &Path, search_path: &[PathBuf], strategy: StrategyArg) -> i32 {
    let Some(exe) = load_artifact(executable, ldsim::decode_executable) else {
        return EXIT_FAILURE;
    };

    let mut loader =
        ldsim::Loader::new(strategy.into()).with_search_path(search_path.to_vec());
    let runtime = match loader.load(exe) {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("{e}");
            return EXIT_FAILURE;
        }
    };

    for image in &runtime.images {
        println!("\t{} => 0x{:08x}", image.image.name, image.base);
    }
    let mut bound: Vec<(&String, &u64)> = runtime.got_table.iter().collect();
    bound.sort_unstable();
    for (name, addr) in bound {
        println!("\t{} -> 0x{:08x}", name, addr);
    }

    info!(
        images = runtime.images.len(),
        symbols = runtime.got_table.len(),
        "process image ready"
    );
    EXIT_SUCCESS
}
