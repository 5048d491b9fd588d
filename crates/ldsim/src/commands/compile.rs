//! Compile command.

use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::commands::file_stem;

/// Handle the `compile` command.
pub fn cmd_compile(input: &Path, output: Option<&PathBuf>) -> i32 {
    let source = match std::fs::read_to_string(input) {
        Ok(source) => source,
        Err(e) => {
            error!(error = %e, path = %input.display(), "failed to read source");
            return EXIT_FAILURE;
        }
    };

    let object = match ldsim::compile(file_stem(input), &source) {
        Ok(object) => object,
        Err(e) => {
            error!("{e}");
            return EXIT_FAILURE;
        }
    };

    let out = output
        .cloned()
        .unwrap_or_else(|| input.with_extension("ldo"));
    if let Err(e) = std::fs::write(&out, ldsim::encode_object(&object)) {
        error!(error = %e, path = %out.display(), "failed to write object");
        return EXIT_FAILURE;
    }

    info!(
        path = %out.display(),
        sections = object.sections.len(),
        symbols = object.symbols.len(),
        "wrote object"
    );
    EXIT_SUCCESS
}
