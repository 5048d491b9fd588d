//! Build-shared command.

use std::path::PathBuf;

use tracing::{error, info};

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::commands::{file_stem, load_artifact};

/// Handle the `build-shared` command.
pub fn cmd_build_shared(
    objects: &[PathBuf],
    name: Option<&str>,
    output: Option<&PathBuf>,
) -> i32 {
    let mut members = Vec::with_capacity(objects.len());
    for path in objects {
        let Some(object) = load_artifact(path, ldsim::decode_object) else {
            return EXIT_FAILURE;
        };
        members.push(object);
    }

    let image_name = name.map_or_else(
        || format!("lib{}.so", file_stem(&objects[0])),
        str::to_string,
    );

    let image = match ldsim::build_shared(&image_name, &members) {
        Ok(image) => image,
        Err(e) => {
            error!("{e}");
            return EXIT_FAILURE;
        }
    };

    let out = output
        .cloned()
        .unwrap_or_else(|| PathBuf::from(&image_name));
    if let Err(e) = std::fs::write(&out, ldsim::encode_shared(&image)) {
        error!(error = %e, path = %out.display(), "failed to write shared image");
        return EXIT_FAILURE;
    }

    info!(
        path = %out.display(),
        exports = image.exported_symbols.len(),
        imports = image.imported_symbols.len(),
        "wrote shared image"
    );
    EXIT_SUCCESS
}
