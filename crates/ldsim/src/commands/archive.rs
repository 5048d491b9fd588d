//! Archive command.

use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::commands::{file_stem, load_artifact};

/// Handle the `archive` command.
///
/// Members are named after their object file stems; with `--append`, an
/// existing archive at `output` is updated with replace-by-name semantics.
pub fn cmd_archive(output: &Path, objects: &[PathBuf], append: bool) -> i32 {
    let existing = if append && output.is_file() {
        match load_artifact(output, ldsim::decode_archive) {
            Some(archive) => Some(archive),
            None => return EXIT_FAILURE,
        }
    } else {
        None
    };

    let mut members = Vec::with_capacity(objects.len());
    let mut names = Vec::with_capacity(objects.len());
    for path in objects {
        let Some(object) = load_artifact(path, ldsim::decode_object) else {
            return EXIT_FAILURE;
        };
        members.push(object);
        names.push(file_stem(path).to_string());
    }

    let archive_name = output
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("archive");
    let archive = match ldsim::archive(existing, archive_name, members, names) {
        Ok(archive) => archive,
        Err(e) => {
            error!("{e}");
            return EXIT_FAILURE;
        }
    };

    if let Err(e) = std::fs::write(output, ldsim::encode_archive(&archive)) {
        error!(error = %e, path = %output.display(), "failed to write archive");
        return EXIT_FAILURE;
    }

    info!(
        path = %output.display(),
        members = archive.members.len(),
        "wrote archive"
    );
    EXIT_SUCCESS
}
