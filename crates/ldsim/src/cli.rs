//! CLI definitions and argument types.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use ldsim::RelocationStrategy;

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for failure.
pub const EXIT_FAILURE: i32 = 1;

#[derive(Parser)]
#[command(name = "ldsim")]
#[command(about = "Teaching linker and loader - compile, archive, link, and load toy objects")]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (sets RUST_LOG=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output (only show errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub silent: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile a unit source file to a relocatable object
    Compile {
        /// Input unit source file
        #[arg(value_name = "SOURCE")]
        input: PathBuf,

        /// Output object file (default: source stem + .ldo)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Create or update a static archive from objects
    Archive {
        /// Output archive file
        #[arg(value_name = "ARCHIVE")]
        output: PathBuf,

        /// Member object files, archived under their file stems
        #[arg(value_name = "OBJECT", required = true)]
        objects: Vec<PathBuf>,

        /// Update the existing archive instead of starting empty
        #[arg(long)]
        append: bool,
    },
    /// Link a program object into an executable
    Link {
        /// Program object file
        #[arg(value_name = "PROGRAM")]
        program: PathBuf,

        /// Static archive to search (repeatable, searched in order)
        #[arg(long = "library", value_name = "ARCHIVE")]
        libraries: Vec<PathBuf>,

        /// Shared image to link against (repeatable, searched after archives)
        #[arg(long = "shared", value_name = "IMAGE")]
        shared: Vec<PathBuf>,

        /// Output executable file
        #[arg(short, long, default_value = "a.out")]
        output: PathBuf,
    },
    /// Bundle objects into a shared image
    BuildShared {
        /// Member object files
        #[arg(value_name = "OBJECT", required = true)]
        objects: Vec<PathBuf>,

        /// Image name recorded for the loader (default: lib<first stem>.so)
        #[arg(long)]
        name: Option<String>,

        /// Output image file (default: the image name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Load an executable, bind its imports, and report the runtime image
    Run {
        /// Executable file
        #[arg(value_name = "EXECUTABLE")]
        executable: PathBuf,

        /// Directory searched for shared images (repeatable, in order)
        #[arg(long = "search-path", value_name = "DIR")]
        search_path: Vec<PathBuf>,

        /// Import binding strategy
        #[arg(long, value_enum, default_value = "pic")]
        strategy: StrategyArg,
    },
    /// Print a human-readable dump of any artifact
    Inspect {
        /// Artifact file (object, archive, shared image, or executable)
        #[arg(value_name = "ARTIFACT")]
        input: PathBuf,
    },
}

/// Import binding strategy argument.
#[derive(Clone, Copy, Debug, ValueEnum, Default)]
pub enum StrategyArg {
    /// Patch every reference site at load time (code must be writable)
    LoadTime,
    /// Patch only GOT slots; code sections stay shareable
    #[default]
    Pic,
}

impl From<StrategyArg> for RelocationStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::LoadTime => RelocationStrategy::LoadTimeRelocation,
            StrategyArg::Pic => RelocationStrategy::PositionIndependent,
        }
    }
}
