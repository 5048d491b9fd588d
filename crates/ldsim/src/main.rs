//! ldsim CLI - teaching linker and loader.

mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;

fn main() {
    let cli = Cli::parse();

    // Initialize tracing; --verbose/--silent adjust the default level,
    // RUST_LOG still wins.
    let default_level = if cli.verbose {
        "ldsim=debug"
    } else if cli.silent {
        "ldsim=error"
    } else {
        "ldsim=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(default_level.parse().unwrap()),
        )
        .with_target(false)
        .init();

    std::process::exit(commands::run_command(&cli));
}
