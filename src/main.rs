//! `fleetcast` binary entry point.

use clap::Parser;
use fleetcast::cli_app::{Cli, run};

fn main() {
    let cli = Cli::parse();
    fleetcast::logger::init(cli.log_json);
    if let Err(err) = run(&cli) {
        tracing::error!(code = err.code(), error = %err, "command failed");
        eprintln!("{err}");
        std::process::exit(1);
    }
}
