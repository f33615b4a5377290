use clap::Parser;
use std::process::ExitCode;

use inkscan::cli::{self, CliArgs};
use inkscan::logger;

fn main() -> ExitCode {
    let args = CliArgs::parse();

    // Session log (overwrites the previous session's log)
    match &args.log_file {
        Some(path) => logger::init_at(path),
        None => logger::init(),
    }

    cli::run(args)
}
