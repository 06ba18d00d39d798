use std::process::ExitCode;

use clap::Parser;
use paintfx::cli::{self, CliArgs};

fn main() -> ExitCode {
    cli::run(CliArgs::parse())
}
