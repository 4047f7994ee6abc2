// Entrypoint for the CLI application.
// - Keeps `main` small: parse flags, set up logging, hand over to `cli::run`.
// - Startup errors come back as `anyhow::Error` and end the process before
//   any request is sent; per-request failures only change the exit code.

use clap::Parser;
use ejudge_registrar::cli::{self, Args};
use std::process::ExitCode;

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse_from(cli::normalize_flag_prefix(std::env::args()));
    cli::init_tracing(args.debug);
    cli::run(args)
}
