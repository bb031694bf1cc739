use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::Cli;

const DEFAULT_LOG_FILTER: &str = "recpool_cli=info,recpool_core=info";

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    cli::report(cli.run(), &mut io::stderr()).into()
}

// RUST_LOG overrides the default filter; logs go to stderr so command output stays clean
fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
