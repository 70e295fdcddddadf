// Allow dead code for items that are part of the public API but only used in tests
#![allow(dead_code)]

mod cli;
mod config;
mod engine;
mod format;
mod headers;
mod ops;
mod record;
mod stats;

use clap::Parser;
use cli::Cli;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli::run(cli) {
        eprintln!("tabcrunch: {e}");
        std::process::exit(1);
    }
}
