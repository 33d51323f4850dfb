mod app;
mod output;
mod sign;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use dotsign::CancellationToken;

use crate::app::Cli;

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Show dotsign info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("dotsign", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    // Files already being patched finish their current write; the rest stop at the next read
    let cancellation = CancellationToken::new();
    let handler_token = cancellation.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nCancelling...");
        handler_token.cancel();
    })
    .context("failed to set Ctrl+C handler")?;

    if sign::run(&cli, cancellation)? {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
