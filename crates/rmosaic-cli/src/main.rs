//! `rmosaic` - merge and inspect georeferenced rasters.
//!
//! ```text
//! rmosaic merge nw.tif se.tif mosaic.tif --co COMPRESS=LZW
//! rmosaic info mosaic.tif --hist 16 --indent 2
//! rmosaic window mosaic.tif --bounds -113.5 43.5 -111.5 45.5
//! ```

mod cli;
mod commands;
mod config;
mod error;

use clap::Parser;
use cli::Cli;
use std::process::ExitCode;
use tracing::error;

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(cli.log_filter())
        .with_writer(std::io::stderr)
        .init();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match commands::run(&cli, &mut out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", error_chain(&e));
            ExitCode::FAILURE
        }
    }
}

/// `error: cause: cause` for logging.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
