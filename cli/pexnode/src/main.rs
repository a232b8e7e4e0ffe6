//! pexnode - provision conferencing transcoder nodes.
//!
//! Registers a node on the management API, then bootstraps the new node
//! directly. See `pexnode --help`.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod config;
mod error;
mod output;

use commands::Cli;

/// Log filter environment variable, checked before `RUST_LOG`.
const LOG_ENV: &str = "PEXNODE_LOG";

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| "info".into());

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_json());

    let code = match cli.run().await {
        Ok(code) => code,
        Err(e) => {
            error::print_error(&e);
            1
        }
    };

    std::process::exit(code);
}
