//! cli entrypoint for matlas.

mod app;
mod config;

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// stderr logging; `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// main entrypoint for the async cli.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = app::Cli::parse();
    init_tracing(cli.verbose);

    match app::run(cli).await {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(err) => {
            eprintln!("error: {err:#}");
            let hint = err
                .chain()
                .find_map(|cause| cause.downcast_ref::<matlas_core::Error>())
                .and_then(matlas_core::Error::hint);
            if let Some(hint) = hint {
                eprintln!("hint: {hint}");
            }
            ExitCode::FAILURE
        }
    }
}
