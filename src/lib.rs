//! Case intake assistant: evidence analysis across two model providers,
//! sealed PDF export with QR metadata, local persistence and a cloud anchor.

pub mod ai;
pub mod case;
pub mod commands;
pub mod config;
pub mod error;
pub mod seal;
pub mod store;

use tracing_subscriber::EnvFilter;

/// Load `.env`, checking the working directory first, then its parent
pub fn load_env() {
    if dotenvy::dotenv().is_err() {
        let _ = dotenvy::from_path("../.env");
    }
}

/// Initialize tracing with the RUST_LOG env filter.
/// Default: warn for dependencies, info for this crate. Use RUST_LOG=debug
/// for per-request logs.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,case_intake=info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
