#![cfg(not(tarpaulin_include))]

use prettysheet::app;
use prettysheet::settings::Settings;

/// Main entry point for the web application
///
/// Reads `PRETTYSHEET_*` settings from the environment and serves the
/// upload / preview / process / download API for a single session.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::from_env();
    log::info!(
        "Starting web server (row limit {}, {:?} reprocessing)",
        settings.row_limit,
        settings.policy
    );
    app::run(settings).await
}
