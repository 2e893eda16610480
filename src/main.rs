//! Gradsniper - Graduation Signal Scoring and Position Lifecycle Engine

use anyhow::Result;

use gradsniper::adapters::cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (GRADSNIPER__* overrides can live here)
    dotenvy::dotenv().ok();

    let app = cli::init();
    let level = app.configured_log_level();
    cli::init_logging(app.verbose, app.debug, level.as_deref())?;

    cli::execute(app).await
}
