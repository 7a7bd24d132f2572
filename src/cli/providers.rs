//! Providers command - lists configured providers

use anyhow::Context;

use crate::config::AppConfig;
use crate::infrastructure::init_logging;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_logging(&config.logging);

    let gateway = crate::create_gateway(&config).await?;
    println!("{}", serde_json::to_string_pretty(&gateway.providers())?);

    Ok(())
}
