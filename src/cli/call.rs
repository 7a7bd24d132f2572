//! Call command - one request through the gateway

use std::collections::BTreeMap;

use anyhow::Context;
use clap::Args;

use crate::config::AppConfig;
use crate::domain::HttpMethod;
use crate::infrastructure::init_logging;

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Provider name, e.g. `kraken`
    pub provider: String,

    /// Endpoint path relative to the provider base URL
    pub endpoint: String,

    /// Request parameter as `key=value`; repeatable
    #[arg(short = 'p', long = "param", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    #[arg(short, long, default_value = "GET")]
    pub method: HttpMethod,

    /// Sign the request with the provider's credentials
    #[arg(long)]
    pub auth: bool,

    /// Print cache and rate limiter statistics afterwards
    #[arg(long)]
    pub stats: bool,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

pub async fn run(args: CallArgs) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_logging(&config.logging);

    let gateway = crate::create_gateway(&config).await?;
    let params: BTreeMap<String, String> = args.params.into_iter().collect();

    let payload = gateway
        .call(&args.provider, &args.endpoint, &params, args.method, args.auth)
        .await?;
    println!("{}", serde_json::to_string_pretty(&payload)?);

    if args.stats {
        println!("{}", serde_json::to_string_pretty(&gateway.stats().await)?);
    }

    Ok(())
}
