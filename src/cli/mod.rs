//! CLI module for the crypto API gateway
//!
//! Provides subcommands:
//! - `call`: one request through the gateway, printing the JSON response
//! - `providers`: list configured providers and whether credentials loaded

pub mod call;
pub mod providers;

use clap::{Parser, Subcommand};

/// Crypto API Gateway - signed, rate-limited and cached provider access
#[derive(Parser)]
#[command(name = "crypto-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Send one request through the gateway
    Call(call::CallArgs),

    /// List configured providers
    Providers,
}
