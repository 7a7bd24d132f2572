use clap::Parser;
use crypto_api_gateway::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Call(args) => cli::call::run(args).await,
        Command::Providers => cli::providers::run().await,
    }
}
