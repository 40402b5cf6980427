//! Main entry point for the dynamo-keychain CLI

use clap::Parser;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dynamo_keychain::logging::init();

    cli::run(cli::Cli::parse()).await
}
