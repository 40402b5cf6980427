//! Command-line interface

mod commands;
mod describe;
mod operations;

pub use commands::Cli;

use commands::Commands;
use dynamo_keychain::{Keychain, KeychainConfig};

/// Load configuration, apply command-line overrides and run the command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Describe(command) = &cli.command {
        return describe::handle_describe(command, cli.json);
    }

    let mut config = KeychainConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.keychain_dir {
        config.keychain_dir = dir;
    }
    if let Some(backend) = cli.backend {
        config.backend = backend.into();
    }
    let keychain = Keychain::from_config(config)?;
    let json = cli.json;
    let mut out = std::io::stdout().lock();

    match cli.command {
        Commands::Password(command) => {
            let input = std::io::stdin().lock();
            operations::handle_password(&keychain, command, json, input, &mut out).await
        }
        Commands::Identity(command) => {
            operations::handle_identity(&keychain, command, json, &mut out).await
        }
        Commands::Import {
            keychain: name,
            file,
            label,
        } => {
            operations::handle_import(&keychain, &name, &file, label.as_deref(), json, &mut out)
                .await
        }
        Commands::List {
            keychain: Some(name),
        } => operations::handle_list(&keychain, &name, json, &mut out).await,
        Commands::List { keychain: None } => {
            operations::handle_list_keychains(&keychain, json, &mut out)
        }
        Commands::TempDir => operations::handle_temp_dir(&keychain, json, &mut out),
        Commands::Describe(_) => Ok(()),
    }
}
