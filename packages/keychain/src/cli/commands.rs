//! CLI command definitions

use clap::{Parser, Subcommand, ValueEnum};
use dynamo_keychain::config::BackendKind;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dynamo-keychain")]
#[command(about = "Keychain helper for the Dynamo web server", version)]
pub struct Cli {
    /// Configuration file (default: <config_dir>/dynamo/keychain.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding keychain files
    #[arg(long, global = true)]
    pub keychain_dir: Option<PathBuf>,

    /// Storage backend
    #[arg(long, global = true, value_enum)]
    pub backend: Option<BackendArg>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum BackendArg {
    /// Encrypted files
    File,
    /// OS credential store
    Os,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::File => Self::File,
            BackendArg::Os => Self::Os,
        }
    }
}

#[derive(Clone, Subcommand)]
pub enum Commands {
    /// Manage the HTTP server password
    #[command(subcommand)]
    Password(PasswordCommand),

    /// Manage SSL identities
    #[command(subcommand)]
    Identity(IdentityCommand),

    /// Import PEM or DER certificates and keys
    ///
    /// Example usage:
    ///   dynamo-keychain import DynamoSSL server.pem --label web
    Import {
        /// Target keychain
        keychain: String,
        /// File to import
        file: PathBuf,
        /// Label for imported items (default: keychain name)
        #[arg(long)]
        label: Option<String>,
    },

    /// List items in a keychain, or the keychains themselves
    List {
        /// Keychain to list (default: every keychain name)
        keychain: Option<String>,
    },

    /// Print the application temporary directory
    TempDir,

    /// Name a raw platform constant
    #[command(subcommand)]
    Describe(DescribeCommand),
}

#[derive(Clone, Subcommand)]
pub enum PasswordCommand {
    /// Print the stored password
    Get,
    /// Store the password (read from stdin when omitted)
    Set {
        /// New password
        password: Option<String>,
    },
    /// Remove the stored password
    Delete,
}

#[derive(Clone, Subcommand)]
pub enum IdentityCommand {
    /// Generate and store a new self-signed identity
    Create {
        /// Keychain name
        keychain: String,
    },
    /// Show the identity a server would use
    Show {
        /// Keychain name
        keychain: String,
    },
    /// Show the identity, creating one when none is usable
    Ensure {
        /// Keychain name
        keychain: String,
    },
    /// Write the identity as a PEM bundle
    Export {
        /// Keychain name
        keychain: String,
        /// Output file (default: stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Remove every identity from a keychain
    Delete {
        /// Keychain name
        keychain: String,
    },
}

#[derive(Clone, Subcommand)]
pub enum DescribeCommand {
    /// External format value
    Format {
        /// Decimal or 0x-prefixed hex
        value: String,
    },
    /// External item type value
    ItemType {
        /// Decimal or 0x-prefixed hex
        value: String,
    },
    /// Keychain item class value
    AttrType {
        /// Decimal, 0x-prefixed hex, or a four-character code such as `inet`
        value: String,
    },
}
