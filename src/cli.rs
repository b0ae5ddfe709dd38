use clap::{Parser, Subcommand, ValueEnum};

use tokenguard::claims::TokenKind;

/// tokenctl: inspect, verify and manage signed access/refresh tokens
#[derive(Parser)]
#[command(name = "tokenctl", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decode a token's header and claims without verifying it
    Inspect {
        token: String,
    },

    /// Validate a token against the configured signer and keys
    Verify {
        token: String,
        #[arg(long, value_enum, default_value_t = Kind::Access)]
        kind: Kind,
    },

    /// Issue a token pair for an owner
    Issue {
        #[arg(long)]
        owner_type: String,
        #[arg(long)]
        owner_id: String,
        #[arg(long)]
        name: String,
        /// Device / client identifier
        #[arg(long)]
        package: String,
        #[arg(long, value_delimiter = ',', default_value = "*")]
        scopes: Vec<String>,
    },

    /// Revoke a token pair by record id
    Revoke {
        #[arg(long)]
        id: i64,
    },

    /// List token records for an owner
    List {
        #[arg(long)]
        owner_type: String,
        #[arg(long)]
        owner_id: String,
    },

    /// Run pending database migrations
    Migrate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Kind {
    Access,
    Refresh,
}

impl From<Kind> for TokenKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Access => TokenKind::Access,
            Kind::Refresh => TokenKind::Refresh,
        }
    }
}
