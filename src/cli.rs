use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// qrpass: single-use QR access tokens
#[derive(Parser)]
#[command(name = "qrpass", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind (defaults to $PORT, then 8080)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Create the token table if it does not exist
    InitDb,

    /// Manage tokens directly against the store
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Issue a new token and write its QR code as `{token}.png`
    Issue {
        /// Directory to write the PNG into
        #[arg(long, default_value = ".")]
        out: PathBuf,
        /// Only print the token value, skip the PNG
        #[arg(long)]
        no_image: bool,
    },
    /// List pending tokens
    List,
    /// Show one token's state
    Show { token: String },
    /// Mark a token as used
    Invalidate { token: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_args_means_serve() {
        let cli = Cli::try_parse_from(["qrpass"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_parse_token_issue() {
        let cli = Cli::try_parse_from(["qrpass", "token", "issue", "--out", "/tmp/qr"]).unwrap();
        match cli.command {
            Some(Commands::Token {
                command: TokenCommands::Issue { out, no_image },
            }) => {
                assert_eq!(out, PathBuf::from("/tmp/qr"));
                assert!(!no_image);
            }
            _ => panic!("expected token issue"),
        }
    }

    #[test]
    fn test_invalidate_requires_token() {
        assert!(Cli::try_parse_from(["qrpass", "token", "invalidate"]).is_err());
    }
}
