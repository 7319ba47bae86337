//! CLI command implementations

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::time::{SystemTime, UNIX_EPOCH};

use ellx_core::{Curve, KeyPair};

/// Ellx CLI - keys and signatures for the sync daemon
#[derive(Parser)]
#[command(name = "ellx")]
#[command(about = "Keys and request signatures for the Ellx sync daemon")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a new key pair
    Keygen {
        /// Curve to generate on
        #[arg(long, default_value_t = Curve::Secp256k1)]
        curve: Curve,
    },

    /// Print the public key of a private key
    Public {
        /// Encoded private key
        #[arg(long)]
        private: String,
    },

    /// Sign a message
    Sign {
        /// Encoded private key
        #[arg(long)]
        private: String,

        /// Message to sign
        message: String,
    },

    /// Build an Authorization header value for the daemon
    AuthHeader {
        /// Encoded private key
        #[arg(long)]
        private: String,

        /// Client user name
        #[arg(long)]
        user: String,

        /// Server identity
        #[arg(long)]
        identity: String,

        /// Timestamp to sign (defaults to now, in Unix milliseconds)
        #[arg(long)]
        timestamp: Option<String>,
    },

    /// Verify a signature against a public key
    Verify {
        /// Encoded public key
        #[arg(long)]
        public: String,

        /// Encoded signature
        #[arg(long)]
        signature: String,

        /// Signed message
        message: String,
    },

    /// Recover the signer's public key
    Recover {
        /// Encoded signature
        #[arg(long)]
        signature: String,

        /// Signed message
        message: String,
    },
}

fn private_key(encoded: &str) -> Result<KeyPair> {
    KeyPair::from_private(encoded.trim(), Curve::Secp256k1).context("Invalid private key")
}

fn now_millis() -> Result<u128> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("System clock is before the Unix epoch")?;
    Ok(elapsed.as_millis())
}

/// Run a command, returning the text to print
pub fn run(command: Commands) -> Result<String> {
    match command {
        Commands::Keygen { curve } => {
            let key = KeyPair::generate(curve);
            let private = key
                .private_key()
                .context("Generated key has no private half")?;
            Ok(format!("private: {}\npublic: {}", private, key.public_key()))
        }

        Commands::Public { private } => Ok(private_key(&private)?.public_key()),

        Commands::Sign { private, message } => {
            Ok(private_key(&private)?.sign(message.as_bytes())?)
        }

        Commands::AuthHeader {
            private,
            user,
            identity,
            timestamp,
        } => {
            let key = private_key(&private)?;
            let timestamp = match timestamp {
                Some(timestamp) => timestamp,
                None => now_millis()?.to_string(),
            };
            let payload = format!("{},{},{}", user, identity, timestamp);
            Ok(format!("{},{}", timestamp, key.sign(payload.as_bytes())?))
        }

        Commands::Verify {
            public,
            signature,
            message,
        } => {
            let key = KeyPair::from_public(public.trim(), Curve::Secp256k1)
                .context("Invalid public key")?;
            if !key.verify(message.as_bytes(), signature.trim()) {
                bail!("Signature is invalid");
            }
            Ok("Signature is valid".to_string())
        }

        Commands::Recover { signature, message } => {
            let key = KeyPair::recover(message.as_bytes(), signature.trim(), Curve::Secp256k1)?;
            Ok(key.public_key())
        }
    }
}
