//! # Payload Subcommand
//!
//! Offline access to the webhook `Data` cipher: decrypt a captured payload
//! to inspect it, or encrypt a hand-written one to replay against a
//! sandbox deployment.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Subcommand};

use crate::{read_input, KeyArgs};

/// Arguments for the `dbar payload` subcommand.
#[derive(Args, Debug)]
pub struct PayloadArgs {
    #[command(subcommand)]
    pub command: PayloadCommand,
}

/// Payload subcommands.
#[derive(Subcommand, Debug)]
pub enum PayloadCommand {
    /// Decrypt a base64 `Data` value and print the JSON inside.
    Decrypt {
        #[command(flatten)]
        keys: KeyArgs,
        /// Base64 ciphertext.
        #[arg(value_name = "DATA", conflicts_with = "file")]
        data: Option<String>,
        /// Read the ciphertext from a file instead.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Encrypt a JSON document into a base64 `Data` value.
    Encrypt {
        #[command(flatten)]
        keys: KeyArgs,
        /// Plaintext JSON.
        #[arg(value_name = "JSON", conflicts_with = "file")]
        json: Option<String>,
        /// Read the JSON from a file instead.
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

/// Execute the payload subcommand.
pub fn run_payload(args: &PayloadArgs) -> Result<u8> {
    match &args.command {
        PayloadCommand::Decrypt { keys, data, file } => {
            let input = read_input(data.as_deref(), file.as_ref())?;
            println!("{}", decrypt_pretty(keys, &input)?);
            Ok(0)
        }
        PayloadCommand::Encrypt { keys, json, file } => {
            let input = read_input(json.as_deref(), file.as_ref())?;
            println!("{}", encrypt_json(keys, &input)?);
            Ok(0)
        }
    }
}

fn decrypt_pretty(keys: &KeyArgs, data: &str) -> Result<String> {
    let credential = keys.credential(None)?;
    let value = dbar_crypto::decrypt(data, &credential).map_err(|e| anyhow!("{e}"))?;
    serde_json::to_string_pretty(&value).context("failed to render JSON")
}

/// The input is checked to be JSON but encrypted byte-for-byte as given.
fn encrypt_json(keys: &KeyArgs, json: &str) -> Result<String> {
    serde_json::from_str::<serde_json::Value>(json).context("input is not valid JSON")?;
    let credential = keys.credential(None)?;
    dbar_crypto::encrypt_str(json, &credential).map_err(|e| anyhow!("{e}"))
}
