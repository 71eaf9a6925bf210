//! # dbar CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dbar_cli::mac::{run_mac, MacArgs};
use dbar_cli::payload::{run_payload, PayloadArgs};

/// DonationBar operator tooling for the ECPay integration.
///
/// Reproduces the gateway's integrity checks offline so a disputed callback
/// can be re-verified or a captured payload inspected by hand.
#[derive(Parser, Debug)]
#[command(name = "dbar", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compute or verify a CheckMacValue.
    Mac(MacArgs),

    /// Encrypt or decrypt a webhook `Data` payload.
    Payload(PayloadArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Mac(args) => run_mac(&args),
        Commands::Payload(args) => run_payload(&args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
