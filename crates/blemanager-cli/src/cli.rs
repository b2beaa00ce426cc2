//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Data directory for the paired device file
    #[arg(short, long, global = true)]
    pub data_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan for peripherals and list what was found
    Scan {
        /// Scan duration in seconds (defaults to the configured timeout)
        #[arg(short, long)]
        timeout: Option<f64>,
        /// Only report devices advertising this service (repeatable)
        #[arg(short, long)]
        service: Vec<Uuid>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Connect to a peripheral and remember it as paired
    Connect {
        /// Device identifier as reported by `scan`
        device: String,
        /// Stay connected and print incoming data until interrupted
        #[arg(short, long)]
        watch: bool,
    },
    /// List paired peripherals
    Paired {
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Forget paired peripherals
    Forget {
        /// Device to forget
        #[arg(required_unless_present = "all")]
        device: Option<String>,
        /// Forget every paired device
        #[arg(long, conflicts_with = "device")]
        all: bool,
    },
    /// Read the default read characteristic once
    Read {
        device: String,
    },
    /// Write hex-encoded bytes to the default write characteristic
    Write {
        device: String,
        /// Payload, hex encoded (e.g. 0a0b0c)
        data: String,
        /// Use write-without-response
        #[arg(long)]
        no_response: bool,
    },
    /// Print the effective configuration as TOML
    Config,
}
