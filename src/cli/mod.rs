use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

#[derive(Parser)]
#[command(name = "ca-to-us")]
#[command(about = "Convert a vehicle's destination country from Canada to US")]
#[command(long_about = "ca-to-us looks up a VIN in the vehicle table, runs the remote CA to US \
                       conversion batch when the vehicle is eligible, verifies the result and \
                       notifies the factory feed or the incident tracker.")]
pub struct Cli {
    /// Configuration file (defaults to ./ca-to-us.toml when present)
    #[arg(long, global = true, help = "Path to a TOML configuration file")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one conversion and print the invocation report as JSON
    #[command(group(
        ArgGroup::new("source")
            .required(true)
            .args(["payload", "payload_file", "vin"])
    ))]
    Convert {
        /// Trigger event as JSON text
        #[arg(long, help = "Trigger event, e.g. '{\"vin\": \"...\", \"incident\": \"...\"}'")]
        payload: Option<String>,
        /// File holding the trigger event, '-' for stdin
        #[arg(long, help = "Read the trigger event from a file ('-' reads stdin)")]
        payload_file: Option<PathBuf>,
        /// Vehicle identification number
        #[arg(long, requires = "incident", help = "VIN to convert")]
        vin: Option<String>,
        /// Incident reference for the notification
        #[arg(long, requires = "vin", help = "Incident reference reported back on completion")]
        incident: Option<String>,
    },
    /// Show whether a VIN is eligible for conversion without converting it
    Check {
        /// Vehicle identification number
        #[arg(long, help = "VIN to look up")]
        vin: String,
    },
}
