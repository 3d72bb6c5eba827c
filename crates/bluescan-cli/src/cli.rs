//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Adapter name (hci0) or address to use
    #[arg(short, long)]
    pub adapter: Option<String>,

    /// Discovery timeout in seconds
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Print devices and adapter state as JSON
    #[arg(long)]
    pub json: bool,

    /// Run against an in-memory adapter with a few demo devices
    #[arg(long)]
    pub simulate: bool,

    /// Also append logs to this file
    #[arg(long)]
    pub log_file: Option<String>,
}

impl Cli {
    /// The subcommand to run; a plain `bluescan` scans in the configured mode
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Scan { mode: None })
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Discover nearby devices until the timeout or Ctrl-C
    Scan {
        /// Operation mode; defaults to the configured mode
        #[arg(short, long)]
        mode: Option<String>,
    },
    /// Show the adapter's properties
    Info,
    /// List devices the Bluetooth daemon already knows
    Devices,
    /// Show the properties of one known device
    Show {
        /// Device address, e.g. A4:93:3F:5B:3D:84
        address: String,
    },
    /// Change adapter properties
    Set {
        #[arg(long)]
        powered: Option<bool>,
        #[arg(long)]
        discoverable: Option<bool>,
        #[arg(long)]
        pairable: Option<bool>,
        #[arg(long)]
        alias: Option<String>,
        /// Seconds to stay discoverable, 0 for no limit
        #[arg(long)]
        discoverable_timeout: Option<u32>,
        /// Seconds to stay pairable, 0 for no limit
        #[arg(long)]
        pairable_timeout: Option<u32>,
    },
    /// Ask the daemon to forget a device
    Remove {
        /// Device address, e.g. A4:93:3F:5B:3D:84
        address: String,
    },
    /// Print an example configuration file
    Config,
}
