//! Command dispatch and output formatting

use std::sync::Arc;

use tracing::{error, info};

use bluescan_core::{
    AdapterProperties, DiscoveryController, Platform, PropertyMap, SessionSummary,
};

use crate::cli::Commands;
use crate::config::AppConfig;
use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// Command Dispatcher
// ----------------------------------------------------------------------------

/// Runs one subcommand against a platform
pub struct CommandDispatcher<P: Platform> {
    controller: DiscoveryController<P>,
    config: AppConfig,
}

impl<P: Platform> CommandDispatcher<P> {
    pub fn new(platform: Arc<P>, config: AppConfig) -> Self {
        let controller = DiscoveryController::new(platform, config.discovery.clone());
        Self { controller, config }
    }

    fn json(&self) -> bool {
        self.config.cli.json_output
    }

    pub async fn execute(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Scan { mode } => {
                let mode =
                    mode.unwrap_or_else(|| self.config.discovery.operation_mode.to_string());
                let summary = self.scan(&mode, tokio::signal::ctrl_c()).await?;
                self.print_summary(&summary)
            }
            Commands::Info => {
                let properties = self.controller.adapter().properties().await?;
                self.print_adapter(&properties)
            }
            Commands::Devices => self.list_devices().await,
            Commands::Show { address } => self.show_device(&address).await,
            Commands::Set {
                powered,
                discoverable,
                pairable,
                alias,
                discoverable_timeout,
                pairable_timeout,
            } => {
                let adapter = self.controller.adapter();
                let mut changed = 0;
                if let Some(powered) = powered {
                    adapter.set_powered(powered).await?;
                    changed += 1;
                }
                if let Some(discoverable) = discoverable {
                    adapter.set_discoverable(discoverable).await?;
                    changed += 1;
                }
                if let Some(pairable) = pairable {
                    adapter.set_pairable(pairable).await?;
                    changed += 1;
                }
                if let Some(alias) = alias {
                    adapter.set_alias(alias).await?;
                    changed += 1;
                }
                if let Some(seconds) = discoverable_timeout {
                    adapter.set_discoverable_timeout(seconds).await?;
                    changed += 1;
                }
                if let Some(seconds) = pairable_timeout {
                    adapter.set_pairable_timeout(seconds).await?;
                    changed += 1;
                }
                if changed == 0 {
                    return Err(CliError::InvalidArguments(
                        "set needs at least one property to change".to_string(),
                    ));
                }
                info!("Updated {} adapter properties", changed);
                let properties = adapter.properties().await?;
                self.print_adapter(&properties)
            }
            Commands::Remove { address } => self.remove(&address).await,
            Commands::Config => {
                print!("{}", AppConfig::example_config());
                Ok(())
            }
        }
    }

    /// Run one session until it times out or `interrupt` resolves
    async fn scan<F>(&self, mode: &str, interrupt: F) -> Result<SessionSummary>
    where
        F: std::future::Future<Output = std::io::Result<()>>,
    {
        let json = self.json();
        self.controller
            .set_on_new_device_found(move |properties| print_device(properties, json));
        self.controller.start(mode).await?;

        let summary = tokio::select! {
            summary = self.controller.wait_idle() => summary,
            interrupted = interrupt => {
                interrupted?;
                info!("Interrupted, stopping discovery");
                self.controller.stop().await
            }
        };

        self.controller.clear_on_new_device_found();
        summary.ok_or_else(|| {
            CliError::CommandFailed("Discovery session ended abnormally".to_string())
        })
    }

    async fn list_devices(&self) -> Result<()> {
        let devices = self.controller.adapter().known_devices().await?;
        if self.json() {
            println!("{}", serde_json::to_string_pretty(&devices)?);
            return Ok(());
        }

        if devices.is_empty() {
            println!("No known devices");
        }
        for (address, properties) in &devices {
            println!("{}", address);
            for (key, value) in properties {
                println!("    {} : {}", key, value);
            }
        }
        Ok(())
    }

    async fn show_device(&self, address: &str) -> Result<()> {
        let adapter = self.controller.adapter();
        if adapter.find_device(address).await?.is_none() {
            return Err(CliError::CommandFailed(format!(
                "Device {} not found",
                address
            )));
        }

        let properties = adapter.device_properties(address).await?;
        if self.json() {
            println!("{}", serde_json::to_string_pretty(&properties)?);
            return Ok(());
        }
        for (key, value) in &properties {
            println!("{} : {}", key, value);
        }
        Ok(())
    }

    async fn remove(&self, address: &str) -> Result<()> {
        if self.controller.adapter().remove_device(address).await {
            println!("Removed {}", address);
            Ok(())
        } else {
            Err(CliError::CommandFailed(format!("Could not remove {}", address)))
        }
    }

    fn print_adapter(&self, properties: &AdapterProperties) -> Result<()> {
        if self.json() {
            println!("{}", serde_json::to_string_pretty(properties)?);
            return Ok(());
        }

        println!("Address : {}", properties.address);
        println!("Alias : {}", properties.alias);
        println!("Class : {:#08x}", properties.class);
        println!("Powered : {}", properties.powered);
        println!("Discoverable : {}", properties.discoverable);
        println!("DiscoverableTimeout : {}", properties.discoverable_timeout);
        println!("Pairable : {}", properties.pairable);
        println!("PairableTimeout : {}", properties.pairable_timeout);
        println!("Discovering : {}", properties.discovering);
        for uuid in &properties.uuids {
            println!("UUID : {}", uuid);
        }
        Ok(())
    }

    fn print_summary(&self, summary: &SessionSummary) -> Result<()> {
        if self.json() {
            println!("{}", serde_json::to_string(summary)?);
        } else {
            println!("{}", summary);
        }
        Ok(())
    }
}

/// Print a newly found device's properties
fn print_device(properties: &PropertyMap, json: bool) {
    if json {
        match serde_json::to_string(properties) {
            Ok(line) => println!("{}", line),
            Err(e) => error!("Cannot encode device properties: {}", e),
        }
        return;
    }

    for (key, value) in properties {
        println!("[NEW] {} : {}", key, value);
    }
    println!();
}
