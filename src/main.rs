//! EMS LCD TopGun Light Gun Driver
//!
//! Binds every connected gun, forwards its reports to a virtual input device
//! and tears the sessions down cleanly on Ctrl+C.

use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Parser;
use tracing::{debug, info, warn};

use topgun_driver::{DriverConfig, MonitorBackend};
use topgun_transport::{
    completion_channel, DescriptorNameResolver, Driver, HidDiscovery, InputBackend, NameResolver,
    DRIVER_DESC, DRIVER_VERSION,
};
use topgun_uinput::UinputBackend;

// CLI definitions
mod cli;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Load config
    let config_path = cli.config.clone().unwrap_or_else(DriverConfig::default_path);
    debug!("Loading config from {:?}", config_path);
    let mut config = DriverConfig::load(&config_path)?;
    if cli.debug {
        config.debug = true;
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&config, Arc::new(UinputBackend::new())).await,
        Commands::List => list(),
        Commands::Monitor { changes } => {
            run(
                &config,
                Arc::new(MonitorBackend {
                    changes_only: changes,
                }),
            )
            .await
        }
    }
}

/// Print connected guns
fn list() -> Result<()> {
    let devices = HidDiscovery::new().list_devices()?;
    if devices.is_empty() {
        println!("No light guns found");
        return Ok(());
    }

    let resolver = DescriptorNameResolver;
    for device in devices {
        let d = &device.descriptor;
        let name = resolver
            .resolve_display_name(d)
            .unwrap_or_else(|| topgun_transport::fallback_name(d.vendor_id, d.product_id));
        println!("{:04x}:{:04x}  {:<24}  {}", d.vendor_id, d.product_id, name, d.bus_path);
    }
    Ok(())
}

/// Attach and open every gun, forward events until Ctrl+C
async fn run(config: &DriverConfig, backend: Arc<dyn InputBackend>) -> Result<()> {
    info!("{} {}", DRIVER_DESC, DRIVER_VERSION);

    let discovery = HidDiscovery::new().with_read_timeout(config.read_timeout_ms);
    let devices = discovery.list_devices()?;
    if devices.is_empty() {
        bail!("No light gun found");
    }

    let driver = Arc::new(Driver::new(
        backend,
        Arc::new(DescriptorNameResolver),
        config.session(),
    ));

    let (completion_tx, completion_rx) = completion_channel();
    let dispatcher = {
        let driver = Arc::clone(&driver);
        tokio::spawn(async move { driver.run(completion_rx).await })
    };

    let mut buses = Vec::new();
    let mut sessions = Vec::new();
    for device in &devices {
        let (bus, interface) = match discovery.open_device(device, completion_tx.clone()) {
            Ok(opened) => opened,
            Err(e) => {
                warn!("Failed to open {}: {}", device.descriptor.bus_path, e);
                continue;
            }
        };
        let bus = Arc::new(bus);

        match driver.attach(bus.clone(), &device.descriptor, &interface) {
            Ok(id) => {
                let opened = match driver.open(id) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("Failed to start {}: {}", device.descriptor.bus_path, e);
                        false
                    }
                };
                sessions.push((id, opened));
            }
            Err(e) => warn!("Failed to attach {}: {}", device.descriptor.bus_path, e),
        }
        buses.push(bus);
    }
    // Buses hold the remaining senders
    drop(completion_tx);

    if sessions.is_empty() {
        tokio::task::spawn_blocking(move || drop(buses)).await?;
        bail!("No light gun could be attached");
    }

    info!(
        "Forwarding events from {} device(s). Press Ctrl+C to exit.",
        sessions.len()
    );
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to wait for Ctrl+C: {}", e);
    }
    info!("Shutting down");

    for (id, opened) in sessions {
        if opened {
            if let Err(e) = driver.close(id) {
                warn!("Failed to close session {}: {}", id, e);
            }
        }
    }
    driver.shutdown().await;

    // Dropping a bus joins its reader thread
    tokio::task::spawn_blocking(move || drop(buses)).await?;
    dispatcher.await?;
    Ok(())
}
