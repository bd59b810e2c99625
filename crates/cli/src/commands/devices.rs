//! `devices`: classify attached devices against a catalog

use anyhow::{Context, Result};
use blobfree_device::{DeviceCatalog, DeviceRegistry, DeviceTransport, HostTransport};
use blobfree_provision::ProvisionConfig;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::output;

/// Registry over the host tools, with bootloader scanning enabled.
pub async fn open_registry(config: &ProvisionConfig, catalog: &Path) -> Result<(Arc<HostTransport>, DeviceRegistry)> {
    let catalog = DeviceCatalog::load(catalog)
        .await
        .with_context(|| format!("Failed to load device catalog {}", catalog.display()))?;
    let transport = Arc::new(HostTransport::new(config.host_tools()));
    transport.set_fastboot_scanning(true);
    let registry = DeviceRegistry::new(transport.clone(), Arc::new(catalog), config.registry_options());
    Ok((transport, registry))
}

/// Execute devices command
pub async fn execute(config: &ProvisionConfig, catalog: &Path, watch: bool, json: bool) -> Result<()> {
    let (transport, registry) = open_registry(config, catalog).await?;

    if !watch {
        let ready = registry.refresh().await.context("Device enumeration failed")?;
        output::print_device_list(&ready, json);
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let poller = transport.spawn_watcher(config.watch_interval(), shutdown.clone());
    let mut events = registry.subscribe();

    let watcher = registry.watch(shutdown.clone());
    tokio::pin!(watcher);

    let outcome = loop {
        tokio::select! {
            result = &mut watcher => break result.context("Device watch failed"),
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "Could not listen for interrupt");
                }
                shutdown.cancel();
            }
            event = events.recv() => match event {
                Ok(event) => output::print_device_event(&event, json),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Device events lagged"),
                Err(RecvError::Closed) => shutdown.cancel(),
            },
        }
    };

    shutdown.cancel();
    if let Err(e) = poller.await {
        debug!(error = %e, "Device poller ended abnormally");
    }
    outcome
}
