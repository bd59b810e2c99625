//! Registry lifecycle: elevation, ready list and mode transitions

use blobfree_device::prelude::*;
use blobfree_test_helpers::prelude::*;
use std::sync::Arc;
use tokio::sync::broadcast::error::TryRecvError;

fn widget(serial: &str) -> MockDevice {
    MockDevice::adb(serial)
        .with_property("ro.product.device", "widget")
        .with_property("ro.product.model", "Widget One")
}

fn registry(transport: Arc<MockTransport>) -> Result<DeviceRegistry, DeviceError> {
    let catalog = Arc::new(DeviceCatalog::from_json(SAMPLE_CATALOG)?);
    Ok(DeviceRegistry::new(transport, catalog, RegistryOptions::default()))
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<DeviceListEvent>) -> Vec<DeviceListEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    events
}

#[tokio::test]
async fn elevated_device_becomes_ready() -> TestResult {
    let transport = Arc::new(MockTransport::new().with_device(widget("A1").elevated(true)));
    let registry = registry(transport.clone())?;
    let mut rx = registry.subscribe();

    let ready = registry.refresh().await?;
    assert_eq!(ready.len(), 1);
    let device = must_some(ready.first(), "ready device");
    assert_eq!(device.identifier, "A1");
    assert_eq!(device.mode, TransportMode::Adb);
    assert_eq!(device.label, "Widget One (A1)");
    assert_eq!(device.descriptor, "acme-widget");
    assert_eq!(registry.state("A1").await, Some(LifecycleState::AdbReady));
    assert_eq!(transport.enumerations(), 1);

    let events = drain(&mut rx);
    assert!(matches!(events.as_slice(), [DeviceListEvent::Added(d)] if d.identifier == "A1"));
    Ok(())
}

#[tokio::test]
async fn unrooted_device_is_elevated_then_reenumerated() -> TestResult {
    let mock = widget("A2");
    let transport = Arc::new(MockTransport::new().with_device(mock.clone()));
    let registry = registry(transport.clone())?;

    let ready = registry.refresh().await?;
    assert_eq!(ready.len(), 1);
    assert!(mock.is_root());
    assert!(mock.calls().contains(&"elevate".to_string()));
    assert_eq!(transport.enumerations(), 2);
    assert_eq!(registry.state("A2").await, Some(LifecycleState::AdbReady));
    Ok(())
}

#[tokio::test]
async fn elevation_awaits_confirmation() -> TestResult {
    let mock = widget("A8");
    let transport = Arc::new(MockTransport::new().with_device(mock));
    let catalog = Arc::new(DeviceCatalog::from_json(SAMPLE_CATALOG)?);
    let options = RegistryOptions {
        max_elevation_passes: 1,
        ..RegistryOptions::default()
    };
    let registry = DeviceRegistry::new(transport, catalog, options);

    assert!(registry.refresh().await?.is_empty());
    assert_eq!(registry.state("A8").await, Some(LifecycleState::Elevating));
    assert!(matches!(
        registry.select_adb(Some("A8")).await,
        Err(DeviceError::NotFound(_))
    ));

    let ready = registry.refresh().await?;
    assert_eq!(ready.len(), 1);
    assert_eq!(registry.state("A8").await, Some(LifecycleState::AdbReady));
    Ok(())
}

#[tokio::test]
async fn elevation_passes_are_bounded() -> TestResult {
    let mock = widget("A3").refusing_elevation();
    let transport = Arc::new(MockTransport::new().with_device(mock));
    let catalog = Arc::new(DeviceCatalog::from_json(SAMPLE_CATALOG)?);
    let options = RegistryOptions {
        max_elevation_passes: 2,
        ..RegistryOptions::default()
    };
    let registry = DeviceRegistry::new(transport.clone(), catalog, options);

    let ready = registry.refresh().await?;
    assert!(ready.is_empty());
    assert_eq!(transport.enumerations(), 2);
    assert!(matches!(
        registry.select_adb(None).await,
        Err(DeviceError::NotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn unsupported_device_reported_once() -> TestResult {
    let other = MockDevice::adb("Z9").with_property("ro.product.device", "gadget").elevated(true);
    let transport = Arc::new(MockTransport::new().with_device(other));
    let registry = registry(transport)?;
    let mut rx = registry.subscribe();

    assert!(registry.refresh().await?.is_empty());
    assert!(registry.refresh().await?.is_empty());

    let events = drain(&mut rx);
    assert_eq!(
        events,
        vec![DeviceListEvent::Unsupported {
            identifier: "Z9".into(),
            mode: TransportMode::Adb
        }]
    );
    Ok(())
}

#[tokio::test]
async fn reboot_to_bootloader_and_back() -> TestResult {
    let mock = widget("A4").elevated(true);
    let transport = Arc::new(MockTransport::new().with_device(mock.clone()));
    let registry = registry(transport.clone())?;
    registry.refresh().await?;
    let held = must_some(registry.device("A4").await, "ready handle");
    let mut rx = registry.subscribe();

    registry.reboot_to_bootloader("A4").await?;
    assert!(transport.fastboot_scanning());
    assert!(held.is_invalidated());
    assert!(registry.ready_devices().await.is_empty());
    assert!(mock.calls().contains(&"reboot bootloader".to_string()));

    transport.detach("A4");
    transport.attach(MockDevice::fastboot("A4").with_variable("product", "widget").with_variable("serialno", "A4"));
    let ready = registry.refresh().await?;
    let device = must_some(ready.first(), "fastboot device");
    assert_eq!(device.mode, TransportMode::Fastboot);
    assert_eq!(device.label, "widget/A4");
    assert_eq!(registry.state("A4").await, Some(LifecycleState::FastbootReady));

    registry.reboot_to_normal("A4").await?;
    assert!(!transport.fastboot_scanning());
    assert!(registry.ready_devices().await.is_empty());

    let events = drain(&mut rx);
    assert!(matches!(
        events.as_slice(),
        [
            DeviceListEvent::Removed { mode: TransportMode::Adb, .. },
            DeviceListEvent::Added(_),
            DeviceListEvent::Removed { mode: TransportMode::Fastboot, .. },
        ]
    ));
    Ok(())
}

#[tokio::test]
async fn device_still_on_adb_after_reboot_is_readmitted() -> TestResult {
    let mock = widget("A4").elevated(true);
    let transport = Arc::new(MockTransport::new().with_device(mock));
    let registry = registry(transport)?;
    registry.refresh().await?;

    registry.reboot_to_bootloader("A4").await?;
    assert_eq!(registry.state("A4").await, Some(LifecycleState::FastbootReady));

    for _ in 0..3 {
        let ready = registry.refresh().await?;
        assert_eq!(ready.len(), 1);
    }
    assert_eq!(registry.state("A4").await, Some(LifecycleState::AdbReady));
    let (device, _) = registry.select_adb(Some("A4")).await?;
    assert!(!device.is_invalidated());
    Ok(())
}

#[tokio::test]
async fn failed_reboot_forgets_device() -> TestResult {
    let mock = widget("A7").elevated(true).refusing_reboot();
    let transport = Arc::new(MockTransport::new().with_device(mock));
    let registry = registry(transport)?;
    registry.refresh().await?;

    assert!(matches!(
        registry.reboot_to_bootloader("A7").await,
        Err(DeviceError::CommandFailed { .. })
    ));
    assert_eq!(registry.state("A7").await, None);

    let ready = registry.refresh().await?;
    let device = must_some(ready.first(), "readmitted device");
    assert_eq!(device.identifier, "A7");
    assert_eq!(registry.state("A7").await, Some(LifecycleState::AdbReady));
    Ok(())
}

#[tokio::test]
async fn reboot_requires_ready_device() -> TestResult {
    let transport = Arc::new(MockTransport::new().with_device(widget("A5").elevated(true)));
    let registry = registry(transport)?;
    registry.refresh().await?;

    assert!(matches!(
        registry.reboot_to_normal("A5").await,
        Err(DeviceError::NotReady { .. })
    ));
    assert!(matches!(
        registry.reboot_to_bootloader("missing").await,
        Err(DeviceError::NotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn detached_device_leaves_ready_list() -> TestResult {
    let transport = Arc::new(MockTransport::new().with_device(widget("A6").elevated(true)));
    let registry = registry(transport.clone())?;
    registry.refresh().await?;
    let held = must_some(registry.device("A6").await, "ready handle");

    transport.detach("A6");
    assert!(registry.refresh().await?.is_empty());
    assert!(held.is_invalidated());
    assert_eq!(registry.state("A6").await, None);
    Ok(())
}

#[tokio::test]
async fn select_adb_by_serial() -> TestResult {
    let transport = Arc::new(
        MockTransport::new()
            .with_device(widget("B1").elevated(true))
            .with_device(widget("B2").elevated(true)),
    );
    let registry = registry(transport)?;
    registry.refresh().await?;

    let (device, ready) = registry.select_adb(Some("B2")).await?;
    assert_eq!(device.identifier(), "B2");
    assert_eq!(ready.identifier, "B2");
    let (first, _) = registry.select_adb(None).await?;
    assert_eq!(first.identifier(), "B1");
    Ok(())
}

#[tokio::test]
async fn watch_refreshes_on_attach() -> TestResult {
    let transport = Arc::new(MockTransport::new());
    let registry = Arc::new(registry(transport.clone())?);
    let mut rx = registry.subscribe();
    let shutdown = tokio_util::sync::CancellationToken::new();

    let watcher = {
        let registry = Arc::clone(&registry);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { registry.watch(shutdown).await })
    };

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    transport.attach(widget("C1").elevated(true));
    let event = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv()).await??;
    assert!(matches!(event, DeviceListEvent::Added(ref d) if d.identifier == "C1"));

    shutdown.cancel();
    watcher.await??;
    Ok(())
}
