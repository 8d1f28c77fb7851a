use nrf_ble_scanner::domain::models::ScanState;
use nrf_ble_scanner::domain::settings::{Settings, SettingsService};
use nrf_ble_scanner::domain::transport::TransportAdapter;
use nrf_ble_scanner::infrastructure::logging::init_logger;
use nrf_ble_scanner::infrastructure::transport::SimulatedTransport;
use nrf_ble_scanner::infrastructure::{ScanNotification, ScanService};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Scan length used when the configured duration is 0 (run until stopped)
const UNBOUNDED_SCAN_SECS: u64 = 30;
/// How often the running device count is logged
const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

/// The only adapter is simulated, so the configured serial port is never opened
fn startup_banner(settings: &Settings) -> String {
    format!(
        "Starting BLE scan on a simulated radio (API {:?}, {} devices); serial port {} at {} baud is not opened",
        settings.api_version,
        settings.simulated_device_count,
        settings.serial_port,
        settings.baud_rate
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings_service = SettingsService::new()?;
    let settings = settings_service.get().clone();
    let _log_guard = init_logger(&settings.log_settings)?;

    info!(
        "{} (settings: {})",
        startup_banner(&settings),
        settings_service.path().display()
    );

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (note_tx, mut note_rx) = mpsc::unbounded_channel();

    let transport: Arc<dyn TransportAdapter> = Arc::new(SimulatedTransport::new(
        settings.api_version,
        settings.simulated_device_count,
        Duration::from_millis(settings.simulated_interval_ms),
        event_tx,
    )?);
    match transport.firmware_version() {
        Some(version) => info!("Radio firmware: {}", version),
        None => warn!("Radio firmware version unavailable"),
    }
    let service = ScanService::new(transport, event_rx, note_tx);

    tokio::spawn(async move {
        while let Some(note) = note_rx.recv().await {
            match note {
                ScanNotification::DeviceDiscovered {
                    device,
                    advertising,
                } => {
                    info!(
                        "Device found: {} ({} dBm) {}",
                        device.address,
                        device.last_rssi,
                        device.name.as_deref().unwrap_or("Unknown")
                    );
                    if !advertising.service_uuids.is_empty() {
                        let services: Vec<String> = advertising
                            .service_uuids
                            .iter()
                            .map(|u| u.to_string())
                            .collect();
                        info!("  Services: {}", services.join(", "));
                    }
                    if let Some(data) = &advertising.manufacturer_data {
                        info!("  Manufacturer data: {}", hex(data));
                    }
                }
                ScanNotification::StateChanged(state) => info!("Scan state: {}", state),
                ScanNotification::TransportLost => warn!("Radio link lost"),
            }
        }
    });

    service.start_scan(settings.scan)?;

    // The duration is advisory: stopping after it elapses is our job
    let duration = Duration::try_from_secs_f64(settings.scan.duration_s)
        .ok()
        .filter(|d| !d.is_zero())
        .unwrap_or(Duration::from_secs(UNBOUNDED_SCAN_SECS));
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);
    let mut progress = tokio::time::interval(PROGRESS_INTERVAL);
    // The first tick completes immediately
    progress.tick().await;
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                info!("Scan interrupted");
                break;
            }
            _ = progress.tick() => {
                info!("{} devices found", service.current_devices().len());
            }
        }
    }

    if let Err(e) = service.stop_scan() {
        warn!("Could not stop scan: {}", e);
    }
    let mut state_rx = service.subscribe_state();
    let _ = tokio::time::timeout(
        Duration::from_secs(2),
        state_rx.wait_for(|s| *s == ScanState::Stopped),
    )
    .await;

    let devices = service.current_devices();
    info!("===== SCAN RESULTS: {} devices =====", devices.len());
    for (i, device) in devices.iter().enumerate() {
        info!(
            "{}. {} ({}) best {} dBm, last {} dBm",
            i + 1,
            device.name.as_deref().unwrap_or("Unknown"),
            device.address,
            device.best_rssi,
            device.last_rssi
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner_names_simulated_radio() {
        let banner = startup_banner(&Settings::default());
        assert!(banner.contains("simulated radio"));
        assert!(banner.contains("/dev/ttyACM0 at 1000000 baud is not opened"));
        assert!(!banner.starts_with("Starting BLE scan on /dev/ttyACM0"));
    }

    #[test]
    fn test_hex() {
        assert_eq!(hex(&[0x59, 0x00, 0xAB]), "5900AB");
        assert_eq!(hex(&[]), "");
    }
}
