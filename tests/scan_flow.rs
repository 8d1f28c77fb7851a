//! End-to-end scan flow through the public API.

use nrf_ble_scanner::domain::error::{ScanError, TransportError};
use nrf_ble_scanner::domain::models::{ScanParams, ScanState};
use nrf_ble_scanner::domain::transport::{
    ScanCommand, SoftDeviceApi, TransportAdapter, TransportEvent,
};
use nrf_ble_scanner::infrastructure::transport::frame::{encode_adv_report, AdvReport};
use nrf_ble_scanner::infrastructure::transport::{frame, SimulatedTransport};
use nrf_ble_scanner::infrastructure::ScanService;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Records the encoded command bytes and acknowledges them
struct WireTransport {
    api: SoftDeviceApi,
    written: Mutex<Vec<Vec<u8>>>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl TransportAdapter for WireTransport {
    fn send_command(&self, command: &ScanCommand) -> Result<(), TransportError> {
        self.written
            .lock()
            .unwrap()
            .push(frame::encode_command(self.api, command));
        self.events
            .send(TransportEvent::Acknowledge(command.kind()))
            .map_err(|_| TransportError::Closed)
    }
}

fn scenario_params() -> ScanParams {
    ScanParams {
        active_scan: true,
        interval_ms: 100.0,
        window_ms: 50.0,
        duration_s: 10.0,
    }
}

async fn wait_for(service: &ScanService, state: ScanState) {
    let mut rx = service.subscribe_state();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == state))
        .await
        .expect("timed out waiting for state")
        .expect("state channel closed");
}

fn frame_for(address: &str, rssi: i8, name: &str) -> Vec<u8> {
    let mut data = vec![name.len() as u8 + 1, 0x09];
    data.extend_from_slice(name.as_bytes());
    encode_adv_report(
        SoftDeviceApi::V6,
        &AdvReport {
            address: address.parse().unwrap(),
            rssi,
            advertising_type: nrf_ble_scanner::domain::models::AdvertisingType::Connectable,
            data,
        },
    )
}

#[tokio::test]
async fn three_devices_sorted_and_kept_after_stop() {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (note_tx, _note_rx) = mpsc::unbounded_channel();
    let transport = Arc::new(WireTransport {
        api: SoftDeviceApi::V6,
        written: Mutex::new(Vec::new()),
        events: event_tx.clone(),
    });
    let service = ScanService::new(transport.clone(), event_rx, note_tx);

    service.start_scan(scenario_params()).unwrap();
    wait_for(&service, ScanState::Scanning).await;

    for (address, rssi, name) in [
        ("C0:00:00:00:00:01", -75, "far"),
        ("C0:00:00:00:00:02", -45, "near"),
        ("C0:00:00:00:00:03", -60, "mid"),
    ] {
        let event = frame::decode_event(SoftDeviceApi::V6, &frame_for(address, rssi, name))
            .expect("well-formed frame");
        event_tx.send(TransportEvent::Advertising(event)).unwrap();
    }

    service.stop_scan().unwrap();
    wait_for(&service, ScanState::Stopped).await;
    assert_eq!(service.current_state(), ScanState::Stopped);

    let names: Vec<String> = service
        .current_devices()
        .into_iter()
        .map(|d| d.name.unwrap_or_default())
        .collect();
    assert_eq!(names, vec!["near", "mid", "far"]);

    let written = transport.written.lock().unwrap();
    assert_eq!(written.len(), 2);
    assert_eq!(written[0][0], frame::opcode::SCAN_START);
    assert_eq!(written[1], vec![frame::opcode::SCAN_STOP]);
}

#[tokio::test]
async fn window_larger_than_interval_is_rejected() {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (note_tx, _note_rx) = mpsc::unbounded_channel();
    let transport = Arc::new(WireTransport {
        api: SoftDeviceApi::V5,
        written: Mutex::new(Vec::new()),
        events: event_tx,
    });
    let service = ScanService::new(transport.clone(), event_rx, note_tx);

    let params = ScanParams {
        interval_ms: 50.0,
        window_ms: 100.0,
        ..scenario_params()
    };
    assert!(matches!(
        service.start_scan(params),
        Err(ScanError::InvalidParameter(_))
    ));
    assert_eq!(service.current_state(), ScanState::Idle);
    assert!(transport.written.lock().unwrap().is_empty());
}

#[tokio::test]
async fn simulated_radio_populates_registry() {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (note_tx, _note_rx) = mpsc::unbounded_channel();
    let transport = Arc::new(
        SimulatedTransport::new(SoftDeviceApi::V5, 3, Duration::from_millis(1), event_tx).unwrap(),
    );
    let service = ScanService::new(transport, event_rx, note_tx);

    service.start_scan(scenario_params()).unwrap();
    wait_for(&service, ScanState::Scanning).await;

    tokio::time::timeout(Duration::from_secs(5), async {
        while service.current_devices().len() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("simulated devices never arrived");

    service.stop_scan().unwrap();
    wait_for(&service, ScanState::Stopped).await;

    let devices = service.current_devices();
    assert_eq!(devices.len(), 3);
    assert!(devices.windows(2).all(|w| w[0].best_rssi >= w[1].best_rssi));
    assert!(devices
        .iter()
        .all(|d| d.name.as_deref().is_some_and(|n| n.starts_with("Device_"))));
}
