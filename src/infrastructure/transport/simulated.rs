//! Simulated radio
//!
//! Stands in for the connectivity dongle when no hardware is attached. Every
//! command is encoded, "written", and acknowledged. A started scan emits a
//! handful of fake peripherals as real event frames, so the frame codec sees
//! the same bytes it would see from the radio.

use crate::domain::advertising::AdvertisingRecord;
use crate::domain::error::TransportError;
use crate::domain::models::{AddressType, AdvertisingType, DeviceAddress};
use crate::domain::transport::{
    CommandKind, FirmwareVersion, ScanCommand, SoftDeviceApi, TransportAdapter, TransportEvent,
};
use crate::infrastructure::transport::frame::{self, opcode, AdvReport};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

/// Flags advertised by the fake peripherals: LE General Discoverable, BR/EDR not supported
const SIMULATED_FLAGS: u8 = 0x06;

/// Reported in place of a version query: Nordic, SoftDevice 6
const SIMULATED_FIRMWARE: FirmwareVersion = FirmwareVersion {
    company_id: 89,
    version_number: 6,
    subversion_number: 1,
};

pub struct SimulatedTransport {
    api: SoftDeviceApi,
    device_count: usize,
    interval: Duration,
    events: mpsc::UnboundedSender<TransportEvent>,
    emitter: Mutex<Option<JoinHandle<()>>>,
    runtime: Handle,
}

impl SimulatedTransport {
    /// Create a simulated adapter. Must be called from within a tokio runtime.
    pub fn new(
        api: SoftDeviceApi,
        device_count: usize,
        interval: Duration,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Self, TransportError> {
        let runtime = Handle::try_current().map_err(|e| TransportError::Open(e.to_string()))?;
        info!(
            "Simulated radio ready (API {:?}, {} devices)",
            api, device_count
        );
        Ok(Self {
            api,
            device_count,
            interval,
            events,
            emitter: Mutex::new(None),
            runtime,
        })
    }

    /// Pretend the serial link dropped
    pub fn disconnect(&self) {
        self.stop_emitter();
        info!("Simulated radio disconnected");
        let _ = self.events.send(TransportEvent::Disconnected);
    }

    fn acknowledge(&self, kind: CommandKind) -> Result<(), TransportError> {
        self.events
            .send(TransportEvent::Acknowledge(kind))
            .map_err(|_| TransportError::Closed)
    }

    fn start_emitter(&self) {
        let api = self.api;
        let count = self.device_count;
        let interval = self.interval;
        let events = self.events.clone();

        let handle = self.runtime.spawn(async move {
            for i in 0..count {
                tokio::time::sleep(interval).await;

                let record = AdvertisingRecord {
                    flags: Some(SIMULATED_FLAGS),
                    local_name: Some(format!("Device_{}", i)),
                    ..Default::default()
                };
                let report = AdvReport {
                    address: DeviceAddress::new(rand::random(), AddressType::Random),
                    rssi: rand::random_range(-90..=-40),
                    advertising_type: AdvertisingType::Connectable,
                    data: record.encode(),
                };

                let bytes = frame::encode_adv_report(api, &report);
                trace!("RX {:02X?}", bytes);
                if let Some(event) = frame::decode_event(api, &bytes) {
                    if events.send(TransportEvent::Advertising(event)).is_err() {
                        break;
                    }
                }
            }
            debug!("Simulated advertisers exhausted");
        });

        let previous = self
            .emitter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn stop_emitter(&self) {
        let handle = self
            .emitter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl TransportAdapter for SimulatedTransport {
    fn send_command(&self, command: &ScanCommand) -> Result<(), TransportError> {
        if self.events.is_closed() {
            return Err(TransportError::Closed);
        }

        let bytes = frame::encode_command(self.api, command);
        trace!("TX {:02X?}", bytes);

        match bytes.first().copied() {
            Some(opcode::SCAN_START) => {
                self.acknowledge(CommandKind::StartScan)?;
                self.start_emitter();
            }
            Some(opcode::SCAN_STOP) => {
                self.stop_emitter();
                self.acknowledge(CommandKind::StopScan)?;
            }
            _ => {
                return Err(TransportError::Write(format!(
                    "unrecognized command {:02X?}",
                    bytes
                )))
            }
        }
        Ok(())
    }

    fn firmware_version(&self) -> Option<FirmwareVersion> {
        Some(SIMULATED_FIRMWARE)
    }
}

impl Drop for SimulatedTransport {
    fn drop(&mut self) {
        self.stop_emitter();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ScanParams;

    #[tokio::test]
    async fn test_start_acks_then_emits_devices() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport =
            SimulatedTransport::new(SoftDeviceApi::V5, 3, Duration::from_millis(1), tx).unwrap();

        transport
            .send_command(&ScanCommand::StartScan(ScanParams::default()))
            .unwrap();

        assert!(matches!(
            rx.recv().await,
            Some(TransportEvent::Acknowledge(CommandKind::StartScan))
        ));

        for i in 0..3 {
            match rx.recv().await {
                Some(TransportEvent::Advertising(event)) => {
                    assert_eq!(event.data.local_name, Some(format!("Device_{}", i)));
                    assert_eq!(event.data.flags, Some(SIMULATED_FLAGS));
                    assert!((-90..=-40).contains(&event.rssi));
                    assert_eq!(event.address.kind(), AddressType::Random);
                }
                other => panic!("expected advertising event, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_stop_acks_and_halts_emission() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport =
            SimulatedTransport::new(SoftDeviceApi::V6, 5, Duration::from_secs(60), tx).unwrap();

        transport
            .send_command(&ScanCommand::StartScan(ScanParams::default()))
            .unwrap();
        transport.send_command(&ScanCommand::StopScan).unwrap();

        assert!(matches!(
            rx.recv().await,
            Some(TransportEvent::Acknowledge(CommandKind::StartScan))
        ));
        assert!(matches!(
            rx.recv().await,
            Some(TransportEvent::Acknowledge(CommandKind::StopScan))
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_is_reported() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport =
            SimulatedTransport::new(SoftDeviceApi::V6, 0, Duration::from_millis(1), tx).unwrap();
        transport.disconnect();
        assert!(matches!(rx.recv().await, Some(TransportEvent::Disconnected)));
    }

    #[tokio::test]
    async fn test_closed_channel_is_a_transport_error() {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport =
            SimulatedTransport::new(SoftDeviceApi::V6, 0, Duration::from_millis(1), tx).unwrap();
        drop(rx);
        assert!(matches!(
            transport.send_command(&ScanCommand::StopScan),
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_reports_firmware_version() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let transport =
            SimulatedTransport::new(SoftDeviceApi::V6, 0, Duration::from_millis(1), tx).unwrap();
        let version = transport.firmware_version().unwrap();
        assert_eq!(version.company_id, 89);
        assert_eq!(version.version_number, 6);
        assert_eq!(version.subversion_number, 1);
    }

    #[test]
    fn test_requires_runtime() {
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(
            SimulatedTransport::new(SoftDeviceApi::V6, 0, Duration::from_millis(1), tx),
            Err(TransportError::Open(_))
        ));
    }
}
