//! Scan Service Module
//!
//! Public API for callers (CLI, display layer). Owns the scan session behind a
//! single lock and runs one task that drains transport events into it, so a
//! command-driven transition and event observation never interleave.

use crate::domain::advertising::AdvertisingRecord;
use crate::domain::error::ScanError;
use crate::domain::models::{DeviceRecord, ScanParams, ScanState};
use crate::domain::session::{ScanSession, SessionUpdate};
use crate::domain::transport::{TransportAdapter, TransportEvent};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Notifications pushed to whoever drives the service
#[derive(Debug, Clone)]
pub enum ScanNotification {
    StateChanged(ScanState),
    /// First sighting of an address, with the advertisement that introduced it
    DeviceDiscovered {
        device: DeviceRecord,
        advertising: AdvertisingRecord,
    },
    /// The radio link dropped; the session is stopped and its devices kept
    TransportLost,
}

struct Shared {
    session: Mutex<ScanSession>,
    state_tx: watch::Sender<ScanState>,
    notifications: mpsc::UnboundedSender<ScanNotification>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ScanSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish the state if it moved. Called with the session lock held.
    fn publish_state(&self, state: ScanState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            let _ = self
                .notifications
                .send(ScanNotification::StateChanged(state));
        }
    }

    fn process(&self, event: TransportEvent) {
        let advertised = match &event {
            TransportEvent::Advertising(adv) => Some((adv.address, adv.data.clone())),
            _ => None,
        };

        let mut session = self.lock();
        match session.handle_event(event) {
            Ok(SessionUpdate::Observed { new_device: true }) => {
                if let Some((address, advertising)) = advertised {
                    if let Some(device) = session.registry().get(&address).cloned() {
                        let _ = self.notifications.send(ScanNotification::DeviceDiscovered {
                            device,
                            advertising,
                        });
                    }
                }
            }
            Ok(SessionUpdate::StateChanged(state)) => self.publish_state(state),
            Ok(_) => {}
            Err(ScanError::TransportLost) => {
                self.publish_state(session.state());
                let _ = self.notifications.send(ScanNotification::TransportLost);
            }
            Err(e) => warn!("Event processing failed: {}", e),
        }
    }
}

/// Coordinates the scan session with its transport
pub struct ScanService {
    shared: Arc<Shared>,
    worker: JoinHandle<()>,
}

impl ScanService {
    /// Wire a transport into a fresh session. Must be called from within a tokio runtime.
    ///
    /// `events` is the receiving end of the channel the transport publishes on.
    pub fn new(
        transport: Arc<dyn TransportAdapter>,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
        notifications: mpsc::UnboundedSender<ScanNotification>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ScanState::Idle);
        let shared = Arc::new(Shared {
            session: Mutex::new(ScanSession::new(transport)),
            state_tx,
            notifications,
        });

        let worker_shared = shared.clone();
        let worker = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                worker_shared.process(event);
            }
            debug!("Transport event channel closed");
        });

        Self { shared, worker }
    }

    /// Start a scan. The state reaches `Scanning` once the radio acknowledges.
    pub fn start_scan(&self, params: ScanParams) -> Result<(), ScanError> {
        let mut session = self.shared.lock();
        session.start(params)?;
        self.shared.publish_state(session.state());
        Ok(())
    }

    /// Stop the running scan. The state reaches `Stopped` once the radio acknowledges.
    pub fn stop_scan(&self) -> Result<(), ScanError> {
        let mut session = self.shared.lock();
        session.stop()?;
        self.shared.publish_state(session.state());
        Ok(())
    }

    /// Devices of the current (or last) session, strongest first
    pub fn current_devices(&self) -> Vec<DeviceRecord> {
        self.shared.lock().devices()
    }

    pub fn current_state(&self) -> ScanState {
        self.shared.lock().state()
    }

    /// Watch state transitions, e.g. to await `Scanning` after a start
    pub fn subscribe_state(&self) -> watch::Receiver<ScanState> {
        self.shared.state_tx.subscribe()
    }
}

impl Drop for ScanService {
    fn drop(&mut self) {
        self.worker.abort();
    }
}
