//! Scan Session State Machine
//!
//! ```text
//! Idle ──start──▶ Starting ──ack──▶ Scanning ──stop──▶ Stopping ──ack──▶ Stopped
//!   ▲                                                                       │
//!   └────────────────────────────── start ─────────────────────────────────┘
//! ```
//!
//! A transport disconnect in any state other than `Idle` forces `Stopped`.
//! The session holds no timer; a scan duration is enforced by whoever calls
//! [`ScanSession::stop`].

use crate::domain::error::ScanError;
use crate::domain::models::{DeviceRecord, ScanParams, ScanState};
use crate::domain::registry::DeviceRegistry;
use crate::domain::transport::{CommandKind, ScanCommand, TransportAdapter, TransportEvent};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, trace, warn};

/// What a transport event did to the session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// Dropped: wrong state or an acknowledgment nobody was waiting for
    Ignored,
    /// Forwarded to the registry
    Observed { new_device: bool },
    StateChanged(ScanState),
}

pub struct ScanSession {
    state: ScanState,
    started_at: Option<Instant>,
    params: Option<ScanParams>,
    registry: DeviceRegistry,
    transport: Arc<dyn TransportAdapter>,
}

impl ScanSession {
    pub fn new(transport: Arc<dyn TransportAdapter>) -> Self {
        Self {
            state: ScanState::Idle,
            started_at: None,
            params: None,
            registry: DeviceRegistry::new(),
            transport,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    /// Parameters of the current or most recent scan
    pub fn params(&self) -> Option<ScanParams> {
        self.params
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn devices(&self) -> Vec<DeviceRecord> {
        self.registry.snapshot()
    }

    /// Begin a new scan. Valid from `Idle` or `Stopped`.
    pub fn start(&mut self, params: ScanParams) -> Result<(), ScanError> {
        params.validate().map_err(ScanError::InvalidParameter)?;

        let previous = self.state;
        if !matches!(previous, ScanState::Idle | ScanState::Stopped) {
            return Err(ScanError::InvalidStateTransition {
                state: previous,
                operation: "start scan",
            });
        }

        self.state = ScanState::Starting;
        if let Err(e) = self.transport.send_command(&ScanCommand::StartScan(params)) {
            warn!("Start command failed: {}", e);
            self.state = previous;
            return Err(e.into());
        }

        self.registry.clear();
        self.started_at = Some(Instant::now());
        self.params = Some(params);
        info!(
            "Scan starting: active={}, interval={}ms, window={}ms, duration={}s",
            params.active_scan, params.interval_ms, params.window_ms, params.duration_s
        );
        Ok(())
    }

    /// Ask the radio to stop. Valid only while `Scanning`.
    pub fn stop(&mut self) -> Result<(), ScanError> {
        if self.state != ScanState::Scanning {
            return Err(ScanError::InvalidStateTransition {
                state: self.state,
                operation: "stop scan",
            });
        }

        self.state = ScanState::Stopping;
        if let Err(e) = self.transport.send_command(&ScanCommand::StopScan) {
            warn!("Stop command failed: {}", e);
            self.state = ScanState::Scanning;
            return Err(e.into());
        }

        info!("Scan stopping, {} devices so far", self.registry.len());
        Ok(())
    }

    /// Apply one event from the transport.
    ///
    /// Returns `Err(ScanError::TransportLost)` when a disconnect forced the
    /// session to `Stopped`; the registry is kept for inspection.
    pub fn handle_event(&mut self, event: TransportEvent) -> Result<SessionUpdate, ScanError> {
        match event {
            TransportEvent::Advertising(adv) => {
                // Reports buffered before the stop acknowledgment still count
                if matches!(self.state, ScanState::Scanning | ScanState::Stopping) {
                    let new_device = self.registry.observe(&adv);
                    Ok(SessionUpdate::Observed { new_device })
                } else {
                    trace!("Dropping report from {} while {}", adv.address, self.state);
                    Ok(SessionUpdate::Ignored)
                }
            }
            TransportEvent::Acknowledge(kind) => Ok(self.acknowledge(kind)),
            TransportEvent::Disconnected => {
                if self.state == ScanState::Idle {
                    return Ok(SessionUpdate::Ignored);
                }
                warn!(
                    "Transport lost while {}, keeping {} devices",
                    self.state,
                    self.registry.len()
                );
                self.state = ScanState::Stopped;
                Err(ScanError::TransportLost)
            }
        }
    }

    fn acknowledge(&mut self, kind: CommandKind) -> SessionUpdate {
        match (self.state, kind) {
            (ScanState::Starting, CommandKind::StartScan) => {
                self.state = ScanState::Scanning;
                info!("Scanning");
                SessionUpdate::StateChanged(self.state)
            }
            (ScanState::Stopping, CommandKind::StopScan) => {
                self.state = ScanState::Stopped;
                info!("Scan stopped, {} devices found", self.registry.len());
                SessionUpdate::StateChanged(self.state)
            }
            (state, kind) => {
                warn!("Unexpected {:?} acknowledgment while {}", kind, state);
                SessionUpdate::Ignored
            }
        }
    }
}
