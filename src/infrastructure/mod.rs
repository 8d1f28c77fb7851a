//! Infrastructure
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 ScanService                 │
//! │  (public API, single event-processing task) │
//! └──────────────────────┬──────────────────────┘
//!                        │ TransportEvent / ScanCommand
//!                        ▼
//!              ┌───────────────────┐
//!              │     Transport     │
//!              │ - frame codec     │
//!              │ - simulated radio │
//!              └───────────────────┘
//! ```

pub mod logging;
pub mod scan_service;
pub mod transport;

pub use scan_service::{ScanNotification, ScanService};
