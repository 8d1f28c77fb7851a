//! BLE advertising scanner for SoftDevice connectivity dongles.
//!
//! [`domain`] holds the advertising-data codec, the device registry and the
//! scan session state machine. [`infrastructure`] wires them to a transport
//! and provides logging.

pub mod domain;
pub mod infrastructure;
