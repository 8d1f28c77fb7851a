//! Transport Module
//!
//! Concrete adapters behind [`TransportAdapter`](crate::domain::transport::TransportAdapter).
//!
//! ## Modules
//!
//! - [`frame`] - SoftDevice event frame decoding and scan command encoding, per API version
//! - [`simulated`] - Hardware-free radio that replays fake advertisers through the frame codec

pub mod frame;
pub mod simulated;

pub use simulated::SimulatedTransport;
