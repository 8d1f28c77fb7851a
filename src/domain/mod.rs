//! Scanner core: advertising codec, device registry and scan session.

pub mod advertising;
pub mod error;
pub mod models;
pub mod registry;
pub mod session;
pub mod settings;
pub mod transport;
