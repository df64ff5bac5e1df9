//! Shared building blocks for the origin certificate agent.
//!
//! - [`ids`]: type-safe identifier newtypes
//! - [`bus`]: bounded fan-out event bus used to publish rotation events

pub mod bus;
pub mod ids;

pub use bus::{Mailbox, ObserverBus};
pub use ids::CertificateId;
