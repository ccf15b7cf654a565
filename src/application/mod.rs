//! Application layer - services built on the ports.

pub mod cache;
pub mod gate;
pub mod index;
pub mod lock;
pub mod orchestrator;
