//! Reelcast - progressive HLS transcoding server
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (stream metadata, ladder, jobs, manifests)
//! - ports/: Trait definitions (prober, encoder, subtitle extractor)
//! - adapters/: Concrete implementations (ffmpeg, ffprobe, events, HTTP)
//! - application/: Services (index, cache, lock, orchestrator, readiness gate)
//! - config: Environment configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;

pub use config::StreamerConfig;
pub use error::{Error, Result};
