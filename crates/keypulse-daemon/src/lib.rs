//! Keypulse daemon library: the TCP push server behind keyboard status
//! displays.
//!
//! The server samples host CPU and memory utilization and pushes it to every
//! connected display client as a fixed 8-byte packet, one per handler cycle.
//! GUI and tray frontends link this crate, drive the server through
//! [`StatsServer`], and consume the [`ServerEvent`] channel to update their
//! widgets.

pub mod config;
pub mod error;
pub mod events;
pub mod sampler;
pub mod server;

pub use config::ServerConfig;
pub use error::{DaemonError, Result};
pub use events::{LogVisibility, ServerEvent};
pub use sampler::Sampler;
pub use server::StatsServer;
