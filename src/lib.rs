//! Pinwatch - GPIO pin-state monitoring agent.
//!
//! This library continuously samples a fixed set of digital input lines,
//! detects edges, accumulates per-pin timing statistics, and pushes
//! snapshot updates to consumers both immediately on change and on a
//! periodic heartbeat.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Pinwatch                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌────────────┐   ┌────────────────┐       │
//! │  │ LineSource │──▶│  Sampler   │──▶│ MonitorState   │       │
//! │  │ (hw / sim) │   │ (tick loop)│   │ (edges+history)│       │
//! │  └────────────┘   └─────┬──────┘   └───────┬────────┘       │
//! │                         │ change events    │ snapshots      │
//! │                         ▼                  ▼                │
//! │                  ┌─────────────┐    ┌─────────────┐         │
//! │                  │  Broadcast  │───▶│ PublishSink │         │
//! │                  │ (dual path) │    │ (log/HTTP)  │         │
//! │                  └─────────────┘    └─────────────┘         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The sampling thread is the only writer of the monitoring state; query
//! reads share a single mutex with it, so every snapshot reflects a
//! consistent tick. Change notifications cross a bounded queue: a slow
//! consumer can never stall sampling.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pinwatch::{broadcast::LogSink, Config, PinMonitor};
//!
//! let config = Config::default();
//! let monitor = PinMonitor::new(config, Arc::new(LogSink));
//! monitor.start().expect("no GPIO lines available");
//!
//! let status = monitor.get_status();
//! println!("{} lines monitored", status.len());
//! monitor.stop();
//! ```

pub mod broadcast;
pub mod config;
pub mod monitor;
pub mod source;
pub mod system;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use broadcast::{LogSink, PublishError, PublishSink, UpdateEvent};
pub use config::{Config, ConfigError};
pub use monitor::{HighInterval, MonitorError, PinMonitor, PinStatus, StatusSnapshot};
pub use source::{HardwareSource, Level, LineSource, ReadError, SimulatedSource};
pub use system::SystemInfoCollector;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
