//! Collector delivery
//!
//! This module implements the client side of the collector protocol:
//! reports are sent as a `collector.sync` batch to an external collector
//! process and are considered delivered only when a response carrying the
//! same `request_id` comes back.
//!
//! ## Architecture
//!
//! - [`wire`]: request/response shapes
//! - [`framing`]: length-prefixed JSON frames over a byte stream
//! - [`transport`]: the [`Transport`]/[`Channel`] seam and the native host
//!   implementation that spawns the collector executable
//! - [`client`]: one bounded request/response exchange per call
//!
//! ## Usage
//!
//! Register the collector executable in `~/.config/scopewatch/config.toml`:
//!
//! ```toml
//! [hosts."com.example.benefit_collector"]
//! command = "/usr/local/bin/benefit-collector-host"
//! ```

pub mod client;
pub mod framing;
pub mod transport;
pub mod wire;

pub use client::DeliveryClient;
pub use transport::{Channel, NativeHostTransport, Transport};
pub use wire::{ClientInfo, SyncRequest, SyncResponse, SYNC_MESSAGE_TYPE};
