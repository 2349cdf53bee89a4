//! # WiZ Control Library
//!
//! `wiz-control-lib` is a Rust library for discovering and controlling WiZ
//! smart lights on a local network. It speaks the JSON-over-UDP control
//! protocol the devices use (`registration`, `getSystemConfig`, `setPilot`),
//! tracks per-device identity and capability metadata, and drives color,
//! color-temperature and power state.
//!
//! This library is designed to be used by command-line tools or other client
//! applications that need to control WiZ lighting on a single broadcast
//! domain.
//!
//! ## Features
//!
//! - Staggered broadcast discovery with fast initial probing
//! - Per-device metadata tracking with bounded retries
//! - Mode-aware `setPilot` rendering (RGB vs. tunable white) with
//!   redundant-send suppression and blackout substitution
//! - Explicit transport and host seams for embedding and testing
//!
//! ## Example
//!
//! A minimal discovery loop, driven by a periodic tick:
//!
//! ```no_run
//! use std::time::{Duration, Instant};
//!
//! use wiz_control_lib::device::DeviceRegistry;
//! use wiz_control_lib::discovery::DiscoveryService;
//! use wiz_control_lib::util::host::LogHost;
//! use wiz_control_lib::util::transport::UdpTransport;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = UdpTransport::bind().await?;
//!     let mut registry = DeviceRegistry::new();
//!     let mut discovery = DiscoveryService::new();
//!     let host = LogHost;
//!     let mut buf = [0u8; 1024];
//!
//!     loop {
//!         discovery.tick(Instant::now(), &transport);
//!         let recv = tokio::time::timeout(
//!             Duration::from_millis(250),
//!             transport.recv(&mut buf),
//!         )
//!         .await;
//!         if let Ok(Ok((len, src))) = recv {
//!             discovery.handle_datagram(&buf[..len], src, &mut registry, &host);
//!         }
//!         registry.tick(Instant::now(), &transport, &host);
//!     }
//! }
//! ```
//!
//! ## Disclaimer
//!
//! This project is not affiliated with, authorized by, endorsed by, or in any
//! way officially connected with WiZ, Signify, or their affiliates. The
//! official WiZ website can be found at [https://www.wizconnected.com](https://www.wizconnected.com).
//!
//! ## License
//!
//! This project is dual-licensed under the MIT License and the Apache License,
//! Version 2.0. You may choose to use either license, depending on your
//! project needs.
// The `protocol` module is the wire codec: it builds the JSON control
// messages sent to devices and decodes the responses that come back.
// Decoding is total; junk datagrams surface as a `DecodeError` instead of
// a panic.
pub mod protocol;

// The `device` module holds the per-device state machine and the registry
// of known devices, plus the static product library used to map module
// names to capabilities and retail names.
pub mod device;

// The `discovery` module owns broadcast timing (fast initial probing, slow
// steady state) and routes inbound datagrams to the registry.
pub mod discovery;

// The `control` module converts requested colors into `setPilot` commands,
// applying mode selection, blackout substitution and redundant-send
// suppression per device.
pub mod control;

// The `util` module provides the transport and host seams the rest of the
// library talks through, so that all network and host dependencies are
// visible at call sites.
pub mod util;
