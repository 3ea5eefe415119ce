//! # Command Protocol Client Library
//!
//! Client side of the command protocol: one connection to a server over an
//! unreliable datagram transport, driven one tick at a time.
//!
//! ## Architecture Overview
//!
//! ### Session State Machine
//! The session moves through `Idle → Started → Connecting → Connected` and
//! back to `Idle` on disconnect. Connection establishment is asynchronous
//! from the session's point of view: `connect` issues the attempt and the
//! outcome arrives as a transport event on a later tick.
//!
//! ### Per-Tick Message Pump
//! Every tick drains all pending transport events in arrival order, decodes
//! data frames into typed commands, surfaces them to subscribed observers
//! and flushes the outbound queue as the tick's single send point.
//!
//! ### Keep-Alive
//! Once connected, the session queues a keep-alive command on a fixed
//! interval so the server can distinguish a quiet client from a dead one.
//! The server echoes each keep-alive back, which in turn keeps the client's
//! own liveness view of the server fresh. The timer starts exactly once on
//! the first Connect event and stops on teardown.
//!
//! ## Module Organization
//!
//! - [`keepalive`]: the tick-confined repeating liveness timer
//! - [`network`]: the client session and its tick loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//! use shared::udp::UdpDriver;
//! use shared::{Command, DEFAULT_KEEP_ALIVE_INTERVAL};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new(UdpDriver::new(), DEFAULT_KEEP_ALIVE_INTERVAL);
//!     client.start();
//!     client.connect("127.0.0.1:9000".parse()?)?;
//!
//!     loop {
//!         // Drive one tick per frame or interval
//!         client.tick();
//!
//!         if client.is_connected() {
//!             client.send_to_server(Command::CustomMessage("hello".to_string()));
//!         }
//!         # break;
//!     }
//!
//!     client.disconnect();
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! The core is single-threaded and never blocks; all transport interaction
//! is non-blocking polling. Notifications (connect, disconnect, received
//! commands) are delivered synchronously to injected observers within the
//! tick that detected them — there is no process-wide singleton to hook.

pub mod keepalive;
pub mod network;
