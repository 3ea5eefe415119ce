//! # Command Protocol Server Library
//!
//! Server side of the command protocol: holds many concurrent client
//! connections over an unreliable datagram transport and pumps typed
//! commands in both directions once per tick.
//!
//! ## Core Responsibilities
//!
//! ### Connection Lifecycle
//! New connections reported by the transport are registered and announced;
//! connections that disconnect — explicitly or detected through transport
//! timeouts — are flagged immediately and reaped by the cleanup pass at the
//! start of the following tick.
//!
//! ### Per-Tick Message Pump
//! Each tick drains every pending transport event in arrival order, decodes
//! data frames into commands, reacts where the protocol requires it (a
//! received keep-alive is echoed back to its sender) and finally flushes
//! the outbound queue in a single well-defined send point.
//!
//! ### Batched Outbound Commands
//! Commands produced anywhere during a tick — outward API calls or
//! reply-on-receive handlers — are buffered and written to the wire
//! together at tick end. Broadcasts are expanded against the live
//! connection set when they are queued.
//!
//! ## Architecture Design
//!
//! The session is single-threaded and cooperative: the embedding
//! application drives [`network::Server::tick`] at its own cadence and no
//! operation inside the core blocks, spawns or locks. The transport is a
//! collaborator behind the `shared::transport::Driver` trait; everything it
//! does may fail and every failure degrades to "skip this operation, keep
//! ticking".
//!
//! ## Module Organization
//!
//! - [`registry`]: live connection handles, lazy eviction, capacity limits
//! - [`network`]: the server session and its tick loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use shared::udp::UdpDriver;
//! use shared::{Command, Target};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(UdpDriver::new());
//!     server.start(9000, 16)?;
//!
//!     loop {
//!         // Drive one tick per frame or interval
//!         server.tick();
//!
//!         // Queue commands at any point; they go out with the next flush
//!         server.send_to_clients(
//!             Command::CustomMessage("welcome".to_string()),
//!             Target::Broadcast,
//!         );
//!         # break;
//!     }
//!     Ok(())
//! }
//! ```

pub mod network;
pub mod registry;
