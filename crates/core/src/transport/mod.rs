//! Network transport for control signaling and media delivery.
//!
//! The stack uses a split transport model:
//!
//! - **TCP** ([`tcp`]): carries control requests, replies and advisory
//!   lines. One TCP connection per client, with a thread per connection.
//!
//! - **UDP** ([`udp`]): carries media packets. The server binds one
//!   ephemeral socket per session; the client binds one receive port.

pub mod tcp;
pub mod udp;

pub use udp::UdpTransport;
