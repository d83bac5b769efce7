//! binkp - Transport Layer
//!
//! Reliable, deadline-bounded byte exchange with no protocol knowledge:
//!
//! - **Byte stream**: [`Transport`] over TCP or any async stream
//! - **Typed I/O**: network-order `u8`/`u16` reads and writes
//! - **Cancellation**: [`TransportCloser`] for closing a transport out-of-band
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            Session                      │
//! ├─────────────────────────────────────────┤
//! │         Frame Codec                     │
//! ├─────────────────────────────────────────┤
//! │         Transport                       │  ← This module
//! │   deadlines, buffering, cancellation    │
//! ├─────────────────────────────────────────┤
//! │              TCP                        │
//! └─────────────────────────────────────────┘
//! ```

mod error;
mod socket;

pub use error::*;
pub use socket::*;
