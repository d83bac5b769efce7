//! # binkp
//!
//! **Bink**ley-style node-to-node **P**rotocol for bulletin-board networks.
//!
//! binkp exchanges mail packets and files between two nodes over one TCP
//! connection. Both sides introduce themselves, authenticate, then send files
//! to each other at the same time until each has announced the end of its
//! batch.
//!
//! ## Layers
//!
//! - [`transport`]: deadline-bounded byte stream (TCP or any async stream)
//! - [`frame`]: command and data frame codec
//! - [`transfer`]: outbound items, the outbound queue and inbound sinks
//! - [`session`]: handshake state machine and transfer loop
//! - [`client`] / [`server`]: outbound calls and the answering listener
//! - [`config`]: TOML node configuration
//!
//! ## Feature Flags
//!
//! - `client` (default): outbound calls
//! - `server` (default): answering listener
//! - `cli` (default): the `binkp` binary
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use binkp::prelude::*;
//!
//! # async fn demo() -> BinkpResult<()> {
//! let mut queue = OutboundQueue::new();
//! queue
//!     .push(Box::new(MemoryItem::new("hello.txt", b"Hello, Bink!".to_vec(), 0)))
//!     .expect("unique name");
//!
//! let config = SessionConfig::builder(Side::Originating)
//!     .local_address("1:234/5@fidonet")
//!     .password("secret")
//!     .build();
//!
//! let transport = Transport::connect("bbs.example.org", DEFAULT_PORT, CONNECT_TIMEOUT).await?;
//! let mut session = Session::new(transport, config, queue, MemorySink::new());
//! let report = session.run().await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

pub mod config;
pub mod frame;
pub mod session;
pub mod transfer;
pub mod transport;

// Outbound calls (feature-gated)
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub mod client;

// Answering server (feature-gated)
#[cfg(feature = "server")]
#[cfg_attr(docsrs, doc(cfg(feature = "server")))]
pub mod server;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::*;
    pub use crate::frame::{Command, CommandId, Frame, FrameError};
    pub use crate::session::{Session, SessionConfig, SessionReport, SessionState, Side};
    pub use crate::transfer::{DirectorySink, FileItem, MemoryItem, MemorySink, OutboundQueue};
    pub use crate::transport::{TcpTransport, Transport, TransportCloser, TransportError};

    #[cfg(feature = "client")]
    pub use crate::client::{CallOutcome, call};

    #[cfg(feature = "server")]
    pub use crate::server::{BinkServer, ServerConfig, SessionFactory};
}

// Re-export commonly used items at crate root
pub use crate::core::{AuthError, BinkpError, BinkpResult, InboundSink, ProtocolError, TransferItem};
pub use session::{Session, SessionConfig, SessionState, Side};
pub use transport::{Transport, TransportError};
