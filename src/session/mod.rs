//! binkp - Session Layer
//!
//! The protocol engine: handshake state machine and the established frame loop.
//!
//! - **State**: [`SessionState`], [`Side`]
//! - **Configuration**: [`SessionConfig`] and its builder
//! - **Authentication**: CRAM-MD5 [`Challenge`]
//! - **Engine**: [`Session`], producing a [`SessionReport`]
//!
//! # Example
//!
//! ```ignore
//! let transport = Transport::connect("bbs.example", 24554, CONNECT_TIMEOUT).await?;
//! let config = SessionConfig::builder(Side::Originating)
//!     .local_address("1:234/5")
//!     .password("secret")
//!     .build();
//! let mut session = Session::new(transport, config, queue, MemorySink::new());
//! let report = session.run().await?;
//! ```

mod config;
mod cram;
mod engine;
mod remote;
mod report;
mod state;

pub use config::*;
pub use cram::*;
pub use engine::*;
pub use remote::*;
pub use report::*;
pub use state::*;
