//! binkp - Transfer Items
//!
//! What a session sends and where received files go:
//!
//! - **Items**: [`MemoryItem`] and [`FileItem`] implement [`TransferItem`]
//! - **Queue**: [`OutboundQueue`], name-keyed and insertion ordered
//! - **Inbound**: [`ReceiveBuffer`] for partial files, [`MemorySink`] and
//!   [`DirectorySink`] implement [`InboundSink`]
//!
//! [`TransferItem`]: crate::core::TransferItem
//! [`InboundSink`]: crate::core::InboundSink

mod inbound;
mod item;
mod queue;

pub use inbound::*;
pub use item::*;
pub use queue::*;
