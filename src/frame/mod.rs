//! binkp - Frame Codec
//!
//! Translates between the transport byte stream and [`Frame`] values.
//!
//! - **Commands**: [`CommandId`] and [`Command`]
//! - **Codec**: [`Frame::encode`], [`Frame::decode`], [`read_frame`], [`write_frame`]
//! - **Arguments**: [`args`] helpers for FILE, GET, GOT and ADR lines

pub mod args;
mod codec;
mod command;

pub use codec::*;
pub use command::*;
