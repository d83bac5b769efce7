//! binkp - Core traits, types, and constants.
//!
//! This module provides the error taxonomy shared by every layer and the two
//! collaborator traits ([`TransferItem`], [`InboundSink`]) through which the
//! surrounding application hands files to a session and takes them back.

mod constants;
mod error;
mod traits;

pub use constants::*;
pub use error::*;
pub use traits::*;
