//! binkp - Client
//!
//! Outbound calls to configured nodes.

#[allow(clippy::module_inception)]
mod client;

pub use client::*;
