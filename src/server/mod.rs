//! binkp - Server
//!
//! Answering side: TCP listener with one session task per connection.

#[allow(clippy::module_inception)]
mod server;

pub use server::*;
