//! cometd core: transport-agnostic Bayeux protocol primitives and errors.
//!
//! This crate defines the wire-level message model, channel name handling and
//! the error surface shared by the client, its transports and tooling. It
//! carries no transport or runtime dependencies.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here.
//! All fallible paths surface as `CometdError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

pub use error::{BoxError, CometdError, ErrorCode, Result};
pub use protocol::{Advice, ChannelName, Message, Reconnect};
