//! Bayeux protocol primitives.
//!
//! - `message`: the JSON message envelope exchanged with the server, plus advice.
//! - `channel`: channel name validation and glob expansion for listener dispatch.
//!
//! Decoding never panics: malformed input is reported as `CometdError`.

pub mod channel;
pub mod message;

pub use channel::{meta, ChannelName};
pub use message::{Advice, Message, Reconnect};

/// Bayeux protocol version announced in handshakes.
pub const BAYEUX_VERSION: &str = "1.0";

/// Oldest protocol version the client accepts.
pub const BAYEUX_MINIMUM_VERSION: &str = "0.9";
