//! Top-level facade crate for cometd.
//!
//! Re-exports the protocol types and the client library so users can depend on a single crate.

pub mod core {
    pub use cometd_core::*;
}

pub mod client {
    pub use cometd_client::*;
}

pub use cometd_client::{BayeuxClient, ClientConfig, CometD, Runtime, Status};
pub use cometd_core::{CometdError, Message, Result};
