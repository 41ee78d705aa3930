//! cometd client library entry.
//!
//! This crate wires the transports, the transport registry and the Bayeux
//! client state machine together, and provides a tokio runtime that drives the
//! state machine over real HTTP. It is consumed by the binary (`main.rs`) and
//! by integration tests, which drive the state machine directly through the
//! `Scheduler` and `Exchange` seams.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod client;
pub mod config;
pub mod runtime;
pub mod timer;
pub mod transport;

pub use client::{BayeuxClient, Callback, CallbackResult, Extension, Flow, Status, Subscription};
pub use config::ClientConfig;
pub use runtime::{CometD, Runtime};
