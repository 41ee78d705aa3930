//! Transport layer.
//!
//! A transport turns envelopes into wire requests through an injected
//! `Exchange` and reports completions back to the client as `Resolution`s.
//! `RequestTransport` holds the request bookkeeping shared by the concrete
//! long-polling and callback-polling transports.

pub mod callback_polling;
pub mod long_polling;
pub mod registry;
pub mod request;

use std::collections::BTreeMap;

use cometd_core::error::Result;
use cometd_core::{Advice, Message};

use crate::config::ClientConfig;
use crate::timer::{Scheduler, TimerId};

pub use callback_polling::{CallbackPolling, CallbackPollingTransport};
pub use long_polling::{LongPolling, LongPollingTransport};
pub use registry::TransportRegistry;
pub use request::{Dispatch, RequestTransport, Wire};

/// Per-transport request identifier.
pub type RequestId = u64;

/// One send unit: a batch of messages for one URL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    pub url: String,
    pub sync: bool,
    pub messages: Vec<Message>,
}

/// Everything the I/O primitive needs to put a request on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireRequest {
    /// Registered type of the transport that issued the request.
    pub transport: String,
    pub request: RequestId,
    pub url: String,
    pub sync: bool,
    pub headers: BTreeMap<String, String>,
    /// JSON array of messages.
    pub body: String,
}

/// Opaque in-flight request handle.
pub trait WireHandle: Send {
    fn abort(&mut self);
}

/// HTTP primitives (`xhrSend` / `jsonpSend`).
///
/// Both return immediately; the outcome is delivered later to
/// `BayeuxClient::on_exchange` as an `ExchangeEvent` carrying the same
/// transport type and request id.
pub trait Exchange: Send + Sync {
    fn xhr_send(&self, request: WireRequest) -> Result<Box<dyn WireHandle>>;
    fn jsonp_send(&self, request: WireRequest) -> Result<Box<dyn WireHandle>>;
}

/// Completion of a wire request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeEvent {
    pub transport: String,
    pub request: RequestId,
    pub outcome: ExchangeOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// Raw response body.
    Response(String),
    /// Network level error.
    Error(String),
}

/// Why a request failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Short reason: `timeout`, `error`, `no response`, `bad response`, ...
    pub reason: String,
    pub detail: Option<String>,
}

impl Failure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            detail: None,
        }
    }

    pub fn with_detail(reason: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            detail: Some(detail.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Vec<Message>),
    Failure(Failure),
}

/// A request the client must now process, then hand back via
/// `Transport::complete`.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub request: RequestId,
    pub longpoll: bool,
    pub envelope: Envelope,
    pub outcome: Outcome,
}

/// Client state a transport may read while sending.
pub struct TransportContext<'a> {
    pub config: &'a ClientConfig,
    pub advice: &'a Advice,
    pub scheduler: &'a dyn Scheduler,
}

/// A named, pluggable transport.
pub trait Transport: Send {
    /// Type name this transport is registered under.
    fn transport_type(&self) -> &str;

    /// Can this transport talk `version` to a (possibly cross-domain) server?
    fn accept(&self, version: &str, cross_domain: bool) -> bool;

    /// Dispatch or queue an envelope. At most one long-poll may be outstanding.
    fn send(&mut self, ctx: &TransportContext<'_>, envelope: Envelope, longpoll: bool)
        -> Result<()>;

    /// Free the slot held by `request` once the client processed it.
    fn complete(
        &mut self,
        ctx: &TransportContext<'_>,
        request: RequestId,
        success: bool,
        longpoll: bool,
    ) -> Result<()>;

    /// A response arrived. `None` if the request is unknown or already expired.
    fn transport_success(
        &mut self,
        ctx: &TransportContext<'_>,
        request: RequestId,
        body: &str,
    ) -> Option<Resolution>;

    /// The request failed. `None` if the request is unknown or already expired.
    fn transport_failure(
        &mut self,
        ctx: &TransportContext<'_>,
        request: RequestId,
        failure: Failure,
    ) -> Option<Resolution>;

    /// The network delay timer `timer` of `request` fired.
    fn expire(
        &mut self,
        ctx: &TransportContext<'_>,
        timer: TimerId,
        request: RequestId,
    ) -> Option<Resolution>;

    /// Abort every in-flight request, then `reset`.
    fn abort(&mut self, ctx: &TransportContext<'_>);

    /// Forget all request state without touching the wire.
    fn reset(&mut self);

    fn registered(&mut self, _transport_type: &str) {}

    fn unregistered(&mut self) {}
}
