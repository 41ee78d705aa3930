//! Long-polling over plain HTTP POST (`xhr_send`).

use std::sync::Arc;

use cometd_core::protocol::message::decode_batch;
use cometd_core::Message;

use super::request::{Dispatch, RequestTransport, Wire};
use super::{Exchange, Failure, TransportContext, WireRequest};

pub const LONG_POLLING: &str = "long-polling";

pub type LongPollingTransport = RequestTransport<LongPolling>;

pub struct LongPolling {
    exchange: Arc<dyn Exchange>,
    supports_cross_domain: bool,
}

impl LongPolling {
    pub fn new(exchange: Arc<dyn Exchange>) -> Self {
        Self {
            exchange,
            supports_cross_domain: true,
        }
    }
}

impl LongPollingTransport {
    pub fn with_exchange(exchange: Arc<dyn Exchange>) -> Self {
        RequestTransport::new(LongPolling::new(exchange))
    }
}

impl Wire for LongPolling {
    fn default_type(&self) -> &'static str {
        LONG_POLLING
    }

    fn accept(&self, _version: &str, cross_domain: bool) -> bool {
        self.supports_cross_domain || !cross_domain
    }

    fn transport_send(&mut self, _ctx: &TransportContext<'_>, request: WireRequest) -> Dispatch {
        match self.exchange.xhr_send(request) {
            Ok(handle) => Dispatch::Sent(handle),
            Err(e) => Dispatch::Failed(Failure::with_detail("error", e.to_string())),
        }
    }

    fn on_response(&mut self, body: &str) -> Result<Vec<Message>, Failure> {
        if body.trim().is_empty() {
            self.supports_cross_domain = false;
            return Err(Failure::new("no response"));
        }
        match decode_batch(body) {
            Ok(messages) if !messages.is_empty() => Ok(messages),
            Ok(_) => {
                self.supports_cross_domain = false;
                Err(Failure::new("no response"))
            }
            Err(e) => {
                self.supports_cross_domain = false;
                Err(Failure::with_detail("bad response", e.to_string()))
            }
        }
    }

    fn on_error(&mut self) {
        self.supports_cross_domain = false;
    }

    fn reset(&mut self) {
        self.supports_cross_domain = true;
    }
}
