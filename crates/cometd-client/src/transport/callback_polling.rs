//! Callback-polling (JSONP) for servers on another origin.
//!
//! The batch travels in the query string, so its encoded size is bounded.

use std::sync::Arc;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use cometd_core::protocol::message::decode_batch;
use cometd_core::Message;

use super::request::{Dispatch, RequestTransport, Wire};
use super::{Exchange, Failure, TransportContext, WireRequest};

pub const CALLBACK_POLLING: &str = "callback-polling";

/// Callback name the server wraps responses in.
pub const JSONP_CALLBACK: &str = "cometd_jsonp";

/// Stay well under the 2083 chars some user agents allow; the parameter names
/// are not counted.
pub const MAX_URL_LENGTH: usize = 2000;

// what `encodeURI` leaves alone: alphanumerics and ;,/?:@&=+$-_.!~*'()#
const URI: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

pub type CallbackPollingTransport = RequestTransport<CallbackPolling>;

pub struct CallbackPolling {
    exchange: Arc<dyn Exchange>,
}

impl CallbackPolling {
    pub fn new(exchange: Arc<dyn Exchange>) -> Self {
        Self { exchange }
    }
}

impl CallbackPollingTransport {
    pub fn with_exchange(exchange: Arc<dyn Exchange>) -> Self {
        RequestTransport::new(CallbackPolling::new(exchange))
    }
}

/// Length of the request URL once the batch is URI-encoded into it.
pub fn encoded_url_length(url: &str, body: &str) -> usize {
    url.len() + utf8_percent_encode(body, URI).map(str::len).sum::<usize>()
}

/// Strip a `callback(...)` wrapper, if present.
pub fn unwrap_jsonp<'a>(body: &'a str, callback: &str) -> &'a str {
    let trimmed = body.trim();
    trimmed
        .strip_prefix(callback)
        .map(str::trim_start)
        .and_then(|rest| rest.strip_prefix('('))
        .map(|rest| rest.trim_end().trim_end_matches(';').trim_end())
        .and_then(|rest| rest.strip_suffix(')'))
        .map(str::trim)
        .unwrap_or(trimmed)
}

impl Wire for CallbackPolling {
    fn default_type(&self) -> &'static str {
        CALLBACK_POLLING
    }

    fn accept(&self, _version: &str, _cross_domain: bool) -> bool {
        true
    }

    fn transport_send(&mut self, _ctx: &TransportContext<'_>, request: WireRequest) -> Dispatch {
        let url_length = encoded_url_length(&request.url, &request.body);
        if url_length > MAX_URL_LENGTH {
            let message_count = serde_json::from_str::<Vec<serde_json::Value>>(&request.body)
                .map(|v| v.len())
                .unwrap_or(1);
            let detail = if message_count > 1 {
                format!(
                    "too many bayeux messages in the same batch resulting in message too big ({url_length} bytes, max is {MAX_URL_LENGTH}) for transport {}",
                    request.transport
                )
            } else {
                format!(
                    "bayeux message too big ({url_length} bytes, max is {MAX_URL_LENGTH}) for transport {}",
                    request.transport
                )
            };
            return Dispatch::Failed(Failure::with_detail("error", detail));
        }

        match self.exchange.jsonp_send(request) {
            Ok(handle) => Dispatch::Sent(handle),
            Err(e) => Dispatch::Failed(Failure::with_detail("error", e.to_string())),
        }
    }

    fn on_response(&mut self, body: &str) -> Result<Vec<Message>, Failure> {
        let json = unwrap_jsonp(body, JSONP_CALLBACK);
        if json.is_empty() {
            return Err(Failure::new("no response"));
        }
        decode_batch(json).map_err(|e| Failure::with_detail("bad response", e.to_string()))
    }
}
