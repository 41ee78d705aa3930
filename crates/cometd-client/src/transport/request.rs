//! Request bookkeeping shared by the HTTP transports.
//!
//! Rules:
//! - at most one long-poll request is outstanding;
//! - at most `max_connections - 1` ordinary requests are in flight, the rest
//!   wait in FIFO order and go out as `complete` frees slots;
//! - async requests expire after `max_network_delay` (+ `advice.timeout` for
//!   long-polls); a late response to an expired request is ignored.

use std::collections::VecDeque;
use std::time::Duration;

use tracing::debug;

use cometd_core::error::{CometdError, Result};
use cometd_core::protocol::message::encode_batch;
use cometd_core::Message;

use super::{
    Envelope, Failure, Outcome, RequestId, Resolution, Transport, TransportContext, WireHandle,
    WireRequest,
};
use crate::timer::{TimerId, TimerTask};

/// Result of handing a request to the I/O primitive.
pub enum Dispatch {
    Sent(Box<dyn WireHandle>),
    /// Failed before reaching the wire; reported asynchronously.
    Failed(Failure),
}

/// Wire-specific half of a request transport.
pub trait Wire: Send {
    /// Type name used until the transport is registered under another one.
    fn default_type(&self) -> &'static str;

    fn accept(&self, version: &str, cross_domain: bool) -> bool;

    fn transport_send(&mut self, ctx: &TransportContext<'_>, request: WireRequest) -> Dispatch;

    /// Turn a response body into messages, or explain why it is unusable.
    fn on_response(&mut self, body: &str) -> std::result::Result<Vec<Message>, Failure>;

    /// Called for every failed request.
    fn on_error(&mut self) {}

    fn reset(&mut self) {}
}

struct Request {
    id: RequestId,
    longpoll: bool,
    expired: bool,
    settled: bool,
    timeout: Option<TimerId>,
    handle: Option<Box<dyn WireHandle>>,
    envelope: Envelope,
}

/// Transport over request/response HTTP exchanges.
pub struct RequestTransport<W> {
    wire: W,
    transport_type: String,
    next_request: RequestId,
    longpoll: Option<Request>,
    requests: Vec<Request>,
    queue: VecDeque<(Envelope, RequestId)>,
}

impl<W: Wire> RequestTransport<W> {
    pub fn new(wire: W) -> Self {
        let transport_type = wire.default_type().to_string();
        Self {
            wire,
            transport_type,
            next_request: 0,
            longpoll: None,
            requests: Vec::new(),
            queue: VecDeque::new(),
        }
    }

    /// Ordinary requests currently on the wire.
    pub fn in_flight(&self) -> usize {
        self.requests.len()
    }

    /// Envelopes waiting for a free slot.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn longpoll_pending(&self) -> bool {
        self.longpoll.is_some()
    }

    fn next_id(&mut self) -> RequestId {
        self.next_request += 1;
        self.next_request
    }

    fn slots(ctx: &TransportContext<'_>) -> usize {
        // one connection is kept for the long-poll
        ctx.config.max_connections.saturating_sub(1)
    }

    fn dispatch(
        &mut self,
        ctx: &TransportContext<'_>,
        id: RequestId,
        longpoll: bool,
        envelope: Envelope,
    ) -> Request {
        let mut request = Request {
            id,
            longpoll,
            expired: false,
            settled: false,
            timeout: None,
            handle: None,
            envelope,
        };

        let dispatch = match encode_batch(&request.envelope.messages) {
            Ok(body) => {
                let wire_request = WireRequest {
                    transport: self.transport_type.clone(),
                    request: id,
                    url: request.envelope.url.clone(),
                    sync: request.envelope.sync,
                    headers: ctx.config.request_headers.clone(),
                    body,
                };
                self.wire.transport_send(ctx, wire_request)
            }
            Err(e) => Dispatch::Failed(Failure::with_detail("error", e.to_string())),
        };

        match dispatch {
            Dispatch::Sent(handle) => request.handle = Some(handle),
            Dispatch::Failed(failure) => {
                ctx.scheduler.schedule(
                    Duration::ZERO,
                    TimerTask::DeferredFailure {
                        transport: self.transport_type.clone(),
                        request: id,
                        reason: failure.detail.unwrap_or(failure.reason),
                    },
                );
            }
        }

        if !request.envelope.sync {
            let max_delay = ctx.config.max_network_delay_ms;
            let mut delay = max_delay;
            if longpoll {
                // advice.timeout comes from the server
                delay = delay.saturating_add(ctx.advice.timeout_ms());
            }
            debug!(
                transport = %self.transport_type,
                request = id,
                delay_ms = delay,
                max_network_delay_ms = max_delay,
                "waiting at most delay for the response"
            );
            request.timeout = Some(ctx.scheduler.schedule(
                Duration::from_millis(delay),
                TimerTask::RequestTimeout {
                    transport: self.transport_type.clone(),
                    request: id,
                },
            ));
        }

        request
    }

    fn queue_send(&mut self, ctx: &TransportContext<'_>, envelope: Envelope) {
        let id = self.next_id();
        if self.requests.len() < Self::slots(ctx) {
            let request = self.dispatch(ctx, id, false, envelope);
            self.requests.push(request);
        } else {
            debug!(transport = %self.transport_type, request = id, "queueing request");
            self.queue.push_back((envelope, id));
        }
    }

    fn longpoll_send(&mut self, ctx: &TransportContext<'_>, envelope: Envelope) -> Result<()> {
        if let Some(pending) = &self.longpoll {
            return Err(CometdError::ConcurrentLongPoll(pending.id));
        }
        let id = self.next_id();
        debug!(transport = %self.transport_type, request = id, "long-poll send");
        let request = self.dispatch(ctx, id, true, envelope);
        self.longpoll = Some(request);
        Ok(())
    }

    /// Pull queued envelopes for the same destination into `envelope`.
    fn coalesce(&mut self, envelope: &mut Envelope) {
        while let Some((next, _)) = self.queue.front() {
            if next.url != envelope.url || next.sync != envelope.sync {
                break;
            }
            if let Some((next, id)) = self.queue.pop_front() {
                debug!(
                    transport = %self.transport_type,
                    count = next.messages.len(),
                    request = id,
                    "coalesced messages"
                );
                envelope.messages.extend(next.messages);
            }
        }
    }

    fn find_mut(&mut self, id: RequestId) -> Option<&mut Request> {
        match &mut self.longpoll {
            Some(r) if r.id == id => Some(r),
            _ => self.requests.iter_mut().find(|r| r.id == id),
        }
    }

    /// Take the envelope out of a live request and stop its timer.
    fn settle(
        &mut self,
        ctx: &TransportContext<'_>,
        id: RequestId,
    ) -> Option<(bool, Envelope)> {
        let request = self.find_mut(id)?;
        if request.expired || request.settled {
            return None;
        }
        request.settled = true;
        let timer = request.timeout.take();
        let settled = (request.longpoll, std::mem::take(&mut request.envelope));
        if let Some(t) = timer {
            ctx.scheduler.cancel(t);
        }
        Some(settled)
    }
}

impl<W: Wire> Transport for RequestTransport<W> {
    fn transport_type(&self) -> &str {
        &self.transport_type
    }

    fn accept(&self, version: &str, cross_domain: bool) -> bool {
        self.wire.accept(version, cross_domain)
    }

    fn send(
        &mut self,
        ctx: &TransportContext<'_>,
        envelope: Envelope,
        longpoll: bool,
    ) -> Result<()> {
        if longpoll {
            self.longpoll_send(ctx, envelope)
        } else {
            self.queue_send(ctx, envelope);
            Ok(())
        }
    }

    fn complete(
        &mut self,
        ctx: &TransportContext<'_>,
        request: RequestId,
        success: bool,
        longpoll: bool,
    ) -> Result<()> {
        if longpoll {
            if let Some(pending) = &self.longpoll {
                if pending.id != request {
                    return Err(CometdError::Internal(format!(
                        "long-poll request mismatch, completing request {request} while {} is pending",
                        pending.id
                    )));
                }
            }
            self.longpoll = None;
            return Ok(());
        }

        // absent when aborted or reset in the meantime
        if let Some(idx) = self.requests.iter().position(|r| r.id == request) {
            self.requests.remove(idx);
        }

        if self.requests.len() < Self::slots(ctx) {
            if let Some((mut envelope, next)) = self.queue.pop_front() {
                debug!(transport = %self.transport_type, request = next, "dequeued request");
                if success && ctx.config.auto_batch {
                    self.coalesce(&mut envelope);
                }
                let r = self.dispatch(ctx, next, false, envelope);
                self.requests.push(r);
            }
        }
        Ok(())
    }

    fn transport_success(
        &mut self,
        ctx: &TransportContext<'_>,
        request: RequestId,
        body: &str,
    ) -> Option<Resolution> {
        let (longpoll, envelope) = self.settle(ctx, request)?;
        let outcome = match self.wire.on_response(body) {
            Ok(messages) => Outcome::Success(messages),
            Err(failure) => {
                self.wire.on_error();
                Outcome::Failure(failure)
            }
        };
        Some(Resolution {
            request,
            longpoll,
            envelope,
            outcome,
        })
    }

    fn transport_failure(
        &mut self,
        ctx: &TransportContext<'_>,
        request: RequestId,
        failure: Failure,
    ) -> Option<Resolution> {
        let (longpoll, envelope) = self.settle(ctx, request)?;
        self.wire.on_error();
        Some(Resolution {
            request,
            longpoll,
            envelope,
            outcome: Outcome::Failure(failure),
        })
    }

    fn expire(
        &mut self,
        _ctx: &TransportContext<'_>,
        timer: TimerId,
        request: RequestId,
    ) -> Option<Resolution> {
        let transport = self.transport_type.clone();
        let r = self.find_mut(request)?;
        if r.expired || r.settled || r.timeout != Some(timer) {
            return None;
        }
        r.expired = true;
        r.timeout = None;
        if let Some(handle) = r.handle.as_mut() {
            handle.abort();
        }
        let longpoll = r.longpoll;
        let envelope = std::mem::take(&mut r.envelope);
        let detail = format!("request {request} of transport {transport} exceeded its max network delay");
        debug!("{detail}");
        Some(Resolution {
            request,
            longpoll,
            envelope,
            outcome: Outcome::Failure(Failure::with_detail("timeout", detail)),
        })
    }

    fn abort(&mut self, ctx: &TransportContext<'_>) {
        for request in self.requests.iter_mut().chain(self.longpoll.iter_mut()) {
            debug!(transport = %self.transport_type, request = request.id, "aborting request");
            if let Some(t) = request.timeout.take() {
                ctx.scheduler.cancel(t);
            }
            if let Some(handle) = request.handle.as_mut() {
                handle.abort();
            }
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.longpoll = None;
        self.requests.clear();
        self.queue.clear();
        self.wire.reset();
    }

    fn registered(&mut self, transport_type: &str) {
        self.transport_type = transport_type.to_string();
    }
}
