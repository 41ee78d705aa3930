//! Bayeux protocol state machine.
//!
//! `BayeuxClient` is a plain `&mut self` state machine. It never blocks and
//! never spawns: network I/O goes through the registered transports (and
//! from there an `Exchange`), delays through a `Scheduler`. Whoever drives the
//! client feeds completions back via `on_exchange` and `on_timer`.
//!
//! Status transitions:
//!
//! ```text
//! disconnected --handshake()--> handshaking --ok--> connecting --/meta/connect sent--> connected
//!       ^                           |  ^                                                  |
//!       |                           +--+ (failure, retry with backoff)                   |
//!       +------------- disconnecting <--disconnect()-------------------------------------+
//! ```

mod backoff;
mod extensions;
mod listeners;
mod status;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use cometd_core::error::{CometdError, Result};
use cometd_core::protocol::channel::notification_targets;
use cometd_core::protocol::{meta, ChannelName, BAYEUX_MINIMUM_VERSION, BAYEUX_VERSION};
use cometd_core::{Advice, BoxError, Message, Reconnect};

use crate::config::{ClientConfig, Endpoint};
use crate::timer::{DelayedAction, Scheduler, Timer, TimerId, TimerTask};
use crate::transport::{
    Envelope, ExchangeEvent, ExchangeOutcome, Failure, Outcome, Resolution, Transport,
    TransportContext, TransportRegistry,
};

pub use backoff::Backoff;
pub use extensions::{Extension, ExtensionResult, Flow};
pub use listeners::{Callback, CallbackResult, Subscription};
pub use status::Status;

use extensions::ExtensionEntry;
use listeners::Listeners;

/// Receives errors returned by listener callbacks.
pub type ListenerExceptionHandler =
    Box<dyn FnMut(&BoxError, &Subscription, &Message) -> CallbackResult + Send>;

/// Receives errors returned by extensions: `(error, extension name, outgoing, message)`.
pub type ExtensionExceptionHandler =
    Box<dyn FnMut(&BoxError, &str, bool, &Message) -> CallbackResult + Send>;

/// Message properties merged into protocol messages (`ext` and friends).
pub type Props = Map<String, Value>;

pub struct BayeuxClient {
    scheduler: Arc<dyn Scheduler>,
    config: ClientConfig,
    transports: TransportRegistry,
    transport: Option<String>,
    status: Status,
    message_id: u64,
    client_id: Option<String>,
    batch: u32,
    internal_batch: bool,
    message_queue: Vec<Message>,
    listeners: Listeners,
    extensions: Vec<ExtensionEntry>,
    backoff: Backoff,
    advice: Advice,
    handshake_props: Option<Props>,
    reestablish: bool,
    connected: bool,
    cross_domain: bool,
    append_message_type: bool,
    scheduled_send: Option<TimerId>,
    listener_exception: Option<ListenerExceptionHandler>,
    extension_exception: Option<ExtensionExceptionHandler>,
}

impl BayeuxClient {
    /// An unconfigured client with no transports. Register transports and
    /// call `configure` before `handshake`.
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        let config = ClientConfig::default();
        Self {
            scheduler,
            transports: TransportRegistry::new(),
            transport: None,
            status: Status::Disconnected,
            message_id: 0,
            client_id: None,
            batch: 0,
            internal_batch: false,
            message_queue: Vec::new(),
            listeners: Listeners::default(),
            extensions: Vec::new(),
            backoff: Backoff::new(config.backoff_increment_ms, config.max_backoff_ms),
            advice: config.advice.clone(),
            handshake_props: None,
            reestablish: false,
            connected: false,
            cross_domain: false,
            append_message_type: config.append_message_type_to_url,
            scheduled_send: None,
            listener_exception: None,
            extension_exception: None,
            config,
        }
    }

    // ---- configuration -------------------------------------------------

    pub fn configure(&mut self, config: ClientConfig) -> Result<()> {
        config.validate()?;
        let endpoint = Endpoint::analyze(&config.url, config.origin.as_deref())?;

        self.append_message_type = config.append_message_type_to_url;
        if self.append_message_type && !endpoint.supports_message_type_suffix {
            info!(
                url = %config.url,
                "appending message type to URL is not supported, disabling append_message_type_to_url"
            );
            self.append_message_type = false;
        }

        self.cross_domain = endpoint.cross_domain;
        self.backoff = Backoff::new(config.backoff_increment_ms, config.max_backoff_ms);
        self.advice = config.advice.clone();
        debug!(
            url = %config.url,
            cross_domain = self.cross_domain,
            max_connections = config.max_connections,
            "configured"
        );
        self.config = config;
        Ok(())
    }

    /// `configure` followed by `handshake`.
    pub fn init(&mut self, config: ClientConfig, handshake_props: Option<Props>) -> Result<()> {
        self.configure(config)?;
        self.handshake(handshake_props)
    }

    // ---- registration --------------------------------------------------

    /// Add a transport under `transport_type`. `index` sets its priority
    /// (0 = highest); `None` appends. Returns false if the type is taken.
    pub fn register_transport(
        &mut self,
        transport_type: &str,
        mut transport: Box<dyn Transport>,
        index: Option<usize>,
    ) -> bool {
        if self.transports.get(transport_type).is_some() {
            debug!(transport_type, "transport already registered");
            return false;
        }
        transport.registered(transport_type);
        self.transports.add(transport_type, transport, index)
    }

    pub fn unregister_transport(&mut self, transport_type: &str) -> Option<Box<dyn Transport>> {
        let mut transport = self.transports.remove(transport_type)?;
        transport.unregistered();
        if self.transport.as_deref() == Some(transport_type) {
            self.transport = None;
        }
        Some(transport)
    }

    pub fn register_extension(&mut self, name: &str, mut extension: Box<dyn Extension>) -> bool {
        if self.extensions.iter().any(|e| e.name == name) {
            info!(extension = name, "could not register extension: already registered");
            return false;
        }
        extension.registered(name);
        self.extensions.push(ExtensionEntry {
            name: name.to_string(),
            extension,
        });
        debug!(extension = name, "registered extension");
        true
    }

    pub fn unregister_extension(&mut self, name: &str) -> bool {
        let Some(idx) = self.extensions.iter().position(|e| e.name == name) else {
            return false;
        };
        let mut entry = self.extensions.remove(idx);
        entry.extension.unregistered();
        debug!(extension = name, "unregistered extension");
        true
    }

    pub fn get_extension(&self, name: &str) -> Option<&dyn Extension> {
        self.extensions
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.extension.as_ref())
    }

    pub fn set_listener_exception_handler(&mut self, handler: ListenerExceptionHandler) {
        self.listener_exception = Some(handler);
    }

    pub fn set_extension_exception_handler(&mut self, handler: ExtensionExceptionHandler) {
        self.extension_exception = Some(handler);
    }

    // ---- public protocol operations ------------------------------------

    /// Start a fresh handshake. `props` are merged into every handshake
    /// message, automatic retries included.
    pub fn handshake(&mut self, props: Option<Props>) -> Result<()> {
        self.cancel_delayed_send();
        self.status = Status::Disconnected;
        self.reestablish = false;
        self.handshake_props = props;
        self.do_handshake()
    }

    /// Send `/meta/disconnect`. No-op when already disconnected or
    /// disconnecting. `sync` is a hint to the transport.
    pub fn disconnect(&mut self, sync: bool, props: Option<&Props>) -> Result<()> {
        if self.is_disconnected() {
            return Ok(());
        }
        let mut message = Message::new(meta::DISCONNECT);
        if let Some(props) = props {
            message.merge_props(props);
        }
        self.status = Status::Disconnecting;
        self.send_messages(sync, vec![message], false, Some("disconnect"))
    }

    pub fn publish(&mut self, channel: &str, data: Value, props: Option<&Props>) -> Result<()> {
        let channel = ChannelName::parse(channel)?;
        if self.is_disconnected() {
            return Err(CometdError::InvalidState(format!(
                "cannot publish to {channel}: {}",
                self.status
            )));
        }
        let mut message = Message::publish(channel.as_str(), data);
        if let Some(props) = props {
            message.merge_props(props);
        }
        self.queue_send(message)
    }

    /// Register `callback` for messages on `channel`; the server is told
    /// only about the first subscription to a channel.
    pub fn subscribe<F>(
        &mut self,
        channel: &str,
        callback: F,
        props: Option<&Props>,
    ) -> Result<Subscription>
    where
        F: Fn(&mut BayeuxClient, &Message) -> CallbackResult + Send + Sync + 'static,
    {
        let channel = ChannelName::parse(channel)?;
        if self.is_disconnected() {
            return Err(CometdError::InvalidState(format!(
                "cannot subscribe to {channel}: {}",
                self.status
            )));
        }

        let send = !self.listeners.has_subscriptions(channel.as_str());
        let subscription = self.listeners.add(channel.as_str(), Arc::new(callback), false);

        if send {
            let mut message = Message::new(meta::SUBSCRIBE);
            message.subscription = Some(channel.as_str().to_string());
            if let Some(props) = props {
                message.merge_props(props);
            }
            self.queue_send(message)?;
        }
        Ok(subscription)
    }

    /// Drop a subscription; the server is told once the last subscription on
    /// the channel is gone.
    pub fn unsubscribe(&mut self, subscription: &Subscription, props: Option<&Props>) -> Result<()> {
        if subscription.is_listener() {
            return Err(CometdError::BadArgument(format!(
                "{} is a listener, not a subscription",
                subscription.channel()
            )));
        }
        if self.is_disconnected() {
            return Err(CometdError::InvalidState(format!(
                "cannot unsubscribe from {}: {}",
                subscription.channel(),
                self.status
            )));
        }

        self.listeners.remove(subscription);

        let channel = subscription.channel();
        if !self.listeners.has_subscriptions(channel) {
            let mut message = Message::new(meta::UNSUBSCRIBE);
            message.subscription = Some(channel.to_string());
            if let Some(props) = props {
                message.merge_props(props);
            }
            self.queue_send(message)?;
        }
        Ok(())
    }

    /// Local listener; unlike `subscribe` nothing is sent to the server.
    pub fn add_listener<F>(&mut self, channel: &str, callback: F) -> Result<Subscription>
    where
        F: Fn(&mut BayeuxClient, &Message) -> CallbackResult + Send + Sync + 'static,
    {
        let channel = ChannelName::parse(channel)?;
        Ok(self.listeners.add(channel.as_str(), Arc::new(callback), true))
    }

    pub fn remove_listener(&mut self, subscription: &Subscription) -> bool {
        self.listeners.remove(subscription)
    }

    pub fn clear_listeners(&mut self) {
        self.listeners.clear();
    }

    /// Forget server subscriptions locally; listeners stay.
    pub fn clear_subscriptions(&mut self) {
        self.listeners.clear_subscriptions();
    }

    /// Raw send through the batch queue, for extensions re-sending messages.
    pub fn send(&mut self, message: Message) -> Result<()> {
        self.queue_send(message)
    }

    // ---- batching ------------------------------------------------------

    pub fn start_batch(&mut self) {
        self.batch += 1;
    }

    pub fn end_batch(&mut self) -> Result<()> {
        if self.batch == 0 {
            return Err(CometdError::UnbalancedBatch);
        }
        self.batch -= 1;
        if self.batch == 0 && !self.is_disconnected() && !self.internal_batch {
            self.flush_batch()?;
        }
        Ok(())
    }

    /// Run `f` inside a batch. The batch is closed even when `f` fails.
    pub fn batch<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> Result<R> {
        self.start_batch();
        let out = f(self);
        self.end_batch()?;
        Ok(out)
    }

    // ---- getters -------------------------------------------------------

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_disconnected(&self) -> bool {
        self.status.is_disconnected()
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Negotiated transport type.
    pub fn transport(&self) -> Option<&str> {
        self.transport.as_deref()
    }

    pub fn transport_types(&self) -> Vec<String> {
        self.transports.transport_types()
    }

    pub fn advice(&self) -> &Advice {
        &self.advice
    }

    pub fn backoff_increment(&self) -> u64 {
        self.backoff.increment_ms()
    }

    /// Current backoff in milliseconds.
    pub fn backoff_period(&self) -> u64 {
        self.backoff.current_ms()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // ---- event entry points --------------------------------------------

    /// A wire request finished.
    pub fn on_exchange(&mut self, event: ExchangeEvent) {
        let ExchangeEvent {
            transport,
            request,
            outcome,
        } = event;
        let resolution = match outcome {
            ExchangeOutcome::Response(body) => {
                self.with_transport(&transport, |t, ctx| t.transport_success(ctx, request, &body))
            }
            ExchangeOutcome::Error(reason) => self.with_transport(&transport, |t, ctx| {
                t.transport_failure(ctx, request, Failure::with_detail("error", reason))
            }),
        };
        match resolution.flatten() {
            Some(resolution) => self.resolve(&transport, resolution),
            None => debug!(%transport, request, "ignoring completion of unknown or expired request"),
        }
    }

    /// A scheduled timer fired.
    pub fn on_timer(&mut self, timer: Timer) {
        let Timer { id, task } = timer;
        match task {
            TimerTask::Delayed(action) => {
                if self.scheduled_send != Some(id) {
                    return;
                }
                self.scheduled_send = None;
                let result = match action {
                    DelayedAction::Handshake if self.is_disconnected() => Ok(()),
                    DelayedAction::Handshake => self.do_handshake(),
                    DelayedAction::Connect => self.connect(),
                };
                if let Err(e) = result {
                    warn!(error = %e, code = e.code().as_str(), ?action, "delayed send failed");
                }
            }
            TimerTask::RequestTimeout { transport, request } => {
                let resolution = self.with_transport(&transport, |t, ctx| t.expire(ctx, id, request));
                if let Some(resolution) = resolution.flatten() {
                    self.resolve(&transport, resolution);
                }
            }
            TimerTask::DeferredFailure {
                transport,
                request,
                reason,
            } => {
                let resolution = self.with_transport(&transport, |t, ctx| {
                    t.transport_failure(ctx, request, Failure::with_detail("error", reason))
                });
                if let Some(resolution) = resolution.flatten() {
                    self.resolve(&transport, resolution);
                }
            }
        }
    }

    // ---- internals: transport plumbing ---------------------------------

    fn with_transport<R>(
        &mut self,
        transport_type: &str,
        f: impl FnOnce(&mut (dyn Transport + 'static), &TransportContext<'_>) -> R,
    ) -> Option<R> {
        let ctx = TransportContext {
            config: &self.config,
            advice: &self.advice,
            scheduler: self.scheduler.as_ref(),
        };
        let transport = self.transports.get_mut(transport_type)?;
        Some(f(transport, &ctx))
    }

    fn resolve(&mut self, transport: &str, resolution: Resolution) {
        let Resolution {
            request,
            longpoll,
            envelope,
            outcome,
        } = resolution;

        let success = matches!(outcome, Outcome::Success(_));
        match outcome {
            Outcome::Success(messages) => {
                for message in messages {
                    if let Err(e) = self.receive(message) {
                        debug!(error = %e, code = e.code().as_str(), "exception during message handling");
                        break;
                    }
                }
            }
            Outcome::Failure(failure) => {
                debug!(
                    %transport,
                    request,
                    reason = %failure.reason,
                    detail = failure.detail.as_deref().unwrap_or(""),
                    "request failed"
                );
                self.handle_failure(envelope.messages, &failure);
            }
        }

        let completed = self.with_transport(transport, |t, ctx| t.complete(ctx, request, success, longpoll));
        if let Some(Err(e)) = completed {
            warn!(error = %e, %transport, request, "could not complete request");
        }
    }

    // ---- internals: outgoing -------------------------------------------

    fn do_handshake(&mut self) -> Result<()> {
        self.client_id = None;
        self.clear_subscriptions();

        if self.is_disconnected() {
            self.transports.reset();
            self.advice = self.config.advice.clone();
        } else {
            // a re-handshake must be followed by a connect
            self.advice.reconnect = Some(Reconnect::Retry);
        }

        self.batch = 0;
        self.internal_batch = true;

        let transport_types = self
            .transports
            .find_transport_types(BAYEUX_VERSION, self.cross_domain);

        let mut message = Message::new(meta::HANDSHAKE);
        message.version = Some(BAYEUX_VERSION.to_string());
        message.minimum_version = Some(BAYEUX_MINIMUM_VERSION.to_string());
        message.supported_connection_types = Some(transport_types.clone());
        message.advice = Some(Advice {
            reconnect: None,
            interval: self.advice.interval,
            timeout: self.advice.timeout,
        });
        if let Some(props) = &self.handshake_props {
            message.merge_props(props);
        }

        let Some(transport) = self
            .transports
            .negotiate_transport(&transport_types, BAYEUX_VERSION, self.cross_domain)
            .map(str::to_string)
        else {
            return Err(CometdError::Negotiation {
                client: transport_types,
                server: Vec::new(),
            });
        };
        debug!(%transport, "initial transport");
        self.transport = Some(transport);

        self.status = Status::Handshaking;
        debug!(status = %self.status, "handshake sent");
        self.send_messages(false, vec![message], false, Some("handshake"))
    }

    fn connect(&mut self) -> Result<()> {
        if self.is_disconnected() {
            return Ok(());
        }
        let mut message = Message::new(meta::CONNECT);
        message.connection_type = self.transport.clone();
        if !self.connected {
            // ask the server to answer right away the first time
            message.advice = Some(Advice {
                timeout: Some(0),
                ..Advice::default()
            });
        }
        self.status = Status::Connecting;
        debug!(status = %self.status, "connect sent");
        self.send_messages(false, vec![message], true, Some("connect"))?;
        self.status = Status::Connected;
        Ok(())
    }

    fn queue_send(&mut self, message: Message) -> Result<()> {
        if self.batch > 0 || self.internal_batch {
            self.message_queue.push(message);
            Ok(())
        } else {
            self.send_messages(false, vec![message], false, None)
        }
    }

    fn flush_batch(&mut self) -> Result<()> {
        let messages = std::mem::take(&mut self.message_queue);
        if messages.is_empty() {
            return Ok(());
        }
        self.send_messages(false, messages, false, None)
    }

    fn send_messages(
        &mut self,
        sync: bool,
        messages: Vec<Message>,
        longpoll: bool,
        suffix: Option<&str>,
    ) -> Result<()> {
        let mut batch = Vec::with_capacity(messages.len());
        for mut message in messages {
            self.message_id += 1;
            message.id = Some(self.message_id.to_string());
            if let Some(client_id) = &self.client_id {
                message.client_id = Some(client_id.clone());
            }
            if self.apply_outgoing_extensions(&mut message) == Flow::Continue {
                batch.push(message);
            }
        }
        if batch.is_empty() {
            return Ok(());
        }

        let mut url = self.config.url.clone();
        if let (true, Some(suffix)) = (self.append_message_type, suffix) {
            if !url.ends_with('/') {
                url.push('/');
            }
            url.push_str(suffix);
        }

        let Some(transport) = self.transport.clone() else {
            return Err(CometdError::InvalidState("no transport negotiated".into()));
        };
        debug!(%transport, %url, count = batch.len(), longpoll, "send");

        let envelope = Envelope {
            url,
            sync,
            messages: batch,
        };
        self.with_transport(&transport, |t, ctx| t.send(ctx, envelope, longpoll))
            .unwrap_or_else(|| {
                Err(CometdError::InvalidState(format!(
                    "transport {transport} is not registered"
                )))
            })
    }

    fn cancel_delayed_send(&mut self) {
        if let Some(id) = self.scheduled_send.take() {
            self.scheduler.cancel(id);
        }
    }

    fn delayed_send(&mut self, action: DelayedAction) {
        self.cancel_delayed_send();
        let delay = self
            .backoff
            .current_ms()
            .saturating_add(self.advice.interval_ms());
        debug!(?action, delay_ms = delay, "delayed send");
        self.scheduled_send = Some(
            self.scheduler
                .schedule(Duration::from_millis(delay), TimerTask::Delayed(action)),
        );
    }

    fn delayed_handshake(&mut self) {
        self.status = Status::Handshaking;
        self.internal_batch = true;
        self.delayed_send(DelayedAction::Handshake);
    }

    fn delayed_connect(&mut self) {
        self.status = Status::Connecting;
        self.delayed_send(DelayedAction::Connect);
    }

    /// Local teardown; `abort` also aborts in-flight requests.
    fn disconnect_local(&mut self, abort: bool) {
        self.cancel_delayed_send();
        if abort {
            if let Some(transport) = self.transport.clone() {
                self.with_transport(&transport, |t, ctx| t.abort(ctx));
            }
        }
        self.client_id = None;
        self.status = Status::Disconnected;
        self.connected = false;
        self.batch = 0;
        self.internal_batch = false;
        self.backoff.reset();
        debug!(status = %self.status, "disconnected");

        let queued = std::mem::take(&mut self.message_queue);
        if !queued.is_empty() {
            self.handle_failure(queued, &Failure::with_detail("error", "Disconnected"));
        }
    }

    // ---- internals: incoming -------------------------------------------

    fn receive(&mut self, mut message: Message) -> Result<()> {
        if self.apply_incoming_extensions(&mut message) == Flow::Drop {
            return Ok(());
        }

        if let Some(advice) = &message.advice {
            self.update_advice(advice);
        }

        match message.channel.as_str() {
            meta::HANDSHAKE => self.handshake_response(message),
            meta::CONNECT => self.connect_response(message),
            meta::DISCONNECT => {
                self.disconnect_response(message);
                Ok(())
            }
            meta::SUBSCRIBE | meta::UNSUBSCRIBE => {
                let channel = message.channel.clone();
                self.meta_response(&channel, &message);
                Ok(())
            }
            _ => {
                self.message_response(message);
                Ok(())
            }
        }
    }

    /// Server advice replaces the previous advice; fields it leaves out fall
    /// back to the configured advice.
    fn update_advice(&mut self, advice: &Advice) {
        let base = &self.config.advice;
        self.advice = Advice {
            reconnect: advice.reconnect.or(base.reconnect),
            interval: advice.interval.or(base.interval),
            timeout: advice.timeout.or(base.timeout),
        };
    }

    fn handshake_response(&mut self, mut message: Message) -> Result<()> {
        if !message.is_successful() {
            self.notify_listeners(meta::HANDSHAKE, &message);
            self.notify_listeners(meta::UNSUCCESSFUL, &message);

            let retry = !self.is_disconnected() && self.advice.reconnect != Some(Reconnect::None);
            if retry {
                self.backoff.increase();
                self.delayed_handshake();
            } else {
                self.disconnect_local(false);
            }
            return Ok(());
        }

        self.client_id = message.client_id.clone();

        let server = message.supported_connection_types.clone().unwrap_or_default();
        let version = message
            .version
            .clone()
            .unwrap_or_else(|| BAYEUX_VERSION.to_string());
        let negotiated = self
            .transports
            .negotiate_transport(&server, &version, self.cross_domain)
            .map(str::to_string);
        let Some(transport) = negotiated else {
            return Err(CometdError::Negotiation {
                client: self.transports.find_transport_types(&version, self.cross_domain),
                server,
            });
        };
        if self.transport.as_deref() != Some(transport.as_str()) {
            debug!(%transport, "transport negotiated");
            self.transport = Some(transport);
        }

        // release what the application queued while handshaking
        self.internal_batch = false;
        if let Err(e) = self.flush_batch() {
            warn!(error = %e, "could not flush messages queued during handshake");
        }

        message.reestablish = Some(self.reestablish);
        self.reestablish = true;
        self.notify_listeners(meta::HANDSHAKE, &message);

        let action = if self.is_disconnected() {
            Reconnect::None
        } else {
            self.advice.reconnect.unwrap_or(Reconnect::Retry)
        };
        match action {
            Reconnect::Retry => {
                self.backoff.reset();
                self.delayed_connect();
                Ok(())
            }
            Reconnect::None => {
                self.disconnect_local(false);
                Ok(())
            }
            other => Err(CometdError::Internal(format!(
                "unrecognized advice action {}",
                other.as_str()
            ))),
        }
    }

    fn connect_response(&mut self, message: Message) -> Result<()> {
        self.connected = message.is_successful();

        if self.connected {
            self.notify_listeners(meta::CONNECT, &message);
            let action = if self.is_disconnected() {
                Reconnect::None
            } else {
                self.advice.reconnect.unwrap_or(Reconnect::Retry)
            };
            return match action {
                Reconnect::Retry => {
                    self.backoff.reset();
                    self.delayed_connect();
                    Ok(())
                }
                Reconnect::None => {
                    self.disconnect_local(false);
                    Ok(())
                }
                other => Err(CometdError::Internal(format!(
                    "unrecognized advice action {}",
                    other.as_str()
                ))),
            };
        }

        self.notify_listeners(meta::CONNECT, &message);
        self.notify_listeners(meta::UNSUCCESSFUL, &message);
        self.after_connect_failure()
    }

    fn after_connect_failure(&mut self) -> Result<()> {
        let action = if self.is_disconnected() {
            Reconnect::None
        } else {
            self.advice.reconnect.unwrap_or(Reconnect::Retry)
        };
        match action {
            Reconnect::Retry => {
                self.backoff.increase();
                self.delayed_connect();
                Ok(())
            }
            Reconnect::Handshake => {
                self.backoff.reset();
                self.delayed_handshake();
                Ok(())
            }
            Reconnect::None => {
                self.disconnect_local(false);
                Ok(())
            }
            Reconnect::Unknown => Err(CometdError::Internal(
                "unrecognized advice action".into(),
            )),
        }
    }

    fn disconnect_response(&mut self, message: Message) {
        if message.is_successful() {
            self.disconnect_local(false);
            self.notify_listeners(meta::DISCONNECT, &message);
        } else {
            self.disconnect_local(true);
            self.notify_listeners(meta::DISCONNECT, &message);
            self.notify_listeners(meta::UNSUCCESSFUL, &message);
        }
    }

    /// Subscribe / unsubscribe acknowledgements.
    fn meta_response(&mut self, channel: &str, message: &Message) {
        self.notify_listeners(channel, message);
        if !message.is_successful() {
            self.notify_listeners(meta::UNSUCCESSFUL, message);
        }
    }

    fn message_response(&mut self, message: Message) {
        match message.successful {
            None if message.data.is_some() => {
                let channel = message.channel.clone();
                self.notify_listeners(&channel, &message);
            }
            None => warn!(channel = %message.channel, "unknown message"),
            Some(true) => self.notify_listeners(meta::PUBLISH, &message),
            Some(false) => {
                self.notify_listeners(meta::PUBLISH, &message);
                self.notify_listeners(meta::UNSUCCESSFUL, &message);
            }
        }
    }

    // ---- internals: failures -------------------------------------------

    fn handle_failure(&mut self, messages: Vec<Message>, failure: &Failure) {
        for message in messages {
            match message.channel.as_str() {
                meta::HANDSHAKE => self.handshake_failure(message, failure),
                meta::CONNECT => {
                    if let Err(e) = self.connect_failure(message, failure) {
                        debug!(error = %e, "exception during connect failure handling");
                    }
                }
                meta::DISCONNECT => self.disconnect_failure(message, failure),
                meta::SUBSCRIBE | meta::UNSUBSCRIBE => {
                    let channel = message.channel.clone();
                    let failed = self.failure_message(message, failure, Reconnect::None);
                    self.notify_listeners(&channel, &failed);
                    self.notify_listeners(meta::UNSUCCESSFUL, &failed);
                }
                _ => {
                    let failed = self.failure_message(message, failure, Reconnect::None);
                    self.notify_listeners(meta::PUBLISH, &failed);
                    self.notify_listeners(meta::UNSUCCESSFUL, &failed);
                }
            }
        }
    }

    /// Client-side stand-in for a response that never arrived.
    fn failure_message(&self, request: Message, failure: &Failure, reconnect: Reconnect) -> Message {
        let interval = match reconnect {
            Reconnect::Retry => i64::try_from(self.backoff.current_ms()).unwrap_or(i64::MAX),
            _ => 0,
        };
        let mut message = Message::new(request.channel.clone());
        message.id = request.id.clone();
        message.subscription = request.subscription.clone();
        message.successful = Some(false);
        message.failure = Some(true);
        message.reason = Some(failure.reason.clone());
        message.error = failure.detail.clone();
        message.advice = Some(Advice::new(reconnect, interval));
        message.request = Some(Box::new(request));
        message
    }

    fn handshake_failure(&mut self, request: Message, failure: &Failure) {
        let message = self.failure_message(request, failure, Reconnect::Retry);
        if self.status != Status::Disconnecting {
            self.notify_listeners(meta::HANDSHAKE, &message);
            self.notify_listeners(meta::UNSUCCESSFUL, &message);
        }

        let retry = !self.is_disconnected() && self.advice.reconnect != Some(Reconnect::None);
        if retry {
            self.backoff.increase();
            self.delayed_handshake();
        } else {
            self.disconnect_local(false);
        }
    }

    fn connect_failure(&mut self, request: Message, failure: &Failure) -> Result<()> {
        self.connected = false;
        let message = self.failure_message(request, failure, Reconnect::Retry);
        self.notify_listeners(meta::CONNECT, &message);
        self.notify_listeners(meta::UNSUCCESSFUL, &message);
        self.after_connect_failure()
    }

    fn disconnect_failure(&mut self, request: Message, failure: &Failure) {
        self.disconnect_local(true);
        let message = self.failure_message(request, failure, Reconnect::None);
        self.notify_listeners(meta::DISCONNECT, &message);
        self.notify_listeners(meta::UNSUCCESSFUL, &message);
    }

    // ---- internals: extensions and listeners ---------------------------

    fn apply_outgoing_extensions(&mut self, message: &mut Message) -> Flow {
        for idx in 0..self.extensions.len() {
            match self.extensions[idx].extension.outgoing(message) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Drop) => {
                    debug!(extension = %self.extensions[idx].name, channel = %message.channel, "outgoing message dropped");
                    return Flow::Drop;
                }
                Err(e) => self.extension_failed(idx, &e, true, message),
            }
        }
        Flow::Continue
    }

    fn apply_incoming_extensions(&mut self, message: &mut Message) -> Flow {
        let n = self.extensions.len();
        for step in 0..n {
            let idx = if self.config.reverse_incoming_extensions {
                n - 1 - step
            } else {
                step
            };
            match self.extensions[idx].extension.incoming(message) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Drop) => {
                    debug!(extension = %self.extensions[idx].name, channel = %message.channel, "incoming message dropped");
                    return Flow::Drop;
                }
                Err(e) => self.extension_failed(idx, &e, false, message),
            }
        }
        Flow::Continue
    }

    fn extension_failed(&mut self, idx: usize, error: &BoxError, outgoing: bool, message: &Message) {
        let name = self.extensions[idx].name.clone();
        debug!(extension = %name, outgoing, error = %error, "exception during execution of extension");
        if let Some(hook) = self.extension_exception.as_mut() {
            if let Err(e) = hook(error, &name, outgoing, message) {
                debug!(extension = %name, error = %e, "exception during execution of extension exception handler");
            }
        }
    }

    fn notify_listeners(&mut self, channel: &str, message: &Message) {
        for target in notification_targets(channel) {
            self.notify(&target, message);
        }
    }

    fn notify(&mut self, channel: &str, message: &Message) {
        for (subscription, callback) in self.listeners.snapshot(channel) {
            // an earlier callback may have removed it
            if !self.listeners.contains(&subscription) {
                continue;
            }
            let Err(error) = callback(self, message) else {
                continue;
            };
            debug!(%channel, error = %error, "exception during notification");
            if let Some(mut hook) = self.listener_exception.take() {
                if let Err(e) = hook(&error, &subscription, message) {
                    debug!(%channel, error = %e, "exception during execution of listener exception handler");
                }
                self.listener_exception.get_or_insert(hook);
            }
        }
    }
}
