//! Tokio driver for `BayeuxClient`.
//!
//! One task owns the client and applies events one at a time: timer
//! firings from `TokioScheduler`, HTTP completions from `HttpExchange`, and
//! closures sent by `CometD` handles. That keeps the client single threaded
//! while the I/O runs concurrently.

pub mod http;
pub mod scheduler;

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use cometd_core::error::{CometdError, Result};
use cometd_core::Message;

use crate::client::{BayeuxClient, CallbackResult, Props, Status, Subscription};
use crate::config::ClientConfig;
use crate::timer::Timer;
use crate::transport::callback_polling::CALLBACK_POLLING;
use crate::transport::long_polling::LONG_POLLING;
use crate::transport::{CallbackPollingTransport, Exchange, ExchangeEvent, LongPollingTransport};

pub use http::HttpExchange;
pub use scheduler::TokioScheduler;

type Call = Box<dyn FnOnce(&mut BayeuxClient) + Send>;

/// Input of the event loop.
pub enum Event {
    Timer(Timer),
    Exchange(ExchangeEvent),
    Call(Call),
    Shutdown,
}

/// A running client event loop.
pub struct Runtime {
    handle: CometD,
    task: JoinHandle<()>,
}

impl Runtime {
    /// Build a configured client with the long-polling and callback-polling
    /// transports and spawn its event loop. Must be called within a tokio
    /// runtime. The client is not handshaken yet.
    pub fn start(config: ClientConfig) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Arc::new(TokioScheduler::new(tx.downgrade()));
        let exchange: Arc<dyn Exchange> = Arc::new(HttpExchange::new(tx.downgrade())?);

        let mut client = BayeuxClient::new(scheduler.clone());
        client.register_transport(
            LONG_POLLING,
            Box::new(LongPollingTransport::with_exchange(Arc::clone(&exchange))),
            None,
        );
        client.register_transport(
            CALLBACK_POLLING,
            Box::new(CallbackPollingTransport::with_exchange(exchange)),
            None,
        );
        client.configure(config)?;
        info!(url = %client.url(), transports = ?client.transport_types(), "cometd client started");

        let task = tokio::spawn(run(client, rx, scheduler));
        Ok(Self {
            handle: CometD { tx },
            task,
        })
    }

    pub fn handle(&self) -> CometD {
        self.handle.clone()
    }

    /// Wait for the event loop to stop (after `CometD::shutdown`).
    pub async fn join(self) {
        let Self { handle, task } = self;
        drop(handle);
        if let Err(e) = task.await {
            debug!(error = %e, "event loop task failed");
        }
    }
}

async fn run(
    mut client: BayeuxClient,
    mut rx: mpsc::UnboundedReceiver<Event>,
    scheduler: Arc<TokioScheduler>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            Event::Timer(timer) => client.on_timer(timer),
            Event::Exchange(event) => client.on_exchange(event),
            Event::Call(call) => call(&mut client),
            Event::Shutdown => break,
        }
    }
    scheduler.cancel_all();
    debug!(status = %client.status(), "event loop stopped");
}

/// Cloneable handle to a running client.
#[derive(Clone)]
pub struct CometD {
    tx: mpsc::UnboundedSender<Event>,
}

impl CometD {
    /// Run `f` on the event loop and return its result.
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut BayeuxClient) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Event::Call(Box::new(move |client| {
                let _ = reply.send(f(client));
            })))
            .map_err(|_| stopped())?;
        rx.await.map_err(|_| stopped())
    }

    pub async fn handshake(&self, props: Option<Props>) -> Result<()> {
        self.call(move |c| c.handshake(props)).await?
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.call(|c| c.disconnect(false, None)).await?
    }

    pub async fn publish(&self, channel: impl Into<String>, data: Value) -> Result<()> {
        let channel = channel.into();
        self.call(move |c| c.publish(&channel, data, None)).await?
    }

    pub async fn subscribe<F>(&self, channel: impl Into<String>, callback: F) -> Result<Subscription>
    where
        F: Fn(&mut BayeuxClient, &Message) -> CallbackResult + Send + Sync + 'static,
    {
        let channel = channel.into();
        self.call(move |c| c.subscribe(&channel, callback, None)).await?
    }

    pub async fn unsubscribe(&self, subscription: Subscription) -> Result<()> {
        self.call(move |c| c.unsubscribe(&subscription, None)).await?
    }

    pub async fn add_listener<F>(&self, channel: impl Into<String>, callback: F) -> Result<Subscription>
    where
        F: Fn(&mut BayeuxClient, &Message) -> CallbackResult + Send + Sync + 'static,
    {
        let channel = channel.into();
        self.call(move |c| c.add_listener(&channel, callback)).await?
    }

    pub async fn status(&self) -> Result<Status> {
        self.call(|c| c.status()).await
    }

    /// Stop the event loop. Pending timers are cancelled; in-flight requests
    /// complete into the void.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Event::Shutdown);
    }
}

fn stopped() -> CometdError {
    CometdError::InvalidState("client event loop has stopped".into())
}
