//! `Exchange` over reqwest.

use futures_util::future::{AbortHandle, Abortable};
use reqwest::header::CONTENT_TYPE;
use tokio::sync::mpsc::WeakUnboundedSender;
use tracing::debug;
use url::Url;

use cometd_core::error::{CometdError, Result};

use super::Event;
use crate::transport::callback_polling::JSONP_CALLBACK;
use crate::transport::{Exchange, ExchangeEvent, ExchangeOutcome, WireHandle, WireRequest};

const JSON_CONTENT_TYPE: &str = "application/json;charset=UTF-8";

pub struct HttpExchange {
    http: reqwest::Client,
    events: WeakUnboundedSender<Event>,
}

impl HttpExchange {
    pub fn new(events: WeakUnboundedSender<Event>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| CometdError::Transport(format!("http client init failed: {e}")))?;
        Ok(Self { http, events })
    }

    fn spawn(&self, request: &WireRequest, builder: reqwest::RequestBuilder) -> Box<dyn WireHandle> {
        let (handle, reg) = AbortHandle::new_pair();
        let events = self.events.clone();
        let transport = request.transport.clone();
        let id = request.request;

        tokio::spawn(Abortable::new(
            async move {
                let outcome = match perform(builder).await {
                    Ok(body) => ExchangeOutcome::Response(body),
                    Err(e) => ExchangeOutcome::Error(e.to_string()),
                };
                if let Some(tx) = events.upgrade() {
                    let _ = tx.send(Event::Exchange(ExchangeEvent {
                        transport,
                        request: id,
                        outcome,
                    }));
                }
            },
            reg,
        ));
        Box::new(SpawnedRequest(Some(handle)))
    }
}

async fn perform(builder: reqwest::RequestBuilder) -> std::result::Result<String, reqwest::Error> {
    let response = builder.send().await?.error_for_status()?;
    response.text().await
}

/// Wire handle of a spawned request. Aborting never reports back.
struct SpawnedRequest(Option<AbortHandle>);

impl WireHandle for SpawnedRequest {
    fn abort(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

impl Exchange for HttpExchange {
    fn xhr_send(&self, request: WireRequest) -> Result<Box<dyn WireHandle>> {
        debug!(url = %request.url, request = request.request, sync = request.sync, "POST");
        let mut builder = self
            .http
            .post(&request.url)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = builder.body(request.body.clone());
        Ok(self.spawn(&request, builder))
    }

    fn jsonp_send(&self, request: WireRequest) -> Result<Box<dyn WireHandle>> {
        let url = Url::parse_with_params(
            &request.url,
            &[("jsonp", JSONP_CALLBACK), ("message", request.body.as_str())],
        )
        .map_err(|e| CometdError::Transport(format!("invalid url {}: {e}", request.url)))?;
        debug!(url = %request.url, request = request.request, "GET (jsonp)");

        let mut builder = self.http.get(url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        Ok(self.spawn(&request, builder))
    }
}
