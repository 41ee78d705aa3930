//! cometd-client
//!
//! Connects to a Bayeux server, subscribes to the configured channels and
//! logs whatever arrives until Ctrl-C.

use tracing_subscriber::{fmt, EnvFilter};

use cometd_client::{config, BayeuxClient, CallbackResult, Runtime};
use cometd_core::{CometdError, Message};

#[tokio::main]
async fn main() {
    let path = std::env::args().nth(1).unwrap_or_else(|| "cometd.yaml".to_string());

    // Config (strict parsing + validate)
    let cfg = config::load_from_file(&path).expect("config load failed");

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.log_level.clone()));
    fmt().with_env_filter(filter).init();

    let channels = cfg.channels.clone();
    let runtime = Runtime::start(cfg).expect("client start failed");
    let cometd = runtime.handle();

    cometd
        .add_listener("/meta/handshake", move |client: &mut BayeuxClient, m: &Message| {
            if !m.is_successful() {
                tracing::warn!(error = m.error.as_deref().unwrap_or(""), "handshake failed");
                return Ok(());
            }
            tracing::info!(client_id = client.client_id().unwrap_or(""), reestablish = ?m.reestablish, "handshake ok");
            client.batch(|client| {
                for channel in &channels {
                    client.subscribe(channel, log_message, None)?;
                }
                Ok::<(), CometdError>(())
            })??;
            Ok(())
        })
        .await
        .expect("listener registration failed");

    cometd
        .add_listener("/meta/connect", |_: &mut BayeuxClient, m: &Message| {
            if !m.is_successful() {
                tracing::warn!(reason = m.reason.as_deref().unwrap_or(""), "connect failed");
            }
            Ok(())
        })
        .await
        .expect("listener registration failed");

    cometd.handshake(None).await.expect("handshake failed");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler failed");
    }
    tracing::info!("disconnecting");
    if let Err(e) = cometd.disconnect().await {
        tracing::warn!(error = %e, "disconnect failed");
    }
    // let the disconnect go out
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    cometd.shutdown();
    runtime.join().await;
}

fn log_message(_: &mut BayeuxClient, m: &Message) -> CallbackResult {
    tracing::info!(channel = %m.channel, data = ?m.data, "message");
    Ok(())
}
