use std::collections::BTreeMap;

use serde::Deserialize;

use cometd_core::error::{CometdError, Result};
use cometd_core::protocol::ChannelName;
use cometd_core::{Advice, Reconnect};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Bayeux server URL (required).
    #[serde(default)]
    pub url: String,

    /// `host[:port]` the application is served from; enables cross-domain detection.
    #[serde(default)]
    pub origin: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    #[serde(default = "default_backoff_increment_ms")]
    pub backoff_increment_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_true")]
    pub reverse_incoming_extensions: bool,

    #[serde(default = "default_max_network_delay_ms")]
    pub max_network_delay_ms: u64,

    #[serde(default)]
    pub request_headers: BTreeMap<String, String>,

    #[serde(default = "default_true")]
    pub append_message_type_to_url: bool,

    #[serde(default)]
    pub auto_batch: bool,

    #[serde(default = "default_advice")]
    pub advice: Advice,

    /// Channels the `cometd-client` binary subscribes to.
    #[serde(default)]
    pub channels: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            origin: None,
            max_connections: default_max_connections(),
            backoff_increment_ms: default_backoff_increment_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            log_level: default_log_level(),
            reverse_incoming_extensions: true,
            max_network_delay_ms: default_max_network_delay_ms(),
            request_headers: BTreeMap::new(),
            append_message_type_to_url: true,
            auto_batch: false,
            advice: default_advice(),
            channels: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Defaults for everything but the server URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(CometdError::Config(
                "missing required configuration parameter 'url' specifying the Bayeux server URL"
                    .into(),
            ));
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(CometdError::Config(format!(
                "url must be an absolute http(s) URL: {}",
                self.url
            )));
        }
        if self.max_connections < 2 {
            return Err(CometdError::Config(
                "max_connections must be at least 2 (one long-poll plus one request)".into(),
            ));
        }
        if self.max_backoff_ms < self.backoff_increment_ms {
            return Err(CometdError::Config(
                "max_backoff_ms must not be lower than backoff_increment_ms".into(),
            ));
        }
        if self.max_network_delay_ms == 0 {
            return Err(CometdError::Config(
                "max_network_delay_ms must be greater than 0".into(),
            ));
        }
        for ch in &self.channels {
            ChannelName::parse(ch)?;
        }
        Ok(())
    }
}

fn default_max_connections() -> usize {
    2
}
fn default_backoff_increment_ms() -> u64 {
    1000
}
fn default_max_backoff_ms() -> u64 {
    60000
}
fn default_log_level() -> String {
    "info".into()
}
fn default_max_network_delay_ms() -> u64 {
    10000
}
fn default_true() -> bool {
    true
}
fn default_advice() -> Advice {
    Advice {
        reconnect: Some(Reconnect::Retry),
        interval: Some(0),
        timeout: Some(60000),
    }
}
