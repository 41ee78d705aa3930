//! Client config loader (strict parsing) and endpoint analysis.

pub mod schema;

use std::fs;

use url::Url;

use cometd_core::error::{CometdError, Result};

pub use schema::ClientConfig;

pub fn load_from_file(path: &str) -> Result<ClientConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| CometdError::Config(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<ClientConfig> {
    let cfg: ClientConfig = serde_yaml::from_str(s)
        .map_err(|e| CometdError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

/// What the client needs to know about the server URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// `host[:port]` of the server (port only when not the scheme default).
    pub host_and_port: String,
    /// Server lives on a different origin than the embedding application.
    pub cross_domain: bool,
    /// `handshake`/`connect`/`disconnect` can be appended as a path segment.
    pub supports_message_type_suffix: bool,
}

impl Endpoint {
    pub fn analyze(url: &str, origin: Option<&str>) -> Result<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| CometdError::Config(format!("invalid url {url:?}: {e}")))?;

        let host_and_port = match (parsed.host_str(), parsed.port()) {
            (Some(h), Some(p)) => format!("{h}:{p}"),
            (Some(h), None) => h.to_string(),
            _ => String::new(),
        };

        let cross_domain = match origin {
            Some(o) => !host_and_port.is_empty() && !o.eq_ignore_ascii_case(&host_and_port),
            None => false,
        };

        // `/cometd/` keeps `cometd` as its last real segment
        let last_segment = parsed
            .path_segments()
            .and_then(|segs| segs.filter(|s| !s.is_empty()).last())
            .unwrap_or("");

        // servlet mappings such as `*.cometd` cannot take an extra segment
        let supports_message_type_suffix = parsed.query().is_none()
            && parsed.fragment().is_none()
            && !last_segment.contains('.');

        Ok(Self {
            host_and_port,
            cross_domain,
            supports_message_type_suffix,
        })
    }
}
