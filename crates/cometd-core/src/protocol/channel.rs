//! Channel names.
//!
//! Channels are `/`-separated paths. A trailing `*` segment matches exactly
//! one more segment, a trailing `**` matches any number of segments.

use std::fmt;

use crate::error::{CometdError, Result};

/// Meta channels used by the protocol.
pub mod meta {
    pub const HANDSHAKE: &str = "/meta/handshake";
    pub const CONNECT: &str = "/meta/connect";
    pub const DISCONNECT: &str = "/meta/disconnect";
    pub const SUBSCRIBE: &str = "/meta/subscribe";
    pub const UNSUBSCRIBE: &str = "/meta/unsubscribe";
    /// Client-side only: publish acknowledgements are notified here.
    pub const PUBLISH: &str = "/meta/publish";
    pub const UNSUCCESSFUL: &str = "/meta/unsuccessful";
}

/// A validated channel name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelName(String);

impl ChannelName {
    /// Validate a channel name: non-empty, absolute, no empty segments.
    pub fn parse(name: &str) -> Result<Self> {
        if !name.starts_with('/') || name.len() < 2 {
            return Err(CometdError::BadArgument(format!(
                "illegal channel name: {name:?}"
            )));
        }
        if name[1..].split('/').any(str::is_empty) {
            return Err(CometdError::BadArgument(format!(
                "illegal channel name (empty segment): {name:?}"
            )));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Channels whose listeners must be notified for a message on `channel`, in
/// notification order. Takes the raw string: messages coming off the wire are
/// not re-validated.
///
/// For `/a/b/c`: `/a/b/c`, `/a/b/*`, `/a/b/**`, `/a/**`, `/**`.
pub fn notification_targets(channel: &str) -> Vec<String> {
    let parts: Vec<&str> = channel.split('/').collect();
    let last = parts.len().saturating_sub(1);

    let mut out = Vec::with_capacity(1 + 2 * last);
    out.push(channel.to_string());

    for i in (1..=last).rev() {
        let prefix = parts[..i].join("/");
        // only the immediate parent gets the single-segment glob
        if i == last {
            out.push(format!("{prefix}/*"));
        }
        out.push(format!("{prefix}/**"));
    }
    out
}
