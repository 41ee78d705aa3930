use std::fmt;

/// Connection status of a `BayeuxClient`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Disconnected,
    Handshaking,
    Connecting,
    Connected,
    Disconnecting,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Disconnected => "disconnected",
            Status::Handshaking => "handshaking",
            Status::Connecting => "connecting",
            Status::Connected => "connected",
            Status::Disconnecting => "disconnecting",
        }
    }

    /// No further protocol traffic is expected (or allowed) in this status.
    pub fn is_disconnected(self) -> bool {
        matches!(self, Status::Disconnected | Status::Disconnecting)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
