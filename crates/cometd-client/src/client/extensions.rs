//! Message extensions: transforms applied to every outgoing message (in
//! registration order) and every incoming message (reverse registration order
//! unless configured otherwise).

use cometd_core::{BoxError, Message};

/// What the pipeline does with a message after an extension ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Stop processing: the message is neither sent nor dispatched.
    Drop,
}

pub type ExtensionResult = Result<Flow, BoxError>;

/// A pluggable message extension. Every hook is optional.
///
/// Hooks may rewrite the message in place. An error is logged and handed to
/// the extension exception handler; the pipeline then goes on with the
/// message as it stands.
pub trait Extension: Send {
    fn incoming(&mut self, _message: &mut Message) -> ExtensionResult {
        Ok(Flow::Continue)
    }

    fn outgoing(&mut self, _message: &mut Message) -> ExtensionResult {
        Ok(Flow::Continue)
    }

    fn registered(&mut self, _name: &str) {}

    fn unregistered(&mut self) {}
}

pub(crate) struct ExtensionEntry {
    pub(crate) name: String,
    pub(crate) extension: Box<dyn Extension>,
}
