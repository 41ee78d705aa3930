//! Channel listener registry.
//!
//! Entries live in a per-channel map keyed by a monotonically increasing id,
//! so removing one entry never shifts the ids of the others, and iteration
//! follows registration order.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use cometd_core::{BoxError, Message};

use super::BayeuxClient;

/// Outcome of a user callback.
pub type CallbackResult = Result<(), BoxError>;

/// Listener / subscription callback. It gets the client back so it can issue
/// further operations (subscribe from a handshake listener, publish a reply).
pub type Callback = Arc<dyn Fn(&mut BayeuxClient, &Message) -> CallbackResult + Send + Sync>;

/// Handle returned by `add_listener` / `subscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    channel: String,
    id: u64,
    listener: bool,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// `true` for local listeners, `false` for server subscriptions.
    pub fn is_listener(&self) -> bool {
        self.listener
    }
}

struct Entry {
    callback: Callback,
    listener: bool,
}

#[derive(Default)]
pub(crate) struct Listeners {
    by_channel: HashMap<String, BTreeMap<u64, Entry>>,
    next_id: u64,
}

impl Listeners {
    pub(crate) fn add(&mut self, channel: &str, callback: Callback, listener: bool) -> Subscription {
        self.next_id += 1;
        let id = self.next_id;
        self.by_channel
            .entry(channel.to_string())
            .or_default()
            .insert(id, Entry { callback, listener });
        Subscription {
            channel: channel.to_string(),
            id,
            listener,
        }
    }

    pub(crate) fn remove(&mut self, sub: &Subscription) -> bool {
        let Some(entries) = self.by_channel.get_mut(&sub.channel) else {
            return false;
        };
        let removed = entries.remove(&sub.id).is_some();
        if entries.is_empty() {
            self.by_channel.remove(&sub.channel);
        }
        removed
    }

    pub(crate) fn contains(&self, sub: &Subscription) -> bool {
        self.by_channel
            .get(&sub.channel)
            .is_some_and(|entries| entries.contains_key(&sub.id))
    }

    /// At least one server subscription remains on `channel`.
    pub(crate) fn has_subscriptions(&self, channel: &str) -> bool {
        self.by_channel
            .get(channel)
            .is_some_and(|entries| entries.values().any(|e| !e.listener))
    }

    /// Callbacks registered on exactly `channel`, in registration order.
    pub(crate) fn snapshot(&self, channel: &str) -> Vec<(Subscription, Callback)> {
        let Some(entries) = self.by_channel.get(channel) else {
            return Vec::new();
        };
        entries
            .iter()
            .map(|(id, e)| {
                (
                    Subscription {
                        channel: channel.to_string(),
                        id: *id,
                        listener: e.listener,
                    },
                    Arc::clone(&e.callback),
                )
            })
            .collect()
    }

    pub(crate) fn clear_subscriptions(&mut self) {
        for entries in self.by_channel.values_mut() {
            entries.retain(|_, e| e.listener);
        }
        self.by_channel.retain(|_, entries| !entries.is_empty());
    }

    pub(crate) fn clear(&mut self) {
        self.by_channel.clear();
    }
}
