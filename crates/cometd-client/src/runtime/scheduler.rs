use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::{AbortHandle, Abortable};
use tokio::sync::mpsc::WeakUnboundedSender;

use super::Event;
use crate::timer::{Scheduler, Timer, TimerId, TimerTask};

/// `Scheduler` on tokio timers. Each timer is a sleeping task that posts
/// `Event::Timer` to the event loop; cancelling aborts the task.
pub struct TokioScheduler {
    events: WeakUnboundedSender<Event>,
    next_id: AtomicU64,
    timers: Arc<DashMap<TimerId, AbortHandle>>,
}

impl TokioScheduler {
    pub fn new(events: WeakUnboundedSender<Event>) -> Self {
        Self {
            events,
            next_id: AtomicU64::new(0),
            timers: Arc::new(DashMap::new()),
        }
    }

    /// Timers scheduled and neither fired nor cancelled.
    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    pub fn cancel_all(&self) {
        self.timers.retain(|_, handle| {
            handle.abort();
            false
        });
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (handle, reg) = AbortHandle::new_pair();
        self.timers.insert(id, handle);

        let events = self.events.clone();
        let timers = Arc::clone(&self.timers);
        tokio::spawn(Abortable::new(
            async move {
                tokio::time::sleep(delay).await;
                timers.remove(&id);
                if let Some(tx) = events.upgrade() {
                    let _ = tx.send(Event::Timer(Timer { id, task }));
                }
            },
            reg,
        ));
        id
    }

    fn cancel(&self, id: TimerId) {
        if let Some((_, handle)) = self.timers.remove(&id) {
            handle.abort();
        }
    }
}
