//! Bounded-or-not in-order queue of inbound application messages
//! (component Q).
//!
//! Guarded by a single leaf mutex — never held across an `.await` point,
//! per the connection's lock-order rule (`queue_lock` is always the
//! innermost lock taken).

use crate::message::MessageEvent;
use std::collections::VecDeque;
use std::sync::Mutex;

pub struct EventQueue {
    inner: Mutex<VecDeque<MessageEvent>>,
    /// Soft cap; `None` means unbounded, matching the default config.
    soft_cap: Option<usize>,
}

impl EventQueue {
    pub fn new(soft_cap: Option<usize>) -> Self {
        EventQueue {
            inner: Mutex::new(VecDeque::new()),
            soft_cap,
        }
    }

    /// Appends `event`. Returns `Err` if doing so would exceed the soft
    /// cap — the caller (the receive loop) should treat that as cause to
    /// close the connection with code 1009, per spec.
    pub fn enqueue(&self, event: MessageEvent) -> Result<(), usize> {
        let mut guard = self.inner.lock().unwrap();
        if let Some(cap) = self.soft_cap {
            if guard.len() >= cap {
                return Err(cap);
            }
        }
        guard.push_back(event);
        Ok(())
    }

    /// Removes and returns the oldest queued event, or `None` if empty.
    pub fn dequeue(&self) -> Option<MessageEvent> {
        self.inner.lock().unwrap().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    fn event(text: &str) -> MessageEvent {
        MessageEvent::new(Message::Text(text.to_string()))
    }

    #[test]
    fn dequeues_in_fifo_order() {
        let queue = EventQueue::new(None);
        queue.enqueue(event("first")).unwrap();
        queue.enqueue(event("second")).unwrap();

        assert_eq!(queue.dequeue().unwrap().as_text().unwrap(), "first");
        assert_eq!(queue.dequeue().unwrap().as_text().unwrap(), "second");
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn soft_cap_rejects_once_full() {
        let queue = EventQueue::new(Some(1));
        queue.enqueue(event("first")).unwrap();
        assert_eq!(queue.enqueue(event("second")), Err(1));
    }

    #[test]
    fn unbounded_by_default() {
        let queue = EventQueue::new(None);
        for i in 0..10_000 {
            queue.enqueue(event(&i.to_string())).unwrap();
        }
        assert_eq!(queue.len(), 10_000);
    }
}
