//! Change-notification channel.
//!
//! Pull-based accessors live on the engines; this channel is the push side
//! of the watch contract. Subscribers hold the receiving end of an mpsc
//! channel; disconnected subscribers are dropped on the next publish.

use std::cell::RefCell;
use std::sync::mpsc::{channel, Receiver, Sender};

use crate::events::ChangeEvent;

#[derive(Default)]
pub struct Notifier {
    senders: RefCell<Vec<Sender<ChangeEvent>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        let (tx, rx) = channel();
        self.senders.borrow_mut().push(tx);
        rx
    }

    pub fn publish(&self, event: ChangeEvent) {
        self.senders
            .borrow_mut()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.senders.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn subscribers_receive_published_events() {
        let notifier = Notifier::new();
        let rx = notifier.subscribe();

        notifier.publish(ChangeEvent::ActivityStopped {
            activity_id: "a1".into(),
            at: Utc::now(),
        });

        match rx.try_recv().unwrap() {
            ChangeEvent::ActivityStopped { activity_id, .. } => assert_eq!(activity_id, "a1"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let notifier = Notifier::new();
        let rx = notifier.subscribe();
        drop(rx);

        notifier.publish(ChangeEvent::ActivityStopped {
            activity_id: "a1".into(),
            at: Utc::now(),
        });
        assert_eq!(notifier.subscriber_count(), 0);
    }
}
