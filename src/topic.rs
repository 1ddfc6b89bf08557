//! Latest-value message exchange between the control loop and its collaborators.
//!
//! Every input of the loop is a [`Topic`]: a subscription that keeps only the most
//! recent message and remembers whether it was already seen. Outputs are
//! [`Publisher`]s which always store the last message, even with no subscriber.

use crate::Error;
use tokio::sync::watch;

/// Create a connected publisher/subscriber pair holding `initial`.
///
/// The initial value counts as already seen, so the first [`Topic::poll`] returns
/// `None` until something is published.
pub fn channel<T>(name: &'static str, initial: T) -> (Publisher<T>, Topic<T>) {
    let (tx, rx) = watch::channel(initial);
    (Publisher { name, tx }, Topic { name, rx })
}

/// Subscriber side of a topic.
#[derive(Debug)]
pub struct Topic<T> {
    name: &'static str,
    rx: watch::Receiver<T>,
}

impl<T: Clone> Topic<T> {
    /// Copy the latest message if one arrived since the last check.
    ///
    /// Never blocks. A topic whose publisher is gone reports no new data.
    pub fn poll(&mut self) -> Option<T> {
        match self.rx.has_changed() {
            Ok(true) => Some(self.rx.borrow_and_update().clone()),
            _ => None,
        }
    }

    /// Wait until a new message arrives and copy it.
    pub async fn changed(&mut self) -> Result<T, Error> {
        self.rx
            .changed()
            .await
            .map_err(|_| Error::TopicClosed { topic: self.name })?;
        Ok(self.rx.borrow_and_update().clone())
    }

    /// Mark the stored message as seen without copying it.
    pub fn mark_seen(&mut self) {
        self.rx.borrow_and_update();
    }

    /// The latest message, seen or not.
    pub fn latest(&self) -> T {
        self.rx.borrow().clone()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Publisher side of a topic.
#[derive(Debug)]
pub struct Publisher<T> {
    name: &'static str,
    tx: watch::Sender<T>,
}

impl<T> Publisher<T> {
    /// Replace the stored message and wake subscribers.
    pub fn publish(&self, msg: T) {
        self.tx.send_replace(msg);
    }

    /// Open another subscription to this topic.
    pub fn subscribe(&self) -> Topic<T> {
        Topic {
            name: self.name,
            rx: self.tx.subscribe(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::channel;

    #[test]
    fn poll_only_reports_new_messages() {
        let (tx, mut rx) = channel("test", 0u8);
        assert_eq!(rx.poll(), None);

        tx.publish(1);
        tx.publish(2);
        assert_eq!(rx.poll(), Some(2));
        assert_eq!(rx.poll(), None);
        assert_eq!(rx.latest(), 2);
    }

    #[test]
    fn closed_topic_polls_empty() {
        let (tx, mut rx) = channel("test", 0u8);
        drop(tx);
        assert_eq!(rx.poll(), None);
    }

    #[test]
    fn marked_message_is_not_reported_again() {
        let (tx, mut rx) = channel("test", 0u8);
        tx.publish(3);
        rx.mark_seen();
        assert_eq!(rx.poll(), None);
        assert_eq!(rx.latest(), 3);

        tx.publish(4);
        assert_eq!(rx.poll(), Some(4));
    }

    #[test]
    fn subscriber_created_later_sees_stored_message() {
        let (tx, _rx) = channel("test", 0u8);
        tx.publish(7);

        let late = tx.subscribe();
        assert_eq!(late.latest(), 7);
    }
}
