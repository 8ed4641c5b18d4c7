use std::collections::VecDeque;

use futures_util::stream;
use svcbus_frame::Message;
use tokio::sync::mpsc;

use crate::traits::MessageStream;

/// Fan-out of inbound messages to every receive subscriber.
///
/// Messages that arrive while nobody is subscribed are held until the next
/// subscriber appears.
#[derive(Debug, Default)]
pub(crate) struct Inbound {
    subscribers: Vec<mpsc::UnboundedSender<Message>>,
    backlog: VecDeque<Message>,
    closed: bool,
}

impl Inbound {
    pub(crate) fn subscribe(&mut self) -> MessageStream {
        let (tx, mut rx) = mpsc::unbounded_channel();
        for message in self.backlog.drain(..) {
            let _ = tx.send(message);
        }
        if !self.closed {
            self.subscribers.push(tx);
        }
        Box::pin(stream::poll_fn(move |cx| rx.poll_recv(cx)))
    }

    pub(crate) fn dispatch(&mut self, message: Message) {
        if self.closed {
            return;
        }
        self.subscribers
            .retain(|subscriber| subscriber.send(message.clone()).is_ok());
        if self.subscribers.is_empty() {
            self.backlog.push_back(message);
        }
    }

    /// Complete every subscriber stream; later subscribers only see the backlog.
    pub(crate) fn close(&mut self) {
        self.closed = true;
        self.subscribers.clear();
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn every_subscriber_sees_each_message() {
        let mut inbound = Inbound::default();
        let mut a = inbound.subscribe();
        let mut b = inbound.subscribe();

        inbound.dispatch(Message::next("svc.e", json!(1)));

        assert_eq!(a.next().await.unwrap().data, Some(json!(1)));
        assert_eq!(b.next().await.unwrap().data, Some(json!(1)));
    }

    #[tokio::test]
    async fn backlog_is_delivered_to_first_subscriber() {
        let mut inbound = Inbound::default();
        inbound.dispatch(Message::next("svc.e", json!("early")));
        inbound.dispatch(Message::complete("svc.e"));

        let mut stream = inbound.subscribe();
        assert_eq!(stream.next().await.unwrap().data, Some(json!("early")));
        assert_eq!(stream.next().await.unwrap().name, "svc.e");
    }

    #[tokio::test]
    async fn close_completes_streams() {
        let mut inbound = Inbound::default();
        let mut stream = inbound.subscribe();
        inbound.close();
        assert!(stream.next().await.is_none());

        let mut late = inbound.subscribe();
        assert!(late.next().await.is_none());
        assert_eq!(inbound.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn dropped_subscribers_are_pruned() {
        let mut inbound = Inbound::default();
        let dropped = inbound.subscribe();
        let mut kept = inbound.subscribe();
        drop(dropped);

        inbound.dispatch(Message::next("svc.e", json!(2)));
        assert_eq!(inbound.subscriber_count(), 1);
        assert_eq!(kept.next().await.unwrap().data, Some(json!(2)));
    }
}
