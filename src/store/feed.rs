//! In-process realtime channel backed by a `tokio::sync::broadcast` channel.
//!
//! [`ChangeFeed`] fans annotation changes out to every open [`Subscription`].
//! Subscriptions are drained without blocking from the single-threaded event
//! loop, so no async runtime is required.

use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::models::{Annotation, AnnotationId, DocumentId};

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// A change to one annotation row.
///
/// Insert and update payloads carry the bare row without the joined author,
/// so they are only a cue to re-list. A delete carries just the id, which is
/// enough to drop the row locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeEvent {
    Insert(Annotation),
    Update(Annotation),
    Delete { id: AnnotationId },
}

#[derive(Debug, Clone)]
struct Envelope {
    document_id: DocumentId,
    event: RealtimeEvent,
}

/// Fan-out hub for annotation changes across all documents.
///
/// Cloning yields another handle onto the same channel, so several sessions
/// can share one feed.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<Envelope>,
}

impl ChangeFeed {
    /// Create a feed with a specific channel capacity.
    ///
    /// When the buffer is full the oldest unread events are dropped and the
    /// affected subscriptions report that they lagged.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a change on the document's channel.
    ///
    /// Dropped silently when nobody is subscribed.
    pub fn publish(&self, document_id: DocumentId, event: RealtimeEvent) {
        tracing::debug!(%document_id, ?event, "publishing annotation change");
        let _ = self.sender.send(Envelope { document_id, event });
    }

    /// Open a channel that only yields changes for `document_id`.
    pub fn subscribe(&self, document_id: DocumentId) -> Subscription {
        Subscription {
            document_id,
            receiver: Some(self.sender.subscribe()),
            lagged: false,
        }
    }

    /// Number of subscriptions currently open.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// An open realtime channel for one document.
///
/// Must be released with [`Subscription::close`] when the viewer goes away;
/// dropping it has the same effect.
#[derive(Debug)]
pub struct Subscription {
    document_id: DocumentId,
    receiver: Option<broadcast::Receiver<Envelope>>,
    lagged: bool,
}

impl Subscription {
    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    pub fn is_open(&self) -> bool {
        self.receiver.is_some()
    }

    /// Drains every pending change for this document without blocking.
    pub fn poll(&mut self) -> Vec<RealtimeEvent> {
        let mut events = Vec::new();
        let Some(receiver) = self.receiver.as_mut() else {
            return events;
        };

        loop {
            match receiver.try_recv() {
                Ok(envelope) if envelope.document_id == self.document_id => {
                    events.push(envelope.event);
                }
                Ok(_) => {}
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        document_id = %self.document_id,
                        skipped,
                        "realtime subscription lagged"
                    );
                    self.lagged = true;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }

        events
    }

    /// Returns whether events were lost since the last call, clearing the flag.
    ///
    /// A lagged subscriber cannot trust its local state and must re-list.
    pub fn take_lagged(&mut self) -> bool {
        std::mem::take(&mut self.lagged)
    }

    /// Releases the channel.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.receiver.take().is_some() {
            tracing::debug!(document_id = %self.document_id, "closed realtime subscription");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    use crate::models::UserId;

    fn row(id: i64, document: i64) -> Annotation {
        Annotation::highlight(
            AnnotationId::new(id),
            DocumentId::new(document),
            UserId::new(1),
            0..3,
            "The",
            OffsetDateTime::UNIX_EPOCH,
        )
    }

    #[test]
    fn subscription_only_sees_its_document() {
        let feed = ChangeFeed::default();
        let mut sub = feed.subscribe(DocumentId::new(1));

        feed.publish(DocumentId::new(2), RealtimeEvent::Insert(row(1, 2)));
        feed.publish(
            DocumentId::new(1),
            RealtimeEvent::Delete {
                id: AnnotationId::new(9),
            },
        );

        assert_eq!(
            sub.poll(),
            vec![RealtimeEvent::Delete {
                id: AnnotationId::new(9)
            }]
        );
        assert!(sub.poll().is_empty());
    }

    #[test]
    fn close_releases_the_receiver() {
        let feed = ChangeFeed::default();
        let sub = feed.subscribe(DocumentId::new(1));
        assert_eq!(feed.receiver_count(), 1);

        sub.close();
        assert_eq!(feed.receiver_count(), 0);
    }

    #[test]
    fn drop_releases_the_receiver() {
        let feed = ChangeFeed::default();
        {
            let _sub = feed.subscribe(DocumentId::new(1));
            assert_eq!(feed.receiver_count(), 1);
        }
        assert_eq!(feed.receiver_count(), 0);
    }

    #[test]
    fn overflow_is_reported_as_lag() {
        let feed = ChangeFeed::new(2);
        let mut sub = feed.subscribe(DocumentId::new(1));

        for id in 0..5 {
            feed.publish(DocumentId::new(1), RealtimeEvent::Insert(row(id, 1)));
        }

        let events = sub.poll();
        assert_eq!(events.len(), 2);
        assert!(sub.take_lagged());
        assert!(!sub.take_lagged());
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let feed = ChangeFeed::default();
        feed.publish(DocumentId::new(1), RealtimeEvent::Insert(row(1, 1)));
    }

    #[test]
    fn cloned_feeds_share_one_channel() {
        let feed = ChangeFeed::default();
        let other = feed.clone();
        let mut sub = feed.subscribe(DocumentId::new(1));

        other.publish(DocumentId::new(1), RealtimeEvent::Insert(row(1, 1)));

        assert_eq!(sub.poll().len(), 1);
    }
}
