//! Bounded producer/consumer handoff for streaming fetches.

use tokio::sync::mpsc;

use super::error::Result;
use super::session::{MailSession, RawMessage};

/// Capacity of the channel between the fetch producer and its consumer.
pub const DEFAULT_FETCH_BUFFER: usize = 10;

/// Everything a fetch produced.
#[derive(Debug)]
pub struct FetchOutcome<T> {
    /// One consumer result per delivered message, in delivery order.
    pub items: Vec<T>,
    /// Completion signal of the producer.
    pub completion: Result<()>,
}

/// Fetches `ids` and feeds every message to `consume`.
///
/// The session's fetch runs as the producer, filling a channel of
/// `capacity` messages, while `consume` drains it on the same task. The
/// consumer has no way to stop early: every message is consumed, and the
/// producer's completion is awaited exactly once after the channel closes.
pub async fn fetch_and_drain<S, T, F>(
    session: &mut S,
    ids: &[u32],
    capacity: usize,
    mut consume: F,
) -> FetchOutcome<T>
where
    S: MailSession + ?Sized,
    F: FnMut(RawMessage) -> T,
{
    let (sink, mut messages) = mpsc::channel(capacity.max(1));

    // `sink` moves into the producer, so the channel closes when it returns.
    let producer = session.fetch(ids, sink);
    let consumer = async {
        let mut items = Vec::with_capacity(ids.len());
        while let Some(raw) = messages.recv().await {
            items.push(consume(raw));
        }
        items
    };

    let (completion, items) = tokio::join!(producer, consumer);

    FetchOutcome { items, completion }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::EmailError;
    use async_trait::async_trait;

    struct ScriptedSession {
        bodies: Vec<Vec<u8>>,
        fail_after_send: bool,
        fetch_calls: usize,
    }

    impl ScriptedSession {
        fn new(count: usize) -> Self {
            Self {
                bodies: (0..count)
                    .map(|i| format!("message {}", i).into_bytes())
                    .collect(),
                fail_after_send: false,
                fetch_calls: 0,
            }
        }
    }

    #[async_trait]
    impl MailSession for ScriptedSession {
        async fn select(&mut self, _directory: &str) -> Result<()> {
            Ok(())
        }

        async fn search_unseen(&mut self) -> Result<Vec<u32>> {
            Ok((1..=self.bodies.len() as u32).collect())
        }

        async fn fetch(&mut self, ids: &[u32], sink: mpsc::Sender<RawMessage>) -> Result<()> {
            self.fetch_calls += 1;
            for &id in ids {
                let raw = RawMessage {
                    id,
                    uid: Some(id + 100),
                    body: self.bodies[(id - 1) as usize].clone(),
                };
                if sink.send(raw).await.is_err() {
                    return Err(EmailError::FetchFailed("consumer gone".to_string()));
                }
            }
            if self.fail_after_send {
                return Err(EmailError::FetchFailed("connection dropped".to_string()));
            }
            Ok(())
        }

        async fn noop(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_drains_more_messages_than_capacity() {
        let mut session = ScriptedSession::new(5);
        let ids = session.search_unseen().await.unwrap();

        let outcome = fetch_and_drain(&mut session, &ids, 1, |raw| raw.id).await;

        assert_eq!(outcome.items, vec![1, 2, 3, 4, 5]);
        assert!(outcome.completion.is_ok());
        assert_eq!(session.fetch_calls, 1);
    }

    #[tokio::test]
    async fn test_consumer_failures_do_not_stop_draining() {
        let mut session = ScriptedSession::new(4);
        let ids = session.search_unseen().await.unwrap();

        let outcome = fetch_and_drain(&mut session, &ids, 2, |raw| {
            if raw.id == 2 {
                Err(EmailError::ParseError("bad".to_string()))
            } else {
                Ok(raw.id)
            }
        })
        .await;

        assert_eq!(outcome.items.len(), 4);
        assert!(outcome.items[1].is_err());
        assert!(outcome.completion.is_ok());
    }

    #[tokio::test]
    async fn test_completion_failure_reported_after_items() {
        let mut session = ScriptedSession::new(3);
        session.fail_after_send = true;

        let outcome = fetch_and_drain(&mut session, &[1, 2, 3], DEFAULT_FETCH_BUFFER, |raw| {
            raw.uid
        })
        .await;

        assert_eq!(outcome.items, vec![Some(101), Some(102), Some(103)]);
        assert!(matches!(
            outcome.completion,
            Err(EmailError::FetchFailed(_))
        ));
    }
}
