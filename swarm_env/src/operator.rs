//! Operator event transport.
//!
//! Operator input (pause, goal change, trust acknowledgment) arrives
//! asynchronously but is applied by the step loop only at step boundaries.
//! The link is generic over the event type so the engine owns its own
//! event vocabulary.

use async_trait::async_trait;
use crate::error::EnvError;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::Mutex;

/// Abstraction for delivering operator events to the step loop.
///
/// # Event Flow
///
/// ```text
/// Operator                 Link                     Step loop
///   |                        |                          |
///   |-- send(event) -------->|                          |
///   |                        |   (queued until tick)    |
///   |                        |<------ try_recv() -------|  (step boundary)
/// ```
#[async_trait]
pub trait OperatorLink<E: Send + 'static>: Send + Sync {
    /// Returns the next queued event without waiting.
    ///
    /// # Returns
    /// * `Ok(Some(event))` - An event was queued
    /// * `Ok(None)` - Nothing pending this tick
    /// * `Err(EnvError::LinkClosed)` - All senders dropped and the queue is empty
    fn try_recv(&self) -> Result<Option<E>, EnvError>;

    /// Waits for the next event.
    ///
    /// Returns `None` once every sender has been dropped.
    async fn recv(&self) -> Option<E>;
}

/// Sending half held by the operator (UI, script, or test).
#[derive(Debug)]
pub struct OperatorHandle<E> {
    tx: mpsc::Sender<E>,
}

impl<E> Clone for OperatorHandle<E> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<E: Send + 'static> OperatorHandle<E> {
    /// Queues an event without waiting.
    pub fn send(&self, event: E) -> Result<(), EnvError> {
        self.tx.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => EnvError::LinkFull("operator queue at capacity".to_string()),
            TrySendError::Closed(_) => EnvError::LinkClosed,
        })
    }

    /// Queues an event, waiting for capacity.
    pub async fn send_async(&self, event: E) -> Result<(), EnvError> {
        self.tx.send(event).await.map_err(|_| EnvError::LinkClosed)
    }
}

/// Channel-backed operator link.
pub struct ChannelOperatorLink<E> {
    rx: Mutex<mpsc::Receiver<E>>,
}

/// Creates a connected operator handle and link pair.
pub fn operator_channel<E: Send + 'static>(capacity: usize) -> (OperatorHandle<E>, ChannelOperatorLink<E>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        OperatorHandle { tx },
        ChannelOperatorLink { rx: Mutex::new(rx) },
    )
}

#[async_trait]
impl<E: Send + 'static> OperatorLink<E> for ChannelOperatorLink<E> {
    fn try_recv(&self) -> Result<Option<E>, EnvError> {
        // A receiver held by a pending `recv` means nothing is ready for this tick
        let Ok(mut rx) = self.rx.try_lock() else {
            return Ok(None);
        };
        match rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(EnvError::LinkClosed),
        }
    }

    async fn recv(&self) -> Option<E> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_arrive_in_order() {
        let (handle, link) = operator_channel::<u32>(8);
        handle.send(1).unwrap();
        handle.send(2).unwrap();

        assert_eq!(link.try_recv().unwrap(), Some(1));
        assert_eq!(link.try_recv().unwrap(), Some(2));
        assert_eq!(link.try_recv().unwrap(), None);
    }

    #[test]
    fn test_closed_link_reports_closed() {
        let (handle, link) = operator_channel::<u32>(1);
        drop(handle);
        assert!(matches!(link.try_recv(), Err(EnvError::LinkClosed)));
    }

    #[test]
    fn test_full_queue_rejects() {
        let (handle, _link) = operator_channel::<u32>(1);
        handle.send(1).unwrap();
        assert!(matches!(handle.send(2), Err(EnvError::LinkFull(_))));
    }

    #[tokio::test]
    async fn test_async_recv() {
        let (handle, link) = operator_channel::<&'static str>(4);
        handle.send_async("pause").await.unwrap();
        assert_eq!(link.recv().await, Some("pause"));
        drop(handle);
        assert_eq!(link.recv().await, None);
    }

    #[tokio::test]
    async fn test_recv_wakes_on_send_from_another_task() {
        let (handle, link) = operator_channel::<u32>(4);
        let sender = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            handle.send_async(7).await.unwrap();
            handle.send_async(8).await.unwrap();
        });

        assert_eq!(link.recv().await, Some(7));
        assert_eq!(link.recv().await, Some(8));
        sender.await.unwrap();
        // Handle dropped with the task
        assert_eq!(link.recv().await, None);
        assert!(matches!(link.try_recv(), Err(EnvError::LinkClosed)));
    }

    #[tokio::test]
    async fn test_try_recv_while_recv_pending_is_empty() {
        let (handle, link) = operator_channel::<u32>(4);
        let link = std::sync::Arc::new(link);
        let waiter = {
            let link = link.clone();
            tokio::spawn(async move { link.recv().await })
        };
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(link.try_recv().unwrap(), None);
        handle.send(3).unwrap();
        assert_eq!(waiter.await.unwrap(), Some(3));
    }
}
