use futures::{Stream, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};

const CHANNEL_CAPACITY: usize = 64;

/// A live feed of platform events. Dropping it tears the feed down.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::Receiver<T>,
    pump: JoinHandle<()>,
}

impl<T: Send + 'static> Subscription<T> {
    /// Pumps `stream` into the subscription until either side goes away.
    pub fn forward<S>(stream: S) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let pump = tokio::spawn(async move {
            let mut stream = Box::pin(stream);
            while let Some(item) = stream.next().await {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
        Self { rx, pump }
    }

    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_forward_delivers_in_order() {
        let mut sub = Subscription::forward(futures::stream::iter(vec![1, 2, 3]));
        assert_eq!(sub.recv().await, Some(1));
        assert_eq!(sub.recv().await, Some(2));
        assert_eq!(sub.recv().await, Some(3));
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn test_drop_stops_the_pump() {
        let sub = Subscription::forward(futures::stream::pending::<u8>());
        let handle = sub.pump.abort_handle();
        drop(sub);
        for _ in 0..16 {
            if handle.is_finished() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(handle.is_finished());
    }
}
