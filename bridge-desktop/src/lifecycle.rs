//! Channel-backed lifecycle observer
//!
//! Desktop shells (Tauri, winit, webview hosts) forward window focus and
//! visibility notifications through [`ChannelLifecycleObserver::notify`].

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    lifecycle::{LifecycleChangeStream, LifecycleEvent, LifecycleObserver},
};
use tokio::sync::broadcast;
use tracing::{debug, warn};

const DEFAULT_CAPACITY: usize = 32;

/// Lifecycle observer fed by the host window loop.
#[derive(Clone)]
pub struct ChannelLifecycleObserver {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl ChannelLifecycleObserver {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_CAPACITY);
        Self { sender }
    }

    /// Publish a lifecycle transition.
    ///
    /// Returns the number of subscribers that received it.
    pub fn notify(&self, event: LifecycleEvent) -> usize {
        debug!(?event, "Lifecycle transition");
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for ChannelLifecycleObserver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LifecycleObserver for ChannelLifecycleObserver {
    async fn subscribe_changes(&self) -> Result<Box<dyn LifecycleChangeStream>> {
        Ok(Box::new(ChannelLifecycleStream {
            receiver: self.sender.subscribe(),
        }))
    }
}

struct ChannelLifecycleStream {
    receiver: broadcast::Receiver<LifecycleEvent>,
}

#[async_trait]
impl LifecycleChangeStream for ChannelLifecycleStream {
    async fn next(&mut self) -> Option<LifecycleEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Lifecycle stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notify_reaches_subscribers() {
        let observer = ChannelLifecycleObserver::new();
        let mut stream = observer.subscribe_changes().await.unwrap();

        assert_eq!(observer.notify(LifecycleEvent::Hidden), 1);
        observer.notify(LifecycleEvent::Visible);

        assert_eq!(stream.next().await, Some(LifecycleEvent::Hidden));
        assert_eq!(stream.next().await, Some(LifecycleEvent::Visible));
    }

    #[tokio::test]
    async fn test_notify_without_subscribers() {
        let observer = ChannelLifecycleObserver::new();
        assert_eq!(observer.notify(LifecycleEvent::FocusGained), 0);
    }

    #[tokio::test]
    async fn test_stream_closes_when_observer_dropped() {
        let observer = ChannelLifecycleObserver::new();
        let mut stream = observer.subscribe_changes().await.unwrap();
        drop(observer);

        assert_eq!(stream.next().await, None);
    }
}
