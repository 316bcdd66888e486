//! Application Lifecycle Events
//!
//! Lets the host report window focus and visibility transitions so the core
//! can treat "user came back to the app" as a sync trigger.

use async_trait::async_trait;

use crate::error::Result;

/// Lifecycle transition reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Application window gained input focus
    FocusGained,
    /// Application window lost input focus
    FocusLost,
    /// Application became visible (tab shown, window restored)
    Visible,
    /// Application was hidden (tab switched away, window minimized)
    Hidden,
}

impl LifecycleEvent {
    /// Whether this transition means the user is returning to the app.
    pub fn is_regain(&self) -> bool {
        matches!(self, LifecycleEvent::FocusGained | LifecycleEvent::Visible)
    }
}

/// Lifecycle observer trait
///
/// # Platform Support
///
/// - **Desktop**: Window focus/minimize events
/// - **Mobile**: Activity/Scene foreground callbacks
/// - **Web**: Page Visibility API plus window focus
///
/// # Example
///
/// ```ignore
/// use bridge_traits::lifecycle::{LifecycleObserver, LifecycleEvent};
///
/// async fn watch(observer: &dyn LifecycleObserver) -> Result<()> {
///     let mut stream = observer.subscribe_changes().await?;
///
///     while let Some(event) = stream.next().await {
///         if event.is_regain() {
///             request_sync();
///         }
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait LifecycleObserver: Send + Sync {
    /// Subscribe to lifecycle transitions
    async fn subscribe_changes(&self) -> Result<Box<dyn LifecycleChangeStream>>;
}

/// Stream of lifecycle transitions
#[async_trait]
pub trait LifecycleChangeStream: Send {
    /// Get the next lifecycle event
    ///
    /// Returns `None` when the stream is closed.
    async fn next(&mut self) -> Option<LifecycleEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regain_events() {
        assert!(LifecycleEvent::FocusGained.is_regain());
        assert!(LifecycleEvent::Visible.is_regain());
        assert!(!LifecycleEvent::FocusLost.is_regain());
        assert!(!LifecycleEvent::Hidden.is_regain());
    }
}
