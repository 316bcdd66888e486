//! # Event Bus System
//!
//! Provides the single typed publish/subscribe channel of the sync core, built on
//! `tokio::sync::broadcast`. Every progress update, authentication transition and
//! library change flows through one [`EventBus`]; hosts subscribe once and render
//! whatever they need.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchies for auth, sync and library
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐    emit     ┌───────────┐
//! │ Token Manager├────────────>│           │
//! └──────────────┘             │           │
//!                              │ EventBus  │
//! ┌──────────────┐    emit     │ (broadcast│    subscribe    ┌────────────┐
//! │ Library Sync ├────────────>│  channel) ├────────────────>│ UI / host  │
//! └──────────────┘             │           │                 └────────────┘
//!                              │           │
//! ┌──────────────┐    emit     │           │    subscribe    ┌────────────┐
//! │  Auto-Sync   ├────────────>│           ├────────────────>│  Triggers  │
//! └──────────────┘             └───────────┘                 └────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Publishing Events
//!
//! ```rust
//! use core_runtime::events::{EventBus, CoreEvent, SyncEvent, SyncPipeline, SyncProgress};
//!
//! let event_bus = EventBus::new(100);
//! let progress = SyncProgress::syncing(SyncPipeline::Library, "Fetching songs from Spotify...")
//!     .with_progress(10);
//!
//! event_bus.emit(CoreEvent::Sync(SyncEvent::Status(progress))).ok();
//! ```
//!
//! ### Subscribing to Events
//!
//! ```rust
//! use core_runtime::events::{EventBus, CoreEvent};
//! use tokio::sync::broadcast::error::RecvError;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! tokio::spawn(async move {
//!     loop {
//!         match stream.recv().await {
//!             Ok(event) => println!("Received: {:?}", event),
//!             Err(RecvError::Lagged(n)) => {
//!                 eprintln!("Missed {} events", n);
//!             }
//!             Err(RecvError::Closed) => break,
//!         }
//!     }
//! });
//! # }
//! ```
//!
//! ## Event Types
//!
//! ### Authentication Events
//! - `SigningIn`, `SignedIn`, `SignedOut`
//! - `TokenRefreshing`, `TokenRefreshed`
//! - `AuthError`
//!
//! ### Sync Events
//! - `Status`: a [`SyncProgress`] snapshot (idle, waiting, syncing, completed, error)
//! - `AutoSyncStarted` / `AutoSyncStopped`: periodic sync enabled or disabled
//!
//! ### Library Events
//! - `LikedSongsUpdated`: the liked-songs collection changed
//! - `LikeStateChanged`: an optimistic like/unlike moved between pending, confirmed and failed
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Publishing with no subscribers returns an error that publishers ignore with `.ok()`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Authentication-related events
    Auth(AuthEvent),
    /// Sync-related events
    Sync(SyncEvent),
    /// Library-related events
    Library(LibraryEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Library(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::AuthError { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::Status(progress)) => match progress.status {
                SyncStatus::Error => EventSeverity::Error,
                SyncStatus::Completed => EventSeverity::Info,
                _ => EventSeverity::Debug,
            },
            CoreEvent::Sync(SyncEvent::AutoSyncStopped { reason: Some(_) }) => {
                EventSeverity::Warning
            }
            CoreEvent::Library(LibraryEvent::LikeStateChanged {
                state: LikeStatus::Failed,
                ..
            }) => EventSeverity::Warning,
            CoreEvent::Auth(AuthEvent::SignedIn { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Authentication Events
// ============================================================================

/// Events related to the Spotify account connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// Authorization flow started (user sent to the consent page).
    SigningIn {
        /// The provider being authenticated with (e.g., "spotify").
        provider: String,
    },
    /// Account connected and tokens stored.
    SignedIn {
        /// The provider used for authentication.
        provider: String,
    },
    /// Tokens removed (explicit sign-out or failed refresh).
    SignedOut {
        /// The provider that was disconnected.
        provider: String,
    },
    /// Access token is being refreshed.
    TokenRefreshing {
        /// The provider whose token is being refreshed.
        provider: String,
    },
    /// Token refresh completed successfully.
    TokenRefreshed {
        /// The provider whose token was refreshed.
        provider: String,
        /// When the new token expires (Unix epoch milliseconds).
        expires_at_ms: i64,
    },
    /// Authentication error occurred.
    AuthError {
        /// Human-readable error message.
        message: String,
        /// Whether the error is recoverable (e.g., retry possible).
        recoverable: bool,
    },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::SigningIn { .. } => "Authentication in progress",
            AuthEvent::SignedIn { .. } => "Account connected",
            AuthEvent::SignedOut { .. } => "Account disconnected",
            AuthEvent::TokenRefreshing { .. } => "Refreshing access token",
            AuthEvent::TokenRefreshed { .. } => "Token refreshed successfully",
            AuthEvent::AuthError { .. } => "Authentication error",
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Which sync pipeline produced a progress update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPipeline {
    /// Full liked-songs library sync (manual, post-auth, focus triggers)
    Library,
    /// Periodic recent-window auto-sync
    AutoSync,
}

impl SyncPipeline {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPipeline::Library => "library",
            SyncPipeline::AutoSync => "auto_sync",
        }
    }
}

impl fmt::Display for SyncPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sync state machine position.
///
/// `Idle → Waiting → Syncing → Completed | Error → Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Waiting,
    Syncing,
    Completed,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Waiting => "waiting",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Completed => "completed",
            SyncStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Completed | SyncStatus::Error)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transient status snapshot broadcast during a sync pass.
///
/// Never persisted. Percentages are monotonic within one pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncProgress {
    pub pipeline: SyncPipeline,
    pub status: SyncStatus,
    /// Human-readable message suitable for a toast or status line.
    pub message: String,
    /// Progress percentage (0-100).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tracks: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_tracks: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncProgress {
    pub fn new(pipeline: SyncPipeline, status: SyncStatus, message: impl Into<String>) -> Self {
        Self {
            pipeline,
            status,
            message: message.into(),
            progress: None,
            total_tracks: None,
            synced_tracks: None,
            error: None,
        }
    }

    pub fn idle(pipeline: SyncPipeline, message: impl Into<String>) -> Self {
        Self::new(pipeline, SyncStatus::Idle, message)
    }

    pub fn waiting(pipeline: SyncPipeline, message: impl Into<String>) -> Self {
        Self::new(pipeline, SyncStatus::Waiting, message)
    }

    pub fn syncing(pipeline: SyncPipeline, message: impl Into<String>) -> Self {
        Self::new(pipeline, SyncStatus::Syncing, message)
    }

    pub fn completed(pipeline: SyncPipeline, message: impl Into<String>) -> Self {
        Self::new(pipeline, SyncStatus::Completed, message).with_progress(100)
    }

    pub fn failed(
        pipeline: SyncPipeline,
        message: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let mut progress = Self::new(pipeline, SyncStatus::Error, message);
        progress.error = Some(error.into());
        progress
    }

    /// Set the percentage, clamped to 100.
    pub fn with_progress(mut self, percent: u8) -> Self {
        self.progress = Some(percent.min(100));
        self
    }

    pub fn with_counts(mut self, synced: u64, total: u64) -> Self {
        self.synced_tracks = Some(synced);
        self.total_tracks = Some(total);
        self
    }
}

/// Events related to liked-songs synchronization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// State machine transition or progress update.
    Status(SyncProgress),
    /// Periodic auto-sync was enabled.
    AutoSyncStarted {
        /// Interval between passes in seconds.
        interval_secs: u64,
        /// Human description ("instant sync", "every 5 minutes").
        description: String,
    },
    /// Periodic auto-sync was disabled.
    AutoSyncStopped {
        /// Why it stopped when not requested by the user.
        reason: Option<String>,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Status(progress) => match progress.status {
                SyncStatus::Idle => "Sync idle",
                SyncStatus::Waiting => "Sync waiting to start",
                SyncStatus::Syncing => "Sync in progress",
                SyncStatus::Completed => "Sync completed successfully",
                SyncStatus::Error => "Sync failed",
            },
            SyncEvent::AutoSyncStarted { .. } => "Auto-sync enabled",
            SyncEvent::AutoSyncStopped { .. } => "Auto-sync disabled",
        }
    }

    /// The progress payload, if this is a status update.
    pub fn progress(&self) -> Option<&SyncProgress> {
        match self {
            SyncEvent::Status(progress) => Some(progress),
            _ => None,
        }
    }
}

// ============================================================================
// Library Events
// ============================================================================

/// Optimistic like/unlike state carried by [`LibraryEvent::LikeStateChanged`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LikeStatus {
    Pending,
    Confirmed,
    Failed,
}

/// Events related to the liked-songs collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    /// Liked songs were written by a sync pass or a user action.
    LikedSongsUpdated {
        /// Source tag of the writer ("spotify", "mavrixfy").
        source: String,
        /// Number of documents written.
        count: u64,
    },
    /// A song's optimistic like state changed.
    LikeStateChanged {
        song_id: String,
        state: LikeStatus,
        /// Liked flag the UI should render right now.
        liked: bool,
    },
}

impl LibraryEvent {
    fn description(&self) -> &str {
        match self {
            LibraryEvent::LikedSongsUpdated { .. } => "Liked songs updated",
            LibraryEvent::LikeStateChanged { .. } => "Like state changed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned for each subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
///
/// Dropping a receiver unsubscribes it.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Each subscriber buffers up to `capacity` events before it starts
    /// receiving `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to every live subscriber.
    ///
    /// Fails when nobody is listening. Emitters in this workspace ignore
    /// that case with `.ok()` or `let _ =`.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Each call creates an independent receiver that will receive all future events.
    /// Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Creates a filtered stream over future events.
    pub fn stream(&self) -> EventStream {
        EventStream::new(self.subscribe())
    }

    /// Number of live receivers, including [`EventStream`]s.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with additional filtering capabilities.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{EventBus, CoreEvent};
///
/// let event_bus = EventBus::new(100);
/// let sync_only = event_bus
///     .stream()
///     .filter(|event| matches!(event, CoreEvent::Sync(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter function to this stream.
    ///
    /// Only events that match the filter will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
