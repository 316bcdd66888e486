//! Sync triggers
//!
//! Maps host lifecycle transitions and auth events onto the sync entry
//! points. Every dispatch runs on its own task and goes through the same
//! guards as a direct call, so a burst of triggers collapses into at most
//! one running pass per pipeline.

use crate::auto_sync::AutoSyncService;
use crate::coordinator::LibrarySyncCoordinator;
use crate::error::Result;
use crate::progress::SyncOutcome;
use bridge_traits::lifecycle::{LifecycleEvent, LifecycleObserver};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why a sync was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    FocusRegained,
    VisibilityRegained,
    TokenRefreshed,
    AuthStateChanged { signed_in: bool },
    Timer,
    Manual,
}

impl SyncTrigger {
    pub fn from_lifecycle(event: LifecycleEvent) -> Option<Self> {
        match event {
            LifecycleEvent::FocusGained => Some(SyncTrigger::FocusRegained),
            LifecycleEvent::Visible => Some(SyncTrigger::VisibilityRegained),
            LifecycleEvent::FocusLost | LifecycleEvent::Hidden => None,
        }
    }

    pub fn from_event(event: &CoreEvent) -> Option<Self> {
        match event {
            CoreEvent::Auth(AuthEvent::TokenRefreshed { .. }) => Some(SyncTrigger::TokenRefreshed),
            CoreEvent::Auth(AuthEvent::SignedIn { .. }) => {
                Some(SyncTrigger::AuthStateChanged { signed_in: true })
            }
            CoreEvent::Auth(AuthEvent::SignedOut { .. }) => {
                Some(SyncTrigger::AuthStateChanged { signed_in: false })
            }
            _ => None,
        }
    }
}

/// Routes triggers to the coordinator and the auto-sync service.
#[derive(Clone)]
pub struct SyncDispatcher {
    coordinator: Arc<LibrarySyncCoordinator>,
    auto_sync: AutoSyncService,
}

impl SyncDispatcher {
    pub fn new(coordinator: Arc<LibrarySyncCoordinator>, auto_sync: AutoSyncService) -> Self {
        Self {
            coordinator,
            auto_sync,
        }
    }

    pub async fn dispatch(&self, trigger: SyncTrigger) -> SyncOutcome {
        debug!(?trigger, "Dispatching sync trigger");
        match trigger {
            SyncTrigger::AuthStateChanged { signed_in: true } => {
                self.coordinator.sync_after_auth().await
            }
            SyncTrigger::AuthStateChanged { signed_in: false } => {
                self.auto_sync.stop().await;
                SyncOutcome::default()
            }
            SyncTrigger::FocusRegained
            | SyncTrigger::VisibilityRegained
            | SyncTrigger::TokenRefreshed => self.coordinator.quick_sync().await,
            SyncTrigger::Manual => self.coordinator.force_sync().await,
            SyncTrigger::Timer => self.auto_sync.run_pass().await,
        }
    }
}

/// Owns the listener tasks feeding a [`SyncDispatcher`].
pub struct SyncTriggerHub {
    dispatcher: SyncDispatcher,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncTriggerHub {
    pub fn new(dispatcher: SyncDispatcher) -> Self {
        Self {
            dispatcher,
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn dispatcher(&self) -> &SyncDispatcher {
        &self.dispatcher
    }

    /// Dispatch on a background task.
    pub fn fire(&self, trigger: SyncTrigger) -> JoinHandle<SyncOutcome> {
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move { dispatcher.dispatch(trigger).await })
    }

    /// Listen for auth events on the bus.
    pub async fn listen_events(&self, event_bus: &EventBus) {
        let mut stream = event_bus
            .stream()
            .filter(|event| SyncTrigger::from_event(event).is_some());
        let shutdown = self.shutdown.clone();
        let dispatcher = self.dispatcher.clone();

        let handle = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = stream.recv() => event,
                };
                match event {
                    Ok(event) => {
                        if let Some(trigger) = SyncTrigger::from_event(&event) {
                            spawn_dispatch(&dispatcher, trigger);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Trigger listener lagged behind the event bus");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Auth trigger listener stopped");
        });

        self.tasks.lock().await.push(handle);
    }

    /// Listen for focus and visibility regains from the host.
    pub async fn listen_lifecycle(&self, observer: &dyn LifecycleObserver) -> Result<()> {
        let mut stream = observer.subscribe_changes().await?;
        let shutdown = self.shutdown.clone();
        let dispatcher = self.dispatcher.clone();

        let handle = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = stream.next() => event,
                };
                let Some(event) = event else { break };
                if let Some(trigger) = SyncTrigger::from_lifecycle(event) {
                    spawn_dispatch(&dispatcher, trigger);
                }
            }
            debug!("Lifecycle trigger listener stopped");
        });

        self.tasks.lock().await.push(handle);
        info!("Lifecycle sync triggers enabled");
        Ok(())
    }

    /// Stop all listeners and wait for them to exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Trigger listener task failed");
            }
        }
    }
}

fn spawn_dispatch(dispatcher: &SyncDispatcher, trigger: SyncTrigger) {
    let dispatcher = dispatcher.clone();
    tokio::spawn(async move {
        let outcome = dispatcher.dispatch(trigger).await;
        if let Some(error) = outcome.error {
            debug!(?trigger, %error, "Triggered sync did not run");
        }
    });
}
