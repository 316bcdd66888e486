//! Persisted sync state: the cooldown timestamp and the pass lease.
//!
//! The lease is `{holder, acquired_at, heartbeat_at}` JSON under
//! [`LEASE_KEY`]. A running pass refreshes `heartbeat_at`; a lease whose
//! heartbeat is older than the TTL belongs to a crashed pass and may be
//! taken over. The settings store has no compare-and-swap, so the lease
//! only guards against other invocations sharing the store, not against
//! a racing writer. In-process exclusion is the coordinator's atomic flag.

use crate::error::Result;
use bridge_traits::storage::{get_json, set_json, SettingsStore};
use bridge_traits::time::Clock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Epoch ms of the last successful library sync.
pub const LAST_SYNC_KEY: &str = "spotify_robust_sync_timestamp";

/// Lease held by the running library sync pass.
pub const LEASE_KEY: &str = "spotify_sync_lease";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLease {
    pub holder: String,
    pub acquired_at: i64,
    pub heartbeat_at: i64,
}

impl SyncLease {
    pub fn is_stale(&self, now_ms: i64, ttl: Duration) -> bool {
        now_ms.saturating_sub(self.heartbeat_at) >= ttl.as_millis() as i64
    }
}

/// Reads and writes the sync bookkeeping keys.
#[derive(Clone)]
pub struct SyncStateStore {
    settings: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
}

impl SyncStateStore {
    pub fn new(settings: Arc<dyn SettingsStore>, clock: Arc<dyn Clock>) -> Self {
        Self { settings, clock }
    }

    pub async fn last_sync(&self) -> Result<Option<i64>> {
        Ok(self.settings.get_i64(LAST_SYNC_KEY).await?)
    }

    pub async fn record_success(&self) -> Result<i64> {
        let now = self.clock.unix_timestamp_millis();
        self.settings.set_i64(LAST_SYNC_KEY, now).await?;
        Ok(now)
    }

    pub async fn clear_last_sync(&self) -> Result<()> {
        self.settings.delete(LAST_SYNC_KEY).await?;
        Ok(())
    }

    /// Time left before another quick sync is allowed, `None` when allowed.
    pub async fn cooldown_remaining(&self, cooldown: Duration) -> Result<Option<Duration>> {
        let Some(last) = self.last_sync().await? else {
            return Ok(None);
        };
        let elapsed = self.clock.unix_timestamp_millis().saturating_sub(last).max(0) as u64;
        let cooldown_ms = cooldown.as_millis() as u64;

        Ok((elapsed < cooldown_ms).then(|| Duration::from_millis(cooldown_ms - elapsed)))
    }

    pub async fn lease(&self) -> Result<Option<SyncLease>> {
        match get_json::<SyncLease>(self.settings.as_ref(), LEASE_KEY).await {
            Ok(lease) => Ok(lease),
            Err(e) => {
                // An unreadable lease cannot protect anything.
                warn!(error = %e, "Discarding unreadable sync lease");
                self.settings.delete(LEASE_KEY).await?;
                Ok(None)
            }
        }
    }

    /// Take the lease for `holder` unless another holder has a live one.
    pub async fn try_acquire_lease(&self, holder: &str, ttl: Duration) -> Result<bool> {
        let now = self.clock.unix_timestamp_millis();

        if let Some(current) = self.lease().await? {
            if current.holder != holder && !current.is_stale(now, ttl) {
                debug!(holder = %current.holder, "Sync lease held by another pass");
                return Ok(false);
            }
            if current.holder != holder {
                info!(stale_holder = %current.holder, "Taking over stale sync lease");
            }
        }

        let lease = SyncLease {
            holder: holder.to_string(),
            acquired_at: now,
            heartbeat_at: now,
        };
        set_json(self.settings.as_ref(), LEASE_KEY, &lease).await?;
        Ok(true)
    }

    /// Refresh `heartbeat_at`. Returns false if `holder` no longer owns it.
    pub async fn heartbeat(&self, holder: &str) -> Result<bool> {
        let Some(mut lease) = self.lease().await? else {
            return Ok(false);
        };
        if lease.holder != holder {
            return Ok(false);
        }
        lease.heartbeat_at = self.clock.unix_timestamp_millis();
        set_json(self.settings.as_ref(), LEASE_KEY, &lease).await?;
        Ok(true)
    }

    /// Release the lease if `holder` owns it.
    pub async fn release_lease(&self, holder: &str) -> Result<()> {
        if let Some(lease) = self.lease().await? {
            if lease.holder == holder {
                self.settings.delete(LEASE_KEY).await?;
            }
        }
        Ok(())
    }

    /// Remove a lease whose heartbeat is older than `ttl`. Returns whether
    /// one was removed.
    pub async fn break_stale_lease(&self, ttl: Duration) -> Result<bool> {
        let now = self.clock.unix_timestamp_millis();
        match self.lease().await? {
            Some(lease) if lease.is_stale(now, ttl) => {
                info!(holder = %lease.holder, "Breaking stale sync lease");
                self.settings.delete(LEASE_KEY).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub async fn clear_lease(&self) -> Result<()> {
        self.settings.delete(LEASE_KEY).await?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::MemorySettings;
    use super::*;
    use bridge_traits::time::ManualClock;

    fn state() -> (SyncStateStore, MemorySettings, Arc<ManualClock>) {
        let settings = MemorySettings::default();
        let clock = Arc::new(ManualClock::at_millis(1_000_000));
        let store = SyncStateStore::new(Arc::new(settings.clone()), clock.clone());
        (store, settings, clock)
    }

    #[tokio::test]
    async fn test_cooldown_window() {
        let (state, _, clock) = state();
        let cooldown = Duration::from_secs(30);

        assert_eq!(state.cooldown_remaining(cooldown).await.unwrap(), None);

        state.record_success().await.unwrap();
        clock.advance(Duration::from_secs(5));
        assert_eq!(
            state.cooldown_remaining(cooldown).await.unwrap(),
            Some(Duration::from_secs(25))
        );

        clock.advance(Duration::from_secs(25));
        assert_eq!(state.cooldown_remaining(cooldown).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_last_sync_uses_legacy_key() {
        let (state, settings, _) = state();
        state.record_success().await.unwrap();

        assert_eq!(
            settings.data.lock().unwrap().get("spotify_robust_sync_timestamp"),
            Some(&"1000000".to_string())
        );

        state.clear_last_sync().await.unwrap();
        assert_eq!(state.last_sync().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_live_lease_excludes_other_holder() {
        let (state, _, clock) = state();
        let ttl = Duration::from_secs(300);

        assert!(state.try_acquire_lease("a", ttl).await.unwrap());
        clock.advance(Duration::from_secs(60));
        assert!(!state.try_acquire_lease("b", ttl).await.unwrap());

        assert!(state.heartbeat("a").await.unwrap());
        clock.advance(Duration::from_secs(299));
        assert!(!state.try_acquire_lease("b", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_stale_lease_is_taken_over() {
        let (state, _, clock) = state();
        let ttl = Duration::from_secs(300);

        state.try_acquire_lease("crashed", ttl).await.unwrap();
        clock.advance(ttl);

        assert!(state.try_acquire_lease("b", ttl).await.unwrap());
        assert_eq!(state.lease().await.unwrap().unwrap().holder, "b");
        assert!(!state.heartbeat("crashed").await.unwrap());
    }

    #[tokio::test]
    async fn test_break_stale_lease_only_when_stale() {
        let (state, _, clock) = state();
        let ttl = Duration::from_secs(300);
        state.try_acquire_lease("a", ttl).await.unwrap();

        assert!(!state.break_stale_lease(ttl).await.unwrap());
        clock.advance(Duration::from_secs(301));
        assert!(state.break_stale_lease(ttl).await.unwrap());
        assert!(state.lease().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_release_ignores_foreign_lease() {
        let (state, _, _) = state();
        let ttl = Duration::from_secs(300);
        state.try_acquire_lease("a", ttl).await.unwrap();

        state.release_lease("b").await.unwrap();
        assert!(state.lease().await.unwrap().is_some());

        state.release_lease("a").await.unwrap();
        assert!(state.lease().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupted_lease_is_discarded() {
        let (state, settings, _) = state();
        settings
            .data
            .lock()
            .unwrap()
            .insert(LEASE_KEY.to_string(), "{not json".to_string());

        assert!(state.lease().await.unwrap().is_none());
        assert!(state
            .try_acquire_lease("a", Duration::from_secs(1))
            .await
            .unwrap());
    }
}
