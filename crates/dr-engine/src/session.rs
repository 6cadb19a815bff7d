//! Metadata session manager.
//!
//! One remote metadata database session per storage unit, shared by every
//! action sourced from that unit and logged out exactly once when the last
//! holder releases it.
//!
//! Invariants:
//! - opens == closes per storage ref once all handles are released
//! - at most one live session per storage ref

use dr_shared::{DrError, StorageRef};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::control_plane::{ControlPlane, SessionToken};

/// A counted reference to a live metadata session.
///
/// Not `Clone`: every handle comes from `acquire` and goes back through
/// `release`, which consumes it.
#[derive(Debug)]
pub struct SessionHandle {
    storage: StorageRef,
    token: SessionToken,
    refs: Arc<AtomicUsize>,
}

impl SessionHandle {
    pub fn storage(&self) -> &StorageRef {
        &self.storage
    }

    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    pub fn ref_count(&self) -> usize {
        self.refs.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub opened: usize,
    pub closed: usize,
    pub close_failures: usize,
}

struct LiveSession {
    token: SessionToken,
    refs: Arc<AtomicUsize>,
}

#[derive(Default)]
struct Sessions {
    live: HashMap<StorageRef, LiveSession>,
    stats: HashMap<StorageRef, SessionStats>,
}

pub struct MetadataSessionManager {
    control_plane: Arc<dyn ControlPlane>,
    // Held across the remote open so two acquirers never both open.
    sessions: Mutex<Sessions>,
}

impl MetadataSessionManager {
    pub fn new(control_plane: Arc<dyn ControlPlane>) -> Self {
        Self {
            control_plane,
            sessions: Mutex::new(Sessions::default()),
        }
    }

    /// Get a handle on the session for `storage`, opening it if needed.
    ///
    /// On open failure no handle exists and nothing needs releasing.
    pub async fn acquire(&self, storage: &StorageRef) -> Result<SessionHandle, DrError> {
        let mut sessions = self.sessions.lock().await;

        if let Some(live) = sessions.live.get(storage) {
            let refs = live.refs.fetch_add(1, Ordering::SeqCst) + 1;
            debug!(storage = %storage, refs, "reusing metadata session");
            return Ok(SessionHandle {
                storage: storage.clone(),
                token: live.token.clone(),
                refs: live.refs.clone(),
            });
        }

        let token = self
            .control_plane
            .open_metadata_session(storage)
            .await
            .map_err(|e| DrError::session(storage, e.to_string()))?;
        info!(storage = %storage, "opened metadata session");

        let refs = Arc::new(AtomicUsize::new(1));
        sessions.live.insert(
            storage.clone(),
            LiveSession {
                token: token.clone(),
                refs: refs.clone(),
            },
        );
        sessions.stats.entry(storage.clone()).or_default().opened += 1;

        Ok(SessionHandle {
            storage: storage.clone(),
            token,
            refs,
        })
    }

    /// Drop a handle; the last one out logs the session out.
    ///
    /// Never fails: a failed logout is logged and counted.
    pub async fn release(&self, handle: SessionHandle) {
        let mut sessions = self.sessions.lock().await;

        let previous = handle.refs.fetch_sub(1, Ordering::SeqCst);
        if previous > 1 {
            debug!(storage = %handle.storage, refs = previous - 1, "released metadata session handle");
            return;
        }

        sessions.live.remove(&handle.storage);
        let result = self.control_plane.close_metadata_session(&handle.token).await;
        let stats = sessions.stats.entry(handle.storage.clone()).or_default();
        stats.closed += 1;
        match result {
            Ok(()) => info!(storage = %handle.storage, "closed metadata session"),
            Err(e) => {
                stats.close_failures += 1;
                warn!(storage = %handle.storage, error = %e, "failed to close metadata session");
            }
        }
    }

    pub async fn stats(&self, storage: &StorageRef) -> SessionStats {
        self.sessions
            .lock()
            .await
            .stats
            .get(storage)
            .copied()
            .unwrap_or_default()
    }

    pub async fn live_count(&self) -> usize {
        self.sessions.lock().await.live.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeControlPlane, FakeControlPlaneBuilder};

    #[tokio::test]
    async fn test_shared_session_closes_once() {
        let fake = Arc::new(FakeControlPlane::new());
        let manager = MetadataSessionManager::new(fake.clone());
        let sr = StorageRef::new("vdi-a");

        let first = manager.acquire(&sr).await.unwrap();
        let second = manager.acquire(&sr).await.unwrap();
        assert_eq!(first.token(), second.token());
        assert_eq!(second.ref_count(), 2);

        manager.release(first).await;
        assert_eq!(fake.session_counts(&sr).closed, 0);
        manager.release(second).await;

        let counts = fake.session_counts(&sr);
        assert_eq!((counts.opened, counts.closed, counts.max_live), (1, 1, 1));
        assert_eq!(manager.live_count().await, 0);
    }

    #[tokio::test]
    async fn test_reopen_after_close() {
        let fake = Arc::new(FakeControlPlane::new());
        let manager = MetadataSessionManager::new(fake.clone());
        let sr = StorageRef::new("vdi-a");

        let h = manager.acquire(&sr).await.unwrap();
        manager.release(h).await;
        let h = manager.acquire(&sr).await.unwrap();
        manager.release(h).await;

        let stats = manager.stats(&sr).await;
        assert_eq!((stats.opened, stats.closed), (2, 2));
        assert_eq!(fake.session_counts(&sr).max_live, 1);
    }

    #[tokio::test]
    async fn test_open_failure_produces_no_handle() {
        let fake = Arc::new(FakeControlPlaneBuilder::new().failing_session("vdi-bad").build());
        let manager = MetadataSessionManager::new(fake.clone());
        let sr = StorageRef::new("vdi-bad");

        let err = manager.acquire(&sr).await.unwrap_err();
        assert!(matches!(err, DrError::Session { .. }));
        assert_eq!(manager.live_count().await, 0);
        assert_eq!(manager.stats(&sr).await, SessionStats::default());
    }
}
