//! The session registry: every live session, indexed two ways.
//!
//! Holds one map keyed by session id and one keyed by bound player id,
//! plus the background sweep that evicts idle sessions. Both maps live
//! behind a single mutex so the multi-step operations — duplicate-login
//! eviction inside [`bind_player`](SessionRegistry::bind_player), the
//! two-map removal in [`remove_session`](SessionRegistry::remove_session) —
//! are each one critical section. No lock is ever held across an await.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use gatehall_protocol::PlayerId;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{Session, SessionConfig, SessionId};

/// How long `shutdown` waits for an in-flight sweep pass before aborting it.
const SWEEP_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

struct Maps {
    by_id: HashMap<SessionId, Arc<Session>>,
    by_player: HashMap<PlayerId, Arc<Session>>,
}

struct SweepTask {
    handle: JoinHandle<()>,
    stop: watch::Sender<bool>,
}

/// Process-wide store of active sessions.
///
/// Created once at server start, shared as `Arc<SessionRegistry>` with
/// every connection task and handler, torn down by
/// [`shutdown`](Self::shutdown).
pub struct SessionRegistry {
    maps: Mutex<Maps>,
    config: SessionConfig,
    sweep: Mutex<Option<SweepTask>>,
}

impl SessionRegistry {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            maps: Mutex::new(Maps {
                by_id: HashMap::new(),
                by_player: HashMap::new(),
            }),
            config,
            sweep: Mutex::new(None),
        }
    }

    /// Registers a freshly created session. Never fails.
    pub fn add_session(&self, session: Arc<Session>) {
        let total = {
            let mut maps = self.maps();
            maps.by_id.insert(session.id(), Arc::clone(&session));
            maps.by_id.len()
        };
        tracing::info!(session = %session.id(), total, "session added");
    }

    /// Removes a session from both maps, returning it for caller-side
    /// cleanup (closing the connection).
    ///
    /// The player-map entry is dropped only if it still points at this
    /// session: after a duplicate-login eviction the player id belongs to
    /// the winning session, and the evicted connection's late disconnect
    /// must not erase that binding.
    pub fn remove_session(&self, id: SessionId) -> Option<Arc<Session>> {
        let (session, total) = {
            let mut maps = self.maps();
            let session = maps.by_id.remove(&id)?;
            if let Some(player_id) = session.player_id() {
                if maps
                    .by_player
                    .get(&player_id)
                    .is_some_and(|bound| bound.id() == id)
                {
                    maps.by_player.remove(&player_id);
                }
            }
            (session, maps.by_id.len())
        };
        tracing::info!(session = %id, total, "session removed");
        Some(session)
    }

    /// O(1) lookup by session id.
    pub fn get_session(&self, id: SessionId) -> Option<Arc<Session>> {
        self.maps().by_id.get(&id).cloned()
    }

    /// O(1) lookup by bound player id.
    pub fn get_session_by_player(&self, player_id: &PlayerId) -> Option<Arc<Session>> {
        self.maps().by_player.get(player_id).cloned()
    }

    /// Binds a player identity to a session, evicting any other session
    /// already holding the same player id (duplicate login).
    ///
    /// The compare-evict-install sequence runs under the registry lock,
    /// so two simultaneous logins for one player id cannot both survive:
    /// exactly one wins, and the loser's prior session is closed and
    /// removed. The evicted client receives a close, not an error
    /// message.
    pub fn bind_player(&self, session: &Arc<Session>, player_id: PlayerId, player_name: &str) {
        session.bind_identity(player_id.clone(), player_name.to_string());

        {
            let mut maps = self.maps();
            if let Some(existing) = maps.by_player.get(&player_id).cloned() {
                if existing.id() != session.id() {
                    tracing::warn!(
                        player = %player_id,
                        evicted = %existing.id(),
                        "player already logged in, closing existing session"
                    );
                    existing.close();
                    maps.by_id.remove(&existing.id());
                }
            }
            maps.by_player.insert(player_id.clone(), Arc::clone(session));
        }

        tracing::info!(
            player = %player_id,
            session = %session.id(),
            "player bound to session"
        );
    }

    /// Removes a player binding and clears the session's identity, if a
    /// binding exists.
    pub fn unbind_player(&self, player_id: &PlayerId) {
        let removed = self.maps().by_player.remove(player_id);
        if let Some(session) = removed {
            session.clear_identity();
            tracing::info!(
                player = %player_id,
                session = %session.id(),
                "player unbound from session"
            );
        }
    }

    /// Snapshot of every live session (any state).
    pub fn all_sessions(&self) -> Vec<Arc<Session>> {
        self.maps().by_id.values().cloned().collect()
    }

    /// Number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.maps().by_id.len()
    }

    /// Number of sessions with a bound player.
    pub fn online_player_count(&self) -> usize {
        self.maps().by_player.len()
    }

    /// One sweep pass: closes and removes every session idle for longer
    /// than the configured timeout. Returns how many were evicted.
    ///
    /// Each session is handled independently — close is non-blocking and
    /// infallible, so one stuck connection can't stall the rest.
    pub fn sweep_idle(&self) -> usize {
        let timeout = self.config.idle_timeout;
        let idle: Vec<Arc<Session>> = self
            .maps()
            .by_id
            .values()
            .filter(|s| s.is_idle(timeout))
            .cloned()
            .collect();

        let mut cleaned = 0;
        for session in idle {
            tracing::info!(session = %session.id(), "cleaning up idle session");
            session.close();
            self.remove_session(session.id());
            cleaned += 1;
        }
        if cleaned > 0 {
            tracing::info!(cleaned, "idle session sweep finished");
        }
        cleaned
    }

    /// Starts the background sweep task. Call once after construction;
    /// subsequent calls are no-ops.
    pub fn spawn_sweep(registry: &Arc<Self>) {
        let mut sweep = registry.sweep_slot();
        if sweep.is_some() {
            tracing::debug!("sweep task already running");
            return;
        }

        let interval = registry.config.sweep_interval;
        let registry = Arc::clone(registry);
        let (stop, mut stopped) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick of `interval` fires immediately; skip it so
            // a fresh registry isn't swept at time zero.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        registry.sweep_idle();
                    }
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        *sweep = Some(SweepTask { handle, stop });
        tracing::info!(interval = ?interval, "session sweep task started");
    }

    /// Shuts the registry down: stops the sweep (waiting briefly for an
    /// in-flight pass), closes every session, and clears both maps.
    pub async fn shutdown(&self) {
        tracing::info!("shutting down session registry");

        let sweep = self.sweep_slot().take();
        if let Some(SweepTask { mut handle, stop }) = sweep {
            let _ = stop.send(true);
            if tokio::time::timeout(SWEEP_SHUTDOWN_GRACE, &mut handle)
                .await
                .is_err()
            {
                handle.abort();
            }
        }

        let sessions: Vec<Arc<Session>> = {
            let mut maps = self.maps();
            let sessions = maps.by_id.values().cloned().collect();
            maps.by_id.clear();
            maps.by_player.clear();
            sessions
        };
        for session in &sessions {
            session.close();
        }

        tracing::info!(closed = sessions.len(), "session registry shut down");
    }

    fn maps(&self) -> MutexGuard<'_, Maps> {
        self.maps.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sweep_slot(&self) -> MutexGuard<'_, Option<SweepTask>> {
        self.sweep.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Timing-dependent behavior is tested without sleeping on real
    //! deadlines: `idle_timeout: Duration::ZERO` makes any session with a
    //! few milliseconds of silence sweepable, and an hour-long timeout
    //! makes nothing sweepable.

    use super::*;

    use crate::SessionState;
    use gatehall_protocol::FrameCodec;
    use gatehall_transport::{ConnectionHandle, ConnectionId, OutboundFrames};

    fn registry_with_instant_idle() -> SessionRegistry {
        SessionRegistry::new(SessionConfig {
            idle_timeout: Duration::ZERO,
            sweep_interval: Duration::from_secs(60),
        })
    }

    fn registry_with_long_idle() -> SessionRegistry {
        SessionRegistry::new(SessionConfig {
            idle_timeout: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
        })
    }

    fn session(conn_id: u64) -> (Arc<Session>, OutboundFrames) {
        let (conn, frames) = ConnectionHandle::channel(ConnectionId::new(conn_id), 1024);
        (Arc::new(Session::new(conn, FrameCodec::json())), frames)
    }

    fn pid(s: &str) -> PlayerId {
        PlayerId(s.to_string())
    }

    /// Lets `Duration::ZERO` idle checks observe a non-zero gap.
    fn let_time_pass() {
        std::thread::sleep(Duration::from_millis(5));
    }

    // =====================================================================
    // add / remove / get
    // =====================================================================

    #[test]
    fn test_add_session_is_retrievable_by_id() {
        let registry = registry_with_long_idle();
        let (s, _f) = session(1);

        registry.add_session(Arc::clone(&s));

        let found = registry.get_session(s.id()).expect("should be present");
        assert_eq!(found.id(), s.id());
        assert_eq!(registry.session_count(), 1);
    }

    #[test]
    fn test_get_session_unknown_returns_none() {
        let registry = registry_with_long_idle();
        let (s, _f) = session(1);
        // Never added.
        assert!(registry.get_session(s.id()).is_none());
    }

    #[test]
    fn test_remove_session_returns_session_and_clears_binding() {
        let registry = registry_with_long_idle();
        let (s, _f) = session(1);
        registry.add_session(Arc::clone(&s));
        registry.bind_player(&s, pid("player_alice"), "alice");

        let removed = registry.remove_session(s.id()).expect("should remove");

        assert_eq!(removed.id(), s.id());
        assert_eq!(registry.session_count(), 0);
        assert!(registry.get_session_by_player(&pid("player_alice")).is_none());
        assert_eq!(registry.online_player_count(), 0);
    }

    #[test]
    fn test_remove_session_unknown_returns_none() {
        let registry = registry_with_long_idle();
        let (s, _f) = session(1);
        assert!(registry.remove_session(s.id()).is_none());
    }

    // =====================================================================
    // bind_player / unbind_player
    // =====================================================================

    #[test]
    fn test_bind_player_authenticates_and_indexes_session() {
        let registry = registry_with_long_idle();
        let (s, _f) = session(1);
        registry.add_session(Arc::clone(&s));

        registry.bind_player(&s, pid("player_alice"), "alice");

        assert!(s.is_authenticated());
        assert_eq!(s.player_name(), Some("alice".into()));
        let found = registry
            .get_session_by_player(&pid("player_alice"))
            .expect("player should be indexed");
        assert_eq!(found.id(), s.id());
        assert_eq!(registry.online_player_count(), 1);
    }

    #[test]
    fn test_bind_player_duplicate_login_evicts_older_session() {
        let registry = registry_with_long_idle();
        let (first, _f1) = session(1);
        let (second, _f2) = session(2);
        registry.add_session(Arc::clone(&first));
        registry.add_session(Arc::clone(&second));
        registry.bind_player(&first, pid("player_carol"), "carol");

        registry.bind_player(&second, pid("player_carol"), "carol");

        // The first session is closed and gone from the registry.
        assert_eq!(first.state(), SessionState::Closed);
        assert!(!first.conn().is_open());
        assert!(registry.get_session(first.id()).is_none());
        // Only the second remains bound.
        let bound = registry
            .get_session_by_player(&pid("player_carol"))
            .expect("winner should stay bound");
        assert_eq!(bound.id(), second.id());
        assert_eq!(registry.session_count(), 1);
    }

    #[test]
    fn test_bind_player_rebind_same_session_is_not_eviction() {
        let registry = registry_with_long_idle();
        let (s, _f) = session(1);
        registry.add_session(Arc::clone(&s));

        registry.bind_player(&s, pid("player_alice"), "alice");
        registry.bind_player(&s, pid("player_alice"), "alice");

        assert_eq!(s.state(), SessionState::Authenticated);
        assert!(s.conn().is_open());
        assert_eq!(registry.session_count(), 1);
    }

    #[test]
    fn test_at_most_one_binding_under_concurrent_binds() {
        let registry = Arc::new(registry_with_long_idle());
        let mut frames = Vec::new();
        let sessions: Vec<Arc<Session>> = (0..8)
            .map(|i| {
                let (s, f) = session(100 + i);
                frames.push(f);
                registry.add_session(Arc::clone(&s));
                s
            })
            .collect();

        let handles: Vec<_> = sessions
            .iter()
            .map(|s| {
                let registry = Arc::clone(&registry);
                let s = Arc::clone(s);
                std::thread::spawn(move || {
                    registry.bind_player(&s, pid("player_race"), "race");
                })
            })
            .collect();
        for h in handles {
            h.join().expect("bind thread should not panic");
        }

        // Exactly one non-closed session holds the player id, and it is
        // the one the player map points at.
        let bound = registry
            .get_session_by_player(&pid("player_race"))
            .expect("one binding must survive");
        let survivors: Vec<_> = sessions
            .iter()
            .filter(|s| s.state() != SessionState::Closed)
            .collect();
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].id(), bound.id());
        assert_eq!(registry.session_count(), 1);
    }

    #[test]
    fn test_unbind_player_clears_identity_and_index() {
        let registry = registry_with_long_idle();
        let (s, _f) = session(1);
        registry.add_session(Arc::clone(&s));
        registry.bind_player(&s, pid("player_alice"), "alice");

        registry.unbind_player(&pid("player_alice"));

        assert!(!s.is_authenticated());
        assert_eq!(s.state(), SessionState::Connected);
        assert!(registry.get_session_by_player(&pid("player_alice")).is_none());
        // The session itself stays registered.
        assert!(registry.get_session(s.id()).is_some());
    }

    #[test]
    fn test_unbind_player_unknown_is_noop() {
        let registry = registry_with_long_idle();
        registry.unbind_player(&pid("player_ghost"));
        assert_eq!(registry.online_player_count(), 0);
    }

    #[test]
    fn test_evicted_session_late_removal_keeps_winner_binding() {
        // An evicted session's pipeline eventually calls remove_session
        // with its stale id; that must not erase the winner's binding.
        let registry = registry_with_long_idle();
        let (first, _f1) = session(1);
        let (second, _f2) = session(2);
        registry.add_session(Arc::clone(&first));
        registry.add_session(Arc::clone(&second));
        registry.bind_player(&first, pid("player_carol"), "carol");
        registry.bind_player(&second, pid("player_carol"), "carol");

        // The evicted connection's pipeline exits and cleans up.
        registry.remove_session(first.id());

        let bound = registry
            .get_session_by_player(&pid("player_carol"))
            .expect("winner binding must survive the loser's cleanup");
        assert_eq!(bound.id(), second.id());
    }

    // =====================================================================
    // sweep_idle
    // =====================================================================

    #[test]
    fn test_sweep_idle_evicts_timed_out_sessions() {
        let registry = registry_with_instant_idle();
        let (s, _f) = session(1);
        registry.add_session(Arc::clone(&s));
        let_time_pass();

        let cleaned = registry.sweep_idle();

        assert_eq!(cleaned, 1);
        assert!(registry.get_session(s.id()).is_none());
        assert_eq!(s.state(), SessionState::Closed);
        assert!(!s.conn().is_open());
    }

    #[test]
    fn test_sweep_idle_keeps_active_sessions() {
        let registry = registry_with_instant_idle();
        let (idle, _f1) = session(1);
        let (active, _f2) = session(2);
        registry.add_session(Arc::clone(&idle));
        registry.add_session(Arc::clone(&active));
        let_time_pass();
        active.touch();

        let cleaned = registry.sweep_idle();

        assert_eq!(cleaned, 1);
        assert!(registry.get_session(idle.id()).is_none());
        assert!(registry.get_session(active.id()).is_some());
    }

    #[test]
    fn test_sweep_idle_within_timeout_evicts_nothing() {
        let registry = registry_with_long_idle();
        let (s, _f) = session(1);
        registry.add_session(Arc::clone(&s));

        assert_eq!(registry.sweep_idle(), 0);
        assert_eq!(registry.session_count(), 1);
    }

    #[tokio::test]
    async fn test_spawned_sweep_evicts_idle_session() {
        let registry = Arc::new(SessionRegistry::new(SessionConfig {
            idle_timeout: Duration::ZERO,
            sweep_interval: Duration::from_millis(20),
        }));
        SessionRegistry::spawn_sweep(&registry);

        let (s, _f) = session(1);
        registry.add_session(Arc::clone(&s));

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(
            registry.get_session(s.id()).is_none(),
            "sweep task should have evicted the idle session"
        );
        registry.shutdown().await;
    }

    // =====================================================================
    // shutdown
    // =====================================================================

    #[tokio::test]
    async fn test_shutdown_closes_all_sessions_and_clears_maps() {
        let registry = Arc::new(registry_with_long_idle());
        SessionRegistry::spawn_sweep(&registry);
        let (a, _fa) = session(1);
        let (b, _fb) = session(2);
        registry.add_session(Arc::clone(&a));
        registry.add_session(Arc::clone(&b));
        registry.bind_player(&a, pid("player_alice"), "alice");

        registry.shutdown().await;

        assert_eq!(registry.session_count(), 0);
        assert_eq!(registry.online_player_count(), 0);
        assert_eq!(a.state(), SessionState::Closed);
        assert_eq!(b.state(), SessionState::Closed);
    }
}
