//! Concurrent session registry.
//!
//! The map lock is only held to look up or remove a handle. Each session has
//! its own lock, so requests for different conversations never wait on each
//! other and requests for the same conversation are serialized.
//!
//! Lock order: never block on the map lock while holding a session lock.
//! The sweeper holds the map lock and only `try_lock`s sessions. A session
//! removed from the map is marked retired so a request that raced the removal
//! starts over against a fresh entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use super::session::Session;
use crate::error::CalmlineError;

type SessionHandle = Arc<Mutex<Session>>;

pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionHandle>>,
    idle_timeout: Duration,
}

fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Runs `f` on the conversation's session, creating it if absent.
    ///
    /// An idle-expired session is replaced by a fresh CALM session first.
    pub fn with_session<T>(
        &self,
        chat_id: &str,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut Session) -> T,
    ) -> T {
        loop {
            let handle = {
                let mut sessions = lock_recovering(&self.sessions);
                sessions
                    .entry(chat_id.to_string())
                    .or_insert_with(|| {
                        debug!(chat_id = %chat_id, "Session created");
                        Arc::new(Mutex::new(Session::new(chat_id, now)))
                    })
                    .clone()
            };

            let mut session = lock_recovering(&handle);
            if session.retired {
                continue;
            }
            if session.is_expired(now, self.idle_timeout) {
                info!(
                    chat_id = %chat_id,
                    last_activity = %session.last_activity_at,
                    "Session idle past timeout; starting fresh"
                );
                *session = Session::new(chat_id, now);
            }
            session.touch(now);
            return f(&mut session);
        }
    }

    /// Like [`Self::with_session`] but never creates.
    ///
    /// Unknown or expired conversations yield [`CalmlineError::NoActiveSession`].
    pub fn with_existing<T>(
        &self,
        chat_id: &str,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut Session) -> T,
    ) -> Result<T, CalmlineError> {
        loop {
            let handle = {
                let sessions = lock_recovering(&self.sessions);
                sessions.get(chat_id).cloned()
            };
            let Some(handle) = handle else {
                return Err(CalmlineError::NoActiveSession(chat_id.to_string()));
            };

            let mut session = lock_recovering(&handle);
            if session.retired {
                continue;
            }
            if session.is_expired(now, self.idle_timeout) {
                session.retired = true;
                drop(session);
                self.remove_handle(chat_id, &handle);
                info!(chat_id = %chat_id, "Session expired before follow-up");
                return Err(CalmlineError::NoActiveSession(chat_id.to_string()));
            }
            session.touch(now);
            return Ok(f(&mut session));
        }
    }

    /// Removes the conversation's session. Returns whether one existed.
    pub fn remove(&self, chat_id: &str) -> bool {
        let handle = {
            let mut sessions = lock_recovering(&self.sessions);
            sessions.remove(chat_id)
        };
        match handle {
            Some(handle) => {
                lock_recovering(&handle).retired = true;
                debug!(chat_id = %chat_id, "Session removed");
                true
            }
            None => false,
        }
    }

    /// Drops sessions idle past the timeout. Busy sessions are skipped until the next sweep.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = lock_recovering(&self.sessions);
        let before = sessions.len();
        sessions.retain(|chat_id, handle| match handle.try_lock() {
            Ok(mut session) => {
                if session.is_expired(now, self.idle_timeout) {
                    session.retired = true;
                    debug!(chat_id = %chat_id, "Sweeping idle session");
                    false
                } else {
                    true
                }
            }
            Err(TryLockError::WouldBlock) => true,
            Err(TryLockError::Poisoned(poisoned)) => {
                poisoned.into_inner().retired = true;
                false
            }
        });
        before - sessions.len()
    }

    /// Copy of the session as it stands, without touching it.
    pub fn snapshot(&self, chat_id: &str) -> Option<Session> {
        let handle = lock_recovering(&self.sessions).get(chat_id).cloned()?;
        let session = lock_recovering(&handle);
        (!session.retired).then(|| session.clone())
    }

    pub fn len(&self) -> usize {
        lock_recovering(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove_handle(&self, chat_id: &str, handle: &SessionHandle) {
        let mut sessions = lock_recovering(&self.sessions);
        if sessions
            .get(chat_id)
            .map(|current| Arc::ptr_eq(current, handle))
            .unwrap_or(false)
        {
            sessions.remove(chat_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DistressState;
    use chrono::TimeZone;
    use std::thread;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid time")
    }

    fn store() -> SessionStore {
        SessionStore::new(Duration::minutes(30))
    }

    #[test]
    fn creates_on_first_use() {
        let store = store();
        let state = store.with_session("a", t0(), |session| session.state);
        assert_eq!(state, DistressState::Calm);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn with_existing_rejects_unknown() {
        let store = store();
        let result = store.with_existing("missing", t0(), |_| ());
        assert!(matches!(result, Err(CalmlineError::NoActiveSession(id)) if id == "missing"));
    }

    #[test]
    fn idle_session_restarts_calm() {
        let store = store();
        store.with_session("a", t0(), |session| session.state = DistressState::Panic);
        let state = store.with_session("a", t0() + Duration::minutes(31), |session| session.state);
        assert_eq!(state, DistressState::Calm);
    }

    #[test]
    fn idle_session_is_not_resumed_by_follow_up() {
        let store = store();
        store.with_session("a", t0(), |session| session.state = DistressState::Panic);
        let result = store.with_existing("a", t0() + Duration::minutes(45), |_| ());
        assert!(matches!(result, Err(CalmlineError::NoActiveSession(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn sweep_drops_only_idle_sessions() {
        let store = store();
        store.with_session("old", t0(), |_| ());
        store.with_session("new", t0() + Duration::minutes(20), |_| ());
        let removed = store.sweep_expired(t0() + Duration::minutes(40));
        assert_eq!(removed, 1);
        assert!(store.snapshot("old").is_none());
        assert!(store.snapshot("new").is_some());
    }

    #[test]
    fn remove_then_recreate() {
        let store = store();
        store.with_session("a", t0(), |session| session.state = DistressState::Rising);
        assert!(store.remove("a"));
        assert!(!store.remove("a"));
        let state = store.with_session("a", t0(), |session| session.state);
        assert_eq!(state, DistressState::Calm);
    }

    #[test]
    fn concurrent_requests_on_one_conversation_are_serialized() {
        let store = Arc::new(store());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..50 {
                        store.with_session("shared", t0(), |session| {
                            session.confidence_history.push_back(0.1);
                            if session.confidence_history.len() > 1000 {
                                session.confidence_history.clear();
                            }
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker thread");
        }
        let session = store.snapshot("shared").expect("session");
        assert_eq!(session.confidence_history.len(), 400);
    }
}
