use std::collections::HashMap;
use std::time::{Duration, Instant};

use system::uuid::Uuid;
use system::{Color, ColorAllocator, SessionDirectory, SessionId, SessionInfo};

use crate::broadcast::{ConnectionTx, Target};

pub struct Session {
    pub id: SessionId,
    pub color: Color,
    pub connected_at: Instant,
    last_liveness_signal: Instant,
    delivery_failed: bool,
    tx: ConnectionTx,
}

impl Session {
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            user_id: self.id,
            color: self.color,
        }
    }

    pub fn tx(&self) -> &ConnectionTx {
        &self.tx
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    pub fn last_liveness_signal(&self) -> Instant {
        self.last_liveness_signal
    }

    pub fn delivery_failed(&self) -> bool {
        self.delivery_failed
    }

    /// Closed transport, a failed delivery, or silence longer than `timeout`.
    pub fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        !self.is_open()
            || self.delivery_failed
            || now.saturating_duration_since(self.last_liveness_signal) > timeout
    }
}

/// Live sessions and the colors they hold.
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
    colors: ColorAllocator,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::with_colors(ColorAllocator::new())
    }

    pub fn with_colors(colors: ColorAllocator) -> Self {
        Self {
            sessions: HashMap::new(),
            colors,
        }
    }

    pub fn register(&mut self, tx: ConnectionTx, now: Instant) -> &Session {
        let mut id = Uuid::new_v4();
        while self.sessions.contains_key(&id) {
            id = Uuid::new_v4();
        }
        let color = self.colors.allocate();
        let session = Session {
            id,
            color,
            connected_at: now,
            last_liveness_signal: now,
            delivery_failed: false,
            tx,
        };
        self.sessions.entry(id).or_insert(session)
    }

    /// Records a liveness signal. Returns `false` for an unknown session.
    pub fn touch(&mut self, session_id: &SessionId, now: Instant) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(session) => {
                session.last_liveness_signal = now;
                true
            }
            None => false,
        }
    }

    /// Removes the session and frees its color. A second call is a no-op.
    pub fn unregister(&mut self, session_id: &SessionId) -> Option<Session> {
        let session = self.sessions.remove(session_id)?;
        self.colors.release(&session.color);
        Some(session)
    }

    pub fn mark_delivery_failed(&mut self, session_id: &SessionId) {
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.delivery_failed = true;
        }
    }

    pub fn get(&self, session_id: &SessionId) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Sessions whose transport is still open.
    pub fn live_count(&self) -> usize {
        self.sessions.values().filter(|s| s.is_open()).count()
    }

    /// Ids of open sessions, oldest connection first.
    pub fn live_session_ids(&self) -> Vec<SessionId> {
        let mut live = self
            .sessions
            .values()
            .filter(|s| s.is_open())
            .collect::<Vec<_>>();
        live.sort_by_key(|s| s.connected_at);
        live.into_iter().map(|s| s.id).collect()
    }

    pub fn targets(&self, exclude: Option<&SessionId>) -> Vec<Target> {
        self.sessions
            .values()
            .filter(|s| s.is_open() && Some(&s.id) != exclude)
            .map(|s| Target {
                session_id: s.id,
                tx: s.tx.clone(),
            })
            .collect()
    }

    pub fn expired(&self, now: Instant, timeout: Duration) -> Vec<SessionId> {
        self.sessions
            .values()
            .filter(|s| s.is_expired(now, timeout))
            .map(|s| s.id)
            .collect()
    }

    pub fn colors(&self) -> &ColorAllocator {
        &self.colors
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionDirectory for SessionRegistry {
    fn session_color(&self, session_id: &SessionId) -> Option<Color> {
        self.sessions.get(session_id).map(|s| s.color)
    }
}
