use crate::types::{Color, SessionId};
use std::collections::HashMap;

/// Read access to the live sessions, as far as claim resolution needs it.
pub trait SessionDirectory {
    fn session_color(&self, session_id: &SessionId) -> Option<Color>;

    fn contains_session(&self, session_id: &SessionId) -> bool {
        self.session_color(session_id).is_some()
    }
}

impl SessionDirectory for HashMap<SessionId, Color> {
    fn session_color(&self, session_id: &SessionId) -> Option<Color> {
        self.get(session_id).copied()
    }
}
