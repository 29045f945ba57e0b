//! Per-session ordinal references ("the second one").

use crate::core::error::PlanGateError;
use crate::core::store::UserScope;
use serde::{Deserialize, Serialize};

/// Ids returned by the session's most recent read, in display order.
/// Each read replaces the whole list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrdinalBuffer {
    ids: Vec<String>,
}

impl OrdinalBuffer {
    pub fn from_ids(ids: Vec<String>) -> Self {
        Self { ids }
    }

    pub fn replace(&mut self, ids: Vec<String>) {
        self.ids = ids;
    }

    /// Resolves a 1-based ordinal.
    pub fn resolve(&self, ordinal: usize) -> Option<&str> {
        ordinal
            .checked_sub(1)
            .and_then(|i| self.ids.get(i))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }
}

/// Caller-owned conversation state, passed `&mut` into the coordinator.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: UserScope,
    pub session_id: String,
    pub ordinals: OrdinalBuffer,
}

impl Session {
    pub fn new(user: UserScope, session_id: impl Into<String>) -> Self {
        Self {
            user,
            session_id: session_id.into(),
            ordinals: OrdinalBuffer::default(),
        }
    }
}

pub trait SessionStore: Send + Sync {
    /// Loads the session, or a fresh one when the id is unknown or belongs
    /// to another user.
    fn load_session(&self, user: &UserScope, session_id: &str) -> Result<Session, PlanGateError>;

    fn save_session(&self, session: &Session) -> Result<(), PlanGateError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinals_are_one_based() {
        let buf = OrdinalBuffer::from_ids(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(buf.resolve(2), Some("b"));
        assert_eq!(buf.resolve(0), None);
        assert_eq!(buf.resolve(4), None);
    }

    #[test]
    fn replace_overwrites() {
        let mut buf = OrdinalBuffer::from_ids(vec!["a".into()]);
        buf.replace(vec![]);
        assert!(buf.is_empty());
    }
}
