use crate::history::{History, MAX_HISTORY_TURNS, Turn};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug)]
struct Entry {
    history: History,
    /// Bumped on every clear so that a reply started before the clear
    /// cannot write its history back afterwards.
    epoch: u64,
}

/// Process-wide map from session id to its bounded history.
///
/// Cheap to clone; every clone shares the same map. Sessions only ever touch
/// their own entry.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<String, Entry>>>,
    history_cap: usize,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(MAX_HISTORY_TURNS)
    }
}

impl SessionRegistry {
    pub fn new(history_cap: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            history_cap,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Entry>> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Entry>> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a fresh session and returns its id.
    pub fn create(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.write().insert(
            id.clone(),
            Entry {
                history: History::with_capacity(self.history_cap),
                epoch: 0,
            },
        );
        tracing::debug!(session = %id, "session registered");
        id
    }

    /// Retained turns, oldest first. Unknown ids read as empty.
    pub fn history(&self, id: &str) -> Vec<Turn> {
        self.read()
            .get(id)
            .map(|entry| entry.history.to_vec())
            .unwrap_or_default()
    }

    /// Current history together with the epoch it was read at.
    pub fn snapshot(&self, id: &str) -> Option<(u64, Vec<Turn>)> {
        self.read()
            .get(id)
            .map(|entry| (entry.epoch, entry.history.to_vec()))
    }

    /// Replaces the history with `turns` unless it was cleared since `epoch`.
    pub fn commit(&self, id: &str, epoch: u64, turns: Vec<Turn>) -> bool {
        let mut map = self.write();
        match map.get_mut(id) {
            Some(entry) if entry.epoch == epoch => {
                entry.history.replace(turns);
                true
            }
            Some(_) => {
                tracing::debug!(session = %id, "history cleared mid-turn, discarding update");
                false
            }
            None => false,
        }
    }

    /// Empties the history. Clearing an empty or unknown session is a no-op.
    pub fn clear(&self, id: &str) {
        if let Some(entry) = self.write().get_mut(id) {
            entry.history.clear();
            entry.epoch += 1;
        }
    }

    /// Drops the session entirely.
    pub fn close(&self, id: &str) {
        if self.write().remove(id).is_some() {
            tracing::debug!(session = %id, "session removed");
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_are_isolated() {
        let registry = SessionRegistry::default();
        let a = registry.create();
        let b = registry.create();
        assert_ne!(a, b);

        let (epoch, _) = registry.snapshot(&a).unwrap();
        assert!(registry.commit(&a, epoch, vec![Turn::user("hi")]));
        assert_eq!(registry.history(&a).len(), 1);
        assert!(registry.history(&b).is_empty());
    }

    #[test]
    fn commit_respects_the_cap() {
        let registry = SessionRegistry::new(3);
        let id = registry.create();
        let turns: Vec<Turn> = (0..5).map(|i| Turn::user(i.to_string())).collect();
        registry.commit(&id, 0, turns);
        let texts: Vec<_> = registry
            .history(&id)
            .iter()
            .map(|t| t.text().to_string())
            .collect();
        assert_eq!(texts, vec!["2", "3", "4"]);
    }

    #[test]
    fn clear_is_idempotent_and_fences_stale_commits() {
        let registry = SessionRegistry::default();
        let id = registry.create();
        let (epoch, _) = registry.snapshot(&id).unwrap();

        registry.clear(&id);
        registry.clear(&id);
        assert!(registry.history(&id).is_empty());
        assert!(!registry.commit(&id, epoch, vec![Turn::user("stale")]));
        assert!(registry.history(&id).is_empty());
    }

    #[test]
    fn unknown_sessions_read_empty_and_clear_quietly() {
        let registry = SessionRegistry::default();
        assert!(registry.history("missing").is_empty());
        registry.clear("missing");
        assert!(registry.snapshot("missing").is_none());
    }

    #[test]
    fn close_removes_the_entry() {
        let registry = SessionRegistry::default();
        let id = registry.create();
        assert_eq!(registry.len(), 1);
        registry.close(&id);
        assert!(!registry.contains(&id));
        assert!(registry.is_empty());
    }
}
