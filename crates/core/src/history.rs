use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Number of turns retained per session.
pub const MAX_HISTORY_TURNS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single utterance attributed to one speaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    role: Role,
    text: String,
    complete: bool,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            complete: true,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            complete: true,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

/// Fixed-capacity turn log; anything past capacity is evicted oldest first.
#[derive(Debug, Clone)]
pub struct History {
    turns: VecDeque<Turn>,
    capacity: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::with_capacity(MAX_HISTORY_TURNS)
    }
}

impl History {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Replaces the whole log, keeping only the most recent `capacity` turns.
    pub fn replace(&mut self, turns: Vec<Turn>) {
        self.turns.clear();
        for turn in window(&turns, self.capacity) {
            self.turns.push_back(turn.clone());
        }
    }

    pub fn to_vec(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

/// The last `cap` turns of `turns`.
pub fn window(turns: &[Turn], cap: usize) -> &[Turn] {
    &turns[turns.len().saturating_sub(cap)..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_history_retains_fifty_turns() {
        let mut history = History::default();
        history.replace((0..120).map(|i| Turn::assistant(i.to_string())).collect());
        assert_eq!(history.len(), MAX_HISTORY_TURNS);
        assert_eq!(history.to_vec()[0].text(), "70");
        assert_eq!(history.to_vec()[49].text(), "119");
    }

    #[test]
    fn zero_capacity_retains_nothing() {
        let mut history = History::with_capacity(0);
        history.replace(vec![Turn::user("a")]);
        assert!(history.is_empty());
    }

    #[test]
    fn replace_keeps_only_the_tail() {
        let mut history = History::with_capacity(2);
        history.replace(vec![Turn::user("a"), Turn::assistant("b"), Turn::user("c")]);
        let texts: Vec<_> = history.to_vec().iter().map(|t| t.text().to_string()).collect();
        assert_eq!(texts, vec!["b", "c"]);
    }

    #[test]
    fn window_handles_short_input() {
        let turns = vec![Turn::user("only")];
        assert_eq!(window(&turns, 50).len(), 1);
        assert!(window(&turns, 0).is_empty());
    }
}
