use std::collections::VecDeque;

use crate::models::chat::Turn;

/// Default number of turns kept per conversation.
pub const DEFAULT_MAX_TURNS: usize = 20;

/// Rolling, bounded history of one conversation.
///
/// Turns are kept in chronological order. Once `max_turns` is reached the
/// oldest turn is evicted on every push.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    turns: VecDeque<Turn>,
    max_turns: usize,
}

impl ConversationHistory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(max_turns + 1),
            max_turns,
        }
    }

    /// Append a turn, then trim the front down to `max_turns`.
    pub fn push(&mut self, turn: Turn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    /// All turns except the most recent one, oldest first.
    pub fn preceding(&self) -> impl Iterator<Item = &Turn> {
        let take = self.turns.len().saturating_sub(1);
        self.turns.iter().take(take)
    }

    pub fn to_vec(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Role;

    #[test]
    fn test_length_is_min_of_pushes_and_cap() {
        for pushes in [0usize, 1, 19, 20, 21, 45] {
            let mut history = ConversationHistory::new(DEFAULT_MAX_TURNS);
            for i in 0..pushes {
                history.push(Turn::user(format!("msg {}", i)));
            }
            assert_eq!(history.len(), pushes.min(DEFAULT_MAX_TURNS));
        }
    }

    #[test]
    fn test_oldest_turns_evicted_first() {
        let mut history = ConversationHistory::new(DEFAULT_MAX_TURNS);
        for i in 0..30 {
            if i % 2 == 0 {
                history.push(Turn::user(format!("q{}", i)));
            } else {
                history.push(Turn::assistant(format!("a{}", i)));
            }
        }

        let contents: Vec<String> = history.iter().map(|t| t.content.clone()).collect();
        let expected: Vec<String> = (10..30)
            .map(|i| if i % 2 == 0 { format!("q{}", i) } else { format!("a{}", i) })
            .collect();
        assert_eq!(contents, expected);
        assert_eq!(history.iter().next().map(|t| t.role), Some(Role::User));
    }

    #[test]
    fn test_preceding_excludes_latest() {
        let mut history = ConversationHistory::new(4);
        history.push(Turn::user("Hi"));
        history.push(Turn::assistant("Hey"));
        history.push(Turn::user("Who painted the Night Watch?"));

        let preceding: Vec<&Turn> = history.preceding().collect();
        assert_eq!(preceding, vec![&Turn::user("Hi"), &Turn::assistant("Hey")]);

        let empty = ConversationHistory::new(4);
        assert_eq!(empty.preceding().count(), 0);
    }
}
