//! Bounded conversation memory

use std::collections::VecDeque;

/// Turns kept when no depth is configured.
pub const DEFAULT_HISTORY_DEPTH: usize = 5;

/// One question and the answer given to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

/// The most recent `depth` turns of a conversation, oldest first.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    depth: usize,
    turns: VecDeque<Turn>,
}

impl Default for ChatHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_DEPTH)
    }
}

impl ChatHistory {
    pub fn new(depth: usize) -> Self {
        Self {
            depth,
            turns: VecDeque::with_capacity(depth),
        }
    }

    /// Record a completed turn, evicting the oldest one when full.
    pub fn push<Q: Into<String>, A: Into<String>>(&mut self, question: Q, answer: A) {
        if self.depth == 0 {
            return;
        }
        while self.turns.len() >= self.depth {
            self.turns.pop_front();
        }
        self.turns.push_back(Turn {
            question: question.into(),
            answer: answer.into(),
        });
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// `User: {q}\nAssistant: {a}\n\n` for every turn.
    pub fn transcript(&self) -> String {
        self.turns
            .iter()
            .map(|turn| format!("User: {}\nAssistant: {}\n\n", turn.question, turn.answer))
            .collect()
    }
}
