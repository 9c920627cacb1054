//! Recent-message cache
//!
//! Bounded replay buffer of the latest chat lines, handed to newly joined
//! clients for context.

use std::collections::VecDeque;

/// Number of chat lines kept for replay
pub const RECENT_CAPACITY: usize = 50;

/// Ring buffer of the most recent broadcast chat lines, oldest first
#[derive(Debug, Clone)]
pub struct RecentCache {
    lines: VecDeque<String>,
    capacity: usize,
}

impl RecentCache {
    /// Create an empty cache holding up to [`RECENT_CAPACITY`] lines
    pub fn new() -> Self {
        Self::with_capacity(RECENT_CAPACITY)
    }

    /// Create an empty cache holding up to `capacity` lines
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a line, evicting the oldest once over capacity
    pub fn push(&mut self, line: String) {
        self.lines.push_back(line);
        while self.lines.len() > self.capacity {
            self.lines.pop_front();
        }
    }

    /// Cached lines in arrival order
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// Owned copy of the cached lines, oldest first
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl Default for RecentCache {
    fn default() -> Self {
        Self::new()
    }
}
