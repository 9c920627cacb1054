//! Moderation word filter
//!
//! Masks banned substrings in chat content. The banned set is loaded once
//! at startup from a newline-delimited file and is read-only afterwards.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{info, warn};

use crate::error::ConfigError;

/// Replacement written over every banned substring
pub const MASK: &str = "***";

/// Maximum number of lines read from a word-list file
pub const MAX_WORD_LIST_LINES: usize = 100_000;

/// Set of banned substrings
#[derive(Debug, Clone, Default)]
pub struct WordFilter {
    words: BTreeSet<String>,
}

impl WordFilter {
    /// Build a filter from an iterator of banned substrings
    ///
    /// Empty entries and entries containing `*` are ignored. A banned word
    /// can then never match across a mask, so masking already-masked text
    /// is a no-op.
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let words = words
            .into_iter()
            .map(Into::into)
            .filter(|w: &String| !w.is_empty() && !w.contains('*'))
            .collect();
        Self { words }
    }

    /// Read a word list, keeping at most the first 100 000 lines
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let filter = Self::new(
            data.lines()
                .take(MAX_WORD_LIST_LINES)
                .map(|line| line.trim_end_matches('\r')),
        );
        info!("Loaded {} banned words from {}", filter.len(), path.display());
        Ok(filter)
    }

    /// Like [`WordFilter::load`], but an unreadable file yields an empty filter
    pub fn load_or_empty(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(filter) => filter,
            Err(e) => {
                warn!("Moderation disabled: {}", e);
                Self::default()
            }
        }
    }

    /// Set-membership test over the banned substrings
    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(word)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Replace every occurrence of every banned substring with `***`
    pub fn mask(&self, text: &str) -> String {
        if self.words.is_empty() {
            return text.to_string();
        }

        let mut out = text.to_string();
        for word in &self.words {
            if out.contains(word.as_str()) {
                out = out.replace(word.as_str(), MASK);
            }
        }
        out
    }
}
