use std::collections::HashSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Observations shorter than this (trimmed, in chars) are noise.
pub const MIN_CONTENT_CHARS: usize = 5;

/// How much of the collapsed content goes into a prefix dedup key.
pub const KEY_PREFIX_CHARS: usize = 200;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Assistant,
}

impl Author {
    pub fn as_str(&self) -> &'static str {
        match self {
            Author::User => "User",
            Author::Assistant => "Assistant",
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Author::User)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DedupStrategy {
    /// First 200 collapsed chars plus total length. Two long messages with a
    /// shared prefix and equal length collide.
    #[default]
    PrefixLength,
    /// Digest of the whole collapsed content plus its length.
    ContentDigest,
}

/// Content-derived identity of a logical message. DOM nodes are recycled by
/// the virtualizer, so node identity cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn new(content: &str, strategy: DedupStrategy) -> Self {
        let collapsed = collapse_whitespace(content);
        let len = collapsed.chars().count();
        match strategy {
            DedupStrategy::PrefixLength => {
                let prefix: String = collapsed.chars().take(KEY_PREFIX_CHARS).collect();
                DedupKey(format!("{prefix}_{len}"))
            }
            DedupStrategy::ContentDigest => {
                DedupKey(format!("{:x}_{len}", md5::compute(collapsed.as_bytes())))
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trim and fold every whitespace run into one space.
pub fn collapse_whitespace(input: &str) -> String {
    WHITESPACE_RE.replace_all(input.trim(), " ").into_owned()
}

/// Whether trimmed content is long enough to count as a message.
pub fn meets_min_length(content: &str, min_chars: usize) -> bool {
    content.trim().chars().count() >= min_chars
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub author: Author,
    pub content: String,
    pub dedup_key: DedupKey,
    /// Absolute vertical offset at first observation.
    pub position: f64,
}

/// Ordered, deduplicated accumulation of messages for one session.
#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
    seen: HashSet<DedupKey>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_seen(&self, key: &DedupKey) -> bool {
        self.seen.contains(key)
    }

    /// Returns false when the key was already recorded; the first
    /// observation's position wins.
    pub fn insert(&mut self, message: Message) -> bool {
        if !self.seen.insert(message.dedup_key.clone()) {
            return false;
        }
        self.messages.push(message);
        true
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Final chronological order: ascending position, insertion order for ties.
    pub fn into_sorted(self) -> Vec<Message> {
        let mut messages = self.messages;
        messages.sort_by(|a, b| a.position.total_cmp(&b.position));
        messages
    }
}
