//! Change classification and the per-path change cache.
//!
//! The cache remembers the last write or trigger made through each exact
//! path string so a later write can be classified (and its old value
//! recovered) without walking the tree again. Keys are the literal strings callers passed:
//! `user.a` and `.user.a` are separate entries.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;


/// The kind of change a mutating call produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// First write to a path that held nothing.
    Add,
    /// Write to a path that was cached or already held a value.
    Update,
    /// Explicit `unset`.
    Delete,
    /// Explicit `trigger`; the tree is untouched.
    Trigger,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Add => "add",
            ChangeType::Update => "update",
            ChangeType::Delete => "delete",
            ChangeType::Trigger => "trigger",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}


/// Memo of the last write through one path string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub change: ChangeType,
    pub value: Value,
}


/// How a `set` should be reported, decided before the tree is touched.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub change: ChangeType,
    pub old_value: Option<Value>,
}


#[derive(Debug, Clone, Default)]
pub struct ChangeCache {
    entries: HashMap<String, CacheEntry>,
}

impl ChangeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&CacheEntry> {
        self.entries.get(path)
    }

    /// Classify a write to `path`.
    ///
    /// A cached path is always an update whose old value is the cached one.
    /// Otherwise `live` (the pre-mutation tree value, if any) decides between
    /// add and update.
    pub fn classify(&self, path: &str, live: Option<&Value>) -> Classification {
        if let Some(entry) = self.entries.get(path) {
            return Classification {
                change: ChangeType::Update,
                old_value: Some(entry.value.clone()),
            };
        }
        match live {
            Some(v) => Classification {
                change: ChangeType::Update,
                old_value: Some(v.clone()),
            },
            None => Classification {
                change: ChangeType::Add,
                old_value: None,
            },
        }
    }

    /// The value a path held before the current call: cached first, then live.
    pub fn prior_value(&self, path: &str, live: Option<&Value>) -> Option<Value> {
        match self.entries.get(path) {
            Some(entry) => Some(entry.value.clone()),
            None => live.cloned(),
        }
    }

    pub fn record(&mut self, path: &str, timestamp: i64, change: ChangeType, value: Value) {
        tracing::trace!(path, %change, "cache write");
        self.entries.insert(
            path.to_string(),
            CacheEntry {
                timestamp,
                change,
                value,
            },
        );
    }

    pub fn invalidate(&mut self, path: &str) -> Option<CacheEntry> {
        self.entries.remove(path)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
