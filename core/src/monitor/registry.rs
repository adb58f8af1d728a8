//! Subscription registry: exact-string and pattern matchers with callbacks.
//!
//! Two ordered lists are kept: exact-string subscriptions and pattern
//! subscriptions. Dispatch visits the exact list first, then the pattern list,
//! each in registration order. Patterns are `regex::Regex`, which carries no
//! match cursor between calls, so whether a pattern matches a path never
//! depends on what it was tested against before.

use std::fmt;
use std::rc::Rc;

use regex::Regex;
use serde_json::Value;

use super::cache::ChangeType;
use super::store::Monitor;
use crate::error::MonitorError;


/// Everything a callback learns about one change.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// The path as passed by the caller, delimiters stripped.
    pub path: String,
    pub change: ChangeType,
    /// `None` for deletes.
    pub new_value: Option<Value>,
    /// `None` when the path held nothing before.
    pub old_value: Option<Value>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// Callback invoked on a matching change. Receives the Monitor itself so it
/// can read or re-enter it synchronously.
pub type Callback = Rc<dyn Fn(&mut Monitor, &Change)>;

/// Handle returned by `on`, usable with `off_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);


/// What a subscription listens to.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Fires when the dispatched path is identical to this string.
    Exact(String),
    /// Fires when the regex matches anywhere in the dispatched path.
    Pattern(Regex),
}

impl Matcher {
    pub fn exact(path: impl Into<String>) -> Self {
        Matcher::Exact(path.into())
    }

    /// Compile a regex pattern matcher.
    pub fn pattern(source: &str) -> Result<Self, MonitorError> {
        Regex::new(source)
            .map(Matcher::Pattern)
            .map_err(|e| MonitorError::InvalidPattern {
                source_text: source.to_string(),
                message: e.to_string(),
            })
    }

    /// Compile a dotted glob into a pattern matcher.
    ///
    /// `*` matches one path segment, `**` matches any run of segments
    /// (including none). Everything else is literal. `user.*` matches
    /// `user.hexonly` but not `user.a.b`; `user.**` matches both.
    pub fn glob(glob: &str) -> Result<Self, MonitorError> {
        let mut source = String::from("^");
        let parts: Vec<&str> = glob.split('.').collect();
        for (i, part) in parts.iter().enumerate() {
            let last = i + 1 == parts.len();
            match *part {
                "**" if last => source.push_str(".*"),
                "**" => source.push_str("(?:[^.]+\\.)*"),
                "*" => {
                    source.push_str("[^.]+");
                    if !last {
                        source.push_str("\\.");
                    }
                }
                literal => {
                    source.push_str(&regex::escape(literal));
                    if !last {
                        source.push_str("\\.");
                    }
                }
            }
        }
        source.push('$');
        Matcher::pattern(&source)
    }

    /// True if this matcher selects `path`.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Matcher::Exact(s) => s == path,
            Matcher::Pattern(re) => re.is_match(path),
        }
    }

    /// The literal text of the matcher: the path, or the pattern source.
    pub fn source(&self) -> &str {
        match self {
            Matcher::Exact(s) => s,
            Matcher::Pattern(re) => re.as_str(),
        }
    }

    /// Textual identity used by `off`: same kind, same source text.
    pub fn same_as(&self, other: &Matcher) -> bool {
        match (self, other) {
            (Matcher::Exact(a), Matcher::Exact(b)) => a == b,
            (Matcher::Pattern(a), Matcher::Pattern(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Exact(s) => write!(f, "\"{}\"", s),
            Matcher::Pattern(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

impl From<&str> for Matcher {
    fn from(s: &str) -> Self {
        Matcher::Exact(s.to_string())
    }
}

impl From<String> for Matcher {
    fn from(s: String) -> Self {
        Matcher::Exact(s)
    }
}

impl From<Regex> for Matcher {
    fn from(re: Regex) -> Self {
        Matcher::Pattern(re)
    }
}

impl From<&Regex> for Matcher {
    fn from(re: &Regex) -> Self {
        Matcher::Pattern(re.clone())
    }
}


struct Subscription {
    id: SubscriptionId,
    matcher: Matcher,
    callback: Callback,
}


/// Ordered exact and pattern subscription lists.
pub struct SubscriptionRegistry {
    exact: Vec<Subscription>,
    patterns: Vec<Subscription>,
    next_id: u64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        SubscriptionRegistry {
            exact: Vec::new(),
            patterns: Vec::new(),
            next_id: 1,
        }
    }

    /// Append a subscription to the list for its matcher kind.
    pub fn add(&mut self, matcher: Matcher, callback: Callback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        let list = match matcher {
            Matcher::Exact(_) => &mut self.exact,
            Matcher::Pattern(_) => &mut self.patterns,
        };
        list.push(Subscription {
            id,
            matcher,
            callback,
        });
        id
    }

    /// Remove every subscription whose matcher is textually identical to
    /// `matcher`. Returns how many were removed.
    pub fn remove(&mut self, matcher: &Matcher) -> usize {
        let list = match matcher {
            Matcher::Exact(_) => &mut self.exact,
            Matcher::Pattern(_) => &mut self.patterns,
        };
        let before = list.len();
        list.retain(|sub| !sub.matcher.same_as(matcher));
        before - list.len()
    }

    /// Remove the single subscription registered under `id`.
    pub fn remove_id(&mut self, id: SubscriptionId) -> bool {
        for list in [&mut self.exact, &mut self.patterns] {
            if let Some(pos) = list.iter().position(|sub| sub.id == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Snapshot of the callbacks that match `path`, in dispatch order:
    /// exact subscriptions first, then patterns, each in registration order.
    pub fn matching(&self, path: &str) -> Vec<Callback> {
        self.exact
            .iter()
            .chain(self.patterns.iter())
            .filter(|sub| sub.matcher.matches(path))
            .map(|sub| Rc::clone(&sub.callback))
            .collect()
    }

    /// Matchers in dispatch order.
    pub fn matchers(&self) -> impl Iterator<Item = &Matcher> {
        self.exact.iter().chain(self.patterns.iter()).map(|s| &s.matcher)
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
