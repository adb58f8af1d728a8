//! Monitor: observable tree store with path subscriptions.
//!
//! A `serde_json::Value` tree addressed by dotted paths (`user.options[2]`),
//! a per-path change cache used to classify writes, and a registry of
//! exact-string and pattern subscriptions that are dispatched synchronously
//! on every `set`, `unset` and `trigger`.

pub mod cache;
pub mod path;
pub mod registry;
pub mod store;
pub mod tree;

pub use cache::{CacheEntry, ChangeCache, ChangeType};
pub use path::{ParsedPath, Segment, Step};
pub use registry::{Callback, Change, Matcher, SubscriptionId, SubscriptionRegistry};
pub use store::Monitor;
