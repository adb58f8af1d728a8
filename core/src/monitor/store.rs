//! The Monitor: an observable tree with synchronous, classified dispatch.
//!
//! - `get(path)` reads the value at a path.
//! - `set(path, value)` writes, classifies (add/update), and dispatches.
//! - `unset(path)` removes a leaf and dispatches a delete.
//! - `trigger(path, value)` dispatches and records a cache entry without
//!   touching the tree.
//! - `on(matcher, callback)` / `off(matcher)` manage subscriptions.
//!
//! Every dispatch runs the controller first, then exact-string
//! subscriptions, then pattern subscriptions. The set of callbacks is fixed
//! when the dispatch starts; subscriptions added or removed by a callback
//! only take effect for later dispatches.

use std::rc::Rc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::cache::{CacheEntry, ChangeCache, ChangeType};
use super::path::{strip_delimiters, ParsedPath};
use super::registry::{Callback, Change, Matcher, SubscriptionId, SubscriptionRegistry};
use super::tree;
use crate::config::MonitorConfig;
use crate::error::MonitorError;


/// Current time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}


pub struct Monitor {
    root: Value,
    cache: ChangeCache,
    registry: SubscriptionRegistry,
    controller: Option<Callback>,
    config: MonitorConfig,
    /// Number of dispatches currently on the stack.
    depth: usize,
    clock: fn() -> i64,
}

impl Monitor {
    /// Monitor over an empty mapping.
    pub fn new() -> Self {
        Self::with_root(Value::Object(Map::new()))
    }

    /// Monitor over a caller-supplied root.
    pub fn with_root(root: Value) -> Self {
        Monitor {
            root,
            cache: ChangeCache::new(),
            registry: SubscriptionRegistry::new(),
            controller: None,
            config: MonitorConfig::default(),
            depth: 0,
            clock: now_millis,
        }
    }

    /// Install the global controller, which sees every change before any
    /// subscription does.
    pub fn with_controller<F>(mut self, controller: F) -> Self
    where
        F: Fn(&mut Monitor, &Change) + 'static,
    {
        self.controller = Some(Rc::new(controller));
        self
    }

    pub fn with_config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the timestamp source.
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    // -------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------

    /// Value at `path`, or `None` if the path doesn't resolve.
    pub fn get(&self, path: &str) -> Result<Option<&Value>, MonitorError> {
        let parsed = ParsedPath::parse(path)?;
        Ok(tree::lookup(&self.root, &parsed))
    }

    /// True if `path` resolves. Malformed paths are reported as absent.
    pub fn has(&self, path: &str) -> bool {
        matches!(self.get(path), Ok(Some(_)))
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Direct mutable access to the tree. Writes made through it are silent:
    /// no dispatch and no cache update.
    pub fn root_mut(&mut self) -> &mut Value {
        &mut self.root
    }

    pub fn into_root(self) -> Value {
        self.root
    }

    pub fn cache_entry(&self, path: &str) -> Option<&CacheEntry> {
        self.cache.get(path)
    }

    /// Forget all cached writes; later writes are classified from the tree.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Dispatches currently in progress (0 outside any callback).
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn subscription_count(&self) -> usize {
        self.registry.len()
    }

    // -------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------

    /// Write `value` at `path`, creating intermediate containers as needed,
    /// and dispatch an `Add` or `Update`. Returns the root.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<&Value, MonitorError> {
        let value = value.into();
        let parsed = ParsedPath::parse(path)?;
        let stripped = strip_delimiters(path);
        self.check_depth(stripped)?;

        let class = self.cache.classify(path, tree::lookup(&self.root, &parsed));
        tree::assign(&mut self.root, &parsed, value.clone())?;

        let timestamp = (self.clock)();
        self.cache.record(path, timestamp, class.change, value.clone());

        self.dispatch(Change {
            path: stripped.to_string(),
            change: class.change,
            new_value: Some(value),
            old_value: class.old_value,
            timestamp,
        });
        Ok(&self.root)
    }

    /// Remove the leaf at `path`. Returns `false`, without dispatching, if
    /// there is nothing there. On success the path's cache entry is dropped
    /// and a `Delete` is dispatched carrying the removed value.
    pub fn unset(&mut self, path: &str) -> Result<bool, MonitorError> {
        let parsed = ParsedPath::parse(path)?;
        let stripped = strip_delimiters(path);
        self.check_depth(stripped)?;

        let removed = match tree::remove(&mut self.root, &parsed) {
            Some(v) => v,
            None => return Ok(false),
        };
        self.cache.invalidate(path);

        let timestamp = (self.clock)();
        self.dispatch(Change {
            path: stripped.to_string(),
            change: ChangeType::Delete,
            new_value: None,
            old_value: Some(removed),
            timestamp,
        });
        Ok(true)
    }

    /// Dispatch a `Trigger` for `path` without touching the tree.
    ///
    /// The old value is the cached one if the path was written or triggered
    /// through this exact string before, otherwise whatever the tree holds.
    /// The path's cache entry is replaced with a `Trigger` entry.
    pub fn trigger(&mut self, path: &str, value: impl Into<Value>) -> Result<(), MonitorError> {
        let parsed = ParsedPath::parse(path)?;
        let stripped = strip_delimiters(path);
        self.check_depth(stripped)?;

        let old_value = self
            .cache
            .prior_value(path, tree::lookup(&self.root, &parsed));

        let value = value.into();
        let timestamp = (self.clock)();
        self.cache.record(path, timestamp, ChangeType::Trigger, value.clone());

        self.dispatch(Change {
            path: stripped.to_string(),
            change: ChangeType::Trigger,
            new_value: Some(value),
            old_value,
            timestamp,
        });
        Ok(())
    }

    // -------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------

    /// Subscribe `callback` to changes selected by `matcher`.
    ///
    /// Strings subscribe to that exact path; `Regex` values (or
    /// `Matcher::pattern` / `Matcher::glob`) subscribe by pattern.
    pub fn on<M, F>(&mut self, matcher: M, callback: F) -> SubscriptionId
    where
        M: Into<Matcher>,
        F: Fn(&mut Monitor, &Change) + 'static,
    {
        let matcher = matcher.into();
        debug!(%matcher, "subscribe");
        self.registry.add(matcher, Rc::new(callback))
    }

    /// Remove every subscription whose matcher has the same text as
    /// `matcher`. Returns the number removed; zero is not an error.
    pub fn off(&mut self, matcher: impl Into<Matcher>) -> usize {
        let matcher = matcher.into();
        let removed = self.registry.remove(&matcher);
        debug!(%matcher, removed, "unsubscribe");
        removed
    }

    /// Remove the one subscription registered under `id`.
    pub fn off_id(&mut self, id: SubscriptionId) -> bool {
        self.registry.remove_id(id)
    }

    // -------------------------------------------------------------------
    // Internal
    // -------------------------------------------------------------------

    fn check_depth(&self, path: &str) -> Result<(), MonitorError> {
        if self.depth >= self.config.max_dispatch_depth {
            warn!(path, depth = self.depth, "dispatch depth exceeded, call rejected");
            return Err(MonitorError::DispatchDepthExceeded {
                path: path.to_string(),
                depth: self.depth,
            });
        }
        Ok(())
    }

    fn dispatch(&mut self, change: Change) {
        let targets = self.registry.matching(&change.path);
        let controller = self.controller.clone();
        debug!(
            path = %change.path,
            change = %change.change,
            subscribers = targets.len(),
            depth = self.depth,
            "dispatch"
        );

        self.depth += 1;
        if let Some(controller) = controller {
            controller(self, &change);
        }
        for callback in targets {
            callback(self, &change);
        }
        self.depth -= 1;
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::{Cell, RefCell};

    type Log = Rc<RefCell<Vec<Change>>>;

    fn fixed_clock() -> i64 {
        1_000
    }

    fn logging(monitor: &mut Monitor, matcher: impl Into<Matcher>) -> Log {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        monitor.on(matcher, move |_m, c| sink.borrow_mut().push(c.clone()));
        log
    }

    // ========================================================================
    // get
    // ========================================================================

    #[test]
    fn get_unknown_path_is_none() {
        let m = Monitor::new();
        assert_eq!(m.get("user.a").unwrap(), None);
        assert!(!m.has("user.a"));
    }

    #[test]
    fn get_on_supplied_root() {
        let m = Monitor::with_root(json!({"user": {"plength": 0}}));
        assert_eq!(m.get("user.plength").unwrap(), Some(&json!(0)));
        assert!(m.has(".user.plength."));
    }

    #[test]
    fn get_malformed_path_is_error() {
        let m = Monitor::new();
        assert_eq!(m.get(""), Err(MonitorError::EmptyPath));
        assert!(m.get("a..b").is_err());
        assert!(!m.has("a..b"));
    }

    // ========================================================================
    // set
    // ========================================================================

    #[test]
    fn set_new_path_is_add() {
        let mut m = Monitor::new().with_clock(fixed_clock);
        let log = logging(&mut m, "user.a");

        let root = m.set("user.a", true).unwrap();
        assert_eq!(root, &json!({"user": {"a": true}}));

        let log = log.borrow();
        assert_eq!(log.len(), 1);
        assert_eq!(
            log[0],
            Change {
                path: "user.a".into(),
                change: ChangeType::Add,
                new_value: Some(json!(true)),
                old_value: None,
                timestamp: 1_000,
            }
        );
    }

    #[test]
    fn set_existing_path_is_update_with_old_value() {
        let mut m = Monitor::new();
        let log = logging(&mut m, "n");
        m.set("n", 1).unwrap();
        m.set("n", 2).unwrap();

        let log = log.borrow();
        assert_eq!(log[1].change, ChangeType::Update);
        assert_eq!(log[1].old_value, Some(json!(1)));
        assert_eq!(log[1].new_value, Some(json!(2)));
    }

    #[test]
    fn set_on_preexisting_tree_value_is_update() {
        let mut m = Monitor::with_root(json!({"user": {"hexonly": false}}));
        let log = logging(&mut m, "user.hexonly");
        m.set("user.hexonly", true).unwrap();
        assert_eq!(log.borrow()[0].change, ChangeType::Update);
        assert_eq!(log.borrow()[0].old_value, Some(json!(false)));
    }

    #[test]
    fn set_records_cache_entry_under_exact_string() {
        let mut m = Monitor::new().with_clock(fixed_clock);
        m.set(".a.", 1).unwrap();
        let entry = m.cache_entry(".a.").unwrap();
        assert_eq!(entry.change, ChangeType::Add);
        assert_eq!(entry.value, json!(1));
        assert_eq!(entry.timestamp, 1_000);
        assert!(m.cache_entry("a").is_none());
    }

    #[test]
    fn set_dispatches_stripped_path() {
        let mut m = Monitor::new();
        let log = logging(&mut m, "a.b");
        m.set(".a.b.", 1).unwrap();
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(log.borrow()[0].path, "a.b");
    }

    #[test]
    fn cached_old_value_ignores_silent_writes() {
        let mut m = Monitor::new();
        let log = logging(&mut m, "a");
        m.set("a", 1).unwrap();
        m.root_mut()["a"] = json!(50);
        m.set("a", 2).unwrap();
        assert_eq!(log.borrow()[1].old_value, Some(json!(1)));
    }

    #[test]
    fn set_conflict_is_error_without_dispatch() {
        let mut m = Monitor::with_root(json!({"a": "scalar"}));
        let log = logging(&mut m, Matcher::pattern(".*").unwrap());
        let err = m.set("a.b", 1).unwrap_err();
        assert!(matches!(err, MonitorError::PathConflict { .. }));
        assert!(log.borrow().is_empty());
        assert!(m.cache_entry("a.b").is_none());
        assert_eq!(m.root(), &json!({"a": "scalar"}));
    }

    #[test]
    fn set_malformed_path_is_error() {
        let mut m = Monitor::new();
        assert_eq!(m.set("", 1).unwrap_err(), MonitorError::EmptyPath);
        assert!(m.set("a[x]", 1).is_err());
        assert_eq!(m.root(), &json!({}));
    }

    // ========================================================================
    // unset
    // ========================================================================

    #[test]
    fn unset_dispatches_delete_with_removed_value() {
        let mut m = Monitor::new();
        m.set("user.a", "v").unwrap();
        let log = logging(&mut m, "user.a");

        assert!(m.unset("user.a").unwrap());
        assert_eq!(m.get("user.a").unwrap(), None);

        let log = log.borrow();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].change, ChangeType::Delete);
        assert_eq!(log[0].new_value, None);
        assert_eq!(log[0].old_value, Some(json!("v")));
    }

    #[test]
    fn unset_missing_returns_false_silently() {
        let mut m = Monitor::new();
        let log = logging(&mut m, Matcher::pattern(".*").unwrap());
        assert!(!m.unset("nope").unwrap());
        assert!(!m.unset("a.b[3]").unwrap());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn unset_invalidates_cache_so_next_set_is_add() {
        let mut m = Monitor::new();
        let log = logging(&mut m, "a");
        m.set("a", 1).unwrap();
        m.unset("a").unwrap();
        assert!(m.cache_entry("a").is_none());

        m.set("a", 2).unwrap();
        let log = log.borrow();
        assert_eq!(log[2].change, ChangeType::Add);
        assert_eq!(log[2].old_value, None);
    }

    #[test]
    fn unset_preserves_falsy_siblings() {
        let mut m = Monitor::with_root(json!({"u": {"a": 0, "b": false}}));
        assert!(m.unset("u.a").unwrap());
        assert_eq!(m.root(), &json!({"u": {"b": false}}));
    }

    // ========================================================================
    // trigger
    // ========================================================================

    #[test]
    fn trigger_leaves_tree_but_records_cache_entry() {
        let mut m = Monitor::new().with_clock(fixed_clock);
        m.set("a", 1).unwrap();
        let before = m.root().clone();
        let log = logging(&mut m, "a");

        m.trigger("a", 9).unwrap();
        assert_eq!(m.root(), &before);
        let entry = m.cache_entry("a").unwrap();
        assert_eq!(entry.change, ChangeType::Trigger);
        assert_eq!(entry.value, json!(9));
        assert_eq!(entry.timestamp, 1_000);

        let log = log.borrow();
        assert_eq!(log[0].change, ChangeType::Trigger);
        assert_eq!(log[0].new_value, Some(json!(9)));
        assert_eq!(log[0].old_value, Some(json!(1)));
    }

    #[test]
    fn trigger_uses_live_value_when_uncached() {
        let mut m = Monitor::with_root(json!({"x": "live"}));
        let log = logging(&mut m, "x");
        m.trigger("x", false).unwrap();
        assert_eq!(log.borrow()[0].old_value, Some(json!("live")));
        assert_eq!(log.borrow()[0].new_value, Some(json!(false)));
    }

    #[test]
    fn trigger_on_missing_path_has_no_old_value() {
        let mut m = Monitor::new();
        let log = logging(&mut m, "ghost");
        m.trigger("ghost", Value::Null).unwrap();
        assert_eq!(log.borrow()[0].old_value, None);
        assert_eq!(m.get("ghost").unwrap(), None);
    }

    #[test]
    fn set_after_trigger_reports_triggered_value_as_old() {
        let mut m = Monitor::new();
        let log = logging(&mut m, "k");
        m.trigger("k", "pending").unwrap();
        m.set("k", "done").unwrap();

        let log = log.borrow();
        assert_eq!(log[1].change, ChangeType::Update);
        assert_eq!(log[1].old_value, Some(json!("pending")));
        assert_eq!(m.cache_entry("k").unwrap().change, ChangeType::Update);
    }

    // ========================================================================
    // Dispatch order / controller
    // ========================================================================

    #[test]
    fn controller_then_exact_then_pattern() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let o = Rc::clone(&order);
        let mut m = Monitor::new().with_controller(move |_m, _c| o.borrow_mut().push("C"));

        let o = Rc::clone(&order);
        m.on(Matcher::pattern("^p").unwrap(), move |_m, _c| o.borrow_mut().push("R"));
        let o = Rc::clone(&order);
        m.on("path", move |_m, _c| o.borrow_mut().push("S"));

        m.set("path", 1).unwrap();
        assert_eq!(*order.borrow(), vec!["C", "S", "R"]);
    }

    #[test]
    fn controller_sees_every_change() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let mut m = Monitor::new().with_controller(move |_m, c| s.borrow_mut().push(c.change));

        m.set("a", 1).unwrap();
        m.set("a", 2).unwrap();
        m.trigger("a", 3).unwrap();
        m.unset("a").unwrap();
        assert_eq!(
            *seen.borrow(),
            vec![
                ChangeType::Add,
                ChangeType::Update,
                ChangeType::Trigger,
                ChangeType::Delete
            ]
        );
    }

    #[test]
    fn duplicate_patterns_each_fire_once() {
        let mut m = Monitor::new();
        let hits = Rc::new(Cell::new(0));
        for _ in 0..2 {
            let h = Rc::clone(&hits);
            m.on(Matcher::pattern(r"^user\.").unwrap(), move |_m, _c| h.set(h.get() + 1));
        }
        m.set("user.a", true).unwrap();
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn pattern_matches_independent_of_history() {
        let mut m = Monitor::new();
        let log = logging(&mut m, Matcher::pattern("a").unwrap());
        for i in 0..4 {
            m.set("a", i).unwrap();
            m.set("ba", i).unwrap();
        }
        assert_eq!(log.borrow().len(), 8);
    }

    // ========================================================================
    // off
    // ========================================================================

    #[test]
    fn off_exact_leaves_other_matchers() {
        let mut m = Monitor::new();
        let exact = logging(&mut m, "a");
        let pattern = logging(&mut m, Matcher::pattern("^a$").unwrap());

        assert_eq!(m.off("a"), 1);
        m.set("a", 1).unwrap();
        assert!(exact.borrow().is_empty());
        assert_eq!(pattern.borrow().len(), 1);
    }

    #[test]
    fn off_pattern_by_source_text() {
        let mut m = Monitor::new();
        let log = logging(&mut m, Matcher::pattern("^a").unwrap());
        assert_eq!(m.off(Matcher::pattern("^(?:a)").unwrap()), 0);
        assert_eq!(m.off(regex::Regex::new("^a").unwrap()), 1);
        m.set("a", 1).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn off_unregistered_is_noop() {
        let mut m = Monitor::new();
        assert_eq!(m.off("never"), 0);
        assert_eq!(m.subscription_count(), 0);
    }

    #[test]
    fn off_id_removes_one_duplicate() {
        let mut m = Monitor::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let id = m.on("a", move |_m, _c| h.set(h.get() + 1));
        let h = Rc::clone(&hits);
        m.on("a", move |_m, _c| h.set(h.get() + 10));

        assert!(m.off_id(id));
        m.set("a", 1).unwrap();
        assert_eq!(hits.get(), 10);
    }

    // ========================================================================
    // Reentrancy
    // ========================================================================

    #[test]
    fn callback_can_set_other_path() {
        let mut m = Monitor::new();
        m.on("x", |m, c| {
            let v = c.new_value.clone().unwrap_or(Value::Null);
            m.set("y", v).unwrap();
        });
        let y_log = logging(&mut m, "y");

        m.set("x", 5).unwrap();
        assert_eq!(m.get("y").unwrap(), Some(&json!(5)));
        assert_eq!(y_log.borrow().len(), 1);
    }

    #[test]
    fn subscriptions_added_during_dispatch_wait_for_next_dispatch() {
        let mut m = Monitor::new();
        let late = Rc::new(Cell::new(0));
        let l = Rc::clone(&late);
        m.on("x", move |m, _c| {
            let l = Rc::clone(&l);
            m.on("x", move |_m, _c| l.set(l.get() + 1));
        });

        m.set("x", 1).unwrap();
        assert_eq!(late.get(), 0);
        m.set("x", 2).unwrap();
        assert_eq!(late.get(), 1);
    }

    #[test]
    fn removal_during_dispatch_does_not_skip_snapshot() {
        let mut m = Monitor::new();
        let second = Rc::new(Cell::new(0));
        m.on("x", |m, _c| {
            m.off("x");
        });
        let s = Rc::clone(&second);
        m.on("x", move |_m, _c| s.set(s.get() + 1));

        m.set("x", 1).unwrap();
        assert_eq!(second.get(), 1);
        assert_eq!(m.subscription_count(), 0);
        m.set("x", 2).unwrap();
        assert_eq!(second.get(), 1);
    }

    #[test]
    fn self_feeding_cascade_is_bounded() {
        let mut m = Monitor::new().with_config(MonitorConfig {
            max_dispatch_depth: 5,
        });
        let rejected = Rc::new(Cell::new(false));
        let r = Rc::clone(&rejected);
        m.on("n", move |m, c| {
            let n = c.new_value.as_ref().and_then(Value::as_i64).unwrap_or(0);
            if let Err(MonitorError::DispatchDepthExceeded { depth, .. }) = m.set("n", n + 1) {
                assert_eq!(depth, 5);
                r.set(true);
            }
        });

        m.set("n", 0).unwrap();
        assert!(rejected.get());
        assert_eq!(m.get("n").unwrap(), Some(&json!(4)));
        assert_eq!(m.depth(), 0);
    }

    #[test]
    fn depth_visible_inside_callbacks() {
        let mut m = Monitor::new();
        let seen = Rc::new(Cell::new(0));
        let s = Rc::clone(&seen);
        m.on("a", move |m, _c| s.set(m.depth()));
        m.set("a", 1).unwrap();
        assert_eq!(seen.get(), 1);
    }

    // ========================================================================
    // Misc
    // ========================================================================

    #[test]
    fn clear_cache_reclassifies_from_tree() {
        let mut m = Monitor::new();
        let log = logging(&mut m, "a");
        m.set("a", 1).unwrap();
        m.root_mut()["a"] = json!(7);
        m.clear_cache();
        m.set("a", 2).unwrap();
        assert_eq!(log.borrow()[1].old_value, Some(json!(7)));
    }

    #[test]
    fn into_root_returns_tree() {
        let mut m = Monitor::default();
        m.set("a.b[0].c", 5).unwrap();
        assert_eq!(m.into_root(), json!({"a": {"b": [{"c": 5}]}}));
    }
}
