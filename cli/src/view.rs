//! Option table for the terminal.
//!
//! The view subscribes to `user.*` like any other collaborator and marks the
//! options that changed during this run; the on/off state itself is read
//! from the tree when rendering.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use passgen_core::monitor::{ChangeType, Matcher, Monitor};
use passgen_core::options::{self, PLENGTH, TOGGLES, UI_ENABLED};
use passgen_core::MonitorError;
use serde_json::Value;


pub struct OptionView {
    changed: Rc<RefCell<BTreeSet<String>>>,
}

impl OptionView {
    pub fn attach(monitor: &mut Monitor) -> Result<Self, MonitorError> {
        let changed = Rc::new(RefCell::new(BTreeSet::new()));
        let sink = Rc::clone(&changed);
        monitor.on(Matcher::pattern(r"^user\.")?, move |_m, c| {
            if c.change != ChangeType::Update {
                return;
            }
            if let Some(name) = options::option_name(&c.path) {
                sink.borrow_mut().insert(name.to_string());
            }
        });
        Ok(OptionView { changed })
    }

    /// Options updated since the view was attached.
    pub fn changed(&self) -> Vec<String> {
        self.changed.borrow().iter().cloned().collect()
    }

    pub fn render(&self, monitor: &Monitor) -> String {
        let changed = self.changed.borrow();
        let mut out = String::new();
        for name in TOGGLES {
            let state = match monitor.get(&options::user_path(name)) {
                Ok(Some(Value::Bool(true))) => "on",
                Ok(Some(Value::Bool(false))) => "off",
                _ => "-",
            };
            let mark = if changed.contains(name) { " *" } else { "" };
            out.push_str(&format!("  {:<12} {}{}\n", name, state, mark));
        }
        let length = monitor
            .get(&options::user_path(PLENGTH))
            .ok()
            .flatten()
            .map_or_else(|| "-".to_string(), |v| v.to_string());
        let mark = if changed.contains(PLENGTH) { " *" } else { "" };
        out.push_str(&format!("  {:<12} {}{}\n", PLENGTH, length, mark));
        if !matches!(monitor.get(UI_ENABLED), Ok(Some(Value::Bool(true)))) {
            out.push_str("  (no character class enabled)\n");
        }
        out
    }
}
