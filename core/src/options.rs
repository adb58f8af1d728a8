//! Option board: the generator's settings kept in a Monitor tree.
//!
//! Tree layout:
//!
//! ```text
//! user.<option>   live settings (booleans, plus `plength`)
//! defaults.*      the values `turn_on_defaults` copies into `user`
//! ui_enabled      true while at least one character class is on
//! active          generation on/off
//! store           mirror of `user.preferences`; gates preference saving
//! password        last generated password (null if none could be made)
//! ```
//!
//! `install` registers the rules that keep these consistent. They run as
//! ordinary subscriptions and re-enter the Monitor to apply their effects.

use std::cell::RefCell;
use std::rc::Rc;

use rand::rngs::StdRng;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::MonitorError;
use crate::generator::{self, GeneratorOptions};
use crate::monitor::{Change, ChangeType, Matcher, Monitor};


pub const USER: &str = "user";
pub const DEFAULTS: &str = "defaults";
pub const UI_ENABLED: &str = "ui_enabled";
pub const ACTIVE: &str = "active";
pub const STORE: &str = "store";
pub const PASSWORD: &str = "password";

pub const PREFERENCES: &str = "preferences";
pub const HEXONLY: &str = "hexonly";
pub const PLENGTH: &str = "plength";

/// Boolean options, in display order.
pub const TOGGLES: [&str; 11] = [
    PREFERENCES,
    "ambiguous",
    "enclosures",
    "lowercase",
    "numbers",
    "punctuation",
    "similar",
    "spaces",
    "symbols",
    "uppercase",
    HEXONLY,
];


/// Default `user.*` values.
pub fn default_user() -> Value {
    json!({
        "preferences": false,
        "ambiguous": true,
        "enclosures": true,
        "lowercase": true,
        "numbers": true,
        "punctuation": true,
        "similar": true,
        "spaces": false,
        "symbols": true,
        "uppercase": true,
        "hexonly": false,
        "plength": 20
    })
}

/// A fresh tree for the board.
pub fn initial_root() -> Value {
    json!({
        "user": {},
        "defaults": default_user(),
        "ui_enabled": true,
        "active": false,
        "store": false
    })
}

pub fn user_path(option: &str) -> String {
    format!("{}.{}", USER, option)
}

/// The option name of a `user.<name>` path.
pub fn option_name(path: &str) -> Option<&str> {
    path.strip_prefix("user.")
}


/// Register the board's rules on `monitor`. Generation draws from `rng`.
pub fn install(monitor: &mut Monitor, rng: StdRng) -> Result<(), MonitorError> {
    let rng = Rc::new(RefCell::new(rng));

    // Turning hexonly on switches every character class off. Only an update
    // to true counts; switching hexonly off leaves the other options alone.
    monitor.on(Matcher::pattern(r"^user\.hexonly$")?, |m, c| {
        if c.change != ChangeType::Update || c.new_value != Some(Value::Bool(true)) {
            return;
        }
        for name in TOGGLES {
            if name == PREFERENCES || name == HEXONLY {
                continue;
            }
            if m.has(&user_path(name)) {
                report(m.set(&user_path(name), false));
            }
        }
    });

    // Turning a character class on clears hexonly without notifying anyone.
    monitor.on(Matcher::pattern(r"^user\.")?, |m, c| {
        let excluded = matches!(
            option_name(&c.path),
            Some(PREFERENCES) | Some(HEXONLY) | Some(PLENGTH)
        );
        if excluded || c.change != ChangeType::Update || c.new_value != Some(Value::Bool(true)) {
            return;
        }
        if let Some(user) = m.root_mut().get_mut(USER).and_then(Value::as_object_mut) {
            if user.get(HEXONLY) == Some(&Value::Bool(true)) {
                debug!(cause = %c.path, "clearing hexonly");
                user.insert(HEXONLY.to_string(), Value::Bool(false));
            }
        }
    });

    // Any user change: regenerate if active, then recompute ui_enabled.
    let r = Rc::clone(&rng);
    monitor.on(Matcher::pattern(r"^user\.")?, move |m, c| {
        if c.change == ChangeType::Delete {
            return;
        }
        if is_true(m, ACTIVE) {
            regenerate(m, &r);
        }
        let enabled = any_class_enabled(m);
        report(m.set(UI_ENABLED, enabled));
    });

    // Activation generates immediately.
    let r = Rc::clone(&rng);
    monitor.on(ACTIVE, move |m, c| {
        if c.new_value == Some(Value::Bool(true)) {
            regenerate(m, &r);
        }
    });

    // The preferences toggle decides whether settings are stored.
    monitor.on(user_path(PREFERENCES), |m, c| {
        if c.change == ChangeType::Delete {
            return;
        }
        let store = c.new_value.clone().unwrap_or(Value::Bool(false));
        report(m.set(STORE, store));
    });

    Ok(())
}


/// Copy every `defaults.*` value into `user.*`.
pub fn turn_on_defaults(monitor: &mut Monitor) -> Result<(), MonitorError> {
    let defaults = match monitor.get(DEFAULTS)? {
        Some(Value::Object(map)) => map.clone(),
        _ => return Ok(()),
    };
    for (name, value) in defaults {
        monitor.set(&user_path(&name), value)?;
    }
    Ok(())
}

/// Back to defaults: clear user settings, forget cached writes, reapply
/// defaults, re-activate.
pub fn reset(monitor: &mut Monitor) -> Result<(), MonitorError> {
    let names: Vec<String> = match monitor.get(DEFAULTS)? {
        Some(Value::Object(map)) => map.keys().cloned().collect(),
        _ => Vec::new(),
    };
    for name in &names {
        monitor.unset(&user_path(name))?;
    }
    monitor.set(ACTIVE, false)?;
    monitor.clear_cache();
    turn_on_defaults(monitor)?;
    monitor.set(ACTIVE, true)?;
    Ok(())
}

/// Flip a boolean option. Returns the new value.
pub fn toggle(monitor: &mut Monitor, option: &str) -> Result<bool, MonitorError> {
    let path = user_path(option);
    let next = !is_true(monitor, &path);
    monitor.set(&path, next)?;
    Ok(next)
}

/// Set a boolean option explicitly.
pub fn set_option(monitor: &mut Monitor, option: &str, on: bool) -> Result<(), MonitorError> {
    monitor.set(&user_path(option), on)?;
    Ok(())
}

/// Set the password length, clamped to the accepted range.
pub fn set_length(monitor: &mut Monitor, length: u64) -> Result<u64, MonitorError> {
    let length = generator::clamp_length(length);
    monitor.set(&user_path(PLENGTH), length)?;
    Ok(length)
}

/// Current generator settings read from `user`.
pub fn current_options(monitor: &Monitor) -> GeneratorOptions {
    match monitor.get(USER) {
        Ok(Some(user)) => GeneratorOptions::from_value(user).unwrap_or_else(|e| {
            warn!(error = %e, "unreadable user options, using defaults");
            GeneratorOptions::default()
        }),
        _ => GeneratorOptions::default(),
    }
}

/// The last generated password.
pub fn password(monitor: &Monitor) -> Option<&str> {
    monitor.get(PASSWORD).ok().flatten().and_then(Value::as_str)
}

/// True if any character class (anything except `preferences`, `similar`
/// and `plength`) is switched on.
pub fn any_class_enabled(monitor: &Monitor) -> bool {
    match monitor.get(USER) {
        Ok(Some(Value::Object(user))) => user.iter().any(|(name, value)| {
            !matches!(name.as_str(), PREFERENCES | "similar" | PLENGTH) && value == &Value::Bool(true)
        }),
        _ => false,
    }
}


// ---------------------------------------------------------------------------
// Internal
// ---------------------------------------------------------------------------

fn is_true(monitor: &Monitor, path: &str) -> bool {
    matches!(monitor.get(path), Ok(Some(Value::Bool(true))))
}

fn regenerate(monitor: &mut Monitor, rng: &RefCell<StdRng>) {
    let opts = current_options(monitor);
    let result = generator::generate(&opts, &mut *rng.borrow_mut());
    let value = match result {
        Ok(pw) => Value::String(pw),
        Err(e) => {
            debug!(error = %e, "no password generated");
            Value::Null
        }
    };
    report(monitor.set(PASSWORD, value));
}

fn report<T>(result: Result<T, MonitorError>) {
    if let Err(e) = result {
        warn!(error = %e, "option rule could not apply its change");
    }
}

/// Log line for a change, used by the CLI's verbose controller.
pub fn describe(change: &Change) -> String {
    let show = |v: &Option<Value>| v.as_ref().map_or_else(|| "-".to_string(), |v| v.to_string());
    format!(
        "{:<7} {} {} -> {}",
        change.change,
        change.path,
        show(&change.old_value),
        show(&change.new_value)
    )
}
