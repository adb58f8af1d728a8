//! Saved preferences: a flat JSON object of option name to value.
//!
//! `attach` keeps the file in step with the option board. While `store` is
//! true every user change rewrites the file; when `store` goes false the
//! file is wiped.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::MonitorError;
use crate::monitor::{ChangeType, Matcher, Monitor};
use crate::options::{self, ACTIVE, STORE, USER};


#[derive(Error, Debug)]
pub enum PrefsError {
    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid preferences in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}


#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: PathBuf,
    values: BTreeMap<String, Value>,
}

impl PreferenceStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PrefsError> {
        let path = path.into();
        let values = if path.exists() {
            let text = std::fs::read_to_string(&path).map_err(|source| PrefsError::Io {
                path: path.clone(),
                source,
            })?;
            if text.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&text).map_err(|source| PrefsError::Json {
                    path: path.clone(),
                    source,
                })?
            }
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), entries = values.len(), "preferences opened");
        Ok(PreferenceStore { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Replace the saved values with the scalar entries of `user`.
    /// Strings, nulls and containers are not saved.
    pub fn capture(&mut self, user: &Value) {
        self.values = match user {
            Value::Object(map) => map
                .iter()
                .filter(|(_, v)| v.is_boolean() || v.is_number())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            _ => BTreeMap::new(),
        };
    }

    pub fn save(&self) -> Result<(), PrefsError> {
        let text = serde_json::to_string_pretty(&self.values).map_err(|source| PrefsError::Json {
            path: self.path.clone(),
            source,
        })?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| PrefsError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        std::fs::write(&self.path, text).map_err(|source| PrefsError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Forget everything and remove the file.
    pub fn clear(&mut self) -> Result<(), PrefsError> {
        self.values.clear();
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PrefsError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Write every saved value back through `set`, so the board's rules see
    /// them as ordinary changes.
    pub fn restore(&self, monitor: &mut Monitor) -> Result<(), MonitorError> {
        for (name, value) in &self.values {
            monitor.set(&options::user_path(name), value.clone())?;
        }
        Ok(())
    }
}


/// Subscribe `store` to the board in `monitor`.
pub fn attach(store: &Rc<RefCell<PreferenceStore>>, monitor: &mut Monitor) -> Result<(), MonitorError> {
    let s = Rc::clone(store);
    monitor.on(Matcher::pattern(r"^user\.")?, move |m, c| {
        if c.change == ChangeType::Delete {
            return;
        }
        if !matches!(m.get(STORE), Ok(Some(Value::Bool(true)))) {
            return;
        }
        let user = match m.get(USER) {
            Ok(Some(user)) => user.clone(),
            _ => return,
        };
        let mut prefs = s.borrow_mut();
        prefs.capture(&user);
        if let Err(e) = prefs.save() {
            warn!(error = %e, "preferences not saved");
        }
    });

    // Only a real true -> false transition wipes the file.
    let s = Rc::clone(store);
    monitor.on(STORE, move |_m, c| {
        if c.old_value != Some(Value::Bool(true)) || c.new_value != Some(Value::Bool(false)) {
            return;
        }
        if let Err(e) = s.borrow_mut().clear() {
            warn!(error = %e, "preferences not cleared");
        }
    });

    Ok(())
}


/// Bring an installed board up: defaults first, then the values saved in
/// `store` on top (skipped when `fresh`), then activate.
///
/// The saved values are snapshotted before the defaults go in, so nothing
/// the defaults trigger can change what gets restored.
pub fn start(
    store: &Rc<RefCell<PreferenceStore>>,
    monitor: &mut Monitor,
    fresh: bool,
) -> Result<(), MonitorError> {
    let saved = store.borrow().clone();
    options::turn_on_defaults(monitor)?;
    if fresh {
        debug!("starting from defaults");
    } else {
        debug!(entries = saved.values().len(), "restoring preferences");
        saved.restore(monitor)?;
    }
    monitor.set(ACTIVE, true)?;
    Ok(())
}
