//! Passgen core: a path-observing Monitor store and the password-generator
//! option board built on it.
//!
//! - `monitor`: the observable tree with `get`/`set`/`unset`/`trigger`, change
//!   classification, exact and pattern subscriptions.
//! - `options`: the generator's option rules, expressed as subscriptions.
//! - `generator`: charset assembly and random selection.
//! - `prefs`: saved preferences kept in step with the board.
//! - `config`: YAML configuration.

pub mod config;
pub mod error;
pub mod generator;
pub mod monitor;
pub mod options;
pub mod prefs;

pub use config::{AppConfig, MonitorConfig};
pub use error::{ConfigError, MonitorError};
pub use monitor::{Change, ChangeType, Matcher, Monitor, SubscriptionId};
