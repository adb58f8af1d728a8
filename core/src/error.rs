//! Error types for the Monitor engine and its configuration.
//!
//! A path that simply doesn't resolve is never an error here: `get` returns
//! `None` and `unset` returns `false`. These variants cover paths that can't
//! be interpreted at all, writes that would have to clobber existing data,
//! and runaway dispatch cascades.

use std::path::PathBuf;

use thiserror::Error;


#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// The path was empty once the leading/trailing delimiter was stripped.
    #[error("empty path")]
    EmptyPath,

    /// The path text does not follow `name[idx].name...` syntax.
    #[error("malformed path '{path}': {reason}")]
    MalformedPath { path: String, reason: String },

    /// `set` would have to replace an existing value of the wrong kind to
    /// reach the leaf (e.g. index into a mapping, property on a scalar).
    #[error("path conflict at '{segment}' in '{path}': existing value is not the required container")]
    PathConflict { path: String, segment: String },

    /// A pattern matcher failed to compile.
    #[error("invalid pattern '{source_text}': {message}")]
    InvalidPattern { source_text: String, message: String },

    /// A callback cascade nested deeper than the configured bound.
    #[error("dispatch depth {depth} exceeded while handling '{path}'")]
    DispatchDepthExceeded { path: String, depth: usize },
}

impl MonitorError {
    pub(crate) fn malformed(path: &str, reason: impl Into<String>) -> Self {
        MonitorError::MalformedPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}


#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}
