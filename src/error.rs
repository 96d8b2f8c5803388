use std::fmt;
use std::io;
use std::ops::{BitOr, BitOrAssign};

use serde_json::{json, Value};
use thiserror::Error;

/// Errors raised while registering routes.
///
/// A route table that produced any of these must not be served; callers
/// propagate them with `?` before handing the dispatcher to a server.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// The pattern does not start with `/`.
    #[error("path must begin with '/' in path '{0}'")]
    MissingLeadingSlash(String),

    /// The HTTP method was an empty string.
    #[error("HTTP method can not be empty")]
    EmptyMethod,

    /// The HTTP method is not a valid token.
    #[error("invalid HTTP method '{0}'")]
    InvalidMethod(String),

    /// A route was registered without any handler.
    #[error("there must be at least one handler for path '{0}'")]
    NoHandlers(String),

    /// The combined chain is too long to be aborted reliably.
    #[error("too many handlers for path '{path}': {count} (max {max})")]
    TooManyHandlers { path: String, count: usize, max: usize },

    /// The same pattern was registered twice for one method.
    #[error("handlers are already registered for path '{0}'")]
    Duplicate(String),

    /// `:` or `*` with no name after it.
    #[error("wildcards must be named with a non-empty name in path '{0}'")]
    UnnamedWildcard(String),

    /// Two wildcards inside a single path segment.
    #[error("only one wildcard per path segment is allowed, has: '{segment}' in path '{path}'")]
    MultipleWildcards { segment: String, path: String },

    /// A catch-all followed by more pattern.
    #[error("catch-all routes are only allowed at the end of the path in path '{0}'")]
    CatchAllNotLast(String),

    /// A catch-all that does not start its own segment.
    #[error("no / before catch-all in path '{0}'")]
    CatchAllWithoutSlash(String),

    /// A wildcard clashes with a differently named wildcard at the same position.
    #[error("'{wildcard}' in new path '{path}' conflicts with existing wildcard '{existing}'")]
    WildcardConflict {
        wildcard: String,
        existing: String,
        path: String,
    },

    /// A mid-segment param would share its segment with static routes.
    #[error("'{wildcard}' in path '{path}' shares its path segment with existing static routes")]
    SegmentConflict { wildcard: String, path: String },
}

/// Errors raised while binding or running the HTTP server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid listen address '{0}'")]
    Address(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("http server error: {0}")]
    Hyper(#[from] hyper::Error),
}

/// Represents errors that can occur while running jobs on the worker pool.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Error when a mutex lock becomes poisoned due to a panic in another thread
    #[error("mutex lock poisoned")]
    LockPoisoned,

    /// Error when spawning a new thread fails
    #[error("thread spawn failed: {0}")]
    ThreadSpawn(io::Error),
}

/// Type alias for Results using ExecutorError as the error type
pub type Result<T> = std::result::Result<T, ExecutorError>;

/// Classification bit-set attached to every [`ChainError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorKind(u64);

impl ErrorKind {
    /// Request decoding failed.
    pub const BIND: ErrorKind = ErrorKind(1 << 63);
    /// Response rendering failed.
    pub const RENDER: ErrorKind = ErrorKind(1 << 62);
    /// Internal detail, logged but never shown to the client.
    pub const PRIVATE: ErrorKind = ErrorKind(1 << 0);
    /// Safe to expose to the client.
    pub const PUBLIC: ErrorKind = ErrorKind(1 << 1);
    /// Matches every kind.
    pub const ANY: ErrorKind = ErrorKind(u64::MAX);

    pub fn bits(self) -> u64 {
        self.0
    }

    /// Returns true if any bit of `other` is set in `self`.
    pub fn intersects(self, other: ErrorKind) -> bool {
        self.0 & other.0 != 0
    }
}

impl Default for ErrorKind {
    fn default() -> Self {
        ErrorKind::PRIVATE
    }
}

impl BitOr for ErrorKind {
    type Output = ErrorKind;

    fn bitor(self, rhs: ErrorKind) -> ErrorKind {
        ErrorKind(self.0 | rhs.0)
    }
}

impl BitOrAssign for ErrorKind {
    fn bitor_assign(&mut self, rhs: ErrorKind) {
        self.0 |= rhs.0;
    }
}

/// An error recorded by a handler on its request context.
#[derive(Debug)]
pub struct ChainError {
    err: Box<dyn std::error::Error + Send + Sync>,
    kind: ErrorKind,
    meta: Option<Value>,
}

impl ChainError {
    pub fn new(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self {
            err: err.into(),
            kind: ErrorKind::default(),
            meta: None,
        }
    }

    /// Replaces the classification of this error.
    pub fn set_kind(&mut self, kind: ErrorKind) -> &mut Self {
        self.kind = kind;
        self
    }

    /// Attaches arbitrary metadata, rendered alongside the message.
    pub fn set_meta(&mut self, meta: impl Into<Value>) -> &mut Self {
        self.meta = Some(meta.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn meta(&self) -> Option<&Value> {
        self.meta.as_ref()
    }

    pub fn is_kind(&self, kind: ErrorKind) -> bool {
        self.kind.intersects(kind)
    }

    /// Renders the error as JSON.
    ///
    /// Object metadata is merged into the output; any other metadata is placed
    /// under `meta`. The message is stored under `error` unless the metadata
    /// already provides one.
    pub fn to_json(&self) -> Value {
        let mut out = match &self.meta {
            Some(Value::Object(map)) => Value::Object(map.clone()),
            Some(other) => json!({ "meta": other }),
            None => json!({}),
        };
        if let Value::Object(map) = &mut out {
            map.entry("error")
                .or_insert_with(|| Value::String(self.err.to_string()));
        }
        out
    }
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.err, f)
    }
}

impl std::error::Error for ChainError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.err.as_ref())
    }
}

/// The ordered list of errors recorded during one request.
#[derive(Debug, Default)]
pub struct ErrorList {
    errors: Vec<ChainError>,
}

impl ErrorList {
    pub(crate) fn push(&mut self, err: ChainError) -> &mut ChainError {
        self.errors.push(err);
        let last = self.errors.len() - 1;
        &mut self.errors[last]
    }

    pub(crate) fn clear(&mut self) {
        self.errors.clear();
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChainError> {
        self.errors.iter()
    }

    /// The errors whose kind intersects `kind`, in recording order.
    pub fn by_kind(&self, kind: ErrorKind) -> Vec<&ChainError> {
        self.errors.iter().filter(|e| e.is_kind(kind)).collect()
    }

    /// The most recently recorded error.
    pub fn last(&self) -> Option<&ChainError> {
        self.errors.last()
    }

    /// All messages in recording order.
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    /// A single object for one error, an array for several, null for none.
    pub fn to_json(&self) -> Value {
        json_for(self.errors.iter())
    }
}

/// Shared rendering for whole lists and filtered views.
pub(crate) fn json_for<'a>(errors: impl ExactSizeIterator<Item = &'a ChainError>) -> Value {
    match errors.len() {
        0 => Value::Null,
        1 => errors.map(ChainError::to_json).next().unwrap_or(Value::Null),
        _ => Value::Array(errors.map(ChainError::to_json).collect()),
    }
}

/// Numbered listing, one error per line.
pub(crate) fn write_listing<'a>(
    f: &mut impl fmt::Write,
    errors: impl Iterator<Item = &'a ChainError>,
) -> fmt::Result {
    for (i, err) in errors.enumerate() {
        writeln!(f, "Error #{:02}: {}", i + 1, err)?;
        if let Some(meta) = &err.meta {
            writeln!(f, "     Meta: {}", meta)?;
        }
    }
    Ok(())
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_listing(f, self.errors.iter())
    }
}

impl<'a> IntoIterator for &'a ErrorList {
    type Item = &'a ChainError;
    type IntoIter = std::slice::Iter<'a, ChainError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}
