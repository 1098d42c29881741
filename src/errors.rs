//! Kinded errors with propagation context.
//!
//! Every fallible operation in the crate returns [`Error`]. An error carries
//! a classification [`Kind`], an optional operation breadcrumb (e.g.
//! `"eventstore/PgStore.save"`), an optional aggregate id, and the error that
//! triggered it. Wrapping an [`Error`] in another [`Error`] deduplicates
//! adjacent identical ids and kinds, and lifts the innermost classified kind
//! into an outer `Other` so that [`Error::is`] sees through bare wrappers.

use std::fmt;

use crate::model::Id;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of an [`Error`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Kind {
    /// Unclassified error. Not printed in the error message.
    #[default]
    Other,
    /// Invalid operation for this type of item.
    Invalid,
    /// Permission denied.
    Permission,
    /// External I/O error such as network failure.
    Io,
    /// Item already exists.
    Duplicate,
    /// Item not found.
    NotFound,
    /// Information withheld.
    Private,
    /// Internal error or inconsistency.
    Internal,
    /// A transient error.
    Transient,
}

impl Kind {
    fn as_str(&self) -> &'static str {
        match self {
            Kind::Other => "other error",
            Kind::Invalid => "invalid operation",
            Kind::Permission => "permission denied",
            Kind::Io => "I/O error",
            Kind::Duplicate => "item already exists",
            Kind::NotFound => "item not found",
            Kind::Private => "information withheld",
            Kind::Internal => "internal error",
            Kind::Transient => "transient error",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The cause chained below an [`Error`].
#[derive(Debug)]
enum Source {
    /// A nested error of our own type.
    Nested(Box<Error>),
    /// An error from an external crate (sqlx, redis, serde, ...).
    External(Box<dyn std::error::Error + Send + Sync>),
    /// A plain text message.
    Message(String),
}

/// Error with kind, operation breadcrumb, and cause chain.
#[derive(Debug, Default)]
pub struct Error {
    id: Option<Id>,
    op: Option<&'static str>,
    kind: Kind,
    source: Option<Source>,
}

impl Error {
    /// Start a new error of the given kind.
    pub fn new(kind: Kind) -> Self {
        Error {
            kind,
            ..Error::default()
        }
    }

    /// Attach an operation breadcrumb, usually `"module/Type.method"`.
    pub fn op(mut self, op: &'static str) -> Self {
        self.op = Some(op);
        self
    }

    /// Attach the aggregate id the error concerns.
    pub fn id(mut self, id: Id) -> Self {
        self.id = Some(id);
        self
    }

    /// Attach a plain text message as the cause.
    pub fn msg(mut self, text: impl Into<String>) -> Self {
        self.source = Some(Source::Message(text.into()));
        self
    }

    /// Attach an external error as the cause.
    pub fn with(mut self, err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        self.source = Some(Source::External(err.into()));
        self
    }

    /// Wrap a nested [`Error`], suppressing duplicated context.
    ///
    /// Adjacent identical ids and kinds are cleared from the inner error so
    /// the rendered chain never repeats itself, and when the outer error is
    /// unclassified the inner kind is lifted up.
    pub fn wrap(mut self, mut inner: Error) -> Self {
        if inner.id == self.id {
            inner.id = None;
        }
        if inner.kind == self.kind {
            inner.kind = Kind::Other;
        }
        if self.kind == Kind::Other {
            self.kind = inner.kind;
            inner.kind = Kind::Other;
        }
        self.source = Some(Source::Nested(Box::new(inner)));
        self
    }

    /// The classification of this error, walking past unclassified wrappers.
    pub fn kind(&self) -> Kind {
        if self.kind != Kind::Other {
            return self.kind;
        }
        match &self.source {
            Some(Source::Nested(inner)) => inner.kind(),
            _ => Kind::Other,
        }
    }

    /// Whether `err` is classified as `kind` anywhere in its chain.
    pub fn is(kind: Kind, err: &Error) -> bool {
        err.kind() == kind
    }

    /// The innermost message of the chain, for client-facing responses.
    pub fn deepest_message(&self) -> String {
        match &self.source {
            Some(Source::Nested(inner)) => inner.deepest_message(),
            Some(Source::External(err)) => err.to_string(),
            Some(Source::Message(text)) => text.clone(),
            None => self.kind.to_string(),
        }
    }

    fn is_zero(&self) -> bool {
        self.id.is_none() && self.op.is_none() && self.kind == Kind::Other && self.source.is_none()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sep = "";
        if let Some(op) = self.op {
            write!(f, "{op}")?;
            sep = ": ";
        }
        if let Some(id) = &self.id {
            write!(f, "{sep}{id}")?;
            sep = ": ";
        }
        if self.kind != Kind::Other {
            write!(f, "{sep}{}", self.kind)?;
            sep = ": ";
        }
        match &self.source {
            Some(Source::Nested(inner)) if !inner.is_zero() => write!(f, "{sep}{inner}")?,
            Some(Source::External(err)) => write!(f, "{sep}{err}")?,
            Some(Source::Message(text)) => write!(f, "{sep}{text}")?,
            _ => {
                if sep.is_empty() {
                    write!(f, "no error")?;
                }
            }
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.source {
            Some(Source::Nested(inner)) => Some(inner.as_ref()),
            Some(Source::External(err)) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::new(Kind::Internal).with(err)
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::new(Kind::Internal).with(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::new(Kind::Internal).with(err)
    }
}
