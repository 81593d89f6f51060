use std::fmt;

/// Error kind for replication errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Schema,
    Decode,
    Io,
    Unsupported,
}

/// Replication error — returned by every collaborator trait method.
#[derive(Debug)]
pub struct ReplicaError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ReplicaError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Config, message: msg.into() }
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Schema, message: msg.into() }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Decode, message: msg.into() }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Io, message: msg.into() }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Unsupported, message: msg.into() }
    }

    /// Add context to the error, preserving the original ErrorKind.
    ///
    /// Produces: `"context: original message"`.
    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{ctx}: {}", self.message),
        }
    }
}

impl fmt::Display for ReplicaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ReplicaError {}

// ---------------------------------------------------------------------------
// From impls: standard error types → ReplicaError with correct ErrorKind
// ---------------------------------------------------------------------------

impl From<std::io::Error> for ReplicaError {
    fn from(e: std::io::Error) -> Self {
        Self::io(e.to_string())
    }
}

impl From<std::str::Utf8Error> for ReplicaError {
    fn from(e: std::str::Utf8Error) -> Self {
        Self::decode(e.to_string())
    }
}

impl From<std::string::FromUtf8Error> for ReplicaError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        Self::decode(e.to_string())
    }
}
