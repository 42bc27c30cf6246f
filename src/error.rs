//! Error and result carriers.
//!
//! [`Error`] is the structured error value threaded through every fallible
//! operation in this crate (spec'd as `DBError`). Every operation returns a
//! [`DbResult`] — the "non-throwing" sum type from the specification. Rust has
//! no separate exception channel, so unlike the source this crate is modeled
//! on, there is no parallel "throwing" API: only the sum-typed form is
//! implemented.

use std::fmt;

/// A specialized `Result` type threaded through every operation in this crate.
pub type DbResult<T> = std::result::Result<T, Error>;

/// One frame of a captured call stack, attached to an [`Error`] at throw site
/// when stack capture was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub function: String,
    pub location: Option<String>,
}

/// The structured error value produced by every fallible operation.
///
/// Carries a stable 12-hex-digit `code` identifying the throw site, a
/// human-readable `message`, and an optional captured stack. Immutable after
/// construction.
#[derive(Debug, Clone, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct Error {
    code: Box<str>,
    message: Box<str>,
    kind: ErrorKind,
    stack: Option<Vec<StackFrame>>,
}

/// The logical category of an [`Error`], used by callers to branch on
/// recoverability without string-matching `message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No registered driver claims the URL.
    UrlNotAccepted,
    /// Scheme matched but parsing the rest of the URL failed.
    UrlInvalid,
    /// The backend refused the connection.
    ConnectionFailed,
    /// Operation attempted on a connection or statement that is closed.
    ConnectionClosed,
    /// Borrow attempted on a pool that has begun or finished shutting down.
    PoolClosed,
    /// `max_wait` elapsed with no handle becoming available.
    BorrowTimeout,
    /// A validation probe returned an error. Internal: triggers replacement,
    /// not normally surfaced to callers.
    ValidationFailed,
    /// Replacement during `test_on_borrow` failed more times than the pool's
    /// configured bound; see spec.md §9 Open Question.
    ValidationExhausted,
    /// Operation attempted on a closed prepared statement.
    StatementClosed,
    /// Operation attempted on a closed result set.
    ResultClosed,
    /// Operation attempted on a closed cursor.
    CursorClosed,
    /// An index or name did not address a valid bind parameter.
    InvalidParameter,
    /// A column name or index did not address a valid column.
    InvalidColumn,
    /// A columnar backend was asked to begin a transaction it does not
    /// implement.
    TransactionNotSupported,
    /// Any error surfaced by the underlying driver/backend.
    BackendError,
}

impl Error {
    pub fn new(kind: ErrorKind, code: impl Into<Box<str>>, message: impl Into<Box<str>>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            kind,
            stack: None,
        }
    }

    /// Attaches a captured call stack to this error. Stack capture is opt-in,
    /// not automatic, since it is rarely useful outside debug builds.
    pub fn with_stack(mut self, stack: Vec<StackFrame>) -> Self {
        self.stack = Some(stack);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn stack(&self) -> Option<&[StackFrame]> {
        self.stack.as_deref()
    }

    pub fn url_not_accepted(url: &str) -> Self {
        Self::new(
            ErrorKind::UrlNotAccepted,
            "000000000001",
            format!("no registered driver accepts url: {url}"),
        )
    }

    pub fn url_invalid(reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::UrlInvalid,
            "000000000002",
            format!("invalid connection url: {reason}"),
        )
    }

    pub fn connection_failed(reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::ConnectionFailed,
            "000000000003",
            format!("failed to connect: {reason}"),
        )
    }

    pub fn connection_closed() -> Self {
        Self::new(
            ErrorKind::ConnectionClosed,
            "000000000004",
            "operation attempted on a closed connection",
        )
    }

    pub fn pool_closed() -> Self {
        Self::new(
            ErrorKind::PoolClosed,
            "000000000005",
            "attempted to borrow a connection from a closed pool",
        )
    }

    pub fn borrow_timeout() -> Self {
        Self::new(
            ErrorKind::BorrowTimeout,
            "000000000006",
            "timed out waiting for an available connection",
        )
    }

    pub fn validation_failed(reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::ValidationFailed,
            "000000000007",
            format!("connection validation failed: {reason}"),
        )
    }

    pub fn validation_exhausted(attempts: u32) -> Self {
        Self::new(
            ErrorKind::ValidationExhausted,
            "000000000008",
            format!("gave up replacing invalid idle connections after {attempts} attempts"),
        )
    }

    pub fn statement_closed() -> Self {
        Self::new(
            ErrorKind::StatementClosed,
            "000000000009",
            "operation attempted on a closed prepared statement",
        )
    }

    pub fn result_closed() -> Self {
        Self::new(
            ErrorKind::ResultClosed,
            "00000000000a",
            "operation attempted on a closed result set",
        )
    }

    pub fn cursor_closed() -> Self {
        Self::new(
            ErrorKind::CursorClosed,
            "00000000000b",
            "operation attempted on a closed cursor",
        )
    }

    pub fn invalid_parameter(reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::InvalidParameter,
            "00000000000c",
            format!("invalid bind parameter: {reason}"),
        )
    }

    pub fn invalid_column(reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::InvalidColumn,
            "00000000000d",
            format!("invalid column: {reason}"),
        )
    }

    pub fn transaction_not_supported(backend: &str) -> Self {
        Self::new(
            ErrorKind::TransactionNotSupported,
            "00000000000e",
            format!("{backend} does not support transactions"),
        )
    }

    pub fn backend_error(reason: impl fmt::Display) -> Self {
        Self::new(ErrorKind::BackendError, "00000000000f", reason.to_string())
    }
}
