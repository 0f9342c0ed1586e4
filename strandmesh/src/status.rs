//! Completion statuses and the call-once callback that carries them.
//!
//! Every unit of work in the router and the receive modes is settled through
//! a [`StatusCallback`]. A callback that is dropped without being called
//! fires with [`StatusCode::Cancelled`], so a unit of work is always settled
//! exactly once, even when its owner is torn down.

use std::fmt;

/// Outcome codes shared by all completion callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    ResourceExhausted,
    FailedPrecondition,
    Unavailable,
    Internal,
}

impl StatusCode {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Cancelled => "CANCELLED",
            StatusCode::Unknown => "UNKNOWN",
            StatusCode::InvalidArgument => "INVALID_ARGUMENT",
            StatusCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            StatusCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            StatusCode::FailedPrecondition => "FAILED_PRECONDITION",
            StatusCode::Unavailable => "UNAVAILABLE",
            StatusCode::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status code plus an optional human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: StatusCode,
    reason: Option<String>,
}

impl Status {
    pub fn new(code: StatusCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: Some(reason.into()),
        }
    }

    pub fn ok() -> Self {
        Self::from_code(StatusCode::Ok)
    }

    pub fn cancelled() -> Self {
        Self::from_code(StatusCode::Cancelled)
    }

    pub fn from_code(code: StatusCode) -> Self {
        Self { code, reason: None }
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }
}

impl From<StatusCode> for Status {
    fn from(code: StatusCode) -> Self {
        Self::from_code(code)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{}({})", self.code, reason),
            None => write!(f, "{}", self.code),
        }
    }
}

/// A move-only callback invoked exactly once with a [`Status`].
///
/// Dropping an uncalled callback invokes it with `CANCELLED`.
pub struct StatusCallback {
    f: Option<Box<dyn FnOnce(Status) + Send>>,
}

impl StatusCallback {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(Status) + Send + 'static,
    {
        Self {
            f: Some(Box::new(f)),
        }
    }

    /// A callback that discards whatever status it is given.
    pub fn ignore() -> Self {
        Self::new(|_| {})
    }

    /// Settle the unit of work this callback represents.
    pub fn call(mut self, status: Status) {
        if let Some(f) = self.f.take() {
            f(status);
        }
    }
}

impl Drop for StatusCallback {
    fn drop(&mut self) {
        if let Some(f) = self.f.take() {
            f(Status::cancelled());
        }
    }
}

impl fmt::Debug for StatusCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusCallback")
            .field("pending", &self.f.is_some())
            .finish()
    }
}
