use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical category for a signal operation failure.
///
/// This is intentionally coarse-grained: the coordinator never interprets
/// it beyond classification, but recordings and health reporters use it as
/// an observability dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalErrorKind {
    /// A remote dependency refused or dropped the connection.
    Connection,
    /// A local I/O operation failed.
    Io,
    /// The dependency answered but its state failed validation.
    Validation,
    /// The dependency is reachable but not ready to serve.
    Unavailable,
    /// The operation observed cancellation and unwound cooperatively.
    Cancelled,
    /// Catch-all bucket when no specific category applies.
    Other,
}

impl SignalErrorKind {
    /// Returns the variant name as a static string for recordings and logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "Connection",
            Self::Io => "Io",
            Self::Validation => "Validation",
            Self::Unavailable => "Unavailable",
            Self::Cancelled => "Cancelled",
            Self::Other => "Other",
        }
    }
}

/// Structured payload for a readiness operation failure.
///
/// Retained verbatim on the signal record, so the shape stays stable and
/// easy to:
/// - classify (`kind`) during outcome classification,
/// - render (`message`) in summaries and health output,
/// - enrich (`detail`) with optional low-level diagnostics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalError {
    /// Coarse failure category used by classification and observability.
    pub kind: SignalErrorKind,
    /// Human-readable summary safe to display in normal logs and UIs.
    pub message: String,
    /// Optional diagnostic detail for debugging and deep triage.
    ///
    /// Prefer concise, actionable context. Omit when no extra detail exists.
    pub detail: Option<String>,
}

impl SignalError {
    /// Creates a [`SignalError`] with required fields only.
    ///
    /// Use [`Self::with_detail`] to attach optional diagnostic context.
    pub fn new(kind: SignalErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    /// Creates a [`SignalError`] with all fields in a single call.
    ///
    /// Equivalent to `Self::new(kind, message).with_detail(detail)`.
    pub fn new_with_detail(
        kind: SignalErrorKind,
        message: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: Some(detail.into()),
        }
    }

    /// Adds or replaces the optional diagnostic detail.
    ///
    /// If called multiple times, the last value wins.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Shorthand for an uncategorized failure.
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(SignalErrorKind::Other, message)
    }

    /// Shorthand for a cooperative-cancellation unwind.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(SignalErrorKind::Cancelled, message)
    }

    /// Whether this failure is a cooperative-cancellation unwind rather
    /// than a fault.
    pub fn is_cancellation(&self) -> bool {
        self.kind == SignalErrorKind::Cancelled
    }
}

impl fmt::Display for SignalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)?;
        if let Some(ref detail) = self.detail {
            write!(f, " ({})", detail)?;
        }
        Ok(())
    }
}

impl std::error::Error for SignalError {}
