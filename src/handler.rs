//! Injected collaborators consulted by the engine during parsing.
//!
//! The pool owns one `ErrorHandler` and at most one `EntityResolver`; both
//! are fixed at initialization and shared by every builder the factory
//! produces. Neither can be swapped through a checked-out proxy.

use std::fmt;

/// Severity of a diagnostic reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Fatal => write!(f, "fatal"),
        }
    }
}

/// A single diagnostic: what went wrong and where in the input.
///
/// The location is the byte offset the reader had consumed when the problem
/// was detected.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub offset: u64,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>, offset: u64) -> Self {
        Self {
            severity,
            message: message.into(),
            offset,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at byte {}: {}",
            self.severity, self.offset, self.message
        )
    }
}

/// Whether parsing should continue after a recoverable diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerDecision {
    Continue,
    Abort,
}

/// Receives warning/error/fatal diagnostics during parsing.
///
/// Warnings and errors are recoverable: the returned decision is honored.
/// Fatal diagnostics are reported for observability only; the reader cannot
/// resume past a well-formedness failure, so parsing aborts regardless of
/// the returned value.
pub trait ErrorHandler: Send + Sync {
    fn warning(&self, diagnostic: &Diagnostic) -> HandlerDecision;
    fn error(&self, diagnostic: &Diagnostic) -> HandlerDecision;
    fn fatal(&self, diagnostic: &Diagnostic) -> HandlerDecision;
}

/// Default handler: logs every diagnostic, continues on warning and error,
/// aborts on fatal.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingErrorHandler;

impl ErrorHandler for LoggingErrorHandler {
    fn warning(&self, diagnostic: &Diagnostic) -> HandlerDecision {
        tracing::warn!(offset = diagnostic.offset, "{}", diagnostic.message);
        HandlerDecision::Continue
    }

    fn error(&self, diagnostic: &Diagnostic) -> HandlerDecision {
        tracing::error!(offset = diagnostic.offset, "{}", diagnostic.message);
        HandlerDecision::Continue
    }

    fn fatal(&self, diagnostic: &Diagnostic) -> HandlerDecision {
        tracing::error!(offset = diagnostic.offset, "fatal: {}", diagnostic.message);
        HandlerDecision::Abort
    }
}

/// Controls resolution of entity references beyond the five predefined XML
/// entities and numeric character references.
///
/// When no resolver is configured the engine rejects every such reference.
/// That is the hardened default: nothing external is ever fetched, and an
/// unexpected entity is a parse failure rather than silent expansion.
pub trait EntityResolver: Send + Sync {
    /// Returns the replacement text for the named entity, or `None` to
    /// reject it.
    fn resolve_entity(&self, name: &str) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_handler_decisions() {
        let handler = LoggingErrorHandler;
        let warn = Diagnostic::new(Severity::Warning, "odd but legal", 3);
        let error = Diagnostic::new(Severity::Error, "duplicate attribute", 10);
        let fatal = Diagnostic::new(Severity::Fatal, "mismatched end tag", 21);

        assert_eq!(handler.warning(&warn), HandlerDecision::Continue);
        assert_eq!(handler.error(&error), HandlerDecision::Continue);
        assert_eq!(handler.fatal(&fatal), HandlerDecision::Abort);
    }

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic::new(Severity::Error, "duplicate attribute", 10);
        let rendered = d.to_string();
        assert!(rendered.contains("error"));
        assert!(rendered.contains("byte 10"));
        assert!(rendered.contains("duplicate attribute"));
    }
}
