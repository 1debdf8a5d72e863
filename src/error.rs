use std::io;

use thiserror::Error;

/// Top-level error type for all pool operations
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("initialization failed: {0}")]
    Initialization(#[from] InitError),

    #[error("pool is not initialized")]
    NotInitialized,

    #[error("configuration is locked: {setter} called after initialize")]
    UnmodifiableConfiguration { setter: &'static str },

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("builder proxy already released")]
    InvalidProxyState,
}

/// Errors raised while locking the configuration and building the factory
#[derive(Error, Debug)]
pub enum InitError {
    #[error("pool is already initialized")]
    AlreadyInitialized,

    #[error("pool has been destroyed")]
    Destroyed,

    #[error("unknown parser feature: {key}")]
    UnsupportedFeature { key: String },

    #[error("unknown parser attribute: {key}")]
    UnsupportedAttribute { key: String },

    #[error("invalid value for parser attribute {key}: {reason}")]
    InvalidAttributeValue { key: String, reason: String },
}

/// Errors raised while parsing a document
///
/// Content-syntax failures and I/O failures are kept as distinct variants so
/// callers can tell a malformed document apart from a broken input stream.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("malformed XML at byte {offset}: {message}")]
    Syntax { message: String, offset: u64 },

    #[error("IO error while reading input: {0}")]
    Io(#[from] io::Error),
}

impl ParseError {
    pub fn is_syntax(&self) -> bool {
        matches!(self, ParseError::Syntax { .. })
    }

    pub fn is_io(&self) -> bool {
        matches!(self, ParseError::Io(_))
    }
}

/// Result type alias for pool operations
pub type Result<T> = std::result::Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_cause_discrimination() {
        let syntax = ParseError::Syntax {
            message: "mismatched end tag".to_string(),
            offset: 7,
        };
        assert!(syntax.is_syntax());
        assert!(!syntax.is_io());

        let io_err = ParseError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated"));
        assert!(io_err.is_io());
        assert!(!io_err.is_syntax());
    }

    #[test]
    fn test_display_formatting() {
        let err = PoolError::UnmodifiableConfiguration {
            setter: "set_max_idle",
        };
        assert!(err.to_string().contains("set_max_idle"));

        let err = PoolError::from(InitError::UnsupportedFeature {
            key: "frobnicate".to_string(),
        });
        assert!(err.to_string().contains("initialization failed"));
        assert!(err.to_string().contains("frobnicate"));

        let err = ParseError::Syntax {
            message: "unexpected `<`".to_string(),
            offset: 42,
        };
        assert!(err.to_string().contains("byte 42"));
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error;

        let io_err = io::Error::new(io::ErrorKind::NotFound, "stream gone");
        let parse: ParseError = io_err.into();
        let pool: PoolError = parse.into();

        let source = pool.source().expect("parse cause preserved");
        assert!(source.to_string().contains("stream gone"));
    }

    #[test]
    fn test_init_error_conversion() {
        let err: PoolError = InitError::AlreadyInitialized.into();
        assert!(matches!(
            err,
            PoolError::Initialization(InitError::AlreadyInitialized)
        ));
    }
}
