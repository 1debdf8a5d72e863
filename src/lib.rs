//! # xml-pool Library
//!
//! A bounded, thread-safe pool of reusable, expensively-configured XML
//! document builders. Builders are borrowed through a one-time-use proxy
//! that blocks use after return, and the pool's configuration is locked at
//! initialization so every builder it ever hands out is configured
//! identically.

mod cache;

pub mod cli;
pub mod config;
pub mod discovery;
pub mod document;
pub mod engine;
pub mod error;
pub mod handler;
pub mod output;
pub mod pool;
pub mod proxy;

pub use config::{AttributeValue, ParserConfig, Schema, attr, feature};
pub use document::{Document, Element, Node, XmlDeclaration};
pub use engine::{BuilderFactory, DocumentBuilder};
pub use error::{InitError, ParseError, PoolError, Result};
pub use handler::{
    Diagnostic, EntityResolver, ErrorHandler, HandlerDecision, LoggingErrorHandler, Severity,
};
pub use pool::{ParserPool, PoolStats};
pub use proxy::PooledBuilder;
