//! One-time-use wrapper around a checked-out builder.
//!
//! Between checkout and release the calling thread owns the wrapped builder
//! exclusively. Releasing tombstones the proxy: every delegated operation
//! afterwards fails with [`PoolError::InvalidProxyState`], and a second
//! release is a silent no-op. Dropping an un-released proxy returns the
//! builder to its pool; Rust's deterministic drop is the guaranteed-release
//! path the scoped helpers rely on.

use std::io::Read;
use std::sync::{Arc, Weak};

use crate::document::Document;
use crate::engine::DocumentBuilder;
use crate::error::{PoolError, Result};
use crate::handler::{EntityResolver, ErrorHandler};
use crate::pool::PoolCore;

/// A builder on loan from a [`ParserPool`](crate::pool::ParserPool).
pub struct PooledBuilder {
    /// `None` once released; doubles as the consumed flag.
    builder: Option<DocumentBuilder>,
    pool: Weak<PoolCore>,
    pool_id: u64,
}

impl PooledBuilder {
    pub(crate) fn new(builder: DocumentBuilder, pool: Weak<PoolCore>, pool_id: u64) -> Self {
        Self {
            builder: Some(builder),
            pool,
            pool_id,
        }
    }

    pub(crate) fn pool_id(&self) -> u64 {
        self.pool_id
    }

    /// Whether this proxy has already been returned to its pool.
    pub fn is_released(&self) -> bool {
        self.builder.is_none()
    }

    /// Id of the wrapped builder, for tracing and reuse assertions.
    pub fn builder_id(&self) -> Result<u64> {
        Ok(self.live()?.id())
    }

    /// Parses a complete document from a character stream.
    pub fn parse_str(&mut self, input: &str) -> Result<Document> {
        let builder = self.live_mut()?;
        builder.parse_str(input).map_err(PoolError::from)
    }

    /// Parses a complete document from a byte stream.
    pub fn parse_reader<R: Read>(&mut self, input: R) -> Result<Document> {
        let builder = self.live_mut()?;
        builder.parse_reader(input).map_err(PoolError::from)
    }

    /// A fresh, empty document from the wrapped builder.
    pub fn new_document(&self) -> Result<Document> {
        Ok(self.live()?.new_document())
    }

    /// Returns the builder to its pool. Idempotent: releasing twice has the
    /// effect of releasing once, and the second call never errors.
    pub fn release(&mut self) {
        self.release_inner(false);
    }

    /// The resolver is fixed for the wrapped builder's lifetime and owned by
    /// the pool; this always fails.
    pub fn set_entity_resolver(&mut self, _resolver: Arc<dyn EntityResolver>) -> Result<()> {
        Err(PoolError::UnmodifiableConfiguration {
            setter: "set_entity_resolver",
        })
    }

    /// The handler is fixed for the wrapped builder's lifetime and owned by
    /// the pool; this always fails.
    pub fn set_error_handler(&mut self, _handler: Arc<dyn ErrorHandler>) -> Result<()> {
        Err(PoolError::UnmodifiableConfiguration {
            setter: "set_error_handler",
        })
    }

    /// Builder configuration belongs to the pool; this always fails.
    pub fn reset_configuration(&mut self) -> Result<()> {
        Err(PoolError::UnmodifiableConfiguration {
            setter: "reset_configuration",
        })
    }

    fn live(&self) -> Result<&DocumentBuilder> {
        self.builder.as_ref().ok_or(PoolError::InvalidProxyState)
    }

    fn live_mut(&mut self) -> Result<&mut DocumentBuilder> {
        self.builder.as_mut().ok_or(PoolError::InvalidProxyState)
    }

    fn release_inner(&mut self, implicit: bool) {
        if let Some(builder) = self.builder.take() {
            match self.pool.upgrade() {
                Some(core) => core.checkin(builder, implicit),
                // Pool dropped before the proxy: nothing to return to.
                None => drop(builder),
            }
        }
    }
}

impl Drop for PooledBuilder {
    fn drop(&mut self) {
        self.release_inner(true);
    }
}

impl std::fmt::Debug for PooledBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuilder")
            .field("pool_id", &self.pool_id)
            .field("released", &self.is_released())
            .finish()
    }
}
