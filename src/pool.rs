//! The pool façade: configuration lifecycle, checkout/release, scoped
//! parse helpers.
//!
//! A pool moves through `Uninitialized → Initialized → Destroyed`, with no
//! path back. Configuration setters work only before initialization; from
//! then on the locked configuration is shared read-only by every builder and
//! needs no further synchronization. The only lock taken on the hot path is
//! the idle-cache mutex, held for a single push or pop and never across
//! factory construction or parsing.

use std::io::Read;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use serde::Serialize;

use crate::cache::IdleCache;
use crate::config::{AttributeValue, ParserConfig, Schema};
use crate::document::Document;
use crate::engine::{BuilderFactory, DocumentBuilder};
use crate::error::{InitError, PoolError, Result};
use crate::handler::{EntityResolver, ErrorHandler};
use crate::proxy::PooledBuilder;

/// Monotonic pool ids; stamped on proxies for ownership checks.
static POOL_SEQ: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Stage {
    Uninitialized = 0,
    Initialized = 1,
    Destroyed = 2,
}

impl Stage {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Stage::Initialized,
            2 => Stage::Destroyed,
            _ => Stage::Uninitialized,
        }
    }
}

/// Counters kept with relaxed ordering; eventually consistent, meant for
/// observability and tests, not for control flow.
#[derive(Debug, Default)]
struct PoolCounters {
    created: AtomicU64,
    reused: AtomicU64,
    returned: AtomicU64,
    discarded: AtomicU64,
    implicit_releases: AtomicU64,
    outstanding: AtomicU64,
}

/// Point-in-time snapshot of the pool's counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolStats {
    /// Builders minted by the factory.
    pub created: u64,
    /// Checkouts satisfied from the idle cache.
    pub reused: u64,
    /// Releases that re-entered the idle cache.
    pub returned: u64,
    /// Releases dropped because the cache was full or the pool destroyed.
    pub discarded: u64,
    /// Returns performed by proxy drop rather than an explicit release.
    pub implicit_releases: u64,
    /// Builders currently checked out.
    pub outstanding: u64,
    /// Current idle-cache occupancy.
    pub idle: usize,
}

/// Everything that exists only after successful initialization.
struct PoolRuntime {
    config: Arc<ParserConfig>,
    factory: BuilderFactory,
    idle: Mutex<IdleCache>,
}

/// Shared pool state; proxies hold a weak reference for drop-time returns.
pub(crate) struct PoolCore {
    id: u64,
    stage: AtomicU8,
    /// Staged configuration, mutable until initialization. The mutex also
    /// serializes lifecycle transitions.
    staged: Mutex<ParserConfig>,
    runtime: OnceLock<PoolRuntime>,
    counters: PoolCounters,
}

impl PoolCore {
    fn stage(&self) -> Stage {
        Stage::from_u8(self.stage.load(Ordering::Acquire))
    }

    fn set_stage(&self, stage: Stage) {
        self.stage.store(stage as u8, Ordering::Release);
    }

    fn runtime_when_initialized(&self) -> Result<&PoolRuntime> {
        if self.stage() != Stage::Initialized {
            return Err(PoolError::NotInitialized);
        }
        self.runtime.get().ok_or(PoolError::NotInitialized)
    }

    /// Accepts a builder back from a proxy. Infallible: a builder that can
    /// no longer be cached (full cache, destroyed pool) is discarded.
    pub(crate) fn checkin(&self, mut builder: DocumentBuilder, implicit: bool) {
        self.counters.outstanding.fetch_sub(1, Ordering::Relaxed);
        if implicit {
            self.counters.implicit_releases.fetch_add(1, Ordering::Relaxed);
        }
        let kept = match (self.stage(), self.runtime.get()) {
            (Stage::Initialized, Some(runtime)) => {
                builder.reset();
                runtime.idle.lock().push(builder)
            }
            _ => false,
        };
        if kept {
            self.counters.returned.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// A bounded, thread-safe pool of reusable XML document builders.
///
/// ```
/// use xml_pool::ParserPool;
///
/// let pool = ParserPool::new();
/// pool.set_max_idle(8)?;
/// pool.initialize()?;
///
/// let doc = pool.parse_str("<greeting>hello</greeting>")?;
/// assert_eq!(doc.root_element().unwrap().name(), "greeting");
/// # Ok::<(), xml_pool::PoolError>(())
/// ```
pub struct ParserPool {
    core: Arc<PoolCore>,
}

impl Default for ParserPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserPool {
    /// An uninitialized pool with default configuration.
    pub fn new() -> Self {
        Self::with_config(ParserConfig::default())
    }

    /// An uninitialized pool starting from `config`. The configuration stays
    /// mutable through the setters until [`initialize`](Self::initialize).
    pub fn with_config(config: ParserConfig) -> Self {
        Self {
            core: Arc::new(PoolCore {
                id: POOL_SEQ.fetch_add(1, Ordering::Relaxed),
                stage: AtomicU8::new(Stage::Uninitialized as u8),
                staged: Mutex::new(config),
                runtime: OnceLock::new(),
                counters: PoolCounters::default(),
            }),
        }
    }

    /// Locks the configuration and builds the factory.
    ///
    /// Fails if the engine rejects an attribute/feature key, if already
    /// initialized, or if destroyed; a rejected configuration leaves the
    /// pool `Uninitialized` so it can be corrected and retried.
    pub fn initialize(&self) -> Result<()> {
        let mut staged = self.core.staged.lock();
        match self.core.stage() {
            Stage::Initialized => return Err(InitError::AlreadyInitialized.into()),
            Stage::Destroyed => return Err(InitError::Destroyed.into()),
            Stage::Uninitialized => {}
        }

        // A schema installed earlier must win over any later flag writes.
        staged.enforce_schema_rules();
        let config = Arc::new(staged.clone());
        let factory = BuilderFactory::new(Arc::clone(&config))?;
        let runtime = PoolRuntime {
            idle: Mutex::new(IdleCache::new(config.max_idle)),
            config,
            factory,
        };
        // Sole writer: guarded by the staged mutex and the stage check above.
        let _ = self.core.runtime.set(runtime);
        self.core.set_stage(Stage::Initialized);
        tracing::debug!(pool_id = self.core.id, "parser pool initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.core.stage() == Stage::Initialized
    }

    pub fn is_destroyed(&self) -> bool {
        self.core.stage() == Stage::Destroyed
    }

    /// Borrows a builder: most-recently-idled first, freshly minted on a
    /// cache miss. Construction happens outside the cache lock so a slow
    /// build never serializes unrelated checkouts. Checkout is unbounded:
    /// only the idle cache is capped, not the number of outstanding loans.
    pub fn checkout(&self) -> Result<PooledBuilder> {
        let runtime = self.core.runtime_when_initialized()?;
        let cached = runtime.idle.lock().pop();
        let builder = match cached {
            Some(builder) => {
                self.core.counters.reused.fetch_add(1, Ordering::Relaxed);
                builder
            }
            None => {
                self.core.counters.created.fetch_add(1, Ordering::Relaxed);
                runtime.factory.create()
            }
        };
        self.core.counters.outstanding.fetch_add(1, Ordering::Relaxed);
        Ok(PooledBuilder::new(
            builder,
            Arc::downgrade(&self.core),
            self.core.id,
        ))
    }

    /// Returns a checked-out builder to the pool.
    ///
    /// No-ops if the proxy belongs to another pool or was already released;
    /// otherwise the builder is reset and re-cached when the idle cache has
    /// room, discarded when it does not.
    pub fn release(&self, proxy: &mut PooledBuilder) {
        if proxy.pool_id() != self.core.id {
            return;
        }
        proxy.release();
    }

    /// Parses a character stream with a transient builder, releasing it on
    /// every exit path.
    pub fn parse_str(&self, input: &str) -> Result<Document> {
        let mut proxy = self.checkout()?;
        let result = proxy.parse_str(input);
        self.release(&mut proxy);
        result
    }

    /// Parses a byte stream with a transient builder, releasing it on every
    /// exit path.
    pub fn parse_reader<R: Read>(&self, input: R) -> Result<Document> {
        let mut proxy = self.checkout()?;
        let result = proxy.parse_reader(input);
        self.release(&mut proxy);
        result
    }

    /// Produces an empty document with a transient builder.
    pub fn new_document(&self) -> Result<Document> {
        let mut proxy = self.checkout()?;
        let result = proxy.new_document();
        self.release(&mut proxy);
        result
    }

    /// Clears the idle cache and retires the pool. Terminal and idempotent;
    /// never fails. Outstanding proxies keep working, but their builders are
    /// discarded when returned.
    pub fn destroy(&self) {
        let _staged = self.core.staged.lock();
        if self.core.stage() == Stage::Destroyed {
            return;
        }
        self.core.set_stage(Stage::Destroyed);
        if let Some(runtime) = self.core.runtime.get() {
            runtime.idle.lock().clear();
        }
        tracing::debug!(pool_id = self.core.id, "parser pool destroyed");
    }

    /// Snapshot of the effective configuration: the locked one once
    /// initialized, the staged one before that.
    pub fn configuration(&self) -> ParserConfig {
        match self.core.runtime.get() {
            Some(runtime) => (*runtime.config).clone(),
            None => self.core.staged.lock().clone(),
        }
    }

    pub fn stats(&self) -> PoolStats {
        let counters = &self.core.counters;
        PoolStats {
            created: counters.created.load(Ordering::Relaxed),
            reused: counters.reused.load(Ordering::Relaxed),
            returned: counters.returned.load(Ordering::Relaxed),
            discarded: counters.discarded.load(Ordering::Relaxed),
            implicit_releases: counters.implicit_releases.load(Ordering::Relaxed),
            outstanding: counters.outstanding.load(Ordering::Relaxed),
            idle: self
                .core
                .runtime
                .get()
                .map(|runtime| runtime.idle.lock().len())
                .unwrap_or(0),
        }
    }

    // ------------------------------------------------------------------
    // Configuration setters, permitted only while `Uninitialized`.
    // ------------------------------------------------------------------

    fn update_config(
        &self,
        setter: &'static str,
        apply: impl FnOnce(&mut ParserConfig),
    ) -> Result<()> {
        let mut staged = self.core.staged.lock();
        if self.core.stage() != Stage::Uninitialized {
            return Err(PoolError::UnmodifiableConfiguration { setter });
        }
        apply(&mut staged);
        Ok(())
    }

    /// Bounds the idle cache (not the number of concurrent checkouts).
    pub fn set_max_idle(&self, max_idle: usize) -> Result<()> {
        self.update_config("set_max_idle", |c| c.max_idle = max_idle)
    }

    pub fn set_coalescing(&self, coalescing: bool) -> Result<()> {
        self.update_config("set_coalescing", |c| c.coalescing = coalescing)
    }

    pub fn set_expand_entity_references(&self, expand: bool) -> Result<()> {
        self.update_config("set_expand_entity_references", |c| {
            c.expand_entity_references = expand;
        })
    }

    pub fn set_ignore_comments(&self, ignore: bool) -> Result<()> {
        self.update_config("set_ignore_comments", |c| c.ignore_comments = ignore)
    }

    pub fn set_ignore_element_content_whitespace(&self, ignore: bool) -> Result<()> {
        self.update_config("set_ignore_element_content_whitespace", |c| {
            c.ignore_element_content_whitespace = ignore;
        })
    }

    pub fn set_namespace_aware(&self, aware: bool) -> Result<()> {
        self.update_config("set_namespace_aware", |c| c.namespace_aware = aware)
    }

    pub fn set_dtd_validating(&self, validating: bool) -> Result<()> {
        self.update_config("set_dtd_validating", |c| c.dtd_validating = validating)
    }

    pub fn set_xinclude_aware(&self, aware: bool) -> Result<()> {
        self.update_config("set_xinclude_aware", |c| c.xinclude_aware = aware)
    }

    /// Installs (or clears) the validation schema. A non-null schema forces
    /// namespace awareness and removes the legacy schema attribute keys.
    pub fn set_schema(&self, schema: Option<Schema>) -> Result<()> {
        self.update_config("set_schema", |c| c.assign_schema(schema))
    }

    /// Engine-specific attribute passthrough; keys are validated when the
    /// pool initializes.
    pub fn set_attribute(&self, key: impl Into<String>, value: AttributeValue) -> Result<()> {
        let key = key.into();
        self.update_config("set_attribute", move |c| {
            c.attributes.insert(key, value);
        })
    }

    /// Engine-specific feature passthrough; keys are validated when the
    /// pool initializes.
    pub fn set_feature(&self, key: impl Into<String>, enabled: bool) -> Result<()> {
        let key = key.into();
        self.update_config("set_feature", move |c| {
            c.features.insert(key, enabled);
        })
    }

    pub fn set_entity_resolver(&self, resolver: Arc<dyn EntityResolver>) -> Result<()> {
        self.update_config("set_entity_resolver", move |c| {
            c.entity_resolver = Some(resolver);
        })
    }

    pub fn set_error_handler(&self, handler: Arc<dyn ErrorHandler>) -> Result<()> {
        self.update_config("set_error_handler", move |c| c.error_handler = handler)
    }
}

impl std::fmt::Debug for ParserPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserPool")
            .field("id", &self.core.id)
            .field("stage", &self.core.stage())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::feature;
    use crate::error::ParseError;

    fn initialized() -> ParserPool {
        let pool = ParserPool::new();
        pool.initialize().unwrap();
        pool
    }

    #[test]
    fn test_lifecycle_flags() {
        let pool = ParserPool::new();
        assert!(!pool.is_initialized());
        assert!(!pool.is_destroyed());

        pool.initialize().unwrap();
        assert!(pool.is_initialized());
        assert!(!pool.is_destroyed());

        pool.destroy();
        assert!(!pool.is_initialized());
        assert!(pool.is_destroyed());
    }

    #[test]
    fn test_double_initialize_is_an_error() {
        let pool = initialized();
        assert!(matches!(
            pool.initialize(),
            Err(PoolError::Initialization(InitError::AlreadyInitialized))
        ));
    }

    #[test]
    fn test_initialize_after_destroy_is_an_error() {
        let pool = initialized();
        pool.destroy();
        assert!(matches!(
            pool.initialize(),
            Err(PoolError::Initialization(InitError::Destroyed))
        ));
    }

    #[test]
    fn test_rejected_config_leaves_pool_correctable() {
        let pool = ParserPool::new();
        pool.set_feature("no-such-feature", true).unwrap();
        assert!(matches!(
            pool.initialize(),
            Err(PoolError::Initialization(InitError::UnsupportedFeature { .. }))
        ));
        assert!(!pool.is_initialized());

        // Correct the staged configuration and retry.
        pool.update_config("fix", |c| {
            c.features.remove("no-such-feature");
        })
        .unwrap();
        pool.initialize().unwrap();
        assert!(pool.is_initialized());
    }

    #[test]
    fn test_operations_before_initialize_fail() {
        let pool = ParserPool::new();
        assert!(matches!(pool.checkout(), Err(PoolError::NotInitialized)));
        assert!(matches!(
            pool.parse_str("<r/>"),
            Err(PoolError::NotInitialized)
        ));
        assert!(matches!(pool.new_document(), Err(PoolError::NotInitialized)));
    }

    #[test]
    fn test_checkout_after_destroy_fails() {
        let pool = initialized();
        pool.destroy();
        assert!(matches!(pool.checkout(), Err(PoolError::NotInitialized)));
    }

    #[test]
    fn test_setters_lock_after_initialize() {
        let pool = ParserPool::new();
        pool.set_max_idle(3).unwrap();
        pool.set_namespace_aware(false).unwrap();
        pool.initialize().unwrap();

        assert!(matches!(
            pool.set_max_idle(9),
            Err(PoolError::UnmodifiableConfiguration { setter: "set_max_idle" })
        ));
        assert!(matches!(
            pool.set_schema(Some(Schema::new("urn:x"))),
            Err(PoolError::UnmodifiableConfiguration { .. })
        ));
        assert!(matches!(
            pool.set_feature(feature::ALLOW_DOCTYPE, false),
            Err(PoolError::UnmodifiableConfiguration { .. })
        ));
    }

    #[test]
    fn test_checkout_reuses_released_builder() {
        let pool = initialized();
        let mut proxy = pool.checkout().unwrap();
        let first_id = proxy.builder_id().unwrap();
        pool.release(&mut proxy);

        let second = pool.checkout().unwrap();
        assert_eq!(second.builder_id().unwrap(), first_id);

        let stats = pool.stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.reused, 1);
    }

    #[test]
    fn test_release_of_foreign_proxy_is_a_no_op() {
        let pool_a = initialized();
        let pool_b = initialized();

        let mut proxy = pool_a.checkout().unwrap();
        pool_b.release(&mut proxy);
        assert!(!proxy.is_released(), "foreign release must not consume");
        assert_eq!(pool_b.stats().returned, 0);

        pool_a.release(&mut proxy);
        assert!(proxy.is_released());
        assert_eq!(pool_a.stats().returned, 1);
    }

    #[test]
    fn test_parse_failure_still_releases() {
        let pool = initialized();
        let err = pool.parse_str("<a><b></a>").unwrap_err();
        assert!(matches!(err, PoolError::Parse(ParseError::Syntax { .. })));

        let stats = pool.stats();
        assert_eq!(stats.outstanding, 0);
        assert_eq!(stats.idle, 1);
    }

    #[test]
    fn test_parse_reader_io_failure_still_releases() {
        use std::io;

        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            }
        }

        let pool = initialized();
        let err = pool.parse_reader(Broken).unwrap_err();
        assert!(matches!(err, PoolError::Parse(ParseError::Io(_))));
        assert_eq!(pool.stats().outstanding, 0);
    }

    #[test]
    fn test_new_document_round_trip() {
        let pool = initialized();
        let doc = pool.new_document().unwrap();
        assert!(doc.root_element().is_none());
        assert_eq!(pool.stats().outstanding, 0);
    }

    #[test]
    fn test_destroy_clears_idle_cache() {
        let pool = initialized();
        for _ in 0..3 {
            let mut proxy = pool.checkout().unwrap();
            pool.release(&mut proxy);
        }
        assert!(pool.stats().idle >= 1);
        pool.destroy();
        assert_eq!(pool.stats().idle, 0);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let pool = initialized();
        pool.destroy();
        pool.destroy();
        assert!(pool.is_destroyed());
    }

    #[test]
    fn test_release_after_destroy_discards() {
        let pool = initialized();
        let mut proxy = pool.checkout().unwrap();
        pool.destroy();
        pool.release(&mut proxy);

        let stats = pool.stats();
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.outstanding, 0);
    }

    #[test]
    fn test_parallel_parses_share_the_pool() {
        use rayon::prelude::*;

        let pool = initialized();
        let results: Vec<_> = (0..100u32)
            .into_par_iter()
            .map(|i| {
                pool.parse_str(&format!("<n v=\"{i}\"/>"))
                    .map(|doc| doc.root_element().map(|e| e.name().to_string()))
            })
            .collect();

        assert!(results.iter().all(|r| r.is_ok()));
        let stats = pool.stats();
        assert_eq!(stats.outstanding, 0);
        assert!(stats.idle <= 5);
        assert_eq!(stats.created + stats.reused, 100);
    }

    #[test]
    fn test_max_idle_zero_disables_caching() {
        let pool = ParserPool::new();
        pool.set_max_idle(0).unwrap();
        pool.initialize().unwrap();

        let mut proxy = pool.checkout().unwrap();
        pool.release(&mut proxy);
        let stats = pool.stats();
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.discarded, 1);
    }
}
