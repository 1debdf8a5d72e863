//! Parser configuration owned by the pool.
//!
//! A `ParserConfig` is freely mutable until the owning pool is initialized;
//! from that point on the pool holds it behind an `Arc` and every setter on
//! the pool fails. The struct itself carries no lock: immutability is
//! enforced by the pool's lifecycle, which is the only way callers reach a
//! locked configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::handler::{EntityResolver, ErrorHandler, LoggingErrorHandler};

/// Feature keys understood by the engine. Any other key is rejected when the
/// pool initializes.
pub mod feature {
    /// Allow a DOCTYPE declaration in the input (default true). Hardened
    /// deployments disable this to make any DOCTYPE a fatal parse error.
    pub const ALLOW_DOCTYPE: &str = "allow-doctype";
    /// Tolerate duplicate attributes on an element, keeping the first
    /// occurrence (default false).
    pub const ALLOW_DUPLICATE_ATTRIBUTES: &str = "allow-duplicate-attributes";
    /// Downgrade an unresolvable entity reference from fatal to a
    /// recoverable error, leaving the reference textual (default false).
    pub const LENIENT_ENTITIES: &str = "lenient-entities";
}

/// Attribute keys understood by the engine.
pub mod attr {
    /// Maximum element nesting depth (integer, default 256).
    pub const MAX_DEPTH: &str = "max-depth";
    /// Maximum number of attributes on a single element (integer,
    /// default 512).
    pub const MAX_ATTRIBUTE_COUNT: &str = "max-attribute-count";
    /// Legacy schema selection keys. Recognized only so that configuring a
    /// [`Schema`](super::Schema) can clear them; mutually exclusive with it.
    pub const SCHEMA_LANGUAGE: &str = "schema-language";
    pub const SCHEMA_SOURCE: &str = "schema-source";
}

/// Default bound on the idle cache.
pub const DEFAULT_MAX_IDLE: usize = 5;

/// Value of an engine-specific attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Bool(bool),
    Integer(i64),
    Text(String),
}

impl AttributeValue {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(b) => write!(f, "{b}"),
            AttributeValue::Integer(n) => write!(f, "{n}"),
            AttributeValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Opaque validation-schema descriptor.
///
/// The pool carries the schema and enforces its configuration rules (forced
/// namespace awareness, exclusivity with the legacy schema attributes);
/// evaluating the schema against documents is outside this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    location: String,
    source: Option<String>,
}

impl Schema {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }
}

/// The full option bag for builders produced by a pool.
#[derive(Clone)]
pub struct ParserConfig {
    /// Bound on the idle cache, not on concurrent checkouts.
    pub max_idle: usize,
    /// Merge CDATA sections into adjacent text.
    pub coalescing: bool,
    /// Expand entity references; when false they stay textual.
    pub expand_entity_references: bool,
    /// Drop comment nodes from the tree.
    pub ignore_comments: bool,
    /// Drop whitespace-only text nodes in element content.
    pub ignore_element_content_whitespace: bool,
    /// Record prefix/local-name splits and namespace declarations.
    pub namespace_aware: bool,
    /// Carried for configuration fidelity; DTD validation itself is not
    /// performed by the engine.
    pub dtd_validating: bool,
    /// Carried for configuration fidelity; XInclude is never expanded.
    pub xinclude_aware: bool,
    /// Optional validation schema. Setting one forces `namespace_aware` and
    /// clears the legacy schema attribute keys.
    pub schema: Option<Schema>,
    /// Engine-specific attribute passthrough.
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Engine-specific feature passthrough.
    pub features: BTreeMap<String, bool>,
    /// Optional entity resolution policy. `None` rejects every entity
    /// beyond the predefined five and numeric character references.
    pub entity_resolver: Option<Arc<dyn EntityResolver>>,
    /// Diagnostic sink; defaults to the logging handler.
    pub error_handler: Arc<dyn ErrorHandler>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_idle: DEFAULT_MAX_IDLE,
            coalescing: true,
            expand_entity_references: true,
            ignore_comments: true,
            ignore_element_content_whitespace: true,
            namespace_aware: true,
            dtd_validating: false,
            xinclude_aware: false,
            schema: None,
            attributes: BTreeMap::new(),
            features: BTreeMap::new(),
            entity_resolver: None,
            error_handler: Arc::new(LoggingErrorHandler),
        }
    }
}

impl fmt::Debug for ParserConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserConfig")
            .field("max_idle", &self.max_idle)
            .field("coalescing", &self.coalescing)
            .field("expand_entity_references", &self.expand_entity_references)
            .field("ignore_comments", &self.ignore_comments)
            .field(
                "ignore_element_content_whitespace",
                &self.ignore_element_content_whitespace,
            )
            .field("namespace_aware", &self.namespace_aware)
            .field("dtd_validating", &self.dtd_validating)
            .field("xinclude_aware", &self.xinclude_aware)
            .field("schema", &self.schema)
            .field("attributes", &self.attributes)
            .field("features", &self.features)
            .field("entity_resolver", &self.entity_resolver.is_some())
            .finish()
    }
}

impl ParserConfig {
    /// Installs (or clears) the schema, applying the exclusivity rule
    /// immediately: a non-null schema forces namespace awareness and removes
    /// the legacy schema attribute keys.
    pub fn assign_schema(&mut self, schema: Option<Schema>) {
        self.schema = schema;
        self.enforce_schema_rules();
    }

    /// Applies the schema exclusivity rule in place. Invoked again when the
    /// pool locks the configuration, so a `namespace_aware = false` written
    /// after the schema was installed cannot survive initialization.
    pub fn enforce_schema_rules(&mut self) {
        if self.schema.is_some() {
            self.namespace_aware = true;
            self.attributes.remove(attr::SCHEMA_LANGUAGE);
            self.attributes.remove(attr::SCHEMA_SOURCE);
        }
    }
}
