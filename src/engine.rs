//! Concrete document builder and its factory.
//!
//! ## Engine choice
//!
//! The builders managed by the pool are implemented on `quick-xml`, the
//! fastest maintained pure-Rust event parser. The event stream is assembled
//! into the minimal owned tree in [`crate::document`]. Going pure Rust keeps
//! the crate free of a system libxml2 dependency and keeps every builder
//! trivially `Send`; the cost of the configured options lives here instead of
//! in FFI glue.
//!
//! ## Construction cost
//!
//! A builder snapshots the locked configuration, resolves the engine limits,
//! and carries a memoized entity table. Checkout reuses idle builders so this
//! setup (and its allocations) amortizes across parses; the factory path only
//! runs on cache misses and is never executed under the idle-cache lock.

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use quick_xml::Reader;
use quick_xml::escape::unescape_with;
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesDecl, BytesStart, Event};

use crate::config::{AttributeValue, ParserConfig, attr, feature};
use crate::document::{Document, Element, Node, XmlDeclaration};
use crate::error::{InitError, ParseError};
use crate::handler::{Diagnostic, HandlerDecision, Severity};

/// Monotonic builder ids, for tracing and distinctness assertions.
static BUILDER_SEQ: AtomicU64 = AtomicU64::new(1);

const DEFAULT_MAX_DEPTH: usize = 256;
const DEFAULT_MAX_ATTRIBUTE_COUNT: usize = 512;

/// Engine limits and policies resolved from the attribute/feature maps.
#[derive(Debug, Clone, Copy)]
struct EngineLimits {
    max_depth: usize,
    max_attribute_count: usize,
    allow_doctype: bool,
    allow_duplicate_attributes: bool,
    lenient_entities: bool,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_attribute_count: DEFAULT_MAX_ATTRIBUTE_COUNT,
            allow_doctype: true,
            allow_duplicate_attributes: false,
            lenient_entities: false,
        }
    }
}

fn positive_integer(key: &str, value: &AttributeValue) -> Result<usize, InitError> {
    match value.as_integer() {
        Some(n) if n > 0 => Ok(n as usize),
        Some(n) => Err(InitError::InvalidAttributeValue {
            key: key.to_string(),
            reason: format!("{n} is not a positive integer"),
        }),
        None => Err(InitError::InvalidAttributeValue {
            key: key.to_string(),
            reason: format!("expected an integer, got `{value}`"),
        }),
    }
}

/// Validates the passthrough maps against the keys this engine understands
/// and resolves them into concrete limits. Unknown keys are rejected so a
/// typo fails at initialization instead of being silently ignored.
fn resolve_limits(config: &ParserConfig) -> Result<EngineLimits, InitError> {
    let mut limits = EngineLimits::default();

    for (key, enabled) in &config.features {
        match key.as_str() {
            feature::ALLOW_DOCTYPE => limits.allow_doctype = *enabled,
            feature::ALLOW_DUPLICATE_ATTRIBUTES => limits.allow_duplicate_attributes = *enabled,
            feature::LENIENT_ENTITIES => limits.lenient_entities = *enabled,
            _ => {
                return Err(InitError::UnsupportedFeature { key: key.clone() });
            }
        }
    }

    for (key, value) in &config.attributes {
        match key.as_str() {
            attr::MAX_DEPTH => limits.max_depth = positive_integer(key, value)?,
            attr::MAX_ATTRIBUTE_COUNT => {
                limits.max_attribute_count = positive_integer(key, value)?;
            }
            attr::SCHEMA_LANGUAGE | attr::SCHEMA_SOURCE => {
                // Legacy keys survive only when no Schema is installed; the
                // exclusivity rule removed them otherwise.
                if !matches!(value, AttributeValue::Text(_)) {
                    return Err(InitError::InvalidAttributeValue {
                        key: key.clone(),
                        reason: "expected a text value".to_string(),
                    });
                }
            }
            _ => {
                return Err(InitError::UnsupportedAttribute { key: key.clone() });
            }
        }
    }

    Ok(limits)
}

/// Builds fresh, fully configured [`DocumentBuilder`] instances from the
/// locked configuration. Stateless beyond that configuration.
#[derive(Debug)]
pub struct BuilderFactory {
    config: Arc<ParserConfig>,
    limits: EngineLimits,
}

impl BuilderFactory {
    /// Validates the configuration against the engine and constructs the
    /// factory. This is the "engine rejected an option" failure point of
    /// pool initialization.
    pub fn new(config: Arc<ParserConfig>) -> Result<Self, InitError> {
        let limits = resolve_limits(&config)?;
        Ok(Self { config, limits })
    }

    pub fn create(&self) -> DocumentBuilder {
        let id = BUILDER_SEQ.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(builder_id = id, "creating document builder");
        DocumentBuilder {
            id,
            config: Arc::clone(&self.config),
            limits: self.limits,
            entity_cache: HashMap::new(),
        }
    }
}

/// A configured XML parser producing owned [`Document`] trees.
///
/// Builders are handed out by the pool one checkout at a time, so parse
/// methods take `&mut self` without further synchronization.
pub struct DocumentBuilder {
    id: u64,
    config: Arc<ParserConfig>,
    limits: EngineLimits,
    /// Resolver results memoized across parses; cleared on reset.
    entity_cache: HashMap<String, String>,
}

impl DocumentBuilder {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Parses a complete document from a character stream.
    pub fn parse_str(&mut self, input: &str) -> Result<Document, ParseError> {
        self.build(input.as_bytes())
    }

    /// Parses a complete document from a byte stream.
    pub fn parse_reader<R: Read>(&mut self, input: R) -> Result<Document, ParseError> {
        self.build(BufReader::new(input))
    }

    /// A fresh, empty document.
    pub fn new_document(&self) -> Document {
        Document::empty()
    }

    /// Returns the builder to a clean reusable state.
    pub(crate) fn reset(&mut self) {
        self.entity_cache.clear();
    }

    fn build<R: BufRead>(&mut self, input: R) -> Result<Document, ParseError> {
        let mut reader = Reader::from_reader(input);
        {
            let cfg = reader.config_mut();
            cfg.check_end_names = true;
            cfg.expand_empty_elements = false;
        }

        let mut buf = Vec::new();
        let mut declaration: Option<XmlDeclaration> = None;
        let mut doctype_name: Option<String> = None;
        let mut prolog: Vec<Node> = Vec::new();
        let mut root: Option<Element> = None;
        let mut stack: Vec<Element> = Vec::new();

        loop {
            buf.clear();
            let event = reader.read_event_into(&mut buf);
            let offset = reader.buffer_position();
            match event {
                Ok(Event::Decl(decl)) => {
                    declaration = Some(read_declaration(&decl));
                }
                Ok(Event::DocType(text)) => {
                    if !self.limits.allow_doctype {
                        return Err(self.fatal("document type declaration is not allowed", offset));
                    }
                    if self.config.dtd_validating {
                        let diagnostic = Diagnostic::new(
                            Severity::Warning,
                            "DTD validation requested but not performed by this engine",
                            offset,
                        );
                        if self.config.error_handler.warning(&diagnostic) == HandlerDecision::Abort
                        {
                            return Err(ParseError::Syntax {
                                message: diagnostic.message,
                                offset,
                            });
                        }
                    }
                    let raw = String::from_utf8_lossy(&text).into_owned();
                    doctype_name = raw.split_whitespace().next().map(str::to_string);
                }
                Ok(Event::Start(start)) => {
                    if stack.len() >= self.limits.max_depth {
                        return Err(self.fatal("maximum element depth exceeded", offset));
                    }
                    if stack.is_empty() && root.is_some() {
                        return Err(
                            self.fatal("document contains more than one root element", offset)
                        );
                    }
                    let element = self.open_element(&start, offset)?;
                    stack.push(element);
                }
                Ok(Event::Empty(start)) => {
                    if stack.len() >= self.limits.max_depth {
                        return Err(self.fatal("maximum element depth exceeded", offset));
                    }
                    if stack.is_empty() && root.is_some() {
                        return Err(
                            self.fatal("document contains more than one root element", offset)
                        );
                    }
                    let element = self.open_element(&start, offset)?;
                    match stack.last_mut() {
                        Some(parent) => parent.push_child(Node::Element(element)),
                        None => root = Some(element),
                    }
                }
                Ok(Event::End(_)) => match stack.pop() {
                    Some(element) => match stack.last_mut() {
                        Some(parent) => parent.push_child(Node::Element(element)),
                        None => root = Some(element),
                    },
                    None => {
                        return Err(self.fatal("unexpected end tag", offset));
                    }
                },
                Ok(Event::Text(text)) => {
                    let raw = String::from_utf8_lossy(&text).into_owned();
                    if stack.is_empty() {
                        if !raw.trim().is_empty() {
                            return Err(
                                self.fatal("character data outside the root element", offset)
                            );
                        }
                        continue;
                    }
                    let content = if self.config.expand_entity_references {
                        self.expand_text(&raw, offset)?
                    } else {
                        raw
                    };
                    if self.config.ignore_element_content_whitespace
                        && content.trim().is_empty()
                    {
                        continue;
                    }
                    if let Some(parent) = stack.last_mut() {
                        append_text(parent, content, self.config.coalescing);
                    }
                }
                Ok(Event::CData(cdata)) => {
                    let raw = String::from_utf8_lossy(&cdata).into_owned();
                    match stack.last_mut() {
                        Some(parent) => {
                            if self.config.coalescing {
                                append_text(parent, raw, true);
                            } else {
                                parent.push_child(Node::CData(raw));
                            }
                        }
                        None => {
                            return Err(self.fatal("CDATA section outside the root element", offset));
                        }
                    }
                }
                Ok(Event::Comment(comment)) => {
                    if self.config.ignore_comments {
                        continue;
                    }
                    let node = Node::Comment(String::from_utf8_lossy(&comment).into_owned());
                    match stack.last_mut() {
                        Some(parent) => parent.push_child(node),
                        None => prolog.push(node),
                    }
                }
                Ok(Event::PI(pi)) => {
                    let node =
                        Node::ProcessingInstruction(String::from_utf8_lossy(&pi).into_owned());
                    match stack.last_mut() {
                        Some(parent) => parent.push_child(node),
                        None => prolog.push(node),
                    }
                }
                Ok(Event::Eof) => break,
                Err(err) => {
                    let parse_err = classify(err, offset);
                    let diagnostic =
                        Diagnostic::new(Severity::Fatal, parse_err.to_string(), offset);
                    self.config.error_handler.fatal(&diagnostic);
                    return Err(parse_err);
                }
            }
        }

        if !stack.is_empty() {
            let offset = reader.buffer_position();
            return Err(self.fatal("unexpected end of input inside an element", offset));
        }
        let Some(root) = root else {
            let offset = reader.buffer_position();
            return Err(self.fatal("document has no root element", offset));
        };

        Ok(Document::new(declaration, doctype_name, prolog, Some(root)))
    }

    fn open_element(&mut self, start: &BytesStart, offset: u64) -> Result<Element, ParseError> {
        let qname = start.name();
        let raw_name = String::from_utf8_lossy(qname.as_ref()).into_owned();
        let (prefix, local_name) = if self.config.namespace_aware {
            let prefix = qname
                .prefix()
                .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned());
            let local = String::from_utf8_lossy(qname.local_name().as_ref()).into_owned();
            (prefix, local)
        } else {
            (None, raw_name.clone())
        };
        let mut element = Element::with_name(raw_name, prefix, local_name);

        let mut count = 0usize;
        for parsed in start.attributes() {
            match parsed {
                Ok(attribute) => {
                    count += 1;
                    if count > self.limits.max_attribute_count {
                        return Err(self.fatal("maximum attribute count exceeded", offset));
                    }
                    let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
                    let raw_value = String::from_utf8_lossy(&attribute.value).into_owned();
                    let value = if self.config.expand_entity_references {
                        self.expand_text(&raw_value, offset)?
                    } else {
                        raw_value
                    };
                    if self.config.namespace_aware
                        && (key == "xmlns" || key.starts_with("xmlns:"))
                    {
                        let ns_prefix = key.strip_prefix("xmlns:").unwrap_or("").to_string();
                        element.push_namespace(ns_prefix, value);
                    } else {
                        element.push_attribute(key, value);
                    }
                }
                Err(AttrError::Duplicated(..)) => {
                    if self.limits.allow_duplicate_attributes {
                        let diagnostic = Diagnostic::new(
                            Severity::Warning,
                            format!("duplicate attribute on <{}> ignored", element.name()),
                            offset,
                        );
                        if self.config.error_handler.warning(&diagnostic)
                            == HandlerDecision::Abort
                        {
                            return Err(ParseError::Syntax {
                                message: diagnostic.message,
                                offset,
                            });
                        }
                    } else {
                        return Err(self.fatal(
                            format!("duplicate attribute on <{}>", element.name()),
                            offset,
                        ));
                    }
                }
                Err(err) => {
                    return Err(self.fatal(format!("malformed attribute: {err}"), offset));
                }
            }
        }

        Ok(element)
    }

    /// Expands entity references in raw character data.
    ///
    /// Predefined entities and numeric character references are always
    /// expanded. Anything else is looked up through the configured
    /// [`EntityResolver`](crate::handler::EntityResolver); with no resolver,
    /// or when the resolver declines, the reference is rejected (or kept
    /// textual under the `lenient-entities` feature).
    fn expand_text(&mut self, raw: &str, offset: u64) -> Result<String, ParseError> {
        if !raw.contains('&') {
            return Ok(raw.to_string());
        }
        self.prime_entities(raw);
        let cache = &self.entity_cache;
        let resolve = |name: &str| match name {
            "amp" => Some("&"),
            "lt" => Some("<"),
            "gt" => Some(">"),
            "apos" => Some("'"),
            "quot" => Some("\""),
            _ => cache.get(name).map(String::as_str),
        };
        match unescape_with(raw, resolve) {
            Ok(expanded) => Ok(expanded.into_owned()),
            Err(err) => {
                let message = format!("unresolvable entity reference: {err}");
                if self.limits.lenient_entities {
                    let diagnostic = Diagnostic::new(Severity::Error, message, offset);
                    match self.config.error_handler.error(&diagnostic) {
                        HandlerDecision::Continue => Ok(raw.to_string()),
                        HandlerDecision::Abort => Err(ParseError::Syntax {
                            message: diagnostic.message,
                            offset,
                        }),
                    }
                } else {
                    Err(self.fatal(message, offset))
                }
            }
        }
    }

    /// Asks the resolver for every non-predefined entity named in `raw`,
    /// memoizing results so repeated references resolve once per builder.
    fn prime_entities(&mut self, raw: &str) {
        let Some(resolver) = self.config.entity_resolver.clone() else {
            return;
        };
        let mut rest = raw;
        while let Some(start) = rest.find('&') {
            rest = &rest[start + 1..];
            let Some(end) = rest.find(';') else {
                break;
            };
            let name = &rest[..end];
            rest = &rest[end + 1..];
            if name.is_empty()
                || name.starts_with('#')
                || matches!(name, "amp" | "lt" | "gt" | "apos" | "quot")
                || self.entity_cache.contains_key(name)
            {
                continue;
            }
            if let Some(value) = resolver.resolve_entity(name) {
                self.entity_cache.insert(name.to_string(), value);
            }
        }
    }

    /// Reports a fatal diagnostic and produces the matching syntax error.
    /// The handler is notified for observability; fatal failures abort
    /// regardless of its decision.
    fn fatal(&self, message: impl Into<String>, offset: u64) -> ParseError {
        let diagnostic = Diagnostic::new(Severity::Fatal, message, offset);
        self.config.error_handler.fatal(&diagnostic);
        ParseError::Syntax {
            message: diagnostic.message,
            offset,
        }
    }
}

impl std::fmt::Debug for DocumentBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentBuilder")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

fn read_declaration(decl: &BytesDecl) -> XmlDeclaration {
    XmlDeclaration {
        version: decl
            .version()
            .ok()
            .map(|v| String::from_utf8_lossy(&v).into_owned()),
        encoding: decl
            .encoding()
            .and_then(|r| r.ok())
            .map(|v| String::from_utf8_lossy(&v).into_owned()),
        standalone: decl
            .standalone()
            .and_then(|r| r.ok())
            .map(|v| String::from_utf8_lossy(&v).into_owned()),
    }
}

/// Appends character data to `parent`, merging with a trailing text node
/// when coalescing.
fn append_text(parent: &mut Element, content: String, coalescing: bool) {
    if coalescing {
        if let Some(Node::Text(existing)) = parent.last_child_mut() {
            existing.push_str(&content);
            return;
        }
    }
    parent.push_child(Node::Text(content));
}

/// Maps an engine failure onto the parse-error taxonomy, keeping I/O causes
/// distinguishable from content-syntax causes.
fn classify(err: quick_xml::Error, offset: u64) -> ParseError {
    match err {
        quick_xml::Error::Io(io_err) => {
            ParseError::Io(io::Error::new(io_err.kind(), io_err.to_string()))
        }
        other => ParseError::Syntax {
            message: other.to_string(),
            offset,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Schema;
    use crate::handler::{EntityResolver, ErrorHandler};
    use std::sync::Mutex;

    fn factory(config: ParserConfig) -> BuilderFactory {
        BuilderFactory::new(Arc::new(config)).expect("config accepted")
    }

    fn parse(config: ParserConfig, input: &str) -> Result<Document, ParseError> {
        factory(config).create().parse_str(input)
    }

    #[test]
    fn test_parse_simple_document() {
        let doc = parse(
            ParserConfig::default(),
            r#"<?xml version="1.0" encoding="UTF-8"?><root id="1"><child>hi</child></root>"#,
        )
        .expect("well-formed input");

        let decl = doc.declaration().expect("declaration captured");
        assert_eq!(decl.version.as_deref(), Some("1.0"));
        assert_eq!(decl.encoding.as_deref(), Some("UTF-8"));

        let root = doc.root_element().expect("root present");
        assert_eq!(root.name(), "root");
        assert_eq!(root.attribute("id"), Some("1"));
        let child = root.child_elements().next().expect("child element");
        assert_eq!(child.text(), "hi");
    }

    #[test]
    fn test_mismatched_end_tag_is_syntax_error() {
        let err = parse(ParserConfig::default(), "<a><b></a>").unwrap_err();
        assert!(err.is_syntax(), "expected syntax cause, got {err:?}");
    }

    #[test]
    fn test_unclosed_document_is_syntax_error() {
        let err = parse(ParserConfig::default(), "<a><b>").unwrap_err();
        assert!(err.is_syntax());
    }

    #[test]
    fn test_empty_input_has_no_root() {
        let err = parse(ParserConfig::default(), "   ").unwrap_err();
        assert!(err.is_syntax());
    }

    #[test]
    fn test_io_failure_is_distinguished() {
        struct BrokenStream;
        impl Read for BrokenStream {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "stream reset"))
            }
        }

        let err = factory(ParserConfig::default())
            .create()
            .parse_reader(BrokenStream)
            .unwrap_err();
        assert!(err.is_io(), "expected io cause, got {err:?}");
    }

    #[test]
    fn test_comments_ignored_by_default() {
        let doc = parse(ParserConfig::default(), "<r><!-- note --><c/></r>").unwrap();
        let root = doc.root_element().unwrap();
        assert!(
            root.children()
                .iter()
                .all(|n| !matches!(n, Node::Comment(_)))
        );
    }

    #[test]
    fn test_comments_kept_when_configured() {
        let mut config = ParserConfig::default();
        config.ignore_comments = false;
        let doc = parse(config, "<r><!-- note --></r>").unwrap();
        let root = doc.root_element().unwrap();
        assert!(matches!(root.children(), [Node::Comment(c)] if c.trim() == "note"));
    }

    #[test]
    fn test_whitespace_only_text_dropped_by_default() {
        let doc = parse(ParserConfig::default(), "<r>\n  <c/>\n</r>").unwrap();
        let root = doc.root_element().unwrap();
        assert_eq!(root.children().len(), 1);
    }

    #[test]
    fn test_whitespace_kept_when_configured() {
        let mut config = ParserConfig::default();
        config.ignore_element_content_whitespace = false;
        let doc = parse(config, "<r>\n  <c/>\n</r>").unwrap();
        let root = doc.root_element().unwrap();
        assert!(root.children().len() > 1);
    }

    #[test]
    fn test_cdata_coalesced_by_default() {
        let doc = parse(ParserConfig::default(), "<r>a<![CDATA[<b>]]>c</r>").unwrap();
        let root = doc.root_element().unwrap();
        assert_eq!(root.children().len(), 1);
        assert!(matches!(root.children(), [Node::Text(t)] if t == "a<b>c"));
    }

    #[test]
    fn test_cdata_preserved_without_coalescing() {
        let mut config = ParserConfig::default();
        config.coalescing = false;
        let doc = parse(config, "<r>a<![CDATA[<b>]]>c</r>").unwrap();
        let root = doc.root_element().unwrap();
        assert_eq!(root.children().len(), 3);
        assert!(matches!(&root.children()[1], Node::CData(t) if t == "<b>"));
    }

    #[test]
    fn test_predefined_entities_expand() {
        let doc = parse(ParserConfig::default(), "<r>a &amp; b &#65;</r>").unwrap();
        assert_eq!(doc.root_element().unwrap().text(), "a & b A");
    }

    #[test]
    fn test_entity_references_preserved_when_not_expanding() {
        let mut config = ParserConfig::default();
        config.expand_entity_references = false;
        let doc = parse(config, "<r>a &amp; b</r>").unwrap();
        assert_eq!(doc.root_element().unwrap().text(), "a &amp; b");
    }

    #[test]
    fn test_unknown_entity_rejected_by_default() {
        let err = parse(ParserConfig::default(), "<r>&external;</r>").unwrap_err();
        assert!(err.is_syntax());
    }

    #[test]
    fn test_resolver_supplies_entities() {
        struct Known;
        impl EntityResolver for Known {
            fn resolve_entity(&self, name: &str) -> Option<String> {
                (name == "greeting").then(|| "hello".to_string())
            }
        }

        let mut config = ParserConfig::default();
        config.entity_resolver = Some(Arc::new(Known));
        let doc = parse(config, "<r>&greeting; world</r>").unwrap();
        assert_eq!(doc.root_element().unwrap().text(), "hello world");
    }

    #[test]
    fn test_resolver_refusal_still_rejects() {
        struct DenyAll;
        impl EntityResolver for DenyAll {
            fn resolve_entity(&self, _name: &str) -> Option<String> {
                None
            }
        }

        let mut config = ParserConfig::default();
        config.entity_resolver = Some(Arc::new(DenyAll));
        let err = parse(config, "<r>&external;</r>").unwrap_err();
        assert!(err.is_syntax());
    }

    #[test]
    fn test_lenient_entities_keep_reference_textual() {
        let mut config = ParserConfig::default();
        config
            .features
            .insert(feature::LENIENT_ENTITIES.to_string(), true);
        let doc = parse(config, "<r>&external;</r>").unwrap();
        assert_eq!(doc.root_element().unwrap().text(), "&external;");
    }

    #[test]
    fn test_handler_abort_is_honored_for_recoverable_errors() {
        struct AbortOnError;
        impl ErrorHandler for AbortOnError {
            fn warning(&self, _d: &Diagnostic) -> HandlerDecision {
                HandlerDecision::Continue
            }
            fn error(&self, _d: &Diagnostic) -> HandlerDecision {
                HandlerDecision::Abort
            }
            fn fatal(&self, _d: &Diagnostic) -> HandlerDecision {
                HandlerDecision::Abort
            }
        }

        let mut config = ParserConfig::default();
        config
            .features
            .insert(feature::LENIENT_ENTITIES.to_string(), true);
        config.error_handler = Arc::new(AbortOnError);
        let err = parse(config, "<r>&external;</r>").unwrap_err();
        assert!(err.is_syntax());
    }

    #[test]
    fn test_fatal_diagnostics_reach_the_handler() {
        #[derive(Default)]
        struct Recording(Mutex<Vec<Severity>>);
        impl ErrorHandler for Recording {
            fn warning(&self, d: &Diagnostic) -> HandlerDecision {
                self.0.lock().unwrap().push(d.severity);
                HandlerDecision::Continue
            }
            fn error(&self, d: &Diagnostic) -> HandlerDecision {
                self.0.lock().unwrap().push(d.severity);
                HandlerDecision::Continue
            }
            fn fatal(&self, d: &Diagnostic) -> HandlerDecision {
                self.0.lock().unwrap().push(d.severity);
                HandlerDecision::Abort
            }
        }

        let recording = Arc::new(Recording::default());
        let mut config = ParserConfig::default();
        config.error_handler = recording.clone();
        let _ = parse(config, "<a><b></a>").unwrap_err();
        assert_eq!(&*recording.0.lock().unwrap(), &[Severity::Fatal]);
    }

    #[test]
    fn test_duplicate_attributes_fatal_by_default() {
        let err = parse(ParserConfig::default(), r#"<r a="1" a="2"/>"#).unwrap_err();
        assert!(err.is_syntax());
    }

    #[test]
    fn test_duplicate_attributes_tolerated_with_feature() {
        let mut config = ParserConfig::default();
        config
            .features
            .insert(feature::ALLOW_DUPLICATE_ATTRIBUTES.to_string(), true);
        let doc = parse(config, r#"<r a="1" a="2"/>"#).unwrap();
        assert_eq!(doc.root_element().unwrap().attribute("a"), Some("1"));
    }

    #[test]
    fn test_depth_limit_enforced() {
        let mut config = ParserConfig::default();
        config
            .attributes
            .insert(attr::MAX_DEPTH.to_string(), AttributeValue::Integer(3));
        let err = parse(config, "<a><b><c><d/></c></b></a>").unwrap_err();
        assert!(err.is_syntax());
    }

    #[test]
    fn test_attribute_count_limit_enforced() {
        let mut config = ParserConfig::default();
        config.attributes.insert(
            attr::MAX_ATTRIBUTE_COUNT.to_string(),
            AttributeValue::Integer(2),
        );
        let err = parse(config, r#"<r a="1" b="2" c="3"/>"#).unwrap_err();
        assert!(err.is_syntax());
    }

    #[test]
    fn test_doctype_disallowed_by_feature() {
        let mut config = ParserConfig::default();
        config
            .features
            .insert(feature::ALLOW_DOCTYPE.to_string(), false);
        let err = parse(config, "<!DOCTYPE r><r/>").unwrap_err();
        assert!(err.is_syntax());
    }

    #[test]
    fn test_doctype_name_recorded() {
        let doc = parse(ParserConfig::default(), "<!DOCTYPE catalog><catalog/>").unwrap();
        assert_eq!(doc.doctype_name(), Some("catalog"));
    }

    #[test]
    fn test_namespace_aware_name_split() {
        let doc = parse(
            ParserConfig::default(),
            r#"<md:metadata xmlns:md="urn:example:md" md:kind="x"/>"#,
        )
        .unwrap();
        let root = doc.root_element().unwrap();
        assert_eq!(root.name(), "md:metadata");
        assert_eq!(root.prefix(), Some("md"));
        assert_eq!(root.local_name(), "metadata");
        assert_eq!(
            root.namespace_declarations(),
            &[("md".to_string(), "urn:example:md".to_string())]
        );
        assert_eq!(root.attribute("md:kind"), Some("x"));
    }

    #[test]
    fn test_namespace_processing_disabled() {
        let mut config = ParserConfig::default();
        config.namespace_aware = false;
        let doc = parse(config, r#"<md:metadata xmlns:md="urn:example:md"/>"#).unwrap();
        let root = doc.root_element().unwrap();
        assert_eq!(root.local_name(), "md:metadata");
        assert!(root.namespace_declarations().is_empty());
        assert_eq!(root.attribute("xmlns:md"), Some("urn:example:md"));
    }

    #[test]
    fn test_multiple_roots_rejected() {
        let err = parse(ParserConfig::default(), "<a/><b/>").unwrap_err();
        assert!(err.is_syntax());
    }

    #[test]
    fn test_factory_rejects_unknown_feature() {
        let mut config = ParserConfig::default();
        config.features.insert("frobnicate".to_string(), true);
        let err = BuilderFactory::new(Arc::new(config)).unwrap_err();
        assert!(matches!(err, InitError::UnsupportedFeature { key } if key == "frobnicate"));
    }

    #[test]
    fn test_factory_rejects_unknown_attribute() {
        let mut config = ParserConfig::default();
        config.attributes.insert(
            "no-such-knob".to_string(),
            AttributeValue::Bool(true),
        );
        let err = BuilderFactory::new(Arc::new(config)).unwrap_err();
        assert!(matches!(err, InitError::UnsupportedAttribute { key } if key == "no-such-knob"));
    }

    #[test]
    fn test_factory_rejects_ill_typed_limit() {
        let mut config = ParserConfig::default();
        config.attributes.insert(
            attr::MAX_DEPTH.to_string(),
            AttributeValue::Text("lots".to_string()),
        );
        let err = BuilderFactory::new(Arc::new(config)).unwrap_err();
        assert!(matches!(err, InitError::InvalidAttributeValue { key, .. } if key == attr::MAX_DEPTH));

        let mut config = ParserConfig::default();
        config
            .attributes
            .insert(attr::MAX_DEPTH.to_string(), AttributeValue::Integer(0));
        assert!(BuilderFactory::new(Arc::new(config)).is_err());
    }

    #[test]
    fn test_builder_ids_are_distinct() {
        let factory = factory(ParserConfig::default());
        let a = factory.create();
        let b = factory.create();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_new_document_is_empty() {
        let builder = factory(ParserConfig::default()).create();
        let doc = builder.new_document();
        assert!(doc.root_element().is_none());
    }

    #[test]
    fn test_reset_clears_entity_memo() {
        struct Counting(Mutex<usize>);
        impl EntityResolver for Counting {
            fn resolve_entity(&self, _name: &str) -> Option<String> {
                *self.0.lock().unwrap() += 1;
                Some("v".to_string())
            }
        }

        let counting = Arc::new(Counting(Mutex::new(0)));
        let mut config = ParserConfig::default();
        config.entity_resolver = Some(counting.clone());
        let mut builder = factory(config).create();

        builder.parse_str("<r>&e;</r>").unwrap();
        builder.parse_str("<r>&e;</r>").unwrap();
        assert_eq!(*counting.0.lock().unwrap(), 1, "memoized across parses");

        builder.reset();
        builder.parse_str("<r>&e;</r>").unwrap();
        assert_eq!(*counting.0.lock().unwrap(), 2, "memo cleared by reset");
    }

    #[test]
    fn test_schema_config_parses_namespaced_input() {
        let mut config = ParserConfig::default();
        config.namespace_aware = false;
        config.assign_schema(Some(Schema::new("urn:example:md")));
        let doc = parse(config, r#"<m:r xmlns:m="urn:example:md"/>"#).unwrap();
        assert_eq!(doc.root_element().unwrap().local_name(), "r");
    }
}
