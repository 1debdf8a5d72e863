//! Minimal owned result tree produced by a [`DocumentBuilder`].
//!
//! The tree is deliberately small: read accessors only, no mutation API.
//! Consumers that need full DOM manipulation operate on their own
//! representations downstream.
//!
//! [`DocumentBuilder`]: crate::engine::DocumentBuilder

/// The XML declaration, if the input carried one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlDeclaration {
    pub version: Option<String>,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
}

/// A parsed XML document.
#[derive(Debug, Clone, Default)]
pub struct Document {
    declaration: Option<XmlDeclaration>,
    doctype_name: Option<String>,
    /// Comments and processing instructions outside the root element,
    /// in document order.
    prolog: Vec<Node>,
    root: Option<Element>,
}

impl Document {
    /// An empty document with no declaration and no root element.
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn new(
        declaration: Option<XmlDeclaration>,
        doctype_name: Option<String>,
        prolog: Vec<Node>,
        root: Option<Element>,
    ) -> Self {
        Self {
            declaration,
            doctype_name,
            prolog,
            root,
        }
    }

    pub fn declaration(&self) -> Option<&XmlDeclaration> {
        self.declaration.as_ref()
    }

    /// Name from the DOCTYPE declaration, when one was present.
    pub fn doctype_name(&self) -> Option<&str> {
        self.doctype_name.as_deref()
    }

    pub fn prolog(&self) -> &[Node] {
        &self.prolog
    }

    pub fn root_element(&self) -> Option<&Element> {
        self.root.as_ref()
    }
}

/// One element of the tree.
#[derive(Debug, Clone, Default)]
pub struct Element {
    /// Qualified name exactly as written in the input.
    name: String,
    /// Prefix portion of the name; populated only when the builder is
    /// namespace-aware.
    prefix: Option<String>,
    /// Local portion of the name; equals `name` when not namespace-aware.
    local_name: String,
    /// `xmlns`/`xmlns:p` declarations on this element as
    /// `(prefix, uri)` pairs; empty when not namespace-aware.
    namespace_declarations: Vec<(String, String)>,
    /// Non-namespace attributes in document order.
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    pub(crate) fn with_name(
        name: String,
        prefix: Option<String>,
        local_name: String,
    ) -> Self {
        Self {
            name,
            prefix,
            local_name,
            ..Self::default()
        }
    }

    pub(crate) fn push_attribute(&mut self, key: String, value: String) {
        self.attributes.push((key, value));
    }

    pub(crate) fn push_namespace(&mut self, prefix: String, uri: String) {
        self.namespace_declarations.push((prefix, uri));
    }

    pub(crate) fn push_child(&mut self, node: Node) {
        self.children.push(node);
    }

    pub(crate) fn last_child_mut(&mut self) -> Option<&mut Node> {
        self.children.last_mut()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn namespace_declarations(&self) -> &[(String, String)] {
        &self.namespace_declarations
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Child elements only, skipping text and other node kinds.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Concatenated character data of the direct Text and CData children.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                Node::Text(t) | Node::CData(t) => out.push_str(t),
                _ => {}
            }
        }
        out
    }
}

/// A node in element content.
#[derive(Debug, Clone)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
}
