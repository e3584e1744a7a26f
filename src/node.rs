//! Node tree contract.
//!
//! The node tree is produced by the markup grammar, which lives outside this
//! crate. Every node carries the [`Position`] it was parsed from; normalization
//! passes keep those positions on retained nodes and stamp the position of the
//! originating node on synthesized ones.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::chunk::{Chunk, OutputLocation};

/// Namespace uri that marks elements as view directives.
pub const VIEW_NAMESPACE: &str = "http://sparkviewengine.com/";

/// Namespace uri of XInclude elements.
pub const XINCLUDE_NAMESPACE: &str = "http://www.w3.org/2001/XInclude";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub template: String,
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(template: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            template: template.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.template, self.line, self.column)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NODE TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Node {
    Text(TextNode),
    Element(ElementNode),
    Expression(ExpressionNode),
    Special(SpecialNode),
    #[serde(skip)]
    Extension(ExtensionNode),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextNode {
    pub value: String,
    #[serde(default)]
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementNode {
    pub name: String,
    /// Namespace uri resolved from the element prefix, if any.
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub attributes: Vec<AttributeNode>,
    #[serde(default)]
    pub children: Vec<Node>,
    /// Self-closing in the source (`<br/>`).
    #[serde(default)]
    pub is_empty: bool,
    #[serde(default)]
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionNode {
    pub code: String,
    /// `$!{}` form: a failed member access never raises.
    #[serde(default)]
    pub silent_nulls: bool,
    /// `!{}` form: never html encoded.
    #[serde(default)]
    pub raw: bool,
    #[serde(default)]
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeNode {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Text and expression parts, in source order.
    #[serde(default)]
    pub value: Vec<Node>,
    #[serde(default = "default_quote")]
    pub quote: char,
    #[serde(default)]
    pub position: Position,
}

fn default_quote() -> char {
    '"'
}

/// A recognized directive element. `element.children` is always empty; the
/// directive content lives in `body`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialNode {
    pub element: ElementNode,
    #[serde(default)]
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionNode {
    pub element: ElementNode,
    pub body: Vec<Node>,
    pub extension: ExtensionHandle,
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXTENSIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Caller-supplied behaviour attached to an element the grammar knows nothing
/// about.
pub trait ViewExtension: fmt::Debug + Send + Sync {
    /// Chunks that execute where the extension element appears. Receives the
    /// lowered element body.
    fn lower(&self, body: Vec<Chunk>) -> Vec<Chunk> {
        body
    }

    /// Writes backend source text for `location`.
    fn emit(&self, location: OutputLocation, body: &[Chunk], output: &mut String);
}

/// Recognizes extension elements during special-element recognition.
pub trait ExtensionFactory: Send + Sync {
    fn create(&self, element: &ElementNode) -> Option<Arc<dyn ViewExtension>>;
}

/// Shared extension pointer. Two handles are equal when they point at the
/// same extension instance.
#[derive(Clone)]
pub struct ExtensionHandle(pub Arc<dyn ViewExtension>);

impl fmt::Debug for ExtensionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl PartialEq for ExtensionHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::ops::Deref for ExtensionHandle {
    type Target = dyn ViewExtension;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

impl Node {
    pub fn text(value: impl Into<String>, position: Position) -> Node {
        Node::Text(TextNode {
            value: value.into(),
            position,
        })
    }

    pub fn expression(code: impl Into<String>, position: Position) -> Node {
        Node::Expression(ExpressionNode {
            code: code.into(),
            silent_nulls: false,
            raw: false,
            position,
        })
    }

    pub fn position(&self) -> &Position {
        match self {
            Node::Text(n) => &n.position,
            Node::Element(n) => &n.position,
            Node::Expression(n) => &n.position,
            Node::Special(n) => &n.element.position,
            Node::Extension(n) => &n.element.position,
        }
    }

    /// True for text made only of whitespace.
    pub fn is_blank_text(&self) -> bool {
        matches!(self, Node::Text(t) if t.value.trim().is_empty())
    }

    /// Local name of a special node, if this is one.
    pub fn special_name(&self) -> Option<&str> {
        match self {
            Node::Special(s) => Some(s.element.name.as_str()),
            _ => None,
        }
    }

    /// Parses a node list delivered as JSON by an out-of-process producer.
    pub fn from_json(json: &str) -> Result<Vec<Node>, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl ElementNode {
    pub fn new(name: impl Into<String>, position: Position) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            attributes: Vec::new(),
            children: Vec::new(),
            is_empty: false,
            position,
        }
    }

    /// Builder helper: adds a plain text attribute.
    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        let position = self.position.clone();
        self.attributes
            .push(AttributeNode::text(name, value, position));
        self
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    pub fn empty(mut self) -> Self {
        self.is_empty = true;
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeNode> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Removes and returns the named attribute.
    pub fn take_attribute(&mut self, name: &str) -> Option<AttributeNode> {
        let index = self.attributes.iter().position(|a| a.name == name)?;
        Some(self.attributes.remove(index))
    }

    /// Name without its `prefix:` part.
    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(p, _)| p)
    }
}

impl AttributeNode {
    pub fn text(name: &str, value: &str, position: Position) -> Self {
        Self {
            name: name.to_string(),
            namespace: None,
            value: vec![Node::text(value, position.clone())],
            quote: '"',
            position,
        }
    }

    /// The attribute value read as embedded code: text parts verbatim,
    /// expression parts by their code.
    pub fn code(&self) -> String {
        let mut code = String::new();
        for part in &self.value {
            match part {
                Node::Text(t) => code.push_str(&t.value),
                Node::Expression(e) => code.push_str(&e.code),
                _ => {}
            }
        }
        code
    }

    /// Only the literal text of the value.
    pub fn text_value(&self) -> String {
        self.value
            .iter()
            .filter_map(|part| match part {
                Node::Text(t) => Some(t.value.as_str()),
                _ => None,
            })
            .collect()
    }
}

pub fn local_name(name: &str) -> &str {
    name.split_once(':').map(|(_, l)| l).unwrap_or(name)
}
