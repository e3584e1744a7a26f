//! Node tree normalization.
//!
//! A fixed sequence of single-purpose rewrite passes. Each pass consumes one
//! node list and returns a new one; retained nodes keep their positions and
//! synthesized nodes carry the position of the node they came from.

mod binding;
mod cache;
mod control;
mod include;
mod namespace;
mod omit_lines;
mod once;
mod prefix;
mod special;
mod test_else;
mod url;

use std::sync::Arc;

use crate::error::CompileError;
use crate::node::{AttributeNode, ElementNode, Node, SpecialNode};
use crate::pipeline::TemplateSource;
use crate::settings::CompilerSettings;

pub use binding::BindingExpansion;
pub use cache::CacheAttribute;
pub use control::ControlAttributes;
pub use include::IncludeExpansion;
pub use namespace::NamespaceScoping;
pub use omit_lines::OmitExtraLines;
pub use once::OnceAttribute;
pub use prefix::PrefixExpansion;
pub use special::SpecialRecognition;
pub use test_else::TestElsePairing;
pub use url::UrlRewriting;

pub type PassResult = Result<Vec<Node>, CompileError>;

/// Everything a pass may consult besides the tree itself.
pub struct NormalizeContext<'a> {
    pub settings: &'a CompilerSettings,
    /// Identifier of the template being normalized.
    pub template: String,
    pub source: Option<&'a dyn TemplateSource>,
    pub extensions: Option<Arc<dyn crate::node::ExtensionFactory>>,
    /// Templates currently being inlined by include expansion.
    pub include_stack: Vec<String>,
}

impl<'a> NormalizeContext<'a> {
    pub fn new(settings: &'a CompilerSettings, template: impl Into<String>) -> Self {
        let template = template.into();
        Self {
            settings,
            include_stack: vec![template.clone()],
            template,
            source: None,
            extensions: None,
        }
    }

    pub fn with_source(mut self, source: &'a dyn TemplateSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_extensions(mut self, extensions: Option<Arc<dyn crate::node::ExtensionFactory>>) -> Self {
        self.extensions = extensions;
        self
    }
}

pub trait NodePass {
    fn name(&self) -> &'static str;

    fn apply(&self, nodes: Vec<Node>, context: &mut NormalizeContext<'_>) -> PassResult;
}

/// Runs every pass in order.
pub fn normalize(nodes: Vec<Node>, context: &mut NormalizeContext<'_>) -> PassResult {
    let passes: [&dyn NodePass; 11] = [
        &NamespaceScoping,
        &IncludeExpansion,
        &PrefixExpansion,
        &SpecialRecognition,
        &CacheAttribute,
        &ControlAttributes,
        &OmitExtraLines,
        &TestElsePairing,
        &OnceAttribute,
        &UrlRewriting,
        &BindingExpansion,
    ];
    let mut nodes = nodes;
    for pass in passes {
        nodes = pass.apply(nodes, context)?;
        tracing::trace!(pass = pass.name(), template = %context.template, nodes = nodes.len(), "normalization pass");
    }
    tracing::debug!(template = %context.template, nodes = nodes.len(), "normalized");
    Ok(nodes)
}

// ═══════════════════════════════════════════════════════════════════════════════
// SHARED REWRITE HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Rebuilds `node` with its child list passed through `rewrite`.
pub(crate) fn map_children<F>(node: Node, rewrite: &mut F) -> Result<Node, CompileError>
where
    F: FnMut(Vec<Node>) -> PassResult,
{
    Ok(match node {
        Node::Element(mut element) => {
            let children = std::mem::take(&mut element.children);
            element.children = rewrite(children)?;
            Node::Element(element)
        }
        Node::Special(mut special) => {
            let body = std::mem::take(&mut special.body);
            special.body = rewrite(body)?;
            Node::Special(special)
        }
        Node::Extension(mut extension) => {
            let body = std::mem::take(&mut extension.body);
            extension.body = rewrite(body)?;
            Node::Extension(extension)
        }
        other => other,
    })
}

/// Wraps `inner` in a directive named `name` whose only attribute is `attribute`.
pub(crate) fn wrap_in_special(name: &str, attribute: Option<AttributeNode>, inner: Node) -> Node {
    let mut element = ElementNode::new(name, inner.position().clone());
    if let Some(attribute) = attribute {
        element.attributes.push(attribute);
    }
    Node::Special(SpecialNode {
        element,
        body: vec![inner],
    })
}

/// The attribute list of an element or directive node.
pub(crate) fn attributes_mut(node: &mut Node) -> Option<&mut ElementNode> {
    match node {
        Node::Element(element) => Some(element),
        Node::Special(special) => Some(&mut special.element),
        Node::Extension(extension) => Some(&mut extension.element),
        _ => None,
    }
}

pub(crate) fn rename(mut attribute: AttributeNode, name: &str) -> AttributeNode {
    attribute.name = name.to_string();
    attribute.namespace = None;
    attribute
}
