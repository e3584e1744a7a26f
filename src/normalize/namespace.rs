use std::collections::BTreeMap;

use super::{map_children, NodePass, NormalizeContext, PassResult};
use crate::node::{Node, VIEW_NAMESPACE, XINCLUDE_NAMESPACE};

/// Resolves `prefix:` names against `xmlns:prefix` declarations in scope and
/// drops declarations of the view and XInclude namespaces.
pub struct NamespaceScoping;

impl NodePass for NamespaceScoping {
    fn name(&self) -> &'static str {
        "namespace"
    }

    fn apply(&self, nodes: Vec<Node>, _context: &mut NormalizeContext<'_>) -> PassResult {
        scope_list(nodes, &BTreeMap::new())
    }
}

fn scope_list(nodes: Vec<Node>, scope: &BTreeMap<String, String>) -> PassResult {
    nodes.into_iter().map(|node| scope_node(node, scope)).collect()
}

fn scope_node(node: Node, scope: &BTreeMap<String, String>) -> Result<Node, crate::error::CompileError> {
    let Node::Element(mut element) = node else {
        return map_children(node, &mut |children| scope_list(children, scope));
    };

    let mut inner = scope.clone();
    for attribute in &element.attributes {
        if let Some(prefix) = attribute.name.strip_prefix("xmlns:") {
            inner.insert(prefix.to_string(), attribute.text_value());
        }
    }
    element.attributes.retain(|attribute| {
        let declares = attribute.name == "xmlns" || attribute.name.starts_with("xmlns:");
        let value = attribute.text_value();
        !(declares && (value == VIEW_NAMESPACE || value == XINCLUDE_NAMESPACE))
    });

    if let Some(prefix) = element.prefix() {
        if let Some(uri) = inner.get(prefix) {
            element.namespace = Some(uri.clone());
        }
    }
    for attribute in &mut element.attributes {
        if let Some((prefix, _)) = attribute.name.split_once(':') {
            if let Some(uri) = inner.get(prefix) {
                attribute.namespace = Some(uri.clone());
            }
        }
    }

    let children = std::mem::take(&mut element.children);
    element.children = scope_list(children, &inner)?;
    Ok(Node::Element(element))
}
