use super::{NodePass, NormalizeContext, PassResult};
use crate::node::{ElementNode, ExtensionHandle, ExtensionNode, Node, SpecialNode, VIEW_NAMESPACE};

/// Local names that denote view directives.
pub const SPECIAL_NAMES: &[&str] = &[
    "var",
    "def",
    "global",
    "viewdata",
    "if",
    "unless",
    "elseif",
    "else",
    "test",
    "for",
    "use",
    "content",
    "set",
    "macro",
    "render",
    "pagebasetype",
    "basetype",
    "cache",
];

/// Turns directive elements into [`SpecialNode`]s and asks the extension
/// factory about the rest.
pub struct SpecialRecognition;

impl NodePass for SpecialRecognition {
    fn name(&self) -> &'static str {
        "special"
    }

    fn apply(&self, nodes: Vec<Node>, context: &mut NormalizeContext<'_>) -> PassResult {
        let mut output = Vec::with_capacity(nodes.len());
        for node in nodes {
            let Node::Element(mut element) = node else {
                output.push(super::map_children(node, &mut |children| self.apply(children, context))?);
                continue;
            };
            let children = std::mem::take(&mut element.children);
            let body = self.apply(children, context)?;

            if is_special(&element, context.settings.prefix.as_deref()) {
                element.name = element.local_name().to_string();
                element.namespace = None;
                output.push(Node::Special(SpecialNode { element, body }));
                continue;
            }

            let extension = context
                .extensions
                .as_ref()
                .and_then(|factory| factory.create(&element));
            match extension {
                Some(extension) => {
                    tracing::trace!(element = %element.name, "extension element recognized");
                    output.push(Node::Extension(ExtensionNode {
                        element,
                        body,
                        extension: ExtensionHandle(extension),
                    }));
                }
                None => {
                    element.children = body;
                    output.push(Node::Element(element));
                }
            }
        }
        Ok(output)
    }
}

fn is_special(element: &ElementNode, prefix: Option<&str>) -> bool {
    if !SPECIAL_NAMES.contains(&element.local_name()) {
        return false;
    }
    if element.namespace.as_deref() == Some(VIEW_NAMESPACE) {
        return true;
    }
    match (prefix, element.prefix()) {
        (None, None) => true,
        (Some(expected), Some(actual)) => expected == actual,
        _ => false,
    }
}
