use super::{map_children, NodePass, NormalizeContext, PassResult};
use crate::node::{AttributeNode, Node};

/// `macro:NAME`, `render:NAME` and `use:NAME` shorthand, expanded to the
/// directive element with the name moved into an attribute.
pub struct PrefixExpansion;

const SHORTHANDS: &[(&str, &str, &str)] = &[
    ("macro", "macro", "name"),
    ("render", "render", "partial"),
    ("use", "use", "content"),
];

impl NodePass for PrefixExpansion {
    fn name(&self) -> &'static str {
        "prefix"
    }

    fn apply(&self, nodes: Vec<Node>, context: &mut NormalizeContext<'_>) -> PassResult {
        nodes
            .into_iter()
            .map(|node| {
                let node = match node {
                    Node::Element(mut element) => {
                        let expansion = element.name.split_once(':').and_then(|(prefix, rest)| {
                            SHORTHANDS
                                .iter()
                                .find(|(p, _, _)| *p == prefix)
                                .map(|(_, directive, attribute)| (*directive, *attribute, rest.to_string()))
                        });
                        if let Some((directive, attribute, value)) = expansion {
                            let position = element.position.clone();
                            element.name = directive.to_string();
                            element.namespace = None;
                            element
                                .attributes
                                .insert(0, AttributeNode::text(attribute, &value, position));
                        }
                        Node::Element(element)
                    }
                    other => other,
                };
                map_children(node, &mut |children| self.apply(children, context))
            })
            .collect()
    }
}
