use super::{map_children, NodePass, NormalizeContext, PassResult};
use crate::node::{AttributeNode, Node, TextNode};

/// Attribute values starting with `~/` are rewritten to `${SiteRoot}/...`.
pub struct UrlRewriting;

impl NodePass for UrlRewriting {
    fn name(&self) -> &'static str {
        "url"
    }

    fn apply(&self, nodes: Vec<Node>, context: &mut NormalizeContext<'_>) -> PassResult {
        nodes
            .into_iter()
            .map(|node| {
                let node = match node {
                    Node::Element(mut element) => {
                        element.attributes = element.attributes.into_iter().map(rewrite_attribute).collect();
                        Node::Element(element)
                    }
                    other => other,
                };
                map_children(node, &mut |children| self.apply(children, context))
            })
            .collect()
    }
}

fn rewrite_attribute(mut attribute: AttributeNode) -> AttributeNode {
    let rest = match attribute.value.first() {
        Some(Node::Text(TextNode { value, position })) => match value.strip_prefix("~/") {
            Some(rest) => Some((format!("/{}", rest), position.clone())),
            None => None,
        },
        _ => None,
    };
    if let Some((rest, position)) = rest {
        attribute.value.remove(0);
        attribute.value.insert(0, Node::text(rest, position.clone()));
        attribute.value.insert(0, Node::expression("SiteRoot", position));
    }
    attribute
}
