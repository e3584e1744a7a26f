use super::{attributes_mut, map_children, rename, wrap_in_special, NodePass, NormalizeContext, PassResult};
use crate::node::Node;

/// `each="x in xs"`, `if="..."`, `elseif="..."` and `else` attributes wrap
/// their element in the matching directive. Iteration is innermost.
pub struct ControlAttributes;

impl NodePass for ControlAttributes {
    fn name(&self) -> &'static str {
        "control"
    }

    fn apply(&self, nodes: Vec<Node>, context: &mut NormalizeContext<'_>) -> PassResult {
        nodes
            .into_iter()
            .map(|node| {
                let node = map_children(node, &mut |children| self.apply(children, context))?;
                Ok(wrap_control(node))
            })
            .collect()
    }
}

fn wrap_control(mut node: Node) -> Node {
    let directive = node.special_name().map(str::to_string);
    let consumes_if = matches!(directive.as_deref(), Some("if" | "elseif" | "else" | "test"));
    let consumes_each = directive.as_deref() == Some("for");

    let Some(element) = attributes_mut(&mut node) else {
        return node;
    };
    let each = if consumes_each {
        None
    } else {
        element.take_attribute("each")
    };
    let (when, when_else_if, otherwise) = if consumes_if {
        (None, None, None)
    } else {
        (
            element.take_attribute("if"),
            element.take_attribute("elseif"),
            element.take_attribute("else"),
        )
    };

    if let Some(each) = each {
        node = wrap_in_special("for", Some(rename(each, "each")), node);
    }
    if let Some(condition) = when {
        node = wrap_in_special("if", Some(rename(condition, "condition")), node);
    } else if let Some(condition) = when_else_if {
        node = wrap_in_special("elseif", Some(rename(condition, "condition")), node);
    } else if otherwise.is_some() {
        node = wrap_in_special("else", None, node);
    }
    node
}
