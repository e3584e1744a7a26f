use super::{attributes_mut, map_children, rename, wrap_in_special, NodePass, NormalizeContext, PassResult};
use crate::node::Node;

/// `once="key"` renders the element only the first time `key` is seen in a
/// render call.
pub struct OnceAttribute;

impl NodePass for OnceAttribute {
    fn name(&self) -> &'static str {
        "once"
    }

    fn apply(&self, nodes: Vec<Node>, context: &mut NormalizeContext<'_>) -> PassResult {
        nodes
            .into_iter()
            .map(|node| {
                let mut node = map_children(node, &mut |children| self.apply(children, context))?;
                let key = attributes_mut(&mut node).and_then(|element| element.take_attribute("once"));
                Ok(match key {
                    Some(key) => wrap_in_special("once", Some(rename(key, "key")), node),
                    None => node,
                })
            })
            .collect()
    }
}
