use super::{attributes_mut, map_children, rename, wrap_in_special, NodePass, NormalizeContext, PassResult};
use crate::node::Node;

/// `cache="key"` on any element wraps it in a `<cache key="key">` directive.
pub struct CacheAttribute;

impl NodePass for CacheAttribute {
    fn name(&self) -> &'static str {
        "cache"
    }

    fn apply(&self, nodes: Vec<Node>, context: &mut NormalizeContext<'_>) -> PassResult {
        nodes
            .into_iter()
            .map(|node| {
                let mut node = map_children(node, &mut |children| self.apply(children, context))?;
                if node.special_name() == Some("cache") {
                    return Ok(node);
                }
                let key = attributes_mut(&mut node).and_then(|element| element.take_attribute("cache"));
                Ok(match key {
                    Some(key) => wrap_in_special("cache", Some(rename(key, "key")), node),
                    None => node,
                })
            })
            .collect()
    }
}
