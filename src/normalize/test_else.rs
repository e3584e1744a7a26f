use super::{map_children, NodePass, NormalizeContext, PassResult};
use crate::error::CompileError;
use crate::node::{ElementNode, Node, SpecialNode};

/// Splits `<test if="...">` at its `<else/>` separators into an if/elseif/else
/// group, and pairs sibling else/elseif directives with the branch before them.
pub struct TestElsePairing;

impl NodePass for TestElsePairing {
    fn name(&self) -> &'static str {
        "test-else"
    }

    fn apply(&self, nodes: Vec<Node>, context: &mut NormalizeContext<'_>) -> PassResult {
        let mut expanded = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                // The else separators of a test are not paired as siblings.
                Node::Special(mut test) if test.element.name == "test" => {
                    test.body = test
                        .body
                        .into_iter()
                        .map(|child| map_children(child, &mut |children| self.apply(children, context)))
                        .collect::<Result<_, _>>()?;
                    for group in split_test(test) {
                        let Node::Special(mut group) = group else {
                            continue;
                        };
                        group.body = pair_siblings(std::mem::take(&mut group.body))?;
                        expanded.push(Node::Special(group));
                    }
                }
                other => expanded.push(map_children(other, &mut |children| self.apply(children, context))?),
            }
        }
        pair_siblings(expanded)
    }
}

fn condition_of(element: &ElementNode) -> Option<crate::node::AttributeNode> {
    element
        .attribute("condition")
        .or_else(|| element.attribute("if"))
        .cloned()
        .map(|attribute| super::rename(attribute, "condition"))
}

fn branch(name: &str, template: &ElementNode, condition: Option<crate::node::AttributeNode>, body: Vec<Node>) -> Node {
    let mut element = ElementNode::new(name, template.position.clone());
    if let Some(condition) = condition {
        element.attributes.push(condition);
    }
    Node::Special(SpecialNode { element, body })
}

fn split_test(test: SpecialNode) -> Vec<Node> {
    let mut groups = vec![branch("if", &test.element, condition_of(&test.element), Vec::new())];
    for child in test.body {
        match child {
            Node::Special(separator) if separator.element.name == "else" => {
                let name = if condition_of(&separator.element).is_some() {
                    "elseif"
                } else {
                    "else"
                };
                groups.push(branch(
                    name,
                    &separator.element,
                    condition_of(&separator.element),
                    separator.body,
                ));
            }
            other => {
                if let Some(Node::Special(last)) = groups.last_mut() {
                    last.body.push(other);
                }
            }
        }
    }
    groups
}

/// Drops blank text between a branch and the else/elseif that continues it.
/// An else or elseif with no branch before it is an error.
fn pair_siblings(nodes: Vec<Node>) -> PassResult {
    let mut output: Vec<Node> = Vec::with_capacity(nodes.len());
    for node in nodes {
        let continues_chain = matches!(node.special_name(), Some("else" | "elseif"));
        if !continues_chain {
            output.push(node);
            continue;
        }

        while output.last().is_some_and(Node::is_blank_text) {
            output.pop();
        }
        let follows_branch = matches!(
            output.last().and_then(Node::special_name),
            Some("if" | "unless" | "elseif")
        );
        if !follows_branch {
            let name = node.special_name().unwrap_or("else");
            return Err(CompileError::normalization(
                format!("'{}' must follow an 'if' or 'elseif'", name),
                node.position(),
            ));
        }

        let node = match node {
            Node::Special(special) if special.element.name == "else" && condition_of(&special.element).is_some() => {
                branch("elseif", &special.element, condition_of(&special.element), special.body)
            }
            other => other,
        };
        output.push(node);
    }
    Ok(output)
}
