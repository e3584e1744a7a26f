use lazy_static::lazy_static;
use regex::{Captures, Regex};

use super::{map_children, NodePass, NormalizeContext, PassResult};
use crate::node::{ElementNode, ExpressionNode, Node};
use crate::settings::Binding;

lazy_static! {
    static ref REFERENCE_RE: Regex = Regex::new(r#""@(\w+)"|@(\w+)"#).unwrap();
}

/// Replaces elements named by a caller binding with the binding's expression.
pub struct BindingExpansion;

impl NodePass for BindingExpansion {
    fn name(&self) -> &'static str {
        "binding"
    }

    fn apply(&self, nodes: Vec<Node>, context: &mut NormalizeContext<'_>) -> PassResult {
        let bindings = context.settings.bindings.clone();
        if bindings.is_empty() {
            return Ok(nodes);
        }
        nodes
            .into_iter()
            .map(|node| {
                let node = map_children(node, &mut |children| self.apply(children, context))?;
                Ok(match node {
                    Node::Element(element) => match expand(&element, &bindings) {
                        Some(expression) => expression,
                        None => Node::Element(element),
                    },
                    other => other,
                })
            })
            .collect()
    }
}

fn expand(element: &ElementNode, bindings: &[Binding]) -> Option<Node> {
    let binding = bindings.iter().find(|b| {
        b.element_name == element.name && references_present(&b.phrase, element)
    })?;

    let code = REFERENCE_RE.replace_all(&binding.phrase, |captures: &Captures| {
        if let Some(quoted) = captures.get(1) {
            let text = element
                .attribute(quoted.as_str())
                .map(|a| a.text_value())
                .unwrap_or_default();
            quote_string(&text)
        } else {
            let name = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
            element.attribute(name).map(|a| a.code()).unwrap_or_default()
        }
    });

    Some(Node::Expression(ExpressionNode {
        code: code.into_owned(),
        silent_nulls: false,
        raw: true,
        position: element.position.clone(),
    }))
}

fn references_present(phrase: &str, element: &ElementNode) -> bool {
    REFERENCE_RE.captures_iter(phrase).all(|captures| {
        let name = captures
            .get(1)
            .or_else(|| captures.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        element.attribute(name).is_some()
    })
}

fn quote_string(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}
