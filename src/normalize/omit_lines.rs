use super::{map_children, NodePass, NormalizeContext, PassResult};
use crate::node::{Node, TextNode};

/// A directive standing alone on its line leaves no blank line behind: the
/// indentation before it and the line break after it are removed.
pub struct OmitExtraLines;

impl NodePass for OmitExtraLines {
    fn name(&self) -> &'static str {
        "omit-lines"
    }

    fn apply(&self, nodes: Vec<Node>, context: &mut NormalizeContext<'_>) -> PassResult {
        let mut nodes = nodes
            .into_iter()
            .map(|node| map_children(node, &mut |children| self.apply(children, context)))
            .collect::<Result<Vec<_>, _>>()?;

        for index in 0..nodes.len() {
            if !matches!(nodes[index], Node::Special(_)) {
                continue;
            }
            let starts_line = match index.checked_sub(1).map(|i| &nodes[i]) {
                None => true,
                Some(Node::Text(text)) => ends_with_line_indent(&text.value),
                Some(_) => false,
            };
            let ends_line = match nodes.get(index + 1) {
                None => false,
                Some(Node::Text(text)) => starts_with_line_break(&text.value),
                Some(_) => false,
            };
            if !(starts_line && ends_line) {
                continue;
            }
            if index > 0 {
                if let Node::Text(before) = &mut nodes[index - 1] {
                    trim_indent(before);
                }
            }
            if let Some(Node::Text(after)) = nodes.get_mut(index + 1) {
                trim_line_break(after);
            }
        }

        nodes.retain(|node| !matches!(node, Node::Text(text) if text.value.is_empty()));
        Ok(nodes)
    }
}

fn ends_with_line_indent(text: &str) -> bool {
    let tail = text.trim_end_matches([' ', '\t']);
    tail.is_empty() || tail.ends_with('\n')
}

fn starts_with_line_break(text: &str) -> bool {
    let head = text.trim_start_matches([' ', '\t']);
    head.starts_with('\n') || head.starts_with("\r\n")
}

fn trim_indent(text: &mut TextNode) {
    let kept = text.value.trim_end_matches([' ', '\t']).len();
    text.value.truncate(kept);
}

fn trim_line_break(text: &mut TextNode) {
    let head = text.value.trim_start_matches([' ', '\t']);
    let rest = head
        .strip_prefix("\r\n")
        .or_else(|| head.strip_prefix('\n'))
        .unwrap_or(head);
    text.value = rest.to_string();
}
