use super::namespace::NamespaceScoping;
use super::{map_children, NodePass, NormalizeContext, PassResult};
use crate::error::CompileError;
use crate::node::{ElementNode, Node, VIEW_NAMESPACE, XINCLUDE_NAMESPACE};

/// Inlines `<include href="..."/>` targets. `parse="text"` inlines the raw
/// text, escaped; a failed load falls back to the `<fallback>` child.
pub struct IncludeExpansion;

impl NodePass for IncludeExpansion {
    fn name(&self) -> &'static str {
        "include"
    }

    fn apply(&self, nodes: Vec<Node>, context: &mut NormalizeContext<'_>) -> PassResult {
        let mut output = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                Node::Element(element) if is_include(&element, context) => {
                    output.extend(expand(element, context)?);
                }
                other => output.push(map_children(other, &mut |children| self.apply(children, context))?),
            }
        }
        Ok(output)
    }
}

fn is_include(element: &ElementNode, context: &NormalizeContext<'_>) -> bool {
    if element.local_name() != "include" {
        return false;
    }
    match element.namespace.as_deref() {
        Some(XINCLUDE_NAMESPACE) | Some(VIEW_NAMESPACE) => true,
        Some(_) => false,
        None => element.prefix().is_none() && context.settings.prefix.is_none(),
    }
}

fn expand(element: ElementNode, context: &mut NormalizeContext<'_>) -> PassResult {
    let Some(href) = element.attribute("href").map(|a| a.text_value()) else {
        return Err(CompileError::normalization(
            "include requires an 'href' attribute",
            &element.position,
        ));
    };
    let as_text = element
        .attribute("parse")
        .is_some_and(|a| a.text_value() == "text");
    let target = resolve_relative(&context.template, &href);

    if context.include_stack.contains(&target) {
        return Err(CompileError::normalization(
            format!("include cycle: {} -> {}", context.include_stack.join(" -> "), target),
            &element.position,
        ));
    }

    match load(&target, as_text, &element, context) {
        Ok(nodes) => Ok(nodes),
        Err(error) => {
            let fallback = element
                .children
                .iter()
                .find_map(|child| match child {
                    Node::Element(e) if e.local_name() == "fallback" => Some(e.children.clone()),
                    _ => None,
                });
            match fallback {
                Some(children) => {
                    tracing::debug!(include = %target, "include failed, using fallback");
                    IncludeExpansion.apply(children, context)
                }
                None => Err(match error {
                    CompileError::TemplateSource { message, .. } => CompileError::normalization(
                        format!("unable to include '{}': {}", target, message),
                        &element.position,
                    ),
                    other => other,
                }),
            }
        }
    }
}

fn load(
    target: &str,
    as_text: bool,
    element: &ElementNode,
    context: &mut NormalizeContext<'_>,
) -> PassResult {
    let Some(source) = context.source else {
        return Err(CompileError::TemplateSource {
            template: target.to_string(),
            message: "no template source is available".to_string(),
        });
    };

    if as_text {
        let text = source.load_text(target)?;
        return Ok(vec![Node::text(escape_text(&text), element.position.clone())]);
    }

    let nodes = source.load(target)?;
    let saved = std::mem::replace(&mut context.template, target.to_string());
    context.include_stack.push(target.to_string());
    let result = NamespaceScoping
        .apply(nodes, context)
        .and_then(|nodes| IncludeExpansion.apply(nodes, context));
    context.include_stack.pop();
    context.template = saved;
    result
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Resolves `href` against the directory of `current`. A leading `/` makes it
/// root relative.
pub(crate) fn resolve_relative(current: &str, href: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    let path = if let Some(rooted) = href.strip_prefix('/') {
        rooted
    } else {
        if let Some((directory, _)) = current.rsplit_once('/') {
            segments.extend(directory.split('/').filter(|s| !s.is_empty()));
        }
        href
    };
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}
