#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::chunk::{Chunk, OutputLocation};
    use crate::error::CompileError;
    use crate::node::{ElementNode, ExtensionFactory, Node, Position, ViewExtension, VIEW_NAMESPACE};
    use crate::normalize::{normalize, NormalizeContext};
    use crate::pipeline::InMemorySource;
    use crate::settings::{Binding, CompilerSettings};

    fn pos() -> Position {
        Position::new("home/index", 1, 1)
    }

    fn text(value: &str) -> Node {
        Node::text(value, pos())
    }

    fn element(name: &str, attributes: &[(&str, &str)], children: Vec<Node>) -> Node {
        let mut element = ElementNode::new(name, pos());
        for (attribute, value) in attributes {
            element = element.with_attribute(attribute, value);
        }
        Node::Element(element.with_children(children))
    }

    fn run(nodes: Vec<Node>) -> Result<Vec<Node>, CompileError> {
        let settings = CompilerSettings::default();
        let mut context = NormalizeContext::new(&settings, "home/index");
        normalize(nodes, &mut context)
    }

    fn run_with_source(nodes: Vec<Node>, source: &InMemorySource) -> Result<Vec<Node>, CompileError> {
        let settings = CompilerSettings::default();
        let mut context = NormalizeContext::new(&settings, "home/index").with_source(source);
        normalize(nodes, &mut context)
    }

    fn names(nodes: &[Node]) -> Vec<String> {
        nodes
            .iter()
            .map(|n| match n {
                Node::Special(s) => format!("#{}", s.element.name),
                Node::Element(e) => e.name.clone(),
                Node::Text(t) => format!("'{}'", t.value),
                Node::Expression(e) => format!("${{{}}}", e.code),
                Node::Extension(e) => format!("ext:{}", e.element.name),
            })
            .collect()
    }

    fn special_body(node: &Node) -> &[Node] {
        match node {
            Node::Special(s) => &s.body,
            other => panic!("expected a directive, got {:?}", other),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // DIRECTIVE RECOGNITION
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_special_elements_are_recognized() {
        let nodes = run(vec![
            element("var", &[("x", "1")], vec![]),
            element("div", &[], vec![element("for", &[("each", "i in items")], vec![])]),
        ])
        .unwrap();
        assert_eq!(names(&nodes), vec!["#var", "div"]);
        let Node::Element(div) = &nodes[1] else {
            unreachable!();
        };
        assert_eq!(names(&div.children), vec!["#for"]);
    }

    #[test]
    fn test_prefix_setting_limits_directives() {
        let settings = CompilerSettings {
            prefix: Some("s".to_string()),
            ..CompilerSettings::default()
        };
        let mut context = NormalizeContext::new(&settings, "home/index");
        let nodes = normalize(
            vec![element("s:if", &[("condition", "x")], vec![]), element("if", &[], vec![])],
            &mut context,
        )
        .unwrap();
        assert_eq!(names(&nodes), vec!["#if", "if"]);
    }

    #[test]
    fn test_view_namespace_declaration() {
        let root = element(
            "html",
            &[("xmlns:v", VIEW_NAMESPACE)],
            vec![element("v:global", &[("title", "'x'")], vec![])],
        );
        let nodes = run(vec![root]).unwrap();
        let Node::Element(html) = &nodes[0] else {
            panic!("expected the root element");
        };
        assert!(html.attributes.is_empty(), "view namespace declaration is dropped");
        assert_eq!(names(&html.children), vec!["#global"]);
    }

    #[test]
    fn test_prefix_shorthand() {
        let nodes = run(vec![
            element("macro:row", &[("label", "string")], vec![]),
            element("render:shared/_menu", &[], vec![]),
            element("use:head", &[], vec![]),
        ])
        .unwrap();
        assert_eq!(names(&nodes), vec!["#macro", "#render", "#use"]);
        let Node::Special(row) = &nodes[0] else {
            unreachable!();
        };
        assert_eq!(row.element.attributes[0].name, "name");
        assert_eq!(row.element.attributes[0].text_value(), "row");
    }

    #[test]
    fn test_extension_elements() {
        #[derive(Debug)]
        struct Widget;
        impl ViewExtension for Widget {
            fn lower(&self, mut body: Vec<Chunk>) -> Vec<Chunk> {
                body.insert(0, Chunk::literal("[widget]"));
                body
            }
            fn emit(&self, _location: OutputLocation, _body: &[Chunk], _output: &mut String) {}
        }
        struct Factory;
        impl ExtensionFactory for Factory {
            fn create(&self, element: &ElementNode) -> Option<Arc<dyn ViewExtension>> {
                (element.name == "widget").then(|| Arc::new(Widget) as Arc<dyn ViewExtension>)
            }
        }

        let settings = CompilerSettings::default();
        let factory: Arc<dyn ExtensionFactory> = Arc::new(Factory);
        let mut context = NormalizeContext::new(&settings, "home/index").with_extensions(Some(factory));
        let nodes = normalize(
            vec![element("widget", &[], vec![text("x")]), element("span", &[], vec![])],
            &mut context,
        )
        .unwrap();
        assert_eq!(names(&nodes), vec!["ext:widget", "span"]);

        let chunks = crate::builder::ChunkBuilder::build(&nodes, false).unwrap();
        let Chunk::Extension(widget) = &chunks[0] else {
            panic!("expected an extension chunk");
        };
        assert!(matches!(&widget.body[0], Chunk::SendLiteral(l) if l.text == "[widget]"));
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ATTRIBUTE REWRITES
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_control_attributes_nest_loop_inside_condition() {
        let nodes = run(vec![element("li", &[("each", "x in xs"), ("if", "show")], vec![])]).unwrap();
        assert_eq!(names(&nodes), vec!["#if"]);
        let Node::Special(condition) = &nodes[0] else {
            unreachable!();
        };
        assert_eq!(condition.element.attributes[0].name, "condition");
        let inner = special_body(&nodes[0]);
        assert_eq!(names(inner), vec!["#for"]);
        assert_eq!(names(special_body(&inner[0])), vec!["li"]);
        let Node::Element(li) = &special_body(&inner[0])[0] else {
            unreachable!();
        };
        assert!(li.attributes.is_empty(), "control attributes are consumed");
    }

    #[test]
    fn test_once_and_cache_attributes() {
        let nodes = run(vec![
            element("script", &[("once", "jquery")], vec![]),
            element("div", &[("cache", "menu")], vec![]),
        ])
        .unwrap();
        assert_eq!(names(&nodes), vec!["#once", "#cache"]);
        let Node::Special(once) = &nodes[0] else {
            unreachable!();
        };
        assert_eq!(once.element.attributes[0].name, "key");
    }

    #[test]
    fn test_site_root_urls() {
        let nodes = run(vec![element("a", &[("href", "~/home/about")], vec![])]).unwrap();
        let Node::Element(a) = &nodes[0] else {
            unreachable!();
        };
        assert_eq!(names(&a.attributes[0].value), vec!["${SiteRoot}", "'/home/about'"]);
    }

    #[test]
    fn test_bindings() {
        let settings = CompilerSettings {
            bindings: vec![Binding {
                element_name: "Label".to_string(),
                phrase: "Html.Label(\"@for\", @text)".to_string(),
            }],
            ..CompilerSettings::default()
        };
        let mut context = NormalizeContext::new(&settings, "home/index");
        let nodes = normalize(
            vec![
                element("Label", &[("for", "Name"), ("text", "caption")], vec![]),
                element("Label", &[("for", "Name")], vec![]),
            ],
            &mut context,
        )
        .unwrap();
        let Node::Expression(expression) = &nodes[0] else {
            panic!("expected the binding to expand: {:?}", names(&nodes));
        };
        assert_eq!(expression.code, "Html.Label(\"Name\", caption)");
        assert!(expression.raw);
        assert_eq!(names(&nodes[1..]), vec!["Label"], "missing references leave the element alone");
    }

    // ═══════════════════════════════════════════════════════════════════════
    // LAYOUT OF DIRECTIVES
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_directive_alone_on_its_line_leaves_no_blank_line() {
        let nodes = run(vec![
            text("<ul>\n  "),
            element("var", &[("x", "1")], vec![]),
            text("\n  <li/>"),
        ])
        .unwrap();
        assert_eq!(names(&nodes), vec!["'<ul>\n'", "#var", "'  <li/>'"]);
    }

    #[test]
    fn test_test_element_splits_into_chain() {
        let nodes = run(vec![element(
            "test",
            &[("if", "a")],
            vec![
                text("A"),
                element("else", &[("if", "b")], vec![]),
                text("B"),
                element("else", &[], vec![]),
                text("C"),
            ],
        )])
        .unwrap();
        assert_eq!(names(&nodes), vec!["#if", "#elseif", "#else"]);
        assert_eq!(names(special_body(&nodes[1])), vec!["'B'"]);
        assert_eq!(names(special_body(&nodes[2])), vec!["'C'"]);
    }

    #[test]
    fn test_sibling_else_pairs_across_whitespace() {
        let nodes = run(vec![
            element("p", &[("if", "a")], vec![]),
            text("\n  "),
            element("p", &[("else", "")], vec![]),
        ])
        .unwrap();
        assert_eq!(names(&nodes), vec!["#if", "#else"]);
    }

    #[test]
    fn test_else_with_condition_becomes_elseif() {
        let nodes = run(vec![
            element("if", &[("condition", "a")], vec![]),
            element("else", &[("if", "b")], vec![]),
        ])
        .unwrap();
        assert_eq!(names(&nodes), vec!["#if", "#elseif"]);
    }

    #[test]
    fn test_unmatched_else_is_an_error() {
        let result = run(vec![text("x"), element("else", &[], vec![])]);
        match result {
            Err(CompileError::Normalization { message, .. }) => assert!(message.contains("'else'"), "{}", message),
            other => panic!("expected a normalization error, got {:?}", other),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // INCLUDES
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_include_inlines_target() {
        let source = InMemorySource::new()
            .with_nodes("home/_header", vec![element("if", &[("condition", "x")], vec![text("H")])]);
        let nodes = run_with_source(vec![element("include", &[("href", "_header")], vec![])], &source).unwrap();
        assert_eq!(names(&nodes), vec!["#if"], "included nodes go through every later pass");
    }

    #[test]
    fn test_include_text_is_escaped() {
        let source = InMemorySource::new().with_text("home/notes.txt", "a<b & c");
        let nodes = run_with_source(
            vec![element("include", &[("href", "notes.txt"), ("parse", "text")], vec![])],
            &source,
        )
        .unwrap();
        assert_eq!(names(&nodes), vec!["'a&lt;b &amp; c'"]);
    }

    #[test]
    fn test_include_fallback() {
        let source = InMemorySource::new();
        let include = element(
            "include",
            &[("href", "missing")],
            vec![element("fallback", &[], vec![text("none")])],
        );
        let nodes = run_with_source(vec![include], &source).unwrap();
        assert_eq!(names(&nodes), vec!["'none'"]);

        let error = run_with_source(vec![element("include", &[("href", "missing")], vec![])], &source).unwrap_err();
        assert!(error.to_string().contains("home/missing"), "{}", error);
    }

    #[test]
    fn test_include_cycle_is_an_error() {
        let source = InMemorySource::new().with_nodes("home/a", vec![element("include", &[("href", "index")], vec![])]);
        let result = run_with_source(vec![element("include", &[("href", "a")], vec![])], &source);
        match result {
            Err(CompileError::Normalization { message, .. }) => assert!(message.contains("cycle"), "{}", message),
            other => panic!("expected an include cycle, got {:?}", other),
        }
    }
}
