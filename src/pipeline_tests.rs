#[cfg(test)]
mod tests {
    use crate::chunk::Chunk;
    use crate::error::{CompileError, ERR_TEMPLATE_SOURCE};
    use crate::node::{ElementNode, Node, Position};
    use crate::pipeline::{InMemorySource, Pipeline, TemplateSource};
    use crate::settings::{CompilerSettings, ViewDescriptor};

    fn pos(template: &str) -> Position {
        Position::new(template, 1, 1)
    }

    fn element(template: &str, name: &str, attributes: &[(&str, &str)], children: Vec<Node>) -> Node {
        let mut element = ElementNode::new(name, pos(template));
        for (attribute, value) in attributes {
            element = element.with_attribute(attribute, value);
        }
        Node::Element(element.with_children(children))
    }

    fn site() -> InMemorySource {
        InMemorySource::new()
            .with_nodes(
                "home/index",
                vec![
                    Node::text("<ul>", pos("home/index")),
                    element(
                        "home/index",
                        "li",
                        &[("each", "name in ViewData['names']")],
                        vec![Node::expression("name", pos("home/index"))],
                    ),
                    Node::text("</ul>", pos("home/index")),
                    element("home/index", "render", &[("partial", "shared/_footer"), ("year", "2024")], vec![]),
                ],
            )
            .with_nodes(
                "shared/_footer",
                vec![
                    Node::text("<p>", pos("shared/_footer")),
                    Node::expression("year", pos("shared/_footer")),
                    Node::text("</p>", pos("shared/_footer")),
                ],
            )
            .with_nodes(
                "layouts/application",
                vec![
                    Node::text("<body>", pos("layouts/application")),
                    Node::expression("Content['view']", pos("layouts/application")),
                    Node::text("</body>", pos("layouts/application")),
                ],
            )
    }

    // ═══════════════════════════════════════════════════════════════════════
    // TEMPLATE SOURCES
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_text_templates_load_as_one_text_node() {
        let source = InMemorySource::new().with_text("notes.txt", "a\nb");
        let nodes = source.load("notes.txt").unwrap();
        assert_eq!(nodes, vec![Node::text("a\nb", pos("notes.txt"))]);
        assert_eq!(source.load_text("notes.txt").unwrap(), "a\nb");
    }

    #[test]
    fn test_missing_template() {
        let error = InMemorySource::new().load("nowhere").unwrap_err();
        assert_eq!(error.code(), ERR_TEMPLATE_SOURCE);
        assert!(error.to_string().contains("'nowhere'"), "{}", error);
    }

    #[test]
    fn test_json_templates() {
        let json = r#"[
            {"type": "text", "value": "Total: "},
            {"type": "expression", "code": "2 * 21"}
        ]"#;
        let source = InMemorySource::new().with_json("home/total", json).unwrap();
        let pipeline = Pipeline::new(source, CompilerSettings::default());
        let view = pipeline.compile(&ViewDescriptor::new(["home/total"])).unwrap();
        assert_eq!(view.create_instance().render().unwrap(), "Total: 42");

        let error = InMemorySource::new().with_json("broken", "{").unwrap_err();
        assert!(matches!(error, CompileError::TemplateSource { .. }));
    }

    // ═══════════════════════════════════════════════════════════════════════
    // PIPELINE
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_lower_normalizes_before_building() {
        let pipeline = Pipeline::new(site(), CompilerSettings::default());
        let chunks = pipeline.lower("home/index").unwrap();
        assert!(matches!(&chunks[1], Chunk::ForEach(each) if each.variable == "name"));
        assert!(matches!(chunks.last(), Some(Chunk::RenderPartial(p)) if p.target == "shared/_footer"));
    }

    #[test]
    fn test_compile_with_partial_and_layout() {
        let pipeline = Pipeline::new(site(), CompilerSettings::default());
        let view = pipeline
            .compile(&ViewDescriptor::new(["home/index", "layouts/application"]))
            .unwrap();
        let html = view
            .create_instance()
            .with_view_data("names", serde_json::json!(["Ann", "Bo"]))
            .render()
            .unwrap();
        assert_eq!(html, "<body><ul><li>Ann</li><li>Bo</li></ul><p>2024</p></body>");
    }

    #[test]
    fn test_unloadable_partial_is_reported_by_the_backend() {
        let source = InMemorySource::new().with_nodes(
            "home/index",
            vec![element("home/index", "render", &[("partial", "shared/_gone")], vec![])],
        );
        let pipeline = Pipeline::new(source, CompilerSettings::default());
        match pipeline.compile(&ViewDescriptor::new(["home/index"])) {
            Err(CompileError::Backend(error)) => {
                assert_eq!(error.diagnostics[0].message, "partial 'shared/_gone' could not be found");
            }
            Err(other) => panic!("expected a backend error, got {}", other),
            Ok(_) => panic!("expected a backend error"),
        }
    }

    #[test]
    fn test_content_captured_by_the_view_fills_the_layout() {
        let source = InMemorySource::new()
            .with_nodes(
                "home/about",
                vec![
                    element("home/about", "content", &[("name", "title")], vec![Node::text("About", pos("home/about"))]),
                    Node::text("<p>body</p>", pos("home/about")),
                    element("home/about", "content", &[("name", "title")], vec![Node::text(" us", pos("home/about"))]),
                ],
            )
            .with_nodes(
                "layouts/application",
                vec![
                    Node::text("<title>", pos("layouts/application")),
                    element("layouts/application", "use", &[("content", "title")], vec![]),
                    Node::text("</title>", pos("layouts/application")),
                    Node::expression("Content['view']", pos("layouts/application")),
                ],
            );
        let pipeline = Pipeline::new(source, CompilerSettings::default());
        let chunks = pipeline.lower("home/about").unwrap();
        assert!(matches!(&chunks[0], Chunk::ContentSet(c) if c.name == "title"), "{:?}", chunks);

        let view = pipeline
            .compile(&ViewDescriptor::new(["home/about", "layouts/application"]))
            .unwrap();
        assert!(view.source().contains("using OutputScope('title') do begin"), "generated:\n{}", view.source());
        assert_eq!(
            view.create_instance().render().unwrap(),
            "<title>About us</title><p>body</p>"
        );
    }

    #[test]
    fn test_unless_renders_when_the_condition_is_false() {
        let source = InMemorySource::new().with_nodes(
            "home/index",
            vec![
                element(
                    "home/index",
                    "unless",
                    &[("condition", "ViewData['admin']")],
                    vec![Node::text("guest", pos("home/index"))],
                ),
                element("home/index", "else", &[], vec![Node::text("admin", pos("home/index"))]),
            ],
        );
        let pipeline = Pipeline::new(source, CompilerSettings::default());
        let view = pipeline.compile(&ViewDescriptor::new(["home/index"])).unwrap();
        let render = |admin: bool| {
            view.create_instance()
                .with_view_data("admin", serde_json::json!(admin))
                .render()
                .unwrap()
        };
        assert_eq!(render(false), "guest");
        assert_eq!(render(true), "admin");
    }

    #[test]
    fn test_set_directive_is_rejected() {
        let source = InMemorySource::new().with_nodes(
            "home/index",
            vec![element("home/index", "set", &[("title", "'x'")], vec![])],
        );
        let pipeline = Pipeline::new(source, CompilerSettings::default());
        match pipeline.lower("home/index") {
            Err(CompileError::Normalization { message, .. }) => assert_eq!(message, "unsupported directive 'set'"),
            other => panic!("expected a normalization error, got {:?}", other),
        }
    }

    #[test]
    fn test_section_is_plain_markup() {
        let source = InMemorySource::new().with_nodes(
            "home/index",
            vec![element("home/index", "section", &[], vec![Node::text("x", pos("home/index"))])],
        );
        let pipeline = Pipeline::new(source, CompilerSettings::default());
        let view = pipeline.compile(&ViewDescriptor::new(["home/index"])).unwrap();
        assert_eq!(view.create_instance().render().unwrap(), "<section>x</section>");
    }

    #[test]
    fn test_missing_level_template_fails_early() {
        let pipeline = Pipeline::new(site(), CompilerSettings::default());
        let result = pipeline.compile(&ViewDescriptor::new(["home/missing"]));
        assert!(matches!(result, Err(CompileError::TemplateSource { .. })));
    }

    #[test]
    fn test_batch_keeps_descriptor_order() {
        let pipeline = Pipeline::new(site(), CompilerSettings::default());
        let descriptors = vec![
            ViewDescriptor::new(["shared/_footer"]).with_accessor("year", "1999"),
            ViewDescriptor::new(["home/missing"]),
            ViewDescriptor::new(["layouts/application"]),
        ];
        let results = pipeline.compile_batch(&descriptors);
        assert_eq!(results.len(), 3);
        let first = results[0].as_ref().unwrap();
        assert_eq!(first.create_instance().render().unwrap(), "<p>1999</p>");
        assert!(results[1].is_err());
        assert_eq!(
            results[2].as_ref().unwrap().create_instance().render().unwrap(),
            "<body></body>"
        );
    }
}
