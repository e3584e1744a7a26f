#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::chunk::{
        Chunk, ChunkLibrary, ExtensionChunk, GlobalVariableChunk, MacroChunk, MacroParameter, OutputLocation,
        PageBaseTypeChunk, UseModuleChunk, UseNamespaceChunk, ViewDataChunk, ViewDataModelChunk,
    };
    use crate::declarations::{
        BaseClassVisitor, DeclarationTables, Declared, GlobalFunctionsVisitor, GlobalMembersVisitor,
        UsingNamespaceVisitor,
    };
    use crate::dialect::BackendDialect;
    use crate::error::{CompileError, ERR_DECLARATION_CONFLICT};
    use crate::node::{ExtensionHandle, Position, ViewExtension};
    use crate::settings::NullBehaviour;
    use crate::visitor::ChunkVisitor;
    use crate::writer::SourceWriter;

    fn at(line: u32) -> Option<Position> {
        Some(Position::new("home/index", line, 3))
    }

    fn global(name: &str, value: &str, line: u32) -> GlobalVariableChunk {
        GlobalVariableChunk {
            name: name.to_string(),
            var_type: None,
            value: value.to_string(),
            position: at(line),
        }
    }

    fn view_data(name: &str, var_type: &str) -> ViewDataChunk {
        ViewDataChunk {
            name: name.to_string(),
            key: name.to_string(),
            var_type: Some(var_type.to_string()),
            default: None,
            position: at(4),
        }
    }

    fn macro_chunk(name: &str, parameters: &[(&str, &str)], body: Vec<Chunk>) -> MacroChunk {
        MacroChunk {
            name: name.to_string(),
            parameters: parameters
                .iter()
                .map(|(name, param_type)| MacroParameter {
                    name: name.to_string(),
                    param_type: param_type.to_string(),
                })
                .collect(),
            body,
            position: at(6),
        }
    }

    #[derive(Debug)]
    struct Wrapper;

    impl ViewExtension for Wrapper {
        fn emit(&self, _location: OutputLocation, _body: &[Chunk], _output: &mut String) {}
    }

    fn extension(body: Vec<Chunk>) -> Chunk {
        Chunk::Extension(ExtensionChunk {
            extension: ExtensionHandle(Arc::new(Wrapper)),
            body,
            position: None,
        })
    }

    fn namespace(name: &str) -> Chunk {
        Chunk::UseNamespace(UseNamespaceChunk {
            namespace: name.to_string(),
            position: None,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // DECLARATION TABLES
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_identical_global_is_repeated() {
        let mut tables = DeclarationTables::new();
        assert_eq!(tables.declare_global(&global("count", "0", 1)).unwrap(), Declared::New);
        assert_eq!(tables.declare_global(&global("count", "0", 9)).unwrap(), Declared::Repeated);
        assert_eq!(tables.globals.len(), 1);
        assert_eq!(tables.globals[0].position, at(1), "the first declaration wins");
    }

    #[test]
    fn test_conflicting_global_reports_both_sites() {
        let mut tables = DeclarationTables::new();
        tables.declare_global(&global("count", "0", 1)).unwrap();
        let error = tables.declare_global(&global("count", "1", 9)).unwrap_err();
        assert_eq!(error.code(), ERR_DECLARATION_CONFLICT);
        let CompileError::Declaration { name, first, second, .. } = &error else {
            panic!("expected a declaration conflict, got {:?}", error);
        };
        assert_eq!(name, "count");
        assert_eq!(first, &at(1));
        assert_eq!(second, &at(9));
    }

    #[test]
    fn test_name_cannot_change_kind() {
        let mut tables = DeclarationTables::new();
        tables.declare_global(&global("row", "0", 1)).unwrap();
        let error = tables.declare_macro(&macro_chunk("row", &[], vec![])).unwrap_err();
        assert!(error.to_string().contains("already declared as global"), "{}", error);
    }

    #[test]
    fn test_view_data_type_conflict() {
        let mut tables = DeclarationTables::new();
        tables.declare_view_data(&view_data("title", "string")).unwrap();
        assert_eq!(tables.declare_view_data(&view_data("title", "string")).unwrap(), Declared::Repeated);
        assert!(tables.declare_view_data(&view_data("title", "int")).is_err());
    }

    #[test]
    fn test_macro_parameter_conflict() {
        let mut tables = DeclarationTables::new();
        tables.declare_macro(&macro_chunk("row", &[("label", "string")], vec![])).unwrap();
        assert_eq!(
            tables
                .declare_macro(&macro_chunk("row", &[("label", "string")], vec![Chunk::literal("other body")]))
                .unwrap(),
            Declared::Repeated
        );
        assert!(tables.declare_macro(&macro_chunk("row", &[("label", "int")], vec![])).is_err());
        assert!(tables.macro_named("row").is_some());
    }

    #[test]
    fn test_model_conflict() {
        let model = |model_type: &str| ViewDataModelChunk {
            model_type: model_type.to_string(),
            alias: Some("order".to_string()),
            position: at(2),
        };
        let mut tables = DeclarationTables::new();
        assert_eq!(tables.declare_model(&model("Order")).unwrap(), Declared::New);
        assert_eq!(tables.declare_model(&model("Order")).unwrap(), Declared::Repeated);
        assert!(tables.declare_model(&model("Invoice")).is_err());
        assert!(
            tables.declare_global(&global("order", "1", 3)).is_err(),
            "the model alias claims its name"
        );
    }

    #[test]
    fn test_namespaces_and_modules_deduplicate() {
        let mut tables = DeclarationTables::new();
        assert!(tables.add_namespace("System.Linq"));
        assert!(!tables.add_namespace("System.Linq"));
        assert!(tables.add_module("Acme"));
        assert!(!tables.add_module("Acme"));
        assert_eq!(tables.namespaces, vec!["System.Linq"]);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // DECLARATION PASSES
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_using_visitor_writes_each_namespace_once() {
        let chunks = vec![
            namespace("System.Linq"),
            Chunk::conditional(crate::chunk::ConditionalKind::If, "x", vec![namespace("Site.Helpers")]),
            namespace("System.Linq"),
            Chunk::UseModule(UseModuleChunk {
                module: "Acme.Widgets".to_string(),
                position: None,
            }),
        ];
        let library = ChunkLibrary::new();

        let mut source = SourceWriter::new(false);
        let mut tables = DeclarationTables::new();
        let mut visitor = UsingNamespaceVisitor::new(&mut source, BackendDialect::Oxygene, &mut tables, &library);
        visitor.accept(&chunks).unwrap();
        visitor.finish();
        assert_eq!(source.as_str(), "uses\n  System.Linq,\n  Site.Helpers;\n\n");
        assert_eq!(tables.modules, vec!["Acme.Widgets"]);

        let mut source = SourceWriter::new(false);
        let mut tables = DeclarationTables::new();
        let mut visitor = UsingNamespaceVisitor::new(&mut source, BackendDialect::CSharp, &mut tables, &library);
        visitor.accept(&chunks).unwrap();
        visitor.finish();
        assert_eq!(source.as_str(), "using System.Linq;\nusing Site.Helpers;\n\n");
    }

    #[test]
    fn test_using_visitor_without_imports_writes_nothing() {
        let library = ChunkLibrary::new();
        let mut source = SourceWriter::new(false);
        let mut tables = DeclarationTables::new();
        let mut visitor = UsingNamespaceVisitor::new(&mut source, BackendDialect::Oxygene, &mut tables, &library);
        visitor.accept(&[Chunk::literal("x")]).unwrap();
        visitor.finish();
        assert!(source.as_str().is_empty());
    }

    #[test]
    fn test_globals_in_repeated_partials_are_declared_once() {
        let mut library = ChunkLibrary::new();
        library.insert("shared/_counter", vec![Chunk::global("count", Some("int"), "0")]);
        let chunks = vec![
            Chunk::render_partial("shared/_counter"),
            Chunk::render_partial("shared/_counter"),
            Chunk::global("count", Some("int"), "0"),
        ];

        let mut source = SourceWriter::new(false);
        let mut tables = DeclarationTables::new();
        GlobalMembersVisitor::new(&mut source, BackendDialect::CSharp, &mut tables, &library)
            .accept(&chunks)
            .unwrap();
        assert_eq!(source.as_str().matches("int _count = 0;").count(), 1, "{}", source.as_str());
        assert_eq!(tables.globals.len(), 1);
    }

    #[test]
    fn test_members_pass_declares_view_data_and_macros() {
        let library = ChunkLibrary::new();
        let chunks = vec![
            Chunk::ViewData(view_data("title", "string")),
            Chunk::Macro(macro_chunk("row", &[("label", "string")], vec![Chunk::literal("<tr/>")])),
        ];
        let mut source = SourceWriter::new(false);
        let mut tables = DeclarationTables::new();
        GlobalMembersVisitor::new(&mut source, BackendDialect::Oxygene, &mut tables, &library)
            .accept(&chunks)
            .unwrap();
        let text = source.as_str();
        assert!(text.contains("property title : string read (ViewData.Eval('title') as string);"), "{}", text);
        assert!(text.contains("method row(label : string) : System.Object;"), "{}", text);
    }

    #[test]
    fn test_each_macro_is_implemented_once() {
        let library = ChunkLibrary::new();
        let row = Chunk::Macro(macro_chunk("row", &[], vec![Chunk::literal("<tr/>")]));
        let chunks = vec![
            row.clone(),
            Chunk::conditional(crate::chunk::ConditionalKind::If, "x", vec![row]),
        ];
        let mut source = SourceWriter::new(false);
        let mut tables = DeclarationTables::new();
        GlobalFunctionsVisitor::new(
            &mut source,
            BackendDialect::CSharp,
            NullBehaviour::Strict,
            "View",
            &mut tables,
            &library,
        )
        .accept(&chunks)
        .unwrap();
        assert_eq!(source.as_str().matches("public object row()").count(), 1, "{}", source.as_str());
        assert!(tables.macros_implemented.contains("row"));
    }

    #[test]
    fn test_base_class_from_partial() {
        let mut library = ChunkLibrary::new();
        library.insert(
            "shared/_page",
            vec![Chunk::PageBaseType(PageBaseTypeChunk {
                base_type: "StorePage".to_string(),
                position: None,
            })],
        );
        let mut visitor = BaseClassVisitor::new(&library);
        visitor.accept(&[Chunk::render_partial("shared/_page")]).unwrap();
        assert_eq!(visitor.resolve("ViewBase").text, "StorePage");
    }

    #[test]
    fn test_base_class_inside_extension_body() {
        let library = ChunkLibrary::new();
        let model = Chunk::ViewDataModel(ViewDataModelChunk {
            model_type: "Order".to_string(),
            alias: None,
            position: at(2),
        });
        let mut visitor = BaseClassVisitor::new(&library);
        visitor.accept(&[extension(vec![model])]).unwrap();
        assert_eq!(visitor.resolve("ViewBase").text, "ViewBase<Order>");

        let page = Chunk::PageBaseType(PageBaseTypeChunk {
            base_type: "StorePage".to_string(),
            position: None,
        });
        let mut visitor = BaseClassVisitor::new(&library);
        visitor.accept(&[extension(vec![page])]).unwrap();
        assert_eq!(visitor.resolve("ViewBase").text, "StorePage");
    }
}
