#[cfg(test)]
mod tests {
    use crate::chunk::{Chunk, ChunkLibrary};
    use crate::compiler::ViewCompiler;
    use crate::error::CompileError;
    use crate::expr::{free_identifiers, parse, to_output_text, BinaryOp, Expr, UnaryOp, MAX_NESTING};
    use crate::settings::{CompilerSettings, ViewDescriptor};
    use serde_json::{json, Value};

    fn ident(name: &str) -> Box<Expr> {
        Box::new(Expr::Ident(name.to_string()))
    }

    fn int(n: i64) -> Box<Expr> {
        Box::new(Expr::Literal(json!(n)))
    }

    /// Compiles `code` as the only output of a view and renders it.
    fn eval(code: &str) -> String {
        let view = ViewCompiler::new(CompilerSettings::default())
            .compile_view(
                &ViewDescriptor::new(["expr"]),
                &[vec![Chunk::expression(code)]],
                &ChunkLibrary::new(),
            )
            .unwrap_or_else(|e| panic!("'{}' failed to compile: {}", code, e));
        view.create_instance()
            .with_view_data("user", json!({ "name": "Ann", "tags": ["a", "b"] }))
            .render()
            .unwrap_or_else(|e| panic!("'{}' failed to render: {}", code, e))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // PARSING
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_precedence() {
        let expr = parse("a + b * 2").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Add,
                ident("a"),
                Box::new(Expr::Binary(BinaryOp::Mul, ident("b"), int(2)))
            )
        );
    }

    #[test]
    fn test_left_associativity() {
        let expr = parse("10 - 4 - 3").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Sub,
                Box::new(Expr::Binary(BinaryOp::Sub, int(10), int(4))),
                int(3)
            )
        );
    }

    #[test]
    fn test_keyword_operators() {
        assert_eq!(
            parse("not a and b").unwrap(),
            Expr::Binary(
                BinaryOp::And,
                Box::new(Expr::Unary(UnaryOp::Not, ident("a"))),
                ident("b")
            )
        );
        assert!(matches!(parse("7 div 2").unwrap(), Expr::Binary(BinaryOp::IntDiv, _, _)));
        assert!(matches!(parse("7 mod 2").unwrap(), Expr::Binary(BinaryOp::Rem, _, _)));
        assert!(matches!(parse("a <> b").unwrap(), Expr::Binary(BinaryOp::Ne, _, _)));
        assert!(matches!(parse("a = b").unwrap(), Expr::Binary(BinaryOp::Eq, _, _)));
        assert_eq!(parse("nil").unwrap(), Expr::Literal(Value::Null));
    }

    #[test]
    fn test_postfix_chain() {
        let expr = parse("Model.Items[0].Name").unwrap();
        let Expr::Member(target, name) = expr else {
            panic!("expected member access");
        };
        assert_eq!(name, "Name");
        assert!(matches!(*target, Expr::Index(_, _)));
    }

    #[test]
    fn test_string_literals() {
        assert_eq!(parse("'it''s'").unwrap(), Expr::Literal(json!("it's")));
        assert_eq!(parse(r#""tab\there""#).unwrap(), Expr::Literal(json!("tab\there")));
    }

    #[test]
    fn test_trailing_semicolon_is_tolerated() {
        assert_eq!(parse("x;").unwrap(), Expr::Ident("x".to_string()));
    }

    #[test]
    fn test_syntax_errors() {
        for code in ["", "(1 + 2", "1 +", "'open", "a b", "a.", "f(1,", "#"] {
            assert!(parse(code).is_err(), "'{}' should not parse", code);
        }
        let error = parse("1 + )").unwrap_err();
        assert_eq!(error.offset, 4);
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(50_000), ")".repeat(50_000));
        let error = parse(&deep).unwrap_err();
        assert!(error.message.contains("nested too deeply"), "{}", error.message);

        let unary = format!("{}x", "-".repeat(50_000));
        assert!(parse(&unary).is_err());
        let members = format!("x{}", ".y".repeat(50_000));
        assert!(parse(&members).is_err());
        let sums = vec!["1"; 50_000].join(" + ");
        assert!(parse(&sums).is_err());

        let shallow = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(parse(&shallow).unwrap(), Expr::Literal(json!(1)));
        let within = format!("{}1{}", "(".repeat(MAX_NESTING - 1), ")".repeat(MAX_NESTING - 1));
        assert!(parse(&within).is_ok());
    }

    #[test]
    fn test_deep_expression_is_a_backend_diagnostic() {
        let deep = format!("{}1{}", "[".repeat(10_000), "]".repeat(10_000));
        let result = ViewCompiler::new(CompilerSettings::default()).compile_view(
            &ViewDescriptor::new(["expr"]),
            &[vec![Chunk::expression(&deep)]],
            &ChunkLibrary::new(),
        );
        match result {
            Err(CompileError::Backend(error)) => {
                assert!(error.diagnostics[0].message.starts_with("syntax error"), "{}", error.diagnostics[0].message);
            }
            Err(other) => panic!("expected a backend error, got {}", other),
            Ok(_) => panic!("expected a backend error"),
        }
    }

    #[test]
    fn test_free_identifiers_skip_members() {
        let names = free_identifiers(&parse("order.Total + tax(rate, [extra])").unwrap());
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        assert_eq!(names, vec!["extra", "order", "rate", "tax"]);
    }

    #[test]
    fn test_output_text() {
        assert_eq!(to_output_text(&Value::Null), "");
        assert_eq!(to_output_text(&json!("s")), "s");
        assert_eq!(to_output_text(&json!(true)), "true");
        assert_eq!(to_output_text(&json!(2.5)), "2.5");
        assert_eq!(to_output_text(&json!([1, "a"])), r#"[1,"a"]"#);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // EVALUATION
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("2 + 3 * 4"), "14");
        assert_eq!(eval("(2 + 3) * 4"), "20");
        assert_eq!(eval("8 / 2"), "4");
        assert_eq!(eval("7 / 2"), "3.5");
        assert_eq!(eval("7 div 2"), "3");
        assert_eq!(eval("7 mod 4"), "3");
        assert_eq!(eval("-3 + 1"), "-2");
    }

    #[test]
    fn test_comparison_and_logic() {
        assert_eq!(eval("1 < 2 and 'a' < 'b'"), "true");
        assert_eq!(eval("1 = 1.0"), "true");
        assert_eq!(eval("null or ''"), "false");
        assert_eq!(eval("!0"), "true");
    }

    #[test]
    fn test_large_integers_compare_exactly() {
        assert_eq!(eval("9007199254740993 = 9007199254740992"), "false");
        assert_eq!(eval("9007199254740993 != 9007199254740992"), "true");
        assert_eq!(eval("9007199254740993 > 9007199254740992"), "true");
        assert_eq!(eval("2 = 2.0"), "true");
    }

    #[test]
    fn test_integer_overflow_does_not_wrap() {
        let min = "(-9223372036854775807 - 1)";
        let quotient = eval(&format!("{} div -1", min));
        assert!(!quotient.starts_with('-'), "{}", quotient);
        let quotient = eval(&format!("{} / -1", min));
        assert!(!quotient.starts_with('-'), "{}", quotient);
        assert_eq!(eval(&format!("{} mod -1", min)), "0");
        assert_eq!(eval("-7 div 2"), "-3");
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(eval("'n=' + 5"), "n=5");
        assert_eq!(eval("H('<a>')"), "&lt;a&gt;");
    }

    #[test]
    fn test_view_data_access() {
        assert_eq!(eval("ViewData.Eval('user.name')"), "Ann");
        assert_eq!(eval("ViewData['user'].tags[1]"), "b");
        assert_eq!(eval("ViewData['user'].tags.Count"), "2");
    }
}
