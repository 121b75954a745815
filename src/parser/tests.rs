use super::*;
use crate::executor::types::ast::*;

fn parse_single(source: &str) -> Stmt {
    let program = parse_program(source).expect("Parse should succeed");
    assert_eq!(program.body.len(), 1, "expected one statement in {:?}", source);
    program.body.into_iter().next().unwrap()
}

fn parse_expr(source: &str) -> Expr {
    match parse_single(source) {
        Stmt::Expr { expr } => expr,
        other => panic!("Expected expression statement, got {:?}", other),
    }
}

#[test]
fn test_declarations_with_and_without_semicolons() {
    let program = parse_program("const a = 1; const b = 2\nlet c").unwrap();
    assert_eq!(program.body.len(), 3);

    match &program.body[0] {
        Stmt::Declare {
            var_kind,
            declarations,
        } => {
            assert_eq!(*var_kind, VarKind::Const);
            assert_eq!(
                declarations[0],
                Declarator {
                    target: DeclareTarget::Simple {
                        name: "a".to_string()
                    },
                    init: Some(Expr::LitNum { v: 1.0 }),
                }
            );
        }
        other => panic!("Expected declaration, got {:?}", other),
    }

    match &program.body[2] {
        Stmt::Declare { declarations, .. } => assert_eq!(declarations[0].init, None),
        other => panic!("Expected declaration, got {:?}", other),
    }
}

#[test]
fn test_destructuring_declaration() {
    match parse_single("const { name, age } = person;") {
        Stmt::Declare { declarations, .. } => {
            assert_eq!(
                declarations[0].target,
                DeclareTarget::Destructure {
                    names: vec!["name".to_string(), "age".to_string()]
                }
            );
        }
        other => panic!("Expected declaration, got {:?}", other),
    }
}

#[test]
fn test_const_without_initializer_is_rejected() {
    let err = parse_program("const a;").unwrap_err();
    assert!(err.message().contains("Missing initializer"));
}

#[test]
fn test_missing_expression_is_syntax_error() {
    let err = parse_program("const a =;").unwrap_err();
    match err {
        ParseError::PestError(_, location) => {
            let location = location.expect("pest errors carry a location");
            assert_eq!(location.line, 1);
        }
        other => panic!("Expected pest error, got {:?}", other),
    }
}

#[test]
fn test_function_declaration_with_rest_param() {
    match parse_single("async function gather(first, ...others) { return others }") {
        Stmt::Function { func } => {
            assert_eq!(func.name.as_deref(), Some("gather"));
            assert_eq!(func.params, vec!["first".to_string()]);
            assert_eq!(func.rest.as_deref(), Some("others"));
            assert!(func.is_async);
            assert!(!func.is_arrow);
        }
        other => panic!("Expected function, got {:?}", other),
    }
}

#[test]
fn test_rest_param_must_be_last() {
    assert!(parse_program("function f(...a, b) {}").is_err());
}

#[test]
fn test_keywords_are_not_identifiers_but_prefixes_are() {
    assert!(parse_program("const return = 1").is_err());

    match parse_expr("returned + iffy") {
        Expr::Binary { left, right, .. } => {
            assert_eq!(*left, Expr::ident("returned"));
            assert_eq!(*right, Expr::ident("iffy"));
        }
        other => panic!("Expected binary, got {:?}", other),
    }
}

#[test]
fn test_operator_precedence() {
    let expr = parse_expr("1 + 2 * 3 === 7 && !done");
    let expected = Expr::Logical {
        op: LogicalOp::And,
        left: Box::new(Expr::Binary {
            op: BinaryOp::StrictEq,
            left: Box::new(Expr::Binary {
                op: BinaryOp::Add,
                left: Box::new(Expr::LitNum { v: 1.0 }),
                right: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    left: Box::new(Expr::LitNum { v: 2.0 }),
                    right: Box::new(Expr::LitNum { v: 3.0 }),
                }),
            }),
            right: Box::new(Expr::LitNum { v: 7.0 }),
        }),
        right: Box::new(Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(Expr::ident("done")),
        }),
    };
    assert_eq!(expr, expected);
}

#[test]
fn test_member_call_chain() {
    let expr = parse_expr("console.log(items[0], user?.name)");
    match expr {
        Expr::Call { callee, args } => {
            assert_eq!(
                *callee,
                Expr::Member {
                    object: Box::new(Expr::ident("console")),
                    property: "log".to_string(),
                    optional: false,
                }
            );
            assert!(matches!(args[0], Expr::Index { .. }));
            assert!(matches!(args[1], Expr::Member { optional: true, .. }));
        }
        other => panic!("Expected call, got {:?}", other),
    }
}

#[test]
fn test_arrow_functions() {
    match parse_expr("xs.map(x => x + 1)") {
        Expr::Call { args, .. } => match &args[0] {
            Expr::Function { func } => {
                assert!(func.is_arrow);
                assert_eq!(func.params, vec!["x".to_string()]);
                assert!(matches!(func.body, FunctionBody::Expr { .. }));
            }
            other => panic!("Expected arrow, got {:?}", other),
        },
        other => panic!("Expected call, got {:?}", other),
    }

    match parse_expr("async (a, b) => { return a }") {
        Expr::Function { func } => {
            assert!(func.is_async);
            assert_eq!(func.params.len(), 2);
            assert!(matches!(func.body, FunctionBody::Block { .. }));
        }
        other => panic!("Expected arrow, got {:?}", other),
    }
}

#[test]
fn test_assignment_and_update() {
    assert!(matches!(
        parse_expr("total += price * 2"),
        Expr::Assign {
            op: AssignOp::Add,
            ..
        }
    ));
    assert!(matches!(
        parse_expr("i++"),
        Expr::Update {
            op: UpdateOp::Inc,
            prefix: false,
            ..
        }
    ));
    assert!(matches!(
        parse_expr("--count"),
        Expr::Update {
            op: UpdateOp::Dec,
            prefix: true,
            ..
        }
    ));
    assert!(parse_program("f() = 1").is_err());
}

#[test]
fn test_template_literal() {
    match parse_expr("`Hello ${name}, you are ${age + 1}!`") {
        Expr::Template { quasis, exprs } => {
            assert_eq!(quasis, vec!["Hello ", ", you are ", "!"]);
            assert_eq!(exprs.len(), 2);
        }
        other => panic!("Expected template, got {:?}", other),
    }
}

#[test]
fn test_string_escapes() {
    assert_eq!(
        parse_expr(r#""line\nnext \"quoted\"""#),
        Expr::LitStr {
            v: "line\nnext \"quoted\"".to_string()
        }
    );
    assert_eq!(
        parse_expr(r"'A'"),
        Expr::LitStr {
            v: "A".to_string()
        }
    );
}

#[test]
fn test_control_flow_statements() {
    let source = r#"
        if (a) b(); else if (c) { d() } else e()
        while (x < 10) x++
        for (let i = 0; i < 3; i++) {}
        for (;;) { break }
        for (const item of list) continue
        try { risky() } catch (err) { handle(err) } finally { cleanup() }
        try { risky() } catch { }
        throw new Error('boom')
    "#;
    let program = parse_program(source).unwrap();
    assert_eq!(program.body.len(), 8);

    assert!(matches!(program.body[0], Stmt::If { else_s: Some(_), .. }));
    assert!(matches!(program.body[1], Stmt::While { .. }));
    match &program.body[2] {
        Stmt::For { init, test, update, .. } => {
            assert!(matches!(init.as_deref(), Some(Stmt::Declare { .. })));
            assert!(test.is_some());
            assert!(update.is_some());
        }
        other => panic!("Expected for, got {:?}", other),
    }
    assert!(matches!(
        program.body[3],
        Stmt::For {
            init: None,
            test: None,
            update: None,
            ..
        }
    ));
    assert!(matches!(
        program.body[4],
        Stmt::ForLoop {
            kind: ForLoopKind::Of,
            ..
        }
    ));
    assert!(matches!(
        program.body[5],
        Stmt::Try {
            catch_var: Some(_),
            finally_body: Some(_),
            ..
        }
    ));
    assert!(matches!(program.body[6], Stmt::Try { catch_var: None, .. }));
    assert!(matches!(program.body[7], Stmt::Throw { .. }));
}

#[test]
fn test_try_requires_handler() {
    let err = parse_program("try { a() }").unwrap_err();
    assert!(err.message().contains("Missing catch or finally"));
}

#[test]
fn test_object_literal_and_block_disambiguation() {
    let program = parse_program("{ a() }\n({ a: 1, b })").unwrap();
    assert!(matches!(program.body[0], Stmt::Block { .. }));
    match &program.body[1] {
        Stmt::Expr {
            expr: Expr::LitObj { properties },
        } => {
            assert_eq!(properties[0].0, "a");
            assert_eq!(properties[1], ("b".to_string(), Expr::ident("b")));
        }
        other => panic!("Expected object literal, got {:?}", other),
    }
}

#[test]
fn test_comments_are_skipped() {
    let program = parse_program("// leading\nconst a = 1; /* inline */ const b = 2").unwrap();
    assert_eq!(program.body.len(), 2);
}

#[test]
fn test_ast_serialization_roundtrip() {
    let program = parse_program("const f = async (x) => await g(x ?? 0)").unwrap();
    let json = serde_json::to_string(&program).expect("Program serialization failed");
    let back: Program = serde_json::from_str(&json).expect("Program deserialization failed");
    assert_eq!(program, back);
}
