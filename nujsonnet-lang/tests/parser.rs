#![warn(
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_qualifications
)]
#![forbid(unsafe_code)]

//! Parser shape tests over the surface AST.

use nujsonnet_lang::ast;
use nujsonnet_lang::lexer::Lexer;
use nujsonnet_lang::parser::Parser;
use nujsonnet_lang::span::SourceMap;

#[track_caller]
fn parse(input: &str) -> ast::Expr {
    let mut map = SourceMap::new();
    let src = map.add_file("test.jsonnet", input.into());
    let tokens = Lexer::new(&map, src).lex_to_eof().unwrap();
    Parser::new(&map, tokens).parse_root_expr().unwrap()
}

#[track_caller]
fn parse_err(input: &str) -> String {
    let mut map = SourceMap::new();
    let src = map.add_file("test.jsonnet", input.into());
    let tokens = Lexer::new(&map, src).lex_to_eof().unwrap();
    Parser::new(&map, tokens)
        .parse_root_expr()
        .unwrap_err()
        .message
}

#[test]
fn test_precedence() {
    // 1 + 2 * 3 parses as 1 + (2 * 3).
    let expr = parse("1 + 2 * 3");
    let ast::ExprKind::Binary(lhs, ast::BinaryOp::Add, rhs) = expr.kind else {
        panic!("expected an addition at the top");
    };
    assert!(matches!(lhs.kind, ast::ExprKind::Number(_)));
    assert!(matches!(
        rhs.kind,
        ast::ExprKind::Binary(_, ast::BinaryOp::Mul, _),
    ));

    // Comparison binds looser than addition.
    let expr = parse("1 + 2 < 3 + 4");
    assert!(matches!(
        expr.kind,
        ast::ExprKind::Binary(_, ast::BinaryOp::Lt, _),
    ));

    // || is the loosest.
    let expr = parse("a == b || c != d");
    assert!(matches!(
        expr.kind,
        ast::ExprKind::Binary(_, ast::BinaryOp::LogicOr, _),
    ));

    // Binary operators associate to the left.
    let expr = parse("1 - 2 - 3");
    let ast::ExprKind::Binary(lhs, ast::BinaryOp::Sub, _) = expr.kind else {
        panic!("expected subtraction at the top");
    };
    assert!(matches!(
        lhs.kind,
        ast::ExprKind::Binary(_, ast::BinaryOp::Sub, _),
    ));
}

#[test]
fn test_unary_and_suffix() {
    // Unary binds tighter than binary, suffixes tighter than unary.
    let expr = parse("-a.b + c");
    let ast::ExprKind::Binary(lhs, ast::BinaryOp::Add, _) = expr.kind else {
        panic!("expected addition at the top");
    };
    let ast::ExprKind::Unary(ast::UnaryOp::Minus, inner) = lhs.kind else {
        panic!("expected unary minus");
    };
    assert!(matches!(inner.kind, ast::ExprKind::Field(_, _)));
}

#[test]
fn test_calls() {
    let expr = parse("f(1, x=2) tailstrict");
    let ast::ExprKind::Call {
        args, tailstrict, ..
    } = expr.kind
    else {
        panic!("expected a call");
    };
    assert!(tailstrict);
    assert_eq!(args.len(), 2);
    assert!(matches!(args[0], ast::Arg::Positional(_)));
    assert!(matches!(args[1], ast::Arg::Named(_, _)));
}

#[test]
fn test_slices() {
    assert!(matches!(
        parse("a[1]").kind,
        ast::ExprKind::Index(_, _),
    ));
    let ast::ExprKind::Slice(_, start, end, step) = parse("a[1:2:3]").kind else {
        panic!("expected a slice");
    };
    assert!(start.is_some() && end.is_some() && step.is_some());
    let ast::ExprKind::Slice(_, start, end, step) = parse("a[::2]").kind else {
        panic!("expected a slice");
    };
    assert!(start.is_none() && end.is_none() && step.is_some());
    // `::` lexes as one token but still splits the slice parts.
    let ast::ExprKind::Slice(_, start, end, step) = parse("a[1::]").kind else {
        panic!("expected a slice");
    };
    assert!(start.is_some() && end.is_none() && step.is_none());
}

#[test]
fn test_object_members() {
    let expr = parse("{a: 1, b():: 2, [k]: 3, local l = 4, assert true : \"m\"}");
    let ast::ExprKind::Object(ast::ObjInside::Members(members)) = expr.kind else {
        panic!("expected an object");
    };
    assert_eq!(members.len(), 5);
    let ast::Member::Field(ref field) = members[1] else {
        panic!("expected a field");
    };
    assert!(field.params.is_some());
    assert_eq!(field.visibility, ast::Visibility::Hidden);
    let ast::Member::Field(ref field) = members[2] else {
        panic!("expected a field");
    };
    assert!(matches!(field.name, ast::FieldName::Computed(_, _)));
    assert!(matches!(members[3], ast::Member::Local(_)));
    let ast::Member::Assert(ref assert) = members[4] else {
        panic!("expected an assert");
    };
    assert!(assert.msg.is_some());
}

#[test]
fn test_plus_fields() {
    let expr = parse("{a+: 1, b+:: 2}");
    let ast::ExprKind::Object(ast::ObjInside::Members(members)) = expr.kind else {
        panic!("expected an object");
    };
    let ast::Member::Field(ref field) = members[0] else {
        panic!("expected a field");
    };
    assert!(field.plus);
    assert_eq!(field.visibility, ast::Visibility::Default);
    let ast::Member::Field(ref field) = members[1] else {
        panic!("expected a field");
    };
    assert!(field.plus);
    assert_eq!(field.visibility, ast::Visibility::Hidden);
}

#[test]
fn test_comprehensions() {
    let expr = parse("[x + 1 for x in xs if x > 0 for y in ys]");
    let ast::ExprKind::ArrayComp(_, spec) = expr.kind else {
        panic!("expected an array comprehension");
    };
    assert_eq!(spec.len(), 3);
    assert!(matches!(spec[0], ast::CompSpecPart::For(_)));
    assert!(matches!(spec[1], ast::CompSpecPart::If(_)));
    assert!(matches!(spec[2], ast::CompSpecPart::For(_)));

    let expr = parse("{local l = 1, [k]: k for k in ks}");
    let ast::ExprKind::Object(ast::ObjInside::Comp {
        locals1, locals2, ..
    }) = expr.kind
    else {
        panic!("expected an object comprehension");
    };
    assert_eq!(locals1.len(), 1);
    assert!(locals2.is_empty());
}

#[test]
fn test_super_forms() {
    assert!(matches!(
        parse("{a: super.b}").kind,
        ast::ExprKind::Object(_),
    ));
    let expr = parse("{a: \"b\" in super}");
    let ast::ExprKind::Object(ast::ObjInside::Members(members)) = expr.kind else {
        panic!("expected an object");
    };
    let ast::Member::Field(ref field) = members[0] else {
        panic!("expected a field");
    };
    assert!(matches!(field.value.kind, ast::ExprKind::InSuper(_, _)));
    // `x in super.f` is a plain `in` on a super field access.
    let expr = parse("{a: \"b\" in super.c}");
    let ast::ExprKind::Object(ast::ObjInside::Members(members)) = expr.kind else {
        panic!("expected an object");
    };
    let ast::Member::Field(ref field) = members[0] else {
        panic!("expected a field");
    };
    assert!(matches!(
        field.value.kind,
        ast::ExprKind::Binary(_, ast::BinaryOp::In, _),
    ));
}

#[test]
fn test_obj_ext_sugar() {
    assert!(matches!(
        parse("base { a: 1 }").kind,
        ast::ExprKind::ObjExt(_, _),
    ));
}

#[test]
fn test_parse_errors() {
    assert!(parse_err("{a: }").contains("expected an expression"));
    assert!(parse_err("[1, 2").contains("expected"));
    assert!(parse_err("local x 1; x").contains("\"=\""));
    assert!(parse_err("if true 1").contains("\"then\""));
    assert!(parse_err("super").contains("after \"super\""));
    assert!(parse_err("{[k] 1}").contains("\":\""));
    assert!(parse_err("a[]").contains("index"));
    assert!(parse_err("{assert true, [k]: 1 for k in ks}").contains("cannot have asserts"));
    assert!(parse_err("{a: 1 for k in ks}").contains("must be computed"));
    assert!(parse_err("{[k]: 1, [j]: 2 for k in ks}").contains("one field"));
    assert!(parse_err("1 2").contains("expected end of file"));
}
