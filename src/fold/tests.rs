use bumpalo::Bump;

use super::*;
use crate::span::Span;

fn lit_int(arena: &Bump, v: i64) -> &Expr<'_> {
    arena.alloc(Expr::Literal(LiteralExpr {
        kind: LiteralKind::Int(v),
        span: Span::default(),
    }))
}

fn lit_float(arena: &Bump, v: f64) -> &Expr<'_> {
    arena.alloc(Expr::Literal(LiteralExpr {
        kind: LiteralKind::Float(v),
        span: Span::default(),
    }))
}

fn lit_bool(arena: &Bump, v: bool) -> &Expr<'_> {
    arena.alloc(Expr::Literal(LiteralExpr {
        kind: LiteralKind::Bool(v),
        span: Span::default(),
    }))
}

fn lit_null(arena: &Bump) -> &Expr<'_> {
    arena.alloc(Expr::Literal(LiteralExpr {
        kind: LiteralKind::Null,
        span: Span::default(),
    }))
}

fn lit_str<'a>(arena: &'a Bump, v: &str) -> &'a Expr<'a> {
    arena.alloc(Expr::Literal(LiteralExpr {
        kind: LiteralKind::Str(arena.alloc_str(v)),
        span: Span::default(),
    }))
}

fn name<'a>(arena: &'a Bump, n: &'a str) -> &'a Expr<'a> {
    arena.alloc(Expr::Name(NameExpr {
        ident: Ident::new(n, Span::default()),
        span: Span::default(),
    }))
}

fn binary<'a>(
    arena: &'a Bump,
    left: &'a Expr<'a>,
    op: BinaryOp,
    right: &'a Expr<'a>,
) -> &'a Expr<'a> {
    arena.alloc(Expr::Binary(arena.alloc(BinaryExpr {
        left,
        op,
        right,
        span: Span::default(),
    })))
}

fn call0<'a>(arena: &'a Bump, callee: &'a str) -> &'a Expr<'a> {
    arena.alloc(Expr::Call(arena.alloc(CallExpr {
        callee: name(arena, callee),
        args: &[],
        span: Span::default(),
    })))
}

fn expr_stmt<'a>(_arena: &'a Bump, expr: &'a Expr<'a>) -> Stmt<'a> {
    Stmt::Expr(ExprStmt {
        expr: Some(expr),
        span: Span::default(),
    })
}

/// Fold a single expression against an empty layout.
fn fold_one<'a>(arena: &'a Bump, expr: &'a Expr<'a>) -> &'a Expr<'a> {
    let layout = ProgramLayout::default();
    let mut diags = Diagnostics::new();
    let mut folder = Folder::new(arena, &layout, &mut diags);
    let folded = folder.fold_expr(expr);
    assert!(!diags.has_errors());
    folded
}

fn as_int(expr: &Expr<'_>) -> i64 {
    match expr.as_literal() {
        Some(LiteralKind::Int(v)) => *v,
        other => panic!("expected int literal, got {:?}", other),
    }
}

fn as_bool(expr: &Expr<'_>) -> bool {
    match expr.as_literal() {
        Some(LiteralKind::Bool(v)) => *v,
        other => panic!("expected bool literal, got {:?}", other),
    }
}

#[test]
fn arithmetic_folds_to_runtime_result() {
    let arena = Bump::new();
    let folded = fold_one(
        &arena,
        binary(&arena, lit_int(&arena, 6), BinaryOp::Mul, lit_int(&arena, 7)),
    );
    assert_eq!(as_int(folded), 42);
}

#[test]
fn mixed_arithmetic_promotes() {
    let arena = Bump::new();
    let folded = fold_one(
        &arena,
        binary(
            &arena,
            lit_int(&arena, 1),
            BinaryOp::Add,
            lit_float(&arena, 0.5),
        ),
    );
    assert_eq!(folded.as_literal(), Some(&LiteralKind::Float(1.5)));
}

#[test]
fn string_concatenation_folds() {
    let arena = Bump::new();
    let folded = fold_one(
        &arena,
        binary(
            &arena,
            lit_str(&arena, "foo"),
            BinaryOp::Add,
            lit_str(&arena, "bar"),
        ),
    );
    assert_eq!(folded.as_literal(), Some(&LiteralKind::Str("foobar")));
}

#[test]
fn nested_folding_is_bottom_up() {
    let arena = Bump::new();
    // (2 + 3) * 4
    let inner = binary(&arena, lit_int(&arena, 2), BinaryOp::Add, lit_int(&arena, 3));
    let folded = fold_one(&arena, binary(&arena, inner, BinaryOp::Mul, lit_int(&arena, 4)));
    assert_eq!(as_int(folded), 20);
}

#[test]
fn division_by_literal_zero_stays_unfolded() {
    let arena = Bump::new();
    let div = binary(&arena, lit_int(&arena, 6), BinaryOp::Div, lit_int(&arena, 0));
    let folded = fold_one(&arena, div);
    assert!(matches!(folded, Expr::Binary(b) if b.op == BinaryOp::Div));

    let rem = binary(&arena, lit_int(&arena, 6), BinaryOp::Rem, lit_int(&arena, 0));
    let folded = fold_one(&arena, rem);
    assert!(matches!(folded, Expr::Binary(b) if b.op == BinaryOp::Rem));
}

#[test]
fn comparisons_fold() {
    let arena = Bump::new();
    let cases = [
        (1, BinaryOp::Lt, 2, true),
        (2, BinaryOp::Le, 2, true),
        (3, BinaryOp::Gt, 5, false),
        (3, BinaryOp::Eq, 3, true),
        (3, BinaryOp::Ne, 3, false),
    ];
    for (l, op, r, expected) in cases {
        let folded = fold_one(&arena, binary(&arena, lit_int(&arena, l), op, lit_int(&arena, r)));
        assert_eq!(as_bool(folded), expected, "{} {:?} {}", l, op, r);
    }
}

#[test]
fn nan_comparisons_fold_false() {
    let arena = Bump::new();
    let folded = fold_one(
        &arena,
        binary(
            &arena,
            lit_float(&arena, f64::NAN),
            BinaryOp::Lt,
            lit_float(&arena, 1.0),
        ),
    );
    assert!(!as_bool(folded));
    let folded = fold_one(
        &arena,
        binary(
            &arena,
            lit_float(&arena, f64::NAN),
            BinaryOp::Ne,
            lit_float(&arena, f64::NAN),
        ),
    );
    assert!(as_bool(folded));
}

#[test]
fn incomparable_types_stay_unfolded() {
    let arena = Bump::new();
    let cmp = binary(
        &arena,
        lit_bool(&arena, true),
        BinaryOp::Lt,
        lit_int(&arena, 1),
    );
    let folded = fold_one(&arena, cmp);
    assert!(matches!(folded, Expr::Binary(_)));
}

#[test]
fn unary_folding() {
    let arena = Bump::new();
    let neg = arena.alloc(Expr::Unary(arena.alloc(UnaryExpr {
        op: UnaryOp::Neg,
        operand: lit_int(&arena, 5),
        span: Span::default(),
    })));
    assert_eq!(as_int(fold_one(&arena, neg)), -5);

    let not = arena.alloc(Expr::Unary(arena.alloc(UnaryExpr {
        op: UnaryOp::Not,
        operand: lit_str(&arena, ""),
        span: Span::default(),
    })));
    assert!(as_bool(fold_one(&arena, not)));
}

#[test]
fn paren_unwrapping() {
    let arena = Bump::new();
    let paren = arena.alloc(Expr::Paren(arena.alloc(ParenExpr {
        expr: lit_int(&arena, 9),
        span: Span::default(),
    })));
    assert_eq!(as_int(fold_one(&arena, paren)), 9);
}

#[test]
fn literal_left_selects_branch() {
    let arena = Bump::new();
    // true && f()  =>  f()
    let folded = fold_one(
        &arena,
        binary(&arena, lit_bool(&arena, true), BinaryOp::And, call0(&arena, "f")),
    );
    assert!(matches!(folded, Expr::Call(_)));

    // false && f()  =>  false, f never runs
    let folded = fold_one(
        &arena,
        binary(&arena, lit_bool(&arena, false), BinaryOp::And, call0(&arena, "f")),
    );
    assert!(!as_bool(folded));

    // true || f()  =>  true
    let folded = fold_one(
        &arena,
        binary(&arena, lit_bool(&arena, true), BinaryOp::Or, call0(&arena, "f")),
    );
    assert!(as_bool(folded));
}

#[test]
fn coalesce_folding() {
    let arena = Bump::new();
    let folded = fold_one(
        &arena,
        binary(&arena, lit_null(&arena), BinaryOp::Coalesce, lit_int(&arena, 2)),
    );
    assert_eq!(as_int(folded), 2);

    let folded = fold_one(
        &arena,
        binary(&arena, lit_int(&arena, 1), BinaryOp::Coalesce, call0(&arena, "f")),
    );
    assert_eq!(as_int(folded), 1);
}

fn fold_unit_stmts<'a>(
    arena: &'a Bump,
    stmts: &'a [Stmt<'a>],
    diags: &mut Diagnostics,
) -> Unit<'a> {
    let unit = Unit {
        stmts,
        span: Span::default(),
    };
    let layout = ProgramLayout::build(&unit, diags);
    let mut folder = Folder::new(arena, &layout, diags);
    folder.fold_unit(&unit)
}

#[test]
fn residual_preserves_side_effects() {
    let arena = Bump::new();
    // f() || true;  =>  f();  (the statement's own value folds away)
    let stmt = expr_stmt(
        &arena,
        binary(&arena, call0(&arena, "f"), BinaryOp::Or, lit_bool(&arena, true)),
    );
    let stmts = arena.alloc_slice_copy(&[stmt]);
    let mut diags = Diagnostics::new();
    let folded = fold_unit_stmts(&arena, stmts, &mut diags);

    assert_eq!(folded.stmts.len(), 1);
    match &folded.stmts[0] {
        Stmt::Expr(es) => assert!(matches!(es.expr.unwrap(), Expr::Call(_))),
        other => panic!("expected residual call statement, got {:?}", other),
    }
}

#[test]
fn residual_keeps_value_context() {
    let arena = Bump::new();
    // x = f() || true;  =>  f(); x = true;
    let assign = arena.alloc(Expr::Assign(arena.alloc(AssignExpr {
        target: name(&arena, "x"),
        op: AssignOp::Assign,
        value: binary(&arena, call0(&arena, "f"), BinaryOp::Or, lit_bool(&arena, true)),
        span: Span::default(),
    })));
    let stmts = arena.alloc_slice_copy(&[expr_stmt(&arena, assign)]);
    let mut diags = Diagnostics::new();
    let folded = fold_unit_stmts(&arena, stmts, &mut diags);

    assert_eq!(folded.stmts.len(), 2);
    assert!(matches!(
        &folded.stmts[0],
        Stmt::Expr(es) if matches!(es.expr.unwrap(), Expr::Call(_))
    ));
    match &folded.stmts[1] {
        Stmt::Expr(es) => match es.expr.unwrap() {
            Expr::Assign(a) => assert!(as_bool(a.value)),
            other => panic!("expected assignment, got {:?}", other),
        },
        other => panic!("expected assignment statement, got {:?}", other),
    }
}

#[test]
fn and_with_literal_false_right_residualizes() {
    let arena = Bump::new();
    let assign = arena.alloc(Expr::Assign(arena.alloc(AssignExpr {
        target: name(&arena, "x"),
        op: AssignOp::Assign,
        value: binary(&arena, call0(&arena, "f"), BinaryOp::And, lit_int(&arena, 0)),
        span: Span::default(),
    })));
    let stmts = arena.alloc_slice_copy(&[expr_stmt(&arena, assign)]);
    let mut diags = Diagnostics::new();
    let folded = fold_unit_stmts(&arena, stmts, &mut diags);

    assert_eq!(folded.stmts.len(), 2);
    match &folded.stmts[1] {
        Stmt::Expr(es) => match es.expr.unwrap() {
            Expr::Assign(a) => assert!(!as_bool(a.value)),
            other => panic!("expected assignment, got {:?}", other),
        },
        other => panic!("expected assignment statement, got {:?}", other),
    }
}

#[test]
fn pure_left_operand_leaves_no_residual() {
    let arena = Bump::new();
    // x || true in value position: x is pure, no residual statement.
    let assign = arena.alloc(Expr::Assign(arena.alloc(AssignExpr {
        target: name(&arena, "y"),
        op: AssignOp::Assign,
        value: binary(&arena, name(&arena, "x"), BinaryOp::Or, lit_bool(&arena, true)),
        span: Span::default(),
    })));
    let stmts = arena.alloc_slice_copy(&[expr_stmt(&arena, assign)]);
    let mut diags = Diagnostics::new();
    let folded = fold_unit_stmts(&arena, stmts, &mut diags);
    assert_eq!(folded.stmts.len(), 1);
}

#[test]
fn constant_substitution() {
    let arena = Bump::new();
    // const N = 5; f(N + 1);  =>  f(6);
    let decl = Stmt::Const(arena.alloc(ConstDecl {
        name: Ident::new("N", Span::default()),
        value: lit_int(&arena, 5),
        span: Span::default(),
    }));
    let use_n = arena.alloc(Expr::Call(arena.alloc(CallExpr {
        callee: name(&arena, "f"),
        args: arena.alloc_slice_copy(&[binary(
            &arena,
            name(&arena, "N"),
            BinaryOp::Add,
            lit_int(&arena, 1),
        )]),
        span: Span::default(),
    })));
    let stmts = arena.alloc_slice_copy(&[decl, expr_stmt(&arena, use_n)]);
    let mut diags = Diagnostics::new();
    let folded = fold_unit_stmts(&arena, stmts, &mut diags);

    assert!(!diags.has_errors());
    // The const declaration is gone; one call remains with a literal 6.
    assert_eq!(folded.stmts.len(), 1);
    match &folded.stmts[0] {
        Stmt::Expr(es) => match es.expr.unwrap() {
            Expr::Call(call) => assert_eq!(as_int(call.args[0]), 6),
            other => panic!("expected call, got {:?}", other),
        },
        other => panic!("expected expression statement, got {:?}", other),
    }
}

#[test]
fn assignment_to_constant_is_reported() {
    let arena = Bump::new();
    let decl = Stmt::Const(arena.alloc(ConstDecl {
        name: Ident::new("N", Span::default()),
        value: lit_int(&arena, 5),
        span: Span::default(),
    }));
    let assign = arena.alloc(Expr::Assign(arena.alloc(AssignExpr {
        target: name(&arena, "N"),
        op: AssignOp::Assign,
        value: lit_int(&arena, 6),
        span: Span::new(2, 1, 5),
    })));
    let stmts = arena.alloc_slice_copy(&[decl, expr_stmt(&arena, assign)]);
    let mut diags = Diagnostics::new();
    fold_unit_stmts(&arena, stmts, &mut diags);

    assert!(diags.has_errors());
    let message = diags.errors().next().unwrap().to_string();
    assert!(message.contains("assignment to constant 'N'"), "{}", message);
}

#[test]
fn if_with_literal_condition_reduces_to_arm() {
    let arena = Bump::new();
    let then_branch = arena.alloc(Stmt::Expr(ExprStmt {
        expr: Some(call0(&arena, "a")),
        span: Span::default(),
    }));
    let else_branch = arena.alloc(Stmt::Expr(ExprStmt {
        expr: Some(call0(&arena, "b")),
        span: Span::default(),
    }));
    let if_stmt = Stmt::If(arena.alloc(IfStmt {
        condition: lit_bool(&arena, true),
        then_stmt: then_branch,
        else_stmt: Some(else_branch),
        span: Span::default(),
    }));
    let stmts = arena.alloc_slice_copy(&[if_stmt]);
    let mut diags = Diagnostics::new();
    let folded = fold_unit_stmts(&arena, stmts, &mut diags);

    assert_eq!(folded.stmts.len(), 1);
    match &folded.stmts[0] {
        Stmt::Expr(es) => match es.expr.unwrap() {
            Expr::Call(call) => match call.callee {
                Expr::Name(n) => assert_eq!(n.ident.name, "a"),
                other => panic!("unexpected callee {:?}", other),
            },
            other => panic!("expected call, got {:?}", other),
        },
        other => panic!("expected the then-branch, got {:?}", other),
    }
}

#[test]
fn while_false_is_removed() {
    let arena = Bump::new();
    let body = arena.alloc(Stmt::Expr(ExprStmt {
        expr: Some(call0(&arena, "f")),
        span: Span::default(),
    }));
    let while_stmt = Stmt::While(arena.alloc(WhileStmt {
        condition: lit_bool(&arena, false),
        body,
        span: Span::default(),
    }));
    let stmts = arena.alloc_slice_copy(&[while_stmt]);
    let mut diags = Diagnostics::new();
    let folded = fold_unit_stmts(&arena, stmts, &mut diags);
    assert!(folded.stmts.is_empty());
}

#[test]
fn for_with_false_condition_keeps_init() {
    let arena = Bump::new();
    let init = arena.alloc(Expr::Assign(arena.alloc(AssignExpr {
        target: name(&arena, "i"),
        op: AssignOp::Assign,
        value: lit_int(&arena, 0),
        span: Span::default(),
    })));
    let body = arena.alloc(Stmt::Expr(ExprStmt {
        expr: Some(call0(&arena, "f")),
        span: Span::default(),
    }));
    let for_stmt = Stmt::For(arena.alloc(ForStmt {
        init: Some(init),
        condition: Some(lit_bool(&arena, false)),
        update: &[],
        body,
        span: Span::default(),
    }));
    let stmts = arena.alloc_slice_copy(&[for_stmt]);
    let mut diags = Diagnostics::new();
    let folded = fold_unit_stmts(&arena, stmts, &mut diags);

    assert_eq!(folded.stmts.len(), 1);
    assert!(matches!(
        &folded.stmts[0],
        Stmt::Expr(es) if matches!(es.expr.unwrap(), Expr::Assign(_))
    ));
}

#[test]
fn ternary_with_literal_condition() {
    let arena = Bump::new();
    let ternary = arena.alloc(Expr::Ternary(arena.alloc(TernaryExpr {
        condition: lit_int(&arena, 0),
        then_expr: lit_int(&arena, 1),
        else_expr: lit_int(&arena, 2),
        span: Span::default(),
    })));
    assert_eq!(as_int(fold_one(&arena, ternary)), 2);
}
