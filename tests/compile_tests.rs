//! End-to-end tests of the `compile(tree) -> Program | Diagnostics`
//! contract.

use bumpalo::Bump;

use quill_compiler::ast::*;
use quill_compiler::bytecode::{Op, UNRESOLVED};
use quill_compiler::value::Value;
use quill_compiler::{Program, Span, compile};

fn lit_int(arena: &Bump, v: i64) -> &Expr<'_> {
    arena.alloc(Expr::Literal(LiteralExpr {
        kind: LiteralKind::Int(v),
        span: Span::default(),
    }))
}

fn lit_bool(arena: &Bump, v: bool) -> &Expr<'_> {
    arena.alloc(Expr::Literal(LiteralExpr {
        kind: LiteralKind::Bool(v),
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

fn set<'a>(arena: &'a Bump, target: &'a str, value: &'a Expr<'a>) -> Stmt<'a> {
    Stmt::Expr(ExprStmt {
        expr: Some(arena.alloc(Expr::Assign(arena.alloc(AssignExpr {
            target: name(arena, target),
            op: AssignOp::Assign,
            value,
            span: Span::default(),
        })))),
        span: Span::default(),
    })
}

fn call_stmt<'a>(arena: &'a Bump, callee: &'a str, args: &[&'a Expr<'a>]) -> Stmt<'a> {
    Stmt::Expr(ExprStmt {
        expr: Some(arena.alloc(Expr::Call(arena.alloc(CallExpr {
            callee: name(arena, callee),
            args: arena.alloc_slice_copy(args),
            span: Span::default(),
        })))),
        span: Span::default(),
    })
}

fn func<'a>(arena: &'a Bump, fname: &'a str, params: &[&'a str], body: &[Stmt<'a>]) -> Stmt<'a> {
    let params: Vec<ParamDecl<'a>> = params
        .iter()
        .map(|p| ParamDecl {
            name: Ident::new(p, Span::default()),
            default: None,
            span: Span::default(),
        })
        .collect();
    Stmt::Func(arena.alloc(FuncDecl {
        name: Ident::new(fname, Span::default()),
        params: arena.alloc_slice_copy(&params),
        body: Block {
            stmts: arena.alloc_slice_copy(body),
            span: Span::default(),
        },
        span: Span::default(),
    }))
}

fn unit<'a>(arena: &'a Bump, stmts: &[Stmt<'a>]) -> Unit<'a> {
    Unit {
        stmts: arena.alloc_slice_copy(stmts),
        span: Span::default(),
    }
}

fn assert_fully_resolved(program: &Program) {
    for object in std::iter::once(&program.top).chain(program.functions.iter()) {
        for (i, insn) in object.insns.iter().enumerate() {
            if insn.op.is_jump() {
                assert_ne!(insn.a, UNRESOLVED, "unresolved jump at {}:{}", object.name, i);
            }
        }
    }
}

#[test]
fn whole_unit_compiles_to_functions_plus_main() {
    let arena = Bump::new();
    // fn double(n) { return n + n; }
    // total = 0;
    // for (i = 0; i < 4; i = i + 1) { total = total + double(i); }
    let double = func(
        &arena,
        "double",
        &["n"],
        &[Stmt::Return(ReturnStmt {
            value: Some(binary(&arena, name(&arena, "n"), BinaryOp::Add, name(&arena, "n"))),
            span: Span::default(),
        })],
    );
    let call = arena.alloc(Expr::Call(arena.alloc(CallExpr {
        callee: name(&arena, "double"),
        args: arena.alloc_slice_copy(&[name(&arena, "i")]),
        span: Span::default(),
    })));
    let body = arena.alloc(Stmt::Block(Block {
        stmts: arena.alloc_slice_copy(&[set(
            &arena,
            "total",
            binary(&arena, name(&arena, "total"), BinaryOp::Add, call),
        )]),
        span: Span::default(),
    }));
    let for_loop = Stmt::For(arena.alloc(ForStmt {
        init: Some(arena.alloc(Expr::Assign(arena.alloc(AssignExpr {
            target: name(&arena, "i"),
            op: AssignOp::Assign,
            value: lit_int(&arena, 0),
            span: Span::default(),
        })))),
        condition: Some(binary(&arena, name(&arena, "i"), BinaryOp::Lt, lit_int(&arena, 4))),
        update: arena.alloc_slice_copy(&[&*arena.alloc(Expr::Assign(arena.alloc(AssignExpr {
            target: name(&arena, "i"),
            op: AssignOp::Assign,
            value: binary(&arena, name(&arena, "i"), BinaryOp::Add, lit_int(&arena, 1)),
            span: Span::default(),
        })))]),
        body,
        span: Span::default(),
    }));
    let stmts = [double, set(&arena, "total", lit_int(&arena, 0)), for_loop];

    let program = compile(&arena, &unit(&arena, &stmts)).expect("clean program");

    assert_eq!(program.functions.len(), 1);
    assert_eq!(program.functions[0].name, "double");
    assert_eq!(program.functions[0].params, 1);
    assert_eq!(program.top.name, "<main>");
    assert!(program.top.ops().contains(&Op::Call));
    assert_fully_resolved(&program);

    // The listing renders without panicking and names both objects.
    let listing = program.disasm();
    assert!(listing.contains("<main>"));
    assert!(listing.contains("double"));
}

#[test]
fn constant_substitution_reaches_the_call_site() {
    let arena = Bump::new();
    // const N = 5; fn p(v) {} p(N + 1);
    let decl = Stmt::Const(arena.alloc(ConstDecl {
        name: Ident::new("N", Span::default()),
        value: lit_int(&arena, 5),
        span: Span::default(),
    }));
    let stmts = [
        decl,
        func(&arena, "p", &["v"], &[]),
        call_stmt(
            &arena,
            "p",
            &[binary(&arena, name(&arena, "N"), BinaryOp::Add, lit_int(&arena, 1))],
        ),
    ];
    let program = compile(&arena, &unit(&arena, &stmts)).expect("clean program");

    // The argument is the single folded literal 6; N itself is gone.
    assert_eq!(
        program.top.ops(),
        vec![Op::Const, Op::Call, Op::Pop, Op::ReturnNull]
    );
    assert_eq!(program.top.pool, vec![Value::Int(6)]);
    assert_eq!(program.top.local_count(), 0);
}

#[test]
fn residual_call_survives_folding() {
    let arena = Bump::new();
    // fn f() {} (f() || true);
    let or = binary(
        &arena,
        arena.alloc(Expr::Call(arena.alloc(CallExpr {
            callee: name(&arena, "f"),
            args: &[],
            span: Span::default(),
        }))),
        BinaryOp::Or,
        lit_bool(&arena, true),
    );
    let stmts = [
        func(&arena, "f", &[], &[]),
        Stmt::Expr(ExprStmt {
            expr: Some(or),
            span: Span::default(),
        }),
    ];
    let program = compile(&arena, &unit(&arena, &stmts)).expect("clean program");

    // Exactly one call to f remains, as a discarded statement.
    let ops = program.top.ops();
    assert_eq!(ops.iter().filter(|&&op| op == Op::Call).count(), 1);
    assert_eq!(ops, vec![Op::Call, Op::Pop, Op::ReturnNull]);
}

#[test]
fn definite_assignment_contract() {
    let arena = Bump::new();
    // Accepted: if (c) { x = 1; } else { x = 2; } p(x);
    let accepted = [
        func(&arena, "p", &["v"], &[]),
        set(&arena, "c", lit_int(&arena, 1)),
        Stmt::If(arena.alloc(IfStmt {
            condition: name(&arena, "c"),
            then_stmt: arena.alloc(set(&arena, "x", lit_int(&arena, 1))),
            else_stmt: Some(arena.alloc(set(&arena, "x", lit_int(&arena, 2)))),
            span: Span::default(),
        })),
        call_stmt(&arena, "p", &[name(&arena, "x")]),
    ];
    assert!(compile(&arena, &unit(&arena, &accepted)).is_ok());

    // Rejected: if (c) { x = 1; } p(x);
    let rejected = [
        func(&arena, "p", &["v"], &[]),
        set(&arena, "c", lit_int(&arena, 1)),
        Stmt::If(arena.alloc(IfStmt {
            condition: name(&arena, "c"),
            then_stmt: arena.alloc(set(&arena, "x", lit_int(&arena, 1))),
            else_stmt: None,
            span: Span::default(),
        })),
        call_stmt(&arena, "p", &[name(&arena, "x")]),
    ];
    let diags = compile(&arena, &unit(&arena, &rejected)).unwrap_err();
    assert!(diags.errors().any(|d| d.message.contains("'x'")));
}

#[test]
fn failed_compilation_batches_diagnostics_and_yields_no_program() {
    let arena = Bump::new();
    let stmts = [
        call_stmt(&arena, "nope", &[]),
        set(&arena, "x", name(&arena, "undefined_thing")),
        Stmt::Break(BreakStmt {
            span: Span::default(),
        }),
    ];
    let diags = compile(&arena, &unit(&arena, &stmts)).unwrap_err();
    assert!(diags.error_count() >= 3);
}

#[test]
fn switch_dispatch_round_trip() {
    let arena = Bump::new();
    // switch (x) { case 10: a = 1; case 20: a = 2; }
    let cases = [
        SwitchCase {
            label: Some(lit_int(&arena, 10)),
            stmts: arena.alloc_slice_copy(&[set(&arena, "a", lit_int(&arena, 1))]),
            span: Span::default(),
        },
        SwitchCase {
            label: Some(lit_int(&arena, 20)),
            stmts: arena.alloc_slice_copy(&[set(&arena, "a", lit_int(&arena, 2))]),
            span: Span::default(),
        },
    ];
    let stmts = [
        set(&arena, "x", lit_int(&arena, 10)),
        Stmt::Switch(arena.alloc(SwitchStmt {
            expr: name(&arena, "x"),
            cases: arena.alloc_slice_copy(&cases),
            span: Span::default(),
        })),
    ];
    let program = compile(&arena, &unit(&arena, &stmts)).expect("clean program");
    let table = &program.top.switch_tables[0];

    // Each label's pool entry round-trips to the case entry instruction,
    // and a non-matching value lands right after the switch.
    for (pool_index, target) in &table.entries {
        assert!(matches!(
            program.top.pool[*pool_index as usize],
            Value::Int(10) | Value::Int(20)
        ));
        assert!((*target as usize) < program.top.insns.len());
        // Each case body starts by pushing its assignment's value.
        assert!(matches!(
            program.top.insns[*target as usize].op,
            Op::PushOne | Op::Const
        ));
    }
    assert_eq!(table.default as usize, program.top.insns.len() - 1);
    assert_eq!(program.top.insns[table.default as usize].op, Op::ReturnNull);
}

#[test]
fn line_table_tracks_statement_lines() {
    let arena = Bump::new();
    let stmts = [
        Stmt::Expr(ExprStmt {
            expr: Some(arena.alloc(Expr::Assign(arena.alloc(AssignExpr {
                target: name(&arena, "x"),
                op: AssignOp::Assign,
                value: lit_int(&arena, 3),
                span: Span::new(2, 1, 5),
            })))),
            span: Span::new(2, 1, 6),
        }),
        Stmt::Expr(ExprStmt {
            expr: Some(arena.alloc(Expr::Assign(arena.alloc(AssignExpr {
                target: name(&arena, "y"),
                op: AssignOp::Assign,
                value: lit_int(&arena, 4),
                span: Span::new(5, 1, 5),
            })))),
            span: Span::new(5, 1, 6),
        }),
    ];
    let program = compile(&arena, &unit(&arena, &stmts)).expect("clean program");

    assert_eq!(program.top.line_at(0), Some(2));
    let y_store = program
        .top
        .insns
        .iter()
        .enumerate()
        .filter(|(_, insn)| insn.op == Op::StoreLocal)
        .nth(1)
        .unwrap()
        .0;
    assert_eq!(program.top.line_at(y_store), Some(5));
}
