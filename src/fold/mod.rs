//! Tree rewriting: constant folding, short-circuit simplification, dead
//! branch elimination, and constant-name substitution.
//!
//! The folder runs bottom-up over one unit and produces an equivalent,
//! simpler tree for the flow analyzer and the generator. Nodes are never
//! mutated: changed subtrees are rebuilt into the arena, unchanged ones
//! are reused by reference.
//!
//! Two rules here are semantic, not optimizations:
//!
//! - Division or remainder by a literal zero is never folded; the runtime
//!   raises that error and the fold must not hide it.
//! - When folding eliminates an expression whose evaluation could have
//!   side effects (`f() || true` reduces to `true`), the expression is
//!   preserved as a *residual*: a discarded expression statement spliced
//!   immediately before the statement that contained it, in source order.

use bumpalo::Bump;

use crate::ast::*;
use crate::diag::Diagnostics;
use crate::error::CompileError;
use crate::layout::ProgramLayout;
use crate::value::{self, CmpResult, Value};

/// The fold pass over one translation unit.
pub struct Folder<'ast, 'a> {
    arena: &'ast Bump,
    layout: &'a ProgramLayout,
    diags: &'a mut Diagnostics,
    /// Residual side-effect expressions awaiting splice-out, in source
    /// order.
    pending: Vec<&'ast Expr<'ast>>,
}

impl<'ast, 'a> Folder<'ast, 'a> {
    /// Create a folder allocating rewritten nodes into `arena`.
    pub fn new(arena: &'ast Bump, layout: &'a ProgramLayout, diags: &'a mut Diagnostics) -> Self {
        Self {
            arena,
            layout,
            diags,
            pending: Vec::new(),
        }
    }

    /// Fold a whole unit.
    pub fn fold_unit(&mut self, unit: &Unit<'ast>) -> Unit<'ast> {
        Unit {
            stmts: self.fold_stmts(unit.stmts),
            span: unit.span,
        }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn fold_stmts(&mut self, stmts: &'ast [Stmt<'ast>]) -> &'ast [Stmt<'ast>] {
        let mut out: Vec<Stmt<'ast>> = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            let mark = self.pending.len();
            let folded = self.fold_stmt(stmt);
            for residual in self.pending.drain(mark..) {
                out.push(Stmt::Expr(ExprStmt {
                    expr: Some(residual),
                    span: residual.span(),
                }));
            }
            if let Some(stmt) = folded {
                out.push(stmt);
            }
        }
        self.arena.alloc_slice_copy(&out)
    }

    /// Fold a statement in a single-statement position (a loop or branch
    /// body). Residuals produced inside the body stay inside it.
    fn fold_body(&mut self, stmt: &'ast Stmt<'ast>) -> &'ast Stmt<'ast> {
        let mark = self.pending.len();
        let folded = self.fold_stmt(stmt);
        if self.pending.len() == mark {
            return self.alloc_stmt(folded.unwrap_or(Stmt::Block(Block {
                stmts: &[],
                span: stmt.span(),
            })));
        }
        let mut stmts: Vec<Stmt<'ast>> = self
            .pending
            .drain(mark..)
            .map(|residual| {
                Stmt::Expr(ExprStmt {
                    expr: Some(residual),
                    span: residual.span(),
                })
            })
            .collect();
        if let Some(stmt) = folded {
            stmts.push(stmt);
        }
        let span = stmt.span();
        self.alloc_stmt(Stmt::Block(Block {
            stmts: self.arena.alloc_slice_copy(&stmts),
            span,
        }))
    }

    fn fold_stmt(&mut self, stmt: &'ast Stmt<'ast>) -> Option<Stmt<'ast>> {
        match stmt {
            Stmt::Expr(expr_stmt) => {
                let expr = expr_stmt.expr?;
                let folded = self.fold_expr(expr);
                // A folded-away expression with no effects is dead.
                if folded.has_side_effects() {
                    Some(Stmt::Expr(ExprStmt {
                        expr: Some(folded),
                        span: expr_stmt.span,
                    }))
                } else {
                    None
                }
            }
            Stmt::Block(block) => Some(Stmt::Block(Block {
                stmts: self.fold_stmts(block.stmts),
                span: block.span,
            })),
            Stmt::If(if_stmt) => {
                let condition = self.fold_expr(if_stmt.condition);
                if let Some(lit) = condition.as_literal() {
                    // Statically decided branch: only the taken arm
                    // survives; the other never executes.
                    return if Value::from_literal(lit).is_truthy() {
                        Some(*self.fold_body(if_stmt.then_stmt))
                    } else {
                        if_stmt.else_stmt.map(|s| *self.fold_body(s))
                    };
                }
                Some(Stmt::If(self.arena.alloc(IfStmt {
                    condition,
                    then_stmt: self.fold_body(if_stmt.then_stmt),
                    else_stmt: if_stmt.else_stmt.map(|s| self.fold_body(s)),
                    span: if_stmt.span,
                })))
            }
            Stmt::While(while_stmt) => {
                let condition = self.fold_expr(while_stmt.condition);
                if let Some(lit) = condition.as_literal()
                    && !Value::from_literal(lit).is_truthy()
                {
                    // The body never runs.
                    return None;
                }
                Some(Stmt::While(self.arena.alloc(WhileStmt {
                    condition,
                    body: self.fold_body(while_stmt.body),
                    span: while_stmt.span,
                })))
            }
            Stmt::DoWhile(do_while) => {
                // The body always runs once; even a false condition keeps
                // the loop (break/continue inside still need a context).
                let body = self.fold_body(do_while.body);
                let condition = self.fold_expr(do_while.condition);
                Some(Stmt::DoWhile(self.arena.alloc(DoWhileStmt {
                    body,
                    condition,
                    span: do_while.span,
                })))
            }
            Stmt::For(for_stmt) => {
                let init = for_stmt.init.map(|e| self.fold_expr(e));
                let condition = for_stmt.condition.map(|e| self.fold_expr(e));
                if let Some(cond) = condition
                    && let Some(lit) = cond.as_literal()
                    && !Value::from_literal(lit).is_truthy()
                {
                    // Only the initializer ever executes.
                    return init.filter(|e| e.has_side_effects()).map(|e| {
                        Stmt::Expr(ExprStmt {
                            expr: Some(e),
                            span: e.span(),
                        })
                    });
                }
                let update: Vec<&'ast Expr<'ast>> = for_stmt
                    .update
                    .iter()
                    .map(|e| self.fold_expr(e))
                    .collect();
                Some(Stmt::For(self.arena.alloc(ForStmt {
                    init,
                    condition,
                    update: self.arena.alloc_slice_copy(&update),
                    body: self.fold_body(for_stmt.body),
                    span: for_stmt.span,
                })))
            }
            Stmt::Switch(switch) => {
                let expr = self.fold_expr(switch.expr);
                let cases: Vec<SwitchCase<'ast>> = switch
                    .cases
                    .iter()
                    .map(|case| SwitchCase {
                        label: case.label.map(|l| self.fold_expr(l)),
                        stmts: self.fold_stmts(case.stmts),
                        span: case.span,
                    })
                    .collect();
                Some(Stmt::Switch(self.arena.alloc(SwitchStmt {
                    expr,
                    cases: self.arena.alloc_slice_copy(&cases),
                    span: switch.span,
                })))
            }
            Stmt::Return(ret) => Some(Stmt::Return(ReturnStmt {
                value: ret.value.map(|e| self.fold_expr(e)),
                span: ret.span,
            })),
            Stmt::Break(_) | Stmt::Continue(_) | Stmt::Fallthrough(_) => Some(*stmt),
            Stmt::Func(decl) => Some(Stmt::Func(self.arena.alloc(FuncDecl {
                name: decl.name,
                params: decl.params,
                body: Block {
                    stmts: self.fold_stmts(decl.body.stmts),
                    span: decl.body.span,
                },
                span: decl.span,
            }))),
            // The layout already captured the value; references to the
            // name are inlined, so the declaration itself emits nothing.
            Stmt::Const(_) => None,
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    /// Fold one expression, returning the (possibly reused) replacement.
    pub fn fold_expr(&mut self, expr: &'ast Expr<'ast>) -> &'ast Expr<'ast> {
        match expr {
            Expr::Literal(_) => expr,
            Expr::Name(name) => match self.layout.constant(name.ident.name) {
                // Constant substitution: a fresh literal at the
                // reference's position.
                Some(value) => self.literal(value.clone(), name.span),
                None => expr,
            },
            Expr::Paren(paren) => self.fold_expr(paren.expr),
            Expr::Unary(unary) => self.fold_unary(expr, unary),
            Expr::Postfix(postfix) => {
                self.check_const_target(postfix.operand, postfix.span);
                let operand = self.fold_target(postfix.operand);
                if std::ptr::eq(operand, postfix.operand) {
                    expr
                } else {
                    self.alloc_expr(Expr::Postfix(self.arena.alloc(PostfixExpr {
                        operand,
                        op: postfix.op,
                        span: postfix.span,
                    })))
                }
            }
            Expr::Binary(binary) => self.fold_binary(expr, binary),
            Expr::Assign(assign) => {
                self.check_const_target(assign.target, assign.span);
                let target = self.fold_target(assign.target);
                let value = self.fold_expr(assign.value);
                if std::ptr::eq(target, assign.target) && std::ptr::eq(value, assign.value) {
                    expr
                } else {
                    self.alloc_expr(Expr::Assign(self.arena.alloc(AssignExpr {
                        target,
                        op: assign.op,
                        value,
                        span: assign.span,
                    })))
                }
            }
            Expr::Ternary(ternary) => {
                let condition = self.fold_expr(ternary.condition);
                if let Some(lit) = condition.as_literal() {
                    // Only the chosen arm survives; the other never runs.
                    return if Value::from_literal(lit).is_truthy() {
                        self.fold_expr(ternary.then_expr)
                    } else {
                        self.fold_expr(ternary.else_expr)
                    };
                }
                let then_expr = self.fold_expr(ternary.then_expr);
                let else_expr = self.fold_expr(ternary.else_expr);
                self.alloc_expr(Expr::Ternary(self.arena.alloc(TernaryExpr {
                    condition,
                    then_expr,
                    else_expr,
                    span: ternary.span,
                })))
            }
            Expr::Array(array) => {
                let elements: Vec<&'ast Expr<'ast>> =
                    array.elements.iter().map(|e| self.fold_expr(e)).collect();
                self.alloc_expr(Expr::Array(ArrayExpr {
                    elements: self.arena.alloc_slice_copy(&elements),
                    span: array.span,
                }))
            }
            Expr::Index(index) => {
                let object = self.fold_expr(index.object);
                let idx = self.fold_expr(index.index);
                if std::ptr::eq(object, index.object) && std::ptr::eq(idx, index.index) {
                    expr
                } else {
                    self.alloc_expr(Expr::Index(self.arena.alloc(IndexExpr {
                        object,
                        index: idx,
                        span: index.span,
                    })))
                }
            }
            Expr::Member(member) => {
                let object = self.fold_expr(member.object);
                if std::ptr::eq(object, member.object) {
                    expr
                } else {
                    self.alloc_expr(Expr::Member(self.arena.alloc(MemberExpr {
                        object,
                        member: member.member,
                        span: member.span,
                    })))
                }
            }
            Expr::Call(call) => {
                let callee = self.fold_expr(call.callee);
                let args: Vec<&'ast Expr<'ast>> =
                    call.args.iter().map(|e| self.fold_expr(e)).collect();
                self.alloc_expr(Expr::Call(self.arena.alloc(CallExpr {
                    callee,
                    args: self.arena.alloc_slice_copy(&args),
                    span: call.span,
                })))
            }
        }
    }

    fn fold_unary(&mut self, expr: &'ast Expr<'ast>, unary: &'ast UnaryExpr<'ast>) -> &'ast Expr<'ast> {
        if matches!(unary.op, UnaryOp::PreInc | UnaryOp::PreDec) {
            self.check_const_target(unary.operand, unary.span);
            let operand = self.fold_target(unary.operand);
            if std::ptr::eq(operand, unary.operand) {
                return expr;
            }
            return self.alloc_expr(Expr::Unary(self.arena.alloc(UnaryExpr {
                op: unary.op,
                operand,
                span: unary.span,
            })));
        }
        let operand = self.fold_expr(unary.operand);
        if let Some(lit) = operand.as_literal()
            && let Some(folded) = value::unary(unary.op, &Value::from_literal(lit))
        {
            return self.literal(folded, unary.span);
        }
        if std::ptr::eq(operand, unary.operand) {
            expr
        } else {
            self.alloc_expr(Expr::Unary(self.arena.alloc(UnaryExpr {
                op: unary.op,
                operand,
                span: unary.span,
            })))
        }
    }

    fn fold_binary(
        &mut self,
        expr: &'ast Expr<'ast>,
        binary: &'ast BinaryExpr<'ast>,
    ) -> &'ast Expr<'ast> {
        use BinaryOp::*;

        let left = self.fold_expr(binary.left);
        // Residuals created while folding the right operand come after the
        // left operand in source order; remember where to splice the left
        // operand if it has to be residualized.
        let mark = self.pending.len();
        let right = self.fold_expr(binary.right);

        match binary.op {
            And | Or => return self.fold_logical(expr, binary, left, right, mark),
            Coalesce => {
                if let Some(lit) = left.as_literal() {
                    // A literal left side decides the coalesce outright.
                    return if Value::from_literal(lit).is_null() {
                        right
                    } else {
                        // The right side never runs; neither do any
                        // residuals folded out of it.
                        self.pending.truncate(mark);
                        left
                    };
                }
            }
            Eq | Ne | Lt | Le | Gt | Ge => {
                if let (Some(l), Some(r)) = (left.as_literal(), right.as_literal()) {
                    let lv = Value::from_literal(l);
                    let rv = Value::from_literal(r);
                    if let Some(result) = fold_comparison(binary.op, &lv, &rv) {
                        return self.literal(Value::Bool(result), binary.span);
                    }
                }
            }
            _ => {
                if let (Some(l), Some(r)) = (left.as_literal(), right.as_literal())
                    && let Some(folded) =
                        value::arith(binary.op, &Value::from_literal(l), &Value::from_literal(r))
                {
                    return self.literal(folded, binary.span);
                }
            }
        }

        if std::ptr::eq(left, binary.left) && std::ptr::eq(right, binary.right) {
            expr
        } else {
            self.alloc_expr(Expr::Binary(self.arena.alloc(BinaryExpr {
                left,
                op: binary.op,
                right,
                span: binary.span,
            })))
        }
    }

    /// Short-circuit folding for `&&` and `||`.
    fn fold_logical(
        &mut self,
        expr: &'ast Expr<'ast>,
        binary: &'ast BinaryExpr<'ast>,
        left: &'ast Expr<'ast>,
        right: &'ast Expr<'ast>,
        mark: usize,
    ) -> &'ast Expr<'ast> {
        let or = binary.op == BinaryOp::Or;

        if let Some(lit) = left.as_literal() {
            let truthy = Value::from_literal(lit).is_truthy();
            // A literal left side selects a branch: either the right
            // operand runs unconditionally, or it never runs at all.
            return if truthy == or {
                // Short-circuit taken: the right side never runs, and any
                // residuals folded out of it go with it.
                self.pending.truncate(mark);
                self.literal(Value::Bool(or), binary.span)
            } else {
                right
            };
        }

        if let Some(lit) = right.as_literal() {
            let truthy = Value::from_literal(lit).is_truthy();
            // `lhs || <truthy>` is always true and `lhs && <falsy>` is
            // always false, but the left operand still executes; keep it
            // as a residual discarded statement if it can have effects.
            if truthy == or {
                if left.has_side_effects() {
                    self.pending.insert(mark, left);
                }
                return self.literal(Value::Bool(or), binary.span);
            }
        }

        if std::ptr::eq(left, binary.left) && std::ptr::eq(right, binary.right) {
            expr
        } else {
            self.alloc_expr(Expr::Binary(self.arena.alloc(BinaryExpr {
                left,
                op: binary.op,
                right,
                span: binary.span,
            })))
        }
    }

    /// Fold the subparts of an assignment target without substituting a
    /// constant name for the target itself.
    fn fold_target(&mut self, target: &'ast Expr<'ast>) -> &'ast Expr<'ast> {
        match target {
            Expr::Name(_) => target,
            Expr::Paren(paren) => self.fold_target(paren.expr),
            Expr::Index(index) => {
                let object = self.fold_expr(index.object);
                let idx = self.fold_expr(index.index);
                if std::ptr::eq(object, index.object) && std::ptr::eq(idx, index.index) {
                    target
                } else {
                    self.alloc_expr(Expr::Index(self.arena.alloc(IndexExpr {
                        object,
                        index: idx,
                        span: index.span,
                    })))
                }
            }
            Expr::Member(member) => {
                let object = self.fold_expr(member.object);
                if std::ptr::eq(object, member.object) {
                    target
                } else {
                    self.alloc_expr(Expr::Member(self.arena.alloc(MemberExpr {
                        object,
                        member: member.member,
                        span: member.span,
                    })))
                }
            }
            // Not a valid target; the generator reports it.
            other => self.fold_expr(other),
        }
    }

    /// Report writes through a declared constant's name.
    fn check_const_target(&mut self, target: &Expr<'ast>, span: crate::span::Span) {
        if let Expr::Name(name) = target
            && self.layout.constant(name.ident.name).is_some()
        {
            self.diags.error(CompileError::AssignmentToConstant {
                name: name.ident.name.to_string(),
                span,
            });
        }
    }

    // =========================================================================
    // Node construction
    // =========================================================================

    fn literal(&self, value: Value, span: crate::span::Span) -> &'ast Expr<'ast> {
        let kind = match value {
            Value::Null => LiteralKind::Null,
            Value::Bool(b) => LiteralKind::Bool(b),
            Value::Int(i) => LiteralKind::Int(i),
            Value::Float(f) => LiteralKind::Float(f),
            Value::Str(s) => LiteralKind::Str(self.arena.alloc_str(&s)),
        };
        self.arena.alloc(Expr::Literal(LiteralExpr { kind, span }))
    }

    fn alloc_expr(&self, expr: Expr<'ast>) -> &'ast Expr<'ast> {
        self.arena.alloc(expr)
    }

    fn alloc_stmt(&self, stmt: Stmt<'ast>) -> &'ast Stmt<'ast> {
        self.arena.alloc(stmt)
    }
}

/// Fold one literal comparison, or `None` when the types leave it to the
/// runtime.
fn fold_comparison(op: BinaryOp, left: &Value, right: &Value) -> Option<bool> {
    use BinaryOp::*;
    match op {
        Eq => value::equals(left, right),
        Ne => value::equals(left, right).map(|b| !b),
        _ => match value::compare(left, right) {
            CmpResult::Less => Some(matches!(op, Lt | Le)),
            CmpResult::Equal => Some(matches!(op, Le | Ge)),
            CmpResult::Greater => Some(matches!(op, Gt | Ge)),
            // NaN: every ordering test is false.
            CmpResult::Unordered => Some(false),
            CmpResult::Incomparable => None,
        },
    }
}

#[cfg(test)]
mod tests;
