//! Reachability and definite-assignment analysis.
//!
//! Runs between folding and code generation over the folded tree. Tracks,
//! per nested scope, which variables are certainly assigned when control
//! reaches a point and whether the point is reachable at all, and rejects:
//!
//! - reads of variables not assigned on every path,
//! - `break` outside a loop or switch, `continue` outside a loop,
//!   `fallthrough` outside a switch.
//!
//! Unreachable statements are reported as a warning, once per dead region.
//!
//! A loop whose folded condition is literally true and whose body contains
//! no `break` targeting it is infinite; everything after it is dead. The
//! merge rules for branches: after `if`/`else`, a variable is definitely
//! assigned only if every reachable arm assigns it (a missing `else` is an
//! empty arm); after `switch`, only if a `default` case exists and every
//! reachable case assigns it.

use rustc_hash::FxHashSet;

use crate::ast::*;
use crate::diag::Diagnostics;
use crate::error::CompileError;
use crate::layout::ProgramLayout;
use crate::value::Value;

/// One nested analysis scope.
#[derive(Debug, Default)]
struct Scope {
    /// Names certainly assigned if control reaches the current point.
    assigned: FxHashSet<String>,
    /// Names whose assignment is visible to the parent after this scope
    /// exits (only filled on must-execute paths).
    exported: FxHashSet<String>,
    /// Whether this scope's statements run whenever the parent runs.
    must_execute: bool,
    /// The continuation of this scope is unreachable.
    dead: bool,
    /// An unreachable-code warning was already issued in this region.
    reported_dead: bool,
}

impl Scope {
    fn new(must_execute: bool) -> Self {
        Scope {
            must_execute,
            ..Default::default()
        }
    }
}

/// A control context `break`/`continue`/`fallthrough` can target.
#[derive(Debug)]
enum Ctx {
    Loop { saw_break: bool },
    Switch { saw_break: bool },
}

/// The flow analysis pass.
pub struct Flow<'a> {
    layout: &'a ProgramLayout,
    diags: &'a mut Diagnostics,
    scopes: Vec<Scope>,
    ctx: Vec<Ctx>,
}

/// Analyze a folded unit: its top-level statements and every function
/// body, each function in its own scope chain.
pub fn check_unit(unit: &Unit<'_>, layout: &ProgramLayout, diags: &mut Diagnostics) {
    let mut flow = Flow {
        layout,
        diags,
        scopes: vec![Scope::new(true)],
        ctx: Vec::new(),
    };
    flow.check_stmts(unit.stmts);
}

impl<'a> Flow<'a> {
    // =========================================================================
    // Scope plumbing
    // =========================================================================

    fn define(&mut self, name: &str) {
        let scope = self.scopes.last_mut().expect("no scope");
        if scope.dead {
            return;
        }
        scope.assigned.insert(name.to_string());
        if scope.must_execute {
            scope.exported.insert(name.to_string());
        }
    }

    fn is_defined(&self, name: &str) -> bool {
        self.scopes.iter().any(|s| s.assigned.contains(name))
    }

    fn mark_dead(&mut self) {
        self.scopes.last_mut().expect("no scope").dead = true;
    }

    fn is_dead(&self) -> bool {
        self.scopes.last().expect("no scope").dead
    }

    /// Analyze one branch body in its own scope and hand the scope back.
    fn check_branch(&mut self, stmt: &Stmt<'_>, must_execute: bool) -> Scope {
        self.scopes.push(Scope::new(must_execute));
        self.check_stmt(stmt);
        self.scopes.pop().expect("scope underflow")
    }

    /// Fold a finished child scope into the current one: exported names
    /// become assignments here, and a dead child kills this point too.
    fn absorb(&mut self, child: Scope) {
        let names: Vec<String> = child.exported.into_iter().collect();
        for name in names {
            self.define(&name);
        }
        if child.dead {
            self.mark_dead();
        }
    }

    /// Merge sibling branch scopes of which exactly one executes.
    ///
    /// A name propagates only if every *reachable* branch exports it; a
    /// branch that cannot complete (dead) constrains nothing. The join is
    /// dead only if every branch is dead.
    fn merge_branches(&mut self, branches: Vec<Scope>) {
        let all_dead = !branches.is_empty() && branches.iter().all(|b| b.dead);
        let mut live = branches.iter().filter(|b| !b.dead);
        if let Some(first) = live.next() {
            let mut names: Vec<&String> = first.exported.iter().collect();
            for branch in live {
                names.retain(|name| branch.exported.contains(*name));
            }
            let names: Vec<String> = names.into_iter().cloned().collect();
            for name in names {
                self.define(&name);
            }
        }
        if all_dead {
            self.mark_dead();
        }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn check_stmts(&mut self, stmts: &[Stmt<'_>]) {
        for stmt in stmts {
            if self.is_dead() {
                let scope = self.scopes.last_mut().expect("no scope");
                if !scope.reported_dead {
                    scope.reported_dead = true;
                    self.diags.warn(stmt.span(), "unreachable code");
                }
                // Dead statements are skipped, not analyzed.
                continue;
            }
            self.check_stmt(stmt);
        }
    }

    fn check_stmt(&mut self, stmt: &Stmt<'_>) {
        match stmt {
            Stmt::Expr(expr_stmt) => {
                if let Some(expr) = expr_stmt.expr {
                    self.check_expr(expr);
                }
            }
            Stmt::Block(block) => {
                let child = {
                    self.scopes.push(Scope::new(true));
                    self.check_stmts(block.stmts);
                    self.scopes.pop().expect("scope underflow")
                };
                self.absorb(child);
            }
            Stmt::If(if_stmt) => {
                self.check_expr(if_stmt.condition);
                let then_scope = self.check_branch(if_stmt.then_stmt, false);
                let else_scope = match if_stmt.else_stmt {
                    Some(else_stmt) => self.check_branch(else_stmt, false),
                    // A missing else is an empty arm that assigns nothing.
                    None => Scope::new(false),
                };
                self.merge_branches(vec![then_scope, else_scope]);
            }
            Stmt::While(while_stmt) => {
                self.check_expr(while_stmt.condition);
                let always = literally_true(Some(while_stmt.condition));
                self.ctx.push(Ctx::Loop { saw_break: false });
                let body = self.check_branch(while_stmt.body, always);
                let broke = self.pop_loop_ctx();
                self.absorb_loop_body(body);
                if always && !broke {
                    self.mark_dead();
                }
            }
            Stmt::DoWhile(do_while) => {
                self.ctx.push(Ctx::Loop { saw_break: false });
                // The body runs at least once, and the condition reads
                // whatever it assigned.
                self.scopes.push(Scope::new(true));
                self.check_stmt(do_while.body);
                self.scopes.last_mut().expect("no scope").dead = false;
                self.check_expr(do_while.condition);
                let body = self.scopes.pop().expect("scope underflow");
                let broke = self.pop_loop_ctx();
                self.absorb_loop_body(body);
                if literally_true(Some(do_while.condition)) && !broke {
                    self.mark_dead();
                }
            }
            Stmt::For(for_stmt) => {
                if let Some(init) = for_stmt.init {
                    self.check_expr(init);
                }
                if let Some(condition) = for_stmt.condition {
                    self.check_expr(condition);
                }
                let always = literally_true(for_stmt.condition);
                self.ctx.push(Ctx::Loop { saw_break: false });
                self.scopes.push(Scope::new(always));
                self.check_stmt(for_stmt.body);
                // Updates run on the continue path, after the body.
                self.scopes.last_mut().expect("no scope").dead = false;
                for update in for_stmt.update {
                    self.check_expr(update);
                }
                let body = self.scopes.pop().expect("scope underflow");
                let broke = self.pop_loop_ctx();
                self.absorb_loop_body(body);
                if always && !broke {
                    self.mark_dead();
                }
            }
            Stmt::Switch(switch) => self.check_switch(switch),
            Stmt::Break(brk) => {
                // Targets the nearest loop or switch.
                match self.ctx.last_mut() {
                    None => self.diags.error(CompileError::BreakOutside { span: brk.span }),
                    Some(Ctx::Loop { saw_break }) | Some(Ctx::Switch { saw_break }) => {
                        *saw_break = true;
                    }
                }
                self.mark_dead();
            }
            Stmt::Continue(cont) => {
                let in_loop = self.ctx.iter().any(|c| matches!(c, Ctx::Loop { .. }));
                if !in_loop {
                    self.diags
                        .error(CompileError::ContinueOutside { span: cont.span });
                }
                self.mark_dead();
            }
            Stmt::Fallthrough(fall) => {
                let in_switch = self.ctx.iter().any(|c| matches!(c, Ctx::Switch { .. }));
                if !in_switch {
                    self.diags
                        .error(CompileError::FallthroughOutside { span: fall.span });
                }
                self.mark_dead();
            }
            Stmt::Return(ret) => {
                if let Some(value) = ret.value {
                    self.check_expr(value);
                }
                self.mark_dead();
            }
            Stmt::Func(decl) => self.check_function(decl),
            Stmt::Const(_) => {}
        }
    }

    fn check_switch(&mut self, switch: &SwitchStmt<'_>) {
        self.check_expr(switch.expr);
        self.ctx.push(Ctx::Switch { saw_break: false });
        let mut has_default = false;
        let mut case_scopes = Vec::with_capacity(switch.cases.len());
        for case in switch.cases {
            has_default |= case.is_default();
            self.scopes.push(Scope::new(false));
            self.check_stmts(case.stmts);
            case_scopes.push(self.scopes.pop().expect("scope underflow"));
        }
        let saw_break = match self.ctx.pop() {
            Some(Ctx::Switch { saw_break }) => saw_break,
            other => panic!("switch context stack corrupted: {:?}", other),
        };
        if !has_default {
            // Without a default no case is guaranteed to execute, so
            // nothing propagates and the exit is always reachable.
            return;
        }
        if saw_break {
            // A break path may bypass later assignments in its case, so
            // nothing propagates, but the exit is reachable.
            return;
        }
        // Exactly one case is guaranteed to run to completion.
        self.merge_branches(case_scopes);
    }

    fn check_function(&mut self, decl: &FuncDecl<'_>) {
        // Function bodies see only their own locals and parameters, never
        // the enclosing unit's variables.
        let saved_scopes = std::mem::take(&mut self.scopes);
        let saved_ctx = std::mem::take(&mut self.ctx);
        self.scopes.push(Scope::new(true));
        for param in decl.params {
            self.define(param.name.name);
        }
        self.check_stmts(decl.body.stmts);
        self.scopes = saved_scopes;
        self.ctx = saved_ctx;
    }

    fn pop_loop_ctx(&mut self) -> bool {
        match self.ctx.pop() {
            Some(Ctx::Loop { saw_break }) => saw_break,
            other => panic!("loop context stack corrupted: {:?}", other),
        }
    }

    /// Loop bodies export assignments only when they are proven to run
    /// (`must_execute` was set); a dead body never kills the loop's
    /// continuation, because the loop exit is reached by not entering it.
    fn absorb_loop_body(&mut self, mut body: Scope) {
        body.dead = false;
        self.absorb(body);
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn check_expr(&mut self, expr: &Expr<'_>) {
        match expr {
            Expr::Literal(_) => {}
            Expr::Name(name) => self.check_name_read(name),
            Expr::Paren(paren) => self.check_expr(paren.expr),
            Expr::Unary(unary) => self.check_expr(unary.operand),
            Expr::Postfix(postfix) => self.check_expr(postfix.operand),
            Expr::Binary(binary) => match binary.op {
                // The right operand runs conditionally; its assignments
                // are not definite afterwards.
                BinaryOp::And | BinaryOp::Or | BinaryOp::Coalesce => {
                    self.check_expr(binary.left);
                    self.scopes.push(Scope::new(false));
                    self.check_expr(binary.right);
                    let child = self.scopes.pop().expect("scope underflow");
                    self.absorb(child);
                }
                _ => {
                    self.check_expr(binary.left);
                    self.check_expr(binary.right);
                }
            },
            Expr::Assign(assign) => {
                // Compound assignment reads the target before writing it.
                if assign.op != AssignOp::Assign
                    && let Expr::Name(name) = assign.target
                {
                    self.check_name_read(name);
                }
                match assign.target {
                    Expr::Name(_) => {}
                    Expr::Index(index) => {
                        self.check_expr(index.object);
                        self.check_expr(index.index);
                    }
                    Expr::Member(member) => self.check_expr(member.object),
                    other => self.check_expr(other),
                }
                self.check_expr(assign.value);
                if let Expr::Name(name) = assign.target {
                    self.define(name.ident.name);
                }
            }
            Expr::Ternary(ternary) => {
                self.check_expr(ternary.condition);
                let mut arms = Vec::with_capacity(2);
                for arm in [ternary.then_expr, ternary.else_expr] {
                    self.scopes.push(Scope::new(false));
                    self.check_expr(arm);
                    arms.push(self.scopes.pop().expect("scope underflow"));
                }
                // One arm always runs, so names both arms assign are
                // definite; mark them must-execute by hand.
                let mut both: Vec<String> = arms[0]
                    .assigned
                    .iter()
                    .filter(|n| arms[1].assigned.contains(*n))
                    .cloned()
                    .collect();
                both.drain(..).for_each(|n| self.define(&n));
            }
            Expr::Array(array) => {
                for element in array.elements {
                    self.check_expr(element);
                }
            }
            Expr::Index(index) => {
                self.check_expr(index.object);
                self.check_expr(index.index);
            }
            Expr::Member(member) => self.check_expr(member.object),
            Expr::Call(call) => {
                match call.callee {
                    // A called name is resolved (and diagnosed) by the
                    // generator, not read as a variable.
                    Expr::Name(_) => {}
                    other => self.check_expr(other),
                }
                for arg in call.args {
                    self.check_expr(arg);
                }
            }
        }
    }

    fn check_name_read(&mut self, name: &NameExpr<'_>) {
        let text = name.ident.name;
        if self.is_defined(text) {
            return;
        }
        // Constant references are normally substituted away before this
        // pass; tolerate them for unfolded trees. Function names get a
        // better error from the generator.
        if self.layout.constant(text).is_some() || self.layout.is_function(text) {
            return;
        }
        self.diags.error(CompileError::UnassignedVariable {
            name: text.to_string(),
            span: name.span,
        });
    }
}

fn literally_true(condition: Option<&Expr<'_>>) -> bool {
    match condition {
        None => true,
        Some(expr) => match expr.as_literal() {
            Some(lit) => Value::from_literal(lit).is_truthy(),
            None => false,
        },
    }
}
