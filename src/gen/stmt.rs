//! Statement generation: control flow linearization.

use crate::ast::*;
use crate::bytecode::{LINEAR_DISPATCH_MAX, Op};
use crate::error::CompileError;
use crate::value::{Value, ValueKey};
use rustc_hash::FxHashSet;

use super::{Gen, GenCtx, Result};

impl<'a> Gen<'a> {
    pub(super) fn stmt(&mut self, stmt: &Stmt<'_>) -> Result<()> {
        match stmt {
            Stmt::Expr(expr_stmt) => self.expr_stmt(expr_stmt),
            Stmt::Block(block) => {
                for stmt in block.stmts {
                    self.gen_stmt(stmt);
                }
                Ok(())
            }
            Stmt::If(if_stmt) => self.if_stmt(if_stmt),
            Stmt::While(while_stmt) => self.while_stmt(while_stmt),
            Stmt::DoWhile(do_while) => self.do_while_stmt(do_while),
            Stmt::For(for_stmt) => self.for_stmt(for_stmt),
            Stmt::Switch(switch) => self.switch_stmt(switch),
            Stmt::Break(brk) => self.break_stmt(brk),
            Stmt::Continue(cont) => self.continue_stmt(cont),
            Stmt::Fallthrough(fall) => self.fallthrough_stmt(fall),
            Stmt::Return(ret) => self.return_stmt(ret),
            // Declarations generate no code in statement position.
            Stmt::Func(_) | Stmt::Const(_) => Ok(()),
        }
    }

    /// Evaluate an expression for effect; whatever value class it leaves
    /// behind discards itself (an increment target discards for free, a
    /// stack value pops).
    fn expr_stmt(&mut self, expr_stmt: &ExprStmt<'_>) -> Result<()> {
        let Some(expr) = expr_stmt.expr else {
            return Ok(());
        };
        // Increments in statement position skip the value entirely.
        match expr {
            Expr::Unary(unary) if matches!(unary.op, UnaryOp::PreInc | UnaryOp::PreDec) => {
                return self.inc_dec_stmt(unary.operand, unary.op == UnaryOp::PreInc, unary.span);
            }
            Expr::Postfix(postfix) => {
                return self.inc_dec_stmt(postfix.operand, postfix.op == PostfixOp::Inc, postfix.span);
            }
            _ => {}
        }
        let item = self.expr(expr)?;
        self.discard(item, expr.span())
    }

    /// Bytecode layout:
    /// ```text
    /// [condition]            false -> else (or end)
    /// [then]
    /// Jump -> end            (only with an else branch)
    /// else:
    /// [else]
    /// end:
    /// ```
    fn if_stmt(&mut self, if_stmt: &IfStmt<'_>) -> Result<()> {
        let condition = self.cond(if_stmt.condition)?;
        let false_chain = condition.jump_false(&mut self.code);
        self.gen_stmt(if_stmt.then_stmt);
        match if_stmt.else_stmt {
            Some(else_stmt) => {
                // No jump over the else branch when then cannot complete.
                let end = if self.code.is_alive() {
                    let end = self.code.new_chain();
                    self.code.jump(Op::Jump, end);
                    Some(end)
                } else {
                    None
                };
                self.resolve_opt(false_chain);
                self.gen_stmt(else_stmt);
                self.resolve_opt(end);
            }
            None => self.resolve_opt(false_chain),
        }
        Ok(())
    }

    /// Bytecode layout:
    /// ```text
    /// top:
    /// [condition]            false -> exit
    /// [body]                 (continue -> top, break -> exit)
    /// Jump -> top
    /// exit:
    /// ```
    fn while_stmt(&mut self, while_stmt: &WhileStmt<'_>) -> Result<()> {
        let top = self.code.index();
        let condition = self.cond(while_stmt.condition)?;
        let exit = condition.jump_false(&mut self.code);
        let brk = self.code.new_chain();
        let cont = self.code.chain_to(top);
        self.ctx.push(GenCtx::Loop { brk, cont });
        self.gen_stmt(while_stmt.body);
        self.code.jump(Op::Jump, cont);
        self.ctx.pop();
        // With a literally-true condition and no breaks, nothing ever
        // jumps here and the code after the loop stays dead.
        self.code.resolve(brk);
        self.resolve_opt(exit);
        Ok(())
    }

    /// Bytecode layout:
    /// ```text
    /// top:
    /// [body]                 (continue -> cond, break -> exit)
    /// cond:
    /// [condition]            true -> top
    /// exit:
    /// ```
    fn do_while_stmt(&mut self, do_while: &DoWhileStmt<'_>) -> Result<()> {
        let top = self.code.index();
        let brk = self.code.new_chain();
        let cont = self.code.new_chain();
        self.ctx.push(GenCtx::Loop { brk, cont });
        self.gen_stmt(do_while.body);
        self.ctx.pop();
        // continue lands on the condition.
        self.code.resolve(cont);
        let condition = self.cond(do_while.condition)?;
        let back = condition.jump_true(&mut self.code);
        if let Some(back) = back {
            self.code.resolve_to(back, top);
        }
        self.code.resolve(brk);
        Ok(())
    }

    /// Bytecode layout:
    /// ```text
    /// [init]
    /// top:
    /// [condition]            false -> exit
    /// [body]                 (continue -> update, break -> exit)
    /// update:
    /// [update...]
    /// Jump -> top
    /// exit:
    /// ```
    fn for_stmt(&mut self, for_stmt: &ForStmt<'_>) -> Result<()> {
        if let Some(init) = for_stmt.init {
            let item = self.expr(init)?;
            self.discard(item, init.span())?;
        }
        let top = self.code.index();
        let exit = match for_stmt.condition {
            Some(condition) => {
                let condition = self.cond(condition)?;
                condition.jump_false(&mut self.code)
            }
            None => None,
        };
        let brk = self.code.new_chain();
        let cont = self.code.new_chain();
        self.ctx.push(GenCtx::Loop { brk, cont });
        self.gen_stmt(for_stmt.body);
        self.ctx.pop();
        // continue lands on the update section.
        self.code.resolve(cont);
        for update in for_stmt.update {
            let item = self.expr(update)?;
            self.discard(item, update.span())?;
        }
        let back = self.code.chain_to(top);
        self.code.jump(Op::Jump, back);
        self.code.resolve(brk);
        self.resolve_opt(exit);
        Ok(())
    }

    /// Bytecode layout:
    /// ```text
    /// [scrutinee]
    /// SwitchLinear/Binary table   (pops; jumps to a case or default)
    /// case[0]: [stmts] Jump -> exit
    /// case[1]: [stmts] Jump -> exit        (fallthrough -> case[2])
    /// ...
    /// exit:                                 (default here if absent)
    /// ```
    ///
    /// Case labels must be literals after folding; their pool indices and
    /// entry offsets form the dispatch table. Small label counts use the
    /// linear-scan instruction, larger ones the binary-search instruction
    /// over a table sorted by label value.
    fn switch_stmt(&mut self, switch: &SwitchStmt<'_>) -> Result<()> {
        let base = self.code.depth();
        let scrutinee = self.expr(switch.expr)?;
        self.load(scrutinee, switch.expr.span())?;

        let labels = switch.cases.iter().filter(|c| !c.is_default()).count();
        let table = self.code.new_switch_table();
        let op = if labels <= LINEAR_DISPATCH_MAX {
            Op::SwitchLinear
        } else {
            self.code.set_switch_sorted(table);
            Op::SwitchBinary
        };
        self.code.emit1(op, table as i32);

        let brk = self.code.new_chain();
        self.ctx.push(GenCtx::Switch { brk, fall: None });
        let mut seen: FxHashSet<ValueKey> = FxHashSet::default();
        let mut has_default = false;
        for case in switch.cases {
            let entry = self.code.index();
            // A pending fallthrough from the previous case lands here.
            let fall = match self.ctx.last_mut() {
                Some(GenCtx::Switch { fall, .. }) => fall.take(),
                _ => None,
            };
            self.resolve_opt(fall);
            self.code.resume(base);

            match case.label {
                None => {
                    if has_default {
                        self.diags.error(CompileError::DuplicateDefault { span: case.span });
                    } else {
                        has_default = true;
                        self.code.set_switch_default(table, entry);
                    }
                }
                Some(label) => match label.as_literal() {
                    Some(kind) => {
                        let value = Value::from_literal(kind);
                        let key = ValueKey::from(&value);
                        if !seen.insert(key.clone()) {
                            self.diags.error(CompileError::DuplicateCaseLabel {
                                span: label.span(),
                            });
                        } else {
                            match self.code.intern(value) {
                                Ok(index) => self.code.add_switch_case(table, key, index, entry),
                                Err(_) => self.diags.error(CompileError::TooManyConstants {
                                    span: label.span(),
                                }),
                            }
                        }
                    }
                    None => {
                        self.diags
                            .error(CompileError::CaseNotLiteral { span: label.span() });
                    }
                },
            }

            for stmt in case.stmts {
                self.gen_stmt(stmt);
            }
            // Cases do not fall through implicitly.
            self.code.jump(Op::Jump, brk);
        }
        let fall = match self.ctx.pop() {
            Some(GenCtx::Switch { fall, .. }) => fall,
            other => panic!("switch context stack corrupted: {:?}", other),
        };
        // A fallthrough in the last case exits the switch.
        self.resolve_opt(fall);
        if !has_default {
            // No default: dispatch falls through to the exit.
            self.code.set_switch_default(table, self.code.index());
            self.code.resume(base);
        }
        self.code.resolve(brk);
        Ok(())
    }

    fn break_stmt(&mut self, _brk: &BreakStmt) -> Result<()> {
        // The flow pass already rejected breaks outside any context.
        let target = match self.ctx.last() {
            Some(GenCtx::Loop { brk, .. }) | Some(GenCtx::Switch { brk, .. }) => Some(*brk),
            None => None,
        };
        if let Some(chain) = target {
            self.code.jump(Op::Jump, chain);
        }
        Ok(())
    }

    fn continue_stmt(&mut self, _cont: &ContinueStmt) -> Result<()> {
        let target = self.ctx.iter().rev().find_map(|ctx| match ctx {
            GenCtx::Loop { cont, .. } => Some(*cont),
            GenCtx::Switch { .. } => None,
        });
        if let Some(chain) = target {
            self.code.jump(Op::Jump, chain);
        }
        Ok(())
    }

    fn fallthrough_stmt(&mut self, _fall: &FallthroughStmt) -> Result<()> {
        let chain = self.ctx.iter_mut().rev().find_map(|ctx| match ctx {
            GenCtx::Switch { fall, .. } => Some(fall),
            GenCtx::Loop { .. } => None,
        });
        if let Some(fall) = chain {
            let chain = match fall {
                Some(chain) => *chain,
                None => {
                    let new = self.code.new_chain();
                    *fall = Some(new);
                    new
                }
            };
            self.code.jump(Op::Jump, chain);
        }
        Ok(())
    }

    fn return_stmt(&mut self, ret: &ReturnStmt<'_>) -> Result<()> {
        match ret.value {
            Some(value) => {
                let item = self.expr(value)?;
                self.load(item, value.span())?;
                self.code.emit(Op::Return);
            }
            None => self.code.emit(Op::ReturnNull),
        }
        Ok(())
    }
}
