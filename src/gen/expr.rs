//! Expression generation: every expression form becomes an [`Item`]
//! describing where its value lives.

use crate::ast::*;
use crate::bytecode::Op;
use crate::error::CompileError;
use crate::item::Item;
use crate::value::Value;

use super::{Gen, Result};

impl<'a> Gen<'a> {
    /// Generate one expression and describe the result as an item.
    pub(super) fn expr(&mut self, expr: &Expr<'_>) -> Result<Item> {
        match expr {
            Expr::Literal(lit) => Ok(Item::Literal(Value::from_literal(&lit.kind))),
            Expr::Name(name) => self.name_expr(name),
            Expr::Paren(paren) => self.expr(paren.expr),
            Expr::Unary(unary) => self.unary_expr(unary),
            Expr::Postfix(postfix) => self.inc_dec_value(
                postfix.operand,
                postfix.op == PostfixOp::Inc,
                true,
                postfix.span,
            ),
            Expr::Binary(binary) => self.binary_expr(expr, binary),
            Expr::Assign(assign) => self.assign_expr(assign),
            Expr::Ternary(ternary) => self.ternary_expr(ternary),
            Expr::Array(array) => {
                for element in array.elements {
                    let item = self.expr(element)?;
                    self.load(item, element.span())?;
                }
                self.code.emit1(Op::NewArray, array.elements.len() as i32);
                Ok(Item::Stack)
            }
            Expr::Index(index) => {
                let object = self.expr(index.object)?;
                self.load(object, index.object.span())?;
                let idx = self.expr(index.index)?;
                self.load(idx, index.index.span())?;
                Ok(Item::Indexed)
            }
            Expr::Member(member) => {
                let object = self.expr(member.object)?;
                self.load(object, member.object.span())?;
                let name = self.intern_str(member.member.name, member.member.span)?;
                Ok(Item::Member(name))
            }
            Expr::Call(call) => self.call_expr(call),
        }
    }

    fn name_expr(&mut self, name: &NameExpr<'_>) -> Result<Item> {
        let text = name.ident.name;
        // Locals shadow functions; a bare function name is not a value.
        if !self.code.has_local(text) && self.layout.is_function(text) {
            return Err(CompileError::FunctionAsValue {
                name: text.to_string(),
                span: name.span,
            });
        }
        Ok(Item::Local(self.code.local_slot(text)))
    }

    fn unary_expr(&mut self, unary: &UnaryExpr<'_>) -> Result<Item> {
        match unary.op {
            UnaryOp::Neg => {
                let operand = self.expr(unary.operand)?;
                self.load(operand, unary.operand.span())?;
                self.code.emit(Op::Neg);
                Ok(Item::Stack)
            }
            UnaryOp::BitNot => {
                let operand = self.expr(unary.operand)?;
                self.load(operand, unary.operand.span())?;
                self.code.emit(Op::BitNot);
                Ok(Item::Stack)
            }
            // In value position `!` is an ordinary truthiness test; only
            // condition contexts get the chain-swapping treatment.
            UnaryOp::Not => {
                let operand = self.expr(unary.operand)?;
                self.load(operand, unary.operand.span())?;
                self.code.emit(Op::Not);
                Ok(Item::Stack)
            }
            UnaryOp::PreInc | UnaryOp::PreDec => {
                self.inc_dec_value(unary.operand, unary.op == UnaryOp::PreInc, false, unary.span)
            }
        }
    }

    fn binary_expr(&mut self, expr: &Expr<'_>, binary: &BinaryExpr<'_>) -> Result<Item> {
        use BinaryOp::*;
        match binary.op {
            And | Or | Eq | Ne | Lt | Le | Gt | Ge => Ok(Item::Cond(self.cond(expr)?)),
            Coalesce => {
                // value ?? fallback: keep the value unless it is null.
                let left = self.expr(binary.left)?;
                self.load(left, binary.left.span())?;
                self.code.emit(Op::Dup);
                let end = self.code.new_chain();
                self.code.jump(Op::JumpNotNull, end);
                self.code.emit(Op::Pop);
                let right = self.expr(binary.right)?;
                self.load(right, binary.right.span())?;
                self.code.resolve(end);
                Ok(Item::Stack)
            }
            Add | Sub | Mul | Div | Rem | BitAnd | BitOr | BitXor | Shl | Shr => {
                let left = self.expr(binary.left)?;
                self.load(left, binary.left.span())?;
                let right = self.expr(binary.right)?;
                self.load(right, binary.right.span())?;
                self.code.emit(arith_op(binary.op));
                Ok(Item::Stack)
            }
        }
    }

    /// Both arms run under the same entry depth and must produce the same
    /// net stack effect; the join checks it.
    fn ternary_expr(&mut self, ternary: &TernaryExpr<'_>) -> Result<Item> {
        let condition = self.cond(ternary.condition)?;
        let false_chain = condition.jump_false(&mut self.code);
        let checkpoint = self.code.state();
        let then_item = self.expr(ternary.then_expr)?;
        self.load(then_item, ternary.then_expr.span())?;
        let end = self.code.new_chain();
        self.code.jump(Op::Jump, end);
        self.code.restore(checkpoint);
        self.resolve_opt(false_chain);
        let else_item = self.expr(ternary.else_expr)?;
        self.load(else_item, ternary.else_expr.span())?;
        self.code.resolve(end);
        Ok(Item::Stack)
    }

    fn assign_expr(&mut self, assign: &AssignExpr<'_>) -> Result<Item> {
        if assign.op == AssignOp::Coalesce {
            return self.coalesce_assign(assign);
        }
        let target = self.target(assign.target)?;
        if let Some(op) = assign.op.binary_op() {
            // Compound assignment reads the target in place first.
            match &target {
                Item::Local(slot) => self.code.emit1(Op::LoadLocal, *slot as i32),
                Item::Indexed => {
                    self.code.emit(Op::Dup2);
                    self.code.emit(Op::LoadIndex);
                }
                Item::Member(name) => {
                    self.code.emit(Op::Dup);
                    self.code.emit1(Op::LoadMember, *name as i32);
                }
                other => panic!("non-storage assignment target {:?}", other),
            }
            let value = self.expr(assign.value)?;
            self.load(value, assign.value.span())?;
            self.code.emit(arith_op(op));
        } else {
            let value = self.expr(assign.value)?;
            self.load(value, assign.value.span())?;
        }
        Ok(Item::Assign(Box::new(target)))
    }

    /// `target ??= value` stores only when the target is null; the branch
    /// jumps around both the evaluation and the store.
    ///
    /// Indexed and member targets evaluate their operands once into
    /// synthetic temporaries so the test and the store address the same
    /// cell.
    fn coalesce_assign(&mut self, assign: &AssignExpr<'_>) -> Result<Item> {
        let target = self.target(assign.target)?;
        match target {
            Item::Local(slot) => {
                self.code.emit1(Op::LoadLocal, slot as i32);
                self.code.emit(Op::Dup);
                let end = self.code.new_chain();
                self.code.jump(Op::JumpNotNull, end);
                self.code.emit(Op::Pop);
                let value = self.expr(assign.value)?;
                self.load(value, assign.value.span())?;
                self.code.emit(Op::Dup);
                self.code.emit1(Op::StoreLocal, slot as i32);
                self.code.resolve(end);
            }
            Item::Indexed => {
                // Park the container and index so the test and the store
                // address the same cell; the last reads recycle the slots.
                let container = self.code.acquire_temp();
                let index = self.code.acquire_temp();
                self.code.emit1(Op::StoreLocal, index as i32);
                self.code.emit1(Op::StoreLocal, container as i32);
                self.code.emit1(Op::LoadLocal, container as i32);
                self.code.emit1(Op::LoadLocal, index as i32);
                self.code.emit(Op::LoadIndex);
                self.code.emit(Op::Dup);
                let end = self.code.new_chain();
                self.code.jump(Op::JumpNotNull, end);
                self.code.emit(Op::Pop);
                self.load(Item::Temp(container), assign.span)?;
                self.load(Item::Temp(index), assign.span)?;
                let value = self.expr(assign.value)?;
                self.load(value, assign.value.span())?;
                self.code.emit(Op::DupX2);
                self.code.emit(Op::StoreIndex);
                self.code.resolve(end);
            }
            Item::Member(name) => {
                let object = self.code.acquire_temp();
                self.code.emit1(Op::StoreLocal, object as i32);
                self.code.emit1(Op::LoadLocal, object as i32);
                self.code.emit1(Op::LoadMember, name as i32);
                self.code.emit(Op::Dup);
                let end = self.code.new_chain();
                self.code.jump(Op::JumpNotNull, end);
                self.code.emit(Op::Pop);
                self.load(Item::Temp(object), assign.span)?;
                let value = self.expr(assign.value)?;
                self.load(value, assign.value.span())?;
                self.code.emit(Op::DupX1);
                self.code.emit1(Op::StoreMember, name as i32);
                self.code.resolve(end);
            }
            other => panic!("non-storage assignment target {:?}", other),
        }
        Ok(Item::Stack)
    }

    /// Resolve an expression as a storage location.
    pub(super) fn target(&mut self, expr: &Expr<'_>) -> Result<Item> {
        match expr {
            Expr::Name(name) => Ok(Item::Local(self.code.local_slot(name.ident.name))),
            Expr::Paren(paren) => self.target(paren.expr),
            Expr::Index(index) => {
                let object = self.expr(index.object)?;
                self.load(object, index.object.span())?;
                let idx = self.expr(index.index)?;
                self.load(idx, index.index.span())?;
                Ok(Item::Indexed)
            }
            Expr::Member(member) => {
                let object = self.expr(member.object)?;
                self.load(object, member.object.span())?;
                let name = self.intern_str(member.member.name, member.member.span)?;
                Ok(Item::Member(name))
            }
            other => Err(CompileError::NotAssignable { span: other.span() }),
        }
    }

    // =========================================================================
    // Increment / decrement
    // =========================================================================

    /// Statement-position increment: no value is produced, and a local
    /// target compiles to a single in-place instruction.
    pub(super) fn inc_dec_stmt(
        &mut self,
        target: &Expr<'_>,
        inc: bool,
        span: crate::span::Span,
    ) -> Result<()> {
        let target = self
            .target(target)
            .map_err(|_| CompileError::InvalidIncrementTarget { span })?;
        match target {
            Item::Local(slot) => {
                self.code
                    .emit1(if inc { Op::IncLocal } else { Op::DecLocal }, slot as i32);
            }
            Item::Indexed => {
                // No in-place cell increment exists: load, compute, store.
                self.code.emit(Op::Dup2);
                self.code.emit(Op::LoadIndex);
                self.code.emit(Op::PushOne);
                self.code.emit(if inc { Op::Add } else { Op::Sub });
                self.code.emit(Op::StoreIndex);
            }
            Item::Member(name) => {
                self.code.emit(Op::Dup);
                self.code.emit1(Op::LoadMember, name as i32);
                self.code.emit(Op::PushOne);
                self.code.emit(if inc { Op::Add } else { Op::Sub });
                self.code.emit1(Op::StoreMember, name as i32);
            }
            other => panic!("non-storage increment target {:?}", other),
        }
        Ok(())
    }

    /// Value-position increment/decrement. `post` selects whether the old
    /// or the new value is the result.
    fn inc_dec_value(
        &mut self,
        target: &Expr<'_>,
        inc: bool,
        post: bool,
        span: crate::span::Span,
    ) -> Result<Item> {
        let target = self
            .target(target)
            .map_err(|_| CompileError::InvalidIncrementTarget { span })?;
        let op = if inc { Op::Add } else { Op::Sub };
        match target {
            Item::Local(slot) => {
                if post {
                    self.code.emit1(Op::LoadLocal, slot as i32);
                    self.code
                        .emit1(if inc { Op::IncLocal } else { Op::DecLocal }, slot as i32);
                    Ok(Item::Stack)
                } else {
                    self.code
                        .emit1(if inc { Op::IncLocal } else { Op::DecLocal }, slot as i32);
                    Ok(Item::Local(slot))
                }
            }
            Item::Indexed => {
                self.code.emit(Op::Dup2);
                self.code.emit(Op::LoadIndex);
                if post {
                    self.code.emit(Op::DupX2);
                    self.code.emit(Op::PushOne);
                    self.code.emit(op);
                } else {
                    self.code.emit(Op::PushOne);
                    self.code.emit(op);
                    self.code.emit(Op::DupX2);
                }
                self.code.emit(Op::StoreIndex);
                Ok(Item::Stack)
            }
            Item::Member(name) => {
                self.code.emit(Op::Dup);
                self.code.emit1(Op::LoadMember, name as i32);
                if post {
                    self.code.emit(Op::DupX1);
                    self.code.emit(Op::PushOne);
                    self.code.emit(op);
                } else {
                    self.code.emit(Op::PushOne);
                    self.code.emit(op);
                    self.code.emit(Op::DupX1);
                }
                self.code.emit1(Op::StoreMember, name as i32);
                Ok(Item::Stack)
            }
            other => panic!("non-storage increment target {:?}", other),
        }
    }

    // =========================================================================
    // Calls
    // =========================================================================

    fn call_expr(&mut self, call: &CallExpr<'_>) -> Result<Item> {
        match call.callee {
            // Direct call of a declared function.
            Expr::Name(name) if !self.code.has_local(name.ident.name) => {
                let text = name.ident.name;
                let Some(info) = self.layout.function(text) else {
                    return Err(CompileError::UnknownFunction {
                        name: text.to_string(),
                        span: name.span,
                    });
                };
                if !info.accepts(call.args.len()) {
                    return Err(CompileError::WrongArgCount {
                        name: text.to_string(),
                        expected: info.expected_desc(),
                        got: call.args.len(),
                        span: call.span,
                    });
                }
                let id = info.id;
                for arg in call.args {
                    let item = self.expr(arg)?;
                    self.load(item, arg.span())?;
                }
                self.code
                    .emit2(Op::Call, id as i32, call.args.len() as i32);
                Ok(Item::Stack)
            }
            // Method call: the object rides beneath the arguments.
            Expr::Member(member) => {
                let object = self.expr(member.object)?;
                self.load(object, member.object.span())?;
                let name = self.intern_str(member.member.name, member.member.span)?;
                for arg in call.args {
                    let item = self.expr(arg)?;
                    self.load(item, arg.span())?;
                }
                self.code
                    .emit2(Op::CallMethod, name as i32, call.args.len() as i32);
                Ok(Item::Stack)
            }
            other => Err(CompileError::NotCallable { span: other.span() }),
        }
    }
}

fn arith_op(op: BinaryOp) -> Op {
    match op {
        BinaryOp::Add => Op::Add,
        BinaryOp::Sub => Op::Sub,
        BinaryOp::Mul => Op::Mul,
        BinaryOp::Div => Op::Div,
        BinaryOp::Rem => Op::Rem,
        BinaryOp::BitAnd => Op::BitAnd,
        BinaryOp::BitOr => Op::BitOr,
        BinaryOp::BitXor => Op::BitXor,
        BinaryOp::Shl => Op::Shl,
        BinaryOp::Shr => Op::Shr,
        other => panic!("{} is not a direct arithmetic operator", other),
    }
}
