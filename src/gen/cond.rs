//! Condition generation: short-circuit booleans as jump chains.
//!
//! `&&` and `||` never materialize an intermediate boolean. Each operand
//! compiles to a [`CondItem`] whose pending test and chains the enclosing
//! construct turns into branches; only a condition used as a value (for
//! example stored or returned) collapses into the
//! `push true; jump end; push false` idiom via [`CondItem::load`].

use crate::ast::*;
use crate::bytecode::Op;
use crate::item::CondItem;
use crate::value::Value;

use super::{Gen, Result};

impl<'a> Gen<'a> {
    /// Generate an expression in condition position.
    pub(super) fn cond(&mut self, expr: &Expr<'_>) -> Result<CondItem> {
        match expr {
            Expr::Literal(lit) => Ok(CondItem::constant(Value::from_literal(&lit.kind).is_truthy())),
            Expr::Paren(paren) => self.cond(paren.expr),
            // `!` swaps the chains instead of emitting a NOT.
            Expr::Unary(unary) if unary.op == UnaryOp::Not => {
                Ok(self.cond(unary.operand)?.negate())
            }
            Expr::Binary(binary) => match binary.op {
                BinaryOp::And => {
                    let left = self.cond(binary.left)?;
                    // Falls through when true; collects the false exits.
                    let false_chain = left.jump_false(&mut self.code);
                    let right = self.cond(binary.right)?;
                    Ok(right.with_chains(None, false_chain, &mut self.code))
                }
                BinaryOp::Or => {
                    let left = self.cond(binary.left)?;
                    // Falls through when false; collects the true exits.
                    let true_chain = left.jump_true(&mut self.code);
                    let right = self.cond(binary.right)?;
                    Ok(right.with_chains(true_chain, None, &mut self.code))
                }
                op if op.is_comparison() => self.comparison(binary),
                _ => self.truthiness(expr),
            },
            _ => self.truthiness(expr),
        }
    }

    /// Any other value in condition position: load it and test truthiness.
    fn truthiness(&mut self, expr: &Expr<'_>) -> Result<CondItem> {
        let item = self.expr(expr)?;
        self.load(item, expr.span())?;
        Ok(CondItem::test(Op::JumpIfTrue))
    }

    /// Select the comparison instruction family:
    ///
    /// 1. a null test when either operand is the literal null (for
    ///    equality operators),
    /// 2. a compare-with-immediate when either operand is an integer
    ///    literal in immediate range (the operator mirrors when the
    ///    literal is on the left),
    /// 3. the generic two-operand compare otherwise.
    ///
    /// Each family has a complement opcode, so the same selection serves
    /// jump-if-true and jump-if-false contexts.
    fn comparison(&mut self, binary: &BinaryExpr<'_>) -> Result<CondItem> {
        let op = binary.op;
        let equality = matches!(op, BinaryOp::Eq | BinaryOp::Ne);

        if equality && is_null_literal(binary.right) {
            let left = self.expr(binary.left)?;
            self.load(left, binary.left.span())?;
            return Ok(CondItem::test(null_test(op)));
        }
        if equality && is_null_literal(binary.left) {
            let right = self.expr(binary.right)?;
            self.load(right, binary.right.span())?;
            return Ok(CondItem::test(null_test(op)));
        }

        if let Some(imm) = immediate_int(binary.right) {
            let left = self.expr(binary.left)?;
            self.load(left, binary.left.span())?;
            return Ok(CondItem::test_imm(imm_jump(op), imm));
        }
        if let Some(imm) = immediate_int(binary.left) {
            // The literal moves to the right; mirror the operator.
            let right = self.expr(binary.right)?;
            self.load(right, binary.right.span())?;
            return Ok(CondItem::test_imm(imm_jump(op.mirrored()), imm));
        }

        let left = self.expr(binary.left)?;
        self.load(left, binary.left.span())?;
        let right = self.expr(binary.right)?;
        self.load(right, binary.right.span())?;
        Ok(CondItem::test(cmp_jump(op)))
    }
}

fn is_null_literal(expr: &Expr<'_>) -> bool {
    matches!(expr.as_literal(), Some(LiteralKind::Null))
}

/// An integer literal usable as an inline immediate.
fn immediate_int(expr: &Expr<'_>) -> Option<i32> {
    match expr.as_literal() {
        Some(LiteralKind::Int(v)) => i32::try_from(*v).ok(),
        _ => None,
    }
}

fn null_test(op: BinaryOp) -> Op {
    match op {
        BinaryOp::Eq => Op::JumpNull,
        BinaryOp::Ne => Op::JumpNotNull,
        other => panic!("{} is not a null-comparable operator", other),
    }
}

fn cmp_jump(op: BinaryOp) -> Op {
    match op {
        BinaryOp::Eq => Op::JumpEq,
        BinaryOp::Ne => Op::JumpNe,
        BinaryOp::Lt => Op::JumpLt,
        BinaryOp::Le => Op::JumpLe,
        BinaryOp::Gt => Op::JumpGt,
        BinaryOp::Ge => Op::JumpGe,
        other => panic!("{} is not a comparison", other),
    }
}

fn imm_jump(op: BinaryOp) -> Op {
    match op {
        BinaryOp::Eq => Op::JumpEqImm,
        BinaryOp::Ne => Op::JumpNeImm,
        BinaryOp::Lt => Op::JumpLtImm,
        BinaryOp::Le => Op::JumpLeImm,
        BinaryOp::Gt => Op::JumpGtImm,
        BinaryOp::Ge => Op::JumpGeImm,
        other => panic!("{} is not a comparison", other),
    }
}
