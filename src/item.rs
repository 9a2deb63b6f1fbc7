//! Addressing strategies for computed values.
//!
//! The generator describes where a value currently lives as an [`Item`]
//! and lets the item decide what instructions realize each use: load it
//! onto the stack, store into it, duplicate it, or discard it. This keeps
//! the per-node generator code free of stack choreography — an assignment
//! target handles its own `DUP_X2`, a literal discards itself by emitting
//! nothing.
//!
//! [`CondItem`] is the strategy for a boolean that has not been
//! materialized: a pending conditional-jump test plus the two chains of
//! short-circuit jumps accumulated so far ("jump here when true" / "jump
//! here when false"). Negation swaps the chains and complements the test
//! instead of emitting code.

use crate::bytecode::{Chain, Code, Op, PoolFull};
use crate::value::Value;

/// Where a computed value lives and how to address it.
#[derive(Debug)]
pub enum Item {
    /// On top of the operand stack.
    Stack,
    /// A literal; materialized only on demand.
    Literal(Value),
    /// A local slot.
    Local(u32),
    /// A container cell; container and index are on the stack.
    Indexed,
    /// A member cell; the object is on the stack. Carries the member
    /// name's pool index.
    Member(u16),
    /// A value parked in a synthetic temporary slot; consuming it returns
    /// the slot to the recycling pool.
    Temp(u32),
    /// A just-emitted assignment: the value is on the stack above the
    /// target's operands, and the store is still pending.
    Assign(Box<Item>),
    /// An unmaterialized boolean condition.
    Cond(CondItem),
}

impl Item {
    /// Emit whatever puts this value on top of the stack.
    pub fn load(self, code: &mut Code) -> Result<(), PoolFull> {
        match self {
            Item::Stack => Ok(()),
            Item::Literal(value) => code.emit_value(&value),
            Item::Local(slot) => {
                code.emit1(Op::LoadLocal, slot as i32);
                Ok(())
            }
            Item::Temp(slot) => {
                code.emit1(Op::LoadLocal, slot as i32);
                code.release_temp(slot);
                Ok(())
            }
            Item::Indexed => {
                code.emit(Op::LoadIndex);
                Ok(())
            }
            Item::Member(name) => {
                code.emit1(Op::LoadMember, name as i32);
                Ok(())
            }
            Item::Assign(target) => {
                // Keep a copy of the stored value as the result.
                target.stash(code);
                target.store(code);
                Ok(())
            }
            Item::Cond(cond) => cond.load(code),
        }
    }

    /// Emit whatever evaluates this item for effect only.
    pub fn discard(self, code: &mut Code) -> Result<(), PoolFull> {
        match self {
            // Nothing on the stack, nothing to do.
            Item::Literal(_) | Item::Local(_) => Ok(()),
            Item::Temp(slot) => {
                code.release_temp(slot);
                Ok(())
            }
            Item::Stack => {
                code.emit(Op::Pop);
                Ok(())
            }
            Item::Indexed => {
                code.emit(Op::Pop);
                code.emit(Op::Pop);
                Ok(())
            }
            Item::Member(_) => {
                code.emit(Op::Pop);
                Ok(())
            }
            Item::Assign(target) => {
                target.store(code);
                Ok(())
            }
            Item::Cond(cond) => {
                if cond.is_trivial() {
                    return Ok(());
                }
                // Chains must be resolved and operands consumed even when
                // the boolean value is unused.
                cond.load(code)?;
                code.emit(Op::Pop);
                Ok(())
            }
        }
    }

    /// Duplicate the value about to be stored beneath this target's
    /// operands, so the store leaves a copy behind as the result.
    fn stash(&self, code: &mut Code) {
        match self {
            Item::Local(_) => code.emit(Op::Dup),
            Item::Member(_) => code.emit(Op::DupX1),
            Item::Indexed => code.emit(Op::DupX2),
            other => panic!("stash through non-storage item {:?}", other),
        }
    }

    /// Emit the store into this target, consuming its operands and the
    /// value on top of the stack.
    pub fn store(&self, code: &mut Code) {
        match self {
            Item::Local(slot) => code.emit1(Op::StoreLocal, *slot as i32),
            Item::Indexed => code.emit(Op::StoreIndex),
            Item::Member(name) => code.emit1(Op::StoreMember, *name as i32),
            other => panic!("store into non-storage item {:?}", other),
        }
    }
}

/// The pending test of a [`CondItem`].
#[derive(Debug, Clone, Copy)]
enum CondKind {
    /// A conditional jump not yet emitted; `op` jumps when the condition
    /// is true, `imm` is the immediate for the compare-immediate family.
    Test { op: Op, imm: i32 },
    /// Statically known outcome.
    Always(bool),
}

/// A boolean condition held as jump chains instead of a stack value.
#[derive(Debug)]
pub struct CondItem {
    kind: CondKind,
    /// Pending jumps taken when the condition is true.
    pub true_chain: Option<Chain>,
    /// Pending jumps taken when the condition is false.
    pub false_chain: Option<Chain>,
}

impl CondItem {
    /// A condition decided by a jump-when-true test instruction.
    pub fn test(op: Op) -> Self {
        Self::test_imm(op, 0)
    }

    /// A compare-with-immediate test.
    pub fn test_imm(op: Op, imm: i32) -> Self {
        CondItem {
            kind: CondKind::Test { op, imm },
            true_chain: None,
            false_chain: None,
        }
    }

    /// A statically known condition.
    pub fn constant(value: bool) -> Self {
        CondItem {
            kind: CondKind::Always(value),
            true_chain: None,
            false_chain: None,
        }
    }

    /// Attach short-circuit chains produced while evaluating operands.
    pub fn with_chains(
        mut self,
        true_chain: Option<Chain>,
        false_chain: Option<Chain>,
        code: &mut Code,
    ) -> Self {
        self.true_chain = code.merge(true_chain, self.true_chain);
        self.false_chain = code.merge(false_chain, self.false_chain);
        self
    }

    /// Whether this is a bare constant with no pending jumps.
    pub fn is_trivial(&self) -> bool {
        matches!(self.kind, CondKind::Always(_))
            && self.true_chain.is_none()
            && self.false_chain.is_none()
    }

    /// Whether this condition is statically true (an `if (true)` or a
    /// `while` with no exit test).
    pub fn is_always_true(&self) -> bool {
        matches!(self.kind, CondKind::Always(true))
    }

    /// Logical negation: swap the chains, complement the test. No code.
    pub fn negate(self) -> Self {
        CondItem {
            kind: match self.kind {
                CondKind::Test { op, imm } => CondKind::Test {
                    op: op.complement(),
                    imm,
                },
                CondKind::Always(b) => CondKind::Always(!b),
            },
            true_chain: self.false_chain,
            false_chain: self.true_chain,
        }
    }

    /// Emit the branch taken when the condition is false and return its
    /// chain; control falls through (with the true chain resolved) when
    /// the condition is true.
    pub fn jump_false(self, code: &mut Code) -> Option<Chain> {
        let mut false_chain = self.false_chain;
        match self.kind {
            CondKind::Test { op, imm } => {
                let chain = false_chain.unwrap_or_else(|| code.new_chain());
                code.jump_imm(op.complement(), imm, chain);
                false_chain = Some(chain);
            }
            CondKind::Always(false) => {
                let chain = false_chain.unwrap_or_else(|| code.new_chain());
                code.jump(Op::Jump, chain);
                false_chain = Some(chain);
            }
            CondKind::Always(true) => {}
        }
        if let Some(true_chain) = self.true_chain {
            code.resolve(true_chain);
        }
        false_chain
    }

    /// Emit the branch taken when the condition is true and return its
    /// chain; control falls through (with the false chain resolved) when
    /// the condition is false.
    pub fn jump_true(self, code: &mut Code) -> Option<Chain> {
        let mut true_chain = self.true_chain;
        match self.kind {
            CondKind::Test { op, imm } => {
                let chain = true_chain.unwrap_or_else(|| code.new_chain());
                code.jump_imm(op, imm, chain);
                true_chain = Some(chain);
            }
            CondKind::Always(true) => {
                let chain = true_chain.unwrap_or_else(|| code.new_chain());
                code.jump(Op::Jump, chain);
                true_chain = Some(chain);
            }
            CondKind::Always(false) => {}
        }
        if let Some(false_chain) = self.false_chain {
            code.resolve(false_chain);
        }
        true_chain
    }

    /// Materialize the boolean: `<test> ; push true ; jump end ; push
    /// false ; end:`, with the constant cases collapsing to a bare push.
    pub fn load(self, code: &mut Code) -> Result<(), PoolFull> {
        if self.is_trivial() {
            let value = matches!(self.kind, CondKind::Always(true));
            return code.emit_value(&Value::Bool(value));
        }
        let false_chain = self.jump_false(code);
        code.emit(Op::PushTrue);
        if let Some(false_chain) = false_chain {
            let end = code.new_chain();
            code.jump(Op::Jump, end);
            code.resolve(false_chain);
            code.emit(Op::PushFalse);
            code.resolve(end);
        }
        Ok(())
    }
}
