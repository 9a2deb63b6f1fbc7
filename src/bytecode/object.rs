//! The finished output of compiling one function.

use std::fmt::Write as _;

use super::code::Insn;
use crate::value::Value;

/// A switch dispatch table.
///
/// Entries pair a constant-pool index (the case label value) with the
/// instruction index of the case body. For binary dispatch the entries are
/// sorted by the label values' natural ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchTable {
    /// (pool index of the label, instruction index of the case entry).
    pub entries: Vec<(u16, u32)>,
    /// Instruction index taken when no label matches.
    pub default: u32,
}

/// One local-variable slot's metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalInfo {
    /// The declared (or synthetic) name.
    pub name: String,
    /// Pool index of the default value, for optional parameters.
    pub default: Option<u16>,
}

/// The compiled form of one function (or the top-level unit), handed to
/// the VM loader and the disassembler.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeObject {
    /// Function name, or `<main>` for the top-level unit.
    pub name: String,
    /// Number of leading local slots that are parameters.
    pub params: u32,
    /// The instruction array.
    pub insns: Vec<Insn>,
    /// The deduplicated constant pool.
    pub pool: Vec<Value>,
    /// Switch dispatch tables referenced by switch instructions.
    pub switch_tables: Vec<SwitchTable>,
    /// Maximum operand stack depth reached.
    pub max_stack: u32,
    /// Sparse line table: (instruction index, line).
    pub lines: Vec<(u32, u32)>,
    /// Local-variable table, indexed by slot.
    pub locals: Vec<LocalInfo>,
}

impl CodeObject {
    /// Number of local slots.
    pub fn local_count(&self) -> u32 {
        self.locals.len() as u32
    }

    /// Source line for an instruction index, from the sparse table.
    pub fn line_at(&self, index: usize) -> Option<u32> {
        let mut line = None;
        for &(at, l) in &self.lines {
            if at as usize > index {
                break;
            }
            line = Some(l);
        }
        line
    }

    /// Just the opcodes, for structure-only assertions in tests.
    pub fn ops(&self) -> Vec<super::Op> {
        self.insns.iter().map(|insn| insn.op).collect()
    }

    /// Render a human-readable listing.
    pub fn disasm(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} (params {}, locals {}, stack {})",
            self.name,
            self.params,
            self.locals.len(),
            self.max_stack
        );
        for (i, insn) in self.insns.iter().enumerate() {
            let _ = write!(out, "{:5}  {:<14}", i, insn.op.name());
            match insn.op.operand_count() {
                0 => {}
                1 => {
                    let _ = write!(out, " {}", insn.a);
                }
                _ => {
                    let _ = write!(out, " {} {}", insn.a, insn.b);
                }
            }
            if insn.op.is_jump() {
                let _ = write!(out, "  -> {}", i as i64 + insn.a as i64);
            }
            if insn.op == super::Op::Const {
                if let Some(value) = self.pool.get(insn.a as usize) {
                    let _ = write!(out, "  ; {}", value);
                }
            }
            out.push('\n');
        }
        for (t, table) in self.switch_tables.iter().enumerate() {
            let _ = writeln!(out, "  table {}: default -> {}", t, table.default);
            for (pool_index, target) in &table.entries {
                let label = self
                    .pool
                    .get(*pool_index as usize)
                    .map(Value::to_string)
                    .unwrap_or_default();
                let _ = writeln!(out, "    {} -> {}", label, target);
            }
        }
        out
    }
}
