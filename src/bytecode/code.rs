//! The code buffer: an append-only instruction sequence under construction.
//!
//! `Code` owns everything that accumulates while one function is being
//! generated: the instruction array, the constant pool, the local-variable
//! table, the sparse line table, the switch label tables, and the
//! jump-chain registry. It also tracks the current and maximum operand
//! stack depth and whether the current program point is reachable.
//!
//! # Jump chains
//!
//! A forward transfer targets an instruction index that is not known yet.
//! The generator allocates a [`Chain`], emits any number of jumps into it,
//! and resolves the chain once the destination index is reached; every
//! pending site is patched at that moment. Resolving a chain whose target
//! is already known (a loop head, for instance) flips it into auto-resolve
//! mode: jumps added afterwards are patched immediately instead of
//! entering the pending set. Every chain must be resolved exactly once
//! before [`Code::finish`]; both violations panic, because an unpatched or
//! double-patched jump is a compiler bug, not a user error.
//!
//! # Stack discipline
//!
//! Every emitted instruction adjusts the tracked depth by its static
//! effect. Underflow panics immediately. Each pending chain remembers the
//! depth at its jump sites, and resolution checks that depth against the
//! fall-through depth, so a branch join with mismatched stack shapes dies
//! at generation time instead of corrupting the runtime.

use rustc_hash::FxHashMap;

use super::object::{CodeObject, LocalInfo, SwitchTable};
use super::op::Op;
use super::pool::{ConstantPool, PoolFull};
use crate::value::{Value, ValueKey};

/// Sentinel operand for a jump whose target is not yet patched.
pub const UNRESOLVED: i32 = i32::MIN;

/// One instruction: an opcode and up to three inline operands.
///
/// Operand `c` is reserved; no current opcode uses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insn {
    /// The opcode.
    pub op: Op,
    /// First operand (jump offset, slot, pool index, count).
    pub a: i32,
    /// Second operand (immediate, argument count).
    pub b: i32,
    /// Third operand, reserved.
    pub c: i32,
}

impl Insn {
    fn new(op: Op, a: i32, b: i32) -> Self {
        Self { op, a, b, c: 0 }
    }
}

/// Handle to a registered jump chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chain(u32);

#[derive(Debug)]
enum ChainState {
    /// Sites waiting for the target, plus the stack depth at those sites.
    Pending { sites: Vec<usize>, depth: Option<u32> },
    /// Target known; later jumps patch immediately.
    Resolved { target: usize },
    /// Absorbed into another chain.
    Merged,
}

/// A saved depth/liveness checkpoint (around conditional arms).
#[derive(Debug, Clone, Copy)]
pub struct CodeState {
    depth: u32,
    alive: bool,
}

#[derive(Debug)]
struct SwitchTableBuilder {
    /// (sort key, pool index, case target); targets patched as cases are
    /// emitted.
    entries: Vec<(ValueKey, u16, u32)>,
    default: Option<u32>,
    sorted: bool,
}

/// Local-variable slots for one function.
///
/// Slots are dense and assigned at first reference; names are never reused
/// across functions. A small pool of synthetic names backs
/// compiler-generated temporaries so repeated lowering (null-coalescing
/// assignment, indexed increment) does not grow the frame without bound.
#[derive(Debug, Default)]
struct LocalTable {
    infos: Vec<LocalInfo>,
    by_name: FxHashMap<String, u32>,
    free_temps: Vec<u32>,
    next_temp: u32,
}

impl LocalTable {
    fn slot(&mut self, name: &str) -> u32 {
        if let Some(&slot) = self.by_name.get(name) {
            return slot;
        }
        let slot = self.infos.len() as u32;
        self.infos.push(LocalInfo {
            name: name.to_string(),
            default: None,
        });
        self.by_name.insert(name.to_string(), slot);
        slot
    }

    fn acquire_temp(&mut self) -> u32 {
        if let Some(slot) = self.free_temps.pop() {
            return slot;
        }
        let name = format!("@tmp{}", self.next_temp);
        self.next_temp += 1;
        self.slot(&name)
    }
}

/// An instruction buffer for a single function.
#[derive(Debug)]
pub struct Code {
    insns: Vec<Insn>,
    pool: ConstantPool,
    chains: Vec<ChainState>,
    open_chains: usize,
    switch_tables: Vec<SwitchTableBuilder>,
    locals: LocalTable,
    /// Sparse line table: (instruction index, line), entries only where
    /// the line changes.
    lines: Vec<(u32, u32)>,
    cur_line: u32,
    depth: u32,
    max_depth: u32,
    alive: bool,
}

impl Default for Code {
    fn default() -> Self {
        Self::new()
    }
}

impl Code {
    /// Create an empty, alive code buffer.
    pub fn new() -> Self {
        Self {
            insns: Vec::new(),
            pool: ConstantPool::new(),
            chains: Vec::new(),
            open_chains: 0,
            switch_tables: Vec::new(),
            locals: LocalTable::default(),
            lines: Vec::new(),
            cur_line: 0,
            depth: 0,
            max_depth: 0,
            alive: true,
        }
    }

    // =========================================================================
    // Emission
    // =========================================================================

    /// Emit an instruction with no operands.
    pub fn emit(&mut self, op: Op) {
        self.emit2(op, 0, 0);
    }

    /// Emit an instruction with one operand.
    pub fn emit1(&mut self, op: Op, a: i32) {
        self.emit2(op, a, 0);
    }

    /// Emit an instruction with two operands.
    pub fn emit2(&mut self, op: Op, a: i32, b: i32) {
        if !self.alive {
            return;
        }
        self.push_insn(Insn::new(op, a, b));
        if op.ends_block() {
            self.alive = false;
        }
    }

    fn push_insn(&mut self, insn: Insn) {
        let index = self.insns.len() as u32;
        if self.lines.last().map(|&(_, line)| line) != Some(self.cur_line) {
            self.lines.push((index, self.cur_line));
        }
        self.apply_effect(insn.op, insn.a, insn.b);
        self.insns.push(insn);
    }

    fn apply_effect(&mut self, op: Op, a: i32, b: i32) {
        let pops = op.pops(a, b);
        assert!(
            self.depth >= pops,
            "operand stack underflow emitting {} at instruction {} (depth {}, pops {})",
            op.name(),
            self.insns.len(),
            self.depth,
            pops
        );
        self.depth = self.depth - pops + op.pushes(a, b);
        self.max_depth = self.max_depth.max(self.depth);
    }

    /// Emit the cheapest instruction that pushes the given literal.
    pub fn emit_value(&mut self, value: &Value) -> Result<(), PoolFull> {
        match value {
            Value::Null => self.emit(Op::PushNull),
            Value::Bool(true) => self.emit(Op::PushTrue),
            Value::Bool(false) => self.emit(Op::PushFalse),
            Value::Int(0) => self.emit(Op::PushZero),
            Value::Int(1) => self.emit(Op::PushOne),
            other => {
                if !self.alive {
                    return Ok(());
                }
                let index = self.pool.add(other.clone())?;
                self.emit1(Op::Const, index as i32);
            }
        }
        Ok(())
    }

    /// Intern a value in the constant pool without emitting anything.
    pub fn intern(&mut self, value: Value) -> Result<u16, PoolFull> {
        self.pool.add(value)
    }

    /// Current instruction index (the next emission target).
    pub fn index(&self) -> usize {
        self.insns.len()
    }

    // =========================================================================
    // Liveness and depth
    // =========================================================================

    /// Set the source line attributed to subsequent instructions.
    pub fn set_line(&mut self, line: u32) {
        self.cur_line = line;
    }

    /// Whether the current program point is reachable.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Current operand stack depth.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Save the depth/liveness state (around conditional arms).
    pub fn state(&self) -> CodeState {
        CodeState {
            depth: self.depth,
            alive: self.alive,
        }
    }

    /// Restore a previously saved state.
    pub fn restore(&mut self, state: CodeState) {
        self.depth = state.depth;
        self.alive = state.alive;
    }

    /// Make the current point reachable at the given depth (switch case
    /// entries, which are targeted by dispatch tables rather than jumps).
    pub fn resume(&mut self, depth: u32) {
        if self.alive {
            assert_eq!(
                self.depth, depth,
                "stack depth mismatch at dispatch target {}",
                self.insns.len()
            );
        } else {
            self.alive = true;
            self.depth = depth;
        }
    }

    // =========================================================================
    // Jump chains
    // =========================================================================

    /// Register a new, unresolved chain.
    pub fn new_chain(&mut self) -> Chain {
        self.chains.push(ChainState::Pending {
            sites: Vec::new(),
            depth: None,
        });
        self.open_chains += 1;
        Chain(self.chains.len() as u32 - 1)
    }

    /// Register a chain already resolved to a known target (loop heads).
    pub fn chain_to(&mut self, target: usize) -> Chain {
        let chain = self.new_chain();
        self.resolve_to(chain, target);
        chain
    }

    /// Emit a jump into a chain.
    pub fn jump(&mut self, op: Op, chain: Chain) {
        self.jump_imm(op, 0, chain);
    }

    /// Emit a compare-with-immediate jump into a chain.
    pub fn jump_imm(&mut self, op: Op, imm: i32, chain: Chain) {
        debug_assert!(op.is_jump(), "jump() called with non-jump {}", op.name());
        if !self.alive {
            return;
        }
        let site = self.insns.len();
        self.push_insn(Insn::new(op, UNRESOLVED, imm));
        if op.ends_block() {
            self.alive = false;
        }
        let depth_here = self.depth;
        match &mut self.chains[chain.0 as usize] {
            ChainState::Pending { sites, depth } => {
                match depth {
                    Some(d) => assert_eq!(
                        *d, depth_here,
                        "stack depth mismatch among jumps in one chain"
                    ),
                    None => *depth = Some(depth_here),
                }
                sites.push(site);
            }
            ChainState::Resolved { target } => {
                self.insns[site].a = *target as i32 - site as i32;
            }
            ChainState::Merged => panic!("jump added to a merged chain"),
        }
    }

    /// Resolve a chain to the current instruction index.
    ///
    /// Patches every pending site. If any site existed, the current point
    /// becomes reachable at the depth recorded by those sites.
    pub fn resolve(&mut self, chain: Chain) {
        let target = self.insns.len();
        let site_depth = self.patch_sites(chain, target);
        if let Some(depth) = site_depth {
            if self.alive {
                assert_eq!(
                    self.depth, depth,
                    "stack depth mismatch at branch join {}",
                    target
                );
            } else {
                self.alive = true;
                self.depth = depth;
            }
        }
    }

    /// Resolve a chain to a known (typically backward) target without
    /// changing liveness.
    pub fn resolve_to(&mut self, chain: Chain, target: usize) {
        self.patch_sites(chain, target);
    }

    fn patch_sites(&mut self, chain: Chain, target: usize) -> Option<u32> {
        let state = std::mem::replace(
            &mut self.chains[chain.0 as usize],
            ChainState::Resolved { target },
        );
        match state {
            ChainState::Pending { sites, depth } => {
                for site in &sites {
                    self.insns[*site].a = target as i32 - *site as i32;
                }
                self.open_chains -= 1;
                if sites.is_empty() { None } else { depth }
            }
            ChainState::Resolved { .. } => panic!("jump chain resolved twice"),
            ChainState::Merged => panic!("merged chain resolved"),
        }
    }

    /// Merge two optional chains into one that must be resolved once.
    pub fn merge(&mut self, a: Option<Chain>, b: Option<Chain>) -> Option<Chain> {
        match (a, b) {
            (None, other) | (other, None) => other,
            (Some(a), Some(b)) => {
                let absorbed =
                    std::mem::replace(&mut self.chains[b.0 as usize], ChainState::Merged);
                let (b_sites, b_depth) = match absorbed {
                    ChainState::Pending { sites, depth } => (sites, depth),
                    _ => panic!("merge of a resolved chain"),
                };
                self.open_chains -= 1;
                match &mut self.chains[a.0 as usize] {
                    ChainState::Pending { sites, depth } => {
                        if let (Some(da), Some(db)) = (*depth, b_depth) {
                            assert_eq!(da, db, "stack depth mismatch merging chains");
                        }
                        if depth.is_none() {
                            *depth = b_depth;
                        }
                        sites.extend(b_sites);
                    }
                    _ => panic!("merge into a resolved chain"),
                }
                Some(a)
            }
        }
    }

    // =========================================================================
    // Switch tables
    // =========================================================================

    /// Register an empty switch label table; returns its index.
    pub fn new_switch_table(&mut self) -> usize {
        self.switch_tables.push(SwitchTableBuilder {
            entries: Vec::new(),
            default: None,
            sorted: false,
        });
        self.switch_tables.len() - 1
    }

    /// Record one case label with its entry offset.
    pub fn add_switch_case(&mut self, table: usize, key: ValueKey, pool_index: u16, target: usize) {
        self.switch_tables[table]
            .entries
            .push((key, pool_index, target as u32));
    }

    /// Record the default entry offset.
    pub fn set_switch_default(&mut self, table: usize, target: usize) {
        self.switch_tables[table].default = Some(target as u32);
    }

    /// Mark a table for binary-search dispatch; it is sorted by the label
    /// values' natural ordering before emission.
    pub fn set_switch_sorted(&mut self, table: usize) {
        self.switch_tables[table].sorted = true;
    }

    // =========================================================================
    // Locals
    // =========================================================================

    /// Slot for a name, assigned at first reference.
    pub fn local_slot(&mut self, name: &str) -> u32 {
        self.locals.slot(name)
    }

    /// Whether a name already has a slot.
    pub fn has_local(&self, name: &str) -> bool {
        self.locals.by_name.contains_key(name)
    }

    /// Declare a parameter slot with an optional default-value pool index.
    pub fn declare_param(&mut self, name: &str, default: Option<u16>) -> u32 {
        let slot = self.locals.slot(name);
        self.locals.infos[slot as usize].default = default;
        slot
    }

    /// Borrow a synthetic temporary slot.
    pub fn acquire_temp(&mut self) -> u32 {
        self.locals.acquire_temp()
    }

    /// Return a synthetic temporary slot to the pool.
    pub fn release_temp(&mut self, slot: u32) {
        self.locals.free_temps.push(slot);
    }

    /// Number of local slots assigned so far.
    pub fn local_count(&self) -> u32 {
        self.locals.infos.len() as u32
    }

    // =========================================================================
    // Finalization
    // =========================================================================

    /// Finish the buffer into an immutable [`CodeObject`].
    ///
    /// # Panics
    ///
    /// Panics if any chain is unresolved, any jump operand still holds the
    /// unresolved sentinel, or any switch table is missing its default —
    /// all of which are generator bugs.
    pub fn finish(self, name: impl Into<String>, params: u32) -> CodeObject {
        assert_eq!(
            self.open_chains, 0,
            "{} jump chain(s) never resolved",
            self.open_chains
        );
        for (i, insn) in self.insns.iter().enumerate() {
            if insn.op.is_jump() {
                assert_ne!(insn.a, UNRESOLVED, "unpatched jump at instruction {}", i);
            }
        }
        let switch_tables = self
            .switch_tables
            .into_iter()
            .map(|mut builder| {
                if builder.sorted {
                    builder.entries.sort_by(|x, y| x.0.cmp(&y.0));
                }
                SwitchTable {
                    entries: builder
                        .entries
                        .into_iter()
                        .map(|(_, pool_index, target)| (pool_index, target))
                        .collect(),
                    default: builder.default.expect("switch table missing default"),
                }
            })
            .collect();
        CodeObject {
            name: name.into(),
            params,
            insns: self.insns,
            pool: self.pool.into_values(),
            switch_tables,
            max_stack: self.max_depth,
            locals: self.locals.infos,
            lines: self.lines,
        }
    }
}
