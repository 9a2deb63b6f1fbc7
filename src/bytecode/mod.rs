//! Bytecode types: the instruction set, the constant pool, the code
//! buffer used during generation, and the finished code object.

mod code;
mod object;
mod op;
mod pool;

pub use code::{Chain, Code, CodeState, Insn, UNRESOLVED};
pub use object::{CodeObject, LocalInfo, SwitchTable};
pub use op::Op;
pub use pool::{ConstantPool, POOL_CAPACITY, PoolFull};

/// Largest number of case labels compiled to linear-scan dispatch; above
/// this a sorted table with binary-search dispatch is emitted.
pub const LINEAR_DISPATCH_MAX: usize = 16;
