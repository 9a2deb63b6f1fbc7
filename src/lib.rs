//! Quill compiler backend.
//!
//! Takes the parsed syntax tree of one translation unit and produces a
//! stack-machine code object per function, plus one for the top-level
//! statements. The pipeline:
//!
//! 1. [`ProgramLayout`] — one scan registering function signatures and
//!    constant values, so forward references resolve.
//! 2. [`fold::Folder`] — tree rewriting: constant folding, short-circuit
//!    simplification with residual preservation, dead-branch removal,
//!    constant-name substitution.
//! 3. [`flow`] — reachability and definite-assignment checks.
//! 4. [`gen::Gen`] — bytecode generation through the item abstraction and
//!    backpatched jump chains, holding the stack-depth invariant.
//!
//! User errors accumulate in a [`Diagnostics`] sink so one run reports as
//! many independent mistakes as possible; any error discards the output.
//! Internal invariant violations (unbalanced stack, unresolved chains)
//! panic — they are bugs in the compiler, not in the input.
//!
//! ## Modules
//!
//! - [`ast`]: arena-allocated syntax tree handed over by the parser
//! - [`bytecode`]: instruction set, code buffer, code objects
//! - [`fold`]: the tree-rewriting pass
//! - [`flow`]: the flow analysis pass
//! - [`gen`]: the code generator
//! - [`item`]: addressing strategies for computed values
//! - [`layout`]: the program-level symbol table
//! - [`value`]: runtime literal values and folding semantics

pub mod ast;
pub mod bytecode;
mod diag;
mod error;
pub mod flow;
pub mod fold;
pub mod r#gen;
pub mod item;
pub mod layout;
mod span;
pub mod value;

pub use diag::{DEFAULT_ERROR_CAP, Diagnostic, DiagnosticKind, Diagnostics};
pub use error::CompileError;
pub use layout::ProgramLayout;
pub use span::Span;

use ast::{Stmt, Unit};
use bytecode::CodeObject;
use fold::Folder;
use r#gen::Gen;

/// The compiled form of one translation unit.
#[derive(Debug, Clone)]
pub struct Program {
    /// Code for the top-level statements.
    pub top: CodeObject,
    /// Code per declared function, indexed by function id.
    pub functions: Vec<CodeObject>,
}

impl Program {
    /// Render a listing of every code object.
    pub fn disasm(&self) -> String {
        let mut out = self.top.disasm();
        for function in &self.functions {
            out.push('\n');
            out.push_str(&function.disasm());
        }
        out
    }
}

/// Compile one unit to a [`Program`].
///
/// On any user error the collected diagnostics are returned instead; a
/// partially valid program is never handed out.
pub fn compile<'ast>(
    arena: &'ast bumpalo::Bump,
    unit: &Unit<'ast>,
) -> Result<Program, Diagnostics> {
    let mut diags = Diagnostics::new();

    let layout = ProgramLayout::build(unit, &mut diags);
    let folded = Folder::new(arena, &layout, &mut diags).fold_unit(unit);
    flow::check_unit(&folded, &layout, &mut diags);

    let mut functions: Vec<Option<CodeObject>> = vec![None; layout.functions().len()];
    for stmt in folded.stmts {
        if let Stmt::Func(decl) = stmt
            && let Some(object) = Gen::new(&layout, &mut diags).compile_function(decl)
        {
            let id = layout
                .function(decl.name.name)
                .expect("compiled function missing from layout")
                .id;
            functions[id as usize] = Some(object);
        }
    }
    let top = Gen::new(&layout, &mut diags).compile_unit_body(&folded);

    if diags.has_errors() {
        return Err(diags);
    }
    Ok(Program {
        top: top.expect("no top-level code despite clean compilation"),
        functions: functions
            .into_iter()
            .map(|f| f.expect("no function code despite clean compilation"))
            .collect(),
    })
}
