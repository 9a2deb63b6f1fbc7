//! Code generation: the folded, analyzed tree becomes bytecode.
//!
//! One [`Gen`] compiles one function body (or the top-level unit) into a
//! [`CodeObject`], driving the [`Code`](crate::bytecode::Code) buffer and
//! the [`Item`](crate::item::Item) addressing strategies. All control
//! transfer goes through jump chains; `break`, `continue`, and
//! `fallthrough` target chains held in an explicit context stack.
//!
//! # Error discipline
//!
//! User errors (unknown function, bad argument count, non-literal case
//! label) abort only the construct that raised them: the statement loop
//! reports the error, restores the depth checkpoint, and keeps going so
//! one run batches independent mistakes. A function that recorded any
//! error yields no code object — jump chains dangling from an abandoned
//! construct are therefore never finalized. Stack-depth violations, by
//! contrast, are generator bugs and panic inside the code buffer.

mod cond;
mod expr;
mod stmt;

use crate::ast::{FuncDecl, Stmt, Unit};
use crate::bytecode::{Chain, Code, CodeObject, Op};
use crate::diag::Diagnostics;
use crate::error::CompileError;
use crate::item::Item;
use crate::layout::ProgramLayout;
use crate::span::Span;

type Result<T> = std::result::Result<T, CompileError>;

/// A control context that `break`/`continue`/`fallthrough` can target.
#[derive(Debug)]
enum GenCtx {
    /// A loop: `break` exits, `continue` transfers to the chain's target
    /// (the loop head, or a for-loop's update section).
    Loop { brk: Chain, cont: Chain },
    /// A switch: `break` exits, `fallthrough` transfers to the next
    /// case's entry (chain created at first use).
    Switch { brk: Chain, fall: Option<Chain> },
}

/// Generates bytecode for one function body.
pub struct Gen<'a> {
    layout: &'a ProgramLayout,
    diags: &'a mut Diagnostics,
    code: Code,
    ctx: Vec<GenCtx>,
}

impl<'a> Gen<'a> {
    /// Create a generator with a fresh code buffer.
    pub fn new(layout: &'a ProgramLayout, diags: &'a mut Diagnostics) -> Self {
        Self {
            layout,
            diags,
            code: Code::new(),
            ctx: Vec::new(),
        }
    }

    /// Compile the top-level unit's executable statements.
    ///
    /// Returns `None` if any user error was recorded while compiling it.
    pub fn compile_unit_body(mut self, unit: &Unit<'_>) -> Option<CodeObject> {
        let errors_before = self.diags.error_count();
        for stmt in unit.stmts {
            // Declarations carry no top-level code.
            if matches!(stmt, Stmt::Func(_) | Stmt::Const(_)) {
                continue;
            }
            self.gen_stmt(stmt);
        }
        self.finish("<main>", 0, errors_before)
    }

    /// Compile one function body.
    pub fn compile_function(mut self, decl: &FuncDecl<'_>) -> Option<CodeObject> {
        let errors_before = self.diags.error_count();
        // A duplicate declaration was already reported; only the
        // registered one is compiled.
        let info = self.layout.function(decl.name.name)?;
        if info.span != decl.span {
            return None;
        }
        let params = info.params.len() as u32;
        for param in &info.params {
            let default = match &param.default {
                Some(value) => match self.code.intern(value.clone()) {
                    Ok(index) => Some(index),
                    Err(_) => {
                        self.diags
                            .error(CompileError::TooManyConstants { span: param.span });
                        None
                    }
                },
                None => None,
            };
            self.code.declare_param(&param.name, default);
        }
        let name = info.name.clone();
        for stmt in decl.body.stmts {
            self.gen_stmt(stmt);
        }
        self.finish(&name, params, errors_before)
    }

    fn finish(mut self, name: &str, params: u32, errors_before: usize) -> Option<CodeObject> {
        // Falling off the end returns null.
        if self.code.is_alive() {
            self.code.emit(Op::ReturnNull);
        }
        if self.diags.error_count() > errors_before {
            // An abandoned construct may have left chains or contexts
            // dangling; the buffer is discarded, never finalized.
            return None;
        }
        assert!(self.ctx.is_empty(), "control context stack not drained");
        Some(self.code.finish(name, params))
    }

    /// Generate one statement, holding the stack-balance invariant: the
    /// operand depth after a statement equals the depth before it.
    fn gen_stmt(&mut self, stmt: &Stmt<'_>) {
        self.code.set_line(stmt.span().line);
        let checkpoint = self.code.state();
        let depth_before = self.code.depth();
        match self.stmt(stmt) {
            Ok(()) => {
                if self.code.is_alive() {
                    assert_eq!(
                        self.code.depth(),
                        depth_before,
                        "operand stack unbalanced after statement at {}",
                        stmt.span()
                    );
                }
            }
            Err(err) => {
                // Abort this construct, keep scanning its siblings.
                self.diags.error(err);
                self.code.restore(checkpoint);
            }
        }
    }

    fn resolve_opt(&mut self, chain: Option<Chain>) {
        if let Some(chain) = chain {
            self.code.resolve(chain);
        }
    }

    /// Load an item, mapping pool exhaustion to a spanned user error.
    fn load(&mut self, item: Item, span: Span) -> Result<()> {
        item.load(&mut self.code)
            .map_err(|_| CompileError::TooManyConstants { span })
    }

    /// Discard an item, mapping pool exhaustion to a spanned user error.
    fn discard(&mut self, item: Item, span: Span) -> Result<()> {
        item.discard(&mut self.code)
            .map_err(|_| CompileError::TooManyConstants { span })
    }

    /// Intern a string in the pool, mapping exhaustion to a user error.
    fn intern_str(&mut self, text: &str, span: Span) -> Result<u16> {
        self.code
            .intern(crate::value::Value::Str(text.to_string()))
            .map_err(|_| CompileError::TooManyConstants { span })
    }
}
