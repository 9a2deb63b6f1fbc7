//! Program layout: the symbol table built once before any other pass.
//!
//! `ProgramLayout` assigns every declared function a dense id and records
//! every declared constant's literal value. It is built in one top-level
//! scan, which is what lets later code call functions declared further
//! down the file, and is read-only afterwards: the folder consults it for
//! constant inlining, the generator for call resolution.

use rustc_hash::FxHashMap;

use crate::ast::{Expr, Stmt, Unit};
use crate::diag::Diagnostics;
use crate::error::CompileError;
use crate::span::Span;
use crate::value::{self, Value};

/// One declared function parameter.
#[derive(Debug, Clone)]
pub struct ParamInfo {
    /// Parameter name.
    pub name: String,
    /// Default value for optional parameters.
    pub default: Option<Value>,
    /// Where the parameter was declared.
    pub span: Span,
}

/// Signature of one declared function.
#[derive(Debug, Clone)]
pub struct FuncInfo {
    /// Dense function id (index into the program's function list).
    pub id: u32,
    /// Function name.
    pub name: String,
    /// Parameters in declaration order; optional ones trail.
    pub params: Vec<ParamInfo>,
    /// Number of parameters without defaults.
    pub required: usize,
    /// Where the function was declared.
    pub span: Span,
}

impl FuncInfo {
    /// Whether a call with `n` arguments is accepted.
    pub fn accepts(&self, n: usize) -> bool {
        n >= self.required && n <= self.params.len()
    }

    /// Human-readable accepted argument count ("2" or "1 to 3").
    pub fn expected_desc(&self) -> String {
        if self.required == self.params.len() {
            format!("{}", self.required)
        } else {
            format!("{} to {}", self.required, self.params.len())
        }
    }
}

/// Flat name tables for one translation unit.
#[derive(Debug, Default)]
pub struct ProgramLayout {
    funcs: Vec<FuncInfo>,
    func_ids: FxHashMap<String, u32>,
    consts: FxHashMap<String, Value>,
}

impl ProgramLayout {
    /// Scan a unit's top-level declarations.
    ///
    /// Duplicate names and non-literal constant initializers are reported
    /// to the sink; the scan continues so one run surfaces every clash.
    pub fn build(unit: &Unit<'_>, diags: &mut Diagnostics) -> Self {
        let mut layout = Self::default();
        for stmt in unit.stmts {
            match stmt {
                Stmt::Const(decl) => {
                    let name = decl.name.name;
                    if layout.is_declared(name) {
                        diags.error(CompileError::DuplicateDefinition {
                            name: name.to_string(),
                            span: decl.name.span,
                        });
                        continue;
                    }
                    match layout.literal_value(decl.value) {
                        Some(value) => {
                            layout.consts.insert(name.to_string(), value);
                        }
                        None => diags.error(CompileError::ConstantNotLiteral {
                            name: name.to_string(),
                            span: decl.value.span(),
                        }),
                    }
                }
                Stmt::Func(decl) => {
                    let name = decl.name.name;
                    if layout.is_declared(name) {
                        diags.error(CompileError::DuplicateDefinition {
                            name: name.to_string(),
                            span: decl.name.span,
                        });
                        continue;
                    }
                    let mut params = Vec::with_capacity(decl.params.len());
                    let mut required = 0;
                    let mut seen_optional = false;
                    for param in decl.params {
                        let default = match param.default {
                            Some(expr) => match layout.literal_value(expr) {
                                Some(value) => Some(value),
                                None => {
                                    diags.error(CompileError::DefaultNotLiteral {
                                        name: param.name.name.to_string(),
                                        span: expr.span(),
                                    });
                                    // Keep the parameter optional so the
                                    // arity range stays what was written.
                                    Some(Value::Null)
                                }
                            },
                            None => None,
                        };
                        if default.is_some() {
                            seen_optional = true;
                        } else {
                            if seen_optional {
                                diags.error(CompileError::RequiredAfterOptional {
                                    name: param.name.name.to_string(),
                                    span: param.span,
                                });
                            }
                            required += 1;
                        }
                        params.push(ParamInfo {
                            name: param.name.name.to_string(),
                            default,
                            span: param.span,
                        });
                    }
                    let id = layout.funcs.len() as u32;
                    layout.func_ids.insert(name.to_string(), id);
                    layout.funcs.push(FuncInfo {
                        id,
                        name: name.to_string(),
                        params,
                        required,
                        span: decl.span,
                    });
                }
                _ => {}
            }
        }
        layout
    }

    fn is_declared(&self, name: &str) -> bool {
        self.func_ids.contains_key(name) || self.consts.contains_key(name)
    }

    /// Look up a function signature by name.
    pub fn function(&self, name: &str) -> Option<&FuncInfo> {
        self.func_ids.get(name).map(|&id| &self.funcs[id as usize])
    }

    /// Whether a name is a declared function.
    pub fn is_function(&self, name: &str) -> bool {
        self.func_ids.contains_key(name)
    }

    /// Look up a declared constant's value.
    pub fn constant(&self, name: &str) -> Option<&Value> {
        self.consts.get(name)
    }

    /// All functions, in declaration (= id) order.
    pub fn functions(&self) -> &[FuncInfo] {
        &self.funcs
    }

    /// Reduce an expression to a literal value, if it is one.
    ///
    /// Accepts literals, references to already-registered constants,
    /// parentheses, and unary/binary operations over those — the same
    /// evaluation the folder performs, restricted to pure inputs.
    pub fn literal_value(&self, expr: &Expr<'_>) -> Option<Value> {
        match expr {
            Expr::Literal(lit) => Some(Value::from_literal(&lit.kind)),
            Expr::Name(name) => self.consts.get(name.ident.name).cloned(),
            Expr::Paren(paren) => self.literal_value(paren.expr),
            Expr::Unary(unary) => {
                let operand = self.literal_value(unary.operand)?;
                value::unary(unary.op, &operand)
            }
            Expr::Binary(binary) => {
                let left = self.literal_value(binary.left)?;
                let right = self.literal_value(binary.right)?;
                value::arith(binary.op, &left, &right)
            }
            _ => None,
        }
    }
}
