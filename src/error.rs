//! Compile errors reported by the backend.
//!
//! Every variant is a user/source error: it describes a defect in the
//! program being compiled, carries the [`Span`] where it occurred, and is
//! routed into the [`Diagnostics`](crate::diag::Diagnostics) sink so that
//! one run can surface several independent errors.
//!
//! Internal invariant violations (stack imbalance, unresolved jump chains)
//! are compiler bugs, not input errors; those panic instead of appearing
//! here.

use thiserror::Error;

use crate::span::Span;

/// A user-visible compilation error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// A variable was read before any assignment on some path.
    #[error("at {span}: variable '{name}' may be used before it is assigned")]
    UnassignedVariable {
        /// The variable name.
        name: String,
        /// Where the variable was referenced.
        span: Span,
    },

    /// A called function does not exist in the program.
    #[error("at {span}: unknown function '{name}'")]
    UnknownFunction {
        /// The function name that wasn't found.
        name: String,
        /// Where the function was called.
        span: Span,
    },

    /// A function name was used where a value is expected.
    #[error("at {span}: function '{name}' used as a value")]
    FunctionAsValue {
        /// The function name.
        name: String,
        /// Where the name was referenced.
        span: Span,
    },

    /// Two top-level declarations share a name.
    #[error("at {span}: duplicate definition '{name}'")]
    DuplicateDefinition {
        /// The duplicated name.
        name: String,
        /// Where the duplicate was declared.
        span: Span,
    },

    /// Assignment (or increment) targeting a declared constant.
    #[error("at {span}: assignment to constant '{name}'")]
    AssignmentToConstant {
        /// The constant name.
        name: String,
        /// Where the assignment occurred.
        span: Span,
    },

    /// A constant declaration whose initializer is not a literal.
    #[error("at {span}: initializer of constant '{name}' must be a literal")]
    ConstantNotLiteral {
        /// The constant name.
        name: String,
        /// Where the declaration occurred.
        span: Span,
    },

    /// A parameter default that is not a literal.
    #[error("at {span}: default value of parameter '{name}' must be a literal")]
    DefaultNotLiteral {
        /// The parameter name.
        name: String,
        /// Where the default occurred.
        span: Span,
    },

    /// A required parameter declared after an optional one.
    #[error("at {span}: required parameter '{name}' follows an optional parameter")]
    RequiredAfterOptional {
        /// The parameter name.
        name: String,
        /// Where the parameter occurred.
        span: Span,
    },

    /// The left-hand side of an assignment cannot be stored to.
    #[error("at {span}: expression is not assignable")]
    NotAssignable {
        /// Where the assignment occurred.
        span: Span,
    },

    /// Increment/decrement applied to something that is not a storage
    /// location.
    #[error("at {span}: invalid increment or decrement target")]
    InvalidIncrementTarget {
        /// Where the operator occurred.
        span: Span,
    },

    /// A call whose callee is neither a function name nor a method.
    #[error("at {span}: expression is not callable")]
    NotCallable {
        /// Where the call occurred.
        span: Span,
    },

    /// A call with an argument count outside the callee's accepted range.
    #[error("at {span}: function '{name}' expects {expected} argument(s), got {got}")]
    WrongArgCount {
        /// The callee name.
        name: String,
        /// Human-readable accepted count ("2" or "1 to 3").
        expected: String,
        /// The number of arguments supplied.
        got: usize,
        /// Where the call occurred.
        span: Span,
    },

    /// A `case` label that is not a literal after folding.
    #[error("at {span}: case label must be a literal")]
    CaseNotLiteral {
        /// Where the label occurred.
        span: Span,
    },

    /// Two `case` labels in one switch with the same value.
    #[error("at {span}: duplicate case label")]
    DuplicateCaseLabel {
        /// Where the second label occurred.
        span: Span,
    },

    /// More than one `default` case in a switch.
    #[error("at {span}: multiple default cases in switch")]
    DuplicateDefault {
        /// Where the second default occurred.
        span: Span,
    },

    /// `break` outside any loop or switch.
    #[error("at {span}: break statement not inside a loop or switch")]
    BreakOutside {
        /// Where the statement occurred.
        span: Span,
    },

    /// `continue` outside any loop.
    #[error("at {span}: continue statement not inside a loop")]
    ContinueOutside {
        /// Where the statement occurred.
        span: Span,
    },

    /// `fallthrough` outside any switch case.
    #[error("at {span}: fallthrough statement not inside a switch")]
    FallthroughOutside {
        /// Where the statement occurred.
        span: Span,
    },

    /// The per-function constant pool overflowed its capacity.
    #[error("at {span}: too many constants in one function")]
    TooManyConstants {
        /// Where the overflowing constant was introduced.
        span: Span,
    },
}

impl CompileError {
    /// The source position this error is tied to.
    pub fn span(&self) -> Span {
        match self {
            Self::UnassignedVariable { span, .. }
            | Self::UnknownFunction { span, .. }
            | Self::FunctionAsValue { span, .. }
            | Self::DuplicateDefinition { span, .. }
            | Self::AssignmentToConstant { span, .. }
            | Self::ConstantNotLiteral { span, .. }
            | Self::DefaultNotLiteral { span, .. }
            | Self::RequiredAfterOptional { span, .. }
            | Self::NotAssignable { span }
            | Self::InvalidIncrementTarget { span }
            | Self::NotCallable { span }
            | Self::WrongArgCount { span, .. }
            | Self::CaseNotLiteral { span }
            | Self::DuplicateCaseLabel { span }
            | Self::DuplicateDefault { span }
            | Self::BreakOutside { span }
            | Self::ContinueOutside { span }
            | Self::FallthroughOutside { span }
            | Self::TooManyConstants { span } => *span,
        }
    }
}
