//! Error types for the runtime.
//!
//! Each layer owns a `thiserror` enum; [`InterpreterError`] is the top-level
//! type the executor propagates, wrapped in [`InterpreterError::Located`]
//! once the failing statement or expression is known.

use crate::ast::Token;
use crate::context::Scope;
use crate::value::{Value, ValueType};
use thiserror::Error;

/// Result alias for executor operations.
pub type InterpreterResult<T> = std::result::Result<T, InterpreterError>;

/// Errors raised by the value model and its operators.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    /// Operator is not defined for the operand pair.
    #[error("type mismatch: {left} {operator} {right} is not defined")]
    TypeMismatch {
        /// Operator text.
        operator: String,
        /// Left operand type.
        left: ValueType,
        /// Right operand type.
        right: ValueType,
    },

    /// Operator is not defined for a single operand type.
    #[error("operator {operator} is not defined for {value_type}")]
    UnsupportedOperator {
        /// Operator text.
        operator: String,
        /// Operand type.
        value_type: ValueType,
    },

    /// Integer division or remainder by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// Regex operand was computed rather than written in source.
    #[error("right operand of {operator} must be a string literal")]
    NonLiteralPattern {
        /// Operator text.
        operator: String,
    },

    /// Regex failed to compile.
    #[error("invalid regular expression {pattern:?}: {reason}")]
    InvalidPattern {
        /// Pattern text.
        pattern: String,
        /// Compiler message.
        reason: String,
    },

    /// Malformed relative time literal.
    #[error("invalid relative time {0:?}")]
    InvalidRTime(String),

    /// Malformed IP address.
    #[error("invalid IP address {0:?}")]
    InvalidIp(String),

    /// Malformed ACL entry.
    #[error("invalid ACL entry {entry:?}: {reason}")]
    InvalidAcl {
        /// Entry text.
        entry: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Header name or value rejected by the HTTP layer.
    #[error("invalid header {0:?}")]
    InvalidHeader(String),
}

/// Backend selection and director configuration errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DirectorError {
    /// No healthy backend could be selected.
    #[error("director {director}: all backends failed")]
    AllBackendsFailed {
        /// Director name.
        director: String,
    },

    /// Healthy share stayed below the configured quorum.
    #[error("director {director}: quorum weight not reached")]
    QuorumWeightNotReached {
        /// Director name.
        director: String,
    },

    /// Malformed director declaration.
    #[error("{token}: {message}")]
    Config {
        /// Offending declaration token.
        token: Token,
        /// What is wrong.
        message: String,
    },
}

/// Builtin and testing function errors, rendered as `[name] message`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FunctionError {
    /// Function takes no arguments.
    #[error("[{name}] arguments must be empty but {actual} provided")]
    ArgumentMustEmpty {
        /// Function name.
        name: String,
        /// Provided count.
        actual: usize,
    },

    /// Fixed arity mismatch.
    #[error("[{name}] expects {expects} arguments but {actual} provided")]
    ArgumentNotEnough {
        /// Function name.
        name: String,
        /// Required count.
        expects: usize,
        /// Provided count.
        actual: usize,
    },

    /// Optional-argument arity mismatch.
    #[error("[{name}] expects {min} to {max} arguments but {actual} provided")]
    ArgumentNotInRange {
        /// Function name.
        name: String,
        /// Minimum count.
        min: usize,
        /// Maximum count.
        max: usize,
        /// Provided count.
        actual: usize,
    },

    /// Argument type mismatch at a 1-based position.
    #[error("[{name}] argument {position} expects {expects} but got {actual}")]
    TypeMismatch {
        /// Function name.
        name: String,
        /// 1-based argument position.
        position: usize,
        /// Declared type.
        expects: ValueType,
        /// Provided type.
        actual: ValueType,
    },

    /// Body failed.
    #[error("[{name}] {message}")]
    Failed {
        /// Function name.
        name: String,
        /// Failure detail.
        message: String,
    },

    /// Body failed but defines a fallback value the caller may use instead.
    #[error("[{name}] {message}")]
    Fallback {
        /// Function name.
        name: String,
        /// Failure detail.
        message: String,
        /// Value to continue with.
        fallback: Box<Value>,
    },

    /// Function exists on the platform but has no local behaviour.
    #[error("[{name}] not implemented")]
    NotImplemented {
        /// Function name.
        name: String,
    },

    /// Misuse of a testing function.
    #[error("[{name}] {message}")]
    Testing {
        /// Function name.
        name: String,
        /// Failure detail.
        message: String,
    },

    /// Failed assertion.
    #[error("Assertion Error: {message}")]
    Assertion {
        /// Rendered actual value.
        actual: String,
        /// Assertion message.
        message: String,
    },
}

impl FunctionError {
    /// Convenience for body failures.
    pub fn failed(name: &str, message: impl Into<String>) -> Self {
        FunctionError::Failed {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

/// Top-level executor errors.
#[derive(Debug, Error)]
pub enum InterpreterError {
    /// Value or operator error.
    #[error(transparent)]
    Value(#[from] ValueError),

    /// Builtin function error.
    #[error(transparent)]
    Function(#[from] FunctionError),

    /// Director selection or configuration error.
    #[error(transparent)]
    Director(#[from] DirectorError),

    /// Malformed program declarations.
    #[error("configuration error: {0}")]
    Config(String),

    /// Name resolved to nothing in this scope.
    #[error("undefined variable {name} in {scope} scope")]
    UndefinedVariable {
        /// Variable name.
        name: String,
        /// Active scope.
        scope: Scope,
    },

    /// Assignment to a computed, read-only variable.
    #[error("variable {name} is read-only in {scope} scope")]
    ReadOnlyVariable {
        /// Variable name.
        name: String,
        /// Active scope.
        scope: Scope,
    },

    /// Value cannot be stored in the named slot (bad URL, status, method).
    #[error("invalid value for {name}: {reason}")]
    InvalidValue {
        /// Variable name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// `add` on something that is not a header.
    #[error("cannot add to {name}: only header variables accept add")]
    NotAddable {
        /// Variable name.
        name: String,
    },

    /// Expression produced the wrong type for its position.
    #[error("{context} expects {expected} but got {actual}")]
    TypeMismatch {
        /// Where the value was used.
        context: String,
        /// Expected type.
        expected: ValueType,
        /// Actual type.
        actual: ValueType,
    },

    /// `call` of an undeclared subroutine.
    #[error("undefined subroutine {0}")]
    UndefinedSubroutine(String),

    /// Unknown function name.
    #[error("undefined function {0}")]
    UndefinedFunction(String),

    /// Function exists but not in the active scope.
    #[error("function {name} is not available in {scope} scope")]
    FunctionNotInScope {
        /// Function name.
        name: String,
        /// Active scope.
        scope: Scope,
    },

    /// Function may not be used as a statement.
    #[error("function {0} cannot be called as a statement")]
    NotStatementCallable(String),

    /// `goto` without a matching destination in the subroutine body.
    #[error("goto destination {0} is not found")]
    UndefinedGoto(String),

    /// `return(state)` not allowed from this scope.
    #[error("return state {state} is not allowed in {scope} scope")]
    InvalidReturnState {
        /// Returned state.
        state: String,
        /// Active scope.
        scope: Scope,
    },

    /// Statement not allowed in this scope.
    #[error("{statement} statement is not allowed in {scope} scope")]
    StatementNotAllowed {
        /// Statement keyword.
        statement: String,
        /// Active scope.
        scope: Scope,
    },

    /// Restart ceiling exceeded.
    #[error("too many restarts: limit is {limit}")]
    TooManyRestarts {
        /// Configured ceiling.
        limit: u32,
    },

    /// Backend fetch collaborator failed.
    #[error("origin fetch failed: {0}")]
    Origin(String),

    /// Any of the above, pinned to a source position.
    #[error("{source} at {token}")]
    Located {
        /// Position of the failing node.
        token: Token,
        /// Underlying error.
        #[source]
        source: Box<InterpreterError>,
    },
}

impl InterpreterError {
    /// Attach a source position unless one is already attached.
    pub fn at(self, token: &Token) -> Self {
        match self {
            located @ InterpreterError::Located { .. } => located,
            other => InterpreterError::Located {
                token: token.clone(),
                source: Box::new(other),
            },
        }
    }

    /// Error with positional wrapping removed.
    pub fn root(&self) -> &InterpreterError {
        match self {
            InterpreterError::Located { source, .. } => source.root(),
            other => other,
        }
    }

    /// Attached source position, if any.
    pub fn token(&self) -> Option<&Token> {
        match self {
            InterpreterError::Located { token, .. } => Some(token),
            _ => None,
        }
    }

    /// Whether this is a failed `assert.*` call.
    pub fn is_assertion(&self) -> bool {
        matches!(
            self.root(),
            InterpreterError::Function(FunctionError::Assertion { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn located_errors_do_not_nest() {
        let error = InterpreterError::UndefinedSubroutine("missing".into())
            .at(&Token::new("main.vcl", 1, 2))
            .at(&Token::new("main.vcl", 9, 9));
        assert_eq!(error.token(), Some(&Token::new("main.vcl", 1, 2)));
        assert!(matches!(error.root(), InterpreterError::UndefinedSubroutine(_)));
        assert_eq!(error.to_string(), "undefined subroutine missing at main.vcl:1:2");
    }

    #[test]
    fn function_errors_carry_the_name_prefix() {
        let error = FunctionError::ArgumentNotEnough {
            name: "std.toupper".into(),
            expects: 1,
            actual: 0,
        };
        assert_eq!(
            error.to_string(),
            "[std.toupper] expects 1 arguments but 0 provided"
        );
        let assertion = FunctionError::Assertion {
            actual: "1".into(),
            message: "expected 2".into(),
        };
        assert_eq!(assertion.to_string(), "Assertion Error: expected 2");
    }
}
