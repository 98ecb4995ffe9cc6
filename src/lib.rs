//! edgevcl – a local runtime for Fastly VCL programs
//!
//! This crate executes an already parsed VCL program against HTTP requests:
//! - A typed value model with literal and not-set flags
//! - A per-request execution context with scope-limited pseudo-variables
//! - A statement executor driving the recv → deliver request lifecycle
//! - Random, fallback, hash, client and consistent-hash directors
//! - The builtin function catalog plus an `assert.*` surface for testing
//!
//! Parsing VCL source is left to the host; programs arrive as an [`ast::Program`],
//! either built in code or deserialised from JSON.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Syntax tree consumed by the runtime.
pub mod ast;
/// Interpreter configuration.
pub mod config;
/// Per-request execution context and declarations.
pub mod context;
/// Error taxonomy.
pub mod error;
/// Builtin function library.
pub mod function;
/// Executor, lifecycle and directors.
pub mod interpreter;
/// Runtime value model.
pub mod value;
/// Scope-variable resolver.
pub mod variable;

// Re-export key types for convenience
pub use config::InterpreterConfig;
pub use context::{Context, Scope, TestingState};
pub use error::{InterpreterError, InterpreterResult};
pub use interpreter::{Interpreter, Origin, Process, StaticOrigin};
pub use value::Value;

/// Current version of the edgevcl runtime
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
