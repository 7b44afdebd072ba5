//! Unified error taxonomy: syntax / semantic / runtime.
//!
//! Layered the way the teacher layers `InterpreterError`/`RuntimeError`/
//! `VmValidationError` in a blockchain VM's error module: one outer enum
//! aggregating typed inner error enums, each carrying its own message and
//! `#[from]` conversions.

use thiserror::Error;

/// A source position. Produced by the lexer, threaded through the parser
/// and attached to every diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Error raised while lexing or parsing source text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("syntax error near line {line}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

/// Error raised while compiling an AST to bytecode.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("semantic error near line {line}: {message}")]
pub struct SemanticError {
    pub message: String,
    pub line: u32,
}

impl SemanticError {
    pub fn new(message: impl Into<String>, line: u32) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}

/// Error raised by the virtual machine, or wrapped from a failing native
/// function.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("runtime error at address {address}: {message}")]
pub struct RuntimeError {
    pub message: String,
    pub address: usize,
    pub stack_trace: Vec<String>,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>, address: usize, stack_trace: Vec<String>) -> Self {
        Self {
            message: message.into(),
            address,
            stack_trace,
        }
    }
}

/// Top-level error type threaded through the parser, compiler, and VM.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SparklingError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Semantic(#[from] SemanticError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

pub type Result<T> = std::result::Result<T, SparklingError>;
