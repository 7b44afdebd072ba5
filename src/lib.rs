//! Sparkling: a small, dynamically typed, C-style scripting language with a
//! register-based virtual machine.
//!
//! Pipeline: source text → [`parser`] → [`ast`] → [`compiler`] → bytecode
//! (see [`bytecode`]) → [`vm`]. [`value`] is the runtime value model shared
//! by the compiler (literals) and the VM (execution); [`format`] is the
//! `printf`-style engine shared by [`stdlib`] and compiler diagnostics.

pub mod ast;
pub mod bytecode;
pub mod compiler;
pub mod config;
pub mod error;
pub mod format;
pub mod parser;
pub mod stdlib;
pub mod value;
pub mod vm;

pub use compiler::Compiler;
pub use config::{CompilerConfig, VmConfig};
pub use error::{ParseError, RuntimeError, SemanticError, SparklingError};
pub use parser::Parser;
pub use vm::Vm;

/// Parses, compiles, and runs a complete Sparkling source string with a
/// freshly constructed VM carrying the standard library. Convenience entry
/// point for embedders and the CLI; library users who need finer control
/// (custom natives, running a program more than once) should use
/// [`Parser`], [`Compiler`], and [`Vm`] directly.
pub fn run_source(src: &str) -> Result<value::Value, SparklingError> {
    let ast = Parser::parse_program(src)?;
    let program = Compiler::compile(&ast)?;
    let mut vm = Vm::new();
    stdlib::register(&mut vm);
    Ok(vm.run(program, Vec::new())?)
}
