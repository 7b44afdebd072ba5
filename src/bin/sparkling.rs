//! Command-line front end: parses, compiles, and runs Sparkling source
//! files, or dumps the AST/bytecode produced along the way.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser as ClapParser;
use sparkling::bytecode::{FunctionHeader, Instruction, Opcode};
use sparkling::{Compiler, Parser, SparklingError, Vm};

#[derive(ClapParser)]
#[command(name = "sparkling", version, about = "Sparkling scripting language")]
struct Cli {
    /// Source files to run, in order.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Print the parsed AST instead of running the file.
    #[arg(long)]
    dump_ast: bool,

    /// Print the disassembled bytecode instead of running the file.
    #[arg(long)]
    dump_bytecode: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    for path in &cli.files {
        if let Err(err) = run_file(path, &cli) {
            eprintln!("{}: {err}", path.display());
            return ExitCode::FAILURE;
        }
    }
    ExitCode::SUCCESS
}

fn run_file(path: &PathBuf, cli: &Cli) -> Result<(), SparklingError> {
    let src = std::fs::read_to_string(path).map_err(|e| {
        sparkling::RuntimeError::new(format!("could not read file: {e}"), 0, Vec::new())
    })?;
    let ast = Parser::parse_program(&src)?;
    if cli.dump_ast {
        println!("{ast:#?}");
        return Ok(());
    }
    let program = Compiler::compile(&ast)?;
    if cli.dump_bytecode {
        disassemble(&program.body, 0, 0);
        return Ok(());
    }
    let mut vm = Vm::new();
    sparkling::stdlib::register(&mut vm);
    vm.run(program, Vec::new())?;
    Ok(())
}

/// Walks `body` from `pos`, printing one line per instruction and
/// recursing into nested function bodies with increasing indentation —
/// mirrors the VM's own straight-line-skips-nested-bodies dispatch rule
/// (see `vm::Vm::skip_nested_function`), but here we *enter* what the VM
/// would skip, since disassembly wants every byte accounted for.
fn disassemble(body: &[u32], mut pos: usize, depth: usize) -> usize {
    let indent = "  ".repeat(depth);
    while pos < body.len() {
        let word = body[pos];
        if (word & 0xFF) as u8 == Opcode::Function as u8 {
            let (header, after_header) = match FunctionHeader::decode_nested(body, pos + 1) {
                Ok(v) => v,
                Err(e) => {
                    println!("{indent}{pos:>5}: <bad function header: {e}>");
                    return body.len();
                }
            };
            println!("{indent}{pos:>5}: FUNCTION argc={} nregs={} body_len={}", header.argc, header.nregs, header.body_len);
            disassemble(body, after_header, depth + 1);
            pos = after_header + header.body_len as usize;
            continue;
        }
        match Instruction::decode(body, pos) {
            Ok((instr, next)) => {
                println!("{indent}{pos:>5}: {instr:?}");
                pos = next;
            }
            Err(e) => {
                println!("{indent}{pos:>5}: <decode error: {e}>");
                return body.len();
            }
        }
    }
    pos
}
