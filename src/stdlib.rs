//! The standard library: a fixed table of native functions bound into a
//! [`Vm`]'s globals before running a program (spec.md §9, "the standard
//! library is not privileged. it is exactly the set of natives a host
//! would register via `bind_native`").

use std::io::Write as _;
use std::rc::Rc;

use itertools::Itertools;

use crate::error::RuntimeError;
use crate::format;
use crate::value::{SpnArray, SpnHashMap, Value};
use crate::vm::Vm;

/// Registers every standard-library native into `vm`'s global table.
/// Idempotent to call on a fresh `Vm`; calling it twice raises the same
/// "global is already defined" runtime error a script would get from
/// redeclaring one of these names, since `GlbVal`/`bind_native` share the
/// same table.
pub fn register(vm: &mut Vm) {
    vm.bind_native("print", Rc::new(native_print));
    vm.bind_native("printf", Rc::new(native_printf));
    vm.bind_native("fmtstring", Rc::new(native_fmtstring));
    vm.bind_native("getenv", Rc::new(native_getenv));
    vm.bind_native("typeof", Rc::new(native_typeof));
    vm.bind_native("sizeof", Rc::new(native_sizeof));
    vm.bind_native("array", Rc::new(native_array));
    vm.bind_native("hashmap", Rc::new(native_hashmap));
}

fn arg_error(index: usize, message: impl Into<String>) -> RuntimeError {
    RuntimeError::new(format!("argument {index}: {}", message.into()), 0, Vec::new())
}

fn expect_str(args: &[Value], index: usize) -> Result<std::borrow::Cow<'_, str>, RuntimeError> {
    match args.get(index) {
        Some(Value::Str(s)) => Ok(s.to_string_lossy()),
        Some(other) => Err(arg_error(index, format!("expected a string, got '{}'", other.type_name()))),
        None => Err(arg_error(index, "missing")),
    }
}

fn run_format(args: &[Value]) -> Result<String, RuntimeError> {
    let fmt = expect_str(args, 0)?.into_owned();
    format::format(&fmt, &args[1..]).map_err(|e| RuntimeError::new(e.to_string(), 0, Vec::new()))
}

/// `print(...)`: writes each argument's display form separated by spaces,
/// newline-terminated, to stdout. Returns the number of arguments printed.
fn native_print(args: &[Value]) -> Result<Value, RuntimeError> {
    let line = args.iter().map(display).join(" ");
    let mut stdout = std::io::stdout();
    let _ = writeln!(stdout, "{line}");
    Ok(Value::Int(args.len() as i64))
}

/// `printf(fmt, ...)`: formats and writes to stdout, no trailing newline.
/// Returns the number of bytes written.
fn native_printf(args: &[Value]) -> Result<Value, RuntimeError> {
    let s = run_format(args)?;
    let mut stdout = std::io::stdout();
    let _ = stdout.write_all(s.as_bytes());
    Ok(Value::Int(s.len() as i64))
}

/// `fmtstring(fmt, ...)`: formats into a script string without writing
/// anywhere.
fn native_fmtstring(args: &[Value]) -> Result<Value, RuntimeError> {
    let s = run_format(args)?;
    Ok(Value::new_string(s.into_bytes()))
}

/// `getenv(name)`: the named environment variable, or `nil` if unset.
fn native_getenv(args: &[Value]) -> Result<Value, RuntimeError> {
    let name = expect_str(args, 0)?;
    match std::env::var(name.as_ref()) {
        Ok(v) => Ok(Value::new_string(v.into_bytes())),
        Err(_) => Ok(Value::Nil),
    }
}

/// `typeof(v)`: the type name, as a string (the VM's `TYPEOF` opcode
/// covers this in compiled code; exposed here too for native callers that
/// go through `Vm::bind_native`/`bind_value` without compiling a script).
fn native_typeof(args: &[Value]) -> Result<Value, RuntimeError> {
    let v = args.first().ok_or_else(|| arg_error(0, "missing"))?;
    Ok(Value::new_string(v.type_name().as_bytes().to_vec()))
}

/// `sizeof(v)`: length of a string, array, or hashmap.
fn native_sizeof(args: &[Value]) -> Result<Value, RuntimeError> {
    let v = args.first().ok_or_else(|| arg_error(0, "missing"))?;
    match v {
        Value::Str(s) => Ok(Value::Int(s.len() as i64)),
        Value::Array(a) => Ok(Value::Int(a.borrow().len() as i64)),
        Value::HashMap(h) => Ok(Value::Int(h.borrow().len() as i64)),
        other => Err(arg_error(0, format!("sizeof is not supported for type '{}'", other.type_name()))),
    }
}

/// `array()`: a fresh empty array, for scripts (the unit tests already
/// rely on this native existing; spec.md's array literal syntax desugars
/// to `NEWARR` directly, but an explicit constructor is still useful for
/// e.g. `array()` called as a value rather than written as `{}`).
fn native_array(_args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Array(Rc::new(std::cell::RefCell::new(SpnArray::new()))))
}

/// `hashmap()`: a fresh empty hashmap.
fn native_hashmap(_args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::HashMap(Rc::new(std::cell::RefCell::new(SpnHashMap::new()))))
}

fn display(v: &Value) -> String {
    match v {
        Value::Str(s) => s.to_string_lossy().into_owned(),
        Value::Nil => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Array(_) => "<array>".to_string(),
        Value::HashMap(_) => "<hashmap>".to_string(),
        Value::Function(_) => "<function>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::parser::Parser;

    fn run_with_stdlib(src: &str) -> Value {
        let ast = Parser::parse_program(src).expect("parse");
        let program = Compiler::compile(&ast).expect("compile");
        let mut vm = Vm::new();
        register(&mut vm);
        vm.run(program, Vec::new()).expect("run")
    }

    #[test]
    fn fmtstring_formats_from_script() {
        let v = run_with_stdlib(r#"return fmtstring("%d-%s", 7, "x");"#);
        assert_eq!(v, Value::new_string(b"7-x".to_vec()));
    }

    #[test]
    fn getenv_returns_nil_for_unset_variable() {
        let v = run_with_stdlib(r#"return getenv("SPARKLING_DEFINITELY_UNSET_VAR_XYZ");"#);
        assert_eq!(v, Value::Nil);
    }

    #[test]
    fn typeof_and_sizeof_operators_match_their_native_fallbacks() {
        // `sizeof`/`typeof` are reserved words, so scripts reach these through
        // the SIZEOF/TYPEOF instructions (see vm::tests), not by calling a
        // global of that name. The natives registered here exist for host
        // code that fetches them as first-class values instead.
        assert_eq!(native_typeof(&[Value::new_array()]).unwrap(), Value::new_string(b"array".to_vec()));
        let a = Value::new_array();
        if let Value::Array(cell) = &a {
            cell.borrow_mut().push(Value::Int(1));
        }
        assert_eq!(native_sizeof(&[a]).unwrap(), Value::Int(1));
    }
}
