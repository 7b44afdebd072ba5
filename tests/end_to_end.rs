//! End-to-end scenarios driven through the public API, one per spec.md's
//! §8 literal scenario list, plus a couple of natives-backed ones that
//! exercise the standard library and CLI-adjacent surface in the same way.

use sparkling::value::Value;
use sparkling::{run_source, Compiler, Parser, Vm};

#[test]
fn arithmetic_precedence_returns_seven() {
    assert_eq!(run_source("return 1 + 2 * 3;").unwrap(), Value::Int(7));
}

#[test]
fn string_concat_assignment_returns_foobar() {
    let v = run_source(r#"var s = "foo"; s = s .. "bar"; return s;"#).unwrap();
    assert_eq!(v, Value::new_string(b"foobar".to_vec()));
}

#[test]
fn closure_over_parameter_returns_captured_value() {
    let v = run_source("function make(x) { return function() { return x; }; } var f = make(42); return f();").unwrap();
    assert_eq!(v, Value::Int(42));
}

#[test]
fn array_literal_indexing_and_sizeof() {
    let ast = Parser::parse_program("var a = array(); a[0] = 10; a[1] = 20; return sizeof a + a[0] + a[1];").unwrap();
    let program = Compiler::compile(&ast).unwrap();
    let mut vm = Vm::new();
    sparkling::stdlib::register(&mut vm);
    let v = vm.run(program, Vec::new()).unwrap();
    assert_eq!(v, Value::Int(32));
}

#[test]
fn if_else_picks_the_true_branch() {
    let v = run_source(r#"if (0 == 0) { return "y"; } else { return "n"; }"#).unwrap();
    assert_eq!(v, Value::new_string(b"y".to_vec()));
}

#[test]
fn forward_reference_resolves_through_symbol_stub() {
    let v = run_source("function f() { return g() + 1; } function g() { return 10; } return f();").unwrap();
    assert_eq!(v, Value::Int(11));
}

#[test]
fn stdlib_printf_and_fmtstring_share_the_format_engine() {
    let ast = Parser::parse_program(r#"return fmtstring("%05d", 7);"#).unwrap();
    let program = Compiler::compile(&ast).unwrap();
    let mut vm = Vm::new();
    sparkling::stdlib::register(&mut vm);
    let v = vm.run(program, Vec::new()).unwrap();
    assert_eq!(v, Value::new_string(b"00007".to_vec()));
}

#[test]
fn undefined_global_is_a_runtime_error_not_a_panic() {
    let err = run_source("return undefined_name;").unwrap_err();
    assert!(err.to_string().contains("runtime error"));
}

#[test]
fn assigning_to_an_undeclared_identifier_is_a_compile_error() {
    let err = Parser::parse_program("x = 0; x = x + 1; return x;")
        .map_err(sparkling::SparklingError::from)
        .and_then(|ast| Compiler::compile(&ast).map_err(sparkling::SparklingError::from))
        .unwrap_err();
    assert!(err.to_string().contains("declare it first with 'var' or 'const'"));
}

#[test]
fn reassigning_a_declared_variable_does_not_trip_the_one_shot_global_install() {
    let v = run_source("var x = 0; x = x + 1; x = x + 1; return x;").unwrap();
    assert_eq!(v, Value::Int(2));
}

#[test]
fn redeclaring_a_global_is_a_runtime_error() {
    let src = "function f() { return 1; } function f() { return 2; } return f();";
    let err = run_source(src).unwrap_err();
    assert!(err.to_string().contains("already defined"));
}

#[test]
fn division_by_zero_is_a_runtime_error() {
    let err = run_source("return 1 / 0;").unwrap_err();
    assert!(err.to_string().contains("division by zero"));
}

#[test]
#[cfg(feature = "debug-counters")]
fn live_object_count_returns_to_baseline_after_release() {
    use sparkling::value::object::live_object_count;
    let before = live_object_count();
    let v = run_source(r#"var s = "foo"; s = s .. "bar"; return s;"#).unwrap();
    drop(v);
    assert_eq!(live_object_count(), before);
}

#[test]
fn register_budget_is_re_checked_at_load_time() {
    use sparkling::{CompilerConfig, VmConfig};
    let mut decls = String::new();
    for i in 0..20 {
        decls.push_str(&format!("var v{i} = {i};\n"));
    }
    let src = format!("{decls}return v0;");
    let ast = Parser::parse_program(&src).unwrap();
    let program = Compiler::compile_with_config(&ast, CompilerConfig { max_registers: 32 }).unwrap();
    let mut vm = Vm::with_config(VmConfig { max_registers: 8, ..VmConfig::default() });
    let err = vm.run(program, Vec::new()).unwrap_err();
    assert!(err.message.contains("exceeding this VM's configured maximum"));
}

#[test]
fn call_depth_is_bounded_by_vm_config() {
    use sparkling::VmConfig;
    let ast = Parser::parse_program("function f() { return f(); } return f();").unwrap();
    let program = Compiler::compile(&ast).unwrap();
    let mut vm = Vm::with_config(VmConfig { max_call_depth: 8, ..VmConfig::default() });
    let err = vm.run(program, Vec::new()).unwrap_err();
    assert!(err.message.contains("maximum depth"));
}
