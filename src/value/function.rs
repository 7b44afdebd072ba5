//! Function object: native, script, top-level program, or closure.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::object::{track_alloc, track_free};
use super::Value;
use crate::bytecode::Program;
use crate::error::RuntimeError;

/// Signature for a host-provided native function.
pub type NativeFn = Rc<dyn Fn(&[Value]) -> Result<Value, RuntimeError>>;

/// A function backed by a native (host) implementation.
pub struct NativeFunction {
    pub ptr: NativeFn,
    pub name: Option<String>,
}

/// A function whose body lives inside some program's bytecode. Holds a
/// *weak* reference to the owning program, because the program's own
/// symbol table is what eventually holds these — a strong reference here
/// would make every top-level program immortal (spec.md explicitly calls
/// out the weak pointer for this reason).
pub struct ScriptFunction {
    pub program: Weak<Program>,
    pub offset: usize,
    pub name: Option<String>,
}

/// A script function plus its captured upvalue slots.
pub struct ClosureFunction {
    pub program: Weak<Program>,
    pub offset: usize,
    pub name: Option<String>,
    pub upvalues: RefCell<Vec<Value>>,
}

pub enum Function {
    Native(NativeFunction),
    Script(ScriptFunction),
    /// A top-level compiled program: owns its bytecode and symbol table.
    Program(Rc<Program>),
    Closure(ClosureFunction),
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Function::Native(_) => "Native",
            Function::Script(_) => "Script",
            Function::Program(_) => "Program",
            Function::Closure(_) => "Closure",
        };
        f.debug_struct(kind).field("name", &self.name()).finish()
    }
}

impl Function {
    pub fn name(&self) -> Option<&str> {
        match self {
            Function::Native(f) => f.name.as_deref(),
            Function::Script(f) => f.name.as_deref(),
            Function::Closure(f) => f.name.as_deref(),
            Function::Program(_) => Some("<top-level>"),
        }
    }

    pub fn as_script(&self) -> Option<(&Weak<Program>, usize)> {
        match self {
            Function::Script(f) => Some((&f.program, f.offset)),
            Function::Closure(f) => Some((&f.program, f.offset)),
            _ => None,
        }
    }
}

impl Drop for Function {
    fn drop(&mut self) {
        track_free();
    }
}

pub fn new_native(ptr: NativeFn, name: Option<String>) -> Rc<Function> {
    track_alloc();
    Rc::new(Function::Native(NativeFunction { ptr, name }))
}

pub fn new_script(program: Weak<Program>, offset: usize, name: Option<String>) -> Rc<Function> {
    track_alloc();
    Rc::new(Function::Script(ScriptFunction { program, offset, name }))
}

pub fn new_program(program: Rc<Program>) -> Rc<Function> {
    track_alloc();
    Rc::new(Function::Program(program))
}

pub fn new_closure(
    program: Weak<Program>,
    offset: usize,
    name: Option<String>,
    upvalues: Vec<Value>,
) -> Rc<Function> {
    track_alloc();
    Rc::new(Function::Closure(ClosureFunction {
        program,
        offset,
        name,
        upvalues: RefCell::new(upvalues),
    }))
}

/// Equality policy (spec.md §3, resolved Open Question in DESIGN.md):
/// native functions compare by host-pointer; script (non-closure) functions
/// by bytecode pointer (program identity + offset); closures compare by
/// object identity.
pub fn function_eq(a: &Rc<Function>, b: &Rc<Function>) -> bool {
    match (&**a, &**b) {
        (Function::Closure(_), Function::Closure(_)) => Rc::ptr_eq(a, b),
        (Function::Native(na), Function::Native(nb)) => Rc::ptr_eq(&na.ptr, &nb.ptr),
        (Function::Script(sa), Function::Script(sb)) => {
            sa.offset == sb.offset && sa.program.ptr_eq(&sb.program)
        }
        (Function::Program(pa), Function::Program(pb)) => Rc::ptr_eq(pa, pb),
        _ => false,
    }
}

/// Hash policy mirroring `function_eq`: native -> host-pointer hash,
/// script (non-closure) -> bytecode-offset hash, closure -> identity hash.
pub fn function_hash(f: &Rc<Function>) -> u64 {
    match &**f {
        Function::Native(n) => Rc::as_ptr(&n.ptr) as *const () as usize as u64,
        Function::Script(s) => {
            let prog_addr = s.program.upgrade().map(|p| Rc::as_ptr(&p) as usize).unwrap_or(0);
            (prog_addr as u64).wrapping_mul(31).wrapping_add(s.offset as u64)
        }
        Function::Program(p) => Rc::as_ptr(p) as usize as u64,
        Function::Closure(_) => Rc::as_ptr(f) as usize as u64,
    }
}
