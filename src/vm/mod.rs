//! The virtual machine: loads a compiled program, maintains a call stack of
//! register frames, and interprets bytecode to a final value.

mod frame;

use std::collections::HashMap;
use std::rc::Rc;

use crate::bytecode::{ConstKind, FunctionHeader, Instruction, Opcode, Program, ResolvedSymbol, UpvalDesc};
use crate::config::VmConfig;
use crate::error::RuntimeError;
use crate::value::function::{self, Function, NativeFn};
use crate::value::{compare_values, values_equal, Value};

use frame::{Frame, FrameState};

/// Global table entry: `None` marks a declared-but-unresolved stub
/// (installed by `SYMSTUB` load-time resolution or a forward `LDSYM`),
/// `Some` a bound value. GLBVAL may only ever move an entry from missing/
/// `None` to `Some` once (spec.md: "attempting to install over an
/// already-defined global is a runtime error").
pub struct Vm {
    globals: HashMap<String, Option<Value>>,
    frames: Vec<Frame>,
    config: VmConfig,
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self { globals: HashMap::new(), frames: Vec::new(), config }
    }

    /// Binds a host-provided native callable into the global table before
    /// or after loading a program (spec.md's "add-cfuncs").
    pub fn bind_native(&mut self, name: &str, f: NativeFn) {
        let func = function::new_native(f, Some(name.to_string()));
        self.globals.insert(name.to_string(), Some(Value::Function(func)));
    }

    /// Binds a host-provided constant value into the global table
    /// (spec.md's "add-values").
    pub fn bind_value(&mut self, name: &str, value: Value) {
        self.globals.insert(name.to_string(), Some(value));
    }

    /// Runs a top-level program to completion: load-time symbol
    /// resolution, then the fetch-decode-execute loop until the outermost
    /// frame returns.
    pub fn run(&mut self, program: Rc<Program>, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let span = tracing::info_span!("vm.execute");
        let _enter = span.enter();
        {
            let globals = &mut self.globals;
            program.ensure_resolved(|name| {
                globals.entry(name.to_string()).or_insert(None);
            });
        }
        let nregs = program.header.nregs as usize;
        self.check_register_budget(program.header.nregs)?;
        self.frames.push(Frame::new(program, 0, nregs, args, None, Some("<top-level>".to_string()), None));
        self.execute().inspect_err(|e| tracing::debug!(address = e.address, message = %e.message, "runtime error"))
    }

    /// Guards against bytecode compiled against a looser `CompilerConfig`
    /// than this VM accepts (spec.md invariant: `argc <= nregs <=
    /// max_registers`); the compiler already enforces this for bytecode it
    /// produces itself, but a loaded program may come from anywhere.
    fn check_register_budget(&self, nregs: u16) -> Result<(), RuntimeError> {
        if nregs > self.config.max_registers {
            return Err(self.fault(format!(
                "function requires {nregs} registers, exceeding this VM's configured maximum of {}",
                self.config.max_registers
            )));
        }
        Ok(())
    }

    fn fault(&self, message: impl Into<String>) -> RuntimeError {
        if let Some(f) = self.frames.last() {
            f.state.set(FrameState::Error);
        }
        let address = self.frames.last().map(|f| f.ip).unwrap_or(0);
        let stack_trace = self
            .frames
            .iter()
            .rev()
            .map(|f| f.name.clone().unwrap_or_else(|| "<anonymous>".to_string()))
            .collect();
        RuntimeError::new(message, address, stack_trace)
    }

    fn execute(&mut self) -> Result<Value, RuntimeError> {
        loop {
            let frame = self.frames.last().expect("execute called with no active frame");
            let word = frame.program.body[frame.ip];
            if (word & 0xFF) as u8 == Opcode::Function as u8 {
                self.skip_nested_function()?;
                continue;
            }
            let (instr, next_ip) =
                Instruction::decode(&frame.program.body, frame.ip).map_err(|e| self.fault(e.to_string()))?;
            tracing::trace!(ip = frame.ip, ?instr, "dispatch");
            self.frames.last_mut().unwrap().ip = next_ip;
            if let Some(result) = self.exec_instr(instr)? {
                return Ok(result);
            }
        }
    }

    /// Straight-line execution must never fall into a nested function's
    /// body — it is only entered via `CALL` targeting its own header. Skip
    /// the marker, its header, and its whole body.
    fn skip_nested_function(&mut self) -> Result<(), RuntimeError> {
        let frame = self.frames.last_mut().unwrap();
        let (header, after_header) = FunctionHeader::decode_nested(&frame.program.body, frame.ip + 1)
            .map_err(|e| RuntimeError::new(e.to_string(), frame.ip, Vec::new()))?;
        frame.ip = after_header + header.body_len as usize;
        Ok(())
    }

    /// Executes one already-decoded instruction against the top frame.
    /// Returns `Some(value)` only when the outermost frame has returned.
    fn exec_instr(&mut self, instr: Instruction) -> Result<Option<Value>, RuntimeError> {
        use Instruction as I;
        match instr {
            I::Add { a, b, c } => self.arith(a, b, c, |x, y| x.wrapping_add(y), |x, y| x + y)?,
            I::Sub { a, b, c } => self.arith(a, b, c, |x, y| x.wrapping_sub(y), |x, y| x - y)?,
            I::Mul { a, b, c } => self.arith(a, b, c, |x, y| x.wrapping_mul(y), |x, y| x * y)?,
            I::Div { a, b, c } => self.div(a, b, c)?,
            I::Mod { a, b, c } => self.modulo(a, b, c)?,
            I::Eq { a, b, c } => {
                let r = values_equal(self.reg(b), self.reg(c));
                *self.reg_mut(a) = Value::Bool(r);
            }
            I::Ne { a, b, c } => {
                let r = !values_equal(self.reg(b), self.reg(c));
                *self.reg_mut(a) = Value::Bool(r);
            }
            I::Lt { a, b, c } => self.compare(a, b, c, std::cmp::Ordering::is_lt)?,
            I::Le { a, b, c } => self.compare(a, b, c, std::cmp::Ordering::is_le)?,
            I::Gt { a, b, c } => self.compare(a, b, c, std::cmp::Ordering::is_gt)?,
            I::Ge { a, b, c } => self.compare(a, b, c, std::cmp::Ordering::is_ge)?,
            I::And { a, b, c } => self.bitwise(a, b, c, |x, y| x & y)?,
            I::Or { a, b, c } => self.bitwise(a, b, c, |x, y| x | y)?,
            I::Xor { a, b, c } => self.bitwise(a, b, c, |x, y| x ^ y)?,
            I::Shl { a, b, c } => self.bitwise(a, b, c, |x, y| x.wrapping_shl(y as u32 & 63))?,
            I::Shr { a, b, c } => self.bitwise(a, b, c, |x, y| x.wrapping_shr(y as u32 & 63))?,
            I::Neg { a, b } => self.neg(a, b)?,
            I::BitNot { a, b } => self.bitnot(a, b)?,
            I::LogNot { a, b } => {
                let r = !self.reg(b).is_truthy();
                *self.reg_mut(a) = Value::Bool(r);
            }
            I::TypeOf { a, b } => {
                let name = self.reg(b).type_name();
                *self.reg_mut(a) = Value::new_string(name.as_bytes().to_vec());
            }
            I::SizeOf { a, b } => self.sizeof(a, b)?,
            I::NthArg { a, b } => self.nth_arg(a, b)?,
            I::Concat { a, b, c } => self.concat(a, b, c)?,
            I::Inc { a } => self.incdec(a, 1)?,
            I::Dec { a } => self.incdec(a, -1)?,
            I::Call { a, b, argregs } => return self.call(a, b, &argregs),
            I::Ret { a } => return self.ret(a),
            I::Jmp { disp } => self.jump(disp),
            I::Jze { a, disp } => {
                if !self.reg(a).is_truthy() {
                    self.jump(disp);
                }
            }
            I::Jnz { a, disp } => {
                if self.reg(a).is_truthy() {
                    self.jump(disp);
                }
            }
            I::LdConst { a, kind } => {
                let v = match kind {
                    ConstKind::Nil => Value::Nil,
                    ConstKind::True => Value::Bool(true),
                    ConstKind::False => Value::Bool(false),
                };
                *self.reg_mut(a) = v;
            }
            I::LdInt { a, value } => *self.reg_mut(a) = Value::Int(value),
            I::LdFloat { a, value } => *self.reg_mut(a) = Value::Float(value),
            I::LdSym { a, symidx } => self.ldsym(a, symidx)?,
            I::Mov { a, b } => {
                let v = self.reg(b).clone();
                *self.reg_mut(a) = v;
            }
            I::Argv { a } => {
                let args = self.frames.last().unwrap().args.clone();
                let arr = Value::new_array();
                if let Value::Array(cell) = &arr {
                    let mut arr_ref = cell.borrow_mut();
                    for v in args {
                        arr_ref.push(v);
                    }
                }
                *self.reg_mut(a) = arr;
            }
            I::NewArr { a } => *self.reg_mut(a) = Value::new_array(),
            I::NewHash { a } => *self.reg_mut(a) = Value::new_hashmap(),
            I::IdxGet { a, b, c } => self.idx_get(a, b, c)?,
            I::IdxSet { a, b, c } => self.idx_set(a, b, c)?,
            I::ArrPush { a, b } => self.arr_push(a, b)?,
            I::GlbVal { a, name } => self.glbval(a, &name)?,
            I::Closure { a, upvals } => self.make_closure(a, &upvals)?,
            I::LdUpval { a, idx } => self.ld_upvalue(a, idx)?,
            I::Method { .. } | I::PropGet { .. } | I::PropSet { .. } => {
                return Err(self.fault("method and property access are not supported"));
            }
        }
        Ok(None)
    }

    fn reg(&self, idx: u8) -> &Value {
        &self.frames.last().unwrap().regs[idx as usize]
    }

    fn reg_mut(&mut self, idx: u8) -> &mut Value {
        &mut self.frames.last_mut().unwrap().regs[idx as usize]
    }

    fn jump(&mut self, disp: i32) {
        let frame = self.frames.last_mut().unwrap();
        frame.ip = (frame.ip as i64 + disp as i64) as usize;
    }

    fn arith(&mut self, a: u8, b: u8, c: u8, int_op: impl Fn(i64, i64) -> i64, float_op: impl Fn(f64, f64) -> f64) -> Result<(), RuntimeError> {
        let (left, right) = (self.reg(b).clone(), self.reg(c).clone());
        let result = match (&left, &right) {
            (Value::Int(x), Value::Int(y)) => Value::Int(int_op(*x, *y)),
            _ => {
                let (x, y) = (
                    left.as_number().ok_or_else(|| self.fault(format!("arithmetic operator requires number operands, got '{}'", left.type_name())))?,
                    right.as_number().ok_or_else(|| self.fault(format!("arithmetic operator requires number operands, got '{}'", right.type_name())))?,
                );
                Value::Float(float_op(x, y))
            }
        };
        *self.reg_mut(a) = result;
        Ok(())
    }

    fn div(&mut self, a: u8, b: u8, c: u8) -> Result<(), RuntimeError> {
        let (left, right) = (self.reg(b).clone(), self.reg(c).clone());
        let result = match (&left, &right) {
            (Value::Int(_), Value::Int(0)) => return Err(self.fault("division by zero")),
            (Value::Int(x), Value::Int(y)) => Value::Int(x.wrapping_div(*y)),
            _ => {
                let x = left.as_number().ok_or_else(|| self.fault(format!("arithmetic operator requires number operands, got '{}'", left.type_name())))?;
                let y = right.as_number().ok_or_else(|| self.fault(format!("arithmetic operator requires number operands, got '{}'", right.type_name())))?;
                Value::Float(x / y)
            }
        };
        *self.reg_mut(a) = result;
        Ok(())
    }

    fn modulo(&mut self, a: u8, b: u8, c: u8) -> Result<(), RuntimeError> {
        let (left, right) = (self.reg(b).clone(), self.reg(c).clone());
        let (x, y) = match (&left, &right) {
            (Value::Int(x), Value::Int(y)) => (*x, *y),
            _ => return Err(self.fault("modulo requires integer operands")),
        };
        if y == 0 {
            return Err(self.fault("modulo by zero"));
        }
        *self.reg_mut(a) = Value::Int(x.wrapping_rem(y));
        Ok(())
    }

    fn compare(&mut self, a: u8, b: u8, c: u8, test: impl Fn(std::cmp::Ordering) -> bool) -> Result<(), RuntimeError> {
        let (left, right) = (self.reg(b).clone(), self.reg(c).clone());
        let ord = compare_values(&left, &right)
            .ok_or_else(|| self.fault(format!("cannot compare values of type '{}' and '{}'", left.type_name(), right.type_name())))?;
        *self.reg_mut(a) = Value::Bool(test(ord));
        Ok(())
    }

    fn bitwise(&mut self, a: u8, b: u8, c: u8, op: impl Fn(i64, i64) -> i64) -> Result<(), RuntimeError> {
        let (left, right) = (self.reg(b).clone(), self.reg(c).clone());
        let (x, y) = match (&left, &right) {
            (Value::Int(x), Value::Int(y)) => (*x, *y),
            _ => return Err(self.fault("bitwise operator requires integer operands")),
        };
        *self.reg_mut(a) = Value::Int(op(x, y));
        Ok(())
    }

    fn neg(&mut self, a: u8, b: u8) -> Result<(), RuntimeError> {
        let v = match self.reg(b) {
            Value::Int(x) => Value::Int(x.wrapping_neg()),
            Value::Float(x) => Value::Float(-x),
            other => return Err(self.fault(format!("cannot negate a '{}' value", other.type_name()))),
        };
        *self.reg_mut(a) = v;
        Ok(())
    }

    fn bitnot(&mut self, a: u8, b: u8) -> Result<(), RuntimeError> {
        let v = match self.reg(b) {
            Value::Int(x) => Value::Int(!x),
            other => return Err(self.fault(format!("bitwise not requires an integer operand, got '{}'", other.type_name()))),
        };
        *self.reg_mut(a) = v;
        Ok(())
    }

    fn sizeof(&mut self, a: u8, b: u8) -> Result<(), RuntimeError> {
        let v = match self.reg(b) {
            Value::Str(s) => Value::Int(s.len() as i64),
            Value::Array(arr) => Value::Int(arr.borrow().len() as i64),
            Value::HashMap(h) => Value::Int(h.borrow().len() as i64),
            other => return Err(self.fault(format!("sizeof is not supported for type '{}'", other.type_name()))),
        };
        *self.reg_mut(a) = v;
        Ok(())
    }

    fn nth_arg(&mut self, a: u8, b: u8) -> Result<(), RuntimeError> {
        let idx = match self.reg(b) {
            Value::Int(i) => *i,
            other => return Err(self.fault(format!("argument index must be an integer, got '{}'", other.type_name()))),
        };
        let args = &self.frames.last().unwrap().args;
        let v = if idx < 0 || idx as usize >= args.len() { Value::Nil } else { args[idx as usize].clone() };
        *self.reg_mut(a) = v;
        Ok(())
    }

    fn concat(&mut self, a: u8, b: u8, c: u8) -> Result<(), RuntimeError> {
        let (left, right) = (self.reg(b).clone(), self.reg(c).clone());
        let result = match (&left, &right) {
            (Value::Str(x), Value::Str(y)) => Value::Str(Rc::new(x.concat(y))),
            _ => return Err(self.fault(format!("'..' requires two strings, got '{}' and '{}'", left.type_name(), right.type_name()))),
        };
        *self.reg_mut(a) = result;
        Ok(())
    }

    fn incdec(&mut self, a: u8, delta: i64) -> Result<(), RuntimeError> {
        let v = match self.reg(a) {
            Value::Int(x) => Value::Int(x.wrapping_add(delta)),
            Value::Float(x) => Value::Float(x + delta as f64),
            other => return Err(self.fault(format!("cannot increment or decrement a '{}' value", other.type_name()))),
        };
        *self.reg_mut(a) = v;
        Ok(())
    }

    fn ldsym(&mut self, a: u8, symidx: u16) -> Result<(), RuntimeError> {
        let program = self.frames.last().unwrap().program.clone();
        let sym = program.resolved_symbol(symidx as usize);
        let v = match sym {
            ResolvedSymbol::Str(s) => Value::Str(s),
            ResolvedSymbol::Func(f) => Value::Function(f),
            ResolvedSymbol::Global(name) => match self.globals.get(&name) {
                Some(Some(v)) => v.clone(),
                _ => return Err(self.fault(format!("undefined global '{name}'"))),
            },
        };
        *self.reg_mut(a) = v;
        Ok(())
    }

    fn glbval(&mut self, a: u8, name: &str) -> Result<(), RuntimeError> {
        let v = self.reg(a).clone();
        match self.globals.get(name) {
            Some(Some(_)) => Err(self.fault(format!("global '{name}' is already defined"))),
            _ => {
                self.globals.insert(name.to_string(), Some(v));
                Ok(())
            }
        }
    }

    fn idx_get(&mut self, a: u8, b: u8, c: u8) -> Result<(), RuntimeError> {
        let (obj, key) = (self.reg(b).clone(), self.reg(c).clone());
        let v = match &obj {
            Value::Str(s) => {
                let idx = match &key {
                    Value::Int(i) => *i,
                    other => return Err(self.fault(format!("string index must be an integer, got '{}'", other.type_name()))),
                };
                match s.byte_at(idx) {
                    Some(b) => Value::new_string(vec![b]),
                    None => return Err(self.fault("string index out of bounds")),
                }
            }
            Value::Array(arr) => {
                let idx = match &key {
                    Value::Int(i) => *i,
                    other => return Err(self.fault(format!("array index must be an integer, got '{}'", other.type_name()))),
                };
                arr.borrow().get(idx)
            }
            Value::HashMap(h) => h.borrow().get(&key),
            other => return Err(self.fault(format!("cannot index into a '{}' value", other.type_name()))),
        };
        *self.reg_mut(a) = v;
        Ok(())
    }

    fn idx_set(&mut self, a: u8, b: u8, c: u8) -> Result<(), RuntimeError> {
        let (key, value) = (self.reg(b).clone(), self.reg(c).clone());
        let obj = self.reg(a).clone();
        match &obj {
            Value::Str(_) => return Err(self.fault("cannot assign into a string")),
            Value::Array(arr) => {
                let idx = match &key {
                    Value::Int(i) => *i,
                    other => return Err(self.fault(format!("array index must be an integer, got '{}'", other.type_name()))),
                };
                arr.borrow_mut().set(idx, value);
            }
            Value::HashMap(h) => h.borrow_mut().set(key, value),
            other => return Err(self.fault(format!("cannot index into a '{}' value", other.type_name()))),
        }
        Ok(())
    }

    fn arr_push(&mut self, a: u8, b: u8) -> Result<(), RuntimeError> {
        let value = self.reg(b).clone();
        match self.reg(a) {
            Value::Array(arr) => {
                arr.borrow_mut().push(value);
                Ok(())
            }
            other => Err(self.fault(format!("cannot push onto a '{}' value", other.type_name()))),
        }
    }

    fn make_closure(&mut self, a: u8, upvals: &[UpvalDesc]) -> Result<(), RuntimeError> {
        let proto = self.reg(a).clone();
        let Value::Function(f) = &proto else {
            return Err(self.fault("CLOSURE operand is not a function"));
        };
        let (program, offset, name) = match &**f {
            Function::Script(s) => (s.program.clone(), s.offset, s.name.clone()),
            _ => return Err(self.fault("CLOSURE operand is not a script function")),
        };
        let frame = self.frames.last().unwrap();
        let mut slots = Vec::with_capacity(upvals.len());
        for uv in upvals {
            let v = match uv {
                UpvalDesc::Local(idx) => frame.regs[*idx as usize].clone(),
                UpvalDesc::Outer(idx) => match &frame.closure {
                    Some(c) => match &**c {
                        Function::Closure(cf) => cf.upvalues.borrow()[*idx as usize].clone(),
                        _ => return Err(self.fault("OUTER upvalue capture outside of a closure frame")),
                    },
                    None => return Err(self.fault("OUTER upvalue capture outside of a closure frame")),
                },
            };
            slots.push(v);
        }
        *self.reg_mut(a) = Value::Function(function::new_closure(program, offset, name, slots));
        Ok(())
    }

    fn ld_upvalue(&mut self, a: u8, idx: u8) -> Result<(), RuntimeError> {
        let frame = self.frames.last().unwrap();
        let v = match &frame.closure {
            Some(c) => match &**c {
                Function::Closure(cf) => cf.upvalues.borrow()[idx as usize].clone(),
                _ => return Err(self.fault("LDUPVAL outside of a closure")),
            },
            None => return Err(self.fault("LDUPVAL outside of a closure")),
        };
        *self.reg_mut(a) = v;
        Ok(())
    }

    fn call(&mut self, a: u8, b: u8, argregs: &[u8]) -> Result<Option<Value>, RuntimeError> {
        let frame = self.frames.last().unwrap();
        let callee = frame.regs[b as usize].clone();
        let arg_vals: Vec<Value> = argregs.iter().map(|&r| frame.regs[r as usize].clone()).collect();

        let Value::Function(f) = callee else {
            return Err(self.fault(format!("attempt to call a '{}' value", callee.type_name())));
        };
        if matches!(&*f, Function::Script(_) | Function::Closure(_) | Function::Program(_))
            && self.frames.len() >= self.config.max_call_depth
        {
            return Err(self.fault(format!("call stack exceeded maximum depth of {}", self.config.max_call_depth)));
        }
        tracing::trace!(callee = f.name().unwrap_or("<anonymous>"), argc = arg_vals.len(), depth = self.frames.len(), "call");
        match &*f {
            Function::Native(nf) => {
                let result = (nf.ptr)(&arg_vals).map_err(|e| self.fault(e.message))?;
                *self.reg_mut(a) = result;
                Ok(None)
            }
            Function::Script(sf) => {
                let program = sf.program.upgrade().ok_or_else(|| self.fault("script function's program has been dropped"))?;
                self.push_callee_frame(program, sf.offset, arg_vals, a, sf.name.clone(), None)?;
                Ok(None)
            }
            Function::Closure(cf) => {
                let program = cf.program.upgrade().ok_or_else(|| self.fault("closure's program has been dropped"))?;
                self.push_callee_frame(program, cf.offset, arg_vals, a, cf.name.clone(), Some(f.clone()))?;
                Ok(None)
            }
            Function::Program(p) => {
                let program = p.clone();
                self.check_register_budget(program.header.nregs)?;
                let nregs = program.header.nregs as usize;
                self.frames.last().unwrap().state.set(FrameState::Called);
                self.frames.push(Frame::new(program, 0, nregs, arg_vals, Some(a), Some("<top-level>".to_string()), None));
                Ok(None)
            }
        }
    }

    fn push_callee_frame(
        &mut self,
        program: Rc<Program>,
        offset: usize,
        args: Vec<Value>,
        dest: u8,
        name: Option<String>,
        closure: Option<Rc<Function>>,
    ) -> Result<(), RuntimeError> {
        let (header, body_start) = FunctionHeader::decode_nested(&program.body, offset)
            .map_err(|e| self.fault(e.to_string()))?;
        self.check_register_budget(header.nregs)?;
        self.frames.last().unwrap().state.set(FrameState::Called);
        self.frames.push(Frame::new(program, body_start, header.nregs as usize, args, Some(dest), name, closure));
        Ok(())
    }

    fn ret(&mut self, a: u8) -> Result<Option<Value>, RuntimeError> {
        let frame = self.frames.pop().expect("RET with no active frame");
        frame.state.set(FrameState::Returned);
        tracing::trace!(caller = frame.name.as_deref().unwrap_or("<anonymous>"), depth = self.frames.len(), "return");
        let value = frame.regs[a as usize].clone();
        if let Some(caller) = self.frames.last_mut() {
            caller.state.set(FrameState::Running);
        }
        match frame.caller_dest {
            None => Ok(Some(value)),
            Some(dest) => {
                *self.reg_mut(dest) = value;
                Ok(None)
            }
        }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::parser::Parser;

    fn run_source(src: &str) -> Value {
        let ast = Parser::parse_program(src).expect("parse");
        let program = Compiler::compile(&ast).expect("compile");
        let mut vm = Vm::new();
        vm.bind_native("array", Rc::new(|_args: &[Value]| Ok(Value::new_array())));
        vm.run(program, Vec::new()).expect("run")
    }

    #[test]
    fn arithmetic_precedence() {
        assert_eq!(run_source("return 1 + 2 * 3;"), Value::Int(7));
    }

    #[test]
    fn string_concat_assignment() {
        let v = run_source(r#"var s = "foo"; s = s .. "bar"; return s;"#);
        assert_eq!(v, Value::new_string(b"foobar".to_vec()));
    }

    #[test]
    fn closures_capture_by_local_upvalue() {
        let v = run_source("function make(x) { return function() { return x; }; } var f = make(42); return f();");
        assert_eq!(v, Value::Int(42));
    }

    #[test]
    fn array_indexing_and_sizeof() {
        let v = run_source("var a = array(); a[0] = 10; a[1] = 20; return sizeof a + a[0] + a[1];");
        assert_eq!(v, Value::Int(32));
    }

    #[test]
    fn if_else_branches() {
        let v = run_source(r#"if (0 == 0) { return "y"; } else { return "n"; }"#);
        assert_eq!(v, Value::new_string(b"y".to_vec()));
    }

    #[test]
    fn forward_reference_via_symbol_stub() {
        let v = run_source("function f() { return g() + 1; } function g() { return 10; } return f();");
        assert_eq!(v, Value::Int(11));
    }
}
