//! Per-function compile-time scope state: variable stack, register
//! allocator, upvalue table, and break/continue jump lists.

use crate::bytecode::UpvalDesc;
use crate::error::SemanticError;

struct VarSlot {
    name: String,
    reg: u8,
    is_const: bool,
}

/// Pending jump sites for one enclosing loop, patched once its exit and
/// continue targets are known.
#[derive(Default)]
pub struct LoopCtx {
    pub break_jumps: Vec<usize>,
    pub continue_jumps: Vec<usize>,
}

/// A value produced by compiling an expression: the register holding it,
/// and whether that register is a fresh temporary the caller may clobber
/// and free, or someone else's (a variable's) register that must be left
/// alone.
#[derive(Clone, Copy)]
pub struct RegVal {
    pub reg: u8,
    pub owned: bool,
}

/// Where an identifier resolved to.
pub enum VarRef {
    Local(u8),
    Upvalue(u8),
    Global,
}

/// Scope state for one function body (the top-level program counts as
/// one, per spec.md's "nested functions save and restore this state").
pub struct FuncScope {
    vars: Vec<VarSlot>,
    block_starts: Vec<usize>,
    next_reg: u8,
    max_reg: u8,
    upvalue_names: Vec<String>,
    pub upvalues: Vec<UpvalDesc>,
    loops: Vec<LoopCtx>,
    max_registers: u16,
}

impl FuncScope {
    pub fn new(max_registers: u16) -> Self {
        Self {
            vars: Vec::new(),
            block_starts: vec![0],
            next_reg: 0,
            max_reg: 0,
            upvalue_names: Vec::new(),
            upvalues: Vec::new(),
            loops: Vec::new(),
            max_registers,
        }
    }

    pub fn max_reg(&self) -> u8 {
        self.max_reg
    }

    fn find_local(&self, name: &str) -> Option<u8> {
        self.vars.iter().rev().find(|v| v.name == name).map(|v| v.reg)
    }

    fn is_const(&self, name: &str) -> bool {
        self.vars.iter().rev().find(|v| v.name == name).map(|v| v.is_const).unwrap_or(false)
    }

    pub fn enter_block(&mut self) {
        self.block_starts.push(self.vars.len());
    }

    pub fn exit_block(&mut self) {
        let n = self.block_starts.pop().expect("unbalanced block scope");
        self.vars.truncate(n);
        self.next_reg = n as u8;
    }

    pub fn enter_loop(&mut self) {
        self.loops.push(LoopCtx::default());
    }

    pub fn current_loop(&mut self) -> Option<&mut LoopCtx> {
        self.loops.last_mut()
    }

    pub fn exit_loop(&mut self) -> LoopCtx {
        self.loops.pop().expect("unbalanced loop scope")
    }

    pub fn declare_var(&mut self, name: String, is_const: bool, line: u32, what: &str) -> Result<u8, SemanticError> {
        let block_start = *self.block_starts.last().unwrap();
        if self.vars[block_start..].iter().any(|v| v.name == name) {
            return Err(SemanticError::new(format!("redeclaration of {what} '{name}' in the same scope"), line));
        }
        let reg = self.vars.len();
        if reg >= self.max_registers as usize {
            return Err(SemanticError::new(format!("function uses more than {} registers", self.max_registers), line));
        }
        let reg = reg as u8;
        self.next_reg = self.next_reg.max(reg + 1);
        self.max_reg = self.max_reg.max(self.next_reg);
        self.vars.push(VarSlot { name, reg, is_const });
        Ok(reg)
    }

    pub fn alloc_temp(&mut self, line: u32) -> Result<u8, SemanticError> {
        if self.next_reg as usize >= self.max_registers as usize {
            return Err(SemanticError::new(format!("function uses more than {} registers", self.max_registers), line));
        }
        let reg = self.next_reg;
        self.next_reg += 1;
        self.max_reg = self.max_reg.max(self.next_reg);
        Ok(reg)
    }

    pub fn free_temp(&mut self, reg: u8) {
        // Only reclaim if `reg` is genuinely the top of the temp stack and
        // not a variable's permanent slot.
        if reg + 1 == self.next_reg && reg as usize >= self.vars.len() {
            self.next_reg -= 1;
        }
    }
}

/// A stack of `FuncScope`s, one per lexically nested function currently
/// being compiled, plus the shared upvalue-chain resolution across them.
pub struct ScopeStack {
    scopes: Vec<FuncScope>,
    max_registers: u16,
}

impl ScopeStack {
    pub fn new(max_registers: u16) -> Self {
        Self { scopes: vec![FuncScope::new(max_registers)], max_registers }
    }

    pub fn push_function(&mut self) {
        self.scopes.push(FuncScope::new(self.max_registers));
    }

    pub fn pop_function(&mut self) -> FuncScope {
        self.scopes.pop().expect("unbalanced function scope")
    }

    pub fn current(&mut self) -> &mut FuncScope {
        self.scopes.last_mut().expect("no active scope")
    }

    pub fn is_top_level(&self) -> bool {
        self.scopes.len() == 1
    }

    pub fn is_const(&self, name: &str) -> bool {
        self.scopes.last().unwrap().is_const(name)
    }

    pub fn resolve(&mut self, name: &str) -> VarRef {
        let cur = self.scopes.len() - 1;
        if let Some(reg) = self.scopes[cur].find_local(name) {
            return VarRef::Local(reg);
        }
        if let Some(idx) = Self::resolve_upvalue(&mut self.scopes, cur, name) {
            return VarRef::Upvalue(idx);
        }
        VarRef::Global
    }

    /// True if `name` resolves somewhere in an enclosing function's
    /// variable stack (used to reject assignment to captured variables,
    /// since the instruction set has no "store upvalue" opcode).
    pub fn resolves_as_upvalue_only(&mut self, name: &str) -> bool {
        let cur = self.scopes.len() - 1;
        if self.scopes[cur].find_local(name).is_some() {
            return false;
        }
        Self::resolve_upvalue(&mut self.scopes, cur, name).is_some()
    }

    fn resolve_upvalue(scopes: &mut [FuncScope], idx: usize, name: &str) -> Option<u8> {
        if idx == 0 {
            return None;
        }
        if let Some(pos) = scopes[idx].upvalue_names.iter().position(|n| n == name) {
            return Some(pos as u8);
        }
        let parent = idx - 1;
        if let Some(reg) = scopes[parent].find_local(name) {
            let uv_idx = scopes[idx].upvalues.len() as u8;
            scopes[idx].upvalues.push(UpvalDesc::Local(reg));
            scopes[idx].upvalue_names.push(name.to_string());
            return Some(uv_idx);
        }
        if let Some(outer_idx) = Self::resolve_upvalue(scopes, parent, name) {
            let uv_idx = scopes[idx].upvalues.len() as u8;
            scopes[idx].upvalues.push(UpvalDesc::Outer(outer_idx));
            scopes[idx].upvalue_names.push(name.to_string());
            return Some(uv_idx);
        }
        None
    }
}
