//! AST-to-bytecode compiler.
//!
//! A single recursive walk emitting into one shared [`ProgramBuilder`] —
//! nested function bodies are written inline (`FUNCTION` marker, header
//! placeholder, body, fixup) rather than into separate buffers, since the
//! whole program shares one bytecode array and one symbol table (spec.md
//! §4.3: "the symbol table and upvalue chain persist across nested
//! functions").

mod scope;

use std::rc::Rc;

use crate::ast::{BinOp, Node, UnOp};
use crate::bytecode::{ConstKind, Instruction, Program, ProgramBuilder};
use crate::config::CompilerConfig;
use crate::error::{SemanticError, Span};
use crate::value::Value;

use scope::{RegVal, ScopeStack, VarRef};

type CResult<T> = Result<T, SemanticError>;

pub struct Compiler {
    builder: ProgramBuilder,
    scopes: ScopeStack,
}

impl Compiler {
    pub fn new() -> Self {
        Self::with_config(CompilerConfig::default())
    }

    pub fn with_config(config: CompilerConfig) -> Self {
        Self { builder: ProgramBuilder::new(), scopes: ScopeStack::new(config.max_registers) }
    }

    /// Compiles a whole program (parsed top level) into a loadable
    /// [`Program`], using the default [`CompilerConfig`].
    pub fn compile(ast: &Node) -> CResult<Rc<Program>> {
        Self::compile_with_config(ast, CompilerConfig::default())
    }

    /// Compiles a whole program under an explicit [`CompilerConfig`].
    pub fn compile_with_config(ast: &Node, config: CompilerConfig) -> CResult<Rc<Program>> {
        let span = tracing::info_span!("compile");
        let _enter = span.enter();
        let mut c = Compiler::with_config(config);
        let Node::Program(stmts) = ast else {
            return Err(SemanticError::new("top-level AST node must be a program", 0));
        };
        for stmt in stmts {
            c.compile_stmt(stmt).inspect_err(|e| tracing::debug!(line = e.line, message = %e.message, "semantic error"))?;
        }
        let nil_reg = c.scopes.current().alloc_temp(0)?;
        c.builder.emit(&Instruction::LdConst { a: nil_reg, kind: ConstKind::Nil });
        c.builder.emit(&Instruction::Ret { a: nil_reg });
        let nregs = c.scopes.current().max_reg().max(1);
        Ok(c.builder.into_program(0, nregs as u16))
    }

    fn emit(&mut self, i: Instruction) {
        self.builder.emit(&i);
    }

    // ---- statements ----

    fn compile_block(&mut self, stmts: &[Node]) -> CResult<()> {
        self.scopes.current().enter_block();
        for s in stmts {
            self.compile_stmt(s)?;
        }
        self.scopes.current().exit_block();
        Ok(())
    }

    fn compile_stmt(&mut self, node: &Node) -> CResult<()> {
        match node {
            Node::VarDecl(decls, span) => self.compile_var_decl(decls, *span, false),
            Node::ConstDecl(decls, span) => {
                let as_vars: Vec<(String, Option<Node>)> =
                    decls.iter().map(|(n, v)| (n.clone(), Some(v.clone()))).collect();
                self.compile_var_decl(&as_vars, *span, true)
            }
            Node::Block(stmts) => self.compile_block(stmts),
            Node::If { cond, then, r#else, span } => self.compile_if(cond, then, r#else.as_deref(), *span),
            Node::While { cond, body, span } => self.compile_while(cond, body, *span),
            Node::DoWhile { cond, body, span } => self.compile_do_while(cond, body, *span),
            Node::For { init, cond, incr, body, span } => {
                self.compile_for(init.as_deref(), cond.as_deref(), incr.as_deref(), body, *span)
            }
            Node::Return(value, _span) => {
                let reg = match value {
                    Some(v) => self.compile_expr(v)?,
                    None => {
                        let r = self.scopes.current().alloc_temp(node.span().line)?;
                        self.emit(Instruction::LdConst { a: r, kind: ConstKind::Nil });
                        RegVal { reg: r, owned: true }
                    }
                };
                self.emit(Instruction::Ret { a: reg.reg });
                self.free(reg);
                Ok(())
            }
            Node::Break(span) => {
                let pos = self.builder.pos();
                self.emit(Instruction::Jmp { disp: 0 });
                let scope = self.scopes.current();
                match scope.current_loop() {
                    Some(l) => l.break_jumps.push(pos),
                    None => return Err(SemanticError::new("'break' outside of a loop", span.line)),
                }
                Ok(())
            }
            Node::Continue(span) => {
                let pos = self.builder.pos();
                self.emit(Instruction::Jmp { disp: 0 });
                let scope = self.scopes.current();
                match scope.current_loop() {
                    Some(l) => l.continue_jumps.push(pos),
                    None => return Err(SemanticError::new("'continue' outside of a loop", span.line)),
                }
                Ok(())
            }
            Node::ExprStmt(inner) => self.compile_expr_stmt(inner),
            other => Err(SemanticError::new(format!("'{other:?}' is not valid at statement position"), node.span().line)),
        }
    }

    fn compile_expr_stmt(&mut self, inner: &Node) -> CResult<()> {
        // A named function statement (`function foo() {...}`) binds `foo`
        // as a global at the top level, or as a local variable of the
        // enclosing function otherwise — spec.md's "enclosing code loads
        // the function with LDSYM" plus GLBVAL for forward references
        // between sibling top-level functions (scenario 6).
        if let Node::FuncDef { name: Some(name), params, body, span } = inner {
            let reg = self.compile_func_literal(Some(name.clone()), params, body, *span)?;
            if self.scopes.is_top_level() {
                self.emit(Instruction::GlbVal { a: reg.reg, name: name.clone() });
                self.free(reg);
            } else {
                let var_reg = self.scopes.current().declare_var(name.clone(), false, span.line, "variable")?;
                if var_reg != reg.reg {
                    self.emit(Instruction::Mov { a: var_reg, b: reg.reg });
                }
                self.free(reg);
            }
            return Ok(());
        }
        let v = self.compile_expr(inner)?;
        self.free(v);
        Ok(())
    }

    fn compile_var_decl(&mut self, decls: &[(String, Option<Node>)], span: Span, is_const: bool) -> CResult<()> {
        for (name, init) in decls {
            let what = if is_const { "constant" } else { "variable" };
            match init {
                Some(expr) => {
                    let v = self.compile_expr(expr)?;
                    let var_reg = self.scopes.current().declare_var(name.clone(), is_const, span.line, what)?;
                    if var_reg != v.reg {
                        self.emit(Instruction::Mov { a: var_reg, b: v.reg });
                    }
                    self.free(v);
                }
                None => {
                    let var_reg = self.scopes.current().declare_var(name.clone(), is_const, span.line, what)?;
                    self.emit(Instruction::LdConst { a: var_reg, kind: ConstKind::Nil });
                }
            }
        }
        Ok(())
    }

    fn compile_if(&mut self, cond: &Node, then: &[Node], r#else: Option<&[Node]>, span: Span) -> CResult<()> {
        let c = self.compile_expr(cond)?;
        let jze_pos = self.builder.pos();
        self.emit(Instruction::Jze { a: c.reg, disp: 0 });
        self.free(c);
        self.compile_block(then)?;
        if let Some(else_body) = r#else {
            let jmp_pos = self.builder.pos();
            self.emit(Instruction::Jmp { disp: 0 });
            self.patch_jze(jze_pos, span)?;
            self.compile_block(else_body)?;
            self.patch_jmp(jmp_pos, span)?;
        } else {
            self.patch_jze(jze_pos, span)?;
        }
        Ok(())
    }

    fn compile_while(&mut self, cond: &Node, body: &[Node], span: Span) -> CResult<()> {
        let loop_start = self.builder.pos();
        self.scopes.current().enter_loop();
        let c = self.compile_expr(cond)?;
        let jze_pos = self.builder.pos();
        self.emit(Instruction::Jze { a: c.reg, disp: 0 });
        self.free(c);
        self.compile_block(body)?;
        let back_pos = self.builder.pos();
        self.emit_jmp_to(back_pos, loop_start, span)?;
        self.patch_jze(jze_pos, span)?;
        let exit = self.builder.pos();
        let ctx = self.scopes.current().exit_loop();
        for pos in ctx.break_jumps {
            self.patch_jmp_target(pos, exit, span)?;
        }
        for pos in ctx.continue_jumps {
            self.patch_jmp_target(pos, loop_start, span)?;
        }
        Ok(())
    }

    fn compile_do_while(&mut self, cond: &Node, body: &[Node], span: Span) -> CResult<()> {
        let body_start = self.builder.pos();
        self.scopes.current().enter_loop();
        self.compile_block(body)?;
        let continue_target = self.builder.pos();
        let c = self.compile_expr(cond)?;
        let jnz_pos = self.builder.pos();
        self.emit(Instruction::Jnz { a: c.reg, disp: 0 });
        self.free(c);
        self.patch_jnz_target(jnz_pos, body_start, span)?;
        let exit = self.builder.pos();
        let ctx = self.scopes.current().exit_loop();
        for pos in ctx.break_jumps {
            self.patch_jmp_target(pos, exit, span)?;
        }
        for pos in ctx.continue_jumps {
            self.patch_jmp_target(pos, continue_target, span)?;
        }
        Ok(())
    }

    fn compile_for(
        &mut self,
        init: Option<&Node>,
        cond: Option<&Node>,
        incr: Option<&Node>,
        body: &[Node],
        span: Span,
    ) -> CResult<()> {
        self.scopes.current().enter_block();
        if let Some(init) = init {
            self.compile_stmt(init)?;
        }
        let loop_start = self.builder.pos();
        self.scopes.current().enter_loop();
        let jze_pos = if let Some(cond) = cond {
            let c = self.compile_expr(cond)?;
            let pos = self.builder.pos();
            self.emit(Instruction::Jze { a: c.reg, disp: 0 });
            self.free(c);
            Some(pos)
        } else {
            None
        };
        self.compile_block(body)?;
        let continue_target = self.builder.pos();
        if let Some(incr) = incr {
            let v = self.compile_expr(incr)?;
            self.free(v);
        }
        let back_pos = self.builder.pos();
        self.emit_jmp_to(back_pos, loop_start, span)?;
        if let Some(pos) = jze_pos {
            self.patch_jze(pos, span)?;
        }
        let exit = self.builder.pos();
        let ctx = self.scopes.current().exit_loop();
        for pos in ctx.break_jumps {
            self.patch_jmp_target(pos, exit, span)?;
        }
        for pos in ctx.continue_jumps {
            self.patch_jmp_target(pos, continue_target, span)?;
        }
        self.scopes.current().exit_block();
        Ok(())
    }

    // ---- jump patching helpers ----

    fn displacement(from_instr_pos: usize, target: usize, span: Span) -> CResult<i32> {
        let after = from_instr_pos as i64 + 1;
        let disp = target as i64 - after;
        if disp < i32::MIN as i64 || disp > i32::MAX as i64 {
            return Err(SemanticError::new("jump target out of range", span.line));
        }
        Ok(disp as i32)
    }

    fn emit_jmp_to(&mut self, jmp_pos: usize, target: usize, span: Span) -> CResult<()> {
        let disp = Self::displacement(jmp_pos, target, span)?;
        self.builder.patch_jump_long(jmp_pos, disp);
        Ok(())
    }

    fn patch_jmp(&mut self, pos: usize, span: Span) -> CResult<()> {
        let target = self.builder.pos();
        self.emit_jmp_to(pos, target, span)
    }

    fn patch_jmp_target(&mut self, pos: usize, target: usize, span: Span) -> CResult<()> {
        self.emit_jmp_to(pos, target, span)
    }

    fn patch_jze(&mut self, pos: usize, span: Span) -> CResult<()> {
        let target = self.builder.pos();
        self.patch_jze_target(pos, target, span)
    }

    fn patch_jze_target(&mut self, pos: usize, target: usize, span: Span) -> CResult<()> {
        let disp = Self::displacement(pos, target, span)?;
        if disp < i16::MIN as i32 || disp > i16::MAX as i32 {
            return Err(SemanticError::new("jump target out of range", span.line));
        }
        self.builder.patch_jump_mid(pos, disp as i16);
        Ok(())
    }

    fn patch_jnz_target(&mut self, pos: usize, target: usize, span: Span) -> CResult<()> {
        self.patch_jze_target(pos, target, span)
    }

    fn free(&mut self, v: RegVal) {
        if v.owned {
            self.scopes.current().free_temp(v.reg);
        }
    }

    // ---- expressions ----

    fn compile_expr(&mut self, node: &Node) -> CResult<RegVal> {
        match node {
            Node::Literal(value, span) => self.compile_literal(value, *span),
            Node::Ident(name, span) => self.compile_ident(name, *span),
            Node::BinOp { op, left, right, span } => self.compile_binop(*op, left, right, *span),
            Node::UnOp { op, arg, span } => self.compile_unop(*op, arg, *span),
            Node::Assign { target, value, span } => self.compile_assign(target, value, *span),
            Node::CompoundAssign { op, target, value, span } => self.compile_compound_assign(*op, target, value, *span),
            Node::Subscript { object, index, span } => self.compile_subscript_get(object, index, *span),
            Node::Member { object, name, span } => self.compile_member_get(object, name, *span),
            Node::ArrayLit(items, span) => self.compile_array_lit(items, *span),
            Node::HashLit(pairs, span) => self.compile_hash_lit(pairs, *span),
            Node::Call { callee, args, span } => self.compile_call(callee, args, *span),
            Node::FuncDef { name, params, body, span } => self.compile_func_literal(name.clone(), params, body, *span),
            other => Err(SemanticError::new(format!("'{other:?}' is not valid in expression position"), node.span().line)),
        }
    }

    fn compile_literal(&mut self, value: &Value, span: Span) -> CResult<RegVal> {
        let reg = self.scopes.current().alloc_temp(span.line)?;
        match value {
            Value::Nil => self.emit(Instruction::LdConst { a: reg, kind: ConstKind::Nil }),
            Value::Bool(true) => self.emit(Instruction::LdConst { a: reg, kind: ConstKind::True }),
            Value::Bool(false) => self.emit(Instruction::LdConst { a: reg, kind: ConstKind::False }),
            Value::Int(i) => self.emit(Instruction::LdInt { a: reg, value: *i }),
            Value::Float(f) => self.emit(Instruction::LdFloat { a: reg, value: *f }),
            Value::Str(s) => {
                let symidx = self.builder.add_str_const(s.as_bytes().to_vec());
                self.emit(Instruction::LdSym { a: reg, symidx });
            }
            other => {
                return Err(SemanticError::new(format!("'{}' literal is not supported", other.type_name()), span.line))
            }
        }
        Ok(RegVal { reg, owned: true })
    }

    fn compile_ident(&mut self, name: &str, span: Span) -> CResult<RegVal> {
        match self.scopes.resolve(name) {
            VarRef::Local(reg) => Ok(RegVal { reg, owned: false }),
            VarRef::Upvalue(idx) => {
                let reg = self.scopes.current().alloc_temp(span.line)?;
                self.emit(Instruction::LdUpval { a: reg, idx });
                Ok(RegVal { reg, owned: true })
            }
            VarRef::Global => {
                let reg = self.scopes.current().alloc_temp(span.line)?;
                let symidx = self.builder.add_sym_stub(name.to_string());
                self.emit(Instruction::LdSym { a: reg, symidx });
                Ok(RegVal { reg, owned: true })
            }
        }
    }

    fn compile_binop(&mut self, op: BinOp, left: &Node, right: &Node, span: Span) -> CResult<RegVal> {
        // Short-circuit logical operators need control flow, not a single
        // instruction.
        if matches!(op, BinOp::LogAnd | BinOp::LogOr) {
            return self.compile_logical(op, left, right, span);
        }
        let l = self.compile_expr(left)?;
        let dest = if l.owned { l.reg } else { self.scopes.current().alloc_temp(span.line)? };
        let r = self.compile_expr(right)?;
        let instr = match op {
            BinOp::Add => Instruction::Add { a: dest, b: l.reg, c: r.reg },
            BinOp::Sub => Instruction::Sub { a: dest, b: l.reg, c: r.reg },
            BinOp::Mul => Instruction::Mul { a: dest, b: l.reg, c: r.reg },
            BinOp::Div => Instruction::Div { a: dest, b: l.reg, c: r.reg },
            BinOp::Mod => Instruction::Mod { a: dest, b: l.reg, c: r.reg },
            BinOp::Eq => Instruction::Eq { a: dest, b: l.reg, c: r.reg },
            BinOp::Ne => Instruction::Ne { a: dest, b: l.reg, c: r.reg },
            BinOp::Lt => Instruction::Lt { a: dest, b: l.reg, c: r.reg },
            BinOp::Le => Instruction::Le { a: dest, b: l.reg, c: r.reg },
            BinOp::Gt => Instruction::Gt { a: dest, b: l.reg, c: r.reg },
            BinOp::Ge => Instruction::Ge { a: dest, b: l.reg, c: r.reg },
            BinOp::And => Instruction::And { a: dest, b: l.reg, c: r.reg },
            BinOp::Or => Instruction::Or { a: dest, b: l.reg, c: r.reg },
            BinOp::Xor => Instruction::Xor { a: dest, b: l.reg, c: r.reg },
            BinOp::Shl => Instruction::Shl { a: dest, b: l.reg, c: r.reg },
            BinOp::Shr => Instruction::Shr { a: dest, b: l.reg, c: r.reg },
            BinOp::Concat => Instruction::Concat { a: dest, b: l.reg, c: r.reg },
            BinOp::LogAnd | BinOp::LogOr => unreachable!(),
        };
        self.emit(instr);
        self.free(r);
        Ok(RegVal { reg: dest, owned: true })
    }

    /// `&&`/`||` short-circuit: the right-hand side is only evaluated if
    /// the left doesn't already decide the result.
    fn compile_logical(&mut self, op: BinOp, left: &Node, right: &Node, span: Span) -> CResult<RegVal> {
        let l = self.compile_expr(left)?;
        let dest = if l.owned { l.reg } else { self.scopes.current().alloc_temp(span.line)? };
        if dest != l.reg {
            self.emit(Instruction::Mov { a: dest, b: l.reg });
        }
        let skip_pos = self.builder.pos();
        match op {
            BinOp::LogAnd => self.emit(Instruction::Jze { a: dest, disp: 0 }),
            BinOp::LogOr => self.emit(Instruction::Jnz { a: dest, disp: 0 }),
            _ => unreachable!(),
        }
        let r = self.compile_expr(right)?;
        if r.reg != dest {
            self.emit(Instruction::Mov { a: dest, b: r.reg });
        }
        self.free(r);
        self.patch_jze(skip_pos, span)?;
        Ok(RegVal { reg: dest, owned: true })
    }

    fn compile_unop(&mut self, op: UnOp, arg: &Node, span: Span) -> CResult<RegVal> {
        let a = self.compile_expr(arg)?;
        let dest = if a.owned { a.reg } else { self.scopes.current().alloc_temp(span.line)? };
        let instr = match op {
            UnOp::Neg => Instruction::Neg { a: dest, b: a.reg },
            UnOp::BitNot => Instruction::BitNot { a: dest, b: a.reg },
            UnOp::LogNot => Instruction::LogNot { a: dest, b: a.reg },
            UnOp::TypeOf => Instruction::TypeOf { a: dest, b: a.reg },
            UnOp::SizeOf => Instruction::SizeOf { a: dest, b: a.reg },
        };
        self.emit(instr);
        Ok(RegVal { reg: dest, owned: true })
    }

    fn compile_assign(&mut self, target: &Node, value: &Node, span: Span) -> CResult<RegVal> {
        match target {
            Node::Ident(name, ispan) => {
                if self.scopes.is_const(name) {
                    return Err(SemanticError::new(format!("cannot assign to constant '{name}'"), ispan.line));
                }
                if self.scopes.resolves_as_upvalue_only(name) {
                    return Err(SemanticError::new(
                        format!("cannot assign to '{name}': variables captured from an enclosing scope are read-only"),
                        ispan.line,
                    ));
                }
                let v = self.compile_expr(value)?;
                match self.scopes.resolve(name) {
                    VarRef::Local(reg) => {
                        if reg != v.reg {
                            self.emit(Instruction::Mov { a: reg, b: v.reg });
                        }
                        self.free(v);
                        Ok(RegVal { reg, owned: false })
                    }
                    VarRef::Global => Err(SemanticError::new(
                        format!("cannot assign to undeclared identifier '{name}': declare it first with 'var' or 'const'"),
                        ispan.line,
                    )),
                    VarRef::Upvalue(_) => unreachable!("checked above"),
                }
            }
            Node::Subscript { object, index, .. } => {
                let obj = self.compile_expr(object)?;
                let idx = self.compile_expr(index)?;
                let v = self.compile_expr(value)?;
                self.emit(Instruction::IdxSet { a: obj.reg, b: idx.reg, c: v.reg });
                self.free(idx);
                self.free(obj);
                Ok(v)
            }
            Node::Member { object, name, .. } => {
                let obj = self.compile_expr(object)?;
                let key = self.intern_str_const(name.as_bytes(), span)?;
                let v = self.compile_expr(value)?;
                self.emit(Instruction::IdxSet { a: obj.reg, b: key.reg, c: v.reg });
                self.free(key);
                self.free(obj);
                Ok(v)
            }
            _ => Err(SemanticError::new("assignment target must be a variable, subscript, or member access", span.line)),
        }
    }

    fn compile_compound_assign(&mut self, op: BinOp, target: &Node, value: &Node, span: Span) -> CResult<RegVal> {
        match target {
            Node::Ident(name, ispan) => {
                if self.scopes.is_const(name) {
                    return Err(SemanticError::new(format!("cannot assign to constant '{name}'"), ispan.line));
                }
                if self.scopes.resolves_as_upvalue_only(name) {
                    return Err(SemanticError::new(
                        format!("cannot assign to '{name}': variables captured from an enclosing scope are read-only"),
                        ispan.line,
                    ));
                }
                match self.scopes.resolve(name) {
                    VarRef::Local(reg) => {
                        let rhs = self.compile_expr(value)?;
                        self.emit(binop_instr(op, reg, reg, rhs.reg));
                        self.free(rhs);
                        Ok(RegVal { reg, owned: false })
                    }
                    VarRef::Global => Err(SemanticError::new(
                        format!("cannot assign to undeclared identifier '{name}': declare it first with 'var' or 'const'"),
                        ispan.line,
                    )),
                    VarRef::Upvalue(_) => unreachable!("checked above"),
                }
            }
            Node::Subscript { object, index, .. } => {
                let obj = self.compile_expr(object)?;
                let idx = self.compile_expr(index)?;
                let cur = self.scopes.current().alloc_temp(span.line)?;
                self.emit(Instruction::IdxGet { a: cur, b: obj.reg, c: idx.reg });
                let rhs = self.compile_expr(value)?;
                self.emit(binop_instr(op, cur, cur, rhs.reg));
                self.free(rhs);
                self.emit(Instruction::IdxSet { a: obj.reg, b: idx.reg, c: cur });
                self.free(idx);
                self.free(obj);
                Ok(RegVal { reg: cur, owned: true })
            }
            Node::Member { object, name, .. } => {
                let obj = self.compile_expr(object)?;
                let key = self.intern_str_const(name.as_bytes(), span)?;
                let cur = self.scopes.current().alloc_temp(span.line)?;
                self.emit(Instruction::IdxGet { a: cur, b: obj.reg, c: key.reg });
                let rhs = self.compile_expr(value)?;
                self.emit(binop_instr(op, cur, cur, rhs.reg));
                self.free(rhs);
                self.emit(Instruction::IdxSet { a: obj.reg, b: key.reg, c: cur });
                self.free(key);
                self.free(obj);
                Ok(RegVal { reg: cur, owned: true })
            }
            _ => Err(SemanticError::new("assignment target must be a variable, subscript, or member access", span.line)),
        }
    }

    fn intern_str_const(&mut self, bytes: &[u8], span: Span) -> CResult<RegVal> {
        let reg = self.scopes.current().alloc_temp(span.line)?;
        let symidx = self.builder.add_str_const(bytes.to_vec());
        self.emit(Instruction::LdSym { a: reg, symidx });
        Ok(RegVal { reg, owned: true })
    }

    fn compile_subscript_get(&mut self, object: &Node, index: &Node, span: Span) -> CResult<RegVal> {
        let obj = self.compile_expr(object)?;
        let dest = if obj.owned { obj.reg } else { self.scopes.current().alloc_temp(span.line)? };
        let idx = self.compile_expr(index)?;
        self.emit(Instruction::IdxGet { a: dest, b: obj.reg, c: idx.reg });
        self.free(idx);
        Ok(RegVal { reg: dest, owned: true })
    }

    fn compile_member_get(&mut self, object: &Node, name: &str, span: Span) -> CResult<RegVal> {
        let obj = self.compile_expr(object)?;
        let dest = if obj.owned { obj.reg } else { self.scopes.current().alloc_temp(span.line)? };
        let key = self.intern_str_const(name.as_bytes(), span)?;
        self.emit(Instruction::IdxGet { a: dest, b: obj.reg, c: key.reg });
        self.free(key);
        Ok(RegVal { reg: dest, owned: true })
    }

    fn compile_array_lit(&mut self, items: &[Node], span: Span) -> CResult<RegVal> {
        let dest = self.scopes.current().alloc_temp(span.line)?;
        self.emit(Instruction::NewArr { a: dest });
        for item in items {
            let v = self.compile_expr(item)?;
            self.emit(Instruction::ArrPush { a: dest, b: v.reg });
            self.free(v);
        }
        Ok(RegVal { reg: dest, owned: true })
    }

    fn compile_hash_lit(&mut self, pairs: &[(Node, Node)], span: Span) -> CResult<RegVal> {
        let dest = self.scopes.current().alloc_temp(span.line)?;
        self.emit(Instruction::NewHash { a: dest });
        for (k, v) in pairs {
            let kv = self.compile_expr(k)?;
            let vv = self.compile_expr(v)?;
            self.emit(Instruction::IdxSet { a: dest, b: kv.reg, c: vv.reg });
            self.free(vv);
            self.free(kv);
        }
        Ok(RegVal { reg: dest, owned: true })
    }

    fn compile_call(&mut self, callee: &Node, args: &[Node], span: Span) -> CResult<RegVal> {
        let callee_val = self.compile_expr(callee)?;
        let callee_reg = if callee_val.owned {
            callee_val.reg
        } else {
            let r = self.scopes.current().alloc_temp(span.line)?;
            self.emit(Instruction::Mov { a: r, b: callee_val.reg });
            r
        };
        let mut arg_regs = Vec::with_capacity(args.len());
        for arg in args {
            let v = self.compile_expr(arg)?;
            let r = if v.owned {
                v.reg
            } else {
                let nr = self.scopes.current().alloc_temp(span.line)?;
                self.emit(Instruction::Mov { a: nr, b: v.reg });
                nr
            };
            arg_regs.push(r);
        }
        self.emit(Instruction::Call { a: callee_reg, b: callee_reg, argregs: arg_regs.clone() });
        for r in arg_regs.into_iter().rev() {
            self.scopes.current().free_temp(r);
        }
        Ok(RegVal { reg: callee_reg, owned: true })
    }

    fn compile_func_literal(&mut self, name: Option<String>, params: &[String], body: &[Node], span: Span) -> CResult<RegVal> {
        self.builder.emit_function_marker();
        let header_pos = self.builder.reserve_nested_header();
        self.scopes.push_function();
        for p in params {
            self.scopes.current().declare_var(p.clone(), false, span.line, "parameter")?;
        }
        for stmt in body {
            self.compile_stmt(stmt)?;
        }
        let nil_reg = self.scopes.current().alloc_temp(span.line)?;
        self.emit(Instruction::LdConst { a: nil_reg, kind: ConstKind::Nil });
        self.emit(Instruction::Ret { a: nil_reg });
        let body_len = self.builder.pos() - (header_pos + 2);
        let nregs = self.scopes.current().max_reg().max(params.len() as u8).max(1);
        self.builder.patch_nested_header(header_pos, body_len as u32, params.len() as u8, nregs as u16);
        let scope = self.scopes.pop_function();

        let symidx = self.builder.add_func_def(header_pos as u32, name);
        let reg = self.scopes.current().alloc_temp(span.line)?;
        self.emit(Instruction::LdSym { a: reg, symidx });
        if !scope.upvalues.is_empty() {
            self.emit(Instruction::Closure { a: reg, upvals: scope.upvalues });
        }
        Ok(RegVal { reg, owned: true })
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

fn binop_instr(op: BinOp, a: u8, b: u8, c: u8) -> Instruction {
    match op {
        BinOp::Add => Instruction::Add { a, b, c },
        BinOp::Sub => Instruction::Sub { a, b, c },
        BinOp::Mul => Instruction::Mul { a, b, c },
        BinOp::Div => Instruction::Div { a, b, c },
        BinOp::Mod => Instruction::Mod { a, b, c },
        BinOp::Concat => Instruction::Concat { a, b, c },
        BinOp::And => Instruction::And { a, b, c },
        BinOp::Or => Instruction::Or { a, b, c },
        BinOp::Xor => Instruction::Xor { a, b, c },
        BinOp::Shl => Instruction::Shl { a, b, c },
        BinOp::Shr => Instruction::Shr { a, b, c },
        other => panic!("'{other:?}' is not a valid compound-assignment operator"),
    }
}
