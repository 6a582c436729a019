use anyhow::{anyhow, Result};
use parse::{BinaryOp, Expr, ExprKind, Program, Stmt, StmtKind, Type};
use std::collections::{HashMap, HashSet};

use crate::instr::{Instr, Operand};

/// Lowers an annotated AST to a flat TAC listing. Owns the two monotonic
/// counters for temporaries and labels; a fresh generator is used for each
/// compilation so numbering always starts at zero.
///
/// Storage names must be unique in the flat listing, so shadowed source
/// variables are renamed with a dotted suffix (`x`, `x.1`, `x.2`, ...) —
/// dots cannot appear in source identifiers, so renames never collide with
/// user names.
pub struct Lowerer {
    code: Vec<Instr>,
    tmp: u32,
    label: u32,
    scopes: Vec<HashMap<String, String>>,
    used_names: HashSet<String>,
}

impl Lowerer {
    pub fn new() -> Self {
        Self {
            code: Vec::new(),
            tmp: 0,
            label: 0,
            scopes: vec![HashMap::new()],
            used_names: HashSet::new(),
        }
    }

    fn new_temp(&mut self) -> Operand {
        let t = Operand::Temp(self.tmp);
        self.tmp += 1;
        t
    }
    fn new_label(&mut self) -> String {
        let l = format!("L{}", self.label);
        self.label += 1;
        l
    }
    fn emit(&mut self, i: Instr) {
        self.code.push(i);
    }

    fn enter_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }
    fn exit_scope(&mut self) {
        let _ = self.scopes.pop();
    }

    /// Source names shaped like temporaries (`t0`, `t17`) would alias the
    /// generated ones once the listing is flattened to assembly text.
    fn is_temp_like(name: &str) -> bool {
        let mut bytes = name.bytes();
        bytes.next() == Some(b't')
            && name.len() > 1
            && bytes.all(|b| b.is_ascii_digit())
    }

    /// Pick a listing-unique storage name for a freshly declared variable.
    fn declare_var(&mut self, name: &str) -> String {
        let mut unique = name.to_string();
        let mut k = 1u32;
        while Self::is_temp_like(&unique) || !self.used_names.insert(unique.clone()) {
            unique = format!("{}.{}", name, k);
            k += 1;
        }
        if let Some(top) = self.scopes.last_mut() {
            top.insert(name.to_string(), unique.clone());
        }
        unique
    }

    /// Storage name for a variable reference, honoring shadowing.
    fn resolve(&self, name: &str) -> String {
        for scope in self.scopes.iter().rev() {
            if let Some(n) = scope.get(name) {
                return n.clone();
            }
        }
        name.to_string()
    }

    /// The ICG runs only on semantically accepted programs; a missing
    /// annotation here is a compiler bug, not a user error.
    fn annotated(e: &Expr) -> Result<Type> {
        e.ty.ok_or_else(|| anyhow!("unannotated expression at line {}", e.line))
    }

    // ===== Expressions =====

    /// Lower an expression and return the operand naming its result.
    fn lower_expr(&mut self, e: &Expr) -> Result<Operand> {
        let _ = Self::annotated(e)?;
        match &e.kind {
            ExprKind::IntLit(v) => Ok(Operand::Int(*v)),
            ExprKind::FloatLit(v) => Ok(Operand::Float(*v)),
            ExprKind::CharLit(c) => Ok(Operand::Char(*c)),
            ExprKind::VarRef(name) => Ok(Operand::Var(self.resolve(name))),
            ExprKind::Unary { op, operand } => {
                let src = self.lower_expr(operand)?;
                let dest = self.new_temp();
                self.emit(Instr::Unary { dest: dest.clone(), op: *op, src });
                Ok(dest)
            }
            ExprKind::Binary { op: BinaryOp::And, lhs, rhs } => self.lower_and(lhs, rhs),
            ExprKind::Binary { op: BinaryOp::Or, lhs, rhs } => self.lower_or(lhs, rhs),
            ExprKind::Binary { op, lhs, rhs } => {
                let a = self.lower_expr(lhs)?;
                let b = self.lower_expr(rhs)?;
                let dest = self.new_temp();
                self.emit(Instr::Binary { dest: dest.clone(), op: *op, lhs: a, rhs: b });
                Ok(dest)
            }
            ExprKind::Call { callee, args } => {
                let dest = self.lower_call(callee, args, true)?;
                Ok(dest.unwrap_or(Operand::Int(0)))
            }
        }
    }

    /// `a && b` evaluated with control flow: `b` only runs when `a` holds.
    fn lower_and(&mut self, lhs: &Expr, rhs: &Expr) -> Result<Operand> {
        let dest = self.new_temp();
        let l_end = self.new_label();
        self.emit(Instr::Copy { dest: dest.clone(), src: Operand::Int(0) });
        let a = self.lower_expr(lhs)?;
        self.emit(Instr::IfFalse { cond: a, target: l_end.clone() });
        let b = self.lower_expr(rhs)?;
        self.emit(Instr::IfFalse { cond: b, target: l_end.clone() });
        self.emit(Instr::Copy { dest: dest.clone(), src: Operand::Int(1) });
        self.emit(Instr::Label(l_end));
        Ok(dest)
    }

    fn lower_or(&mut self, lhs: &Expr, rhs: &Expr) -> Result<Operand> {
        let dest = self.new_temp();
        let l_end = self.new_label();
        self.emit(Instr::Copy { dest: dest.clone(), src: Operand::Int(1) });
        let a = self.lower_expr(lhs)?;
        self.emit(Instr::IfTrue { cond: a, target: l_end.clone() });
        let b = self.lower_expr(rhs)?;
        self.emit(Instr::IfTrue { cond: b, target: l_end.clone() });
        self.emit(Instr::Copy { dest: dest.clone(), src: Operand::Int(0) });
        self.emit(Instr::Label(l_end));
        Ok(dest)
    }

    /// Arguments are pushed left to right; the result temporary exists only
    /// when the caller consumes the value.
    fn lower_call(&mut self, callee: &str, args: &[Expr], want_result: bool) -> Result<Option<Operand>> {
        let mut lowered = Vec::with_capacity(args.len());
        for a in args {
            lowered.push(self.lower_expr(a)?);
        }
        for x in lowered {
            self.emit(Instr::Param(x));
        }
        let dest = if want_result { Some(self.new_temp()) } else { None };
        self.emit(Instr::Call { func: callee.to_string(), n_args: args.len(), dest: dest.clone() });
        Ok(dest)
    }

    // ===== Statements =====

    fn lower_block(&mut self, body: &[Stmt]) -> Result<()> {
        for s in body {
            self.lower_stmt(s)?;
        }
        Ok(())
    }

    fn lower_scoped_block(&mut self, body: &[Stmt]) -> Result<()> {
        self.enter_scope();
        let r = self.lower_block(body);
        self.exit_scope();
        r
    }

    /// Loop bounds re-evaluate each iteration (so their code sits inside
    /// the loop region) but their names bind in the scope enclosing the
    /// loop, matching the semantic analyzer.
    fn lower_in_enclosing_scope(&mut self, e: &Expr) -> Result<Operand> {
        let frame = self.scopes.pop();
        let result = self.lower_expr(e);
        if let Some(f) = frame {
            self.scopes.push(f);
        }
        result
    }

    fn lower_stmt(&mut self, s: &Stmt) -> Result<()> {
        match &s.kind {
            StmtKind::VarDecl { ty, name, init } => {
                let unique = self.declare_var(name);
                self.emit(Instr::Alloc { name: unique.clone(), ty: *ty });
                if let Some(e) = init {
                    let src = self.lower_expr(e)?;
                    self.emit(Instr::Copy { dest: Operand::Var(unique), src });
                }
                Ok(())
            }
            StmtKind::Assign { name, expr } => {
                let src = self.lower_expr(expr)?;
                let dest = Operand::Var(self.resolve(name));
                self.emit(Instr::Copy { dest, src });
                Ok(())
            }
            StmtKind::If { cond, then_block, elifs, else_block } => {
                let l_end = self.new_label();
                let mut clauses: Vec<(&Expr, &[Stmt])> = vec![(cond, then_block.as_slice())];
                for (c, b) in elifs {
                    clauses.push((c, b.as_slice()));
                }
                for (c, body) in clauses {
                    let l_next = self.new_label();
                    let cv = self.lower_expr(c)?;
                    self.emit(Instr::IfFalse { cond: cv, target: l_next.clone() });
                    self.lower_scoped_block(body)?;
                    self.emit(Instr::Goto(l_end.clone()));
                    self.emit(Instr::Label(l_next));
                }
                if let Some(body) = else_block {
                    self.lower_scoped_block(body)?;
                }
                self.emit(Instr::Label(l_end));
                Ok(())
            }
            StmtKind::While { cond, body } => {
                let l_start = self.new_label();
                let l_end = self.new_label();
                self.emit(Instr::Label(l_start.clone()));
                let cv = self.lower_expr(cond)?;
                self.emit(Instr::IfFalse { cond: cv, target: l_end.clone() });
                self.lower_scoped_block(body)?;
                self.emit(Instr::Goto(l_start));
                self.emit(Instr::Label(l_end));
                Ok(())
            }
            StmtKind::For { var, start, end, step, body } => {
                let l_start = self.new_label();
                let l_end = self.new_label();
                // bounds are evaluated in the enclosing scope
                let init = self.lower_expr(start)?;
                self.enter_scope();
                let v = self.declare_var(var);
                self.emit(Instr::Alloc { name: v.clone(), ty: Type::Int });
                self.emit(Instr::Copy { dest: Operand::Var(v.clone()), src: init });
                self.emit(Instr::Label(l_start.clone()));
                let bound = self.lower_in_enclosing_scope(end)?;
                let cond = self.new_temp();
                self.emit(Instr::Binary {
                    dest: cond.clone(),
                    op: BinaryOp::Le,
                    lhs: Operand::Var(v.clone()),
                    rhs: bound,
                });
                self.emit(Instr::IfFalse { cond, target: l_end.clone() });
                self.lower_block(body)?;
                let stride = match step {
                    Some(e) => self.lower_in_enclosing_scope(e)?,
                    None => Operand::Int(1),
                };
                let next = self.new_temp();
                self.emit(Instr::Binary {
                    dest: next.clone(),
                    op: BinaryOp::Add,
                    lhs: Operand::Var(v.clone()),
                    rhs: stride,
                });
                self.emit(Instr::Copy { dest: Operand::Var(v), src: next });
                self.emit(Instr::Goto(l_start));
                self.emit(Instr::Label(l_end));
                self.exit_scope();
                Ok(())
            }
            StmtKind::FuncDecl { name, params, body, .. } => {
                // bracket the body so top-level flow never falls into it
                let l_skip = self.new_label();
                self.emit(Instr::Goto(l_skip.clone()));
                self.emit(Instr::Label(name.clone()));
                self.enter_scope();
                let mut storage = Vec::with_capacity(params.len());
                for p in params {
                    let unique = self.declare_var(&p.name);
                    self.emit(Instr::Alloc { name: unique.clone(), ty: p.ty });
                    storage.push(unique);
                }
                // arguments were pushed left to right, so they pop in reverse
                for unique in storage.into_iter().rev() {
                    self.emit(Instr::Pop { name: unique });
                }
                self.lower_block(body)?;
                self.exit_scope();
                self.emit(Instr::Label(l_skip));
                Ok(())
            }
            StmtKind::Return { expr } => {
                let val = match expr {
                    Some(e) => Some(self.lower_expr(e)?),
                    None => None,
                };
                self.emit(Instr::Ret(val));
                Ok(())
            }
            StmtKind::Print { expr } => {
                let x = self.lower_expr(expr)?;
                self.emit(Instr::Print(x));
                Ok(())
            }
            StmtKind::Input { name } => {
                let unique = self.resolve(name);
                self.emit(Instr::Input { name: unique });
                Ok(())
            }
            StmtKind::Block { body } => self.lower_scoped_block(body),
            StmtKind::ExprStmt { expr } => {
                // a call in statement position discards its value
                if let ExprKind::Call { callee, args } = &expr.kind {
                    let _ = Self::annotated(expr)?;
                    self.lower_call(callee, args, false)?;
                } else {
                    let _ = self.lower_expr(expr)?;
                }
                Ok(())
            }
        }
    }
}

impl Default for Lowerer {
    fn default() -> Self {
        Self::new()
    }
}

/// Lower a fully annotated program to its TAC listing. Fails only on a
/// broken phase contract (an un-annotated expression), which the pipeline
/// reports as an INTERNAL diagnostic.
pub fn lower(program: &Program) -> Result<Vec<Instr>> {
    let mut lw = Lowerer::new();
    lw.lower_block(&program.items)?;
    Ok(lw.code)
}
