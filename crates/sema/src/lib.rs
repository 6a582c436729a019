mod symtab;

pub use symtab::{Frame, Symbol, SymbolKind, SymbolTable};

use diag::{Diagnostics, SemanticKind as Sk};
use parse::{BinaryOp, Expr, ExprKind, Param, Program, Stmt, StmtKind, Type, UnaryOp};

fn is_integral(ty: Type) -> bool {
    matches!(ty, Type::Int | Type::Char)
}

/// The assignment compatibility table: everything is assignable except a
/// float source into an int or char destination (narrowing).
fn assignable(dst: Type, src: Type) -> bool {
    !(src == Type::Float && dst != Type::Float)
}

/// Result type of an arithmetic operator: char promotes to int, float wins.
fn arith_result(a: Type, b: Type) -> Type {
    if a == Type::Float || b == Type::Float {
        Type::Float
    } else {
        Type::Int
    }
}

struct Analyzer<'d> {
    table: SymbolTable,
    diags: &'d mut Diagnostics,
    /// return type of the function body being analyzed, if any
    func_ret: Option<Type>,
}

impl<'d> Analyzer<'d> {
    fn new(diags: &'d mut Diagnostics) -> Self {
        Self { table: SymbolTable::new(), diags, func_ret: None }
    }

    // ===== Statements =====

    fn check_block(&mut self, body: &mut [Stmt]) {
        self.table.enter_scope();
        for s in body.iter_mut() {
            self.check_stmt(s);
        }
        self.table.exit_scope();
    }

    fn check_stmt(&mut self, s: &mut Stmt) {
        let line = s.line;
        match &mut s.kind {
            StmtKind::VarDecl { ty, name, init } => {
                let declared = *ty;
                let init_ty = init.as_mut().map(|e| self.type_expr(e));
                if let Err(prev) = self.table.declare(Symbol::variable(
                    name,
                    declared,
                    init.is_some(),
                    line,
                )) {
                    self.diags.semantic(
                        Sk::Redeclaration,
                        line,
                        format!("'{}' is already declared in this scope (line {})", name, prev),
                        Some(name.clone()),
                    );
                    return;
                }
                if let Some(Some(rhs)) = init_ty {
                    if !assignable(declared, rhs) {
                        self.diags.semantic(
                            Sk::Narrowing,
                            line,
                            format!("cannot initialize {} '{}' with {} value", declared, name, rhs),
                            Some(name.clone()),
                        );
                    }
                }
            }
            StmtKind::Assign { name, expr } => {
                let rhs = self.type_expr(expr);
                match self.table.lookup(name) {
                    None => {
                        self.diags.semantic(
                            Sk::Undeclared,
                            line,
                            format!("assignment to undeclared variable '{}'", name),
                            Some(name.clone()),
                        );
                    }
                    Some(sym) => match sym.kind {
                        SymbolKind::Function { .. } => {
                            self.diags.semantic(
                                Sk::TypeMismatch,
                                line,
                                format!("cannot assign to function '{}'", name),
                                Some(name.clone()),
                            );
                        }
                        SymbolKind::Variable { ty, .. } => {
                            if let Some(rhs) = rhs {
                                if !assignable(ty, rhs) {
                                    self.diags.semantic(
                                        Sk::Narrowing,
                                        line,
                                        format!("cannot assign {} value to {} '{}'", rhs, ty, name),
                                        Some(name.clone()),
                                    );
                                }
                            }
                            self.table.mark_initialized(name);
                        }
                    },
                }
            }
            StmtKind::If { cond, then_block, elifs, else_block } => {
                self.check_condition(cond);
                self.check_block(then_block);
                for (c, b) in elifs.iter_mut() {
                    self.check_condition(c);
                    self.check_block(b);
                }
                if let Some(b) = else_block {
                    self.check_block(b);
                }
            }
            StmtKind::While { cond, body } => {
                self.check_condition(cond);
                self.check_block(body);
            }
            StmtKind::For { var, start, end, step, body } => {
                for bound in [&mut *start, end].into_iter().chain(step.as_mut()) {
                    if let Some(ty) = self.type_expr(bound) {
                        if !is_integral(ty) {
                            self.diags.semantic(
                                Sk::NonIntegralCondition,
                                bound.line,
                                format!("loop bound must be integral, found {}", ty),
                                None,
                            );
                        }
                    }
                }
                // the loop variable is an int local of the body scope,
                // pre-initialized by the loop header
                self.table.enter_scope();
                if let Err(prev) = self.table.declare(Symbol::variable(var, Type::Int, true, line)) {
                    self.diags.semantic(
                        Sk::Redeclaration,
                        line,
                        format!("'{}' is already declared in this scope (line {})", var, prev),
                        Some(var.clone()),
                    );
                }
                for st in body.iter_mut() {
                    self.check_stmt(st);
                }
                self.table.exit_scope();
            }
            StmtKind::FuncDecl { ret, name, params, body } => {
                if self.table.depth() > 1 || self.func_ret.is_some() {
                    self.diags.semantic(
                        Sk::TypeMismatch,
                        line,
                        format!("function '{}' must be declared at top level", name),
                        Some(name.clone()),
                    );
                    return;
                }
                let param_tys: Vec<Type> = params.iter().map(|p| p.ty).collect();
                if let Err(prev) = self.table.declare(Symbol::function(name, *ret, param_tys, line)) {
                    self.diags.semantic(
                        Sk::Redeclaration,
                        line,
                        format!("'{}' is already declared in this scope (line {})", name, prev),
                        Some(name.clone()),
                    );
                    return;
                }
                // parameters live in the body scope, pre-initialized
                self.table.enter_scope();
                for Param { ty, name: pname } in params.iter() {
                    if let Err(prev) = self.table.declare(Symbol::variable(pname, *ty, true, line)) {
                        self.diags.semantic(
                            Sk::Redeclaration,
                            line,
                            format!("duplicate parameter '{}' (line {})", pname, prev),
                            Some(pname.clone()),
                        );
                    }
                }
                self.func_ret = Some(*ret);
                for st in body.iter_mut() {
                    self.check_stmt(st);
                }
                self.func_ret = None;
                self.table.exit_scope();
                if !block_must_return(body) {
                    self.diags.semantic(
                        Sk::TypeMismatch,
                        line,
                        format!("control may reach the end of '{}' without returning a value", name),
                        Some(name.clone()),
                    );
                }
            }
            StmtKind::Return { expr } => {
                let ret_ty = match self.func_ret {
                    Some(t) => t,
                    None => {
                        if let Some(e) = expr.as_mut() {
                            let _ = self.type_expr(e);
                        }
                        self.diags.semantic(
                            Sk::ReturnOutsideFunc,
                            line,
                            "'return' outside of a function body",
                            None,
                        );
                        return;
                    }
                };
                match expr.as_mut() {
                    None => {
                        self.diags.semantic(
                            Sk::TypeMismatch,
                            line,
                            format!("function must return a {} value", ret_ty),
                            None,
                        );
                    }
                    Some(e) => {
                        if let Some(t) = self.type_expr(e) {
                            if !assignable(ret_ty, t) {
                                self.diags.semantic(
                                    Sk::Narrowing,
                                    line,
                                    format!("cannot return {} value from a {} function", t, ret_ty),
                                    None,
                                );
                            }
                        }
                    }
                }
            }
            StmtKind::Print { expr } => {
                let _ = self.type_expr(expr);
            }
            StmtKind::Input { name } => match self.table.lookup(name) {
                None => {
                    self.diags.semantic(
                        Sk::Undeclared,
                        line,
                        format!("'input' into undeclared variable '{}'", name),
                        Some(name.clone()),
                    );
                }
                Some(sym) => {
                    if matches!(sym.kind, SymbolKind::Function { .. }) {
                        self.diags.semantic(
                            Sk::TypeMismatch,
                            line,
                            format!("'input' target '{}' is a function", name),
                            Some(name.clone()),
                        );
                    } else {
                        self.table.mark_initialized(name);
                    }
                }
            },
            StmtKind::Block { body } => self.check_block(body),
            StmtKind::ExprStmt { expr } => {
                let _ = self.type_expr(expr);
            }
        }
    }

    fn check_condition(&mut self, cond: &mut Expr) {
        if let Some(ty) = self.type_expr(cond) {
            if !is_integral(ty) {
                self.diags.semantic(
                    Sk::NonIntegralCondition,
                    cond.line,
                    format!("condition must be integral, found {}", ty),
                    None,
                );
            }
        }
    }

    // ===== Expressions =====

    /// Type an expression, filling its `ty` slot. Returns `None` only when
    /// a diagnostic has already been recorded for this subtree.
    fn type_expr(&mut self, e: &mut Expr) -> Option<Type> {
        let line = e.line;
        let ty = match &mut e.kind {
            ExprKind::IntLit(_) => Some(Type::Int),
            ExprKind::FloatLit(_) => Some(Type::Float),
            ExprKind::CharLit(_) => Some(Type::Char),
            ExprKind::VarRef(name) => match self.table.lookup(name) {
                None => {
                    self.diags.semantic(
                        Sk::Undeclared,
                        line,
                        format!("use of undeclared variable '{}'", name),
                        Some(name.clone()),
                    );
                    None
                }
                Some(sym) => match sym.kind {
                    SymbolKind::Function { .. } => {
                        self.diags.semantic(
                            Sk::TypeMismatch,
                            line,
                            format!("function '{}' used as a value", name),
                            Some(name.clone()),
                        );
                        None
                    }
                    SymbolKind::Variable { ty, initialized } => {
                        if !initialized {
                            self.diags.semantic(
                                Sk::UseBeforeInit,
                                line,
                                format!("variable '{}' read before initialization", name),
                                Some(name.clone()),
                            );
                        }
                        Some(ty)
                    }
                },
            },
            ExprKind::Binary { op, lhs, rhs } => {
                let op = *op;
                let lt = self.type_expr(lhs);
                let rt = self.type_expr(rhs);
                match (lt, rt) {
                    (Some(a), Some(b)) => self.binary_result(op, a, b, line),
                    _ => None,
                }
            }
            ExprKind::Unary { op, operand } => {
                let op = *op;
                let ot = self.type_expr(operand)?;
                match op {
                    UnaryOp::Neg => Some(arith_result(ot, Type::Int)),
                    UnaryOp::Not => {
                        if is_integral(ot) {
                            Some(Type::Int)
                        } else {
                            self.diags.semantic(
                                Sk::TypeMismatch,
                                line,
                                format!("operand of '!' must be integral, found {}", ot),
                                None,
                            );
                            None
                        }
                    }
                }
            }
            ExprKind::Call { callee, args } => {
                let sig = match self.table.lookup(callee) {
                    None => {
                        self.diags.semantic(
                            Sk::Undeclared,
                            line,
                            format!("call to undeclared function '{}'", callee),
                            Some(callee.clone()),
                        );
                        None
                    }
                    Some(sym) => match &sym.kind {
                        SymbolKind::Variable { .. } => {
                            self.diags.semantic(
                                Sk::TypeMismatch,
                                line,
                                format!("'{}' is not a function", callee),
                                Some(callee.clone()),
                            );
                            None
                        }
                        SymbolKind::Function { ret, params } => Some((*ret, params.clone())),
                    },
                };
                let callee = callee.clone();
                let mut arg_tys = Vec::with_capacity(args.len());
                for a in args.iter_mut() {
                    arg_tys.push(self.type_expr(a));
                }
                let (ret, params) = sig?;
                if arg_tys.len() != params.len() {
                    self.diags.semantic(
                        Sk::Arity,
                        line,
                        format!(
                            "'{}' expects {} argument(s), got {}",
                            callee,
                            params.len(),
                            arg_tys.len()
                        ),
                        Some(callee.clone()),
                    );
                } else {
                    for (i, (want, got)) in params.iter().zip(arg_tys.iter()).enumerate() {
                        if let Some(got) = got {
                            if !assignable(*want, *got) {
                                self.diags.semantic(
                                    Sk::Narrowing,
                                    line,
                                    format!(
                                        "argument {} of '{}': cannot pass {} value as {}",
                                        i + 1,
                                        callee,
                                        got,
                                        want
                                    ),
                                    Some(callee.clone()),
                                );
                            }
                        }
                    }
                }
                Some(ret)
            }
        };
        e.ty = ty;
        ty
    }

    fn binary_result(&mut self, op: BinaryOp, a: Type, b: Type, line: u32) -> Option<Type> {
        match op {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                Some(arith_result(a, b))
            }
            BinaryOp::Mod => {
                if is_integral(a) && is_integral(b) {
                    Some(Type::Int)
                } else {
                    self.diags.semantic(
                        Sk::TypeMismatch,
                        line,
                        format!("operands of '%' must be integral, found {} and {}", a, b),
                        None,
                    );
                    None
                }
            }
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
                Some(Type::Int)
            }
            BinaryOp::And | BinaryOp::Or => {
                if is_integral(a) && is_integral(b) {
                    Some(Type::Int)
                } else {
                    self.diags.semantic(
                        Sk::TypeMismatch,
                        line,
                        format!("operands of '{}' must be integral, found {} and {}", op, a, b),
                        None,
                    );
                    None
                }
            }
        }
    }
}

/// Does this statement list guarantee a `return` on every control path?
/// Structural check: a trailing return, or an if/elif/else chain whose arms
/// all terminate. Loops are never counted on to run.
fn block_must_return(body: &[Stmt]) -> bool {
    body.iter().any(stmt_must_return)
}

fn stmt_must_return(s: &Stmt) -> bool {
    match &s.kind {
        StmtKind::Return { .. } => true,
        StmtKind::Block { body } => block_must_return(body),
        StmtKind::If { then_block, elifs, else_block, .. } => match else_block {
            Some(eb) => {
                block_must_return(then_block)
                    && elifs.iter().all(|(_, b)| block_must_return(b))
                    && block_must_return(eb)
            }
            None => false,
        },
        _ => false,
    }
}

/// Walk the program in source order: populate the symbol table, type-check,
/// and annotate every expression with its resolved type. Errors land on
/// `diags`; analysis continues statement by statement. The returned table
/// holds the global frame for later inspection.
pub fn analyze(program: &mut Program, diags: &mut Diagnostics) -> SymbolTable {
    let mut an = Analyzer::new(diags);
    for s in program.items.iter_mut() {
        an.check_stmt(s);
    }
    an.table
}
