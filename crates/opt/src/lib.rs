use diag::Diagnostics;
use parse::{BinaryOp, Type, UnaryOp};
use std::collections::{HashMap, HashSet};
use tac::{Instr, Operand};

/// Upper bound on full rewrite passes. Every rule shrinks the listing or
/// replaces an operation with a cheaper one, so a fixpoint is normally
/// reached in two or three passes; the cap guarantees termination even
/// under unforeseen rule interactions.
const MAX_PASSES: usize = 16;

/// Run the local passes to a fixpoint (or the pass cap). Behavior is
/// preserved for well-typed inputs: the PRINT/INPUT/CALL sequence and the
/// final values of ALLOCed variables are untouched.
pub fn optimize(mut code: Vec<Instr>, diags: &mut Diagnostics) -> Vec<Instr> {
    for _ in 0..MAX_PASSES {
        let mut changed = false;
        changed |= fold_constants(&mut code);
        changed |= simplify_algebra(&mut code);
        changed |= propagate_copies(&mut code);
        changed |= eliminate_dead_code(&mut code, diags);
        if !changed {
            break;
        }
    }
    code
}

// ===== Types over the listing =====

/// Types of storage names and temporaries, reconstructed from ALLOCs,
/// literals, and the operator result rules. Temporaries a CALL defines
/// stay unknown; rules that need a type simply skip those.
#[derive(Default)]
struct TypeEnv {
    vars: HashMap<String, Type>,
    temps: HashMap<u32, Type>,
}

impl TypeEnv {
    fn of(&self, op: &Operand) -> Option<Type> {
        match op {
            Operand::Int(_) => Some(Type::Int),
            Operand::Float(_) => Some(Type::Float),
            Operand::Char(_) => Some(Type::Char),
            Operand::Var(n) => self.vars.get(n).copied(),
            Operand::Temp(i) => self.temps.get(i).copied(),
        }
    }

    fn set_dest(&mut self, dest: &Operand, ty: Option<Type>) {
        if let (Operand::Temp(i), Some(t)) = (dest, ty) {
            self.temps.insert(*i, t);
        }
    }
}

fn infer_types(code: &[Instr]) -> TypeEnv {
    let mut env = TypeEnv::default();
    for i in code {
        match i {
            Instr::Alloc { name, ty } => {
                env.vars.insert(name.clone(), *ty);
            }
            Instr::Copy { dest, src } => {
                let t = env.of(src);
                env.set_dest(dest, t);
            }
            Instr::Unary { dest, op, src } => {
                let t = match op {
                    UnaryOp::Not => Some(Type::Int),
                    UnaryOp::Neg => match env.of(src) {
                        Some(Type::Float) => Some(Type::Float),
                        Some(_) => Some(Type::Int),
                        None => None,
                    },
                };
                env.set_dest(dest, t);
            }
            Instr::Binary { dest, op, lhs, rhs } => {
                let t = match op {
                    BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                        match (env.of(lhs), env.of(rhs)) {
                            (Some(Type::Float), _) | (_, Some(Type::Float)) => Some(Type::Float),
                            (Some(_), Some(_)) => Some(Type::Int),
                            _ => None,
                        }
                    }
                    _ => Some(Type::Int),
                };
                env.set_dest(dest, t);
            }
            _ => {}
        }
    }
    env
}

// ===== Constant folding =====

fn as_i64(op: &Operand) -> Option<i64> {
    match op {
        Operand::Int(v) => Some(*v),
        Operand::Char(c) => Some(*c as i64),
        _ => None,
    }
}

fn as_f64(op: &Operand) -> Option<f64> {
    match op {
        Operand::Int(v) => Some(*v as f64),
        Operand::Char(c) => Some(*c as u32 as f64),
        Operand::Float(v) => Some(*v),
        _ => None,
    }
}

fn fold_binary(op: BinaryOp, lhs: &Operand, rhs: &Operand) -> Option<Operand> {
    if !lhs.is_literal() || !rhs.is_literal() {
        return None;
    }
    let float = matches!(lhs, Operand::Float(_)) || matches!(rhs, Operand::Float(_));
    if float {
        let a = as_f64(lhs)?;
        let b = as_f64(rhs)?;
        return Some(match op {
            BinaryOp::Add => Operand::Float(a + b),
            BinaryOp::Sub => Operand::Float(a - b),
            BinaryOp::Mul => Operand::Float(a * b),
            // division by literal zero is left for the runtime to trap
            BinaryOp::Div if b != 0.0 => Operand::Float(a / b),
            BinaryOp::Eq => Operand::Int((a == b) as i64),
            BinaryOp::Ne => Operand::Int((a != b) as i64),
            BinaryOp::Lt => Operand::Int((a < b) as i64),
            BinaryOp::Gt => Operand::Int((a > b) as i64),
            BinaryOp::Le => Operand::Int((a <= b) as i64),
            BinaryOp::Ge => Operand::Int((a >= b) as i64),
            _ => return None,
        });
    }
    let a = as_i64(lhs)?;
    let b = as_i64(rhs)?;
    Some(match op {
        BinaryOp::Add => Operand::Int(a.wrapping_add(b)),
        BinaryOp::Sub => Operand::Int(a.wrapping_sub(b)),
        BinaryOp::Mul => Operand::Int(a.wrapping_mul(b)),
        BinaryOp::Div if b != 0 => Operand::Int(a.wrapping_div(b)),
        BinaryOp::Mod if b != 0 => Operand::Int(a.wrapping_rem(b)),
        BinaryOp::Eq => Operand::Int((a == b) as i64),
        BinaryOp::Ne => Operand::Int((a != b) as i64),
        BinaryOp::Lt => Operand::Int((a < b) as i64),
        BinaryOp::Gt => Operand::Int((a > b) as i64),
        BinaryOp::Le => Operand::Int((a <= b) as i64),
        BinaryOp::Ge => Operand::Int((a >= b) as i64),
        _ => return None,
    })
}

fn fold_unary(op: UnaryOp, src: &Operand) -> Option<Operand> {
    match op {
        UnaryOp::Neg => match src {
            Operand::Int(v) => Some(Operand::Int(v.wrapping_neg())),
            Operand::Float(v) => Some(Operand::Float(-v)),
            Operand::Char(c) => Some(Operand::Int(-(*c as i64))),
            _ => None,
        },
        UnaryOp::Not => as_i64(src).map(|v| Operand::Int((v == 0) as i64)),
    }
}

fn fold_constants(code: &mut [Instr]) -> bool {
    let mut changed = false;
    for i in code.iter_mut() {
        let replacement = match i {
            Instr::Binary { dest, op, lhs, rhs } => {
                fold_binary(*op, lhs, rhs).map(|v| (dest.clone(), v))
            }
            Instr::Unary { dest, op, src } => fold_unary(*op, src).map(|v| (dest.clone(), v)),
            _ => None,
        };
        if let Some((dest, src)) = replacement {
            *i = Instr::Copy { dest, src };
            changed = true;
        }
    }
    changed
}

// ===== Algebraic simplification =====

fn is_int_lit(op: &Operand, v: i64) -> bool {
    matches!(op, Operand::Int(x) if *x == v)
}

/// Identity and absorption rewrites. Only the integer literals 0 and 1
/// trigger, and only when the surviving operand's type is known and the
/// rewrite cannot change the instruction's result type (so `x * 1.0` and
/// char-promoting forms are left alone).
fn simplify_algebra(code: &mut [Instr]) -> bool {
    let env = infer_types(code);
    let mut changed = false;
    for i in code.iter_mut() {
        let Instr::Binary { dest, op, lhs, rhs } = i else { continue };
        let keep: Option<Operand> = match op {
            BinaryOp::Mul if is_int_lit(rhs, 1) => Some(lhs.clone()),
            BinaryOp::Mul if is_int_lit(lhs, 1) => Some(rhs.clone()),
            BinaryOp::Add if is_int_lit(rhs, 0) => Some(lhs.clone()),
            BinaryOp::Add if is_int_lit(lhs, 0) => Some(rhs.clone()),
            BinaryOp::Sub if is_int_lit(rhs, 0) => Some(lhs.clone()),
            BinaryOp::Div if is_int_lit(rhs, 1) => Some(lhs.clone()),
            BinaryOp::Mul if is_int_lit(rhs, 0) || is_int_lit(lhs, 0) => {
                // absorption changes the value's type unless it is int
                let other = if is_int_lit(rhs, 0) { &*lhs } else { &*rhs };
                if env.of(other) == Some(Type::Int) {
                    Some(Operand::Int(0))
                } else {
                    None
                }
            }
            _ => None,
        };
        let Some(keep) = keep else { continue };
        // identity rewrites must preserve the int/float result type
        let ok = match env.of(&keep) {
            Some(Type::Int) | Some(Type::Float) => true,
            _ => matches!(keep, Operand::Int(_)),
        };
        if ok {
            *i = Instr::Copy { dest: dest.clone(), src: keep };
            changed = true;
        }
    }
    changed
}

// ===== Copy propagation =====

fn temp_def_use_counts(code: &[Instr]) -> (HashMap<u32, usize>, HashMap<u32, usize>) {
    let mut defs: HashMap<u32, usize> = HashMap::new();
    let mut uses: HashMap<u32, usize> = HashMap::new();
    for i in code {
        if let Some(Operand::Temp(n)) = i.dest() {
            *defs.entry(*n).or_default() += 1;
        }
        for u in i.used() {
            if let Operand::Temp(n) = u {
                *uses.entry(*n).or_default() += 1;
            }
        }
    }
    (defs, uses)
}

/// `t = x; <instr using t>` becomes `<instr using x>` when `t` is a
/// single-definition temporary with that one use directly after its copy.
/// Adjacency means nothing can redefine `x` in between; the now-dead copy
/// is left for dead-code elimination.
fn propagate_copies(code: &mut Vec<Instr>) -> bool {
    let (defs, uses) = temp_def_use_counts(code);
    let mut changed = false;
    for i in 0..code.len().saturating_sub(1) {
        let Instr::Copy { dest: Operand::Temp(n), src } = &code[i] else { continue };
        let n = *n;
        if defs.get(&n).copied().unwrap_or(0) != 1 || uses.get(&n).copied().unwrap_or(0) != 1 {
            continue;
        }
        let src = src.clone();
        let next = &mut code[i + 1];
        let mut replaced = false;
        for u in next.used_mut() {
            if matches!(u, Operand::Temp(m) if *m == n) {
                *u = src.clone();
                replaced = true;
            }
        }
        changed |= replaced;
    }
    changed
}

// ===== Dead code elimination =====

fn defines_name(i: &Instr, name: &str) -> bool {
    match i {
        Instr::Input { name: n } | Instr::Pop { name: n } => n == name,
        _ => matches!(i.dest(), Some(Operand::Var(n)) if n == name),
    }
}

fn reads_name(i: &Instr, name: &str) -> bool {
    i.used().iter().any(|u| matches!(u, Operand::Var(n) if n == name))
}

/// A store to a variable is dead when, within its straight-line region,
/// the variable is overwritten before any read. Labels, jumps, calls and
/// returns end the region (a call may read any variable).
fn var_store_is_dead(code: &[Instr], at: usize, name: &str) -> bool {
    for j in code.iter().skip(at + 1) {
        if reads_name(j, name) {
            return false;
        }
        if matches!(
            j,
            Instr::Label(_)
                | Instr::Goto(_)
                | Instr::IfFalse { .. }
                | Instr::IfTrue { .. }
                | Instr::Call { .. }
                | Instr::Ret(_)
        ) {
            return false;
        }
        if defines_name(j, name) {
            return true;
        }
    }
    // reaching the end of the listing keeps the store: final variable
    // values are observable
    false
}

fn eliminate_dead_code(code: &mut Vec<Instr>, diags: &mut Diagnostics) -> bool {
    let mut changed = false;

    // unreachable instructions after an unconditional jump or return
    {
        let mut keep = Vec::with_capacity(code.len());
        let mut dead = false;
        for i in code.drain(..) {
            if matches!(i, Instr::Label(_)) {
                dead = false;
            }
            if dead {
                changed = true;
                continue;
            }
            dead = i.ends_flow();
            keep.push(i);
        }
        *code = keep;
    }

    // a GOTO to the label that immediately follows it is a no-op
    {
        let mut j = 0;
        while j + 1 < code.len() {
            let remove = matches!(
                (&code[j], &code[j + 1]),
                (Instr::Goto(a), Instr::Label(b)) if a == b
            );
            if remove {
                code.remove(j);
                changed = true;
            } else {
                j += 1;
            }
        }
    }

    // labels nothing jumps to (calls count as jumps to the function label)
    {
        let referenced: HashSet<String> = code
            .iter()
            .filter_map(|i| i.jump_target().map(|s| s.to_string()))
            .collect();
        let before = code.len();
        code.retain(|i| match i {
            Instr::Label(l) => referenced.contains(l),
            _ => true,
        });
        changed |= code.len() != before;
    }

    // dead stores: unread temporaries and overwritten-before-read variables
    {
        let (_, uses) = temp_def_use_counts(code);
        let mut remove = vec![false; code.len()];
        for (idx, i) in code.iter().enumerate() {
            match i.dest() {
                Some(Operand::Temp(n)) => {
                    if uses.get(n).copied().unwrap_or(0) == 0 && !i.has_side_effects() {
                        remove[idx] = true;
                    }
                }
                Some(Operand::Var(name)) => {
                    if !i.has_side_effects() && var_store_is_dead(code, idx, name) {
                        diags.warning(0, format!("dead store to '{}' eliminated", name));
                        remove[idx] = true;
                    }
                }
                _ => {}
            }
            // a self-copy does nothing
            if let Instr::Copy { dest, src } = i {
                if dest == src {
                    remove[idx] = true;
                }
            }
        }
        if remove.iter().any(|r| *r) {
            let mut idx = 0;
            code.retain(|_| {
                let r = remove[idx];
                idx += 1;
                !r
            });
            changed = true;
        }
    }

    // a call whose result temporary is never read keeps its side effects
    // but drops the dead destination
    {
        let (_, uses) = temp_def_use_counts(code);
        for i in code.iter_mut() {
            if let Instr::Call { dest, .. } = i {
                if let Some(Operand::Temp(n)) = dest {
                    if uses.get(n).copied().unwrap_or(0) == 0 {
                        *dest = None;
                        changed = true;
                    }
                }
            }
        }
    }

    changed
}
