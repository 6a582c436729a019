//! Abstract interpretation of TAC listings, used to check that the
//! optimizer preserves observable behavior: the PRINT sequence and the
//! final values of allocated variables.

use diag::Diagnostics;
use parse::{BinaryOp, Type, UnaryOp};
use std::collections::HashMap;
use tac::{Instr, Operand};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Value {
    Int(i64),
    Float(f64),
    Char(char),
}

impl Value {
    fn default_for(ty: Type) -> Value {
        match ty {
            Type::Int => Value::Int(0),
            Type::Float => Value::Float(0.0),
            Type::Char => Value::Char('\0'),
        }
    }
    fn truthy(self) -> bool {
        match self {
            Value::Int(v) => v != 0,
            Value::Float(v) => v != 0.0,
            Value::Char(c) => c != '\0',
        }
    }
    fn as_i64(self) -> i64 {
        match self {
            Value::Int(v) => v,
            Value::Float(v) => v as i64,
            Value::Char(c) => c as i64,
        }
    }
    fn as_f64(self) -> f64 {
        match self {
            Value::Int(v) => v as f64,
            Value::Float(v) => v,
            Value::Char(c) => c as u32 as f64,
        }
    }
    fn render(self) -> String {
        match self {
            Value::Int(v) => format!("{}", v),
            Value::Float(v) => format!("{:?}", v),
            Value::Char(c) => format!("{}", c),
        }
    }
}

#[derive(Default)]
struct Env {
    names: HashMap<String, Value>,
    temps: HashMap<u32, Value>,
}

struct Machine<'a> {
    code: &'a [Instr],
    labels: HashMap<String, usize>,
    globals: Env,
    frames: Vec<Env>,
    arg_stack: Vec<Value>,
    call_stack: Vec<(usize, Option<Operand>)>,
    output: Vec<String>,
    inputs: Vec<Value>,
}

impl<'a> Machine<'a> {
    fn new(code: &'a [Instr], inputs: Vec<Value>) -> Self {
        let mut labels = HashMap::new();
        for (p, i) in code.iter().enumerate() {
            if let Instr::Label(l) = i {
                labels.insert(l.clone(), p);
            }
        }
        Self {
            code,
            labels,
            globals: Env::default(),
            frames: Vec::new(),
            arg_stack: Vec::new(),
            call_stack: Vec::new(),
            output: Vec::new(),
            inputs,
        }
    }

    fn read(&self, op: &Operand) -> Result<Value, String> {
        match op {
            Operand::Int(v) => Ok(Value::Int(*v)),
            Operand::Float(v) => Ok(Value::Float(*v)),
            Operand::Char(c) => Ok(Value::Char(*c)),
            Operand::Var(n) => self
                .frames
                .last()
                .and_then(|f| f.names.get(n))
                .or_else(|| self.globals.names.get(n))
                .copied()
                .ok_or_else(|| format!("read of unknown variable {}", n)),
            Operand::Temp(i) => self
                .frames
                .last()
                .and_then(|f| f.temps.get(i))
                .or_else(|| self.globals.temps.get(i))
                .copied()
                .ok_or_else(|| format!("read of undefined temp t{}", i)),
        }
    }

    fn write_name(&mut self, name: &str, v: Value) {
        if let Some(f) = self.frames.last_mut() {
            if f.names.contains_key(name) || !self.globals.names.contains_key(name) {
                f.names.insert(name.to_string(), v);
                return;
            }
        }
        self.globals.names.insert(name.to_string(), v);
    }

    fn write(&mut self, dest: &Operand, v: Value) -> Result<(), String> {
        match dest {
            Operand::Var(n) => {
                self.write_name(n, v);
                Ok(())
            }
            Operand::Temp(i) => {
                match self.frames.last_mut() {
                    Some(f) => f.temps.insert(*i, v),
                    None => self.globals.temps.insert(*i, v),
                };
                Ok(())
            }
            other => Err(format!("write to non-place operand {}", other)),
        }
    }

    fn binary(op: BinaryOp, a: Value, b: Value) -> Result<Value, String> {
        let float = matches!(a, Value::Float(_)) || matches!(b, Value::Float(_));
        Ok(match op {
            BinaryOp::Add if float => Value::Float(a.as_f64() + b.as_f64()),
            BinaryOp::Sub if float => Value::Float(a.as_f64() - b.as_f64()),
            BinaryOp::Mul if float => Value::Float(a.as_f64() * b.as_f64()),
            BinaryOp::Div if float => {
                if b.as_f64() == 0.0 {
                    return Err("division by zero".to_string());
                }
                Value::Float(a.as_f64() / b.as_f64())
            }
            BinaryOp::Add => Value::Int(a.as_i64().wrapping_add(b.as_i64())),
            BinaryOp::Sub => Value::Int(a.as_i64().wrapping_sub(b.as_i64())),
            BinaryOp::Mul => Value::Int(a.as_i64().wrapping_mul(b.as_i64())),
            BinaryOp::Div => {
                if b.as_i64() == 0 {
                    return Err("division by zero".to_string());
                }
                Value::Int(a.as_i64().wrapping_div(b.as_i64()))
            }
            BinaryOp::Mod => {
                if b.as_i64() == 0 {
                    return Err("modulo by zero".to_string());
                }
                Value::Int(a.as_i64().wrapping_rem(b.as_i64()))
            }
            BinaryOp::Eq => Value::Int((a.as_f64() == b.as_f64()) as i64),
            BinaryOp::Ne => Value::Int((a.as_f64() != b.as_f64()) as i64),
            BinaryOp::Lt => Value::Int((a.as_f64() < b.as_f64()) as i64),
            BinaryOp::Gt => Value::Int((a.as_f64() > b.as_f64()) as i64),
            BinaryOp::Le => Value::Int((a.as_f64() <= b.as_f64()) as i64),
            BinaryOp::Ge => Value::Int((a.as_f64() >= b.as_f64()) as i64),
            BinaryOp::And => Value::Int((a.truthy() && b.truthy()) as i64),
            BinaryOp::Or => Value::Int((a.truthy() || b.truthy()) as i64),
        })
    }

    fn run(mut self) -> Result<(Vec<String>, HashMap<String, Value>), String> {
        let mut pc = 0usize;
        let mut steps = 0u64;
        while pc < self.code.len() {
            steps += 1;
            if steps > 1_000_000 {
                return Err("step limit exceeded".to_string());
            }
            let instr = &self.code[pc];
            pc += 1;
            match instr {
                Instr::Alloc { name, ty } => {
                    let v = Value::default_for(*ty);
                    match self.frames.last_mut() {
                        Some(f) => {
                            f.names.insert(name.clone(), v);
                        }
                        None => {
                            self.globals.names.insert(name.clone(), v);
                        }
                    }
                }
                Instr::Copy { dest, src } => {
                    let v = self.read(src)?;
                    self.write(dest, v)?;
                }
                Instr::Unary { dest, op, src } => {
                    let v = self.read(src)?;
                    let r = match op {
                        UnaryOp::Neg => match v {
                            Value::Float(f) => Value::Float(-f),
                            other => Value::Int(-other.as_i64()),
                        },
                        UnaryOp::Not => Value::Int(!v.truthy() as i64),
                    };
                    self.write(dest, r)?;
                }
                Instr::Binary { dest, op, lhs, rhs } => {
                    let a = self.read(lhs)?;
                    let b = self.read(rhs)?;
                    let r = Self::binary(*op, a, b)?;
                    self.write(dest, r)?;
                }
                Instr::Label(_) => {}
                Instr::Goto(l) => {
                    pc = *self.labels.get(l).ok_or_else(|| format!("undefined label {}", l))?;
                }
                Instr::IfFalse { cond, target } => {
                    if !self.read(cond)?.truthy() {
                        pc = *self
                            .labels
                            .get(target)
                            .ok_or_else(|| format!("undefined label {}", target))?;
                    }
                }
                Instr::IfTrue { cond, target } => {
                    if self.read(cond)?.truthy() {
                        pc = *self
                            .labels
                            .get(target)
                            .ok_or_else(|| format!("undefined label {}", target))?;
                    }
                }
                Instr::Param(x) => {
                    let v = self.read(x)?;
                    self.arg_stack.push(v);
                }
                Instr::Pop { name } => {
                    let v = self.arg_stack.pop().ok_or("POP from empty argument stack")?;
                    match self.frames.last_mut() {
                        Some(f) => {
                            f.names.insert(name.clone(), v);
                        }
                        None => {
                            self.globals.names.insert(name.clone(), v);
                        }
                    }
                }
                Instr::Call { func, dest, .. } => {
                    self.call_stack.push((pc, dest.clone()));
                    self.frames.push(Env::default());
                    pc = *self
                        .labels
                        .get(func)
                        .ok_or_else(|| format!("call to undefined function {}", func))?;
                }
                Instr::Ret(val) => {
                    let rv = match val {
                        Some(x) => Some(self.read(x)?),
                        None => None,
                    };
                    self.frames.pop();
                    match self.call_stack.pop() {
                        Some((ret_pc, dest)) => {
                            if let (Some(d), Some(v)) = (dest, rv) {
                                self.write(&d, v)?;
                            }
                            pc = ret_pc;
                        }
                        None => break,
                    }
                }
                Instr::Print(x) => {
                    let v = self.read(x)?;
                    self.output.push(v.render());
                }
                Instr::Input { name } => {
                    if self.inputs.is_empty() {
                        return Err("input exhausted".to_string());
                    }
                    let v = self.inputs.remove(0);
                    self.write_name(name, v);
                }
            }
        }
        Ok((self.output, self.globals.names))
    }
}

fn compile_both(src: &str) -> (Vec<Instr>, Vec<Instr>) {
    let mut ds = Diagnostics::new();
    let toks = lex::tokenize(src, &mut ds);
    let mut prog = parse::parse_program(&toks, &mut ds);
    sema::analyze(&mut prog, &mut ds);
    assert!(!ds.has_errors(), "input must be well-typed: {}", ds);
    let raw = tac::lower(&prog).expect("lowering succeeds");
    let optimized = opt::optimize(raw.clone(), &mut ds);
    (raw, optimized)
}

fn run(code: &[Instr]) -> (Vec<String>, HashMap<String, Value>) {
    Machine::new(code, Vec::new()).run().expect("interpretation succeeds")
}

#[test]
fn if_elif_else_picks_exactly_one_arm() {
    let src = "int s; s = 85; if (s >= 90) { print 1; } elif (s >= 80) { print 2; } else { print 0; }";
    let (raw, optd) = compile_both(src);
    assert_eq!(run(&raw).0, vec!["2"]);
    assert_eq!(run(&optd).0, vec!["2"]);
}

#[test]
fn counted_loop_sums_to_55() {
    let src = "int sum; sum = 0; loop from i = 1 to 10 { sum = sum + i; } print sum;";
    let (raw, optd) = compile_both(src);
    assert_eq!(run(&raw).0, vec!["55"]);
    assert_eq!(run(&optd).0, vec!["55"]);
}

#[test]
fn recursive_factorial_prints_120() {
    let src = "func int factorial(int n) { \
                 if (n <= 1) { return 1; } else { return n * factorial(n - 1); } \
               } \
               print factorial(5);";
    let (raw, optd) = compile_both(src);
    assert_eq!(run(&raw).0, vec!["120"]);
    assert_eq!(run(&optd).0, vec!["120"]);
}

#[test]
fn short_circuit_guards_division() {
    // without short-circuit evaluation the rhs would trap on 10 / a
    let src = "int a; a = 0; int r; r = a != 0 && (10 / a) > 0; print r;";
    let (raw, optd) = compile_both(src);
    assert_eq!(run(&raw).0, vec!["0"]);
    assert_eq!(run(&optd).0, vec!["0"]);
}

#[test]
fn or_skips_rhs_when_lhs_holds() {
    let src = "int a; a = 1; int r; r = a == 1 || (10 / (a - 1)) > 0; print r;";
    let (raw, optd) = compile_both(src);
    assert_eq!(run(&raw).0, vec!["1"]);
    assert_eq!(run(&optd).0, vec!["1"]);
}

#[test]
fn optimizer_preserves_output_and_final_variables() {
    let srcs = [
        "int x; x = 10; x = 20; print x;",
        "int a = 2; int b; b = a * 1 + 0; print b; print b * 3;",
        "float f = 1.5; float g; g = f * 2.0 + 1.0; print g;",
        "char c = 'a'; int n; n = c + 1; print n;",
        "int i; i = 0; int s; s = 0; while (i < 5) { s = s + i; i = i + 1; } print s;",
        "func int sq(int v) { return v * v; } int t; t = sq(3) + sq(4); print t;",
        "int x = 1; { float x = 2.5; print x; } print x;",
        "loop from i = 0 to 10 step 3 { print i; }",
    ];
    for src in srcs {
        let (raw, optd) = compile_both(src);
        let (out_a, vars_a) = run(&raw);
        let (out_b, vars_b) = run(&optd);
        assert_eq!(out_a, out_b, "output diverged for {:?}", src);
        // optimized listings may drop dead variables entirely, but any
        // variable both listings still hold must agree
        for (name, v) in &vars_b {
            assert_eq!(vars_a.get(name), Some(v), "final value of {} diverged for {:?}", name, src);
        }
    }
}

#[test]
fn input_feeds_variables_in_order() {
    let src = "int a; int b; input a; input b; print a + b;";
    let (raw, optd) = compile_both(src);
    for code in [&raw, &optd] {
        let (out, _) = Machine::new(code, vec![Value::Int(3), Value::Int(4)])
            .run()
            .expect("runs");
        assert_eq!(out, vec!["7"]);
    }
}

#[test]
fn dead_code_elimination_keeps_final_store_only() {
    let (_, optd) = compile_both("int x; x = 10; x = 20; print x;");
    let assigns = optd
        .iter()
        .filter(|i| matches!(i.dest(), Some(Operand::Var(n)) if n == "x"))
        .count();
    assert_eq!(assigns, 1);
    let (out, vars) = run(&optd);
    assert_eq!(out, vec!["20"]);
    assert_eq!(vars.get("x"), Some(&Value::Int(20)));
}
