use parse::{BinaryOp, Type, UnaryOp};
use std::fmt::Write as _;
use tac::{Instr, Operand};

/// Translate an (optimized) TAC listing into pseudo-assembly for a stack
/// machine. The output has a `.data` section built from the ALLOCs and a
/// `.text` section with one short instruction burst per TAC instruction.
pub fn emit_assembly(code: &[Instr]) -> String {
    let mut em = Emitter::new();
    em.emit_data(code);
    em.emit_text(code);
    em.finish()
}

struct Emitter {
    buf: String,
}

impl Emitter {
    fn new() -> Self {
        Self { buf: String::new() }
    }

    fn finish(self) -> String {
        self.buf
    }

    fn line(&mut self, s: &str) {
        let _ = writeln!(self.buf, "  {}", s);
    }

    fn emit_data(&mut self, code: &[Instr]) {
        let _ = writeln!(self.buf, ".data");
        for i in code {
            if let Instr::Alloc { name, ty } = i {
                let bytes = match ty {
                    Type::Int | Type::Float => 4,
                    Type::Char => 1,
                };
                let _ = writeln!(self.buf, "  {}: .space {} ; {}", name, bytes, ty);
            }
        }
    }

    /// Push the value of an operand: literals become immediates, names
    /// become memory loads.
    fn load(&mut self, op: &Operand) {
        if op.is_literal() {
            self.line(&format!("LOAD_IMM {}", op));
        } else {
            self.line(&format!("LOAD {}", op));
        }
    }

    fn store(&mut self, dest: &Operand) {
        self.line(&format!("STORE {}", dest));
    }

    fn binop_mnemonic(op: BinaryOp) -> &'static str {
        match op {
            BinaryOp::Add => "ADD",
            BinaryOp::Sub => "SUB",
            BinaryOp::Mul => "MUL",
            BinaryOp::Div => "DIV",
            BinaryOp::Mod => "MOD",
            BinaryOp::Eq => "CMP_EQ",
            BinaryOp::Ne => "CMP_NE",
            BinaryOp::Lt => "CMP_LT",
            BinaryOp::Gt => "CMP_GT",
            BinaryOp::Le => "CMP_LE",
            BinaryOp::Ge => "CMP_GE",
            // short-circuit lowering eliminates these before codegen;
            // emit the eager forms for robustness
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }

    fn emit_text(&mut self, code: &[Instr]) {
        let _ = writeln!(self.buf, ".text");
        for i in code {
            match i {
                Instr::Alloc { .. } => {}
                Instr::Copy { dest, src } => {
                    self.load(src);
                    self.store(dest);
                }
                Instr::Unary { dest, op, src } => {
                    self.load(src);
                    self.line(match op {
                        UnaryOp::Neg => "NEG",
                        UnaryOp::Not => "NOT",
                    });
                    self.store(dest);
                }
                Instr::Binary { dest, op, lhs, rhs } => {
                    self.load(lhs);
                    self.load(rhs);
                    self.line(Self::binop_mnemonic(*op));
                    self.store(dest);
                }
                Instr::Label(l) => {
                    let _ = writeln!(self.buf, "{}:", l);
                }
                Instr::Goto(l) => self.line(&format!("JMP {}", l)),
                Instr::IfFalse { cond, target } => {
                    self.load(cond);
                    self.line(&format!("JZ {}", target));
                }
                Instr::IfTrue { cond, target } => {
                    self.load(cond);
                    self.line(&format!("JNZ {}", target));
                }
                Instr::Param(x) => self.line(&format!("PUSH {}", x)),
                Instr::Pop { name } => self.line(&format!("POP {}", name)),
                Instr::Call { func, dest, .. } => {
                    self.line(&format!("CALL {}", func));
                    if let Some(d) = dest {
                        self.store(d);
                    }
                }
                Instr::Ret(Some(x)) => {
                    self.load(x);
                    self.line("RET");
                }
                Instr::Ret(None) => self.line("RET"),
                Instr::Print(x) => {
                    self.load(x);
                    self.line("PRINT");
                }
                Instr::Input { name } => {
                    self.line("INPUT");
                    self.store(&Operand::Var(name.clone()));
                }
            }
        }
    }
}
