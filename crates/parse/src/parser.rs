use diag::Diagnostics;
use lex::{Keyword as Kw, LiteralKind, Punctuator as P, Token, TokenKind as K};

use crate::ast::*;

/// A syntax error caught inside a statement; the parse loop converts it
/// into a SYNTAX diagnostic and synchronizes.
#[derive(Debug)]
struct SyntaxError {
    line: u32,
    message: String,
    lexeme: Option<String>,
}

type PResult<T> = Result<T, SyntaxError>;

pub struct Parser<'a> {
    toks: &'a [Token],
    pos: usize,
    /// errors recovered from so far, flushed to diagnostics at the end
    pending: Vec<SyntaxError>,
}

impl<'a> Parser<'a> {
    pub fn new(toks: &'a [Token]) -> Self {
        Self { toks, pos: 0, pending: Vec::new() }
    }

    fn peek(&self) -> &Token {
        // the EOF sentinel is always present, so indexing never runs off
        self.toks.get(self.pos).unwrap_or(&self.toks[self.toks.len() - 1])
    }
    fn line(&self) -> u32 {
        self.peek().line
    }
    fn at_eof(&self) -> bool {
        self.peek().is_eof()
    }

    fn err<S: Into<String>>(&self, message: S) -> SyntaxError {
        let t = self.peek();
        SyntaxError {
            line: t.line,
            message: message.into(),
            lexeme: if t.is_eof() { None } else { Some(t.lexeme.clone()) },
        }
    }

    fn check_punct(&self, p: P) -> bool {
        matches!(self.peek().kind, K::Punct(pp) if pp == p)
    }
    fn check_keyword(&self, kw: Kw) -> bool {
        matches!(self.peek().kind, K::Keyword(k) if k == kw)
    }
    fn consume_punct(&mut self, p: P) -> bool {
        if self.check_punct(p) {
            self.pos += 1;
            return true;
        }
        false
    }
    fn consume_keyword(&mut self, kw: Kw) -> bool {
        if self.check_keyword(kw) {
            self.pos += 1;
            return true;
        }
        false
    }
    fn expect_punct(&mut self, p: P, what: &str) -> PResult<()> {
        if self.consume_punct(p) {
            Ok(())
        } else {
            Err(self.err(format!("expected {} ({:?})", what, p)))
        }
    }
    fn expect_ident(&mut self, what: &str) -> PResult<String> {
        match &self.peek().kind {
            K::Identifier(s) => {
                let s = s.clone();
                self.pos += 1;
                Ok(s)
            }
            _ => Err(self.err(format!("expected {}", what))),
        }
    }

    fn peek_type(&self) -> Option<Type> {
        match self.peek().kind {
            K::Keyword(Kw::Int) => Some(Type::Int),
            K::Keyword(Kw::Float) => Some(Type::Float),
            K::Keyword(Kw::Char) => Some(Type::Char),
            _ => None,
        }
    }
    fn expect_type(&mut self) -> PResult<Type> {
        match self.peek_type() {
            Some(ty) => {
                self.pos += 1;
                Ok(ty)
            }
            None => Err(self.err("expected type (int, float or char)")),
        }
    }

    fn starts_statement(kind: &K) -> bool {
        matches!(
            kind,
            K::Keyword(
                Kw::Int
                    | Kw::Float
                    | Kw::Char
                    | Kw::Func
                    | Kw::If
                    | Kw::While
                    | Kw::Loop
                    | Kw::For
                    | Kw::Return
                    | Kw::Print
                    | Kw::Input
            ) | K::Punct(P::LBrace)
        )
    }

    /// Skip to the next likely statement boundary: past a `;`, or up to a
    /// `}` or statement-starting keyword. `stmt_start` guards progress when
    /// the error happened on the very first token of the statement.
    fn synchronize(&mut self, stmt_start: usize) {
        if self.pos == stmt_start && !self.at_eof() {
            self.pos += 1;
        }
        while !self.at_eof() {
            if self.consume_punct(P::Semicolon) {
                return;
            }
            if self.check_punct(P::RBrace) || Self::starts_statement(&self.peek().kind) {
                return;
            }
            self.pos += 1;
        }
    }

    // ===== Expressions =====

    fn parse_primary(&mut self) -> PResult<Expr> {
        let line = self.line();
        let kind = self.peek().kind.clone();
        match kind {
            K::Literal(LiteralKind::Int(v)) => {
                self.pos += 1;
                Ok(Expr::new(ExprKind::IntLit(v), line))
            }
            K::Literal(LiteralKind::Float(v)) => {
                self.pos += 1;
                Ok(Expr::new(ExprKind::FloatLit(v), line))
            }
            K::Literal(LiteralKind::Char(c)) => {
                self.pos += 1;
                Ok(Expr::new(ExprKind::CharLit(c), line))
            }
            K::Keyword(Kw::True) => {
                self.pos += 1;
                Ok(Expr::new(ExprKind::IntLit(1), line))
            }
            K::Keyword(Kw::False) => {
                self.pos += 1;
                Ok(Expr::new(ExprKind::IntLit(0), line))
            }
            K::Identifier(name) => {
                self.pos += 1;
                if self.consume_punct(P::LParen) {
                    let mut args = Vec::new();
                    if !self.consume_punct(P::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if self.consume_punct(P::Comma) {
                                continue;
                            }
                            self.expect_punct(P::RParen, "')' after call arguments")?;
                            break;
                        }
                    }
                    return Ok(Expr::new(ExprKind::Call { callee: name, args }, line));
                }
                Ok(Expr::new(ExprKind::VarRef(name), line))
            }
            K::Punct(P::LParen) => {
                self.pos += 1;
                let e = self.parse_expr()?;
                self.expect_punct(P::RParen, "')'")?;
                Ok(e)
            }
            _ => Err(self.err("expected expression")),
        }
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let line = self.line();
        if self.consume_punct(P::Bang) {
            let operand = Box::new(self.parse_unary()?);
            return Ok(Expr::new(ExprKind::Unary { op: UnaryOp::Not, operand }, line));
        }
        if self.consume_punct(P::Minus) {
            let operand = Box::new(self.parse_unary()?);
            return Ok(Expr::new(ExprKind::Unary { op: UnaryOp::Neg, operand }, line));
        }
        self.parse_primary()
    }

    fn binop_at(&self, level: usize) -> Option<BinaryOp> {
        // precedence levels, lowest first; all left-associative
        const LEVELS: &[&[(P, BinaryOp)]] = &[
            &[(P::OrOr, BinaryOp::Or)],
            &[(P::AndAnd, BinaryOp::And)],
            &[(P::Eq, BinaryOp::Eq), (P::Ne, BinaryOp::Ne)],
            &[
                (P::Lt, BinaryOp::Lt),
                (P::Gt, BinaryOp::Gt),
                (P::Le, BinaryOp::Le),
                (P::Ge, BinaryOp::Ge),
            ],
            &[(P::Plus, BinaryOp::Add), (P::Minus, BinaryOp::Sub)],
            &[
                (P::Star, BinaryOp::Mul),
                (P::Slash, BinaryOp::Div),
                (P::Percent, BinaryOp::Mod),
            ],
        ];
        let table = LEVELS[level];
        if let K::Punct(p) = self.peek().kind {
            for (pp, op) in table {
                if *pp == p {
                    return Some(*op);
                }
            }
        }
        None
    }

    fn parse_binary(&mut self, level: usize) -> PResult<Expr> {
        if level == 6 {
            return self.parse_unary();
        }
        let mut lhs = self.parse_binary(level + 1)?;
        while let Some(op) = self.binop_at(level) {
            let line = self.line();
            self.pos += 1;
            let rhs = self.parse_binary(level + 1)?;
            lhs = Expr::new(
                ExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
                line,
            );
        }
        Ok(lhs)
    }

    fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_binary(0)
    }

    // ===== Statements =====

    fn parse_block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect_punct(P::LBrace, "'{'")?;
        Ok(self.parse_block_body())
    }

    /// Parse statements up to the matching `}`. Errors inside individual
    /// statements are recorded and recovered from; the brace structure is
    /// what we refuse to lose track of.
    fn parse_block_body(&mut self) -> Vec<Stmt> {
        let mut items = Vec::new();
        loop {
            if self.consume_punct(P::RBrace) {
                break;
            }
            // stray semicolons are as harmless here as at top level
            if self.consume_punct(P::Semicolon) {
                continue;
            }
            if self.at_eof() {
                let e = self.err("expected '}' before end of input");
                self.pending.push(e);
                break;
            }
            let start = self.pos;
            match self.parse_stmt() {
                Ok(s) => items.push(s),
                Err(e) => {
                    self.pending.push(e);
                    self.synchronize(start);
                }
            }
        }
        items
    }

    fn parse_var_decl(&mut self) -> PResult<Stmt> {
        let line = self.line();
        let ty = self.expect_type()?;
        let name = self.expect_ident("variable name")?;
        let init = if self.consume_punct(P::Assign) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect_punct(P::Semicolon, "';' after declaration")?;
        Ok(Stmt::new(StmtKind::VarDecl { ty, name, init }, line))
    }

    fn parse_func_decl(&mut self) -> PResult<Stmt> {
        let line = self.line();
        self.pos += 1; // 'func'
        let ret = self.expect_type()?;
        let name = self.expect_ident("function name")?;
        self.expect_punct(P::LParen, "'(' after function name")?;
        let mut params = Vec::new();
        if !self.consume_punct(P::RParen) {
            loop {
                let pty = self.expect_type()?;
                let pname = self.expect_ident("parameter name")?;
                params.push(Param { ty: pty, name: pname });
                if self.consume_punct(P::Comma) {
                    continue;
                }
                self.expect_punct(P::RParen, "')' after parameters")?;
                break;
            }
        }
        let body = self.parse_block()?;
        Ok(Stmt::new(StmtKind::FuncDecl { ret, name, params, body }, line))
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        let line = self.line();
        self.pos += 1; // 'if'
        self.expect_punct(P::LParen, "'(' after 'if'")?;
        let cond = self.parse_expr()?;
        self.expect_punct(P::RParen, "')' after condition")?;
        let then_block = self.parse_block()?;
        let mut elifs = Vec::new();
        let mut else_block = None;
        loop {
            if self.consume_keyword(Kw::Elif) {
                self.expect_punct(P::LParen, "'(' after 'elif'")?;
                let c = self.parse_expr()?;
                self.expect_punct(P::RParen, "')' after condition")?;
                let b = self.parse_block()?;
                elifs.push((c, b));
                continue;
            }
            if self.consume_keyword(Kw::Else) {
                else_block = Some(self.parse_block()?);
            }
            break;
        }
        Ok(Stmt::new(StmtKind::If { cond, then_block, elifs, else_block }, line))
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        let line = self.line();
        self.pos += 1; // 'while'
        self.expect_punct(P::LParen, "'(' after 'while'")?;
        let cond = self.parse_expr()?;
        self.expect_punct(P::RParen, "')' after condition")?;
        let body = self.parse_block()?;
        Ok(Stmt::new(StmtKind::While { cond, body }, line))
    }

    fn parse_loop(&mut self) -> PResult<Stmt> {
        let line = self.line();
        self.pos += 1; // 'loop' or its synonym 'for'
        if !self.consume_keyword(Kw::From) {
            return Err(self.err("expected 'from' after 'loop'"));
        }
        let var = self.expect_ident("loop variable")?;
        self.expect_punct(P::Assign, "'=' after loop variable")?;
        let start = self.parse_expr()?;
        if !self.consume_keyword(Kw::To) {
            return Err(self.err("expected 'to' after loop start"));
        }
        let end = self.parse_expr()?;
        let step = if self.consume_keyword(Kw::Step) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(Stmt::new(StmtKind::For { var, start, end, step, body }, line))
    }

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        let line = self.line();

        if self.peek_type().is_some() {
            return self.parse_var_decl();
        }
        if self.check_keyword(Kw::Func) {
            return self.parse_func_decl();
        }
        if self.check_keyword(Kw::If) {
            return self.parse_if();
        }
        if self.check_keyword(Kw::While) {
            return self.parse_while();
        }
        if self.check_keyword(Kw::Loop) || self.check_keyword(Kw::For) {
            return self.parse_loop();
        }
        if self.consume_keyword(Kw::Return) {
            let expr = if self.check_punct(P::Semicolon) {
                None
            } else {
                Some(self.parse_expr()?)
            };
            self.expect_punct(P::Semicolon, "';' after return")?;
            return Ok(Stmt::new(StmtKind::Return { expr }, line));
        }
        if self.consume_keyword(Kw::Print) {
            let expr = self.parse_expr()?;
            self.expect_punct(P::Semicolon, "';' after print")?;
            return Ok(Stmt::new(StmtKind::Print { expr }, line));
        }
        if self.consume_keyword(Kw::Input) {
            let name = self.expect_ident("variable name after 'input'")?;
            self.expect_punct(P::Semicolon, "';' after input")?;
            return Ok(Stmt::new(StmtKind::Input { name }, line));
        }
        if self.consume_punct(P::LBrace) {
            let body = self.parse_block_body();
            return Ok(Stmt::new(StmtKind::Block { body }, line));
        }
        if self.check_keyword(Kw::Elif) || self.check_keyword(Kw::Else) {
            return Err(self.err("'elif'/'else' without a preceding 'if'"));
        }

        // assignment or expression statement, both starting with an identifier
        if let K::Identifier(name) = self.peek().kind.clone() {
            if matches!(self.toks.get(self.pos + 1).map(|t| &t.kind), Some(K::Punct(P::Assign))) {
                self.pos += 2; // IDENT '='
                let expr = self.parse_expr()?;
                self.expect_punct(P::Semicolon, "';' after assignment")?;
                return Ok(Stmt::new(StmtKind::Assign { name, expr }, line));
            }
        }
        let expr = self.parse_expr()?;
        self.expect_punct(P::Semicolon, "';' after expression")?;
        Ok(Stmt::new(StmtKind::ExprStmt { expr }, line))
    }
}

/// Parse an EOF-terminated token list into a `Program`. Never panics:
/// syntax errors are recorded on `diags` and parsing resumes at the next
/// synchronization point, so the returned AST may be partial.
pub fn parse_program(toks: &[Token], diags: &mut Diagnostics) -> Program {
    if toks.is_empty() {
        return Program::default();
    }
    debug_assert!(toks.last().map(|t| t.is_eof()).unwrap_or(false));
    let mut p = Parser::new(toks);
    let mut items = Vec::new();
    while !p.at_eof() {
        // stray semicolons at top level are harmless
        if p.consume_punct(P::Semicolon) {
            continue;
        }
        let start = p.pos;
        match p.parse_stmt() {
            Ok(s) => items.push(s),
            Err(e) => {
                p.pending.push(e);
                p.synchronize(start);
            }
        }
    }
    for e in p.pending.drain(..) {
        diags.syntax(e.line, e.message, e.lexeme);
    }
    Program { items }
}
