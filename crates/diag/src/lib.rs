use std::fmt;

/// Which phase (or rule) produced a diagnostic. `Lexical`, `Syntax` and
/// `Semantic` errors stop the pipeline at the next phase boundary;
/// `Warning` and `Internal` do not gate by themselves (`Internal` means
/// the compiler itself is broken and is surfaced separately).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagKind {
    Lexical,
    Syntax,
    Semantic(SemanticKind),
    Warning,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticKind {
    Undeclared,
    Redeclaration,
    TypeMismatch,
    Narrowing,
    UseBeforeInit,
    Arity,
    NonIntegralCondition,
    ReturnOutsideFunc,
}

impl fmt::Display for DiagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagKind::Lexical => write!(f, "LEXICAL"),
            DiagKind::Syntax => write!(f, "SYNTAX"),
            DiagKind::Semantic(k) => write!(f, "SEMANTIC/{}", k),
            DiagKind::Warning => write!(f, "WARNING"),
            DiagKind::Internal => write!(f, "INTERNAL"),
        }
    }
}

impl fmt::Display for SemanticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SemanticKind::Undeclared => "UNDECLARED",
            SemanticKind::Redeclaration => "REDECLARATION",
            SemanticKind::TypeMismatch => "TYPE_MISMATCH",
            SemanticKind::Narrowing => "NARROWING",
            SemanticKind::UseBeforeInit => "USE_BEFORE_INIT",
            SemanticKind::Arity => "ARITY",
            SemanticKind::NonIntegralCondition => "NON_INTEGRAL_CONDITION",
            SemanticKind::ReturnOutsideFunc => "RETURN_OUTSIDE_FUNC",
        };
        write!(f, "{}", s)
    }
}

/// One reported problem: kind, one-based source line, message, and the
/// offending lexeme when one is available.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagKind,
    pub line: u32,
    pub message: String,
    pub lexeme: Option<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [line {}] {}", self.kind, self.line, self.message)?;
        if let Some(lx) = &self.lexeme {
            write!(f, " ('{}')", lx)?;
        }
        Ok(())
    }
}

/// The accumulator shared by every phase. Phases only append; the pipeline
/// controller reads `has_errors()` at each boundary to decide whether to
/// continue.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, d: Diagnostic) {
        self.entries.push(d);
    }

    pub fn lexical<S: Into<String>>(&mut self, line: u32, message: S, lexeme: Option<String>) {
        self.push(Diagnostic { kind: DiagKind::Lexical, line, message: message.into(), lexeme });
    }

    pub fn syntax<S: Into<String>>(&mut self, line: u32, message: S, lexeme: Option<String>) {
        self.push(Diagnostic { kind: DiagKind::Syntax, line, message: message.into(), lexeme });
    }

    pub fn semantic<S: Into<String>>(
        &mut self,
        kind: SemanticKind,
        line: u32,
        message: S,
        lexeme: Option<String>,
    ) {
        self.push(Diagnostic { kind: DiagKind::Semantic(kind), line, message: message.into(), lexeme });
    }

    pub fn warning<S: Into<String>>(&mut self, line: u32, message: S) {
        self.push(Diagnostic { kind: DiagKind::Warning, line, message: message.into(), lexeme: None });
    }

    pub fn internal<S: Into<String>>(&mut self, message: S) {
        self.push(Diagnostic { kind: DiagKind::Internal, line: 0, message: message.into(), lexeme: None });
    }

    /// True if any gating error (lexical, syntax, semantic) has been recorded.
    /// Warnings never gate; an `Internal` entry is a compiler bug and is
    /// checked separately by the controller.
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| {
            matches!(d.kind, DiagKind::Lexical | DiagKind::Syntax | DiagKind::Semantic(_))
        })
    }

    pub fn has_internal(&self) -> bool {
        self.entries.iter().any(|d| d.kind == DiagKind::Internal)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for d in &self.entries {
            writeln!(f, "{}", d)?;
        }
        Ok(())
    }
}
