//! The pipeline controller: threads a source text through lexing, parsing,
//! semantic analysis, TAC generation, optimization and assembly emission,
//! gating each phase on the shared diagnostics accumulator.

use diag::Diagnostics;
use lex::Token;
use parse::Program;
use sema::SymbolTable;
use tac::Instr;

/// Everything a compilation produces, partial phases included. Listings
/// for phases that were skipped stay empty.
pub struct Artifacts {
    pub tokens: Vec<Token>,
    pub program: Program,
    pub symbols: SymbolTable,
    pub tac: Vec<Instr>,
    pub optimized: Vec<Instr>,
    pub assembly: String,
    pub diagnostics: Diagnostics,
}

pub struct CompileResult {
    pub success: bool,
    pub artifacts: Artifacts,
}

/// Compile one source file. `success` is true iff no lexical, syntax or
/// semantic error was recorded (an internal invariant failure also clears
/// it — that result is a compiler bug, not a valid artifact set). Each
/// phase only runs when everything before it was clean.
pub fn compile(source: &str, verbose: bool) -> CompileResult {
    let mut diags = Diagnostics::new();
    let mut program = Program::default();
    let mut symbols = SymbolTable::default();
    let mut tac_listing: Vec<Instr> = Vec::new();
    let mut optimized: Vec<Instr> = Vec::new();
    let mut assembly = String::new();

    let tokens = lex::tokenize(source, &mut diags);
    if verbose {
        eprintln!("[nanoc] lexer: {} tokens", tokens.len());
    }

    if !diags.has_errors() {
        program = parse::parse_program(&tokens, &mut diags);
        if verbose {
            eprintln!("[nanoc] parser: {} top-level items", program.items.len());
        }
    }

    if !diags.has_errors() {
        symbols = sema::analyze(&mut program, &mut diags);
        if verbose {
            eprintln!("[nanoc] sema: {} global symbols", symbols.global_frame().iter().count());
        }
    }

    if !diags.has_errors() {
        match tac::lower(&program) {
            Ok(code) => {
                tac_listing = code;
                if verbose {
                    eprintln!("[nanoc] icg: {} instructions", tac_listing.len());
                }
                optimized = opt::optimize(tac_listing.clone(), &mut diags);
                if verbose {
                    eprintln!("[nanoc] optimizer: {} instructions", optimized.len());
                }
                assembly = backend::emit_assembly(&optimized);
            }
            Err(e) => diags.internal(format!("{:#}", e)),
        }
    }

    let success = !diags.has_errors() && !diags.has_internal();
    CompileResult {
        success,
        artifacts: Artifacts {
            tokens,
            program,
            symbols,
            tac: tac_listing,
            optimized,
            assembly,
            diagnostics: diags,
        },
    }
}
