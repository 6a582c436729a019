use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use driver::{compile, CompileResult};

#[derive(Parser, Debug)]
#[command(
    name = "nanoc",
    about = "Nano compiler — three-address-code pipeline for a tiny imperative language",
    version
)]
struct Cli {
    /// Narrate phase boundaries on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Lex a source file and print the token stream
    Tokens { input: PathBuf },
    /// Parse a source file and print the AST (debug format)
    Ast { input: PathBuf },
    /// Analyze a source file and print the symbol table dump
    Symbols { input: PathBuf },
    /// Print the unoptimized TAC listing
    Tac { input: PathBuf },
    /// Print the optimized TAC listing
    OptTac { input: PathBuf },
    /// Print the stack-machine assembly
    Asm { input: PathBuf },
    /// Compile and write <input>.tac, <input>.opt.tac and <input>.s
    Build { input: PathBuf },
}

fn main() {
    let cli = Cli::parse();
    let verbose = cli.verbose;
    let result = match cli.command {
        Commands::Tokens { input } => cmd_tokens(&input, verbose),
        Commands::Ast { input } => cmd_ast(&input, verbose),
        Commands::Symbols { input } => cmd_symbols(&input, verbose),
        Commands::Tac { input } => cmd_tac(&input, verbose),
        Commands::OptTac { input } => cmd_opt_tac(&input, verbose),
        Commands::Asm { input } => cmd_asm(&input, verbose),
        Commands::Build { input } => cmd_build(&input, verbose),
    };
    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("nanoc: {:#}", e);
            std::process::exit(2);
        }
    }
}

fn read_source(input: &Path) -> Result<String> {
    fs::read_to_string(input).with_context(|| format!("cannot read {}", input.display()))
}

fn cmd_tokens(input: &Path, verbose: bool) -> Result<i32> {
    let r = compile(&read_source(input)?, verbose);
    for t in &r.artifacts.tokens {
        println!("{} @ line {}", t, t.line);
    }
    finish(&r)
}

fn cmd_ast(input: &Path, verbose: bool) -> Result<i32> {
    let r = compile(&read_source(input)?, verbose);
    if r.success {
        println!("{:#?}", r.artifacts.program);
    }
    finish(&r)
}

fn cmd_symbols(input: &Path, verbose: bool) -> Result<i32> {
    let r = compile(&read_source(input)?, verbose);
    if r.success {
        print!("{}", r.artifacts.symbols);
    }
    finish(&r)
}

fn cmd_tac(input: &Path, verbose: bool) -> Result<i32> {
    let r = compile(&read_source(input)?, verbose);
    if r.success {
        print!("{}", tac::listing_to_string(&r.artifacts.tac));
    }
    finish(&r)
}

fn cmd_opt_tac(input: &Path, verbose: bool) -> Result<i32> {
    let r = compile(&read_source(input)?, verbose);
    if r.success {
        print!("{}", tac::listing_to_string(&r.artifacts.optimized));
    }
    finish(&r)
}

fn cmd_asm(input: &Path, verbose: bool) -> Result<i32> {
    let r = compile(&read_source(input)?, verbose);
    if r.success {
        print!("{}", r.artifacts.assembly);
    }
    finish(&r)
}

fn cmd_build(input: &Path, verbose: bool) -> Result<i32> {
    let r = compile(&read_source(input)?, verbose);
    if r.success {
        let tac_path = input.with_extension("tac");
        let opt_path = input.with_extension("opt.tac");
        let asm_path = input.with_extension("s");
        fs::write(&tac_path, tac::listing_to_string(&r.artifacts.tac))
            .with_context(|| format!("cannot write {}", tac_path.display()))?;
        fs::write(&opt_path, tac::listing_to_string(&r.artifacts.optimized))
            .with_context(|| format!("cannot write {}", opt_path.display()))?;
        fs::write(&asm_path, &r.artifacts.assembly)
            .with_context(|| format!("cannot write {}", asm_path.display()))?;
        if verbose {
            eprintln!(
                "[nanoc] wrote {}, {}, {}",
                tac_path.display(),
                opt_path.display(),
                asm_path.display()
            );
        }
    }
    finish(&r)
}

/// Print accumulated diagnostics to stderr and map the result to an exit
/// code (warnings alone keep the build green). I/O problems propagate as
/// errors and exit with 2.
fn finish(r: &CompileResult) -> Result<i32> {
    if !r.artifacts.diagnostics.is_empty() {
        eprint!("{}", r.artifacts.diagnostics);
    }
    Ok(if r.success { 0 } else { 1 })
}
