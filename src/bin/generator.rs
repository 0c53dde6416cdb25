//! the code generator binary. takes a source file and an output file, plus
//! an optional stage switch to dump the tokens or the ast instead of the
//! generated assembly.
//!
//! run with `--help` for more info.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use impc::back::code_gen;
use impc::front::lex::Lexer;
use impc::front::parse;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// the input file
    input: PathBuf,
    /// the output file
    output: PathBuf,
    /// the output stage
    #[arg(value_enum, long, default_value = "asm")]
    emit: Emit,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// the list of tokens
    Tokens,
    /// the ast data structure
    Ast,
    /// the generated assembly code
    Asm,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), String> {
    let input = std::fs::read_to_string(&args.input)
        .map_err(|e| format!("Failed to open file {}: {e}", args.input.display()))?;

    let mut out = String::new();
    match args.emit {
        Emit::Tokens => {
            let tokens = Lexer::new(&input).tokenize().map_err(|e| e.to_string())?;
            for token in tokens {
                out.push_str(&format!("{token}\n"));
            }
        }
        Emit::Ast => {
            let program = parse(&input).map_err(|e| e.to_string())?;
            out = format!("{program:#?}\n");
        }
        Emit::Asm => {
            let program = parse(&input).map_err(|e| e.to_string())?;
            let code = code_gen(&program).map_err(|e| e.to_string())?;
            for instruction in code {
                out.push_str(&format!("{instruction}\n"));
            }
        }
    }

    std::fs::write(&args.output, out)
        .map_err(|e| format!("Failed to write file {}: {e}", args.output.display()))?;
    Ok(())
}
