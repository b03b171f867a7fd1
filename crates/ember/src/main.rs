use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

/// Run an ember script.
#[derive(Parser)]
#[command(name = "ember", version, about)]
struct Cli {
    /// Path to the script to run.
    script: PathBuf,

    /// Execute with the tree-walking evaluator instead of the VM.
    #[arg(long)]
    eval: bool,

    /// Print the compiled top-level disassembly instead of running.
    #[arg(long)]
    disasm: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let source = match fs::read_to_string(&cli.script) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("ember: {}: {err}", cli.script.display());
            return ExitCode::FAILURE;
        }
    };

    if cli.disasm {
        return match ember::disassemble_source(&source) {
            Ok(listing) => {
                print!("{listing}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("ember: {err}");
                ExitCode::FAILURE
            }
        };
    }

    let result = if cli.eval {
        ember::eval_source(&source)
    } else {
        ember::run_source(&source)
    };

    match result {
        Ok(value) => {
            if !value.is_null() {
                println!("{value}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("ember: {err}");
            ExitCode::FAILURE
        }
    }
}
