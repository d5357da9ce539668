//! corelxc -- CoreLX compiler driver (C9)'s CLI surface.
//!
//! Usage: corelxc <input.corelx> <output.rom>
//!
//! Exit 0 on success, printing `Compiled <input> -> <output>` plus the
//! chosen entry point. Exit 1 on any error, with a single `<phase> error:
//! <message>` line on stderr. No other flags.

use corelx::driver::compile_file;
use corelx::CompileError;
use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        eprintln!("usage: corelxc <input.corelx> <output.rom>");
        return ExitCode::FAILURE;
    }
    let input = Path::new(&args[1]);
    let output = Path::new(&args[2]);

    match compile_file(input, output) {
        Ok(unit) => {
            println!("Compiled {} -> {}", basename(input), basename(output));
            println!("Entry point: {}", unit.entry_name);
            ExitCode::SUCCESS
        }
        Err(e) => {
            report(&e, input);
            ExitCode::FAILURE
        }
    }
}

fn basename(path: &Path) -> String {
    path.file_name().and_then(|s| s.to_str()).unwrap_or_default().to_string()
}

fn report(err: &CompileError, input: &Path) {
    match err.span() {
        Some(span) => eprintln!("{} error: {} ({}:{span})", err.phase(), err.message(), input.display()),
        None => eprintln!("{} error: {}", err.phase(), err.message()),
    }
}
