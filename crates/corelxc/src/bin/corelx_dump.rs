//! corelx-dump -- read-only ROM header inspector.
//!
//! Loads a compiled `.rom` file and prints its header fields without
//! re-running the compiler. The ambient "inspect what I built" tool every
//! binary-image toolchain in this corpus ships alongside its core engine.
//!
//! Usage: corelx-dump <rom-file>

use corelx::rom::read_header;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        eprintln!("usage: corelx-dump <rom-file>");
        return ExitCode::FAILURE;
    }
    let path = &args[1];
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("io error: cannot read '{path}': {e}");
            return ExitCode::FAILURE;
        }
    };
    match read_header(&bytes) {
        Ok(header) => {
            println!("file: {path}");
            println!("size: {} bytes", bytes.len());
            println!("magic: {}", String::from_utf8_lossy(&bytes[0..4]));
            println!("version: {}", header.version);
            println!("entry: bank {} offset 0x{:04X}", header.entry_bank, header.entry_offset);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{} error: {}", e.phase(), e.message());
            ExitCode::FAILURE
        }
    }
}
