//! corelx-check -- diagnostics-only front end.
//!
//! Runs lexing, parsing and semantic analysis (C1-C6) without code
//! generation or ROM writing, and reports every diagnostic collected
//! along the way. Supports editor/CI integration without inventing a
//! second compilation pipeline.
//!
//! Usage: corelx-check <input.corelx> [--format text|json]

use corelx::driver::diagnostics;
use corelx::CompileError;
use std::process::ExitCode;

enum Format {
    Text,
    Json,
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let mut input_path: Option<String> = None;
    let mut format = Format::Text;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--format" => {
                i += 1;
                match args.get(i).map(String::as_str) {
                    Some("text") => format = Format::Text,
                    Some("json") => format = Format::Json,
                    other => {
                        eprintln!("unknown --format value: {:?}", other.unwrap_or(""));
                        return ExitCode::FAILURE;
                    }
                }
            }
            other if input_path.is_none() => input_path = Some(other.to_string()),
            other => {
                eprintln!("unexpected argument: {other}");
                return ExitCode::FAILURE;
            }
        }
        i += 1;
    }

    let Some(input_path) = input_path else {
        eprintln!("usage: corelx-check <input.corelx> [--format text|json]");
        return ExitCode::FAILURE;
    };

    let src = match std::fs::read_to_string(&input_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("io error: cannot read '{input_path}': {e}");
            return ExitCode::FAILURE;
        }
    };

    let diags = diagnostics(&src);
    if diags.is_empty() {
        match format {
            Format::Text => println!("no diagnostics"),
            Format::Json => println!("[]"),
        }
        return ExitCode::SUCCESS;
    }

    match format {
        Format::Text => {
            for d in &diags {
                print_text(d, &input_path);
            }
        }
        Format::Json => println!("{}", to_json_array(&diags)),
    }
    ExitCode::FAILURE
}

fn print_text(err: &CompileError, input_path: &str) {
    match err.span() {
        Some(span) => eprintln!("{} error: {} ({input_path}:{span})", err.phase(), err.message()),
        None => eprintln!("{} error: {}", err.phase(), err.message()),
    }
}

fn to_json_array(diags: &[CompileError]) -> String {
    let entries: Vec<serde_json::Value> = diags
        .iter()
        .map(|d| {
            let span = d.span().map(|s| {
                serde_json::json!({
                    "line": s.line,
                    "column": s.column,
                    "start": s.start,
                    "len": s.len,
                })
            });
            serde_json::json!({
                "phase": d.phase(),
                "message": d.message(),
                "span": span,
            })
        })
        .collect();
    serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "[]".to_string())
}
