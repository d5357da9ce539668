//! Driver (C9) — wires C1→…→C7 together: lex, parse, analyze, pick an
//! entry point, generate code, and (for `compile_file`) write the final
//! image to disk. Exposed as plain functions rather than a struct with
//! methods, since there is no state to carry between calls — each
//! compilation builds and discards its own pipeline; there is no global
//! compiler state.

use crate::ast::Program;
use crate::codegen;
use crate::error::CompileError;
use crate::lexer::{lex, lex_errors};
use crate::parser::parse;
use crate::sema::{self, SymbolTable};
use std::path::Path;

/// The two entry-point names with defined semantics, in resolution order.
pub const BOOT_ENTRY: &str = "__Boot";
pub const START_ENTRY: &str = "Start";

/// The fully-built artifacts of one compilation. Tokens are discarded once
/// parsing is done; everything a caller might still want — the analyzed
/// AST, the chosen entry point, and the finished ROM bytes — lives here so
/// the three `corelxc` binaries can share one pipeline instead of
/// re-deriving it.
pub struct CompileUnit {
    pub program: Program,
    pub entry_name: &'static str,
    pub rom: Vec<u8>,
}

/// Scans `program.functions` for `__Boot`, then `Start`. An earlier,
/// since-superseded resolution rule that always treated `Start` as the
/// entry regardless of `__Boot`'s presence is not implemented; only the
/// corrected `__Boot`-first resolution is.
pub fn choose_entry(program: &Program) -> Result<&'static str, CompileError> {
    let has = |name: &str| program.functions.iter().any(|f| f.name == name);
    if has(BOOT_ENTRY) {
        Ok(BOOT_ENTRY)
    } else if has(START_ENTRY) {
        Ok(START_ENTRY)
    } else {
        Err(CompileError::semantic(
            crate::span::Span::new(0, 1, 1, 0),
            "No entry point function found".to_string(),
        ))
    }
}

/// Runs the lex → parse → analyze phases only, per the contract
/// `corelx-check` needs: no code generation, no ROM write. Returns the
/// analyzed program (and its symbol table) so a caller can inspect it
/// further, or the first fatal diagnostic encountered.
pub fn analyze_source(src: &str) -> Result<(Program, SymbolTable), CompileError> {
    let tokens = lex(src);
    if let Some(first) = lex_errors(&tokens).into_iter().next() {
        return Err(first);
    }
    let program = parse(tokens)?;
    let table = sema::analyze(&program)?;
    Ok((program, table))
}

/// Every diagnostic collected while analyzing `src`, instead of only the
/// first fatal one. Lex errors (every `ERROR` token) and parse errors
/// (every diagnostic the parser's statement-level recovery collected) are
/// each exhaustive; analysis still reports only its first error, since
/// semantic analysis has no statement-level recovery discipline the way
/// lexing and parsing do, so it stops at its first error.
pub fn diagnostics(src: &str) -> Vec<CompileError> {
    let tokens = lex(src);
    let lex_errs = lex_errors(&tokens);
    if !lex_errs.is_empty() {
        return lex_errs;
    }
    let (program, parse_errs) = crate::parser::parse_all(tokens);
    if !parse_errs.is_empty() {
        return parse_errs;
    }
    match sema::analyze(&program) {
        Ok(_) => Vec::new(),
        Err(e) => vec![e],
    }
}

/// Runs the full pipeline (C1→C8) over in-memory source text and returns
/// the finished ROM bytes plus the chosen entry point. Does not touch the
/// filesystem; `compile_file` layers file I/O on top of this.
pub fn compile_source(src: &str) -> Result<CompileUnit, CompileError> {
    let (program, _table) = analyze_source(src)?;
    let entry_name = choose_entry(&program)?;
    let rom = codegen::generate(&program, entry_name)?;
    Ok(CompileUnit { program, entry_name, rom })
}

/// Reads `input_path`, compiles it, and writes the resulting 8 MiB image
/// to `output_path`. I/O errors at either end are reported as
/// `CompileError::Io`.
pub fn compile_file(input_path: &Path, output_path: &Path) -> Result<CompileUnit, CompileError> {
    let src = std::fs::read_to_string(input_path)
        .map_err(|e| CompileError::io(format!("cannot read '{}': {e}", input_path.display())))?;
    let unit = compile_source(&src)?;
    std::fs::write(output_path, &unit.rom)
        .map_err(|e| CompileError::io(format!("cannot write '{}': {e}", output_path.display())))?;
    Ok(unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_wins_over_start_when_both_present() {
        let (program, _) =
            analyze_source("fn Start() { return; } fn __Boot() { return; }").unwrap();
        assert_eq!(choose_entry(&program).unwrap(), BOOT_ENTRY);
    }

    #[test]
    fn start_is_used_when_no_boot() {
        let (program, _) = analyze_source("fn Start() { return; }").unwrap();
        assert_eq!(choose_entry(&program).unwrap(), START_ENTRY);
    }

    #[test]
    fn missing_entry_is_reported() {
        let (program, _) = analyze_source("fn Helper() { return; }").unwrap();
        let err = choose_entry(&program).unwrap_err();
        assert!(err.message().contains("No entry point"));
    }

    #[test]
    fn compile_source_produces_a_full_image() {
        let unit = compile_source("fn Start() { return; }").unwrap();
        assert_eq!(unit.rom.len(), crate::rom::ROM_SIZE);
        assert_eq!(unit.entry_name, START_ENTRY);
    }

    #[test]
    fn diagnostics_reports_multiple_lex_errors() {
        let errs = diagnostics("fn F() { let x: u16 = 1 @ 2 $ 3; return; }");
        assert!(errs.len() >= 2);
        assert!(errs.iter().all(|e| matches!(e, CompileError::Lex { .. })));
    }

    #[test]
    fn diagnostics_empty_on_success() {
        assert!(diagnostics("fn Start() { return; }").is_empty());
    }
}
