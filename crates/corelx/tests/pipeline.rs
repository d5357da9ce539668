//! End-to-end pipeline tests: full `.corelx` source to ROM bytes, covering
//! the documented concrete scenarios and quantified invariants.

#[cfg(test)]
mod tests {
    use corelx::driver::{compile_source, BOOT_ENTRY, START_ENTRY};
    use corelx::rom::{read_header, BANK_SIZE, ROM_MAGIC, ROM_SIZE};
    use corelx::CompileError;

    #[test]
    fn minimal_program_compiles_with_start_entry() {
        let unit = compile_source("fn Start() { return; }").unwrap();
        assert_eq!(unit.entry_name, START_ENTRY);
        let header = read_header(&unit.rom).unwrap();
        assert_eq!(header.entry_bank, 1);
        assert_eq!(header.entry_offset, 0x8000);
    }

    #[test]
    fn boot_overrides_start_when_both_are_present() {
        let with_boot = compile_source("fn Start() { return; } fn __Boot() { return; }").unwrap();
        assert_eq!(with_boot.entry_name, BOOT_ENTRY);
        // The byte at (1, 0x8000) is the first byte of __Boot's prologue:
        // __Boot takes no parameters and has no globals to seed, so its
        // body's bare `return;` is its first emitted instruction -- a jump
        // straight to the epilogue three bytes later.
        assert_eq!(with_boot.rom[BANK_SIZE], 0x1B /* JMP */);
        assert_eq!(with_boot.rom[BANK_SIZE + 3], 0x1E /* RET, at the epilogue */);
    }

    #[test]
    fn missing_entry_point_is_reported() {
        let err = compile_source("fn Helper() { return; }").unwrap_err();
        assert!(matches!(err, CompileError::Semantic { .. }));
        assert!(err.message().contains("No entry point"));
    }

    #[test]
    fn duplicate_function_declaration_is_rejected() {
        let err = compile_source("fn Start() { return; } fn Start() { return; }").unwrap_err();
        assert!(matches!(err, CompileError::Semantic { .. }));
        assert!(err.message().contains("duplicate"));
    }

    #[test]
    fn return_type_mismatch_cites_the_return_span() {
        let err = compile_source("fn Start() : u8 { return 0x1FF; }").unwrap_err();
        assert!(matches!(err, CompileError::Semantic { .. }));
        assert!(err.span().is_some());
    }

    #[test]
    fn short_circuit_and_still_rejects_undeclared_call() {
        let err = compile_source("fn Start() { if (false && crash()) { } return; }").unwrap_err();
        assert!(matches!(err, CompileError::Semantic { .. }));
        assert!(err.message().contains("crash"));
    }

    #[test]
    fn rom_header_invariants_hold() {
        let unit = compile_source("fn __Boot() { return; }").unwrap();
        assert_eq!(unit.rom.len(), ROM_SIZE);
        assert_eq!(&unit.rom[0..4], &ROM_MAGIC);
        assert_eq!(unit.rom[5], 1);
        assert_eq!(u16::from_le_bytes([unit.rom[6], unit.rom[7]]), 0x8000);
    }

    #[test]
    fn compilation_is_deterministic() {
        let src = "fn __Boot() { var i: u16 = 0; while (i < 10) { i = i + 1; } return; }";
        let a = compile_source(src).unwrap();
        let b = compile_source(src).unwrap();
        assert_eq!(a.rom, b.rom);
    }

    #[test]
    fn empty_boot_body_is_a_fixed_small_size() {
        // An empty function body compiles to a fixed prologue+epilogue: no
        // params to pop, no globals to seed, a `return;` that jumps to the
        // epilogue's single RET -- 4 bytes total, then padding.
        let unit = compile_source("fn __Boot() { return; }").unwrap();
        assert_eq!(unit.rom[BANK_SIZE], 0x1B); // JMP
        assert_eq!(unit.rom[BANK_SIZE + 3], 0x1E); // RET, at the epilogue
        assert_eq!(unit.rom[BANK_SIZE + 4], 0xFF); // padding beyond the 4-byte body
    }

    #[test]
    fn max_u16_literal_lexes_but_overflow_is_a_lex_error() {
        let ok = compile_source("fn Start() { let x: u16 = 0xFFFF; return; }");
        assert!(ok.is_ok());
        let err = compile_source("fn Start() { let x: u16 = 0x10000; return; }").unwrap_err();
        assert!(matches!(err, CompileError::Lex { .. }));
    }

    #[test]
    fn calls_across_declaration_order_resolve_via_relocation() {
        let unit = compile_source("fn __Boot() { Helper(); return; } fn Helper() { return; }").unwrap();
        assert_eq!(unit.rom.len(), ROM_SIZE);
        // Helper() returns void, so the call statement must not pop a
        // value its callee never pushed.
        assert_eq!(unit.rom[BANK_SIZE], 0x1D /* CALL */);
        assert_ne!(unit.rom[BANK_SIZE + 4], 0x20 /* POP */);
    }

    #[test]
    fn function_too_large_for_a_bank_is_a_codegen_error() {
        // One local, reassigned enough times to overflow a single 32 KiB
        // bank without tripping the (unrelated) 256-slot limit.
        let mut src = String::from("fn __Boot() { var v: u16 = 0; ");
        for _ in 0..6_000 {
            src.push_str("v = v + 1; ");
        }
        src.push_str("return; }");
        let err = compile_source(&src).unwrap_err();
        assert!(matches!(err, CompileError::Codegen { .. }));
    }

    #[test]
    fn global_initializer_is_seeded_by_the_entry_function() {
        let unit = compile_source("var counter: u16 = 7; fn Start() { counter = counter + 1; return; }").unwrap();
        assert_eq!(unit.rom.len(), ROM_SIZE);
    }
}
