//! Exercises the library entry points backing `corelxc`'s three binaries.
//! No subprocess harness exists in the corpus to imitate, so the argument
//! parsing each binary does on top of these calls is left to manual
//! inspection; what's tested here is the behavior the binaries wrap.

#[cfg(test)]
mod tests {
    use corelx::driver::{compile_source, diagnostics};
    use corelx::rom::read_header;

    #[test]
    fn compile_source_matches_what_corelxc_reports() {
        let unit = compile_source("fn __Boot() { return; }").expect("compiles");
        assert_eq!(unit.entry_name, "__Boot");
        let header = read_header(&unit.rom).expect("valid header");
        assert_eq!(header.entry_bank, 1);
        assert_eq!(header.entry_offset, 0x8000);
    }

    #[test]
    fn corelx_dump_reads_back_what_corelxc_writes() {
        let unit = compile_source("fn Start() { return; }").expect("compiles");
        let header = read_header(&unit.rom).expect("the bytes corelxc would have written parse back");
        assert_eq!(header.version, 1);
    }

    #[test]
    fn corelx_check_reports_no_diagnostics_for_valid_source() {
        assert!(diagnostics("fn Start() { return; }").is_empty());
    }

    #[test]
    fn corelx_check_reports_a_diagnostic_for_invalid_source() {
        let diags = diagnostics("fn Helper() { undefined_name; }");
        assert!(!diags.is_empty());
    }
}
