//! ROM builder (C7) — lays out a 256-bank, 32 KiB-per-bank cartridge image
//! and back-patches the relocations the code generator left behind.
//!
//! Bank 0 is reserved for the header; code and data start at bank 1. Every
//! bank occupies the CPU's `[0x8000, 0xFFFF]` address window when it is
//! switched in, so a "CPU address" inside a bank is always `0x8000..=0xFFFF`
//! and the in-bank byte offset is `addr - 0x8000`.

use crate::error::CompileError;
use std::collections::BTreeMap;

pub const BANK_SIZE: usize = 0x8000;
pub const NUM_BANKS: usize = 256;
pub const ROM_SIZE: usize = BANK_SIZE * NUM_BANKS;
pub const CODE_BASE: u16 = 0x8000;
pub const FIRST_CODE_BANK: u8 = 1;
pub const ROM_MAGIC: [u8; 4] = *b"NCDX";
pub const HEADER_VERSION: u8 = 1;

/// A relocation describes a placeholder the code generator emitted for a
/// symbol whose address was not yet known, to be patched once every
/// function has been placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocKind {
    /// A 2-byte little-endian in-bank offset; the patched value is the
    /// target's CPU offset only, never its bank (used for intra-function
    /// control-flow jumps, which never cross a bank boundary).
    Abs16,
    /// A single byte carrying a target's bank number. Reserved for
    /// indirect call sites and function-pointer globals; nothing in this
    /// grammar produces a function-pointer expression, so no relocation
    /// currently carries this kind.
    Bank8,
    /// A 3-byte relocation: one bank byte followed by a 2-byte
    /// little-endian offset. Used for `call` sites, since a callee may
    /// live in a different bank than the call itself.
    Abs24,
}

#[derive(Debug, Clone)]
pub struct Relocation {
    pub at_bank: u8,
    pub at_offset: u16,
    pub kind: RelocKind,
    pub target: String,
}

pub struct RomBuilder {
    banks: Vec<Vec<u8>>,
    cursor_bank: u8,
    /// Byte offset within the current bank, `0..=BANK_SIZE`. Kept as a
    /// `usize` rather than the `u16` CPU address so that "exactly full"
    /// (`BANK_SIZE`) is representable without overflowing.
    cursor_in_bank: usize,
    symbols: BTreeMap<String, (u8, u16)>,
    relocations: Vec<Relocation>,
    entry: Option<(u8, u16)>,
}

impl RomBuilder {
    pub fn new() -> Self {
        Self {
            banks: (0..NUM_BANKS).map(|_| vec![0xFF; BANK_SIZE]).collect(),
            cursor_bank: FIRST_CODE_BANK,
            cursor_in_bank: 0,
            symbols: BTreeMap::new(),
            relocations: Vec::new(),
            entry: None,
        }
    }

    pub fn set_entry(&mut self, addr: (u8, u16)) {
        self.entry = Some(addr);
    }

    pub fn cursor(&self) -> (u8, u16) {
        (self.cursor_bank, CODE_BASE + self.cursor_in_bank as u16)
    }

    /// Places a fully-assembled function body at the current cursor,
    /// padding the rest of the current bank with `0xFF` first if the body
    /// would otherwise straddle the bank boundary. Relocations are given
    /// with offsets relative to the start of `bytes` and are rewritten to
    /// absolute (bank, offset) coordinates before being queued.
    pub fn place_function(
        &mut self,
        name: &str,
        bytes: &[u8],
        relocs: &[(u16, RelocKind, String)],
    ) -> Result<(u8, u16), CompileError> {
        if bytes.len() > BANK_SIZE {
            return Err(CompileError::codegen(None, format!("function '{name}' is larger than a single bank")));
        }
        if self.cursor_in_bank + bytes.len() > BANK_SIZE {
            self.advance_bank()?;
        }
        let addr = (self.cursor_bank, CODE_BASE + self.cursor_in_bank as u16);
        let base = self.cursor_in_bank;
        let bank = &mut self.banks[self.cursor_bank as usize];
        bank[base..base + bytes.len()].copy_from_slice(bytes);

        self.symbols.insert(name.to_string(), addr);
        for (offset, kind, target) in relocs {
            self.relocations.push(Relocation {
                at_bank: self.cursor_bank,
                at_offset: CODE_BASE + self.cursor_in_bank as u16 + offset,
                kind: *kind,
                target: target.clone(),
            });
        }

        self.cursor_in_bank += bytes.len();
        if self.cursor_in_bank == BANK_SIZE {
            self.advance_bank().ok();
        }
        Ok(addr)
    }

    /// Registers an extra named address inside an already-placed function —
    /// used for intra-function jump targets, whose final absolute address
    /// is only known once the function itself has been placed.
    pub fn register_label(&mut self, name: String, addr: (u8, u16)) {
        self.symbols.insert(name, addr);
    }

    fn advance_bank(&mut self) -> Result<(), CompileError> {
        if self.cursor_bank as usize + 1 >= NUM_BANKS {
            return Err(CompileError::codegen(None, "program does not fit in the available ROM banks".to_string()));
        }
        self.cursor_bank += 1;
        self.cursor_in_bank = 0;
        Ok(())
    }

    /// Patches every queued relocation against the placed symbols, then
    /// stamps the header and returns the finished 8 MiB image.
    pub fn finalize(mut self) -> Result<Vec<u8>, CompileError> {
        let entry = self.entry.ok_or_else(|| CompileError::codegen(None, "no entry point was set".to_string()))?;
        let relocations = std::mem::take(&mut self.relocations);
        for reloc in &relocations {
            let target = self.symbols.get(&reloc.target).copied().ok_or_else(|| {
                CompileError::codegen(None, format!("unresolved reference to '{}'", reloc.target))
            })?;
            self.patch(reloc, target)?;
        }

        let mut image = Vec::with_capacity(ROM_SIZE);
        let mut header = vec![0xFFu8; BANK_SIZE];
        header[0..4].copy_from_slice(&ROM_MAGIC);
        header[4] = HEADER_VERSION;
        header[5] = entry.0;
        header[6..8].copy_from_slice(&entry.1.to_le_bytes());
        header[8..16].fill(0);
        image.extend_from_slice(&header);
        for bank in self.banks.into_iter().skip(1) {
            image.extend_from_slice(&bank);
        }
        Ok(image)
    }

    fn patch(&mut self, reloc: &Relocation, target: (u8, u16)) -> Result<(), CompileError> {
        let bank = &mut self.banks[reloc.at_bank as usize];
        let base = reloc.at_offset as usize - CODE_BASE as usize;
        match reloc.kind {
            RelocKind::Abs16 => {
                bank[base..base + 2].copy_from_slice(&target.1.to_le_bytes());
            }
            RelocKind::Bank8 => {
                bank[base] = target.0;
            }
            RelocKind::Abs24 => {
                bank[base] = target.0;
                bank[base + 1..base + 3].copy_from_slice(&target.1.to_le_bytes());
            }
        }
        Ok(())
    }
}

impl Default for RomBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parsed view of a finished image's header, used by the ROM inspector.
#[derive(Debug, Clone, Copy)]
pub struct RomHeader {
    pub version: u8,
    pub entry_bank: u8,
    pub entry_offset: u16,
}

pub fn read_header(image: &[u8]) -> Result<RomHeader, CompileError> {
    if image.len() != ROM_SIZE {
        return Err(CompileError::io(format!("expected a {ROM_SIZE}-byte image, found {} bytes", image.len())));
    }
    if image[0..4] != ROM_MAGIC {
        return Err(CompileError::io("bad ROM magic".to_string()));
    }
    Ok(RomHeader {
        version: image[4],
        entry_bank: image[5],
        entry_offset: u16::from_le_bytes([image[6], image[7]]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn places_function_at_entry_address() {
        let mut rom = RomBuilder::new();
        let addr = rom.place_function("__Boot", &[0x1E], &[]).unwrap();
        assert_eq!(addr, (1, 0x8000));
    }

    #[test]
    fn pads_to_next_bank_when_body_would_straddle() {
        let mut rom = RomBuilder::new();
        let almost_full = vec![0x00; BANK_SIZE - 2];
        rom.place_function("Filler", &almost_full, &[]).unwrap();
        let addr = rom.place_function("Next", &[0xAB, 0xCD, 0xEF], &[]).unwrap();
        assert_eq!(addr, (2, CODE_BASE));
    }

    #[test]
    fn rejects_function_larger_than_a_bank() {
        let mut rom = RomBuilder::new();
        let too_big = vec![0u8; BANK_SIZE + 1];
        assert!(rom.place_function("Huge", &too_big, &[]).is_err());
    }

    #[test]
    fn finalize_patches_relocations_and_stamps_header() {
        let mut rom = RomBuilder::new();
        let entry = rom.place_function("__Boot", &[0x1D, 0, 0, 0, 0x1E], &[(1, RelocKind::Abs24, "Helper".to_string())]).unwrap();
        let helper = rom.place_function("Helper", &[0x1E], &[]).unwrap();
        rom.set_entry(entry);
        let image = rom.finalize().unwrap();
        assert_eq!(image.len(), ROM_SIZE);
        let header = read_header(&image).unwrap();
        assert_eq!(header.entry_bank, 1);
        assert_eq!(header.entry_offset, CODE_BASE);
        let patched_base = entry.1 as usize - CODE_BASE as usize + BANK_SIZE + 1;
        assert_eq!(image[patched_base], helper.0);
        assert_eq!(u16::from_le_bytes([image[patched_base + 1], image[patched_base + 2]]), helper.1);
    }

    #[test]
    fn bank_zero_remainder_is_ff_padded() {
        let mut rom = RomBuilder::new();
        let entry = rom.place_function("__Boot", &[0x1E], &[]).unwrap();
        rom.set_entry(entry);
        let image = rom.finalize().unwrap();
        assert_eq!(&image[8..16], &[0u8; 8]);
        assert_eq!(image[16], 0xFF);
        assert_eq!(image[BANK_SIZE - 1], 0xFF);
    }

    #[test]
    fn finalize_fails_on_unresolved_symbol() {
        let mut rom = RomBuilder::new();
        let entry = rom.place_function("__Boot", &[0x1D, 0, 0, 0, 0x1E], &[(1, RelocKind::Abs24, "Missing".to_string())]).unwrap();
        rom.set_entry(entry);
        assert!(rom.finalize().is_err());
    }
}
