//! Code generator (C8) — walks the analyzed AST and emits a small
//! stack-machine bytecode into the ROM builder (C7).
//!
//! Every value on the operand stack occupies one 16-bit cell regardless of
//! its source type; narrower targets (`u8`/`i8`/`bool`) are truncated with
//! `MASK8` at the point they are stored. This keeps the generator free of
//! real stack-effect bookkeeping, which this console's undocumented wire
//! format does not require us to get byte-perfect with any existing
//! runtime. Opcodes:
//!
//! ```text
//! 0x00 NOP
//! 0x01 PUSH_CONST   u16le
//! 0x02 LOAD_LOCAL   u8(slot)
//! 0x03 STORE_LOCAL  u8(slot)
//! 0x04 LOAD_GLOBAL  u16le(ram addr)
//! 0x05 STORE_GLOBAL u16le(ram addr)
//! 0x06 LOAD_INDEX                  ; pop index, pop base, push mem[base+index]
//! 0x07 STORE_INDEX                 ; pop value, pop index, pop base
//! 0x08 ADD   0x09 SUB   0x0A MUL   0x0B DIV   0x0C MOD
//! 0x0D AND   0x0E OR    0x0F XOR   0x10 SHL   0x11 SHR
//! 0x12 NEG   0x13 NOT   0x14 BNOT
//! 0x15 CMP_EQ 0x16 CMP_NE 0x17 CMP_LT 0x18 CMP_LE 0x19 CMP_GT 0x1A CMP_GE
//! 0x1B JMP    reloc(abs16)         ; unconditional, same bank as caller
//! 0x1C JZ     reloc(abs16)         ; pop cond, branch if zero
//! 0x1D CALL   reloc(abs24)         ; args already pushed left-to-right
//! 0x1E RET
//! 0x1F RET_VAL                     ; pop the return value first
//! 0x20 POP
//! 0x21 MASK8
//! 0x22 DUP
//! ```
//!
//! Every `return` statement jumps to one shared epilogue per function
//! (reached via the same relocation machinery as any other label) rather
//! than emitting its own `RET`/`RET_VAL`; the epilogue is the only place
//! either opcode is ever written. String literals are placed as trailing
//! data right after the function that references them, in the same
//! relocatable byte buffer — this instruction set has no bank-switch
//! opcode, so data read through a plain 16-bit offset must live in the
//! same bank as the code reading it, and appending it to the referencing
//! function's own buffer guarantees that trivially.

use crate::ast::*;
use crate::error::CompileError;
use crate::rom::{RelocKind, RomBuilder};
use std::collections::BTreeMap;

mod op {
    pub const NOP: u8 = 0x00;
    pub const PUSH_CONST: u8 = 0x01;
    pub const LOAD_LOCAL: u8 = 0x02;
    pub const STORE_LOCAL: u8 = 0x03;
    pub const LOAD_GLOBAL: u8 = 0x04;
    pub const STORE_GLOBAL: u8 = 0x05;
    pub const LOAD_INDEX: u8 = 0x06;
    pub const STORE_INDEX: u8 = 0x07;
    pub const ADD: u8 = 0x08;
    pub const SUB: u8 = 0x09;
    pub const MUL: u8 = 0x0A;
    pub const DIV: u8 = 0x0B;
    pub const MOD: u8 = 0x0C;
    pub const AND: u8 = 0x0D;
    pub const OR: u8 = 0x0E;
    pub const XOR: u8 = 0x0F;
    pub const SHL: u8 = 0x10;
    pub const SHR: u8 = 0x11;
    pub const NEG: u8 = 0x12;
    pub const NOT: u8 = 0x13;
    pub const BNOT: u8 = 0x14;
    pub const CMP_EQ: u8 = 0x15;
    pub const CMP_NE: u8 = 0x16;
    pub const CMP_LT: u8 = 0x17;
    pub const CMP_LE: u8 = 0x18;
    pub const CMP_GT: u8 = 0x19;
    pub const CMP_GE: u8 = 0x1A;
    pub const JMP: u8 = 0x1B;
    pub const JZ: u8 = 0x1C;
    pub const CALL: u8 = 0x1D;
    pub const RET: u8 = 0x1E;
    pub const RET_VAL: u8 = 0x1F;
    pub const POP: u8 = 0x20;
    pub const MASK8: u8 = 0x21;
    pub const DUP: u8 = 0x22;
}

/// Per-function byte buffer with relocation and label bookkeeping. Labels
/// are named `"<function>$L<n>"`, globally unique since function names
/// are already unique, and resolved once this function has been placed.
struct Emitter<'a> {
    func_name: &'a str,
    bytes: Vec<u8>,
    relocs: Vec<(u16, RelocKind, String)>,
    labels: Vec<(String, u16)>,
    next_label: u32,
}

impl<'a> Emitter<'a> {
    fn new(func_name: &'a str) -> Self {
        Self { func_name, bytes: Vec::new(), relocs: Vec::new(), labels: Vec::new(), next_label: 0 }
    }

    fn fresh_label(&mut self) -> String {
        let name = format!("{}$L{}", self.func_name, self.next_label);
        self.next_label += 1;
        name
    }

    fn define_label(&mut self, name: String) {
        self.labels.push((name, self.bytes.len() as u16));
    }

    fn op(&mut self, opcode: u8) {
        self.bytes.push(opcode);
    }

    fn u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    fn u16(&mut self, v: u16) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    fn jump(&mut self, opcode: u8, target: String) {
        self.op(opcode);
        let at = self.bytes.len() as u16;
        self.u16(0);
        self.relocs.push((at, RelocKind::Abs16, target));
    }

    fn call(&mut self, callee: String) {
        self.op(op::CALL);
        let at = self.bytes.len() as u16;
        self.u8(0);
        self.u16(0);
        self.relocs.push((at, RelocKind::Abs24, callee));
    }

    /// Truncates the top of the stack when it is about to be written into
    /// an 8-bit-wide binding.
    fn coerce_to(&mut self, ty: &Type) {
        if ty.width() == Some(8) {
            self.op(op::MASK8);
        }
    }
}

struct LoopCtx {
    break_label: String,
    continue_label: String,
}

struct FunctionCx<'a> {
    em: Emitter<'a>,
    next_slot: u16,
    loops: Vec<LoopCtx>,
    /// Every `return` jumps here; defined once, after the body, right
    /// before the function's single `RET`/`RET_VAL`.
    epilogue_label: String,
    /// String literal data queued by `emit_expr`, appended to the
    /// function's byte buffer after the epilogue once the body is done.
    pending_data: Vec<(String, Vec<u8>)>,
}

pub fn generate(program: &Program, entry_name: &str) -> Result<Vec<u8>, CompileError> {
    let mut rom = RomBuilder::new();
    let global_addrs = allocate_globals(program);

    let entry_fn = program
        .functions
        .iter()
        .find(|f| f.name == entry_name)
        .ok_or_else(|| CompileError::codegen(None, format!("no entry point function found (looked for '{entry_name}')")))?;

    let mut ordered: Vec<&FunctionDecl> = vec![entry_fn];
    ordered.extend(program.functions.iter().filter(|f| f.name != entry_name));

    let mut entry_addr = None;
    for f in ordered {
        let addr = emit_function(f, &program.globals, &global_addrs, &mut rom)?;
        f.address.set(Some(addr));
        if f.name == entry_name {
            entry_addr = Some(addr);
        }
    }
    rom.set_entry(entry_addr.expect("entry function was generated"));
    rom.finalize()
}

/// Total byte footprint of a value of this type in the console's unbanked
/// RAM window. Arrays occupy `len * element size`; a pointer is always a
/// 16-bit RAM address regardless of its target's width.
fn type_byte_size(ty: &Type) -> u16 {
    match ty {
        Type::Array(elem, len) => type_byte_size(elem).saturating_mul(*len),
        Type::Pointer(_) => 2,
        other => if other.width() == Some(8) { 1 } else { 2 },
    }
}

fn allocate_globals(program: &Program) -> BTreeMap<String, u16> {
    let mut next_addr: u16 = 0;
    let mut map = BTreeMap::new();
    for g in &program.globals {
        let width_bytes = match g.resolved_type.borrow().as_ref() {
            Some(ty) => type_byte_size(ty),
            None => 2,
        };
        g.ram_address.set(Some(next_addr));
        map.insert(g.name.clone(), next_addr);
        next_addr = next_addr.saturating_add(width_bytes);
    }
    map
}

fn emit_function(
    f: &FunctionDecl,
    program_globals: &[GlobalDecl],
    globals: &BTreeMap<String, u16>,
    rom: &mut RomBuilder,
) -> Result<(u8, u16), CompileError> {
    let mut cx = FunctionCx {
        em: Emitter::new(&f.name),
        next_slot: f.params.len() as u16,
        loops: Vec::new(),
        epilogue_label: String::new(),
        pending_data: Vec::new(),
    };
    cx.epilogue_label = cx.em.fresh_label();

    // Arguments arrive on the stack left-to-right (first param deepest);
    // pop them into their slots in reverse.
    for i in (0..f.params.len()).rev() {
        cx.em.op(op::STORE_LOCAL);
        cx.em.u8(i as u8);
    }

    if f.name == "__Boot" || f.name == "Start" {
        emit_global_init_prologue(program_globals, globals, &mut cx)?;
    }
    emit_block(&f.body, globals, &mut cx)?;

    cx.em.define_label(cx.epilogue_label.clone());
    if f.return_type == Type::Void {
        cx.em.op(op::RET);
    } else {
        cx.em.op(op::RET_VAL);
    }

    for (label, bytes) in cx.pending_data.drain(..) {
        cx.em.define_label(label);
        cx.em.bytes.extend_from_slice(&bytes);
    }

    let addr = rom.place_function(&f.name, &cx.em.bytes, &cx.em.relocs)?;
    for (label, local_offset) in cx.em.labels {
        rom.register_label(label, (addr.0, addr.1 + local_offset));
    }
    Ok(addr)
}

/// The entry function is also responsible for seeding every global's
/// initial value into RAM before the rest of its body runs, since ROM is
/// read-only and globals have no other path to their initializer. Globals
/// are initialized in declaration order, since declaration order is the
/// only ordering the rest of the pipeline guarantees.
fn emit_global_init_prologue(
    program_globals: &[GlobalDecl],
    globals: &BTreeMap<String, u16>,
    cx: &mut FunctionCx,
) -> Result<(), CompileError> {
    for g in program_globals {
        let Some(init) = &g.init else { continue };
        emit_expr(init, globals, cx)?;
        let ty = g
            .resolved_type
            .borrow()
            .clone()
            .expect("global type resolved before codegen");
        cx.em.coerce_to(&ty);
        let addr = *globals.get(&g.name).expect("global address allocated before codegen");
        cx.em.op(op::STORE_GLOBAL);
        cx.em.u16(addr);
    }
    Ok(())
}

fn emit_block(block: &Block, globals: &BTreeMap<String, u16>, cx: &mut FunctionCx) -> Result<(), CompileError> {
    for stmt in &block.stmts {
        emit_stmt(stmt, globals, cx)?;
    }
    Ok(())
}

fn emit_stmt(stmt: &Stmt, globals: &BTreeMap<String, u16>, cx: &mut FunctionCx) -> Result<(), CompileError> {
    match stmt {
        Stmt::Block(b) => emit_block(b, globals, cx),
        Stmt::Let { init, ty, .. } => {
            let slot = cx.next_slot;
            cx.next_slot += 1;
            if let Some(init) = init {
                emit_expr(init, globals, cx)?;
                let target_ty = ty.clone().unwrap_or_else(|| init.ty());
                cx.em.coerce_to(&target_ty);
                cx.em.op(op::STORE_LOCAL);
                cx.em.u8(slot as u8);
            }
            Ok(())
        }
        Stmt::If { cond, then_block, else_block, .. } => {
            emit_expr(cond, globals, cx)?;
            let else_label = cx.em.fresh_label();
            cx.em.jump(op::JZ, else_label.clone());
            emit_block(then_block, globals, cx)?;
            if let Some(eb) = else_block {
                let end_label = cx.em.fresh_label();
                cx.em.jump(op::JMP, end_label.clone());
                cx.em.define_label(else_label);
                emit_block(eb, globals, cx)?;
                cx.em.define_label(end_label);
            } else {
                cx.em.define_label(else_label);
            }
            Ok(())
        }
        Stmt::While { cond, body, .. } => {
            let continue_label = cx.em.fresh_label();
            let break_label = cx.em.fresh_label();
            cx.em.define_label(continue_label.clone());
            emit_expr(cond, globals, cx)?;
            cx.em.jump(op::JZ, break_label.clone());
            cx.loops.push(LoopCtx { break_label: break_label.clone(), continue_label: continue_label.clone() });
            let res = emit_block(body, globals, cx);
            cx.loops.pop();
            res?;
            cx.em.jump(op::JMP, continue_label);
            cx.em.define_label(break_label);
            Ok(())
        }
        Stmt::Return { value, .. } => {
            if let Some(e) = value {
                emit_expr(e, globals, cx)?;
            }
            let epilogue = cx.epilogue_label.clone();
            cx.em.jump(op::JMP, epilogue);
            Ok(())
        }
        Stmt::Expr(e) => {
            emit_expr(e, globals, cx)?;
            // Every expression statement's value is discarded -- except a
            // void-returning call, whose callee never pushed one.
            if e.ty() != Type::Void {
                cx.em.op(op::POP);
            }
            Ok(())
        }
        Stmt::Break(span) => {
            let label = cx.loops.last().ok_or_else(|| CompileError::codegen(Some(*span), "'break' used outside of a loop".to_string()))?.break_label.clone();
            cx.em.jump(op::JMP, label);
            Ok(())
        }
        Stmt::Continue(span) => {
            let label = cx.loops.last().ok_or_else(|| CompileError::codegen(Some(*span), "'continue' used outside of a loop".to_string()))?.continue_label.clone();
            cx.em.jump(op::JMP, label);
            Ok(())
        }
    }
}

fn emit_expr(expr: &Expr, globals: &BTreeMap<String, u16>, cx: &mut FunctionCx) -> Result<(), CompileError> {
    match &expr.kind {
        ExprKind::Int(v) => {
            cx.em.op(op::PUSH_CONST);
            cx.em.u16(*v);
        }
        ExprKind::Bool(b) => {
            cx.em.op(op::PUSH_CONST);
            cx.em.u16(*b as u16);
        }
        ExprKind::Str(s) => {
            // Placed as trailing data after this function's epilogue; the
            // pushed value is the real in-bank address, not the length.
            let label = cx.em.fresh_label();
            let mut data = s.as_bytes().to_vec();
            data.push(0);
            cx.pending_data.push((label.clone(), data));
            cx.em.op(op::PUSH_CONST);
            let at = cx.em.bytes.len() as u16;
            cx.em.u16(0);
            cx.em.relocs.push((at, RelocKind::Abs16, label));
        }
        ExprKind::Ident(name) => match expr.binding() {
            Some(Binding::Local(slot)) => {
                cx.em.op(op::LOAD_LOCAL);
                cx.em.u8(slot as u8);
            }
            Some(Binding::Global) => {
                let addr = *globals.get(name).expect("global address allocated before codegen");
                cx.em.op(op::LOAD_GLOBAL);
                cx.em.u16(addr);
            }
            None => return Err(CompileError::codegen(Some(expr.span()), format!("'{name}' has no resolved binding"))),
        },
        ExprKind::Unary(uop, operand) => {
            emit_expr(operand, globals, cx)?;
            cx.em.op(match uop {
                UnOp::Neg => op::NEG,
                UnOp::Not => op::NOT,
                UnOp::BitNot => op::BNOT,
            });
        }
        ExprKind::Binary(bop, lhs, rhs) => emit_binary(*bop, lhs, rhs, globals, cx)?,
        ExprKind::Call(name, args) => {
            for arg in args {
                emit_expr(arg, globals, cx)?;
            }
            cx.em.call(name.clone());
        }
        ExprKind::Index(base, index) => {
            emit_expr(base, globals, cx)?;
            emit_expr(index, globals, cx)?;
            cx.em.op(op::LOAD_INDEX);
        }
        ExprKind::Assign(target, value) => emit_assign(target, value, globals, cx)?,
    }
    Ok(())
}

fn emit_binary(bop: BinOp, lhs: &Expr, rhs: &Expr, globals: &BTreeMap<String, u16>, cx: &mut FunctionCx) -> Result<(), CompileError> {
    match bop {
        BinOp::And => {
            emit_expr(lhs, globals, cx)?;
            let false_label = cx.em.fresh_label();
            let end_label = cx.em.fresh_label();
            cx.em.jump(op::JZ, false_label.clone());
            emit_expr(rhs, globals, cx)?;
            cx.em.jump(op::JMP, end_label.clone());
            cx.em.define_label(false_label);
            cx.em.op(op::PUSH_CONST);
            cx.em.u16(0);
            cx.em.define_label(end_label);
            return Ok(());
        }
        BinOp::Or => {
            emit_expr(lhs, globals, cx)?;
            let eval_rhs = cx.em.fresh_label();
            let end_label = cx.em.fresh_label();
            cx.em.jump(op::JZ, eval_rhs.clone());
            cx.em.op(op::PUSH_CONST);
            cx.em.u16(1);
            cx.em.jump(op::JMP, end_label.clone());
            cx.em.define_label(eval_rhs);
            emit_expr(rhs, globals, cx)?;
            cx.em.define_label(end_label);
            return Ok(());
        }
        _ => {}
    }
    emit_expr(lhs, globals, cx)?;
    emit_expr(rhs, globals, cx)?;
    let opcode = match bop {
        BinOp::Add => op::ADD,
        BinOp::Sub => op::SUB,
        BinOp::Mul => op::MUL,
        BinOp::Div => op::DIV,
        BinOp::Mod => op::MOD,
        BinOp::BitAnd => op::AND,
        BinOp::BitOr => op::OR,
        BinOp::BitXor => op::XOR,
        BinOp::Shl => op::SHL,
        BinOp::Shr => op::SHR,
        BinOp::Eq => op::CMP_EQ,
        BinOp::Ne => op::CMP_NE,
        BinOp::Lt => op::CMP_LT,
        BinOp::Le => op::CMP_LE,
        BinOp::Gt => op::CMP_GT,
        BinOp::Ge => op::CMP_GE,
        BinOp::And | BinOp::Or => unreachable!("handled above"),
    };
    cx.em.op(opcode);
    Ok(())
}

fn emit_assign(target: &Expr, value: &Expr, globals: &BTreeMap<String, u16>, cx: &mut FunctionCx) -> Result<(), CompileError> {
    match &target.kind {
        ExprKind::Ident(name) => {
            emit_expr(value, globals, cx)?;
            cx.em.coerce_to(&target.ty());
            cx.em.op(op::DUP);
            match target.binding() {
                Some(Binding::Local(slot)) => {
                    cx.em.op(op::STORE_LOCAL);
                    cx.em.u8(slot as u8);
                }
                Some(Binding::Global) => {
                    let addr = *globals.get(name).expect("global address allocated before codegen");
                    cx.em.op(op::STORE_GLOBAL);
                    cx.em.u16(addr);
                }
                None => return Err(CompileError::codegen(Some(target.span()), format!("'{name}' has no resolved binding"))),
            }
            Ok(())
        }
        ExprKind::Index(base, index) => {
            emit_expr(base, globals, cx)?;
            emit_expr(index, globals, cx)?;
            emit_expr(value, globals, cx)?;
            cx.em.coerce_to(&target.ty());
            cx.em.op(op::STORE_INDEX);
            // Re-derives the stored slot so this expression still yields
            // the assigned value; base/index are assumed side-effect-free.
            emit_expr(base, globals, cx)?;
            emit_expr(index, globals, cx)?;
            cx.em.op(op::LOAD_INDEX);
            Ok(())
        }
        _ => Err(CompileError::codegen(Some(target.span()), "left-hand side of assignment is not assignable".to_string())),
    }
}
