//! Semantic analyzer (C6) — two passes over the AST: a declaration pass
//! that populates the global scope, and a body pass that resolves names,
//! checks types and annotates every expression node in place.

use crate::ast::*;
use crate::error::CompileError;
use crate::span::Span;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Function,
    Parameter,
    Local,
    Global,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub ty: Type,
    /// Stack-relative slot index, assigned only to parameters and locals.
    pub slot: Option<u16>,
    pub mutable: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
struct FunctionSig {
    params: Vec<Type>,
    return_type: Type,
    span: Span,
}

/// A stack of flat scopes — global, per-function parameters, and one per
/// nested block. Entering pushes, exiting pops, lookup scans top-to-bottom.
pub struct SymbolTable {
    scopes: Vec<BTreeMap<String, Symbol>>,
}

impl SymbolTable {
    fn new() -> Self {
        Self { scopes: vec![BTreeMap::new()] }
    }

    fn push(&mut self) {
        self.scopes.push(BTreeMap::new());
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    fn insert(&mut self, name: String, sym: Symbol) {
        self.scopes.last_mut().expect("at least one scope").insert(name, sym);
    }

    fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn declared_in_current(&self, name: &str) -> bool {
        self.scopes.last().expect("at least one scope").contains_key(name)
    }
}

struct Analyzer {
    table: SymbolTable,
    functions: BTreeMap<String, FunctionSig>,
    loop_depth: u32,
    next_slot: u16,
}

pub fn analyze(program: &Program) -> Result<SymbolTable, CompileError> {
    let mut analyzer = Analyzer {
        table: SymbolTable::new(),
        functions: BTreeMap::new(),
        loop_depth: 0,
        next_slot: 0,
    };
    analyzer.declaration_pass(program)?;
    analyzer.body_pass(program)?;
    Ok(analyzer.table)
}

fn check_reserved_name(name: &str, span: Span) -> Result<(), CompileError> {
    if name.starts_with("__") && name != "__Boot" {
        return Err(CompileError::semantic(
            span,
            format!("identifier '{name}' uses the reserved '__' prefix; only __Boot may"),
        ));
    }
    Ok(())
}

impl Analyzer {
    // ── Pass 1: declarations ─────────────────────────────────────────

    fn declaration_pass(&mut self, program: &Program) -> Result<(), CompileError> {
        for f in &program.functions {
            check_reserved_name(&f.name, f.span)?;
            if self.functions.contains_key(&f.name) || self.table.declared_in_current(&f.name) {
                return Err(CompileError::semantic(
                    f.span,
                    format!("duplicate declaration of function '{}'", f.name),
                ));
            }
            let sig = FunctionSig {
                params: f.params.iter().map(|p| p.ty.clone()).collect(),
                return_type: f.return_type.clone(),
                span: f.span,
            };
            self.functions.insert(f.name.clone(), sig);
            self.table.insert(
                f.name.clone(),
                Symbol { kind: SymbolKind::Function, ty: f.return_type.clone(), slot: None, mutable: false, span: f.span },
            );
        }

        for g in &program.globals {
            check_reserved_name(&g.name, g.span)?;
            if self.table.declared_in_current(&g.name) {
                return Err(CompileError::semantic(g.span, format!("duplicate declaration of global '{}'", g.name)));
            }
            let ty = self.resolve_global_type(g)?;
            *g.resolved_type.borrow_mut() = Some(ty.clone());
            self.table.insert(
                g.name.clone(),
                Symbol { kind: SymbolKind::Global, ty, slot: None, mutable: g.mutable, span: g.span },
            );
        }

        Ok(())
    }

    fn resolve_global_type(&mut self, g: &GlobalDecl) -> Result<Type, CompileError> {
        if let Some(init) = &g.init {
            let inferred = self.visit_expr(init)?;
            if let Some(declared) = &g.ty {
                self.check_assignable(declared, &inferred, init.span())?;
                return Ok(declared.clone());
            }
            return Ok(inferred);
        }
        g.ty.clone().ok_or_else(|| {
            CompileError::semantic(g.span, format!("global '{}' needs a type annotation or initializer", g.name))
        })
    }

    // ── Pass 2: function bodies ───────────────────────────────────────

    fn body_pass(&mut self, program: &Program) -> Result<(), CompileError> {
        for f in &program.functions {
            self.table.push();
            self.next_slot = 0;
            for p in &f.params {
                check_reserved_name(&p.name, p.span)?;
                let slot = self.next_slot;
                self.next_slot += 1;
                check_slot_limit(self.next_slot, p.span)?;
                self.table.insert(
                    p.name.clone(),
                    Symbol { kind: SymbolKind::Parameter, ty: p.ty.clone(), slot: Some(slot), mutable: true, span: p.span },
                );
            }
            self.visit_block(&f.body, &f.return_type)?;
            if f.return_type != Type::Void && !always_returns(&f.body.stmts) {
                self.table.pop();
                return Err(CompileError::semantic(
                    f.span,
                    format!("function '{}' does not return a value on all paths", f.name),
                ));
            }
            self.table.pop();
        }
        Ok(())
    }

    fn visit_block(&mut self, block: &Block, return_type: &Type) -> Result<(), CompileError> {
        self.table.push();
        for s in &block.stmts {
            self.visit_stmt(s, return_type)?;
        }
        self.table.pop();
        Ok(())
    }

    fn visit_stmt(&mut self, stmt: &Stmt, return_type: &Type) -> Result<(), CompileError> {
        match stmt {
            Stmt::Block(b) => self.visit_block(b, return_type),
            Stmt::Let { name, ty, init, mutable, span } => {
                check_reserved_name(name, *span)?;
                let resolved = match (ty, init) {
                    (Some(declared), Some(expr)) => {
                        let actual = self.visit_expr(expr)?;
                        self.check_assignable(declared, &actual, expr.span())?;
                        declared.clone()
                    }
                    (Some(declared), None) => declared.clone(),
                    (None, Some(expr)) => self.visit_expr(expr)?,
                    (None, None) => {
                        return Err(CompileError::semantic(*span, format!("'{name}' needs a type annotation or initializer")));
                    }
                };
                if self.table.declared_in_current(name) {
                    return Err(CompileError::semantic(*span, format!("duplicate declaration of '{name}' in this scope")));
                }
                let slot = self.next_slot;
                self.next_slot += 1;
                check_slot_limit(self.next_slot, *span)?;
                self.table.insert(
                    name.clone(),
                    Symbol { kind: SymbolKind::Local, ty: resolved, slot: Some(slot), mutable: *mutable, span: *span },
                );
                Ok(())
            }
            Stmt::If { cond, then_block, else_block, span } => {
                let cond_ty = self.visit_expr(cond)?;
                self.require_bool_like(&cond_ty, *span)?;
                self.visit_block(then_block, return_type)?;
                if let Some(eb) = else_block {
                    self.visit_block(eb, return_type)?;
                }
                Ok(())
            }
            Stmt::While { cond, body, span } => {
                let cond_ty = self.visit_expr(cond)?;
                self.require_bool_like(&cond_ty, *span)?;
                self.loop_depth += 1;
                let res = self.visit_block(body, return_type);
                self.loop_depth -= 1;
                res
            }
            Stmt::Return { value, span } => {
                match (value, return_type) {
                    (None, Type::Void) => Ok(()),
                    (None, other) => Err(CompileError::semantic(*span, format!("expected a return value of type {other}"))),
                    (Some(expr), Type::Void) => {
                        self.visit_expr(expr)?;
                        Err(CompileError::semantic(expr.span(), "function returning void must not return a value".to_string()))
                    }
                    (Some(expr), expected) => {
                        let actual = self.visit_expr(expr)?;
                        self.check_assignable(expected, &actual, expr.span())?;
                        Ok(())
                    }
                }
            }
            Stmt::Expr(e) => {
                self.visit_expr(e)?;
                Ok(())
            }
            Stmt::Break(span) => {
                if self.loop_depth == 0 {
                    return Err(CompileError::semantic(*span, "'break' used outside of a loop".to_string()));
                }
                Ok(())
            }
            Stmt::Continue(span) => {
                if self.loop_depth == 0 {
                    return Err(CompileError::semantic(*span, "'continue' used outside of a loop".to_string()));
                }
                Ok(())
            }
        }
    }

    fn visit_expr(&mut self, expr: &Expr) -> Result<Type, CompileError> {
        let ty = self.infer_expr(expr)?;
        expr.set_type(ty.clone());
        Ok(ty)
    }

    fn infer_expr(&mut self, expr: &Expr) -> Result<Type, CompileError> {
        match &expr.kind {
            ExprKind::Int(v) => Ok(smallest_fitting_type(*v)),
            ExprKind::Bool(_) => Ok(Type::Bool),
            ExprKind::Str(_) => Ok(Type::Pointer(Box::new(Type::U8))),
            ExprKind::Ident(name) => {
                let sym = self
                    .table
                    .lookup(name)
                    .ok_or_else(|| CompileError::semantic(expr.span(), format!("undeclared identifier '{name}'")))?;
                match sym.kind {
                    SymbolKind::Local | SymbolKind::Parameter => {
                        expr.set_binding(Binding::Local(sym.slot.expect("locals always have a slot")));
                    }
                    SymbolKind::Global => expr.set_binding(Binding::Global),
                    SymbolKind::Function => {}
                }
                Ok(sym.ty.clone())
            }
            ExprKind::Unary(op, operand) => {
                let ty = self.visit_expr(operand)?;
                match op {
                    UnOp::Not => {
                        self.require_bool_like(&ty, operand.span())?;
                        Ok(Type::Bool)
                    }
                    UnOp::Neg | UnOp::BitNot => {
                        if !ty.is_integer() {
                            return Err(CompileError::semantic(operand.span(), format!("operator requires an integer operand, found {ty}")));
                        }
                        Ok(ty)
                    }
                }
            }
            ExprKind::Binary(op, lhs, rhs) => {
                let lt = self.visit_expr(lhs)?;
                let rt = self.visit_expr(rhs)?;
                self.check_binop(*op, &lt, &rt, expr.span())
            }
            ExprKind::Call(name, args) => {
                let sig = self
                    .functions
                    .get(name)
                    .cloned()
                    .ok_or_else(|| CompileError::semantic(expr.span(), format!("call to undeclared function '{name}'")))?;
                if args.len() != sig.params.len() {
                    return Err(CompileError::semantic(
                        expr.span(),
                        format!("'{name}' expects {} argument(s), found {}", sig.params.len(), args.len()),
                    ));
                }
                for (arg, expected) in args.iter().zip(sig.params.iter()) {
                    let actual = self.visit_expr(arg)?;
                    self.check_assignable(expected, &actual, arg.span())?;
                }
                Ok(sig.return_type)
            }
            ExprKind::Index(base, index) => {
                let base_ty = self.visit_expr(base)?;
                let index_ty = self.visit_expr(index)?;
                if !index_ty.is_integer() {
                    return Err(CompileError::semantic(index.span(), format!("array index must be an integer, found {index_ty}")));
                }
                match base_ty {
                    Type::Array(elem, _) => Ok(*elem),
                    Type::Pointer(target) => Ok(*target),
                    other => Err(CompileError::semantic(base.span(), format!("cannot index into a value of type {other}"))),
                }
            }
            ExprKind::Assign(target, value) => {
                if !target.is_lvalue() {
                    return Err(CompileError::semantic(target.span(), "left-hand side of assignment is not assignable".to_string()));
                }
                if let Some(base_name) = lvalue_base_name(target) {
                    let sym = self
                        .table
                        .lookup(base_name)
                        .ok_or_else(|| CompileError::semantic(target.span(), format!("undeclared identifier '{base_name}'")))?;
                    if !sym.mutable {
                        return Err(CompileError::semantic(target.span(), format!("cannot assign to immutable binding '{base_name}'")));
                    }
                }
                let target_ty = self.visit_expr(target)?;
                let value_ty = self.visit_expr(value)?;
                self.check_assignable(&target_ty, &value_ty, value.span())?;
                Ok(target_ty)
            }
        }
    }

    fn check_binop(&self, op: BinOp, lt: &Type, rt: &Type, span: Span) -> Result<Type, CompileError> {
        use BinOp::*;
        match op {
            And | Or => {
                self.require_bool_like(lt, span)?;
                self.require_bool_like(rt, span)?;
                Ok(Type::Bool)
            }
            Eq | Ne => {
                if (lt.is_integer() && rt.is_integer()) || (*lt == Type::Bool && *rt == Type::Bool) {
                    Ok(Type::Bool)
                } else {
                    Err(CompileError::semantic(span, format!("cannot compare {lt} with {rt}")))
                }
            }
            Lt | Le | Gt | Ge => {
                if lt.is_integer() && rt.is_integer() {
                    Ok(Type::Bool)
                } else {
                    Err(CompileError::semantic(span, format!("relational operator requires integer operands, found {lt} and {rt}")))
                }
            }
            Add | Sub | Mul | Div | Mod | BitAnd | BitOr | BitXor | Shl | Shr => {
                if !lt.is_integer() || !rt.is_integer() {
                    return Err(CompileError::semantic(span, format!("arithmetic operator requires integer operands, found {lt} and {rt}")));
                }
                Ok(wider_type(lt, rt))
            }
        }
    }

    fn require_bool_like(&self, ty: &Type, span: Span) -> Result<(), CompileError> {
        if *ty == Type::Bool {
            Ok(())
        } else {
            Err(CompileError::semantic(span, format!("expected a bool, found {ty}")))
        }
    }

    fn check_assignable(&self, expected: &Type, actual: &Type, span: Span) -> Result<(), CompileError> {
        if expected == actual {
            return Ok(());
        }
        if expected.is_integer() && actual.is_integer() {
            let (ew, aw) = (expected.width().unwrap(), actual.width().unwrap());
            if aw <= ew && expected.is_unsigned() == actual.is_unsigned() {
                return Ok(());
            }
        }
        Err(CompileError::semantic(span, format!("expected type {expected}, found {actual}")))
    }
}

/// The code generator's `LOAD_LOCAL`/`STORE_LOCAL` opcodes encode a slot
/// index in a single byte, so a function may not declare more than 256
/// parameters and locals combined.
fn check_slot_limit(next_slot: u16, span: Span) -> Result<(), CompileError> {
    if next_slot > u8::MAX as u16 + 1 {
        return Err(CompileError::semantic(
            span,
            "function exceeds the 256 parameter/local slot limit".to_string(),
        ));
    }
    Ok(())
}

fn smallest_fitting_type(v: u16) -> Type {
    if v <= 0xFF {
        Type::U8
    } else {
        Type::U16
    }
}

fn wider_type(a: &Type, b: &Type) -> Type {
    let (aw, bw) = (a.width().unwrap_or(0), b.width().unwrap_or(0));
    if aw != bw {
        return if aw > bw { a.clone() } else { b.clone() };
    }
    // Equal width: unsigned wins ties.
    if a.is_unsigned() {
        a.clone()
    } else {
        b.clone()
    }
}

fn lvalue_base_name(expr: &Expr) -> Option<&str> {
    match &expr.kind {
        ExprKind::Ident(name) => Some(name.as_str()),
        ExprKind::Index(base, _) => lvalue_base_name(base),
        _ => None,
    }
}

/// Conservative reachability check used for the "missing return" diagnostic:
/// a statement sequence is guaranteed to return only through an explicit
/// `return`, or an `if`/`else` where both branches are themselves
/// guaranteed to return. Loops are never treated as guaranteeing a return,
/// since `break` can always escape one.
fn always_returns(stmts: &[Stmt]) -> bool {
    match stmts.last() {
        None => false,
        Some(Stmt::Return { .. }) => true,
        Some(Stmt::Block(b)) => always_returns(&b.stmts),
        Some(Stmt::If { then_block, else_block: Some(else_block), .. }) => {
            always_returns(&then_block.stmts) && always_returns(&else_block.stmts)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn analyze_src(src: &str) -> Result<SymbolTable, CompileError> {
        let program = parse(lex(src)).expect("parse should succeed");
        analyze(&program)
    }

    #[test]
    fn resolves_simple_function() {
        assert!(analyze_src("fn Start() { return; }").is_ok());
    }

    #[test]
    fn rejects_duplicate_function() {
        let err = analyze_src("fn Start() { return; } fn Start() { return; }").unwrap_err();
        assert!(matches!(err, CompileError::Semantic { .. }));
    }

    #[test]
    fn rejects_reserved_prefix_except_boot() {
        assert!(analyze_src("fn __Boot() { return; }").is_ok());
        assert!(analyze_src("fn __Weird() { return; }").is_err());
    }

    #[test]
    fn rejects_undeclared_identifier() {
        let err = analyze_src("fn F() { return x; }").unwrap_err();
        assert!(matches!(err, CompileError::Semantic { .. }));
    }

    #[test]
    fn return_type_mismatch_is_error() {
        let err = analyze_src("fn F(): u8 { return 0x1FF; }").unwrap_err();
        assert!(matches!(err, CompileError::Semantic { .. }));
    }

    #[test]
    fn immutable_assignment_is_error() {
        let err = analyze_src("fn F() { let x: u16 = 1; x = 2; return; }").unwrap_err();
        assert!(matches!(err, CompileError::Semantic { .. }));
    }

    #[test]
    fn mutable_assignment_is_ok() {
        assert!(analyze_src("fn F() { var x: u16 = 1; x = 2; return; }").is_ok());
    }

    #[test]
    fn break_outside_loop_is_error() {
        let err = analyze_src("fn F() { break; return; }").unwrap_err();
        assert!(matches!(err, CompileError::Semantic { .. }));
    }

    #[test]
    fn break_inside_while_is_ok() {
        assert!(analyze_src("fn F() { while (true) { break; } return; }").is_ok());
    }

    #[test]
    fn missing_return_is_error() {
        let err = analyze_src("fn F(): u8 { let x: u8 = 1; }").unwrap_err();
        assert!(matches!(err, CompileError::Semantic { .. }));
    }

    #[test]
    fn forward_call_resolves_via_declaration_pass() {
        assert!(analyze_src("fn A() { B(); return; } fn B() { return; }").is_ok());
    }

    #[test]
    fn exceeding_the_slot_limit_is_an_error() {
        let mut src = String::from("fn F() { ");
        for i in 0..300 {
            src.push_str(&format!("let v{i}: u8 = 0; "));
        }
        src.push_str("return; }");
        let err = analyze_src(&src).unwrap_err();
        assert!(matches!(err, CompileError::Semantic { .. }));
    }

    #[test]
    fn short_circuit_still_requires_declared_names() {
        let err = analyze_src("fn F() { if (false && crash()) { } return; }").unwrap_err();
        assert!(matches!(err, CompileError::Semantic { .. }));
    }
}
