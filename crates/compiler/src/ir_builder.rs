//! AST -> IR lowering: constant folding and call-temporary hoisting.
//!
//! One task per function, same fan-out shape as the analyzer's Phase B.
//! Each task walks its own private clone of the (signatures-only) global
//! table, since locals introduced along the way are thread-local. A lowered
//! function is the typed rebuild of its AST counterpart: the AST itself is
//! never mutated with resolved types, so nothing here reaches back across
//! tasks.

use crate::analyzer::ErrorMap;
use crate::ast::{self, BinOp, Program, Type};
use crate::dce::eliminate_dead_code;
use crate::diagnostics::Diagnostic;
use crate::ir::{
    IrBinOp, IrCaseArm, IrDefaultArm, IrExpr, IrFunction, IrParameter, IrProgram, IrStatement,
    IrTemporary,
};
use crate::stack_memory::required_memory;
use crate::symtab::{Kind, ScopeManager, Symbol, SymbolTable};
use crate::threadpool::{Job, ThreadPool};
use crate::token::SourcePos;
use std::sync::{Arc, Mutex};

pub fn build_ir(
    program: &Program,
    global: &SymbolTable,
    pool: &ThreadPool,
) -> Result<IrProgram, ErrorMap> {
    let slots: Arc<Mutex<Vec<Option<IrFunction>>>> =
        Arc::new(Mutex::new((0..program.functions.len()).map(|_| None).collect()));
    let errors: Arc<Mutex<ErrorMap>> = Arc::new(Mutex::new(ErrorMap::new()));
    let global = Arc::new(global.clone());
    let program = Arc::new(program.clone());

    let jobs: Vec<Job> = (0..program.functions.len())
        .map(|i| {
            let program = Arc::clone(&program);
            let global = Arc::clone(&global);
            let slots = Arc::clone(&slots);
            let errors = Arc::clone(&errors);
            Box::new(move || {
                let func = &program.functions[i];
                let (lowered, func_errors) = lower_function(func, &global);
                if func_errors.is_empty() {
                    slots.lock().unwrap()[i] = Some(lowered);
                } else {
                    errors.lock().unwrap().insert(func.name.clone(), func_errors);
                }
            }) as Job
        })
        .collect();
    pool.submit_batch(jobs);

    let errors = Arc::try_unwrap(errors)
        .map(|m| m.into_inner().unwrap())
        .unwrap_or_else(|arc| arc.lock().unwrap().clone());
    if !errors.is_empty() {
        return Err(errors);
    }
    let slots = Arc::try_unwrap(slots)
        .map(|m| m.into_inner().unwrap())
        .unwrap_or_else(|arc| arc.lock().unwrap().clone());
    let functions = slots.into_iter().flatten().collect();
    Ok(IrProgram { functions })
}

struct BuildCtx<'a> {
    scopes: ScopeManager<'a>,
    temp_counter: usize,
    errors: Vec<Diagnostic>,
}

impl<'a> BuildCtx<'a> {
    fn fresh_temp(&mut self) -> String {
        self.temp_counter += 1;
        format!("_t{}", self.temp_counter)
    }
}

fn lower_function(func: &ast::Function, global: &SymbolTable) -> (IrFunction, Vec<Diagnostic>) {
    let mut local = global.clone();
    let mut ctx = BuildCtx {
        scopes: ScopeManager::new(&mut local),
        temp_counter: 0,
        errors: Vec::new(),
    };
    ctx.scopes.push_scope();
    for param in &func.params {
        ctx.scopes.insert(Symbol::variable(&param.name, param.ty, Kind::Parameter));
    }

    let body: Vec<IrStatement> = func.body.iter().map(|s| lower_statement(&mut ctx, s)).collect();
    ctx.scopes.pop_scope();

    let body = eliminate_dead_code(body);
    let params = func
        .params
        .iter()
        .map(|p| IrParameter { name: p.name.clone(), ty: p.ty })
        .collect();
    let mut lowered = IrFunction {
        name: func.name.clone(),
        return_type: func.return_type,
        params,
        body,
        required_memory: 0,
    };
    lowered.required_memory = required_memory(&lowered);
    (lowered, ctx.errors)
}

fn lower_statement(ctx: &mut BuildCtx, stmt: &ast::Statement) -> IrStatement {
    match stmt {
        ast::Statement::VarDecl { name, ty, init, .. } => {
            let (init_ir, temporaries) = match init {
                Some(expr) => {
                    let (ir, temps) = lower_with_hoisting(ctx, expr);
                    (Some(ir), temps)
                }
                None => (None, Vec::new()),
            };
            let declared_ty = match (*ty, &init_ir) {
                (Type::Auto, Some(ir)) => ir.ty(),
                _ => *ty,
            };
            ctx.scopes.insert(Symbol::variable(name, declared_ty, Kind::Variable));
            IrStatement::VarDecl {
                name: name.clone(),
                ty: declared_ty,
                temporaries,
                init: init_ir,
            }
        }
        ast::Statement::Assign { name, value, .. } => {
            let (value, temporaries) = lower_with_hoisting(ctx, value);
            if let Some(sym) = ctx.scopes.get(name) {
                if sym.ty == Type::NoType {
                    let ty = value.ty();
                    ctx.scopes.set_type(name, ty);
                }
            }
            IrStatement::Assign { name: name.clone(), temporaries, value }
        }
        ast::Statement::Printf { value, .. } => {
            let (value, temporaries) = lower_with_hoisting(ctx, value);
            IrStatement::Printf { temporaries, value }
        }
        ast::Statement::Return { value, .. } => {
            let (value, temporaries) = match value {
                Some(expr) => {
                    let (ir, temps) = lower_with_hoisting(ctx, expr);
                    (Some(ir), temps)
                }
                None => (None, Vec::new()),
            };
            IrStatement::Return { temporaries, value }
        }
        ast::Statement::If { cond, then_branch, else_branch, .. } => {
            let (cond, temporaries) = lower_with_hoisting(ctx, cond);
            ctx.scopes.push_scope();
            let then_branch = Box::new(lower_statement(ctx, then_branch));
            ctx.scopes.pop_scope();
            let else_branch = else_branch.as_ref().map(|e| {
                ctx.scopes.push_scope();
                let lowered = Box::new(lower_statement(ctx, e));
                ctx.scopes.pop_scope();
                lowered
            });
            IrStatement::If { temporaries, cond, then_branch, else_branch }
        }
        ast::Statement::While { cond, body, .. } => {
            let (cond, temporaries) = lower_with_hoisting(ctx, cond);
            ctx.scopes.push_scope();
            let body = Box::new(lower_statement(ctx, body));
            ctx.scopes.pop_scope();
            IrStatement::While { temporaries, cond, body }
        }
        ast::Statement::DoWhile { body, cond, .. } => {
            ctx.scopes.push_scope();
            let body = Box::new(lower_statement(ctx, body));
            ctx.scopes.pop_scope();
            let (cond, temporaries) = lower_with_hoisting(ctx, cond);
            IrStatement::DoWhile { body, temporaries, cond }
        }
        ast::Statement::For { init, cond, incr, body, .. } => {
            ctx.scopes.push_scope();
            let init = Box::new(lower_statement(ctx, init));
            let (cond, cond_temporaries) = match cond {
                Some(expr) => {
                    let (ir, temps) = lower_with_hoisting(ctx, expr);
                    (Some(ir), temps)
                }
                None => (None, Vec::new()),
            };
            let incr = Box::new(lower_statement(ctx, incr));
            ctx.scopes.push_scope();
            let body = Box::new(lower_statement(ctx, body));
            ctx.scopes.pop_scope();
            ctx.scopes.pop_scope();
            IrStatement::For { init, cond_temporaries, cond, incr, body }
        }
        ast::Statement::Switch { subject, cases, default, .. } => {
            let cases = cases
                .iter()
                .map(|c| {
                    ctx.scopes.push_scope();
                    let body = c.body.iter().map(|s| lower_statement(ctx, s)).collect();
                    ctx.scopes.pop_scope();
                    IrCaseArm { literal: lower_literal(&c.literal), body, has_break: c.has_break }
                })
                .collect();
            let default = default.as_ref().map(|d| {
                ctx.scopes.push_scope();
                let body = d.body.iter().map(|s| lower_statement(ctx, s)).collect();
                ctx.scopes.pop_scope();
                IrDefaultArm { body, has_break: d.has_break }
            });
            IrStatement::Switch { subject: subject.clone(), cases, default }
        }
        ast::Statement::Compound { body, .. } => {
            ctx.scopes.push_scope();
            let body = body.iter().map(|s| lower_statement(ctx, s)).collect();
            ctx.scopes.pop_scope();
            IrStatement::Compound { body }
        }
    }
}

fn lower_with_hoisting(ctx: &mut BuildCtx, expr: &ast::Expr) -> (IrExpr, Vec<IrTemporary>) {
    let mut temporaries = Vec::new();
    let lowered = hoist_walk(ctx, expr, &mut temporaries);
    (lowered, temporaries)
}

/// Left-to-right recursive walk: every call node is lowered (including its
/// own arguments, which may themselves hoist) and replaced in place by a
/// reference to a freshly named temporary, recorded in encounter order.
fn hoist_walk(ctx: &mut BuildCtx, expr: &ast::Expr, temporaries: &mut Vec<IrTemporary>) -> IrExpr {
    match expr {
        ast::Expr::FunctionCall { name, args, .. } => {
            let args = args.iter().map(|a| hoist_walk(ctx, a, temporaries)).collect::<Vec<_>>();
            let ty = call_return_type(ctx, name);
            let call = IrExpr::Call { name: name.clone(), args, ty };
            let name = ctx.fresh_temp();
            temporaries.push(IrTemporary { name: name.clone(), ty, call });
            IrExpr::Temporary { name, ty }
        }
        ast::Expr::Binary { op, lhs, rhs, pos } => {
            let lhs = hoist_walk(ctx, lhs, temporaries);
            let rhs = hoist_walk(ctx, rhs, temporaries);
            combine_binary(ctx, *op, lhs, rhs, *pos)
        }
        ast::Expr::Id { .. } | ast::Expr::Literal(_) => lower_leaf(ctx, expr),
    }
}

fn lower_leaf(ctx: &mut BuildCtx, expr: &ast::Expr) -> IrExpr {
    match expr {
        ast::Expr::Id { name, .. } => {
            let ty = ctx.scopes.get(name).map(|s| s.ty).unwrap_or(Type::NoType);
            IrExpr::Variable { name: name.clone(), ty }
        }
        ast::Expr::Literal(lit) => lower_literal(lit),
        _ => unreachable!("lower_leaf called on a non-leaf expression"),
    }
}

fn lower_literal(lit: &ast::Literal) -> IrExpr {
    match lit.ty {
        Type::Unsigned => IrExpr::UnsignedLiteral(lit.text.parse().unwrap_or(0)),
        _ => IrExpr::IntLiteral(lit.text.parse().unwrap_or(0)),
    }
}

fn call_return_type(ctx: &BuildCtx, name: &str) -> Type {
    ctx.scopes
        .get(name)
        .filter(|s| s.kind == Kind::Function)
        .map(|s| s.ty)
        .unwrap_or(Type::NoType)
}

fn combine_binary(ctx: &mut BuildCtx, op: BinOp, lhs: IrExpr, rhs: IrExpr, pos: SourcePos) -> IrExpr {
    let ty = lhs.ty();
    debug_assert_eq!(ty, rhs.ty(), "operand types must already agree after analysis");

    if let (Some(l), Some(r)) = as_literal_pair(&lhs, &rhs) {
        return fold(ctx, op, l, r, ty, pos);
    }

    IrExpr::Binary { op: specialize(op, ty), lhs: Box::new(lhs), rhs: Box::new(rhs), ty, pos }
}

enum FoldVal {
    Int(i64),
    Unsigned(u64),
}

fn as_literal_pair(lhs: &IrExpr, rhs: &IrExpr) -> (Option<FoldVal>, Option<FoldVal>) {
    let l = match lhs {
        IrExpr::IntLiteral(v) => Some(FoldVal::Int(*v)),
        IrExpr::UnsignedLiteral(v) => Some(FoldVal::Unsigned(*v)),
        _ => None,
    };
    let r = match rhs {
        IrExpr::IntLiteral(v) => Some(FoldVal::Int(*v)),
        IrExpr::UnsignedLiteral(v) => Some(FoldVal::Unsigned(*v)),
        _ => None,
    };
    (l, r)
}

fn fold(ctx: &mut BuildCtx, op: BinOp, l: FoldVal, r: FoldVal, _ty: Type, pos: SourcePos) -> IrExpr {
    match (l, r) {
        (FoldVal::Int(l), FoldVal::Int(r)) => {
            if op.is_relational() {
                IrExpr::IntLiteral(fold_relational_int(op, l, r))
            } else {
                IrExpr::IntLiteral(fold_arith_int(ctx, op, l, r, pos))
            }
        }
        (FoldVal::Unsigned(l), FoldVal::Unsigned(r)) => {
            if op.is_relational() {
                IrExpr::UnsignedLiteral(fold_relational_unsigned(op, l, r) as u64)
            } else {
                IrExpr::UnsignedLiteral(fold_arith_unsigned(ctx, op, l, r, pos))
            }
        }
        // Types already agreed (debug_assert above); this arm is unreachable
        // under a successful analysis pass.
        _ => IrExpr::IntLiteral(0),
    }
}

fn fold_arith_int(ctx: &mut BuildCtx, op: BinOp, l: i64, r: i64, pos: SourcePos) -> i64 {
    match op {
        BinOp::Add => l.wrapping_add(r),
        BinOp::Sub => l.wrapping_sub(r),
        BinOp::Mul => l.wrapping_mul(r),
        BinOp::Div => {
            if r == 0 {
                ctx.errors.push(Diagnostic::new(pos, "division by ZERO"));
                0
            } else {
                l.wrapping_div(r)
            }
        }
        BinOp::And => l & r,
        BinOp::Or => l | r,
        BinOp::Xor => l ^ r,
        BinOp::Shl => l.wrapping_shl((r as u32) & 63),
        BinOp::Shr => l.wrapping_shr((r as u32) & 63),
        _ => unreachable!("relational operator handled separately"),
    }
}

fn fold_arith_unsigned(ctx: &mut BuildCtx, op: BinOp, l: u64, r: u64, pos: SourcePos) -> u64 {
    match op {
        BinOp::Add => l.wrapping_add(r),
        BinOp::Sub => l.wrapping_sub(r),
        BinOp::Mul => l.wrapping_mul(r),
        BinOp::Div => {
            if r == 0 {
                ctx.errors.push(Diagnostic::new(pos, "division by ZERO"));
                0
            } else {
                l.wrapping_div(r)
            }
        }
        BinOp::And => l & r,
        BinOp::Or => l | r,
        BinOp::Xor => l ^ r,
        BinOp::Shl => l.wrapping_shl((r as u32) & 63),
        BinOp::Shr => l.wrapping_shr((r as u32) & 63),
        _ => unreachable!("relational operator handled separately"),
    }
}

fn fold_relational_int(op: BinOp, l: i64, r: i64) -> i64 {
    (match op {
        BinOp::Lt => l < r,
        BinOp::Gt => l > r,
        BinOp::Le => l <= r,
        BinOp::Ge => l >= r,
        BinOp::Eq => l == r,
        BinOp::NotEq => l != r,
        _ => unreachable!("non-relational operator"),
    }) as i64
}

fn fold_relational_unsigned(op: BinOp, l: u64, r: u64) -> i64 {
    (match op {
        BinOp::Lt => l < r,
        BinOp::Gt => l > r,
        BinOp::Le => l <= r,
        BinOp::Ge => l >= r,
        BinOp::Eq => l == r,
        BinOp::NotEq => l != r,
        _ => unreachable!("non-relational operator"),
    }) as i64
}

fn specialize(op: BinOp, ty: Type) -> IrBinOp {
    let unsigned = ty == Type::Unsigned;
    match op {
        BinOp::Add => if unsigned { IrBinOp::AddUnsigned } else { IrBinOp::AddInt },
        BinOp::Sub => if unsigned { IrBinOp::SubUnsigned } else { IrBinOp::SubInt },
        BinOp::Mul => if unsigned { IrBinOp::MulUnsigned } else { IrBinOp::MulInt },
        BinOp::Div => if unsigned { IrBinOp::DivUnsigned } else { IrBinOp::DivInt },
        BinOp::And => IrBinOp::And,
        BinOp::Or => IrBinOp::Or,
        BinOp::Xor => IrBinOp::Xor,
        BinOp::Shl => if unsigned { IrBinOp::ShlLogical } else { IrBinOp::ShlArith },
        BinOp::Shr => if unsigned { IrBinOp::ShrLogical } else { IrBinOp::ShrArith },
        BinOp::Lt => if unsigned { IrBinOp::LtUnsigned } else { IrBinOp::LtSigned },
        BinOp::Gt => if unsigned { IrBinOp::GtUnsigned } else { IrBinOp::GtSigned },
        BinOp::Le => if unsigned { IrBinOp::LeUnsigned } else { IrBinOp::LeSigned },
        BinOp::Ge => if unsigned { IrBinOp::GeUnsigned } else { IrBinOp::GeSigned },
        BinOp::Eq => IrBinOp::EqAny,
        BinOp::NotEq => IrBinOp::NotEqAny,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;
    use crate::lexer::tokenize;
    use crate::parser::parse;

    fn build(src: &str) -> IrProgram {
        let tokens = tokenize(src).unwrap();
        let program = parse(tokens).unwrap();
        let pool = ThreadPool::new(2);
        let table = analyze(&program, &pool).unwrap();
        build_ir(&program, &table, &pool).unwrap()
    }

    #[test]
    fn folds_constant_arithmetic() {
        let ir = build("int main() { int x = 1 + 2 * 3; return x; }");
        let main = &ir.functions[0];
        match &main.body[0] {
            IrStatement::VarDecl { init: Some(IrExpr::IntLiteral(v)), .. } => assert_eq!(*v, 7),
            other => panic!("expected folded literal, got {other:?}"),
        }
    }

    #[test]
    fn division_by_literal_zero_is_recorded() {
        let tokens = tokenize("int main() { int x = 1 / 0; return x; }").unwrap();
        let program = parse(tokens).unwrap();
        let pool = ThreadPool::new(2);
        let table = analyze(&program, &pool).unwrap();
        let errors = build_ir(&program, &table, &pool).unwrap_err();
        assert!(errors["main"][0].message.contains("division by"));
    }

    #[test]
    fn hoists_call_in_binary_expression() {
        let ir = build("int f() { return 1; } int main() { int x = f() + f(); return x; }");
        let main = ir.functions.iter().find(|f| f.name == "main").unwrap();
        match &main.body[0] {
            IrStatement::VarDecl { temporaries, .. } => assert_eq!(temporaries.len(), 2),
            other => panic!("expected var decl with temporaries, got {other:?}"),
        }
    }

    #[test]
    fn nested_call_hoists_its_own_temporary() {
        let ir = build("int f(int a) { return a; } int main() { int x = f(f(1)); return x; }");
        let main = ir.functions.iter().find(|f| f.name == "main").unwrap();
        match &main.body[0] {
            IrStatement::VarDecl { temporaries, .. } => assert_eq!(temporaries.len(), 2),
            other => panic!("expected var decl with temporaries, got {other:?}"),
        }
    }
}
