//! Two-phase semantic analyzer.
//!
//! Phase A walks the function list sequentially and builds the global
//! signature table: one pass, because later functions must be callable from
//! earlier ones and the table has to be complete before any body is checked.
//! Phase B checks every function body in parallel on the shared thread pool:
//! bodies can't affect each other's symbols, so each task clones the
//! (small, signatures-only) global table into its own local scope stack
//! rather than taking a lock on shared mutable state.

use crate::ast::{BinOp, CaseArm, DefaultArm, Expr, Function, Literal, Program, Statement, Type};
use crate::diagnostics::Diagnostic;
use crate::symtab::{Kind, ScopeManager, Symbol, SymbolTable};
use crate::threadpool::{Job, ThreadPool};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Diagnostics keyed by function name, plus `"<global>"` for signature-pass
/// errors that aren't attributable to a single function body.
pub type ErrorMap = HashMap<String, Vec<Diagnostic>>;

pub const GLOBAL_KEY: &str = "<global>";

pub fn analyze(program: &Program, pool: &ThreadPool) -> Result<SymbolTable, ErrorMap> {
    let (table, global_errors) = run_phase_a(program);
    if !global_errors.is_empty() {
        let mut map = ErrorMap::new();
        map.insert(GLOBAL_KEY.to_string(), global_errors);
        return Err(map);
    }

    let table = Arc::new(table);
    let errors: Arc<Mutex<ErrorMap>> = Arc::new(Mutex::new(ErrorMap::new()));
    let program = Arc::new(program.clone());

    let jobs: Vec<Job> = (0..program.functions.len())
        .map(|i| {
            let program = Arc::clone(&program);
            let table = Arc::clone(&table);
            let errors = Arc::clone(&errors);
            Box::new(move || {
                let func = &program.functions[i];
                let func_errors = analyze_function(func, &table);
                if !func_errors.is_empty() {
                    errors.lock().unwrap().insert(func.name.clone(), func_errors);
                }
            }) as Job
        })
        .collect();
    pool.submit_batch(jobs);

    let errors = Arc::try_unwrap(errors)
        .map(|m| m.into_inner().unwrap())
        .unwrap_or_else(|arc| arc.lock().unwrap().clone());
    if errors.is_empty() {
        Ok(Arc::try_unwrap(table).unwrap_or_else(|arc| (*arc).clone()))
    } else {
        Err(errors)
    }
}

/// Sequential signature pass: inserts one `Symbol::function` per declared
/// function and validates parameter lists. The global scope is pushed once
/// and never popped, so every function symbol survives past this function.
fn run_phase_a(program: &Program) -> (SymbolTable, Vec<Diagnostic>) {
    let mut table = SymbolTable::new();
    let mut errors = Vec::new();
    {
        let mut scopes = ScopeManager::new(&mut table);
        scopes.push_scope();
        for func in &program.functions {
            if func.return_type == Type::Auto {
                errors.push(Diagnostic::new(
                    func.pos,
                    format!(
                        "function '{}' has return type 'auto': return type deduction is not supported",
                        func.name
                    ),
                ));
            }

            let params: Vec<(String, Type)> = {
                scopes.push_scope();
                let mut names = Vec::new();
                for param in &func.params {
                    if matches!(param.ty, Type::Void | Type::Auto | Type::NoType) {
                        errors.push(Diagnostic::new(
                            param.pos,
                            format!(
                                "parameter '{}' has invalid type '{}'",
                                param.name, param.ty
                            ),
                        ));
                    }
                    if !scopes.insert(Symbol::variable(&param.name, param.ty, Kind::Parameter)) {
                        errors.push(Diagnostic::new(
                            param.pos,
                            format!("parameter '{}' redefined", param.name),
                        ));
                    }
                    names.push((param.name.clone(), param.ty));
                }
                scopes.pop_scope();
                names
            };

            if func.name == "main" && !func.params.is_empty() {
                errors.push(Diagnostic::new(
                    func.pos,
                    "'main' must take zero parameters",
                ));
            }

            if !scopes.insert(Symbol::function(&func.name, func.return_type, params)) {
                errors.push(Diagnostic::new(
                    func.pos,
                    format!("function '{}' redefined", func.name),
                ));
            }
        }
        // Global scope intentionally stays open: `scopes` is dropped here,
        // releasing its borrow, but nothing was popped so every function
        // symbol remains in `table`.
    }

    if !table.lookup("main", &[Kind::Function]) {
        errors.push(Diagnostic::global("'main' function not found"));
    }

    (table, errors)
}

/// Checks one function body against the (read-only, already-complete)
/// global signature table. Parameters and locals live in a private clone of
/// that table so concurrent tasks never observe each other's scopes.
fn analyze_function(func: &Function, global: &SymbolTable) -> Vec<Diagnostic> {
    let mut local = global.clone();
    let mut errors = Vec::new();
    let mut scopes = ScopeManager::new(&mut local);
    scopes.push_scope();
    for param in &func.params {
        scopes.insert(Symbol::variable(&param.name, param.ty, Kind::Parameter));
    }

    for stmt in &func.body {
        check_statement(stmt, func, &mut scopes, &mut errors);
    }

    if func.return_type != Type::Void && !always_returns(&func.body) {
        errors.push(Diagnostic::new(
            func.pos,
            format!(
                "function '{}' does not return a value on all paths",
                func.name
            ),
        ));
    }

    scopes.pop_scope();
    errors
}

fn check_statement(
    stmt: &Statement,
    func: &Function,
    scopes: &mut ScopeManager,
    errors: &mut Vec<Diagnostic>,
) {
    match stmt {
        Statement::VarDecl { name, ty, init, pos } => {
            if matches!(ty, Type::Void | Type::NoType) {
                errors.push(Diagnostic::new(
                    *pos,
                    format!("variable '{name}' declared with invalid type '{ty}'"),
                ));
            }
            if *ty == Type::Auto && init.is_none() {
                errors.push(Diagnostic::new(
                    *pos,
                    format!("variable '{name}' declared 'auto' without an initializer"),
                ));
            }

            let init_ty = init.as_ref().map(|e| check_expr(e, scopes, errors));
            let declared_ty = match (*ty, init_ty) {
                (Type::Auto, Some(t)) => t,
                (Type::Auto, None) => Type::NoType,
                _ => *ty,
            };
            // `auto` adopts whatever the initializer produced, so it can
            // never itself mismatch; only a fixed declared type can.
            if *ty != Type::Auto {
                if let Some(it) = init_ty {
                    if it != Type::NoType && it != declared_ty {
                        errors.push(Diagnostic::new(
                            *pos,
                            format!(
                                "cannot initialize '{name}' of type '{declared_ty}' with a value of type '{it}'"
                            ),
                        ));
                    }
                }
            }

            if !scopes.insert(Symbol::variable(name, declared_ty, Kind::Variable)) {
                errors.push(Diagnostic::new(*pos, format!("variable '{name}' redefined")));
            }
        }
        Statement::Assign { name, value, pos } => {
            let value_ty = check_expr(value, scopes, errors);
            match scopes.get(name).cloned() {
                Some(sym) if matches!(sym.kind, Kind::Variable | Kind::Parameter) => {
                    if sym.ty == Type::NoType {
                        scopes.set_type(name, value_ty);
                    } else if value_ty != Type::NoType && value_ty != sym.ty {
                        errors.push(Diagnostic::new(
                            *pos,
                            format!(
                                "cannot assign value of type '{value_ty}' to '{name}' of type '{}'",
                                sym.ty
                            ),
                        ));
                    }
                }
                _ => errors.push(Diagnostic::new(*pos, format!("undefined variable '{name}'"))),
            }
        }
        Statement::Printf { value, pos } => {
            let ty = check_expr(value, scopes, errors);
            if !matches!(ty, Type::Int | Type::Unsigned | Type::NoType) {
                errors.push(Diagnostic::new(
                    *pos,
                    format!("printf argument must be an integer expression, found '{ty}'"),
                ));
            }
        }
        Statement::Return { value, pos } => match (value, func.return_type) {
            (None, Type::Void) => {}
            (None, expected) => errors.push(Diagnostic::new(
                *pos,
                format!("function '{}' must return a value of type '{expected}'", func.name),
            )),
            (Some(expr), expected) => {
                let ty = check_expr(expr, scopes, errors);
                if ty != Type::NoType && ty != expected {
                    errors.push(Diagnostic::new(
                        *pos,
                        format!(
                            "function '{}' declared to return '{expected}' but returns '{ty}'",
                            func.name
                        ),
                    ));
                }
            }
        },
        Statement::If {
            cond,
            then_branch,
            else_branch,
            pos,
        } => {
            check_condition(cond, *pos, scopes, errors);
            scopes.push_scope();
            check_statement(then_branch, func, scopes, errors);
            scopes.pop_scope();
            if let Some(else_branch) = else_branch {
                scopes.push_scope();
                check_statement(else_branch, func, scopes, errors);
                scopes.pop_scope();
            }
        }
        Statement::While { cond, body, pos } => {
            check_condition(cond, *pos, scopes, errors);
            scopes.push_scope();
            check_statement(body, func, scopes, errors);
            scopes.pop_scope();
        }
        Statement::DoWhile { body, cond, pos } => {
            scopes.push_scope();
            check_statement(body, func, scopes, errors);
            scopes.pop_scope();
            check_condition(cond, *pos, scopes, errors);
        }
        Statement::For {
            init,
            cond,
            incr,
            body,
            pos,
        } => {
            scopes.push_scope();
            check_statement(init, func, scopes, errors);
            if let Some(cond) = cond {
                check_condition(cond, *pos, scopes, errors);
            }
            check_statement(incr, func, scopes, errors);
            if let (Statement::Assign { name: init_name, .. }, Statement::Assign { name: incr_name, .. }) =
                (init.as_ref(), incr.as_ref())
            {
                if init_name != incr_name {
                    errors.push(Diagnostic::new(
                        *pos,
                        format!(
                            "for-loop initializer mutates '{init_name}' but incrementer mutates '{incr_name}'"
                        ),
                    ));
                }
            }
            scopes.push_scope();
            check_statement(body, func, scopes, errors);
            scopes.pop_scope();
            scopes.pop_scope();
        }
        Statement::Switch {
            subject,
            cases,
            default,
            pos,
        } => check_switch(subject, cases, default, *pos, func, scopes, errors),
        Statement::Compound { body, .. } => {
            scopes.push_scope();
            for stmt in body {
                check_statement(stmt, func, scopes, errors);
            }
            scopes.pop_scope();
        }
    }
}

fn check_condition(
    cond: &Expr,
    pos: crate::token::SourcePos,
    scopes: &mut ScopeManager,
    errors: &mut Vec<Diagnostic>,
) {
    let is_relational = matches!(cond, Expr::Binary { op, .. } if op.is_relational());
    check_expr(cond, scopes, errors);
    if !is_relational {
        errors.push(Diagnostic::new(pos, "condition must be a relational expression"));
    }
}

fn check_switch(
    subject: &str,
    cases: &[CaseArm],
    default: &Option<DefaultArm>,
    pos: crate::token::SourcePos,
    func: &Function,
    scopes: &mut ScopeManager,
    errors: &mut Vec<Diagnostic>,
) {
    let subject_ty = match scopes.get(subject).cloned() {
        Some(sym) if matches!(sym.kind, Kind::Variable | Kind::Parameter) => sym.ty,
        _ => {
            errors.push(Diagnostic::new(pos, format!("undefined variable '{subject}'")));
            Type::NoType
        }
    };
    if subject_ty != Type::NoType && !matches!(subject_ty, Type::Int | Type::Unsigned) {
        errors.push(Diagnostic::new(
            pos,
            format!("switch subject '{subject}' must be an integer, found '{subject_ty}'"),
        ));
        // Invalid (but resolved) subject type: the whole switch is skipped,
        // per spec — the mismatch is already reported above.
        return;
    }
    if subject_ty == Type::NoType {
        // Undefined subject: already reported above, skip the switch entirely.
        return;
    }

    let mut seen_literals: Vec<&str> = Vec::new();
    for case in cases {
        if case.literal.ty != subject_ty {
            errors.push(Diagnostic::new(
                case.literal.pos,
                format!(
                    "case label type '{}' does not match switch subject type '{subject_ty}'",
                    case.literal.ty
                ),
            ));
        }
        if seen_literals.contains(&case.literal.text.as_str()) {
            errors.push(Diagnostic::new(
                case.literal.pos,
                format!("duplicate case label '{}'", case.literal.text),
            ));
        } else {
            seen_literals.push(&case.literal.text);
        }
        scopes.push_scope();
        for stmt in &case.body {
            check_statement(stmt, func, scopes, errors);
        }
        scopes.pop_scope();
    }
    if let Some(default) = default {
        scopes.push_scope();
        for stmt in &default.body {
            check_statement(stmt, func, scopes, errors);
        }
        scopes.pop_scope();
    }
}

/// Synthesizes an expression's type, recording an error and returning
/// `Type::NoType` at the point of failure so the poison doesn't produce a
/// cascade of unrelated mismatch errors further up the tree.
fn check_expr(expr: &Expr, scopes: &mut ScopeManager, errors: &mut Vec<Diagnostic>) -> Type {
    match expr {
        Expr::Id { name, pos } => match scopes.get(name).cloned() {
            Some(sym) if matches!(sym.kind, Kind::Variable | Kind::Parameter) => sym.ty,
            _ => {
                errors.push(Diagnostic::new(*pos, format!("undefined variable '{name}'")));
                Type::NoType
            }
        },
        Expr::Literal(lit) => check_literal(lit, errors),
        Expr::FunctionCall { name, args, pos } => check_call(name, args, *pos, scopes, errors),
        Expr::Binary { op, lhs, rhs, pos } => {
            let lt = check_expr(lhs, scopes, errors);
            let rt = check_expr(rhs, scopes, errors);
            if lt == Type::NoType || rt == Type::NoType {
                Type::NoType
            } else if lt != rt {
                errors.push(Diagnostic::new(
                    *pos,
                    format!("type mismatch in '{op}' expression: '{lt}' vs '{rt}'"),
                ));
                Type::NoType
            } else {
                lt
            }
        }
    }
}

fn check_literal(lit: &Literal, errors: &mut Vec<Diagnostic>) -> Type {
    if lit.ty == Type::Unsigned && lit.text.starts_with('-') {
        errors.push(Diagnostic::new(lit.pos, "unsigned literal must not be negative"));
        return Type::NoType;
    }
    lit.ty
}

fn check_call(
    name: &str,
    args: &[Expr],
    pos: crate::token::SourcePos,
    scopes: &mut ScopeManager,
    errors: &mut Vec<Diagnostic>,
) -> Type {
    if name == "main" {
        errors.push(Diagnostic::new(pos, "'main' cannot be called"));
        for arg in args {
            check_expr(arg, scopes, errors);
        }
        return Type::NoType;
    }
    let Some(sym) = scopes.get(name).cloned() else {
        errors.push(Diagnostic::new(pos, format!("call to undefined function '{name}'")));
        for arg in args {
            check_expr(arg, scopes, errors);
        }
        return Type::NoType;
    };
    if sym.kind != Kind::Function {
        errors.push(Diagnostic::new(pos, format!("'{name}' is not a function")));
        for arg in args {
            check_expr(arg, scopes, errors);
        }
        return Type::NoType;
    }
    let params = sym.params.clone().unwrap_or_default();
    if args.len() != params.len() {
        errors.push(Diagnostic::new(
            pos,
            format!(
                "function '{name}' expects {} argument(s), found {}",
                params.len(),
                args.len()
            ),
        ));
    }
    for (i, arg) in args.iter().enumerate() {
        let arg_ty = check_expr(arg, scopes, errors);
        if let Some((_, expected)) = params.get(i) {
            if arg_ty != Type::NoType && arg_ty != *expected {
                errors.push(Diagnostic::new(
                    arg.pos(),
                    format!(
                        "argument {} to '{name}' has type '{arg_ty}', expected '{expected}'",
                        i + 1
                    ),
                ));
            }
        }
    }
    sym.ty
}

/// Structural "does every path through these statements return" predicate.
/// Mirrors `dce::always_returns_ir` exactly, one node kind at a time, over
/// the untyped AST rather than the lowered IR.
pub fn always_returns(body: &[Statement]) -> bool {
    for stmt in body {
        if statement_always_returns(stmt) {
            return true;
        }
    }
    false
}

fn statement_always_returns(stmt: &Statement) -> bool {
    match stmt {
        Statement::Return { .. } => true,
        Statement::Compound { body, .. } => always_returns(body),
        Statement::If {
            then_branch,
            else_branch,
            ..
        } => match else_branch {
            Some(else_branch) => {
                statement_always_returns(then_branch) && statement_always_returns(else_branch)
            }
            None => false,
        },
        Statement::DoWhile { body, .. } => statement_always_returns(body),
        Statement::Switch { cases, default, .. } => match default {
            Some(default) => {
                cases.iter().all(|c| !c.has_break && arm_always_returns(&c.body))
                    && !default.has_break
                    && arm_always_returns(&default.body)
            }
            None => false,
        },
        // `while`/`for` may execute zero iterations, so neither ever
        // guarantees a return.
        Statement::While { .. } | Statement::For { .. } => false,
        Statement::VarDecl { .. } | Statement::Assign { .. } | Statement::Printf { .. } => false,
    }
}

fn arm_always_returns(body: &[Statement]) -> bool {
    for stmt in body {
        if statement_always_returns(stmt) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;

    fn analyze_source(src: &str) -> Result<SymbolTable, ErrorMap> {
        let tokens = tokenize(src).unwrap();
        let program = parse(tokens).unwrap();
        let pool = ThreadPool::new(2);
        analyze(&program, &pool)
    }

    #[test]
    fn accepts_well_formed_program() {
        let result = analyze_source("int add(int a, int b) { return a + b; } int main() { int x = add(1, 2); return 0; }");
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_missing_main() {
        let result = analyze_source("int add(int a, int b) { return a + b; }");
        let errors = result.unwrap_err();
        assert!(errors.contains_key(GLOBAL_KEY));
    }

    #[test]
    fn rejects_undefined_variable() {
        let result = analyze_source("int main() { return y; }");
        let errors = result.unwrap_err();
        assert!(errors["main"][0].message.contains("undefined variable"));
    }

    #[test]
    fn rejects_type_mismatch_on_return() {
        let result = analyze_source("unsigned main() { return 1; }");
        let errors = result.unwrap_err();
        assert!(errors["main"][0].message.contains("declared to return"));
    }

    #[test]
    fn rejects_non_relational_condition() {
        let result = analyze_source("int main() { int x = 1; if (x) { return 0; } return 1; }");
        let errors = result.unwrap_err();
        assert!(errors["main"].iter().any(|d| d.message.contains("relational")));
    }

    #[test]
    fn missing_return_on_some_path_is_an_error() {
        let result = analyze_source("int f() { if (1 == 1) { return 1; } } int main() { return 0; }");
        let errors = result.unwrap_err();
        assert!(errors["f"].iter().any(|d| d.message.contains("does not return")));
    }

    #[test]
    fn auto_variable_adopts_initializer_type() {
        let result = analyze_source("int main() { auto x = 5u; return 0; }");
        assert!(result.is_ok());
    }

    #[test]
    fn for_loop_variable_mismatch_is_an_error() {
        let result = analyze_source(
            "int main() { int i; int j; for (i = 0; i < 10; j = j + 1) i = i + 1; return 0; }",
        );
        let errors = result.unwrap_err();
        assert!(errors["main"].iter().any(|d| d.message.contains("for-loop initializer")));
    }

    #[test]
    fn switch_with_invalid_subject_type_is_skipped_not_double_reported() {
        let result = analyze_source(
            "int main() { void x; switch (x) { case 1: return 0; default: return 0; } return 1; }",
        );
        let errors = result.unwrap_err();
        let switch_errors: Vec<_> = errors["main"]
            .iter()
            .filter(|d| d.message.contains("must be an integer"))
            .collect();
        assert_eq!(switch_errors.len(), 1);
        assert!(!errors["main"].iter().any(|d| d.message.contains("does not match switch subject")));
    }

    #[test]
    fn duplicate_function_is_a_global_error() {
        let result = analyze_source("int f() { return 0; } int f() { return 1; } int main() { return 0; }");
        let errors = result.unwrap_err();
        assert!(errors[GLOBAL_KEY].iter().any(|d| d.message.contains("redefined")));
    }
}
