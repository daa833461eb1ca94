//! Dead-code elimination over the lowered IR.
//!
//! Truncates a statement sequence at the first statement whose structural
//! "always returns" predicate holds, discarding everything unreachable
//! after it. The predicate itself mirrors `analyzer::always_returns`
//! exactly, one IR node kind at a time — duplicated rather than shared
//! because it runs over a different node type (`IrStatement`, not
//! `ast::Statement`).

use crate::ir::IrStatement;

/// Applied to a function body (and recursively to every nested block) after
/// lowering. Only a `Return` is a truncation point directly; `if`/`switch`
/// constructs are truncation points only when every branch they require
/// always returns.
pub fn eliminate_dead_code(body: Vec<IrStatement>) -> Vec<IrStatement> {
    let mut out = Vec::with_capacity(body.len());
    for stmt in body {
        let stmt = recurse_into(stmt);
        let stops_here = always_returns_one(&stmt);
        out.push(stmt);
        if stops_here {
            break;
        }
    }
    out
}

/// Recurses into a statement's nested bodies so each one gets its own
/// truncation pass, independent of whether the outer statement itself
/// always returns.
fn recurse_into(stmt: IrStatement) -> IrStatement {
    match stmt {
        IrStatement::If { temporaries, cond, then_branch, else_branch } => IrStatement::If {
            temporaries,
            cond,
            then_branch: Box::new(recurse_into(*then_branch)),
            else_branch: else_branch.map(|b| Box::new(recurse_into(*b))),
        },
        IrStatement::While { temporaries, cond, body } => IrStatement::While {
            temporaries,
            cond,
            body: Box::new(recurse_into(*body)),
        },
        IrStatement::DoWhile { body, temporaries, cond } => IrStatement::DoWhile {
            body: Box::new(recurse_into(*body)),
            temporaries,
            cond,
        },
        IrStatement::For { init, cond_temporaries, cond, incr, body } => IrStatement::For {
            init,
            cond_temporaries,
            cond,
            incr,
            body: Box::new(recurse_into(*body)),
        },
        IrStatement::Switch { subject, cases, default } => {
            let cases = cases
                .into_iter()
                .map(|c| crate::ir::IrCaseArm { body: eliminate_dead_code(c.body), ..c })
                .collect();
            let default = default.map(|d| crate::ir::IrDefaultArm {
                body: eliminate_dead_code(d.body),
                ..d
            });
            IrStatement::Switch { subject, cases, default }
        }
        IrStatement::Compound { body } => IrStatement::Compound { body: eliminate_dead_code(body) },
        other => other,
    }
}

fn always_returns_one(stmt: &IrStatement) -> bool {
    match stmt {
        IrStatement::Return { .. } => true,
        IrStatement::Compound { body } => body.iter().any(always_returns_one),
        IrStatement::If { then_branch, else_branch, .. } => match else_branch {
            Some(else_branch) => {
                always_returns_one(then_branch) && always_returns_one(else_branch)
            }
            None => false,
        },
        IrStatement::DoWhile { body, .. } => always_returns_one(body),
        IrStatement::Switch { cases, default, .. } => match default {
            Some(default) => {
                cases.iter().all(|c| !c.has_break && c.body.iter().any(always_returns_one))
                    && !default.has_break
                    && default.body.iter().any(always_returns_one)
            }
            None => false,
        },
        // Loops may run zero iterations, so they never unconditionally return.
        IrStatement::While { .. } | IrStatement::For { .. } => false,
        IrStatement::VarDecl { .. } | IrStatement::Assign { .. } | IrStatement::Printf { .. } => {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;
    use crate::ir_builder::build_ir;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use crate::threadpool::ThreadPool;

    fn build(src: &str) -> crate::ir::IrProgram {
        let tokens = tokenize(src).unwrap();
        let program = parse(tokens).unwrap();
        let pool = ThreadPool::new(2);
        let table = analyze(&program, &pool).unwrap();
        build_ir(&program, &table, &pool).unwrap()
    }

    #[test]
    fn truncates_statements_after_unconditional_return() {
        let ir = build("int main() { return 1; int x = 2; return 0; }");
        let main = &ir.functions[0];
        assert_eq!(main.body.len(), 1);
    }

    #[test]
    fn keeps_statements_after_an_if_without_else() {
        let ir = build("int main() { if (1 == 1) { return 1; } return 0; }");
        let main = &ir.functions[0];
        assert_eq!(main.body.len(), 2);
    }

    #[test]
    fn truncates_after_if_else_where_both_branches_return() {
        let ir = build(
            "int main() { if (1 == 1) { return 1; } else { return 2; } int x = 3; return 0; }",
        );
        let main = &ir.functions[0];
        assert_eq!(main.body.len(), 1);
    }

    #[test]
    fn loop_bodies_never_truncate_the_enclosing_sequence() {
        let ir = build("int main() { while (1 == 1) { return 1; } return 0; }");
        let main = &ir.functions[0];
        assert_eq!(main.body.len(), 2);
    }
}
