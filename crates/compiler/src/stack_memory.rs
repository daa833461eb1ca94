//! Stack-memory computation: counts local variables and hoisted
//! temporaries reachable anywhere in a (post-DCE) function body and
//! multiplies by the machine word size.

use crate::ir::{IrFunction, IrStatement};

const REG_SIZE: usize = 8;

pub fn required_memory(func: &IrFunction) -> usize {
    REG_SIZE * count_slots(&func.body)
}

fn count_slots(body: &[IrStatement]) -> usize {
    body.iter().map(count_statement).sum()
}

fn count_statement(stmt: &IrStatement) -> usize {
    match stmt {
        IrStatement::VarDecl { temporaries, .. } => 1 + temporaries.len(),
        IrStatement::Assign { temporaries, .. }
        | IrStatement::Printf { temporaries, .. }
        | IrStatement::Return { temporaries, .. } => temporaries.len(),
        IrStatement::If { temporaries, then_branch, else_branch, .. } => {
            temporaries.len()
                + count_statement(then_branch)
                + else_branch.as_ref().map_or(0, |b| count_statement(b))
        }
        IrStatement::While { temporaries, body, .. } => temporaries.len() + count_statement(body),
        IrStatement::DoWhile { body, temporaries, .. } => {
            count_statement(body) + temporaries.len()
        }
        IrStatement::For { init, cond_temporaries, incr, body, .. } => {
            count_statement(init) + cond_temporaries.len() + count_statement(incr) + count_statement(body)
        }
        IrStatement::Switch { cases, default, .. } => {
            let cases_total: usize = cases.iter().map(|c| count_slots(&c.body)).sum();
            cases_total + default.as_ref().map_or(0, |d| count_slots(&d.body))
        }
        IrStatement::Compound { body } => count_slots(body),
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
    fn counts_two_locals() {
        let ir = build("int main() { int x = 1; int y = 2; return 0; }");
        assert_eq!(ir.functions[0].required_memory, 16);
    }

    #[test]
    fn counts_hoisted_temporaries() {
        let ir = build("int f() { return 1; } int main() { int x = f() + f(); return x; }");
        // x (1 slot) + two call temporaries.
        assert_eq!(ir.functions[0].required_memory, 24);
    }

    #[test]
    fn counts_locals_inside_nested_blocks() {
        let ir = build("int main() { if (1 == 1) { int x = 1; } return 0; }");
        assert_eq!(ir.functions[0].required_memory, 8);
    }
}
