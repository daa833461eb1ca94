//! x86-64 GNU-assembler code generator (AT&T syntax).
//!
//! One task per function, the same fan-out shape the analyzer and IR
//! builder use: every task writes into its own string buffer and the
//! buffers are concatenated in source order afterward. A single
//! process-wide atomic counter hands out label numbers so `_if`, `_while`,
//! `_for`, `_do_while` and `_switch` labels stay unique across the whole
//! compilation unit no matter which function emits them, and a single
//! atomic flag records whether any function used `printf` so the helper
//! routine is appended at most once.
//!
//! The target calling convention is deliberately not SysV: integer
//! arguments are pushed right-to-left, the callee only preserves `%rbp`,
//! the return value comes back in `%rax`, and the caller pops its own
//! arguments after `call` returns.

use crate::ir::{IrBinOp, IrExpr, IrFunction, IrProgram, IrStatement, IrTemporary};
use crate::threadpool::{Job, ThreadPool};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// General-purpose register pool. Spilled operands overflow onto the real
/// machine stack and are retrieved through `%rdi`/`%rsi` on the way back.
const GP_REGS: [&str; 8] =
    ["%r8", "%r9", "%r10", "%r11", "%r12", "%r13", "%r14", "%r15"];

static LABEL_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn next_label_id() -> usize {
    LABEL_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Lowers a whole program to one assembly listing.
pub fn generate(program: &IrProgram, pool: &ThreadPool) -> String {
    let prints = Arc::new(AtomicBool::new(false));
    let buffers: Arc<Mutex<Vec<String>>> =
        Arc::new(Mutex::new(vec![String::new(); program.functions.len()]));
    let program = Arc::new(program.clone());

    let jobs: Vec<Job> = (0..program.functions.len())
        .map(|i| {
            let program = Arc::clone(&program);
            let buffers = Arc::clone(&buffers);
            let prints = Arc::clone(&prints);
            Box::new(move || {
                let text = emit_function(&program.functions[i], &prints);
                buffers.lock().unwrap()[i] = text;
            }) as Job
        })
        .collect();
    pool.submit_batch(jobs);

    let buffers = Arc::try_unwrap(buffers)
        .map(|m| m.into_inner().unwrap())
        .unwrap_or_else(|arc| arc.lock().unwrap().clone());

    let mut out = String::new();
    out.push_str(".global _start\n.text\n_start:\n    jmp main\n\n");
    for buf in &buffers {
        out.push_str(buf);
        out.push('\n');
    }
    if prints.load(Ordering::Relaxed) {
        out.push_str(PRINTF_HELPER);
    }
    out
}

struct FuncCtx<'a> {
    out: String,
    offsets: HashMap<String, i64>,
    func_name: &'a str,
    prints: &'a AtomicBool,
}

impl FuncCtx<'_> {
    fn operand(&self, name: &str) -> String {
        format!("{}(%rbp)", self.offsets[name])
    }
}

/// Where an evaluated value currently lives: in a pool register, or pushed
/// onto the real machine stack once the pool ran out.
#[derive(Clone, Copy)]
enum Slot {
    Reg(usize),
    Stack,
}

fn slot_at(pos: usize) -> Slot {
    if pos < GP_REGS.len() { Slot::Reg(pos) } else { Slot::Stack }
}

fn emit_function(func: &IrFunction, prints: &AtomicBool) -> String {
    let mut offsets = HashMap::new();
    for (i, p) in func.params.iter().enumerate() {
        offsets.insert(p.name.clone(), 16 + 8 * i as i64);
    }
    let mut next_local: i64 = -8;
    assign_body_offsets(&func.body, &mut offsets, &mut next_local);

    let mut ctx = FuncCtx { out: String::new(), offsets, func_name: &func.name, prints };
    writeln!(ctx.out, "{}:", func.name).unwrap();
    writeln!(ctx.out, "    push %rbp").unwrap();
    writeln!(ctx.out, "    mov %rsp, %rbp").unwrap();
    if func.required_memory > 0 {
        writeln!(ctx.out, "    sub ${}, %rsp", func.required_memory).unwrap();
    }

    for stmt in &func.body {
        emit_statement(&mut ctx, stmt);
    }

    writeln!(ctx.out, "{}_end:", func.name).unwrap();
    if func.required_memory > 0 {
        writeln!(ctx.out, "    add ${}, %rsp", func.required_memory).unwrap();
    }
    writeln!(ctx.out, "    mov %rbp, %rsp").unwrap();
    writeln!(ctx.out, "    pop %rbp").unwrap();
    if func.name == "main" {
        writeln!(ctx.out, "    mov %rax, %rdi").unwrap();
        writeln!(ctx.out, "    mov $60, %rax").unwrap();
        writeln!(ctx.out, "    syscall").unwrap();
    } else {
        writeln!(ctx.out, "    ret").unwrap();
    }
    ctx.out
}

/// Walks a body in exactly the order `stack_memory::count_statement` sums
/// it, handing out stack slots -8, -16, ... as each variable or hoisted
/// temporary is first encountered.
fn assign_body_offsets(body: &[IrStatement], offsets: &mut HashMap<String, i64>, next: &mut i64) {
    for stmt in body {
        assign_stmt_offsets(stmt, offsets, next);
    }
}

fn alloc_offset(offsets: &mut HashMap<String, i64>, next: &mut i64, name: &str) {
    offsets.insert(name.to_string(), *next);
    *next -= 8;
}

fn assign_stmt_offsets(stmt: &IrStatement, offsets: &mut HashMap<String, i64>, next: &mut i64) {
    match stmt {
        IrStatement::VarDecl { name, temporaries, .. } => {
            for t in temporaries {
                alloc_offset(offsets, next, &t.name);
            }
            alloc_offset(offsets, next, name);
        }
        IrStatement::Assign { temporaries, .. }
        | IrStatement::Printf { temporaries, .. }
        | IrStatement::Return { temporaries, .. } => {
            for t in temporaries {
                alloc_offset(offsets, next, &t.name);
            }
        }
        IrStatement::If { temporaries, then_branch, else_branch, .. } => {
            for t in temporaries {
                alloc_offset(offsets, next, &t.name);
            }
            assign_stmt_offsets(then_branch, offsets, next);
            if let Some(e) = else_branch {
                assign_stmt_offsets(e, offsets, next);
            }
        }
        IrStatement::While { temporaries, body, .. } => {
            for t in temporaries {
                alloc_offset(offsets, next, &t.name);
            }
            assign_stmt_offsets(body, offsets, next);
        }
        IrStatement::DoWhile { body, temporaries, .. } => {
            assign_stmt_offsets(body, offsets, next);
            for t in temporaries {
                alloc_offset(offsets, next, &t.name);
            }
        }
        IrStatement::For { init, cond_temporaries, incr, body, .. } => {
            assign_stmt_offsets(init, offsets, next);
            for t in cond_temporaries {
                alloc_offset(offsets, next, &t.name);
            }
            assign_stmt_offsets(incr, offsets, next);
            assign_stmt_offsets(body, offsets, next);
        }
        IrStatement::Switch { cases, default, .. } => {
            for c in cases {
                assign_body_offsets(&c.body, offsets, next);
            }
            if let Some(d) = default {
                assign_body_offsets(&d.body, offsets, next);
            }
        }
        IrStatement::Compound { body } => assign_body_offsets(body, offsets, next),
    }
}

fn emit_statement(ctx: &mut FuncCtx, stmt: &IrStatement) {
    match stmt {
        IrStatement::VarDecl { name, temporaries, init, .. } => {
            emit_temporaries(ctx, temporaries);
            if let Some(expr) = init {
                let mut free = 0;
                let slot = eval_expr(ctx, expr, &mut free);
                store_result(ctx, slot, name);
            }
        }
        IrStatement::Assign { name, temporaries, value } => {
            emit_temporaries(ctx, temporaries);
            let mut free = 0;
            let slot = eval_expr(ctx, value, &mut free);
            store_result(ctx, slot, name);
        }
        IrStatement::Printf { temporaries, value } => {
            emit_temporaries(ctx, temporaries);
            let mut free = 0;
            let slot = eval_expr(ctx, value, &mut free);
            let reg = materialize(ctx, slot, "%rax");
            if reg != "%rax" {
                writeln!(ctx.out, "    mov {reg}, %rax").unwrap();
            }
            writeln!(ctx.out, "    call _printf").unwrap();
            ctx.prints.store(true, Ordering::Relaxed);
        }
        IrStatement::Return { temporaries, value } => {
            emit_temporaries(ctx, temporaries);
            if let Some(expr) = value {
                let mut free = 0;
                let slot = eval_expr(ctx, expr, &mut free);
                let reg = materialize(ctx, slot, "%rax");
                if reg != "%rax" {
                    writeln!(ctx.out, "    mov {reg}, %rax").unwrap();
                }
            }
            writeln!(ctx.out, "    jmp {}_end", ctx.func_name).unwrap();
        }
        IrStatement::If { temporaries, cond, then_branch, else_branch } => {
            emit_temporaries(ctx, temporaries);
            let id = next_label_id();
            writeln!(ctx.out, "_if{id}:").unwrap();
            let end_label = format!("_if{id}_end");
            let next_label = match else_branch {
                Some(_) => format!("_else{id}"),
                None => end_label.clone(),
            };
            let mut free = 0;
            emit_condition_jump_false(ctx, cond, &next_label, &mut free);
            emit_statement(ctx, then_branch);
            if else_branch.is_some() {
                writeln!(ctx.out, "    jmp {end_label}").unwrap();
                writeln!(ctx.out, "{next_label}:").unwrap();
                emit_statement(ctx, else_branch.as_ref().unwrap());
            }
            writeln!(ctx.out, "{end_label}:").unwrap();
        }
        IrStatement::While { temporaries, cond, body } => {
            let id = next_label_id();
            let start = format!("_while{id}");
            let end = format!("_while{id}_end");
            writeln!(ctx.out, "{start}:").unwrap();
            emit_temporaries(ctx, temporaries);
            let mut free = 0;
            emit_condition_jump_false(ctx, cond, &end, &mut free);
            emit_statement(ctx, body);
            writeln!(ctx.out, "    jmp {start}").unwrap();
            writeln!(ctx.out, "{end}:").unwrap();
        }
        IrStatement::DoWhile { body, temporaries, cond } => {
            let id = next_label_id();
            let start = format!("_do_while{id}");
            writeln!(ctx.out, "{start}:").unwrap();
            emit_statement(ctx, body);
            emit_temporaries(ctx, temporaries);
            let mut free = 0;
            emit_condition_jump_true(ctx, cond, &start, &mut free);
        }
        IrStatement::For { init, cond_temporaries, cond, incr, body } => {
            emit_statement(ctx, init);
            let id = next_label_id();
            let start = format!("_for{id}");
            let end = format!("_for{id}_end");
            writeln!(ctx.out, "{start}:").unwrap();
            emit_temporaries(ctx, cond_temporaries);
            if let Some(cond) = cond {
                let mut free = 0;
                emit_condition_jump_false(ctx, cond, &end, &mut free);
            }
            emit_statement(ctx, body);
            emit_statement(ctx, incr);
            writeln!(ctx.out, "    jmp {start}").unwrap();
            writeln!(ctx.out, "{end}:").unwrap();
        }
        IrStatement::Switch { subject, cases, default } => {
            let id = next_label_id();
            writeln!(ctx.out, "_switch{id}:").unwrap();
            let end = format!("_switch{id}_end");
            let case_labels: Vec<String> =
                (0..cases.len()).map(|i| format!("_switch{id}_case{i}")).collect();
            let default_label = format!("_switch{id}_default");

            for (i, case) in cases.iter().enumerate() {
                writeln!(ctx.out, "{}:", case_labels[i]).unwrap();
                let next = case_labels
                    .get(i + 1)
                    .cloned()
                    .unwrap_or_else(|| if default.is_some() { default_label.clone() } else { end.clone() });
                writeln!(ctx.out, "    mov {}, %rcx", ctx.operand(subject)).unwrap();
                writeln!(ctx.out, "    mov {}, %rdx", literal_immediate(&case.literal)).unwrap();
                writeln!(ctx.out, "    cmp %rdx, %rcx").unwrap();
                writeln!(ctx.out, "    jne {next}").unwrap();
                for s in &case.body {
                    emit_statement(ctx, s);
                }
                if case.has_break {
                    writeln!(ctx.out, "    jmp {end}").unwrap();
                }
            }
            if let Some(default) = default {
                writeln!(ctx.out, "{default_label}:").unwrap();
                for s in &default.body {
                    emit_statement(ctx, s);
                }
                if default.has_break {
                    writeln!(ctx.out, "    jmp {end}").unwrap();
                }
            }
            writeln!(ctx.out, "{end}:").unwrap();
        }
        IrStatement::Compound { body } => {
            for s in body {
                emit_statement(ctx, s);
            }
        }
    }
}

fn emit_temporaries(ctx: &mut FuncCtx, temporaries: &[IrTemporary]) {
    for t in temporaries {
        emit_call(ctx, &t.name, &t.call);
    }
}

/// Pushes arguments right-to-left, calls, pops the arguments back off and
/// stores the result (always returned in `%rax`) into the temporary's slot.
fn emit_call(ctx: &mut FuncCtx, dest_name: &str, call_expr: &IrExpr) {
    let IrExpr::Call { name, args, .. } = call_expr else {
        unreachable!("hoisted temporaries always carry a call expression")
    };
    for arg in args.iter().rev() {
        let mut free = 0;
        let slot = eval_expr(ctx, arg, &mut free);
        let reg = materialize(ctx, slot, "%rax");
        writeln!(ctx.out, "    push {reg}").unwrap();
    }
    writeln!(ctx.out, "    call {name}").unwrap();
    let bytes = args.len() * 8;
    if bytes > 0 {
        writeln!(ctx.out, "    add ${bytes}, %rsp").unwrap();
    }
    let dest = ctx.operand(dest_name);
    writeln!(ctx.out, "    mov %rax, {dest}").unwrap();
}

fn store_result(ctx: &mut FuncCtx, slot: Slot, name: &str) {
    let reg = materialize(ctx, slot, "%rax");
    let operand = ctx.operand(name);
    writeln!(ctx.out, "    mov {reg}, {operand}").unwrap();
}

fn literal_immediate(lit: &IrExpr) -> String {
    match lit {
        IrExpr::IntLiteral(v) => format!("${v}"),
        IrExpr::UnsignedLiteral(v) => format!("${v}"),
        other => unreachable!("case labels are always literals, got {other:?}"),
    }
}

fn eval_expr(ctx: &mut FuncCtx, expr: &IrExpr, free: &mut usize) -> Slot {
    match expr {
        IrExpr::IntLiteral(_) | IrExpr::UnsignedLiteral(_) | IrExpr::Variable { .. } | IrExpr::Temporary { .. } => {
            eval_leaf(ctx, expr, free)
        }
        IrExpr::Call { .. } => {
            unreachable!("calls are hoisted into temporaries before code generation")
        }
        IrExpr::Binary { op, lhs, rhs, .. } => {
            if op.is_relational() {
                eval_relational_value(ctx, *op, lhs, rhs, free)
            } else {
                eval_arith(ctx, *op, lhs, rhs, free)
            }
        }
    }
}

fn eval_leaf(ctx: &mut FuncCtx, expr: &IrExpr, free: &mut usize) -> Slot {
    let pos = *free;
    *free += 1;
    let slot = slot_at(pos);
    let src = match expr {
        IrExpr::IntLiteral(v) => format!("${v}"),
        IrExpr::UnsignedLiteral(v) => format!("${v}"),
        IrExpr::Variable { name, .. } | IrExpr::Temporary { name, .. } => ctx.operand(name),
        _ => unreachable!("eval_leaf called on a non-leaf expression"),
    };
    match slot {
        Slot::Reg(i) => {
            writeln!(ctx.out, "    mov {src}, {}", GP_REGS[i]).unwrap();
        }
        Slot::Stack => {
            writeln!(ctx.out, "    mov {src}, %rax").unwrap();
            writeln!(ctx.out, "    push %rax").unwrap();
        }
    }
    slot
}

/// Retrieves an operand's value as a register name, popping the real stack
/// into `scratch` when the pool had already overflowed for that operand.
fn materialize(ctx: &mut FuncCtx, slot: Slot, scratch: &str) -> String {
    match slot {
        Slot::Reg(i) => GP_REGS[i].to_string(),
        Slot::Stack => {
            writeln!(ctx.out, "    pop {scratch}").unwrap();
            scratch.to_string()
        }
    }
}

/// Evaluates both operands, pops them back off the pool (right operand
/// first, since it was pushed last) and pushes the combined result in the
/// slot the left operand used to occupy.
fn eval_arith(ctx: &mut FuncCtx, op: IrBinOp, lhs: &IrExpr, rhs: &IrExpr, free: &mut usize) -> Slot {
    let lslot = eval_expr(ctx, lhs, free);
    let rslot = eval_expr(ctx, rhs, free);
    let rreg = materialize(ctx, rslot, "%rsi");
    let lreg = materialize(ctx, lslot, "%rdi");
    *free -= 2;
    let result_pos = *free;
    emit_arith_op(ctx, op, &lreg, &rreg);
    *free += 1;
    if result_pos < GP_REGS.len() {
        Slot::Reg(result_pos)
    } else {
        writeln!(ctx.out, "    push {lreg}").unwrap();
        Slot::Stack
    }
}

fn emit_arith_op(ctx: &mut FuncCtx, op: IrBinOp, lreg: &str, rreg: &str) {
    match op {
        IrBinOp::AddInt | IrBinOp::AddUnsigned => {
            writeln!(ctx.out, "    add {rreg}, {lreg}").unwrap();
        }
        IrBinOp::SubInt | IrBinOp::SubUnsigned => {
            writeln!(ctx.out, "    sub {rreg}, {lreg}").unwrap();
        }
        IrBinOp::And => {
            writeln!(ctx.out, "    and {rreg}, {lreg}").unwrap();
        }
        IrBinOp::Or => {
            writeln!(ctx.out, "    or {rreg}, {lreg}").unwrap();
        }
        IrBinOp::Xor => {
            writeln!(ctx.out, "    xor {rreg}, {lreg}").unwrap();
        }
        IrBinOp::MulInt => {
            writeln!(ctx.out, "    mov {lreg}, %rax").unwrap();
            writeln!(ctx.out, "    imul {rreg}").unwrap();
            writeln!(ctx.out, "    mov %rax, {lreg}").unwrap();
        }
        IrBinOp::MulUnsigned => {
            writeln!(ctx.out, "    mov {lreg}, %rax").unwrap();
            writeln!(ctx.out, "    mul {rreg}").unwrap();
            writeln!(ctx.out, "    mov %rax, {lreg}").unwrap();
        }
        IrBinOp::DivInt => {
            writeln!(ctx.out, "    mov {lreg}, %rax").unwrap();
            writeln!(ctx.out, "    cqto").unwrap();
            writeln!(ctx.out, "    idiv {rreg}").unwrap();
            writeln!(ctx.out, "    mov %rax, {lreg}").unwrap();
        }
        IrBinOp::DivUnsigned => {
            writeln!(ctx.out, "    mov {lreg}, %rax").unwrap();
            writeln!(ctx.out, "    xor %rdx, %rdx").unwrap();
            writeln!(ctx.out, "    div {rreg}").unwrap();
            writeln!(ctx.out, "    mov %rax, {lreg}").unwrap();
        }
        IrBinOp::ShlArith => {
            writeln!(ctx.out, "    mov {rreg}, %rcx").unwrap();
            writeln!(ctx.out, "    sal %cl, {lreg}").unwrap();
        }
        IrBinOp::ShlLogical => {
            writeln!(ctx.out, "    mov {rreg}, %rcx").unwrap();
            writeln!(ctx.out, "    shl %cl, {lreg}").unwrap();
        }
        IrBinOp::ShrArith => {
            writeln!(ctx.out, "    mov {rreg}, %rcx").unwrap();
            writeln!(ctx.out, "    sar %cl, {lreg}").unwrap();
        }
        IrBinOp::ShrLogical => {
            writeln!(ctx.out, "    mov {rreg}, %rcx").unwrap();
            writeln!(ctx.out, "    shr %cl, {lreg}").unwrap();
        }
        other => unreachable!("relational operator {other:?} handled separately"),
    }
}

/// Materializes a relational comparison as a runtime 0/1 value, for the
/// (uncommon) case where it appears nested inside a larger expression
/// rather than alone at the head of a condition.
fn eval_relational_value(
    ctx: &mut FuncCtx,
    op: IrBinOp,
    lhs: &IrExpr,
    rhs: &IrExpr,
    free: &mut usize,
) -> Slot {
    let lslot = eval_expr(ctx, lhs, free);
    let rslot = eval_expr(ctx, rhs, free);
    let rreg = materialize(ctx, rslot, "%rsi");
    let lreg = materialize(ctx, lslot, "%rdi");
    *free -= 2;
    let result_pos = *free;
    writeln!(ctx.out, "    cmp {rreg}, {lreg}").unwrap();
    writeln!(ctx.out, "    set{} %al", relational_true_suffix(op)).unwrap();
    writeln!(ctx.out, "    movzbq %al, {lreg}").unwrap();
    *free += 1;
    if result_pos < GP_REGS.len() {
        Slot::Reg(result_pos)
    } else {
        writeln!(ctx.out, "    push {lreg}").unwrap();
        Slot::Stack
    }
}

/// Emits `cmp` plus a jump to `false_label` taken when the condition does
/// not hold. A non-relational condition (not produced by the analyzer
/// today, but not ruled out by the grammar either) falls back to a
/// zero-versus-nonzero test.
fn emit_condition_jump_false(ctx: &mut FuncCtx, cond: &IrExpr, false_label: &str, free: &mut usize) {
    match cond {
        IrExpr::Binary { op, lhs, rhs, .. } if op.is_relational() => {
            let lslot = eval_expr(ctx, lhs, free);
            let rslot = eval_expr(ctx, rhs, free);
            let rreg = materialize(ctx, rslot, "%rsi");
            let lreg = materialize(ctx, lslot, "%rdi");
            *free -= 2;
            writeln!(ctx.out, "    cmp {rreg}, {lreg}").unwrap();
            writeln!(ctx.out, "    j{} {false_label}", relational_false_suffix(*op)).unwrap();
        }
        other => {
            let slot = eval_expr(ctx, other, free);
            let reg = materialize(ctx, slot, "%rdi");
            *free -= 1;
            writeln!(ctx.out, "    cmp $0, {reg}").unwrap();
            writeln!(ctx.out, "    je {false_label}").unwrap();
        }
    }
}

/// Emits `cmp` plus a jump to `true_label` taken when the condition holds,
/// used by `do`/`while` to branch back to the top of the loop.
fn emit_condition_jump_true(ctx: &mut FuncCtx, cond: &IrExpr, true_label: &str, free: &mut usize) {
    match cond {
        IrExpr::Binary { op, lhs, rhs, .. } if op.is_relational() => {
            let lslot = eval_expr(ctx, lhs, free);
            let rslot = eval_expr(ctx, rhs, free);
            let rreg = materialize(ctx, rslot, "%rsi");
            let lreg = materialize(ctx, lslot, "%rdi");
            *free -= 2;
            writeln!(ctx.out, "    cmp {rreg}, {lreg}").unwrap();
            writeln!(ctx.out, "    j{} {true_label}", relational_true_suffix(*op)).unwrap();
        }
        other => {
            let slot = eval_expr(ctx, other, free);
            let reg = materialize(ctx, slot, "%rdi");
            *free -= 1;
            writeln!(ctx.out, "    cmp $0, {reg}").unwrap();
            writeln!(ctx.out, "    jne {true_label}").unwrap();
        }
    }
}

fn relational_true_suffix(op: IrBinOp) -> &'static str {
    match op {
        IrBinOp::LtSigned => "l",
        IrBinOp::LtUnsigned => "b",
        IrBinOp::GtSigned => "g",
        IrBinOp::GtUnsigned => "a",
        IrBinOp::LeSigned => "le",
        IrBinOp::LeUnsigned => "be",
        IrBinOp::GeSigned => "ge",
        IrBinOp::GeUnsigned => "ae",
        IrBinOp::EqAny => "e",
        IrBinOp::NotEqAny => "ne",
        other => unreachable!("{other:?} is not relational"),
    }
}

fn relational_false_suffix(op: IrBinOp) -> &'static str {
    match relational_true_suffix(op) {
        "l" => "ge",
        "ge" => "l",
        "b" => "ae",
        "ae" => "b",
        "g" => "le",
        "le" => "g",
        "a" => "be",
        "be" => "a",
        "e" => "ne",
        "ne" => "e",
        other => unreachable!("unknown condition suffix {other}"),
    }
}

/// Hand-written `_printf`: converts the integer in `%rax` to decimal and
/// writes it, followed by a newline, to file descriptor 1. Negative values
/// get a leading `-`; the routine has no other dependency on libc.
const PRINTF_HELPER: &str = "\
_printf:
    push %rbp
    mov %rsp, %rbp
    sub $64, %rsp
    mov %rax, %r9
    mov $0, %r10
    cmp $0, %r9
    jge _printf_positive
    mov $1, %r10
    neg %r9
_printf_positive:
    movb $10, 63(%rsp)
    mov $62, %r11
    mov $10, %rcx
_printf_digit_loop:
    xor %rdx, %rdx
    mov %r9, %rax
    div %rcx
    add $48, %rdx
    mov %r11, %rsi
    movb %dl, (%rsp,%rsi,1)
    dec %r11
    mov %rax, %r9
    cmp $0, %r9
    jne _printf_digit_loop
    cmp $0, %r10
    je _printf_no_sign
    mov %r11, %rsi
    movb $45, (%rsp,%rsi,1)
    dec %r11
_printf_no_sign:
    inc %r11
    mov %r11, %rsi
    mov $64, %rdx
    sub %r11, %rdx
    mov %rsp, %rax
    add %rsi, %rax
    mov %rax, %rsi
    mov $1, %rax
    mov $1, %rdi
    syscall
    add $64, %rsp
    pop %rbp
    ret
";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;
    use crate::ir_builder::build_ir;
    use crate::lexer::tokenize;
    use crate::parser::parse;

    fn emit(src: &str) -> String {
        let tokens = tokenize(src).unwrap();
        let program = parse(tokens).unwrap();
        let pool = ThreadPool::new(2);
        let table = analyze(&program, &pool).unwrap();
        let ir = build_ir(&program, &table, &pool).unwrap();
        generate(&ir, &pool)
    }

    #[test]
    fn emits_program_preamble_and_entry_jump() {
        let asm = emit("int main() { return 0; }");
        assert!(asm.starts_with(".global _start\n.text\n_start:\n    jmp main\n"));
    }

    #[test]
    fn main_exits_via_syscall_not_ret() {
        let asm = emit("int main() { return 7; }");
        let main_block = asm.split("main:").nth(1).unwrap();
        let body = main_block.split("\n\n").next().unwrap();
        assert!(body.contains("syscall"));
        assert!(!body.contains("    ret"));
    }

    #[test]
    fn non_main_function_returns_with_ret() {
        let asm = emit("int f() { return 1; } int main() { return f(); }");
        let f_block = asm.split("f:").nth(1).unwrap();
        let body = f_block.split("\n\n").next().unwrap();
        assert!(body.contains("    ret"));
        assert!(!body.contains("syscall"));
    }

    #[test]
    fn printf_helper_appended_only_when_used() {
        let with_printf = emit("int main() { printf(1); return 0; }");
        assert!(with_printf.contains("_printf:"));
        assert!(with_printf.contains("call _printf"));

        let without_printf = emit("int main() { return 0; }");
        assert!(!without_printf.contains("_printf:"));
    }

    #[test]
    fn call_pushes_arguments_right_to_left() {
        let asm = emit("int add(int a, int b) { return a + b; } int main() { return add(1, 2); }");
        let main_block = asm.split("main:").nth(1).unwrap();
        let load_2 = main_block.find("mov $2,").unwrap();
        let load_1 = main_block.find("mov $1,").unwrap();
        assert!(load_2 < load_1, "rightmost argument must be evaluated and pushed first");
    }

    #[test]
    fn if_without_else_jumps_straight_to_end_label() {
        let asm = emit("int main() { if (1 == 1) { return 1; } return 0; }");
        assert!(asm.contains("_if0_end:"));
        assert!(!asm.contains("_else0"));
    }

    #[test]
    fn while_loop_jumps_back_to_its_own_start() {
        let asm = emit("int main() { int i = 0; while (i < 3) { i = i + 1; } return i; }");
        assert!(asm.contains("_while0:"));
        assert!(asm.contains("_while0_end:"));
        assert!(asm.contains("jmp _while0"));
    }

    #[test]
    fn labels_stay_unique_across_functions() {
        let asm = emit(
            "int f() { if (1 == 1) { return 1; } return 0; } \
             int main() { if (1 == 1) { return 1; } return f(); }",
        );
        assert!(asm.contains("_if0_end:"));
        assert!(asm.contains("_if1_end:"));
    }

    #[test]
    fn switch_case_without_break_falls_through() {
        let asm = emit(
            "int main() { int x = 0; int s = 1; switch (s) { case 1: x = 1; case 2: x = 2; break; } return x; }",
        );
        // The first case has no `break`, so no `jmp _switch..._end` sits
        // between its body and the following case label.
        let case0 = asm.find("_switch0_case0:").unwrap();
        let case1 = asm.find("_switch0_case1:").unwrap();
        let between = &asm[case0..case1];
        assert!(!between.contains("jmp _switch0_end"));
    }
}
