//! Compiler for a small C-like language, targeting x86-64 GNU-assembler
//! output.
//!
//! The pipeline is the usual five stages — lexer, parser, semantic
//! analyzer, IR builder, code generator — run in that order, each able to
//! fail independently with its own [`diagnostics::Stage`]. The analyzer
//! and IR builder fan out across functions onto a shared [`ThreadPool`];
//! the code generator reuses the same pool for the same reason.

pub mod analyzer;
pub mod ast;
pub mod codegen;
pub mod config;
pub mod dce;
pub mod diagnostics;
pub mod ir;
pub mod ir_builder;
pub mod lexer;
pub mod parser;
pub mod stack_memory;
pub mod symtab;
pub mod threadpool;
pub mod token;

pub use config::CompilerConfig;
pub use diagnostics::{Diagnostic, Stage};
pub use threadpool::ThreadPool;

use std::fs;
use std::path::Path;

/// Runs the full pipeline over already-loaded source text, returning the
/// generated assembly or the failing stage paired with its rendered
/// diagnostics (banner plus newline-joined messages, ready to print).
pub fn compile(source: &str, config: &CompilerConfig) -> Result<String, (Stage, String)> {
    let pool = ThreadPool::new(config.worker_threads());

    let tokens = lexer::tokenize(source)
        .map_err(|e| (Stage::Lexical, diagnostics::render_failure(Stage::Lexical, &[e.0])))?;

    let program = parser::parse(tokens)
        .map_err(|e| (Stage::Syntax, diagnostics::render_failure(Stage::Syntax, &[e.0])))?;

    let table = analyzer::analyze(&program, &pool)
        .map_err(|errors| (Stage::Semantic, render_error_map(Stage::Semantic, &program, errors)))?;

    let ir = ir_builder::build_ir(&program, &table, &pool)
        .map_err(|errors| (Stage::Ir, render_error_map(Stage::Ir, &program, errors)))?;

    Ok(codegen::generate(&ir, &pool))
}

/// Flattens a per-function error map into source order: the global-scope
/// errors first (missing `main`, and the like), then each function's
/// errors in declaration order, so two runs over the same source produce
/// byte-identical diagnostics regardless of which worker finished first.
fn render_error_map(stage: Stage, program: &ast::Program, mut errors: analyzer::ErrorMap) -> String {
    let mut ordered = Vec::new();
    if let Some(global) = errors.remove(analyzer::GLOBAL_KEY) {
        ordered.extend(global);
    }
    for func in &program.functions {
        if let Some(mut errs) = errors.remove(&func.name) {
            ordered.append(&mut errs);
        }
    }
    diagnostics::render_failure(stage, &ordered)
}

/// Compiles a source file on disk, writing the generated assembly to
/// `output_path`. I/O failures (an unreadable input, an unwritable output)
/// are reported under [`Stage::Codegen`], since they only ever occur
/// around the code generator's own file write or the input read that
/// precedes the whole pipeline.
pub fn compile_file(
    input_path: &Path,
    output_path: &Path,
    config: &CompilerConfig,
) -> Result<(), (Stage, String)> {
    let source = fs::read_to_string(input_path).map_err(|e| {
        (Stage::Codegen, format!("failed to read '{}': {e}", input_path.display()))
    })?;
    let assembly = compile(&source, config)?;
    fs::write(output_path, assembly)
        .map_err(|e| (Stage::Codegen, format!("failed to write '{}': {e}", output_path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_a_trivial_program() {
        let config = CompilerConfig::new().with_worker_threads(2);
        let asm = compile("int main() { return 0; }", &config).unwrap();
        assert!(asm.contains("main:"));
        assert!(asm.contains("syscall"));
    }

    #[test]
    fn lexical_error_reports_lexical_stage() {
        let config = CompilerConfig::new().with_worker_threads(2);
        let err = compile("int main() { return 1 ! 2; }", &config).unwrap_err();
        assert_eq!(err.0, Stage::Lexical);
        assert!(err.1.contains("Lexer: failed!"));
    }

    #[test]
    fn syntax_error_reports_syntax_stage() {
        let config = CompilerConfig::new().with_worker_threads(2);
        let err = compile("int main() { return 1", &config).unwrap_err();
        assert_eq!(err.0, Stage::Syntax);
        assert!(err.1.contains("Parser: failed!"));
    }

    #[test]
    fn semantic_error_reports_semantic_stage() {
        let config = CompilerConfig::new().with_worker_threads(2);
        let err = compile("int main() { return undefined_var; }", &config).unwrap_err();
        assert_eq!(err.0, Stage::Semantic);
        assert!(err.1.contains("Analyzer: failed!"));
        assert!(err.1.contains("undefined"));
    }

    #[test]
    fn redefinition_error_contains_redefined() {
        let config = CompilerConfig::new().with_worker_threads(2);
        let err = compile("int main() { int a; int a; return 0; }", &config).unwrap_err();
        assert_eq!(err.0, Stage::Semantic);
        assert!(err.1.contains("redefined"));
    }

    #[test]
    fn missing_main_is_reported_as_a_global_error() {
        let config = CompilerConfig::new().with_worker_threads(2);
        let err = compile("int notmain() { return 0; }", &config).unwrap_err();
        assert_eq!(err.0, Stage::Semantic);
        assert!(err.1.contains("main"));
    }

    #[test]
    fn ir_error_reports_ir_stage() {
        let config = CompilerConfig::new().with_worker_threads(2);
        let err = compile("int main() { return 3 / 0; }", &config).unwrap_err();
        assert_eq!(err.0, Stage::Ir);
        assert!(err.1.contains("division by ZERO"));
    }

    #[test]
    fn compile_file_writes_assembly_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("prog.nc");
        let output = dir.path().join("prog.s");
        fs::write(&input, "int main() { return 42; }").unwrap();

        let config = CompilerConfig::new().with_worker_threads(2);
        compile_file(&input, &output, &config).unwrap();

        let written = fs::read_to_string(&output).unwrap();
        assert!(written.contains("main:"));
    }

    // The remaining tests exercise the six positive end-to-end scenarios by
    // asserting on the emitted assembly's structure, since this crate has no
    // assembler/linker to actually run the result through.

    #[test]
    fn arithmetic_precedence_program_compiles_to_a_single_main() {
        let config = CompilerConfig::new().with_worker_threads(2);
        let asm = compile("int main(){ return 1 + 2 * 3 - 4 / 2; }", &config).unwrap();
        assert!(asm.contains("main:"));
        assert!(asm.matches("main:").count() == 1);
    }

    #[test]
    fn calling_a_helper_function_emits_a_call_and_its_own_prologue() {
        let config = CompilerConfig::new().with_worker_threads(2);
        let asm = compile("int sq(int x){ return x * x; } int main(){ return sq(5); }", &config)
            .unwrap();
        assert!(asm.contains("sq:"));
        assert!(asm.contains("call sq"));
    }

    #[test]
    fn recursive_function_calls_itself_twice_per_branch() {
        let config = CompilerConfig::new().with_worker_threads(2);
        let source = "int fib(int n){ if(n==0) return 0; else if(n==1) return 1; \
                      else return fib(n-1)+fib(n-2); } int main(){ return fib(6); }";
        let asm = compile(source, &config).unwrap();
        assert_eq!(asm.matches("call fib").count(), 2);
    }

    #[test]
    fn switch_with_default_emits_case_and_default_labels() {
        let config = CompilerConfig::new().with_worker_threads(2);
        let source = "int main(){ int x = 5; switch(x){ case 1: return 3; case 3: return 2; \
                      case 5: return 1; default: return 0; } }";
        let asm = compile(source, &config).unwrap();
        assert!(asm.contains("_case0:"));
        assert!(asm.contains("_default:"));
    }

    #[test]
    fn do_while_loop_jumps_back_to_its_body_label() {
        let config = CompilerConfig::new().with_worker_threads(2);
        let source = "int main(){ int x = 5; do { x = x + 3; } while(x < 10); return x; }";
        let asm = compile(source, &config).unwrap();
        assert!(asm.contains("_do_while"));
    }

    #[test]
    fn for_loop_emits_its_own_start_and_end_labels() {
        let config = CompilerConfig::new().with_worker_threads(2);
        let source = "int main(){ int x = 5; int i; for(i = 0; i < 10; i = i + 1) x = x + 1; \
                      return x; }";
        let asm = compile(source, &config).unwrap();
        assert!(asm.contains("_for"));
        assert!(asm.contains("_for") && asm.contains("_end"));
    }

    #[test]
    fn compile_file_reports_codegen_stage_for_missing_input() {
        let config = CompilerConfig::new().with_worker_threads(2);
        let err = compile_file(Path::new("/no/such/input.nc"), Path::new("/tmp/out.s"), &config)
            .unwrap_err();
        assert_eq!(err.0, Stage::Codegen);
    }
}
