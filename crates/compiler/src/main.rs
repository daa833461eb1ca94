use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{generate, Shell};
use nanoc::CompilerConfig;
use std::io;
use std::path::PathBuf;
use std::process;

#[derive(ClapParser)]
#[command(name = "nanoc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compiler for a small C-like language, targeting x86-64 GNU assembler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a source file to x86-64 GNU-assembler text
    Build {
        /// Input source file
        input: PathBuf,
        /// Output assembly path (defaults to the input's file stem with a `.s` extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Generate a shell completion script
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();
    match cli.command {
        Commands::Build { input, output } => run_build(&input, output),
        Commands::Completions { shell } => run_completions(shell),
    }
}

fn run_build(input: &std::path::Path, output: Option<PathBuf>) {
    let output = output.unwrap_or_else(|| input.with_extension("s"));
    let config = CompilerConfig::from_env();
    match nanoc::compile_file(input, &output, &config) {
        Ok(()) => println!("{} -> {}", input.display(), output.display()),
        Err((stage, message)) => {
            eprintln!("{message}");
            process::exit(stage.exit_code());
        }
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}
