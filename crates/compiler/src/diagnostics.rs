//! Diagnostic formatting and stage exit codes.

use crate::token::SourcePos;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Lexical,
    Syntax,
    Semantic,
    Ir,
    Codegen,
}

impl Stage {
    /// Process exit code, following `{no-error, lexical-error, syntax-error,
    /// semantic-error, ir-error, codegen-error}`.
    pub fn exit_code(self) -> i32 {
        match self {
            Stage::Lexical => 1,
            Stage::Syntax => 2,
            Stage::Semantic => 3,
            Stage::Ir => 4,
            Stage::Codegen => 5,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Stage::Lexical => "Lexer",
            Stage::Syntax => "Parser",
            Stage::Semantic => "Analyzer",
            Stage::Ir => "IR builder",
            Stage::Codegen => "Code generator",
        }
    }

    fn category(self) -> Option<&'static str> {
        match self {
            Stage::Lexical => Some("LEXICAL"),
            Stage::Syntax => Some("SYNTAX"),
            Stage::Semantic => Some("SEMANTIC"),
            Stage::Ir | Stage::Codegen => None,
        }
    }

    /// `"\n<Stage>: failed!\n"` banner printed before a stage's diagnostics.
    pub fn banner(self) -> String {
        format!("\n{}: failed!\n", self.label())
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub pos: Option<SourcePos>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(pos: SourcePos, message: impl Into<String>) -> Self {
        Diagnostic {
            pos: Some(pos),
            message: message.into(),
        }
    }

    pub fn global(message: impl Into<String>) -> Self {
        Diagnostic {
            pos: None,
            message: message.into(),
        }
    }

    pub fn render(&self, stage: Stage) -> String {
        match (self.pos, stage.category()) {
            (Some(pos), Some(category)) => {
                format!("{pos}: {category} ERROR -> {}", self.message)
            }
            _ => self.message.clone(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pos {
            Some(pos) => write!(f, "{pos}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Joins rendered diagnostics with the stage banner, matching the CLI's
/// `"\n<Stage>: failed!\n"` plus newline-joined diagnostics contract.
pub fn render_failure(stage: Stage, diagnostics: &[Diagnostic]) -> String {
    let body = diagnostics
        .iter()
        .map(|d| d.render(stage))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{}{}", stage.banner(), body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_with_location() {
        let d = Diagnostic::new(SourcePos::new(3, 7), "undefined variable 'a'");
        assert_eq!(
            d.render(Stage::Semantic),
            "Line 3, Column 7: SEMANTIC ERROR -> undefined variable 'a'"
        );
    }

    #[test]
    fn global_diagnostic_has_no_prefix() {
        let d = Diagnostic::global("'main' function not found");
        assert_eq!(d.render(Stage::Semantic), "'main' function not found");
    }

    #[test]
    fn exit_codes_match_stage_order() {
        assert_eq!(Stage::Lexical.exit_code(), 1);
        assert_eq!(Stage::Codegen.exit_code(), 5);
    }
}
