//! Abstract syntax tree.
//!
//! Modeled as tagged sum types (one variant per node kind) rather than a base
//! class with virtual dispatch: traversals are exhaustive `match`es, and a
//! poisoned expression (`Type::NoType`) is an ordinary enum value rather than
//! a null pointer.

use crate::token::SourcePos;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Unsigned,
    Void,
    Auto,
    /// Poisoned: assigned after a prior error so mismatches don't cascade.
    NoType,
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Unsigned => write!(f, "unsigned"),
            Type::Void => write!(f, "void"),
            Type::Auto => write!(f, "auto"),
            Type::NoType => write!(f, "<no type>"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    NotEq,
}

impl BinOp {
    pub fn is_relational(self) -> bool {
        matches!(
            self,
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge | BinOp::Eq | BinOp::NotEq
        )
    }
}

impl std::fmt::Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
        };
        write!(f, "{s}")
    }
}

/// A literal's textual value, kept as a string so arbitrarily large integers
/// parse without loss until the IR builder folds them into a fixed width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal {
    pub text: String,
    pub ty: Type,
    pub pos: SourcePos,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Id {
        name: String,
        pos: SourcePos,
    },
    Literal(Literal),
    FunctionCall {
        name: String,
        args: Vec<Expr>,
        pos: SourcePos,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        pos: SourcePos,
    },
}

impl Expr {
    pub fn pos(&self) -> SourcePos {
        match self {
            Expr::Id { pos, .. } => *pos,
            Expr::Literal(lit) => lit.pos,
            Expr::FunctionCall { pos, .. } => *pos,
            Expr::Binary { pos, .. } => *pos,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub ty: Type,
    pub pos: SourcePos,
}

#[derive(Debug, Clone)]
pub struct CaseArm {
    pub literal: Literal,
    pub body: Vec<Statement>,
    pub has_break: bool,
}

#[derive(Debug, Clone)]
pub struct DefaultArm {
    pub body: Vec<Statement>,
    pub has_break: bool,
}

#[derive(Debug, Clone)]
pub enum Statement {
    VarDecl {
        name: String,
        ty: Type,
        init: Option<Expr>,
        pos: SourcePos,
    },
    Assign {
        name: String,
        value: Expr,
        pos: SourcePos,
    },
    Printf {
        value: Expr,
        pos: SourcePos,
    },
    Return {
        value: Option<Expr>,
        pos: SourcePos,
    },
    If {
        cond: Expr,
        then_branch: Box<Statement>,
        else_branch: Option<Box<Statement>>,
        pos: SourcePos,
    },
    While {
        cond: Expr,
        body: Box<Statement>,
        pos: SourcePos,
    },
    DoWhile {
        body: Box<Statement>,
        cond: Expr,
        pos: SourcePos,
    },
    For {
        init: Box<Statement>,
        cond: Option<Expr>,
        incr: Box<Statement>,
        body: Box<Statement>,
        pos: SourcePos,
    },
    Switch {
        subject: String,
        cases: Vec<CaseArm>,
        default: Option<DefaultArm>,
        pos: SourcePos,
    },
    Compound {
        body: Vec<Statement>,
        pos: SourcePos,
    },
}

impl Statement {
    pub fn pos(&self) -> SourcePos {
        match self {
            Statement::VarDecl { pos, .. }
            | Statement::Assign { pos, .. }
            | Statement::Printf { pos, .. }
            | Statement::Return { pos, .. }
            | Statement::If { pos, .. }
            | Statement::While { pos, .. }
            | Statement::DoWhile { pos, .. }
            | Statement::For { pos, .. }
            | Statement::Switch { pos, .. }
            | Statement::Compound { pos, .. } => *pos,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub return_type: Type,
    pub params: Vec<Parameter>,
    pub body: Vec<Statement>,
    pub pos: SourcePos,
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub functions: Vec<Function>,
}

impl Program {
    pub fn find_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}
