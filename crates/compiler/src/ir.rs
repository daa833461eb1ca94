//! Intermediate representation: the typed tree the AST is lowered into.
//!
//! Unlike `ast::Expr`, every IR expression node carries its resolved type
//! directly, and binary operators are specialized by operand type at
//! lowering time (`Add{Int}` vs `Add{Unsigned}`, signed vs. unsigned shifts
//! and comparisons) so the code generator never has to re-derive it.

use crate::ast::Type;
use crate::token::SourcePos;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrBinOp {
    AddInt,
    AddUnsigned,
    SubInt,
    SubUnsigned,
    MulInt,
    MulUnsigned,
    DivInt,
    DivUnsigned,
    And,
    Or,
    Xor,
    ShlArith,
    ShlLogical,
    ShrArith,
    ShrLogical,
    LtSigned,
    LtUnsigned,
    GtSigned,
    GtUnsigned,
    LeSigned,
    LeUnsigned,
    GeSigned,
    GeUnsigned,
    EqAny,
    NotEqAny,
}

impl IrBinOp {
    pub fn is_relational(self) -> bool {
        matches!(
            self,
            IrBinOp::LtSigned
                | IrBinOp::LtUnsigned
                | IrBinOp::GtSigned
                | IrBinOp::GtUnsigned
                | IrBinOp::LeSigned
                | IrBinOp::LeUnsigned
                | IrBinOp::GeSigned
                | IrBinOp::GeUnsigned
                | IrBinOp::EqAny
                | IrBinOp::NotEqAny
        )
    }
}

#[derive(Debug, Clone)]
pub enum IrExpr {
    IntLiteral(i64),
    UnsignedLiteral(u64),
    Variable {
        name: String,
        ty: Type,
    },
    Temporary {
        name: String,
        ty: Type,
    },
    Call {
        name: String,
        args: Vec<IrExpr>,
        ty: Type,
    },
    Binary {
        op: IrBinOp,
        lhs: Box<IrExpr>,
        rhs: Box<IrExpr>,
        ty: Type,
        pos: SourcePos,
    },
}

impl IrExpr {
    pub fn ty(&self) -> Type {
        match self {
            IrExpr::IntLiteral(_) => Type::Int,
            IrExpr::UnsignedLiteral(_) => Type::Unsigned,
            IrExpr::Variable { ty, .. } | IrExpr::Temporary { ty, .. } | IrExpr::Call { ty, .. } => {
                *ty
            }
            IrExpr::Binary { ty, .. } => *ty,
        }
    }
}

/// A hoisted call subexpression: `_tN = f(...)`, evaluated before the
/// statement that uses it, in left-to-right appearance order.
#[derive(Debug, Clone)]
pub struct IrTemporary {
    pub name: String,
    pub ty: Type,
    pub call: IrExpr,
}

#[derive(Debug, Clone)]
pub struct IrCaseArm {
    pub literal: IrExpr,
    pub body: Vec<IrStatement>,
    pub has_break: bool,
}

#[derive(Debug, Clone)]
pub struct IrDefaultArm {
    pub body: Vec<IrStatement>,
    pub has_break: bool,
}

#[derive(Debug, Clone)]
pub enum IrStatement {
    VarDecl {
        name: String,
        ty: Type,
        temporaries: Vec<IrTemporary>,
        init: Option<IrExpr>,
    },
    Assign {
        name: String,
        temporaries: Vec<IrTemporary>,
        value: IrExpr,
    },
    Printf {
        temporaries: Vec<IrTemporary>,
        value: IrExpr,
    },
    Return {
        temporaries: Vec<IrTemporary>,
        value: Option<IrExpr>,
    },
    If {
        temporaries: Vec<IrTemporary>,
        cond: IrExpr,
        then_branch: Box<IrStatement>,
        else_branch: Option<Box<IrStatement>>,
    },
    While {
        temporaries: Vec<IrTemporary>,
        cond: IrExpr,
        body: Box<IrStatement>,
    },
    DoWhile {
        body: Box<IrStatement>,
        temporaries: Vec<IrTemporary>,
        cond: IrExpr,
    },
    For {
        init: Box<IrStatement>,
        cond_temporaries: Vec<IrTemporary>,
        cond: Option<IrExpr>,
        incr: Box<IrStatement>,
        body: Box<IrStatement>,
    },
    Switch {
        subject: String,
        cases: Vec<IrCaseArm>,
        default: Option<IrDefaultArm>,
    },
    Compound {
        body: Vec<IrStatement>,
    },
}

#[derive(Debug, Clone)]
pub struct IrParameter {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub struct IrFunction {
    pub name: String,
    pub return_type: Type,
    pub params: Vec<IrParameter>,
    pub body: Vec<IrStatement>,
    /// Bytes of local stack space: `8 * (declared variables + hoisted
    /// temporaries)`, filled in by the stack-memory pass.
    pub required_memory: usize,
}

#[derive(Debug, Clone, Default)]
pub struct IrProgram {
    pub functions: Vec<IrFunction>,
}
