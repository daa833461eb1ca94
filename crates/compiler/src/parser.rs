//! Recursive-descent parser: token stream -> AST.
//!
//! Unexpected tokens, missing terminators, and malformed constructs are
//! syntax errors and are thrown immediately (single-threaded stage, nothing
//! to accumulate into). Operator precedence (lowest to highest):
//! `|` < `^` < `&` < (`==`,`!=`) < (`<`,`>`,`<=`,`>=`) < (`<<`,`>>`) < (`+`,`-`) < (`*`,`/`).

use crate::ast::{BinOp, CaseArm, DefaultArm, Expr, Function, Literal, Parameter, Program, Statement, Type};
use crate::diagnostics::Diagnostic;
use crate::token::{SourcePos, Token, TokenKind};

pub struct SyntaxError(pub Diagnostic);

type PResult<T> = Result<T, SyntaxError>;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    pub fn parse_program(mut self) -> PResult<Program> {
        let mut functions = Vec::new();
        while !self.at_eof() {
            functions.push(self.parse_function()?);
        }
        Ok(Program { functions })
    }

    // --- token stream helpers -------------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_pos(&self) -> SourcePos {
        self.peek().pos
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    fn eat(&mut self, kind: TokenKind) -> PResult<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(SyntaxError(Diagnostic::new(
                self.peek_pos(),
                format!("expected {kind}, found {}", self.peek().kind),
            )))
        }
    }

    fn ident(&mut self) -> PResult<(String, SourcePos)> {
        let pos = self.peek_pos();
        match self.advance().kind {
            TokenKind::Ident(name) => Ok((name, pos)),
            other => Err(SyntaxError(Diagnostic::new(
                pos,
                format!("expected identifier, found {other}"),
            ))),
        }
    }

    fn type_token(&mut self) -> PResult<Type> {
        let pos = self.peek_pos();
        let ty = match self.peek().kind {
            TokenKind::Int => Type::Int,
            TokenKind::Unsigned => Type::Unsigned,
            TokenKind::Void => Type::Void,
            TokenKind::Auto => Type::Auto,
            _ => {
                return Err(SyntaxError(Diagnostic::new(
                    pos,
                    format!("expected a type, found {}", self.peek().kind),
                )));
            }
        };
        self.advance();
        Ok(ty)
    }

    fn is_type_start(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Int | TokenKind::Unsigned | TokenKind::Void | TokenKind::Auto
        )
    }

    // --- top level -------------------------------------------------------------

    fn parse_function(&mut self) -> PResult<Function> {
        let pos = self.peek_pos();
        let return_type = self.type_token()?;
        let (name, _) = self.ident()?;
        self.eat(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let p_pos = self.peek_pos();
                let ty = self.type_token()?;
                let (pname, _) = self.ident()?;
                params.push(Parameter {
                    name: pname,
                    ty,
                    pos: p_pos,
                });
                if self.check(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.eat(TokenKind::RParen)?;
        self.eat(TokenKind::LBrace)?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            body.push(self.parse_statement()?);
        }
        self.eat(TokenKind::RBrace)?;
        Ok(Function {
            name,
            return_type,
            params,
            body,
            pos,
        })
    }

    // --- statements --------------------------------------------------------

    fn parse_statement(&mut self) -> PResult<Statement> {
        match &self.peek().kind {
            TokenKind::LBrace => self.parse_compound(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Do => self.parse_do_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Printf => self.parse_printf(),
            TokenKind::Return => self.parse_return(),
            _ if self.is_type_start() => self.parse_var_decl(),
            TokenKind::Ident(_) => {
                let stmt = self.parse_assignment(true)?;
                self.eat(TokenKind::Semicolon)?;
                Ok(stmt)
            }
            _ => Err(SyntaxError(Diagnostic::new(
                self.peek_pos(),
                format!("unexpected token {}", self.peek().kind),
            ))),
        }
    }

    fn parse_compound(&mut self) -> PResult<Statement> {
        let pos = self.peek_pos();
        self.eat(TokenKind::LBrace)?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            body.push(self.parse_statement()?);
        }
        self.eat(TokenKind::RBrace)?;
        Ok(Statement::Compound { body, pos })
    }

    fn parse_var_decl(&mut self) -> PResult<Statement> {
        let pos = self.peek_pos();
        let ty = self.type_token()?;
        let (name, _) = self.ident()?;
        let init = if self.check(&TokenKind::Assign) {
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.eat(TokenKind::Semicolon)?;
        Ok(Statement::VarDecl {
            name,
            ty,
            init,
            pos,
        })
    }

    /// Parses `ID '=' numexp`, optionally consuming the trailing `;` when
    /// used as a standalone statement (false for `for`-loop init/incr).
    fn parse_assignment(&mut self, _in_statement_position: bool) -> PResult<Statement> {
        let pos = self.peek_pos();
        let (name, _) = self.ident()?;
        self.eat(TokenKind::Assign)?;
        let value = self.parse_expr()?;
        Ok(Statement::Assign { name, value, pos })
    }

    fn parse_printf(&mut self) -> PResult<Statement> {
        let pos = self.peek_pos();
        self.eat(TokenKind::Printf)?;
        self.eat(TokenKind::LParen)?;
        let value = self.parse_expr()?;
        self.eat(TokenKind::RParen)?;
        self.eat(TokenKind::Semicolon)?;
        Ok(Statement::Printf { value, pos })
    }

    fn parse_return(&mut self) -> PResult<Statement> {
        let pos = self.peek_pos();
        self.eat(TokenKind::Return)?;
        let value = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.eat(TokenKind::Semicolon)?;
        Ok(Statement::Return { value, pos })
    }

    fn parse_if(&mut self) -> PResult<Statement> {
        let pos = self.peek_pos();
        self.eat(TokenKind::If)?;
        self.eat(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.eat(TokenKind::RParen)?;
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.check(&TokenKind::Else) {
            self.advance();
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Statement::If {
            cond,
            then_branch,
            else_branch,
            pos,
        })
    }

    fn parse_while(&mut self) -> PResult<Statement> {
        let pos = self.peek_pos();
        self.eat(TokenKind::While)?;
        self.eat(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.eat(TokenKind::RParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Statement::While { cond, body, pos })
    }

    fn parse_do_while(&mut self) -> PResult<Statement> {
        let pos = self.peek_pos();
        self.eat(TokenKind::Do)?;
        let body = Box::new(self.parse_statement()?);
        self.eat(TokenKind::While)?;
        self.eat(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.eat(TokenKind::RParen)?;
        self.eat(TokenKind::Semicolon)?;
        Ok(Statement::DoWhile { body, cond, pos })
    }

    fn parse_for(&mut self) -> PResult<Statement> {
        let pos = self.peek_pos();
        self.eat(TokenKind::For)?;
        self.eat(TokenKind::LParen)?;
        let init = Box::new(self.parse_assignment(false)?);
        self.eat(TokenKind::Semicolon)?;
        let cond = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.eat(TokenKind::Semicolon)?;
        let incr = Box::new(self.parse_assignment(false)?);
        self.eat(TokenKind::RParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Statement::For {
            init,
            cond,
            incr,
            body,
            pos,
        })
    }

    fn parse_switch(&mut self) -> PResult<Statement> {
        let pos = self.peek_pos();
        self.eat(TokenKind::Switch)?;
        self.eat(TokenKind::LParen)?;
        let (subject, _) = self.ident()?;
        self.eat(TokenKind::RParen)?;
        self.eat(TokenKind::LBrace)?;
        let mut cases = Vec::new();
        let mut default = None;
        while self.check(&TokenKind::Case) || self.check(&TokenKind::Default) {
            if self.check(&TokenKind::Case) {
                self.advance();
                let literal = self.parse_literal_only()?;
                self.eat(TokenKind::Colon)?;
                let (body, has_break) = self.parse_case_body()?;
                cases.push(CaseArm {
                    literal,
                    body,
                    has_break,
                });
            } else {
                self.advance();
                self.eat(TokenKind::Colon)?;
                let (body, has_break) = self.parse_case_body()?;
                default = Some(DefaultArm { body, has_break });
            }
        }
        self.eat(TokenKind::RBrace)?;
        Ok(Statement::Switch {
            subject,
            cases,
            default,
            pos,
        })
    }

    fn parse_case_body(&mut self) -> PResult<(Vec<Statement>, bool)> {
        let mut body = Vec::new();
        let mut has_break = false;
        while !self.check(&TokenKind::Case)
            && !self.check(&TokenKind::Default)
            && !self.check(&TokenKind::RBrace)
        {
            if self.check(&TokenKind::Break) {
                self.advance();
                self.eat(TokenKind::Semicolon)?;
                has_break = true;
                break;
            }
            body.push(self.parse_statement()?);
        }
        Ok((body, has_break))
    }

    fn parse_literal_only(&mut self) -> PResult<Literal> {
        match self.parse_primary()? {
            Expr::Literal(lit) => Ok(lit),
            other => Err(SyntaxError(Diagnostic::new(
                other.pos(),
                "case label must be a literal",
            ))),
        }
    }

    // --- expressions (precedence climbing) ----------------------------------
    // | < ^ < & < (==,!=) < (<,>,<=,>=) < (<<,>>) < (+,-) < (*,/)

    fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> PResult<Expr> {
        self.parse_binop_level(Self::parse_xor, &[(TokenKind::Pipe, BinOp::Or)])
    }

    fn parse_xor(&mut self) -> PResult<Expr> {
        self.parse_binop_level(Self::parse_and, &[(TokenKind::Caret, BinOp::Xor)])
    }

    fn parse_and(&mut self) -> PResult<Expr> {
        self.parse_binop_level(Self::parse_equality, &[(TokenKind::Amp, BinOp::And)])
    }

    fn parse_equality(&mut self) -> PResult<Expr> {
        self.parse_binop_level(
            Self::parse_relational,
            &[(TokenKind::Eq, BinOp::Eq), (TokenKind::NotEq, BinOp::NotEq)],
        )
    }

    fn parse_relational(&mut self) -> PResult<Expr> {
        self.parse_binop_level(
            Self::parse_shift,
            &[
                (TokenKind::Lt, BinOp::Lt),
                (TokenKind::Gt, BinOp::Gt),
                (TokenKind::Le, BinOp::Le),
                (TokenKind::Ge, BinOp::Ge),
            ],
        )
    }

    fn parse_shift(&mut self) -> PResult<Expr> {
        self.parse_binop_level(
            Self::parse_additive,
            &[(TokenKind::Shl, BinOp::Shl), (TokenKind::Shr, BinOp::Shr)],
        )
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        self.parse_binop_level(
            Self::parse_multiplicative,
            &[(TokenKind::Plus, BinOp::Add), (TokenKind::Minus, BinOp::Sub)],
        )
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        self.parse_binop_level(
            Self::parse_primary,
            &[(TokenKind::Star, BinOp::Mul), (TokenKind::Slash, BinOp::Div)],
        )
    }

    fn parse_binop_level(
        &mut self,
        mut next: impl FnMut(&mut Self) -> PResult<Expr>,
        ops: &[(TokenKind, BinOp)],
    ) -> PResult<Expr> {
        let mut lhs = next(self)?;
        loop {
            let Some((_, op)) = ops.iter().find(|(kind, _)| self.check(kind)) else {
                break;
            };
            let pos = self.peek_pos();
            self.advance();
            let rhs = next(self)?;
            lhs = Expr::Binary {
                op: *op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    /// Primary operand: identifier, call, parenthesized expression, or a
    /// literal optionally preceded by a unary minus. Unary minus is only
    /// ever reached here, which is always an operand-starting position, so
    /// no extra context tracking is required to enforce "unary minus on
    /// literals only".
    fn parse_primary(&mut self) -> PResult<Expr> {
        let pos = self.peek_pos();
        match self.peek().kind.clone() {
            TokenKind::Minus => {
                self.advance();
                self.parse_literal(pos, true)
            }
            TokenKind::IntLiteral(_) | TokenKind::UnsignedLiteral(_) => self.parse_literal(pos, false),
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.eat(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Ident(name) => {
                self.advance();
                if self.check(&TokenKind::LParen) {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check(&TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if self.check(&TokenKind::Comma) {
                                self.advance();
                            } else {
                                break;
                            }
                        }
                    }
                    self.eat(TokenKind::RParen)?;
                    Ok(Expr::FunctionCall { name, args, pos })
                } else {
                    Ok(Expr::Id { name, pos })
                }
            }
            other => Err(SyntaxError(Diagnostic::new(
                pos,
                format!("unexpected token {other} in expression"),
            ))),
        }
    }

    fn parse_literal(&mut self, pos: SourcePos, negative: bool) -> PResult<Expr> {
        match self.advance().kind {
            TokenKind::IntLiteral(digits) => {
                let text = if negative { format!("-{digits}") } else { digits };
                Ok(Expr::Literal(Literal {
                    text,
                    ty: Type::Int,
                    pos,
                }))
            }
            TokenKind::UnsignedLiteral(digits) => {
                let text = if negative { format!("-{digits}") } else { digits };
                Ok(Expr::Literal(Literal {
                    text,
                    ty: Type::Unsigned,
                    pos,
                }))
            }
            other => Err(SyntaxError(Diagnostic::new(
                pos,
                format!("expected a literal after unary '-', found {other}"),
            ))),
        }
    }
}

pub fn parse(tokens: Vec<Token>) -> PResult<Program> {
    Parser::new(tokens).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_src(src: &str) -> Program {
        parse(tokenize(src).unwrap()).unwrap()
    }

    #[test]
    fn parses_minimal_main() {
        let program = parse_src("int main(){ return 1 + 2 * 3 - 4 / 2; }");
        assert_eq!(program.functions.len(), 1);
        assert_eq!(program.functions[0].name, "main");
    }

    #[test]
    fn parses_params_and_call() {
        let program = parse_src("int sq(int x){ return x * x; } int main(){ return sq(5); }");
        assert_eq!(program.functions[0].params.len(), 1);
        assert_eq!(program.functions[1].name, "main");
    }

    #[test]
    fn parses_if_else_if_chain() {
        let program = parse_src(
            "int fib(int n){ if(n==0) return 0; else if(n==1) return 1; else return fib(n-1)+fib(n-2); }",
        );
        assert!(matches!(program.functions[0].body[0], Statement::If { .. }));
    }

    #[test]
    fn parses_switch_with_default() {
        let program = parse_src(
            "int main(){ int x = 5; switch(x){ case 1: return 3; case 3: return 2; default: return 0; } }",
        );
        match &program.functions[0].body[1] {
            Statement::Switch { cases, default, .. } => {
                assert_eq!(cases.len(), 2);
                assert!(default.is_some());
            }
            other => panic!("expected switch, got {other:?}"),
        }
    }

    #[test]
    fn missing_function_name_is_syntax_error() {
        let err = parse(tokenize("main(){ return 0; }").unwrap()).err().unwrap();
        assert!(err.0.message.contains("expected identifier"));
    }

    #[test]
    fn unary_minus_fuses_with_literal() {
        let program = parse_src("int main(){ return -1; }");
        match &program.functions[0].body[0] {
            Statement::Return { value: Some(Expr::Literal(lit)), .. } => {
                assert_eq!(lit.text, "-1");
            }
            other => panic!("expected negative literal return, got {other:?}"),
        }
    }

    #[test]
    fn minus_after_identifier_is_binary_subtraction() {
        let program = parse_src("int main(){ int a; return a - 1; }");
        match &program.functions[0].body[1] {
            Statement::Return { value: Some(Expr::Binary { op, .. }), .. } => {
                assert_eq!(*op, BinOp::Sub);
            }
            other => panic!("expected binary subtraction, got {other:?}"),
        }
    }
}
