//! Lexical scanner: source text -> token stream.
//!
//! Lexical errors (unknown character, unterminated block comment) are thrown
//! immediately; this stage is single-threaded and has nothing to accumulate
//! errors into.

use crate::diagnostics::Diagnostic;
use crate::token::{SourcePos, Token, TokenKind, keyword};

pub struct LexError(pub Diagnostic);

pub struct Lexer<'s> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    _source: &'s str,
}

impl<'s> Lexer<'s> {
    pub fn new(source: &'s str) -> Self {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            _source: source,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let here = self.here();
            let Some(c) = self.peek() else {
                tokens.push(Token::new(TokenKind::Eof, here));
                break;
            };
            let token = match c {
                '(' => self.single(TokenKind::LParen),
                ')' => self.single(TokenKind::RParen),
                '{' => self.single(TokenKind::LBrace),
                '}' => self.single(TokenKind::RBrace),
                ';' => self.single(TokenKind::Semicolon),
                ',' => self.single(TokenKind::Comma),
                ':' => self.single(TokenKind::Colon),
                '+' => self.single(TokenKind::Plus),
                '-' => self.single(TokenKind::Minus),
                '*' => self.single(TokenKind::Star),
                '/' => self.single(TokenKind::Slash),
                '&' => self.single(TokenKind::Amp),
                '|' => self.single(TokenKind::Pipe),
                '^' => self.single(TokenKind::Caret),
                '<' => self.two_char('=', TokenKind::Le, '<', TokenKind::Shl, TokenKind::Lt),
                '>' => self.two_char('=', TokenKind::Ge, '>', TokenKind::Shr, TokenKind::Gt),
                '=' => self.maybe_eq(),
                '!' => self.bang(here)?,
                c if c.is_ascii_digit() => self.number(),
                c if c.is_alphabetic() || c == '_' => self.ident_or_keyword(),
                other => {
                    return Err(LexError(Diagnostic::new(
                        here,
                        format!("unknown character '{other}'"),
                    )));
                }
            };
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn here(&self) -> SourcePos {
        SourcePos::new(self.line, self.column)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    let start = self.here();
                    self.advance();
                    self.advance();
                    let mut closed = false;
                    while let Some(c) = self.peek() {
                        if c == '*' && self.peek_at(1) == Some('/') {
                            self.advance();
                            self.advance();
                            closed = true;
                            break;
                        }
                        self.advance();
                    }
                    if !closed {
                        return Err(LexError(Diagnostic::new(
                            start,
                            "unterminated block comment",
                        )));
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn single(&mut self, kind: TokenKind) -> Token {
        let here = self.here();
        self.advance();
        Token::new(kind, here)
    }

    fn two_char(
        &mut self,
        next1: char,
        kind1: TokenKind,
        next2: char,
        kind2: TokenKind,
        fallback: TokenKind,
    ) -> Token {
        let here = self.here();
        self.advance();
        if self.peek() == Some(next1) {
            self.advance();
            return Token::new(kind1, here);
        }
        if self.peek() == Some(next2) {
            self.advance();
            return Token::new(kind2, here);
        }
        Token::new(fallback, here)
    }

    fn maybe_eq(&mut self) -> Token {
        let here = self.here();
        self.advance();
        if self.peek() == Some('=') {
            self.advance();
            return Token::new(TokenKind::Eq, here);
        }
        Token::new(TokenKind::Assign, here)
    }

    fn bang(&mut self, here: SourcePos) -> Result<Token, LexError> {
        self.advance();
        if self.peek() == Some('=') {
            self.advance();
            return Ok(Token::new(TokenKind::NotEq, here));
        }
        Err(LexError(Diagnostic::new(here, "unknown character '!'")))
    }

    fn number(&mut self) -> Token {
        let here = self.here();
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if self.peek() == Some('u') {
            self.advance();
            return Token::new(TokenKind::UnsignedLiteral(text), here);
        }
        Token::new(TokenKind::IntLiteral(text), here)
    }

    fn ident_or_keyword(&mut self) -> Token {
        let here = self.here();
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        match keyword(&text) {
            Some(kind) => Token::new(kind, here),
            None => Token::new(TokenKind::Ident(text), here),
        }
    }
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tokenizes_function_signature() {
        let k = kinds("int main() {}");
        assert_eq!(
            k,
            vec![
                TokenKind::Int,
                TokenKind::Ident("main".to_string()),
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unsigned_literal_suffix() {
        let k = kinds("5u");
        assert_eq!(k[0], TokenKind::UnsignedLiteral("5".to_string()));
    }

    #[test]
    fn two_char_operators() {
        let k = kinds("<= >= == != << >>");
        assert_eq!(
            k,
            vec![
                TokenKind::Le,
                TokenKind::Ge,
                TokenKind::Eq,
                TokenKind::NotEq,
                TokenKind::Shl,
                TokenKind::Shr,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn line_comment_is_skipped() {
        let k = kinds("int x; // trailing comment\nint y;");
        assert_eq!(k.len(), 7); // int x ; int y ; eof
    }

    #[test]
    fn unterminated_block_comment_is_lexical_error() {
        let err = tokenize("int x; /* never closed").err().unwrap();
        assert!(err.0.message.contains("unterminated"));
    }

    #[test]
    fn unknown_character_is_lexical_error() {
        let err = tokenize("int x = 1 $ 2;").err().unwrap();
        assert!(err.0.message.contains("unknown character"));
    }
}
