use std::result;

use crate::error::ScanError;

type ScanResult<T> = result::Result<T, ScanError>;

/// Scan a whole source, failing with every lexical error found.
pub fn scan_tokens(code: &str) -> result::Result<Vec<Token>, Vec<ScanError>> {
    let (tokens, errors) = scan_tokens_recovering(code);
    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(errors)
    }
}

/// Scan past bad input so later errors are found in the same pass. The token list always ends with EOF.
pub fn scan_tokens_recovering(code: &str) -> (Vec<Token>, Vec<ScanError>) {
    let mut scanner = Scanner {
        chars: code.chars().collect(),
        cursor_begin: 0,
        cursor_end: 0,
        line: 1,
    };

    let mut tokens: Vec<Token> = vec![];
    let mut errors = Vec::new();
    loop {
        // the offending characters are already consumed, so scanning simply continues
        let token = match scanner.next_token() {
            Ok(token) => token,
            Err(error) => {
                errors.push(error);
                continue;
            }
        };
        let eof = token.token_type == TokenType::EOF;
        tokens.push(token);
        if eof {
            break;
        }
    }

    (tokens, errors)
}

#[derive(Debug)]
struct Scanner {
    chars: Vec<char>,
    cursor_begin: usize,
    cursor_end: usize,
    line: u32,
}

impl Scanner {
    fn next_token(&mut self) -> ScanResult<Token> {
        self.skip_whitespace_and_comments();
        self.cursor_begin = self.cursor_end;
        // tokens report the line they start on
        let start_line = self.line;

        let current = match self.advance() {
            Some(current) => current,
            None => return Ok(self.make_token(TokenType::EOF, start_line)),
        };

        let token_type = match current {
            '(' => TokenType::LeftParen,
            ')' => TokenType::RightParen,
            '{' => TokenType::LeftBrace,
            '}' => TokenType::RightBrace,
            '[' => TokenType::LeftBracket,
            ']' => TokenType::RightBracket,
            ',' => TokenType::Comma,
            '.' => TokenType::Dot,
            '-' => TokenType::Minus,
            '+' => TokenType::Plus,
            ';' => TokenType::Semicolon,
            '/' => TokenType::Slash,
            '*' => TokenType::Star,
            '?' => TokenType::Question,
            ':' => TokenType::Colon,
            '!' => self.either('=', TokenType::BangEqual, TokenType::Bang),
            '=' => self.either('=', TokenType::EqualEqual, TokenType::Equal),
            '<' => self.either('=', TokenType::LessEqual, TokenType::Less),
            '>' => self.either('=', TokenType::GreaterEqual, TokenType::Greater),
            '"' => self.string()?,
            c if c.is_ascii_digit() => self.number(),
            c if is_identifier_start(c) => self.identifier(),
            character => {
                return Err(ScanError::UnexpectedCharacter {
                    character,
                    line: self.line,
                })
            }
        };

        Ok(self.make_token(token_type, start_line))
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(current) = self.peek() {
            match current {
                ' ' | '\r' | '\t' => {
                    self.cursor_end += 1;
                }
                '\n' => {
                    self.line += 1;
                    self.cursor_end += 1;
                }
                '/' if self.peek_next() == Some('/') => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.cursor_end += 1;
                    }
                }
                _ => return,
            }
        }
    }

    fn string(&mut self) -> ScanResult<TokenType> {
        let start_line = self.line;
        loop {
            match self.advance() {
                Some('"') => break,
                Some('\n') => self.line += 1,
                Some(_) => {}
                None => return Err(ScanError::UnterminatedString { line: start_line }),
            }
        }
        // trim the surrounding quotes
        let value: String = self.chars[self.cursor_begin + 1..self.cursor_end - 1].iter().collect();
        Ok(TokenType::String(value))
    }

    fn number(&mut self) -> TokenType {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.cursor_end += 1;
        }
        // a trailing '.' without digits is left for the next token (method call on a number)
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.cursor_end += 1;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.cursor_end += 1;
            }
        }
        let value = self
            .lexeme()
            .parse::<f64>()
            .unwrap_or_default();
        TokenType::Number(value)
    }

    fn identifier(&mut self) -> TokenType {
        while self.peek().is_some_and(is_identifier_part) {
            self.cursor_end += 1;
        }
        match self.lexeme().as_str() {
            "and" => TokenType::And,
            "class" => TokenType::Class,
            "else" => TokenType::Else,
            "false" => TokenType::False,
            "for" => TokenType::For,
            "fun" => TokenType::Fun,
            "if" => TokenType::If,
            "nil" => TokenType::Nil,
            "or" => TokenType::Or,
            "print" => TokenType::Print,
            "return" => TokenType::Return,
            "super" => TokenType::Super,
            "this" => TokenType::This,
            "true" => TokenType::True,
            "var" => TokenType::Var,
            "while" => TokenType::While,
            _ => TokenType::Identifier,
        }
    }

    fn either(&mut self, expected: char, matched: TokenType, otherwise: TokenType) -> TokenType {
        if self.peek() == Some(expected) {
            self.cursor_end += 1;
            matched
        } else {
            otherwise
        }
    }

    fn advance(&mut self) -> Option<char> {
        let current = self.peek()?;
        self.cursor_end += 1;
        Some(current)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.cursor_end).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.cursor_end + 1).copied()
    }

    fn lexeme(&self) -> String {
        self.chars[self.cursor_begin..self.cursor_end].iter().collect()
    }

    fn make_token(&self, token_type: TokenType, line: u32) -> Token {
        Token {
            token_type,
            lexeme: self.lexeme(),
            line,
        }
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_identifier_part(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub lexeme: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    // Single-character tokens.
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Dot,
    Minus,
    Plus,
    Semicolon,
    Slash,
    Star,
    Question,
    Colon,

    // One or two character tokens.
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // Literals.
    Identifier,
    String(String),
    Number(f64),

    // Keywords.
    And,
    Class,
    Else,
    False,
    Fun,
    For,
    If,
    Nil,
    Or,
    Print,
    Return,
    Super,
    This,
    True,
    Var,
    While,

    EOF,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(code: &str) -> Vec<TokenType> {
        scan_tokens(code)
            .expect("scan should succeed")
            .into_iter()
            .map(|token| token.token_type)
            .collect()
    }

    #[test]
    fn maximal_munch_operators() {
        assert_eq!(
            types("!= == <= >= ! = < >"),
            vec![
                TokenType::BangEqual,
                TokenType::EqualEqual,
                TokenType::LessEqual,
                TokenType::GreaterEqual,
                TokenType::Bang,
                TokenType::Equal,
                TokenType::Less,
                TokenType::Greater,
                TokenType::EOF,
            ]
        );
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            types("var orchid = nil or classy;"),
            vec![
                TokenType::Var,
                TokenType::Identifier,
                TokenType::Equal,
                TokenType::Nil,
                TokenType::Or,
                TokenType::Identifier,
                TokenType::Semicolon,
                TokenType::EOF,
            ]
        );
    }

    #[test]
    fn literals() {
        assert_eq!(
            types("12.5 \"hi there\" 7."),
            vec![
                TokenType::Number(12.5),
                TokenType::String("hi there".to_string()),
                TokenType::Number(7.0),
                TokenType::Dot,
                TokenType::EOF,
            ]
        );
    }

    #[test]
    fn comments_and_lines() {
        let tokens = scan_tokens("// nothing here\nprint [1] ? a : b;\n").expect("scan should succeed");
        assert_eq!(tokens[0].token_type, TokenType::Print);
        assert_eq!(tokens[0].line, 2);
        assert_eq!(tokens[2].token_type, TokenType::Number(1.0));
        assert_eq!(tokens[4].token_type, TokenType::Question);
        assert_eq!(tokens[6].token_type, TokenType::Colon);
        assert_eq!(tokens.last().map(|token| token.line), Some(3));
    }

    #[test]
    fn errors() {
        assert_eq!(
            scan_tokens("var a = @;"),
            Err(vec![ScanError::UnexpectedCharacter {
                character: '@',
                line: 1
            }])
        );
        assert_eq!(
            scan_tokens("\n\"open"),
            Err(vec![ScanError::UnterminatedString { line: 2 }])
        );
    }

    #[test]
    fn scanning_continues_after_errors() {
        let (tokens, errors) = scan_tokens_recovering("var a = @;\nprint #1;");
        assert_eq!(
            errors,
            vec![
                ScanError::UnexpectedCharacter {
                    character: '@',
                    line: 1
                },
                ScanError::UnexpectedCharacter {
                    character: '#',
                    line: 2
                },
            ]
        );
        let types: Vec<TokenType> = tokens.into_iter().map(|token| token.token_type).collect();
        assert_eq!(
            types,
            vec![
                TokenType::Var,
                TokenType::Identifier,
                TokenType::Equal,
                TokenType::Semicolon,
                TokenType::Print,
                TokenType::Number(1.0),
                TokenType::Semicolon,
                TokenType::EOF,
            ]
        );
    }

    #[test]
    fn multi_line_string_keeps_its_opening_line() {
        let tokens = scan_tokens("print\n\"one\ntwo\"\n;").expect("scan should succeed");
        assert_eq!(tokens[1].token_type, TokenType::String("one\ntwo".to_string()));
        assert_eq!(tokens[1].line, 2);
        assert_eq!(tokens[2].line, 4);
    }
}
