use std::rc::Rc;
use std::result;

use crate::error::ParseError;
use crate::expr::{Expr, ExprId, LiteralValue};
use crate::scanner::Token;
use crate::scanner::TokenType;
use crate::stmt::{FunctionDecl, Stmt};

type ParseResult<T> = result::Result<T, ParseError>;
type StmtResult = ParseResult<Stmt>;
type ExprResult = ParseResult<Expr>;

const MAX_ARGUMENTS: usize = 255;

/// Parse a whole program. After an error the parser resynchronizes and keeps going, so every syntax
/// error in the source is reported together.
pub fn parse(tokens: &[Token]) -> result::Result<Vec<Stmt>, Vec<ParseError>> {
    let mut cursor = TokenCursor::new(tokens);
    let mut statements = Vec::new();

    while !cursor.at_end() {
        if let Some(statement) = recovering_declaration(&mut cursor) {
            statements.push(statement);
        }
    }

    if cursor.errors.is_empty() {
        Ok(statements)
    } else {
        Err(cursor.errors)
    }
}

fn recovering_declaration(cursor: &mut TokenCursor) -> Option<Stmt> {
    match declaration(cursor) {
        Ok(statement) => Some(statement),
        Err(error) => {
            cursor.errors.push(error);
            cursor.synchronize();
            None
        }
    }
}

fn declaration(cursor: &mut TokenCursor) -> StmtResult {
    if cursor.advance_if_match(&TokenType::Var).is_some() {
        var_declaration(cursor)
    } else if cursor.advance_if_match(&TokenType::Fun).is_some() {
        Ok(Stmt::Function(function(cursor, "function")?))
    } else if cursor.advance_if_match(&TokenType::Class).is_some() {
        class_declaration(cursor)
    } else {
        statement(cursor)
    }
}

fn var_declaration(cursor: &mut TokenCursor) -> StmtResult {
    let name = cursor.consume(&TokenType::Identifier, "Expect variable name.")?;

    let initializer = if cursor.advance_if_match(&TokenType::Equal).is_some() {
        expression(cursor)?
    } else {
        // uninitialized variables default to nil
        Expr::Literal {
            value: LiteralValue::Nil,
        }
    };

    cursor.consume(&TokenType::Semicolon, "Expect ';' after variable declaration.")?;

    Ok(Stmt::Var { name, initializer })
}

fn function(cursor: &mut TokenCursor, kind: &str) -> ParseResult<Rc<FunctionDecl>> {
    let name = cursor.consume(&TokenType::Identifier, &format!("Expect {kind} name."))?;
    cursor.consume(&TokenType::LeftParen, &format!("Expect '(' after {kind} name."))?;

    let mut params = Vec::new();
    if !cursor.check(&TokenType::RightParen) {
        loop {
            if params.len() >= MAX_ARGUMENTS {
                return Err(error_at(cursor.peek(), "Can't have more than 255 parameters."));
            }
            params.push(cursor.consume(&TokenType::Identifier, "Expect parameter name.")?);
            if cursor.advance_if_match(&TokenType::Comma).is_none() {
                break;
            }
        }
    }
    cursor.consume(&TokenType::RightParen, "Expect ')' after parameters.")?;

    cursor.consume(&TokenType::LeftBrace, &format!("Expect '{{' before {kind} body."))?;
    let body = block(cursor)?;

    Ok(Rc::new(FunctionDecl { name, params, body }))
}

fn class_declaration(cursor: &mut TokenCursor) -> StmtResult {
    let name = cursor.consume(&TokenType::Identifier, "Expect class name.")?;

    let superclass = if cursor.advance_if_match(&TokenType::Less).is_some() {
        let superclass_name = cursor.consume(&TokenType::Identifier, "Expect superclass name.")?;
        Some(Expr::Variable {
            id: ExprId::fresh(),
            name: superclass_name,
        })
    } else {
        None
    };

    cursor.consume(&TokenType::LeftBrace, "Expect '{' before class body.")?;
    let mut methods = Vec::new();
    while !cursor.check(&TokenType::RightBrace) && !cursor.at_end() {
        methods.push(function(cursor, "method")?);
    }
    cursor.consume(&TokenType::RightBrace, "Expect '}' after class body.")?;

    Ok(Stmt::Class {
        name,
        superclass,
        methods,
    })
}

fn statement(cursor: &mut TokenCursor) -> StmtResult {
    if let Some(token) = cursor.advance_if_any_match(&[
        TokenType::If,
        TokenType::Print,
        TokenType::LeftBrace,
        TokenType::While,
        TokenType::For,
        TokenType::Return,
    ]) {
        match token.token_type {
            TokenType::If => if_statement(cursor),
            TokenType::Print => print_statement(cursor),
            TokenType::LeftBrace => Ok(Stmt::Block {
                statements: block(cursor)?,
            }),
            TokenType::While => while_statement(cursor),
            TokenType::For => for_statement(cursor),
            TokenType::Return => return_statement(token, cursor),
            _ => Err(error_at(&token, "Unexpected token type when parsing statement.")),
        }
    } else {
        expression_statement(cursor)
    }
}

fn if_statement(cursor: &mut TokenCursor) -> StmtResult {
    cursor.consume(&TokenType::LeftParen, "Expect '(' after 'if'.")?;
    let condition = expression(cursor)?;
    cursor.consume(&TokenType::RightParen, "Expect ')' after if condition.")?;

    let then_branch = Box::new(statement(cursor)?);
    let else_branch = if cursor.advance_if_match(&TokenType::Else).is_some() {
        Some(Box::new(statement(cursor)?))
    } else {
        None
    };

    Ok(Stmt::If {
        condition,
        then_branch,
        else_branch,
    })
}

fn while_statement(cursor: &mut TokenCursor) -> StmtResult {
    cursor.consume(&TokenType::LeftParen, "Expect '(' after 'while'.")?;
    let condition = expression(cursor)?;
    cursor.consume(&TokenType::RightParen, "Expect ')' after while condition.")?;
    let body = Box::new(statement(cursor)?);
    Ok(Stmt::While { condition, body })
}

// There is no for node in the tree, the loop is rewritten into an equivalent while loop
fn for_statement(cursor: &mut TokenCursor) -> StmtResult {
    cursor.consume(&TokenType::LeftParen, "Expect '(' after 'for'.")?;

    let initializer = if cursor.advance_if_match(&TokenType::Semicolon).is_some() {
        None
    } else if cursor.advance_if_match(&TokenType::Var).is_some() {
        Some(var_declaration(cursor)?)
    } else {
        Some(expression_statement(cursor)?)
    };

    let condition = if cursor.check(&TokenType::Semicolon) {
        Expr::Literal {
            value: LiteralValue::Boolean(true),
        }
    } else {
        expression(cursor)?
    };
    cursor.consume(&TokenType::Semicolon, "Expect ';' after loop condition.")?;

    let increment = if cursor.check(&TokenType::RightParen) {
        None
    } else {
        Some(expression(cursor)?)
    };
    cursor.consume(&TokenType::RightParen, "Expect ')' after for clauses.")?;

    let mut body = statement(cursor)?;

    if let Some(increment) = increment {
        body = Stmt::Block {
            statements: vec![body, Stmt::Expression { expression: increment }],
        };
    }

    body = Stmt::While {
        condition,
        body: Box::new(body),
    };

    if let Some(initializer) = initializer {
        body = Stmt::Block {
            statements: vec![initializer, body],
        };
    }

    Ok(body)
}

fn print_statement(cursor: &mut TokenCursor) -> StmtResult {
    let expression = expression(cursor)?;
    cursor.consume(&TokenType::Semicolon, "Expect ';' after value.")?;
    Ok(Stmt::Print { expression })
}

fn return_statement(keyword: Token, cursor: &mut TokenCursor) -> StmtResult {
    let value = if cursor.check(&TokenType::Semicolon) {
        None
    } else {
        Some(expression(cursor)?)
    };
    cursor.consume(&TokenType::Semicolon, "Expect ';' after return value.")?;
    Ok(Stmt::Return { keyword, value })
}

fn expression_statement(cursor: &mut TokenCursor) -> StmtResult {
    let expression = expression(cursor)?;
    cursor.consume(&TokenType::Semicolon, "Expect ';' after expression.")?;
    Ok(Stmt::Expression { expression })
}

// Expects the opening brace to be consumed already
fn block(cursor: &mut TokenCursor) -> ParseResult<Vec<Stmt>> {
    let mut statements = Vec::new();
    while !cursor.check(&TokenType::RightBrace) && !cursor.at_end() {
        if let Some(statement) = recovering_declaration(cursor) {
            statements.push(statement);
        }
    }
    cursor.consume(&TokenType::RightBrace, "Expect '}' after block.")?;
    Ok(statements)
}

fn expression(cursor: &mut TokenCursor) -> ExprResult {
    assignment(cursor)
}

fn assignment(cursor: &mut TokenCursor) -> ExprResult {
    let expr = ternary(cursor)?;

    if let Some(equal) = cursor.advance_if_match(&TokenType::Equal) {
        let value = Box::new(assignment(cursor)?);

        return match expr {
            Expr::Variable { name, .. } => Ok(Expr::Assign {
                id: ExprId::fresh(),
                name,
                value,
            }),
            Expr::Get { object, name } => Ok(Expr::Set { object, name, value }),
            _ => Err(error_at(&equal, "Invalid assignment target.")),
        };
    }

    Ok(expr)
}

fn ternary(cursor: &mut TokenCursor) -> ExprResult {
    let condition = logic_or(cursor)?;

    if cursor.advance_if_match(&TokenType::Question).is_some() {
        let then_branch = expression(cursor)?;
        cursor.consume(&TokenType::Colon, "Expect ':' after then branch of ternary expression.")?;
        let else_branch = ternary(cursor)?;
        return Ok(Expr::Ternary {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        });
    }

    Ok(condition)
}

fn logic_or(cursor: &mut TokenCursor) -> ExprResult {
    logical_left_associative(cursor, logic_and, &TokenType::Or)
}

fn logic_and(cursor: &mut TokenCursor) -> ExprResult {
    logical_left_associative(cursor, equality, &TokenType::And)
}

fn equality(cursor: &mut TokenCursor) -> ExprResult {
    binary_left_associative(cursor, comparison, &[TokenType::BangEqual, TokenType::EqualEqual])
}

fn comparison(cursor: &mut TokenCursor) -> ExprResult {
    binary_left_associative(
        cursor,
        term,
        &[
            TokenType::Greater,
            TokenType::GreaterEqual,
            TokenType::Less,
            TokenType::LessEqual,
        ],
    )
}

fn term(cursor: &mut TokenCursor) -> ExprResult {
    binary_left_associative(cursor, factor, &[TokenType::Minus, TokenType::Plus])
}

fn factor(cursor: &mut TokenCursor) -> ExprResult {
    binary_left_associative(cursor, unary, &[TokenType::Slash, TokenType::Star])
}

// Parse a binary left associative expression as long as the current token matches one of the given types
fn binary_left_associative(
    cursor: &mut TokenCursor,
    higher_precedence: fn(&mut TokenCursor) -> ExprResult,
    types: &[TokenType],
) -> ExprResult {
    let mut expr = higher_precedence(cursor)?;

    while let Some(operator) = cursor.advance_if_any_match(types) {
        let right = higher_precedence(cursor)?;
        expr = Expr::Binary {
            left: Box::new(expr),
            operator,
            right: Box::new(right),
        };
    }

    Ok(expr)
}

fn logical_left_associative(
    cursor: &mut TokenCursor,
    higher_precedence: fn(&mut TokenCursor) -> ExprResult,
    token_type: &TokenType,
) -> ExprResult {
    let mut expr = higher_precedence(cursor)?;

    while let Some(operator) = cursor.advance_if_match(token_type) {
        let right = higher_precedence(cursor)?;
        expr = Expr::Logical {
            left: Box::new(expr),
            operator,
            right: Box::new(right),
        };
    }

    Ok(expr)
}

fn unary(cursor: &mut TokenCursor) -> ExprResult {
    if let Some(operator) = cursor.advance_if_any_match(&[TokenType::Bang, TokenType::Minus]) {
        let right = unary(cursor)?;
        return Ok(Expr::Unary {
            operator,
            right: Box::new(right),
        });
    }

    call(cursor)
}

fn call(cursor: &mut TokenCursor) -> ExprResult {
    let mut expr = primary(cursor)?;

    loop {
        if cursor.advance_if_match(&TokenType::LeftParen).is_some() {
            let (arguments, paren) = arguments(cursor, &TokenType::RightParen, "Expect ')' after arguments.")?;
            expr = Expr::Call {
                callee: Box::new(expr),
                paren,
                arguments,
            };
        } else if cursor.advance_if_match(&TokenType::Dot).is_some() {
            let name = cursor.consume(&TokenType::Identifier, "Expect property name after '.'.")?;
            expr = Expr::Get {
                object: Box::new(expr),
                name,
            };
        } else if let Some(bracket) = cursor.advance_if_match(&TokenType::LeftBracket) {
            let index = expression(cursor)?;
            cursor.consume(&TokenType::RightBracket, "Expect ']' after list index.")?;
            expr = Expr::Index {
                list: Box::new(expr),
                bracket,
                index: Box::new(index),
            };
        } else {
            break;
        }
    }

    Ok(expr)
}

// Comma separated expressions up to the closing token, returns the closing token for error reporting
fn arguments(cursor: &mut TokenCursor, closing: &TokenType, message: &str) -> ParseResult<(Vec<Expr>, Token)> {
    let mut arguments = Vec::new();
    if !cursor.check(closing) {
        loop {
            if arguments.len() >= MAX_ARGUMENTS {
                return Err(error_at(cursor.peek(), "Can't have more than 255 arguments."));
            }
            arguments.push(expression(cursor)?);
            if cursor.advance_if_match(&TokenType::Comma).is_none() {
                break;
            }
        }
    }
    let closing = cursor.consume(closing, message)?;
    Ok((arguments, closing))
}

fn primary(cursor: &mut TokenCursor) -> ExprResult {
    let current = cursor.peek().clone();

    match current.token_type {
        TokenType::False | TokenType::True | TokenType::Nil | TokenType::Number(_) | TokenType::String(_) => {
            cursor.advance();
            let value = LiteralValue::try_from(&current).map_err(|message| error_at(&current, &message))?;
            Ok(Expr::Literal { value })
        }
        TokenType::Identifier => {
            cursor.advance();
            Ok(Expr::Variable {
                id: ExprId::fresh(),
                name: current,
            })
        }
        TokenType::This => {
            cursor.advance();
            Ok(Expr::This {
                id: ExprId::fresh(),
                keyword: current,
            })
        }
        TokenType::Super => {
            cursor.advance();
            cursor.consume(&TokenType::Dot, "Expect '.' after 'super'.")?;
            let method = cursor.consume(&TokenType::Identifier, "Expect superclass method name.")?;
            Ok(Expr::Super {
                id: ExprId::fresh(),
                keyword: current,
                method,
            })
        }
        TokenType::LeftParen => {
            cursor.advance();
            let expr = expression(cursor)?;
            cursor.consume(&TokenType::RightParen, "Expect ')' after expression.")?;
            Ok(Expr::Grouping {
                expression: Box::new(expr),
            })
        }
        TokenType::LeftBracket => {
            cursor.advance();
            let (elements, _) = arguments(cursor, &TokenType::RightBracket, "Expect ']' after list elements.")?;
            Ok(Expr::List {
                bracket: current,
                elements,
            })
        }
        _ => Err(error_at(&current, "Expect expression.")),
    }
}

fn error_at(token: &Token, message: &str) -> ParseError {
    let location = if token.token_type == TokenType::EOF {
        "end".to_string()
    } else {
        format!("'{}'", token.lexeme)
    };
    ParseError {
        message: message.to_string(),
        location,
        line: token.line,
    }
}

struct TokenCursor<'a> {
    tokens: &'a [Token],
    index: usize,
    errors: Vec<ParseError>,
}

impl<'a> TokenCursor<'a> {
    fn new(tokens: &'a [Token]) -> TokenCursor<'a> {
        TokenCursor {
            tokens,
            index: 0,
            errors: Vec::new(),
        }
    }

    // Skip to the next statement boundary: just past a ';' or right before a statement keyword
    fn synchronize(&mut self) {
        self.advance();
        while !self.at_end() {
            if self.previous_is(&TokenType::Semicolon) {
                return;
            }
            if matches!(
                self.peek().token_type,
                TokenType::Class
                    | TokenType::Fun
                    | TokenType::Var
                    | TokenType::For
                    | TokenType::If
                    | TokenType::While
                    | TokenType::Print
                    | TokenType::Return
            ) {
                return;
            }
            self.advance();
        }
    }

    fn previous_is(&self, token_type: &TokenType) -> bool {
        self.index > 0 && self.tokens[self.index - 1].token_type == *token_type
    }

    // the scanner always terminates the token list with EOF, so the last token is a safe fallback
    fn peek(&self) -> &'a Token {
        let tokens = self.tokens;
        let last = tokens.len().saturating_sub(1);
        &tokens[self.index.min(last)]
    }

    fn advance(&mut self) {
        if !self.at_end() {
            self.index += 1;
        }
    }

    fn at_end(&self) -> bool {
        self.index >= self.tokens.len() || matches!(self.peek().token_type, TokenType::EOF)
    }

    fn check(&self, token_type: &TokenType) -> bool {
        !self.at_end() && self.peek().token_type == *token_type
    }

    fn consume(&mut self, token_type: &TokenType, message: &str) -> ParseResult<Token> {
        self.advance_if_match(token_type)
            .ok_or_else(|| error_at(self.peek(), message))
    }

    fn advance_if_match(&mut self, token_type: &TokenType) -> Option<Token> {
        if self.check(token_type) {
            let cloned = self.peek().clone();
            self.advance();
            Some(cloned)
        } else {
            None
        }
    }

    // TokenType also wraps literal values which would affect equality comparisons, don't pass literal types here
    fn advance_if_any_match(&mut self, types: &[TokenType]) -> Option<Token> {
        let token = self.peek();
        if !self.at_end() && types.contains(&token.token_type) {
            let cloned = token.clone();
            self.advance();
            Some(cloned)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::print_ast;
    use crate::scanner::scan_tokens;

    fn parse_source(code: &str) -> result::Result<Vec<Stmt>, Vec<ParseError>> {
        let tokens = scan_tokens(code).expect("scan should succeed");
        parse(&tokens)
    }

    fn single_error(code: &str) -> ParseError {
        let mut errors = parse_source(code).expect_err("parse should fail");
        assert_eq!(errors.len(), 1, "{errors:?}");
        errors.remove(0)
    }

    fn expression_ast(code: &str) -> String {
        let statements = parse_source(code).expect("parse should succeed");
        match &statements[0] {
            Stmt::Expression { expression } => print_ast(expression),
            other => panic!("expected expression statement, found {other:?}"),
        }
    }

    #[test]
    fn precedence() {
        assert_eq!(expression_ast("1 + 2 * 3 - -4;"), "(- (+ 1 (* 2 3)) (- 4))");
        assert_eq!(expression_ast("a or b and c == d;"), "(or a (and b (== c d)))");
        assert_eq!(expression_ast("!(1 < 2);"), "(! (group (< 1 2)))");
    }

    #[test]
    fn ternary_is_right_associative() {
        assert_eq!(expression_ast("a ? b : c ? d : e;"), "(?: a b (?: c d e))");
    }

    #[test]
    fn postfix_chains() {
        assert_eq!(
            expression_ast("matrix[0][1].append(\"x\");"),
            "(call (. append (index (index matrix 0) 1)) \"x\")"
        );
        assert_eq!(expression_ast("[1, [2]];"), "(list 1 (list 2))");
    }

    #[test]
    fn assignment_targets() {
        assert_eq!(expression_ast("a = b = 3;"), "(= a (= b 3))");
        assert_eq!(expression_ast("point.x = 1;"), "(.= x point 1)");

        let error = single_error("a + b = 3;");
        assert_eq!(error.message, "Invalid assignment target.");
        assert_eq!(error.location, "'='");
    }

    #[test]
    fn for_loop_desugars_to_while() {
        let statements = parse_source("for (var i = 0; i < 3; i = i + 1) print i;").expect("parse should succeed");
        assert_eq!(statements.len(), 1);
        match &statements[0] {
            Stmt::Block { statements } => {
                assert!(matches!(statements[0], Stmt::Var { .. }));
                match &statements[1] {
                    Stmt::While { body, .. } => match body.as_ref() {
                        Stmt::Block { statements } => {
                            assert!(matches!(statements[0], Stmt::Print { .. }));
                            assert!(matches!(statements[1], Stmt::Expression { .. }));
                        }
                        other => panic!("expected loop body block, found {other:?}"),
                    },
                    other => panic!("expected while loop, found {other:?}"),
                }
            }
            other => panic!("expected block, found {other:?}"),
        }
    }

    #[test]
    fn class_with_superclass() {
        let statements = parse_source("class B < A { init(x) { this.x = x; } get() { return super.get(); } }")
            .expect("parse should succeed");
        match &statements[0] {
            Stmt::Class {
                name,
                superclass,
                methods,
            } => {
                assert_eq!(name.lexeme, "B");
                assert!(matches!(superclass, Some(Expr::Variable { name, .. }) if name.lexeme == "A"));
                let names: Vec<&str> = methods.iter().map(|method| method.name.lexeme.as_str()).collect();
                assert_eq!(names, vec!["init", "get"]);
                assert_eq!(methods[0].params.len(), 1);
            }
            other => panic!("expected class, found {other:?}"),
        }
    }

    #[test]
    fn identical_references_get_distinct_ids() {
        let statements = parse_source("a; a;").expect("parse should succeed");
        let ids: Vec<ExprId> = statements
            .iter()
            .map(|statement| match statement {
                Stmt::Expression {
                    expression: Expr::Variable { id, .. },
                } => *id,
                other => panic!("expected variable statement, found {other:?}"),
            })
            .collect();
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn reports_missing_semicolon_at_end() {
        let error = single_error("print 1");
        assert_eq!(error.to_string(), "[line 1] Error at end: Expect ';' after value.");
    }

    #[test]
    fn reports_every_statement_error() {
        let errors = parse_source("print ;\nprint ;\nprint 1;").expect_err("parse should fail");
        let lines: Vec<(u32, &str)> = errors.iter().map(|error| (error.line, error.message.as_str())).collect();
        assert_eq!(lines, vec![(1, "Expect expression."), (2, "Expect expression.")]);
    }

    #[test]
    fn recovers_inside_blocks_and_at_keywords() {
        let errors = parse_source("{ var = 1; print 2; }\nvar x = 1 var y = 2;\nfun () {}")
            .expect_err("parse should fail");
        let messages: Vec<&str> = errors.iter().map(|error| error.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Expect variable name.",
                "Expect ';' after variable declaration.",
                "Expect function name."
            ]
        );
    }
}
