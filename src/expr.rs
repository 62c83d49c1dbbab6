use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::scanner::Token;
use crate::scanner::TokenType;

static NEXT_EXPR_ID: AtomicUsize = AtomicUsize::new(0);

/// Identity of a name-carrying expression node, used as the key of the resolution table.
/// Ids are unique for the whole process so tables produced by separate parses never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(usize);

impl ExprId {
    pub fn fresh() -> ExprId {
        ExprId(NEXT_EXPR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Assign {
        id: ExprId,
        name: Token,
        value: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        paren: Token,
        arguments: Vec<Expr>,
    },
    Get {
        object: Box<Expr>,
        name: Token,
    },
    Grouping {
        expression: Box<Expr>,
    },
    Index {
        list: Box<Expr>,
        bracket: Token,
        index: Box<Expr>,
    },
    List {
        bracket: Token,
        elements: Vec<Expr>,
    },
    Literal {
        value: LiteralValue,
    },
    Logical {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },
    Set {
        object: Box<Expr>,
        name: Token,
        value: Box<Expr>,
    },
    Super {
        id: ExprId,
        keyword: Token,
        method: Token,
    },
    Ternary {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    This {
        id: ExprId,
        keyword: Token,
    },
    Unary {
        operator: Token,
        right: Box<Expr>,
    },
    Variable {
        id: ExprId,
        name: Token,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Boolean(bool),
    Nil,
    Number(f64),
    String(String),
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(value) => write!(f, "{value}"),
            Self::Nil => write!(f, "nil"),
            Self::Number(value) => write!(f, "{value}"),
            Self::String(value) => write!(f, "{value}"),
        }
    }
}

impl TryFrom<&Token> for LiteralValue {
    type Error = String;

    fn try_from(token: &Token) -> Result<LiteralValue, String> {
        match &token.token_type {
            TokenType::False => Ok(LiteralValue::Boolean(false)),
            TokenType::True => Ok(LiteralValue::Boolean(true)),
            TokenType::Nil => Ok(LiteralValue::Nil),
            TokenType::Number(value) => Ok(LiteralValue::Number(*value)),
            TokenType::String(value) => Ok(LiteralValue::String(value.clone())),
            _ => Err(format!("Cannot make literal value from token '{}'", token.lexeme)),
        }
    }
}

/// Render an expression tree in prefix form, e.g. `(+ 1 (* 2 3))`.
pub fn print_ast(root: &Expr) -> String {
    let mut printed = String::new();
    format_expr(root, &mut printed);
    printed
}

fn format_expr(expr: &Expr, output: &mut String) {
    match expr {
        Expr::Assign { name, value, .. } => {
            format_subexprs(&format!("= {}", name.lexeme), &[value.as_ref()], output);
        }
        Expr::Binary { left, operator, right } | Expr::Logical { left, operator, right } => {
            format_subexprs(&operator.lexeme, &[left.as_ref(), right.as_ref()], output);
        }
        Expr::Call { callee, arguments, .. } => {
            let mut parts: Vec<&Expr> = vec![callee.as_ref()];
            parts.extend(arguments.iter());
            format_subexprs("call", &parts, output);
        }
        Expr::Get { object, name } => {
            format_subexprs(&format!(". {}", name.lexeme), &[object.as_ref()], output);
        }
        Expr::Grouping { expression } => {
            format_subexprs("group", &[expression.as_ref()], output);
        }
        Expr::Index { list, index, .. } => {
            format_subexprs("index", &[list.as_ref(), index.as_ref()], output);
        }
        Expr::List { elements, .. } => {
            let parts: Vec<&Expr> = elements.iter().collect();
            format_subexprs("list", &parts, output);
        }
        Expr::Literal { value } => match value {
            LiteralValue::String(text) => {
                output.push('"');
                output.push_str(text);
                output.push('"');
            }
            other => output.push_str(&other.to_string()),
        },
        Expr::Set { object, name, value } => {
            format_subexprs(&format!(".= {}", name.lexeme), &[object.as_ref(), value.as_ref()], output);
        }
        Expr::Super { method, .. } => {
            output.push_str("super.");
            output.push_str(&method.lexeme);
        }
        Expr::Ternary {
            condition,
            then_branch,
            else_branch,
        } => {
            format_subexprs("?:", &[condition.as_ref(), then_branch.as_ref(), else_branch.as_ref()], output);
        }
        Expr::This { .. } => {
            output.push_str("this");
        }
        Expr::Unary { operator, right } => {
            format_subexprs(&operator.lexeme, &[right.as_ref()], output);
        }
        Expr::Variable { name, .. } => {
            output.push_str(&name.lexeme);
        }
    }
}

fn format_subexprs(name: &str, exprs: &[&Expr], output: &mut String) {
    output.push('(');
    output.push_str(name);
    for expr in exprs {
        output.push(' ');
        format_expr(expr, output);
    }
    output.push(')');
}
