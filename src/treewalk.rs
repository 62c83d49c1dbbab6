pub mod callable;
pub mod class;
pub mod environment;
pub mod interpreter;
pub mod list;
pub mod resolver;
pub mod stdlib;
pub mod value;

use std::slice;

use tracing::debug;

use crate::error::LoxError;
use crate::parser;
use crate::scanner;
use crate::stmt::Stmt;

pub use interpreter::Interpreter;

pub type ExecutionResult = Result<(), LoxError>;

/// Scan, parse, resolve and run a whole program. Every static error is reported together and nothing
/// runs if there are any.
pub fn execute(code: &str, interp: &mut Interpreter) -> ExecutionResult {
    let statements = parse_program(code)?;
    let table = resolver::resolve(&statements).map_err(batch)?;
    interp.interpret(&statements, table)?;
    Ok(())
}

/// Run one line of interactive input. Each top-level statement is resolved on its own, so a binding
/// error only discards the statement that caused it. A runtime error ends the entry. Every error met
/// along the way is returned.
pub fn execute_repl_line(code: &str, interp: &mut Interpreter) -> ExecutionResult {
    let statements = parse_program(code)?;

    let mut errors = Vec::new();
    for statement in &statements {
        let statement = slice::from_ref(statement);
        match resolver::resolve(statement) {
            Ok(table) => {
                if let Err(error) = interp.interpret(statement, table) {
                    errors.push(LoxError::from(error));
                    break;
                }
            }
            Err(binding_errors) => {
                debug!(errors = binding_errors.len(), "discarding statement");
                errors.extend(binding_errors.into_iter().map(LoxError::from));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(LoxError::from_batch(errors))
    }
}

// scan errors don't stop parsing, so both kinds come back in one batch
fn parse_program(code: &str) -> Result<Vec<Stmt>, LoxError> {
    let (tokens, scan_errors) = scanner::scan_tokens_recovering(code);
    let mut errors: Vec<LoxError> = scan_errors.into_iter().map(LoxError::from).collect();
    match parser::parse(&tokens) {
        Ok(statements) if errors.is_empty() => return Ok(statements),
        Ok(_) => {}
        Err(parse_errors) => errors.extend(parse_errors.into_iter().map(LoxError::from)),
    }
    Err(LoxError::from_batch(errors))
}

fn batch<E: Into<LoxError>>(errors: Vec<E>) -> LoxError {
    LoxError::from_batch(errors.into_iter().map(Into::into).collect())
}
