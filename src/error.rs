use std::error::Error;
use std::result;

use thiserror::Error;

pub type GenericResult<T> = result::Result<T, Box<dyn Error>>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("[line {line}] Error: Unexpected character '{character}'.")]
    UnexpectedCharacter { character: char, line: u32 },
    #[error("[line {line}] Error: Unterminated string.")]
    UnterminatedString { line: u32 },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("[line {line}] Error at {location}: {message}")]
pub struct ParseError {
    pub message: String,
    pub location: String,
    pub line: u32,
}

/// Static errors reported by the resolver. Execution never starts while one is outstanding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindingError {
    #[error("[line {line}] Error at '{name}': Can't read local variable in its own initializer.")]
    SelfReferencingInitializer { name: String, line: u32 },
    #[error("[line {line}] Error at '{name}': Already a variable with this name in this scope.")]
    DuplicateDeclaration { name: String, line: u32 },
    #[error("[line {line}] Error at 'return': Can't return from top-level code.")]
    ReturnOutsideFunction { line: u32 },
    #[error("[line {line}] Error at 'return': Can't return a value from an initializer.")]
    ReturnValueFromInitializer { line: u32 },
    #[error("[line {line}] Error at 'this': Can't use 'this' outside of a class.")]
    ThisOutsideClass { line: u32 },
    #[error("[line {line}] Error at 'super': Can't use 'super' outside of a class.")]
    SuperOutsideClass { line: u32 },
    #[error("[line {line}] Error at 'super': Can't use 'super' in a class with no superclass.")]
    SuperWithoutSuperclass { line: u32 },
    #[error("[line {line}] Error at '{name}': A class can't inherit from itself.")]
    SelfInheritance { name: String, line: u32 },
}

/// Dynamic errors. Each one aborts the current top-level statement.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("[line {line}] Undefined variable '{name}'.")]
    UndefinedVariable { name: String, line: u32 },
    #[error("[line {line}] Undefined property '{name}'.")]
    UndefinedProperty { name: String, line: u32 },
    #[error("[line {line}] Expected {expected} arguments but got {found}.")]
    Arity { expected: usize, found: usize, line: u32 },
    #[error("[line {line}] List index {index} out of range for list of length {len}.")]
    Index { index: f64, len: usize, line: u32 },
    #[error("[line {line}] {message}")]
    TypeMismatch { message: String, line: u32 },
    #[error("[line {line}] Can't divide by zero.")]
    DivisionByZero { line: u32 },
    #[error("[line {line}] Stack exhausted: call depth exceeded {depth}.")]
    StackExhausted { depth: usize, line: u32 },
    #[error("[line {line}] Error in native function '{name}': {message}")]
    Native { name: String, message: String, line: u32 },
    #[error("Failed to write program output: {message}")]
    Output { message: String },
}

impl RuntimeError {
    pub fn type_mismatch(message: &str, line: u32) -> RuntimeError {
        RuntimeError::TypeMismatch {
            message: message.to_string(),
            line,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoxError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Binding(#[from] BindingError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    /// Several errors reported together, one per line.
    #[error("{}", join_lines(.0))]
    Multiple(Vec<LoxError>),
}

impl LoxError {
    /// A batch holding a single error collapses to that error.
    pub fn from_batch(mut errors: Vec<LoxError>) -> LoxError {
        if errors.len() == 1 {
            errors.remove(0)
        } else {
            Self::Multiple(errors)
        }
    }

    /// The individual errors, in the order they were reported.
    pub fn errors(&self) -> Vec<&LoxError> {
        match self {
            Self::Multiple(errors) => errors.iter().flat_map(LoxError::errors).collect(),
            single => vec![single],
        }
    }

    // sysexits.h: EX_DATAERR for bad input, EX_SOFTWARE for failures while running
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Scan(_) | Self::Parse(_) | Self::Binding(_) => 65,
            Self::Runtime(_) => 70,
            Self::Multiple(errors) => errors.iter().map(LoxError::exit_code).max().unwrap_or(65),
        }
    }
}

fn join_lines(errors: &[LoxError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_flatten_and_keep_the_worst_exit_code() {
        let single = LoxError::from_batch(vec![LoxError::from(BindingError::ThisOutsideClass { line: 1 })]);
        assert!(matches!(single, LoxError::Binding(_)));

        let batch = LoxError::from_batch(vec![
            LoxError::from(BindingError::ReturnOutsideFunction { line: 1 }),
            LoxError::from(RuntimeError::DivisionByZero { line: 2 }),
        ]);
        assert_eq!(batch.errors().len(), 2);
        assert_eq!(batch.exit_code(), 70);
        assert_eq!(
            batch.to_string(),
            "[line 1] Error at 'return': Can't return from top-level code.\n[line 2] Can't divide by zero."
        );
    }
}
