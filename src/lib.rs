pub mod error;
pub mod expr;
pub mod parser;
pub mod scanner;
pub mod stmt;
pub mod treewalk;

pub use treewalk::{execute, execute_repl_line, Interpreter};
