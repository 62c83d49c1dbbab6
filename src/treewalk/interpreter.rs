use std::collections::HashMap;
use std::io::Write;
use std::mem;
use std::rc::Rc;
use std::result;

use tracing::{debug, trace};

use crate::error::RuntimeError;
use crate::expr::{Expr, ExprId, LiteralValue};
use crate::scanner::{Token, TokenType};
use crate::stmt::{FunctionDecl, Stmt};

use super::callable::{BoundMethod, Callable, Function, NativeFunction};
use super::class::{Class, INITIALIZER_METHOD};
use super::environment::{assign_at, assign_global, get_at, get_global, EnvRef, Environment};
use super::list::{ListMethodKind, LoxList};
use super::resolver::{Resolution, ResolutionTable};
use super::stdlib;
use super::value::Value;

pub const DEFAULT_MAX_CALL_DEPTH: usize = 1024;
// grow the host stack when less than RED_ZONE remains, STACK_PER_RECURSION at a time
const RED_ZONE: usize = 100 * 1024;
const STACK_PER_RECURSION: usize = 1024 * 1024;

type ValueResult = result::Result<Value, RuntimeError>;
type StatementResult = result::Result<Flow, RuntimeError>;

/// How a statement finished. A `return` travels up through enclosing statements as a value, not as an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    Return(Value),
}

pub struct Interpreter<'a> {
    globals: EnvRef,
    environment: EnvRef,
    locals: ResolutionTable,
    call_depth: usize,
    max_call_depth: usize,
    pub output_writer: &'a mut dyn Write,
}

impl<'a> Interpreter<'a> {
    pub fn new(output_writer: &'a mut dyn Write) -> Interpreter<'a> {
        let globals = Environment::new_global();
        let mut interp = Interpreter {
            environment: Rc::clone(&globals),
            globals,
            locals: ResolutionTable::default(),
            call_depth: 0,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            output_writer,
        };
        for native in stdlib::standard_library() {
            interp.define_native(native);
        }
        interp
    }

    /// Run a resolved program. Globals persist between calls, so this can be fed one REPL entry at a time.
    pub fn interpret(&mut self, statements: &[Stmt], table: ResolutionTable) -> result::Result<(), RuntimeError> {
        debug!(statements = statements.len(), entries = table.len(), "interpreting program");
        self.locals.extend(table);
        for statement in statements {
            if let Err(error) = execute_statement(statement, self) {
                debug!(%error, "runtime error, aborting program");
                return Err(error);
            }
        }
        Ok(())
    }

    pub fn define_native(&mut self, native: NativeFunction) {
        let name = native.name.clone();
        self.globals
            .borrow_mut()
            .define(&name, Value::Callable(Callable::Native(Rc::new(native))));
    }

    pub fn set_max_call_depth(&mut self, max_call_depth: usize) {
        self.max_call_depth = max_call_depth;
    }

    fn resolution(&self, id: ExprId, name: &Token) -> Resolution {
        self.locals.get(id).unwrap_or_else(|| {
            panic!(
                "No resolution recorded for '{}' at line {}.",
                name.lexeme, name.line
            )
        }) // panic here because this would indicate a bug in the resolver
    }
}

/// Execute statements in `frame`, restoring the previously active frame afterwards even on error.
pub fn execute_block(statements: &[Stmt], frame: EnvRef, interp: &mut Interpreter) -> StatementResult {
    let previous = mem::replace(&mut interp.environment, frame);
    let result = execute_statements(statements, interp);
    interp.environment = previous;
    result
}

fn execute_statements(statements: &[Stmt], interp: &mut Interpreter) -> StatementResult {
    for statement in statements {
        if let Flow::Return(value) = execute_statement(statement, interp)? {
            return Ok(Flow::Return(value));
        }
    }
    Ok(Flow::Normal)
}

fn execute_statement(statement: &Stmt, interp: &mut Interpreter) -> StatementResult {
    match statement {
        Stmt::Block { statements } => {
            let frame = Environment::with_enclosing(&interp.environment);
            execute_block(statements, frame, interp)
        }
        Stmt::Class {
            name,
            superclass,
            methods,
        } => class_statement(name, superclass.as_ref(), methods, interp),
        Stmt::Expression { expression } => {
            evaluate(expression, interp)?;
            Ok(Flow::Normal)
        }
        Stmt::Function(declaration) => function_statement(declaration, interp),
        Stmt::If {
            condition,
            then_branch,
            else_branch,
        } => if_statement(condition, then_branch, else_branch.as_deref(), interp),
        Stmt::Print { expression } => print_statement(expression, interp),
        Stmt::Return { value, .. } => return_statement(value.as_ref(), interp),
        Stmt::Var { name, initializer } => var_statement(name, initializer, interp),
        Stmt::While { condition, body } => while_statement(condition, body, interp),
    }
}

fn class_statement(
    name: &Token,
    superclass: Option<&Expr>,
    methods: &[Rc<FunctionDecl>],
    interp: &mut Interpreter,
) -> StatementResult {
    let superclass = match superclass {
        Some(expression) => match evaluate(expression, interp)? {
            Value::Class(class) => Some(class),
            _ => return Err(RuntimeError::type_mismatch("Superclass must be a class.", name.line)),
        },
        None => None,
    };

    let method_closure = match &superclass {
        Some(class) => {
            let frame = Environment::with_enclosing(&interp.environment);
            frame.borrow_mut().define("super", Value::Class(Rc::clone(class)));
            frame
        }
        None => Rc::clone(&interp.environment),
    };

    let mut method_table = HashMap::new();
    for method in methods {
        let is_initializer = method.name.lexeme == INITIALIZER_METHOD;
        let function = Function::new(Rc::clone(method), Rc::clone(&method_closure), is_initializer);
        method_table.insert(method.name.lexeme.clone(), Rc::new(function));
    }

    debug!(
        class = %name.lexeme,
        superclass = superclass.as_ref().map(|class| class.name.as_str()),
        methods = method_table.len(),
        "declared class"
    );
    let class = Class::new(name.lexeme.clone(), superclass, method_table);
    interp
        .environment
        .borrow_mut()
        .define(&name.lexeme, Value::Class(Rc::new(class)));
    Ok(Flow::Normal)
}

fn function_statement(declaration: &Rc<FunctionDecl>, interp: &mut Interpreter) -> StatementResult {
    let function = Function::new(Rc::clone(declaration), Rc::clone(&interp.environment), false);
    interp.environment.borrow_mut().define(
        &declaration.name.lexeme,
        Value::Callable(Callable::Function(Rc::new(function))),
    );
    Ok(Flow::Normal)
}

fn if_statement(
    condition: &Expr,
    then_branch: &Stmt,
    else_branch: Option<&Stmt>,
    interp: &mut Interpreter,
) -> StatementResult {
    if evaluate(condition, interp)?.is_truthy() {
        execute_statement(then_branch, interp)
    } else if let Some(else_statement) = else_branch {
        execute_statement(else_statement, interp)
    } else {
        Ok(Flow::Normal)
    }
}

fn print_statement(expression: &Expr, interp: &mut Interpreter) -> StatementResult {
    let result = evaluate(expression, interp)?;
    writeln!(interp.output_writer, "{result}").map_err(|error| RuntimeError::Output {
        message: error.to_string(),
    })?;
    Ok(Flow::Normal)
}

fn return_statement(value: Option<&Expr>, interp: &mut Interpreter) -> StatementResult {
    let return_value = match value {
        Some(expression) => evaluate(expression, interp)?,
        None => Value::Nil,
    };
    Ok(Flow::Return(return_value))
}

fn var_statement(name: &Token, initializer: &Expr, interp: &mut Interpreter) -> StatementResult {
    let result = evaluate(initializer, interp)?;
    interp.environment.borrow_mut().define(&name.lexeme, result);
    Ok(Flow::Normal)
}

fn while_statement(condition: &Expr, body: &Stmt, interp: &mut Interpreter) -> StatementResult {
    while evaluate(condition, interp)?.is_truthy() {
        if let Flow::Return(value) = execute_statement(body, interp)? {
            return Ok(Flow::Return(value));
        }
    }
    Ok(Flow::Normal)
}

fn evaluate(expression: &Expr, interp: &mut Interpreter) -> ValueResult {
    match expression {
        Expr::Assign { id, name, value } => evaluate_assign(*id, name, value, interp),
        Expr::Binary { left, operator, right } => evaluate_binary(left, operator, right, interp),
        Expr::Call {
            callee,
            paren,
            arguments,
        } => evaluate_call(callee, paren, arguments, interp),
        Expr::Get { object, name } => evaluate_get(object, name, interp),
        Expr::Grouping { expression } => evaluate(expression, interp),
        Expr::Index { list, bracket, index } => evaluate_index(list, bracket, index, interp),
        Expr::List { elements, .. } => evaluate_list(elements, interp),
        Expr::Literal { value } => evaluate_literal(value),
        Expr::Logical { left, operator, right } => evaluate_logical(left, operator, right, interp),
        Expr::Set { object, name, value } => evaluate_set(object, name, value, interp),
        Expr::Super { id, keyword, method } => evaluate_super(*id, keyword, method, interp),
        Expr::Ternary {
            condition,
            then_branch,
            else_branch,
        } => {
            if evaluate(condition, interp)?.is_truthy() {
                evaluate(then_branch, interp)
            } else {
                evaluate(else_branch, interp)
            }
        }
        Expr::This { id, keyword } => look_up_variable(*id, keyword, interp),
        Expr::Unary { operator, right } => evaluate_unary(operator, right, interp),
        Expr::Variable { id, name } => look_up_variable(*id, name, interp),
    }
}

fn evaluate_assign(id: ExprId, name: &Token, value: &Expr, interp: &mut Interpreter) -> ValueResult {
    let result = evaluate(value, interp)?;
    match interp.resolution(id, name) {
        Resolution::Local(distance) => assign_at(&interp.environment, distance, &name.lexeme, result.clone()),
        Resolution::Global => assign_global(&interp.globals, name, result.clone())?,
    }
    Ok(result)
}

fn evaluate_binary(left: &Expr, operator: &Token, right: &Expr, interp: &mut Interpreter) -> ValueResult {
    let left_evaluated = evaluate(left, interp)?;
    let right_evaluated = evaluate(right, interp)?;

    let evaluated = match operator.token_type {
        TokenType::Plus => match (left_evaluated, right_evaluated) {
            (Value::Number(left), Value::Number(right)) => Value::Number(left + right),
            (Value::String(left), Value::String(right)) => Value::String(left + &right),
            _ => {
                return Err(RuntimeError::type_mismatch(
                    "Operands must be two numbers or two strings.",
                    operator.line,
                ))
            }
        },
        TokenType::EqualEqual => Value::Boolean(left_evaluated == right_evaluated),
        TokenType::BangEqual => Value::Boolean(left_evaluated != right_evaluated),
        _ => {
            let (left_number, right_number) = number_operands(&left_evaluated, &right_evaluated, operator)?;
            match operator.token_type {
                TokenType::Minus => Value::Number(left_number - right_number),
                TokenType::Star => Value::Number(left_number * right_number),
                TokenType::Slash => {
                    if right_number == 0.0 {
                        return Err(RuntimeError::DivisionByZero { line: operator.line });
                    }
                    Value::Number(left_number / right_number)
                }
                TokenType::Greater => Value::Boolean(left_number > right_number),
                TokenType::GreaterEqual => Value::Boolean(left_number >= right_number),
                TokenType::Less => Value::Boolean(left_number < right_number),
                TokenType::LessEqual => Value::Boolean(left_number <= right_number),
                // unhandled case here indicates a bug in the parser or interpreter
                _ => panic!("Unhandled binary operation type: {:?}", operator.token_type),
            }
        }
    };
    Ok(evaluated)
}

fn evaluate_call(callee: &Expr, paren: &Token, arguments: &[Expr], interp: &mut Interpreter) -> ValueResult {
    let callee = evaluate(callee, interp)?;
    let mut evaluated_args = Vec::with_capacity(arguments.len());
    for argument in arguments {
        evaluated_args.push(evaluate(argument, interp)?);
    }

    let callable = callee
        .as_callable()
        .ok_or_else(|| RuntimeError::type_mismatch("Can only call functions and classes.", paren.line))?;
    if evaluated_args.len() != callable.arity() {
        return Err(RuntimeError::Arity {
            expected: callable.arity(),
            found: evaluated_args.len(),
            line: paren.line,
        });
    }

    run_callable(&callable, evaluated_args, paren.line, interp)
}

fn run_callable(callable: &Callable, arguments: Vec<Value>, line: u32, interp: &mut Interpreter) -> ValueResult {
    if interp.call_depth >= interp.max_call_depth {
        return Err(RuntimeError::StackExhausted {
            depth: interp.max_call_depth,
            line,
        });
    }

    interp.call_depth += 1;
    trace!(callee = %callable, depth = interp.call_depth, line, "call");
    let result = stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, || callable.call(arguments, line, interp));
    interp.call_depth -= 1;
    result
}

fn evaluate_get(object: &Expr, name: &Token, interp: &mut Interpreter) -> ValueResult {
    match evaluate(object, interp)? {
        Value::Instance(instance) => instance.get(name),
        Value::List(list) => match ListMethodKind::from_name(&name.lexeme) {
            Some(kind) => Ok(Value::Callable(Callable::ListMethod { list, kind })),
            None => Err(RuntimeError::UndefinedProperty {
                name: name.lexeme.clone(),
                line: name.line,
            }),
        },
        _ => Err(RuntimeError::type_mismatch("Only instances have properties.", name.line)),
    }
}

fn evaluate_index(list: &Expr, bracket: &Token, index: &Expr, interp: &mut Interpreter) -> ValueResult {
    let list = evaluate(list, interp)?;
    let index = evaluate(index, interp)?;
    match list {
        Value::List(list) => list.get(&index, bracket.line),
        other => Err(RuntimeError::TypeMismatch {
            message: format!("Can only index lists, got {}.", other.type_name()),
            line: bracket.line,
        }),
    }
}

fn evaluate_list(elements: &[Expr], interp: &mut Interpreter) -> ValueResult {
    let mut items = Vec::with_capacity(elements.len());
    for element in elements {
        items.push(evaluate(element, interp)?);
    }
    Ok(Value::List(LoxList::new(items)))
}

fn evaluate_literal(value: &LiteralValue) -> ValueResult {
    Ok(Value::from(value.clone()))
}

fn evaluate_logical(left: &Expr, operator: &Token, right: &Expr, interp: &mut Interpreter) -> ValueResult {
    let left_evaluated = evaluate(left, interp)?;

    // short circuit if possible
    match operator.token_type {
        TokenType::Or if left_evaluated.is_truthy() => Ok(left_evaluated),
        TokenType::And if !left_evaluated.is_truthy() => Ok(left_evaluated),
        TokenType::Or | TokenType::And => evaluate(right, interp),
        // unhandled case here indicates a bug in the parser or interpreter
        _ => panic!("Unhandled logical operator: {:?}", operator.token_type),
    }
}

fn evaluate_set(object: &Expr, name: &Token, value: &Expr, interp: &mut Interpreter) -> ValueResult {
    match evaluate(object, interp)? {
        Value::Instance(instance) => {
            let result = evaluate(value, interp)?;
            instance.set(name, result.clone());
            Ok(result)
        }
        Value::List(_) => Err(RuntimeError::type_mismatch("Can't set properties on lists.", name.line)),
        _ => Err(RuntimeError::type_mismatch("Only instances have fields.", name.line)),
    }
}

fn evaluate_super(id: ExprId, keyword: &Token, method: &Token, interp: &mut Interpreter) -> ValueResult {
    let distance = match interp.resolution(id, keyword) {
        Resolution::Local(distance) => distance,
        // panic here because this would indicate a bug in the resolver
        Resolution::Global => panic!("'super' at line {} resolved as a global.", keyword.line),
    };

    // the frame binding 'this' always sits directly inside the one binding 'super'
    let superclass = match get_at(&interp.environment, distance, "super") {
        Value::Class(class) => class,
        other => panic!("'super' bound to non-class value: {other}"),
    };
    let receiver = match get_at(&interp.environment, distance - 1, "this") {
        Value::Instance(instance) => instance,
        other => panic!("'this' bound to non-instance value: {other}"),
    };

    match superclass.find_method(&method.lexeme) {
        Some(function) => Ok(Value::Callable(Callable::BoundMethod(Rc::new(BoundMethod::new(
            receiver, function,
        ))))),
        None => Err(RuntimeError::UndefinedProperty {
            name: method.lexeme.clone(),
            line: method.line,
        }),
    }
}

fn evaluate_unary(operator: &Token, right: &Expr, interp: &mut Interpreter) -> ValueResult {
    let operand = evaluate(right, interp)?;
    match operator.token_type {
        TokenType::Bang => Ok(Value::Boolean(!operand.is_truthy())),
        TokenType::Minus => match operand {
            Value::Number(number) => Ok(Value::Number(-number)),
            _ => Err(RuntimeError::type_mismatch("Operand must be a number.", operator.line)),
        },
        // unhandled case here indicates a bug in the parser or interpreter
        _ => panic!("Unary expression not implemented in interpreter: {:?}", operator),
    }
}

fn look_up_variable(id: ExprId, name: &Token, interp: &mut Interpreter) -> ValueResult {
    match interp.resolution(id, name) {
        Resolution::Local(distance) => Ok(get_at(&interp.environment, distance, &name.lexeme)),
        Resolution::Global => get_global(&interp.globals, name),
    }
}

fn number_operands(left: &Value, right: &Value, operator: &Token) -> result::Result<(f64, f64), RuntimeError> {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => Ok((*left, *right)),
        _ => Err(RuntimeError::type_mismatch("Operands must be numbers.", operator.line)),
    }
}
