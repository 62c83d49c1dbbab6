use std::fmt;
use std::rc::Rc;

use crate::error::RuntimeError;
use crate::stmt::FunctionDecl;

use super::class::{Class, Instance};
use super::environment::{EnvRef, Environment};
use super::interpreter::{execute_block, Flow, Interpreter};
use super::list::{ListMethodKind, LoxList};
use super::value::Value;

pub type NativeResult = Result<Value, String>;

/// Everything that can appear in call position. The set is closed, so every call site matches exhaustively.
#[derive(Debug, Clone)]
pub enum Callable {
    Function(Rc<Function>),
    BoundMethod(Rc<BoundMethod>),
    Native(Rc<NativeFunction>),
    Class(Rc<Class>),
    ListMethod { list: LoxList, kind: ListMethodKind },
}

impl Callable {
    pub fn arity(&self) -> usize {
        match self {
            Self::Function(function) => function.arity(),
            Self::BoundMethod(method) => method.method.arity(),
            Self::Native(native) => native.arity,
            Self::Class(class) => class.arity(),
            Self::ListMethod { kind, .. } => kind.arity(),
        }
    }

    /// Invoke with already evaluated arguments. The caller has checked the argument count against `arity`.
    pub fn call(&self, arguments: Vec<Value>, line: u32, interp: &mut Interpreter) -> Result<Value, RuntimeError> {
        match self {
            Self::Function(function) => function.invoke(&function.closure, arguments, interp),
            Self::BoundMethod(method) => method.invoke(arguments, interp),
            Self::Native(native) => (native.func)(&arguments).map_err(|message| RuntimeError::Native {
                name: native.name.clone(),
                message,
                line,
            }),
            Self::Class(class) => {
                let instance = Rc::new(Instance::new(Rc::clone(class)));
                if let Some(initializer) = class.initializer() {
                    BoundMethod::new(Rc::clone(&instance), initializer).invoke(arguments, interp)?;
                }
                Ok(Value::Instance(instance))
            }
            Self::ListMethod { list, kind } => list.call_method(*kind, &arguments, line),
        }
    }

    pub fn ptr_eq(&self, other: &Callable) -> bool {
        match (self, other) {
            (Self::Function(left), Self::Function(right)) => Rc::ptr_eq(left, right),
            (Self::BoundMethod(left), Self::BoundMethod(right)) => Rc::ptr_eq(left, right),
            (Self::Native(left), Self::Native(right)) => Rc::ptr_eq(left, right),
            (Self::Class(left), Self::Class(right)) => Rc::ptr_eq(left, right),
            (
                Self::ListMethod { list, kind },
                Self::ListMethod {
                    list: other_list,
                    kind: other_kind,
                },
            ) => list.ptr_eq(other_list) && kind == other_kind,
            _ => false,
        }
    }
}

impl fmt::Display for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(function) => write!(f, "<fn {}>", function.name()),
            Self::BoundMethod(method) => write!(f, "<fn {}>", method.method.name()),
            Self::Native(_) => write!(f, "<native fn>"),
            Self::Class(class) => write!(f, "{}", class.name),
            Self::ListMethod { kind, .. } => write!(f, "<list method {}>", kind.name()),
        }
    }
}

/// A user function together with the frame that was active where it was declared.
pub struct Function {
    declaration: Rc<FunctionDecl>,
    closure: EnvRef,
    is_initializer: bool,
}

impl Function {
    pub fn new(declaration: Rc<FunctionDecl>, closure: EnvRef, is_initializer: bool) -> Function {
        Function {
            declaration,
            closure,
            is_initializer,
        }
    }

    pub fn arity(&self) -> usize {
        self.declaration.params.len()
    }

    pub fn name(&self) -> &str {
        &self.declaration.name.lexeme
    }

    // The body runs directly in the parameter frame, there is no extra block frame
    fn invoke(&self, closure: &EnvRef, arguments: Vec<Value>, interp: &mut Interpreter) -> Result<Value, RuntimeError> {
        let frame = Environment::with_enclosing(closure);
        for (param, argument) in self.declaration.params.iter().zip(arguments) {
            frame.borrow_mut().define(&param.lexeme, argument);
        }

        match execute_block(&self.declaration.body, frame, interp)? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::Nil),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name())
            .field("arity", &self.arity())
            .field("is_initializer", &self.is_initializer)
            .finish()
    }
}

/// A method paired with the instance it was accessed through.
#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Rc<Instance>,
    pub method: Rc<Function>,
}

impl BoundMethod {
    pub fn new(receiver: Rc<Instance>, method: Rc<Function>) -> BoundMethod {
        BoundMethod { receiver, method }
    }

    fn invoke(&self, arguments: Vec<Value>, interp: &mut Interpreter) -> Result<Value, RuntimeError> {
        // 'this' lives in its own frame between the method closure (which may hold 'super') and the parameters
        let this_frame = Environment::with_enclosing(&self.method.closure);
        this_frame
            .borrow_mut()
            .define("this", Value::Instance(Rc::clone(&self.receiver)));

        let result = self.method.invoke(&this_frame, arguments, interp)?;
        if self.method.is_initializer {
            Ok(Value::Instance(Rc::clone(&self.receiver)))
        } else {
            Ok(result)
        }
    }
}

pub struct NativeFunction {
    pub arity: usize,
    pub func: fn(arguments: &[Value]) -> NativeResult,
    pub name: String,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("arity", &self.arity)
            .field("func", &"NATIVE_FUNCTION")
            .field("name", &self.name)
            .finish()
    }
}
