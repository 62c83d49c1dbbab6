use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::RuntimeError;
use crate::scanner::Token;

use super::callable::{BoundMethod, Callable, Function};
use super::value::Value;

pub const INITIALIZER_METHOD: &str = "init";

pub struct Class {
    pub name: String,
    pub superclass: Option<Rc<Class>>,
    methods: HashMap<String, Rc<Function>>,
}

impl Class {
    pub fn new(name: String, superclass: Option<Rc<Class>>, methods: HashMap<String, Rc<Function>>) -> Class {
        Class {
            name,
            superclass,
            methods,
        }
    }

    /// Looks in this class first, then up the superclass chain.
    pub fn find_method(&self, name: &str) -> Option<Rc<Function>> {
        let mut class = self;
        loop {
            if let Some(method) = class.methods.get(name) {
                return Some(Rc::clone(method));
            }
            class = class.superclass.as_deref()?;
        }
    }

    pub fn initializer(&self) -> Option<Rc<Function>> {
        self.find_method(INITIALIZER_METHOD)
    }

    /// A class is called with the arguments of its initializer, or none if it has no initializer.
    pub fn arity(&self) -> usize {
        self.initializer().map_or(0, |init| init.arity())
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<&String> = self.methods.keys().collect();
        methods.sort();
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("superclass", &self.superclass.as_ref().map(|class| &class.name))
            .field("methods", &methods)
            .finish()
    }
}

pub struct Instance {
    pub class: Rc<Class>,
    fields: RefCell<HashMap<String, Value>>,
}

impl Instance {
    pub fn new(class: Rc<Class>) -> Instance {
        Instance {
            class,
            fields: RefCell::new(HashMap::new()),
        }
    }

    // fields take precedence over and can shadow class methods
    pub fn get(self: &Rc<Self>, name: &Token) -> Result<Value, RuntimeError> {
        if let Some(value) = self.fields.borrow().get(&name.lexeme) {
            return Ok(value.clone());
        }

        match self.class.find_method(&name.lexeme) {
            Some(method) => Ok(Value::Callable(Callable::BoundMethod(Rc::new(BoundMethod::new(
                Rc::clone(self),
                method,
            ))))),
            None => Err(RuntimeError::UndefinedProperty {
                name: name.lexeme.clone(),
                line: name.line,
            }),
        }
    }

    pub fn set(&self, name: &Token, value: Value) {
        self.fields.borrow_mut().insert(name.lexeme.clone(), value);
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = self.fields.borrow();
        let mut names: Vec<&String> = fields.keys().collect();
        names.sort();
        f.debug_struct("Instance")
            .field("class", &self.class.name)
            .field("fields", &names)
            .finish()
    }
}
