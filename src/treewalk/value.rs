use std::fmt;
use std::rc::Rc;

use crate::expr::LiteralValue;

use super::callable::Callable;
use super::class::{Class, Instance};
use super::list::LoxList;

#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Boolean(bool),
    Number(f64),
    String(String),
    List(LoxList),
    Callable(Callable),
    Instance(Rc<Instance>),
    Class(Rc<Class>),
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Nil => false,
            Self::Boolean(value) => *value,
            _ => true,
        }
    }

    // Classes are stored as their own variant but are invoked like any other callable
    pub fn as_callable(&self) -> Option<Callable> {
        match self {
            Self::Callable(callable) => Some(callable.clone()),
            Self::Class(class) => Some(Callable::Class(class.clone())),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Callable(_) => "function",
            Self::Instance(_) => "instance",
            Self::Class(_) => "class",
        }
    }
}

/// Value types compare by content, reference types by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Boolean(left), Self::Boolean(right)) => left == right,
            (Self::Number(left), Self::Number(right)) => left == right,
            (Self::String(left), Self::String(right)) => left == right,
            (Self::List(left), Self::List(right)) => left.ptr_eq(right),
            (Self::Callable(left), Self::Callable(right)) => left.ptr_eq(right),
            (Self::Instance(left), Self::Instance(right)) => Rc::ptr_eq(left, right),
            (Self::Class(left), Self::Class(right)) => Rc::ptr_eq(left, right),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => write!(f, "nil"),
            Self::Boolean(value) => write!(f, "{value}"),
            // f64 display is already the shortest round-trip form and drops a zero fraction
            Self::Number(value) => write!(f, "{value}"),
            Self::String(value) => write!(f, "{value}"),
            Self::List(list) => write!(f, "{list}"),
            Self::Callable(callable) => write!(f, "{callable}"),
            Self::Instance(instance) => write!(f, "{} instance", instance.class.name),
            Self::Class(class) => write!(f, "{}", class.name),
        }
    }
}

impl From<LiteralValue> for Value {
    fn from(value: LiteralValue) -> Value {
        match value {
            LiteralValue::Boolean(value) => Value::Boolean(value),
            LiteralValue::Nil => Value::Nil,
            LiteralValue::Number(value) => Value::Number(value),
            LiteralValue::String(value) => Value::String(value),
        }
    }
}

impl From<bool> for Value {
    fn from(boolean: bool) -> Value {
        Value::Boolean(boolean)
    }
}

impl From<f64> for Value {
    fn from(number: f64) -> Value {
        Value::Number(number)
    }
}

impl From<String> for Value {
    fn from(string: String) -> Value {
        Value::String(string)
    }
}

impl From<&str> for Value {
    fn from(string: &str) -> Value {
        Value::String(string.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::from(false).is_truthy());
        assert!(Value::from(0.0).is_truthy());
        assert!(Value::from("").is_truthy());
        assert!(Value::List(LoxList::new(Vec::new())).is_truthy());
    }

    #[test]
    fn display() {
        assert_eq!(Value::from(55.0).to_string(), "55");
        assert_eq!(Value::from(2.5).to_string(), "2.5");
        assert_eq!(Value::from(-0.1).to_string(), "-0.1");
        assert_eq!(Value::Nil.to_string(), "nil");
        assert_eq!(Value::from(true).to_string(), "true");
        assert_eq!(Value::from("raw text").to_string(), "raw text");
    }

    #[test]
    fn equality() {
        assert_eq!(Value::Nil, Value::Nil);
        assert_eq!(Value::from(1.0), Value::from(1.0));
        assert_eq!(Value::from("a"), Value::from("a"));
        assert_ne!(Value::from(1.0), Value::from("1"));
        assert_ne!(Value::Nil, Value::from(false));

        let list = LoxList::new(vec![Value::from(1.0)]);
        assert_eq!(Value::List(list.clone()), Value::List(list));
        assert_ne!(
            Value::List(LoxList::new(vec![Value::from(1.0)])),
            Value::List(LoxList::new(vec![Value::from(1.0)]))
        );
    }
}
