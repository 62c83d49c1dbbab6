use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::RuntimeError;

use super::value::Value;

/// A list value. Cloning shares the underlying storage, so mutation is visible through every alias.
#[derive(Clone)]
pub struct LoxList(Rc<RefCell<Vec<Value>>>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMethodKind {
    Append,
    Delete,
}

impl ListMethodKind {
    pub fn from_name(name: &str) -> Option<ListMethodKind> {
        match name {
            "append" => Some(Self::Append),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::Delete => "delete",
        }
    }

    pub fn arity(&self) -> usize {
        1
    }
}

impl LoxList {
    pub fn new(items: Vec<Value>) -> LoxList {
        LoxList(Rc::new(RefCell::new(items)))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn ptr_eq(&self, other: &LoxList) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn get(&self, index: &Value, line: u32) -> Result<Value, RuntimeError> {
        let position = self.checked_index(index, line)?;
        Ok(self.0.borrow()[position].clone())
    }

    pub fn append(&self, value: Value) {
        self.0.borrow_mut().push(value);
    }

    pub fn delete(&self, index: &Value, line: u32) -> Result<Value, RuntimeError> {
        let position = self.checked_index(index, line)?;
        Ok(self.0.borrow_mut().remove(position))
    }

    pub fn call_method(&self, kind: ListMethodKind, arguments: &[Value], line: u32) -> Result<Value, RuntimeError> {
        match (kind, arguments) {
            (ListMethodKind::Append, [value]) => {
                self.append(value.clone());
                Ok(Value::Nil)
            }
            (ListMethodKind::Delete, [index]) => self.delete(index, line),
            _ => Err(RuntimeError::Arity {
                expected: kind.arity(),
                found: arguments.len(),
                line,
            }),
        }
    }

    // Indices must be integral numbers inside [0, len)
    fn checked_index(&self, index: &Value, line: u32) -> Result<usize, RuntimeError> {
        let number = match index {
            Value::Number(number) => *number,
            other => {
                return Err(RuntimeError::TypeMismatch {
                    message: format!("List index must be a number, got {}.", other.type_name()),
                    line,
                })
            }
        };
        let len = self.len();
        if number.fract() != 0.0 || number < 0.0 || number >= len as f64 {
            return Err(RuntimeError::Index {
                index: number,
                len,
                line,
            });
        }
        Ok(number as usize)
    }

    fn write_nested(&self, f: &mut fmt::Formatter<'_>, open: &mut Vec<*const RefCell<Vec<Value>>>) -> fmt::Result {
        // a list reachable from itself is printed as [...] at the point it repeats
        let identity = Rc::as_ptr(&self.0);
        if open.contains(&identity) {
            return write!(f, "[...]");
        }
        open.push(identity);
        write!(f, "[")?;
        for (i, item) in self.0.borrow().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match item {
                Value::List(inner) => inner.write_nested(f, open)?,
                other => write!(f, "{other}")?,
            }
        }
        open.pop();
        write!(f, "]")
    }
}

impl fmt::Display for LoxList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_nested(f, &mut Vec::new())
    }
}

impl fmt::Debug for LoxList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoxList").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(items: &[f64]) -> LoxList {
        LoxList::new(items.iter().map(|n| Value::from(*n)).collect())
    }

    #[test]
    fn index_bounds() {
        let list = numbers(&[10.0]);
        assert_eq!(list.get(&Value::from(0.0), 1), Ok(Value::from(10.0)));
        assert!(matches!(
            list.get(&Value::from(5.0), 1),
            Err(RuntimeError::Index { len: 1, .. })
        ));
        assert!(matches!(list.get(&Value::from(-1.0), 1), Err(RuntimeError::Index { .. })));
        assert!(matches!(list.get(&Value::from(0.5), 1), Err(RuntimeError::Index { .. })));
        assert!(matches!(
            list.get(&Value::from("0"), 1),
            Err(RuntimeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn aliases_share_mutation() {
        let list = numbers(&[1.0]);
        let alias = list.clone();
        alias.append(Value::from(2.0));
        assert_eq!(list.len(), 2);

        let independent = numbers(&[1.0]);
        assert_eq!(independent.len(), 1);
        assert!(!independent.ptr_eq(&list));
    }

    #[test]
    fn delete_returns_removed_item() {
        let list = numbers(&[1.0, 2.0, 3.0]);
        let removed = list.call_method(ListMethodKind::Delete, &[Value::from(1.0)], 1);
        assert_eq!(removed, Ok(Value::from(2.0)));
        assert_eq!(list.to_string(), "[1, 3]");
    }

    #[test]
    fn display_nested_and_cyclic() {
        let inner = numbers(&[2.0]);
        let outer = LoxList::new(vec![Value::from(1.0), Value::List(inner), Value::from("s")]);
        assert_eq!(outer.to_string(), "[1, [2], s]");

        let cyclic = numbers(&[1.0]);
        cyclic.append(Value::List(cyclic.clone()));
        assert_eq!(cyclic.to_string(), "[1, [...]]");
    }
}
