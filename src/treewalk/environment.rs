use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::RuntimeError;
use crate::scanner::Token;

use super::value::Value;

pub type EnvRef = Rc<RefCell<Environment>>;

/// One scope frame. Frames are shared: every closure declared in a frame keeps it alive.
pub struct Environment {
    values: HashMap<String, Value>,
    enclosing: Option<EnvRef>,
}

impl Environment {
    pub fn new_global() -> EnvRef {
        Rc::new(RefCell::new(Environment {
            values: HashMap::new(),
            enclosing: None,
        }))
    }

    pub fn with_enclosing(enclosing: &EnvRef) -> EnvRef {
        Rc::new(RefCell::new(Environment {
            values: HashMap::new(),
            enclosing: Some(Rc::clone(enclosing)),
        }))
    }

    /// Declaring always targets this frame and silently replaces an existing binding.
    pub fn define(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    /// Name lookup in this frame only. Used for globals, where references are not resolved statically.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }

    /// Returns false when the name was never declared in this frame.
    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        match self.values.get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

// Walk exactly `distance` enclosing links.
fn ancestor(env: &EnvRef, distance: usize) -> EnvRef {
    let mut current = Rc::clone(env);
    for _ in 0..distance {
        let enclosing = current
            .borrow()
            .enclosing
            .clone()
            .unwrap_or_else(|| panic!("Resolved distance {distance} walks past the global scope.")); // panic here because this would indicate a bug in the resolver
        current = enclosing;
    }
    current
}

pub fn get_at(env: &EnvRef, distance: usize, name: &str) -> Value {
    let frame = ancestor(env, distance);
    let value = frame.borrow().get(name);
    value.unwrap_or_else(|| panic!("Resolved variable ({name}) missing from scope at distance {distance}.")) // panic here because this would indicate a bug in the resolver
}

pub fn assign_at(env: &EnvRef, distance: usize, name: &str, value: Value) {
    let frame = ancestor(env, distance);
    if !frame.borrow_mut().assign(name, value) {
        panic!("Resolved assignment target ({name}) missing from scope at distance {distance}."); // panic here because this would indicate a bug in the resolver
    }
}

pub fn get_global(globals: &EnvRef, name: &Token) -> Result<Value, RuntimeError> {
    globals.borrow().get(&name.lexeme).ok_or_else(|| undefined_variable(name))
}

pub fn assign_global(globals: &EnvRef, name: &Token, value: Value) -> Result<(), RuntimeError> {
    if globals.borrow_mut().assign(&name.lexeme, value) {
        Ok(())
    } else {
        Err(undefined_variable(name))
    }
}

fn undefined_variable(name: &Token) -> RuntimeError {
    RuntimeError::UndefinedVariable {
        name: name.lexeme.clone(),
        line: name.line,
    }
}

impl fmt::Debug for Environment {
    // Values may hold closures over this very frame, so only names are printed
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.values.keys().collect();
        names.sort();
        f.debug_struct("Environment")
            .field("names", &names)
            .field("is_global", &self.enclosing.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_at_walks_exact_distance() {
        let global = Environment::new_global();
        global.borrow_mut().define("a", Value::from("global"));
        let outer = Environment::with_enclosing(&global);
        outer.borrow_mut().define("a", Value::from("outer"));
        let inner = Environment::with_enclosing(&outer);

        assert_eq!(get_at(&inner, 1, "a"), Value::from("outer"));
        assert_eq!(get_at(&inner, 2, "a"), Value::from("global"));

        // a later binding in a closer frame does not change what a fixed distance reads
        inner.borrow_mut().define("a", Value::from("inner"));
        assert_eq!(get_at(&inner, 2, "a"), Value::from("global"));
    }

    #[test]
    fn assign_at_is_visible_through_shared_frames() {
        let global = Environment::new_global();
        let frame = Environment::with_enclosing(&global);
        frame.borrow_mut().define("count", Value::from(1.0));
        let closure_view = Rc::clone(&frame);
        let child = Environment::with_enclosing(&frame);

        assign_at(&child, 1, "count", Value::from(2.0));
        assert_eq!(closure_view.borrow().get("count"), Some(Value::from(2.0)));
    }

    #[test]
    fn assign_fails_for_unknown_name() {
        let global = Environment::new_global();
        assert!(!global.borrow_mut().assign("missing", Value::Nil));
        assert_eq!(global.borrow().get("missing"), None);
    }

    #[test]
    #[should_panic(expected = "missing from scope")]
    fn get_at_panics_on_table_mismatch() {
        let global = Environment::new_global();
        let frame = Environment::with_enclosing(&global);
        get_at(&frame, 1, "nothing");
    }
}
