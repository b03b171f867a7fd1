use std::cell::RefCell;
use std::rc::Rc;

use hashbrown::HashMap;
use lasso::Spur;

use crate::value::{intern, Value};

/// An evaluator environment: a chain of scopes with bindings.
///
/// Cloning an `Env` shares the underlying bindings, which is what
/// closures rely on: a function value holds the environment it was
/// created in, and later definitions in that scope remain visible.
#[derive(Debug, Clone, Default)]
pub struct Env {
    bindings: Rc<RefCell<HashMap<Spur, Value>>>,
    parent: Option<Rc<Env>>,
}

impl Env {
    pub fn new() -> Self {
        Env::default()
    }

    pub fn with_parent(parent: Rc<Env>) -> Self {
        Env {
            bindings: Rc::new(RefCell::new(HashMap::new())),
            parent: Some(parent),
        }
    }

    pub fn get(&self, name: Spur) -> Option<Value> {
        if let Some(val) = self.bindings.borrow().get(&name) {
            Some(val.clone())
        } else if let Some(parent) = &self.parent {
            parent.get(name)
        } else {
            None
        }
    }

    pub fn get_str(&self, name: &str) -> Option<Value> {
        self.get(intern(name))
    }

    /// Bind `name` in the current scope, shadowing any outer binding.
    pub fn set(&self, name: Spur, val: Value) {
        self.bindings.borrow_mut().insert(name, val);
    }

    pub fn set_str(&self, name: &str, val: Value) {
        self.set(intern(name), val);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let env = Env::new();
        env.set_str("x", Value::number(42.0));
        assert_eq!(env.get_str("x"), Some(Value::number(42.0)));
        assert_eq!(env.get_str("y"), None);
    }

    #[test]
    fn test_outer_scope_visible() {
        let outer = Rc::new(Env::new());
        outer.set_str("x", Value::number(1.0));
        let inner = Env::with_parent(outer.clone());
        assert_eq!(inner.get_str("x"), Some(Value::number(1.0)));
    }

    #[test]
    fn test_shadowing_does_not_touch_outer() {
        let outer = Rc::new(Env::new());
        outer.set_str("x", Value::number(1.0));
        let inner = Env::with_parent(outer.clone());
        inner.set_str("x", Value::number(2.0));
        assert_eq!(inner.get_str("x"), Some(Value::number(2.0)));
        assert_eq!(outer.get_str("x"), Some(Value::number(1.0)));
    }

    #[test]
    fn test_clone_shares_bindings() {
        let env = Env::new();
        let alias = env.clone();
        env.set_str("late", Value::TRUE);
        assert_eq!(alias.get_str("late"), Some(Value::TRUE));
    }
}
