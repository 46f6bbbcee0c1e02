use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

use ahash::{AHashMap, AHashSet};

use crate::value::Value;

pub struct Environment {
    enclosing: Option<Rc<RefCell<Environment>>>,
    values: AHashMap<String, Value>,
    // Names declared `global` in this scope, assignments to them go to the outermost scope
    globals: AHashSet<String>,
}

#[derive(Debug, PartialEq)]
pub struct UndefinedVariable;

impl Environment {
    pub fn new() -> Self {
        Environment {
            enclosing: None,
            values: AHashMap::new(),
            globals: AHashSet::new(),
        }
    }

    pub fn with(enclosing: Rc<RefCell<Environment>>) -> Self {
        Environment {
            enclosing: Some(enclosing),
            values: AHashMap::new(),
            globals: AHashSet::new(),
        }
    }

    pub fn define(&mut self, key: &str, value: Value) {
        self.values.insert(String::from(key), value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(val) = self.values.get(key) {
            Some(val.clone())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow().get(key)
        } else {
            None
        }
    }

    /// Lookup restricted to this scope, used for instance fields.
    pub fn get_local(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    /// Rebinds `key` in the scope that defines it.
    pub fn assign(&mut self, key: &str, value: Value) -> Result<(), UndefinedVariable> {
        if let Some(val) = self.values.get_mut(key) {
            *val = value;
            Ok(())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow_mut().assign(key, value)
        } else {
            Err(UndefinedVariable)
        }
    }

    pub fn declare_global(&mut self, key: &str) {
        self.globals.insert(String::from(key));
    }

    pub fn is_global(&self, key: &str) -> bool {
        self.globals.contains(key)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.values.keys().cloned().collect();
        names.sort();
        names
    }

    /// Local bindings sorted by name.
    pub fn entries(&self) -> Vec<(String, Value)> {
        let mut entries: Vec<(String, Value)> = self
            .values
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn root(env: &Rc<RefCell<Environment>>) -> Rc<RefCell<Environment>> {
        let mut current = Rc::clone(env);
        loop {
            let enclosing = current.borrow().enclosing.clone();
            match enclosing {
                Some(parent) => current = parent,
                None => return current,
            }
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

// Closures stored in the scope usually point back at it, so only the names are printed
impl Debug for Environment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("names", &self.names())
            .field("enclosed", &self.enclosing.is_some())
            .finish()
    }
}
