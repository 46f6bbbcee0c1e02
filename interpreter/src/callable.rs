use std::cell::RefCell;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;

use ahash::AHashMap;

use crate::ast::SpellDecl;
use crate::env::Environment;
use crate::interpreter::Interpreter;
use crate::trace::{BasicError, ErrorObject};
use crate::value::Value;

/// How many arguments a callable accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    Range(usize, usize),
    AtMost(usize),
    Variadic,
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Arity::Fixed(n) => count == n,
            Arity::Range(min, max) => min <= count && count <= max,
            Arity::AtMost(max) => count <= max,
            Arity::Variadic => true,
        }
    }
}

impl Display for Arity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Arity::Fixed(n) => write!(f, "{}", n),
            Arity::Range(min, max) => write!(f, "{}..={}", min, max),
            Arity::AtMost(max) => write!(f, "<={}", max),
            Arity::Variadic => write!(f, "*"),
        }
    }
}

pub trait Callable {
    fn name(&self) -> &str;
    fn arity(&self) -> Arity;

    // Builtins skip the call frame bookkeeping
    fn is_builtin(&self) -> bool {
        false
    }

    fn execute(
        self: Rc<Self>,
        interpreter: &mut Interpreter,
        args: &[Value],
    ) -> Result<Value, Rc<ErrorObject>>;
}

impl Debug for dyn Callable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "<callable {}>", self.name())
    }
}

pub type BoxedFunction = Box<dyn Fn(&[Value]) -> Result<Value, BasicError>>;

// `Native` bridges rust closures into the language. Every builtin is one of these, registered
// into the global scope. Closures that write output capture the interpreter's stdout handle.
pub struct Native {
    func: BoxedFunction,
    name: String,
    arity: Arity,
}

impl Native {
    pub fn new(func: BoxedFunction, name: &str, arity: Arity) -> Self {
        Native {
            func,
            name: String::from(name),
            arity,
        }
    }
}

impl Debug for Native {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "<builtin {}>", self.name)
    }
}

impl Callable for Native {
    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> Arity {
        self.arity
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn execute(self: Rc<Self>, _: &mut Interpreter, args: &[Value]) -> Result<Value, Rc<ErrorObject>> {
        (self.func)(args).map_err(|err| Rc::new(ErrorObject::Basic(err)))
    }
}

/// A spell together with the scope it was defined in.
#[derive(Debug)]
pub struct Function {
    pub(crate) decl: Rc<SpellDecl>,
    pub(crate) closure: Rc<RefCell<Environment>>,
}

impl Function {
    pub(crate) fn new(decl: Rc<SpellDecl>, closure: Rc<RefCell<Environment>>) -> Self {
        Function { decl, closure }
    }
}

impl Callable for Function {
    fn name(&self) -> &str {
        &self.decl.name.lexeme
    }

    fn arity(&self) -> Arity {
        Arity::AtMost(self.decl.params.len())
    }

    fn execute(
        self: Rc<Self>,
        interpreter: &mut Interpreter,
        args: &[Value],
    ) -> Result<Value, Rc<ErrorObject>> {
        interpreter.invoke(&self.decl, Rc::clone(&self.closure), None, args)
    }
}

#[derive(Debug)]
pub struct Grimoire {
    pub name: String,
    pub parent: Option<Rc<Grimoire>>,
    pub(crate) init: Option<Rc<SpellDecl>>,
    pub(crate) methods: AHashMap<String, Rc<SpellDecl>>,
    // Shared by every instance, free names in methods resolve here
    pub(crate) env: Rc<RefCell<Environment>>,
    pub is_arcane: bool,
}

impl Grimoire {
    pub(crate) fn new(
        name: &str,
        parent: Option<Rc<Grimoire>>,
        init: Option<Rc<SpellDecl>>,
        methods: AHashMap<String, Rc<SpellDecl>>,
        env: Rc<RefCell<Environment>>,
        is_arcane: bool,
    ) -> Rc<Self> {
        Rc::new(Grimoire {
            name: String::from(name),
            parent,
            init,
            methods,
            env,
            is_arcane,
        })
    }

    /// Looks a method up along the inheritance chain, returning it with the grimoire defining it.
    pub(crate) fn find_method(self: &Rc<Self>, name: &str) -> Option<(Rc<SpellDecl>, Rc<Grimoire>)> {
        let mut current = Some(Rc::clone(self));
        while let Some(grimoire) = current {
            if let Some(method) = grimoire.methods.get(name) {
                return Some((Rc::clone(method), grimoire));
            }
            if name == "init" {
                if let Some(init) = &grimoire.init {
                    return Some((Rc::clone(init), grimoire));
                }
            }
            current = grimoire.parent.clone();
        }
        None
    }

    pub(crate) fn find_init(self: &Rc<Self>) -> Option<(Rc<SpellDecl>, Rc<Grimoire>)> {
        let mut current = Some(Rc::clone(self));
        while let Some(grimoire) = current {
            if let Some(init) = &grimoire.init {
                return Some((Rc::clone(init), grimoire));
            }
            current = grimoire.parent.clone();
        }
        None
    }

    /// True when `self` is `other` or inherits from it.
    pub fn is_subclass_of(self: &Rc<Self>, other: &Rc<Grimoire>) -> bool {
        let mut current = Some(Rc::clone(self));
        while let Some(grimoire) = current {
            if Rc::ptr_eq(&grimoire, other) {
                return true;
            }
            current = grimoire.parent.clone();
        }
        false
    }

    // The first arcane spell, by name, that no grimoire down the chain overrides
    fn unimplemented_arcane(self: &Rc<Self>) -> Option<String> {
        let mut names = Vec::new();
        let mut current = Some(Rc::clone(self));
        while let Some(grimoire) = current {
            names.extend(grimoire.methods.keys().cloned());
            current = grimoire.parent.clone();
        }
        names.sort();
        names.dedup();

        names.into_iter().find(|name| {
            self.find_method(name)
                .map_or(false, |(method, _)| method.is_arcane)
        })
    }
}

impl Callable for Grimoire {
    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> Arity {
        let mut current = Some(self);
        while let Some(grimoire) = current {
            if let Some(init) = &grimoire.init {
                return Arity::AtMost(init.params.len());
            }
            current = grimoire.parent.as_deref();
        }
        Arity::Fixed(0)
    }

    fn execute(
        self: Rc<Self>,
        interpreter: &mut Interpreter,
        args: &[Value],
    ) -> Result<Value, Rc<ErrorObject>> {
        if self.is_arcane {
            return Err(Rc::new(ErrorObject::Basic(BasicError::new(format!(
                "cannot instantiate arcane grimoire {}",
                self.name
            )))));
        }
        if let Some(method) = self.unimplemented_arcane() {
            return Err(Rc::new(ErrorObject::Basic(BasicError::new(format!(
                "cannot instantiate {}: arcane spell {} is not implemented",
                self.name, method
            )))));
        }

        let instance = Value::Instance(Rc::new(Instance::new(Rc::clone(&self))));
        if let Some((init, owner)) = self.find_init() {
            let closure = Rc::clone(&owner.env);
            interpreter.invoke(&init, closure, Some((instance.clone(), owner)), args)?;
        }

        Ok(instance)
    }
}

#[derive(Debug)]
pub struct Instance {
    pub grimoire: Rc<Grimoire>,
    // Fields, enclosed by the grimoire's scope
    pub(crate) env: Rc<RefCell<Environment>>,
}

impl Instance {
    pub(crate) fn new(grimoire: Rc<Grimoire>) -> Self {
        let env = Environment::with(Rc::clone(&grimoire.env));
        Instance {
            grimoire,
            env: Rc::new(RefCell::new(env)),
        }
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        self.env.borrow().get_local(name)
    }

    pub fn set_field(&self, name: &str, value: Value) {
        self.env.borrow_mut().define(name, value);
    }
}

/// A method looked up through an instance, carrying the receiver bound to `self`.
#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub method: Rc<SpellDecl>,
    // The grimoire defining `method`, `super` resolves against its parent
    pub owner: Rc<Grimoire>,
}

impl BoundMethod {
    pub(crate) fn new(receiver: Value, method: Rc<SpellDecl>, owner: Rc<Grimoire>) -> Self {
        BoundMethod {
            receiver,
            method,
            owner,
        }
    }
}

impl Callable for BoundMethod {
    fn name(&self) -> &str {
        &self.method.name.lexeme
    }

    fn arity(&self) -> Arity {
        Arity::AtMost(self.method.params.len())
    }

    fn execute(
        self: Rc<Self>,
        interpreter: &mut Interpreter,
        args: &[Value],
    ) -> Result<Value, Rc<ErrorObject>> {
        let closure = Rc::clone(&self.owner.env);
        let receiver = Some((self.receiver.clone(), Rc::clone(&self.owner)));
        interpreter.invoke(&self.method, closure, receiver, args)
    }
}

#[cfg(test)]
mod tests {
    use crate::callable::Arity;

    #[test]
    fn test_arity() {
        let tests = [
            (Arity::Fixed(2), 2, true),
            (Arity::Fixed(2), 1, false),
            (Arity::Range(1, 3), 3, true),
            (Arity::Range(1, 3), 0, false),
            (Arity::AtMost(2), 0, true),
            (Arity::AtMost(2), 3, false),
            (Arity::Variadic, 10, true),
        ];

        for (arity, count, expected) in tests {
            assert_eq!(arity.accepts(count), expected, "{} with {}", arity, count);
        }
    }

    #[test]
    fn test_arity_display() {
        assert_eq!(Arity::Fixed(2).to_string(), "2");
        assert_eq!(Arity::Range(1, 3).to_string(), "1..=3");
        assert_eq!(Arity::AtMost(2).to_string(), "<=2");
        assert_eq!(Arity::Variadic.to_string(), "*");
    }
}
