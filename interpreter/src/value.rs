use std::cell::RefCell;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;

use ahash::AHashMap;
use carrion_core::Literal;

use crate::callable::{BoundMethod, Callable, Function, Grimoire, Instance, Native};
use crate::env::Environment;
use crate::limits::FLOAT_HASH_SCALE;
use crate::trace::{BasicError, ErrorObject};

pub type HashPairs = AHashMap<HashKey, (Value, Value)>;

#[derive(Clone)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    None,
    Str(Rc<str>),
    Array(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<[Value]>),
    // The original key is kept next to the value so that iteration can hand it back
    Hash(Rc<RefCell<HashPairs>>),
    Function(Rc<Function>),
    Builtin(Rc<Native>),
    Grimoire(Rc<Grimoire>),
    Instance(Rc<Instance>),
    BoundMethod(Rc<BoundMethod>),
    Namespace(Rc<Namespace>),
    // Created by `Error(...)`, inert until raised
    Error(Rc<ErrorObject>),
    // Bound by `ensnare ... as name`
    Caught(Rc<ErrorObject>),
}

/// Bindings of an imported module, reached with dot access.
#[derive(Debug)]
pub struct Namespace {
    pub name: String,
    pub env: Rc<RefCell<Environment>>,
}

/// The subset of values usable as hash keys. Floats are quantized, and floats holding an
/// integral value share the integer key so that `1 == 1.0` holds for keys too.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HashKey {
    Boolean(bool),
    Integer(i64),
    Float(i64),
    Bits(u64),
    Str(Rc<str>),
}

impl HashKey {
    pub fn from_value(value: &Value) -> Result<HashKey, BasicError> {
        match value {
            Value::Integer(n) => Ok(HashKey::Integer(*n)),
            Value::Float(n) => {
                let scaled = (n * FLOAT_HASH_SCALE).round();
                if n.fract() == 0.0 && *n >= i64::MIN as f64 && *n < i64::MAX as f64 {
                    Ok(HashKey::Integer(*n as i64))
                } else if scaled.is_finite() && scaled.abs() < i64::MAX as f64 {
                    Ok(HashKey::Float(scaled as i64))
                } else {
                    // Too large to quantize, keyed exactly
                    Ok(HashKey::Bits(n.to_bits()))
                }
            }
            Value::Str(s) => Ok(HashKey::Str(Rc::clone(s))),
            Value::Boolean(b) => Ok(HashKey::Boolean(*b)),
            _ => Err(BasicError::new(format!(
                "unusable as hash key: {}",
                value.type_name()
            ))),
        }
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::Boolean(_) => "BOOLEAN",
            Value::None => "NONE",
            Value::Str(_) => "STRING",
            Value::Array(_) => "ARRAY",
            Value::Tuple(_) => "TUPLE",
            Value::Hash(_) => "MAP",
            Value::Function(_) => "FUNCTION",
            Value::Builtin(_) => "BUILTIN",
            Value::Grimoire(_) => "GRIMOIRE",
            Value::Instance(_) => "INSTANCE",
            Value::BoundMethod(_) => "BOUND_METHOD",
            Value::Namespace(_) => "NAMESPACE",
            Value::Error(_) => "ERROR",
            Value::Caught(_) => "CAUGHT_ERROR",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::None => false,
            Value::Str(s) => !s.is_empty(),
            Value::Array(elements) => !elements.borrow().is_empty(),
            Value::Tuple(elements) => !elements.is_empty(),
            Value::Hash(pairs) => !pairs.borrow().is_empty(),
            _ => true,
        }
    }

    /// The type name a script spells in hints and in grimoires extending a primitive, like
    /// `String` or, for instances, the grimoire's own name.
    pub fn kind(&self) -> &str {
        match self {
            Value::Integer(_) => "Integer",
            Value::Float(_) => "Float",
            Value::Boolean(_) => "Boolean",
            Value::None => "None",
            Value::Str(_) => "String",
            Value::Array(_) => "Array",
            Value::Tuple(_) => "Tuple",
            Value::Hash(_) => "Map",
            Value::Function(_) | Value::Builtin(_) | Value::BoundMethod(_) => "Function",
            Value::Grimoire(_) => "Grimoire",
            Value::Instance(instance) => &instance.grimoire.name,
            Value::Namespace(_) => "Namespace",
            Value::Error(_) | Value::Caught(_) => "Error",
        }
    }

    /// Whether the value may be bound to a parameter annotated with `hint`. Numbers satisfy
    /// either numeric hint and `None` satisfies every hint.
    pub fn satisfies(&self, hint: &str) -> bool {
        let expected = match hint.to_ascii_lowercase().as_str() {
            "int" | "integer" | "float" => {
                return matches!(self, Value::Integer(_) | Value::Float(_) | Value::None)
            }
            "str" | "string" => "String",
            "bool" | "boolean" => "Boolean",
            "list" | "array" => "Array",
            "map" | "dict" | "hash" => "Map",
            "tuple" => "Tuple",
            "function" | "spell" => "Function",
            "any" | "object" => return true,
            _ => hint,
        };

        match self {
            Value::None => true,
            Value::Instance(instance) => {
                let mut current = Some(&instance.grimoire);
                while let Some(grimoire) = current {
                    if grimoire.name == expected {
                        return true;
                    }
                    current = grimoire.parent.as_ref();
                }
                false
            }
            _ => self.kind() == expected,
        }
    }

    pub fn as_callable(&self) -> Option<Rc<dyn Callable>> {
        match self {
            Value::Function(f) => Some(Rc::clone(f) as Rc<dyn Callable>),
            Value::Builtin(f) => Some(Rc::clone(f) as Rc<dyn Callable>),
            Value::Grimoire(g) => Some(Rc::clone(g) as Rc<dyn Callable>),
            Value::BoundMethod(m) => Some(Rc::clone(m) as Rc<dyn Callable>),
            _ => None,
        }
    }

    pub fn array(elements: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(elements)))
    }

    pub fn tuple(elements: Vec<Value>) -> Self {
        Value::Tuple(Rc::from(elements))
    }

    pub fn hash(pairs: Vec<(Value, Value)>) -> Result<Self, BasicError> {
        let mut map = HashPairs::new();
        for (key, value) in pairs {
            map.insert(HashKey::from_value(&key)?, (key, value));
        }
        Ok(Value::Hash(Rc::new(RefCell::new(map))))
    }

    /// Entries of a hash ordered by key, so that printing and iteration are deterministic.
    pub fn sorted_pairs(pairs: &HashPairs) -> Vec<(Value, Value)> {
        let mut entries: Vec<(&HashKey, &(Value, Value))> = pairs.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter().map(|(_, pair)| pair.clone()).collect()
    }

    /// Elements of a sequence value, `None` when the value can't be iterated.
    pub fn elements(&self) -> Option<Vec<Value>> {
        match self {
            Value::Array(elements) => Some(elements.borrow().clone()),
            Value::Tuple(elements) => Some(elements.to_vec()),
            Value::Str(s) => Some(s.chars().map(|c| Value::from(c.to_string())).collect()),
            Value::Hash(pairs) => Some(
                Value::sorted_pairs(&pairs.borrow())
                    .into_iter()
                    .map(|(key, _)| key)
                    .collect(),
            ),
            _ => None,
        }
    }

    // Strings are quoted when nested inside a container
    fn fmt_nested(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{:?}", s),
            _ => write!(f, "{}", self),
        }
    }
}

pub fn format_float(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e16 {
        format!("{:.1}", n)
    } else {
        format!("{}", n)
    }
}

impl From<Literal> for Value {
    fn from(value: Literal) -> Self {
        match value {
            Literal::Int(n) => Value::Integer(n),
            Literal::Float(n) => Value::Float(n),
            Literal::Str(s) => Value::Str(Rc::from(s)),
            Literal::Bool(b) => Value::Boolean(b),
            Literal::None => Value::None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(Rc::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(Rc::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::array(value)
    }
}

macro_rules! impl_from_int_for_value {
    ( $( $t:ident )* ) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Value {
                    Value::Integer(n as i64)
                }
            }
        )*
    }
}

impl_from_int_for_value!(u8 i8 u16 i16 u32 i32 i64 usize);

// Loose equality used by `==`, membership tests and container comparison. Integers and floats
// compare numerically, every other pair of different kinds is unequal.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(lhs), Value::Integer(rhs)) => lhs == rhs,
            (Value::Float(lhs), Value::Float(rhs)) => lhs == rhs,
            (Value::Integer(lhs), Value::Float(rhs)) => (*lhs as f64) == *rhs,
            (Value::Float(lhs), Value::Integer(rhs)) => *lhs == (*rhs as f64),
            (Value::Boolean(lhs), Value::Boolean(rhs)) => lhs == rhs,
            (Value::None, Value::None) => true,
            (Value::Str(lhs), Value::Str(rhs)) => lhs == rhs,
            (Value::Array(lhs), Value::Array(rhs)) => {
                Rc::ptr_eq(lhs, rhs) || *lhs.borrow() == *rhs.borrow()
            }
            (Value::Tuple(lhs), Value::Tuple(rhs)) => lhs == rhs,
            (Value::Hash(lhs), Value::Hash(rhs)) => {
                Rc::ptr_eq(lhs, rhs) || {
                    let (lhs, rhs) = (lhs.borrow(), rhs.borrow());
                    lhs.len() == rhs.len()
                        && lhs
                            .iter()
                            .all(|(key, (_, value))| rhs.get(key).map_or(false, |(_, v)| v == value))
                }
            }
            (Value::Function(lhs), Value::Function(rhs)) => Rc::ptr_eq(lhs, rhs),
            (Value::Builtin(lhs), Value::Builtin(rhs)) => Rc::ptr_eq(lhs, rhs),
            (Value::Grimoire(lhs), Value::Grimoire(rhs)) => Rc::ptr_eq(lhs, rhs),
            (Value::Instance(lhs), Value::Instance(rhs)) => Rc::ptr_eq(lhs, rhs),
            (Value::BoundMethod(lhs), Value::BoundMethod(rhs)) => Rc::ptr_eq(lhs, rhs),
            (Value::Namespace(lhs), Value::Namespace(rhs)) => Rc::ptr_eq(lhs, rhs),
            (Value::Error(lhs), Value::Error(rhs)) => Rc::ptr_eq(lhs, rhs),
            (Value::Caught(lhs), Value::Caught(rhs)) => Rc::ptr_eq(lhs, rhs),
            _ => false,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", format_float(*n)),
            Value::Boolean(true) => write!(f, "True"),
            Value::Boolean(false) => write!(f, "False"),
            Value::None => write!(f, "None"),
            Value::Str(s) => write!(f, "{}", s),
            Value::Array(elements) => {
                write!(f, "[")?;
                for (i, element) in elements.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    element.fmt_nested(f)?;
                }
                write!(f, "]")
            }
            Value::Tuple(elements) => {
                write!(f, "(")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    element.fmt_nested(f)?;
                }
                if elements.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Value::Hash(pairs) => {
                write!(f, "{{")?;
                for (i, (key, value)) in Value::sorted_pairs(&pairs.borrow()).iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    key.fmt_nested(f)?;
                    write!(f, ": ")?;
                    value.fmt_nested(f)?;
                }
                write!(f, "}}")
            }
            Value::Function(function) => write!(f, "<spell {}>", function.name()),
            Value::Builtin(native) => write!(f, "<builtin {}>", native.name()),
            Value::Grimoire(grimoire) => write!(f, "<grimoire {}>", grimoire.name),
            Value::Instance(instance) => write!(f, "<{} instance>", instance.grimoire.name),
            Value::BoundMethod(method) => write!(
                f,
                "<bound spell {}.{}>",
                method.owner.name, method.method.name.lexeme
            ),
            Value::Namespace(namespace) => write!(f, "<namespace {}>", namespace.name),
            Value::Error(err) | Value::Caught(err) => {
                write!(f, "{}: {}", err.name(), err.message())
            }
        }
    }
}

// Values can be cyclic through closures and instances, so Debug stays shallow
impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Array(_) | Value::Tuple(_) | Value::Hash(_) => {
                write!(f, "{}({})", self.type_name(), self)
            }
            _ => write!(f, "{}({})", self.type_name(), self),
        }
    }
}
