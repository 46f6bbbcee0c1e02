use std::fmt;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

use thiserror::Error;

use crate::enhanced::EnhancedError;
use crate::value::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcePosition {
    pub file: Option<Rc<str>>,
    pub line: usize,
    pub col: usize,
}

impl SourcePosition {
    pub fn new(file: Option<Rc<str>>, line: usize, col: usize) -> Self {
        SourcePosition { file, line, col }
    }

    /// Line zero marks positions of synthesized nodes.
    pub fn is_known(&self) -> bool {
        self.line > 0
    }
}

impl Display for SourcePosition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}:{}", file, self.line, self.col),
            None => write!(f, "line {}:{}", self.line, self.col),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub function: String,
    pub position: SourcePosition,
}

impl StackFrame {
    pub fn new(function: &str, position: SourcePosition) -> Self {
        StackFrame {
            function: String::from(function),
            position,
        }
    }
}

impl Display for StackFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] in {}", self.position, self.function)
    }
}

/// The plain failure produced by operators and builtins. It carries no position, the evaluator
/// attaches one when it lifts the error at the failing node.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct BasicError {
    pub message: String,
}

impl BasicError {
    pub fn new(message: impl Into<String>) -> Self {
        BasicError {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ErrorWithTrace {
    pub error_type: String,
    pub message: String,
    pub position: SourcePosition,
    pub cause: Option<Rc<ErrorObject>>,
    // Most recent call first
    pub stack: Vec<StackFrame>,
    pub details: Vec<(String, String)>,
}

impl ErrorWithTrace {
    pub fn new(error_type: &str, message: &str, position: SourcePosition) -> Self {
        ErrorWithTrace {
            error_type: String::from(error_type),
            message: String::from(message),
            position,
            cause: None,
            stack: Vec::new(),
            details: Vec::new(),
        }
    }

    pub fn with_cause(mut self, cause: Rc<ErrorObject>) -> Self {
        self.cause = Some(cause);
        self
    }

    pub fn with_stack(mut self, stack: Vec<StackFrame>) -> Self {
        self.stack = stack;
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl Display) -> Self {
        self.details.push((String::from(key), value.to_string()));
        self
    }
}

/// An error raised by user code, either from an `Error(...)` value, a string or an instance of a
/// user grimoire.
#[derive(Debug, Clone)]
pub struct CustomError {
    pub name: String,
    pub message: String,
    pub instance: Option<Value>,
    pub position: SourcePosition,
    pub stack: Vec<StackFrame>,
}

impl CustomError {
    pub fn new(name: &str, message: &str) -> Self {
        CustomError {
            name: String::from(name),
            message: String::from(message),
            instance: None,
            position: SourcePosition::default(),
            stack: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ErrorObject {
    Basic(BasicError),
    Trace(ErrorWithTrace),
    Custom(CustomError),
    Enhanced(Box<EnhancedError>),
}

impl ErrorObject {
    pub fn name(&self) -> &str {
        match self {
            ErrorObject::Basic(_) => "Error",
            ErrorObject::Trace(err) => &err.error_type,
            ErrorObject::Custom(err) => &err.name,
            ErrorObject::Enhanced(err) => &err.title,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ErrorObject::Basic(err) => &err.message,
            ErrorObject::Trace(err) => &err.message,
            ErrorObject::Custom(err) => &err.message,
            ErrorObject::Enhanced(err) => &err.message,
        }
    }

    pub fn position(&self) -> Option<&SourcePosition> {
        let position = match self {
            ErrorObject::Basic(_) => return None,
            ErrorObject::Trace(err) => &err.position,
            ErrorObject::Custom(err) => &err.position,
            ErrorObject::Enhanced(err) => return err.primary.as_ref().map(|span| &span.start),
        };
        Some(position).filter(|position| position.is_known())
    }

    pub fn stack(&self) -> &[StackFrame] {
        match self {
            ErrorObject::Basic(_) => &[],
            ErrorObject::Trace(err) => &err.stack,
            ErrorObject::Custom(err) => &err.stack,
            ErrorObject::Enhanced(err) => &err.stack,
        }
    }

    pub fn cause(&self) -> Option<&Rc<ErrorObject>> {
        match self {
            ErrorObject::Trace(err) => err.cause.as_ref(),
            ErrorObject::Enhanced(err) => err.cause.as_ref(),
            _ => None,
        }
    }

    /// The user instance this error was raised with, if any.
    pub fn instance(&self) -> Option<&Value> {
        match self {
            ErrorObject::Custom(err) => err.instance.as_ref(),
            _ => None,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, ErrorObject::Custom(_))
    }
}

impl Display for ErrorObject {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(position) = self.position() {
            write!(f, "[{}] ", position)?;
        }
        write!(f, "{}: {}", self.name(), self.message())
    }
}

/// Error type name given to a failure raised by the evaluator itself.
pub(crate) fn classify(message: &str) -> &'static str {
    const KINDS: &[(&str, &str)] = &[
        ("identifier not found", "NameError"),
        ("undefined attribute", "AttributeError"),
        ("undefined method", "AttributeError"),
        ("private method", "AttributeError"),
        ("protected method", "AttributeError"),
        ("type mismatch", "TypeError"),
        ("unknown operator", "TypeError"),
        ("unusable as hash key", "TypeError"),
        ("not a function", "TypeError"),
        ("parameter", "TypeError"),
        ("cannot", "TypeError"),
        ("index out of bounds", "IndexError"),
        ("division by zero", "ZeroDivisionError"),
        ("modulo by zero", "ZeroDivisionError"),
        ("wrong number of arguments", "ArgumentError"),
        ("maximum recursion depth", "RecursionError"),
    ];

    KINDS
        .iter()
        .find(|(pattern, _)| message.starts_with(pattern))
        .map_or("RuntimeError", |(_, kind)| kind)
}
