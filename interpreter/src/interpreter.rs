use std::cell::RefCell;
use std::fs;
use std::io::Write;
use std::mem;
use std::rc::Rc;

use ahash::AHashMap;
use carrion_core::{Literal, Token, Type};
use log::{debug, info};

use crate::ast::{
    Case, Ensnare, Expr, ExprVisitor, FStringPart, GrimoireDecl, Program, SpellDecl, Stmt,
    StmtVisitor,
};
use crate::builtins;
use crate::callable::{Arity, BoundMethod, BoxedFunction, Function, Grimoire, Instance, Native};
use crate::config::Config;
use crate::enhanced::{ErrorCategory, EnhancedError};
use crate::env::Environment;
use crate::import::{ImportResolver, ImportTarget};
use crate::ops;
use crate::parser::Parser;
use crate::trace::{
    classify, BasicError, CustomError, ErrorObject, ErrorWithTrace, SourcePosition, StackFrame,
};
use crate::value::{Namespace, Value};

type EvalResult = Result<Value, Rc<ErrorObject>>;

/// Outcome of running a statement. Everything except `Value` stops the enclosing block and is
/// handed upwards until a construct that owns it intercepts it: loops take `Break` and
/// `Continue`, calls take `Return`, and `attempt` takes `Error`.
#[derive(Debug)]
pub enum Flow {
    Value(Value),
    Return(Value),
    Break,
    Continue,
    Error(Rc<ErrorObject>),
}

macro_rules! try_flow {
    ( $e:expr ) => {
        match $e {
            Ok(value) => value,
            Err(err) => return Flow::Error(err),
        }
    };
}

pub struct Interpreter {
    globals: Rc<RefCell<Environment>>,
    env: Rc<RefCell<Environment>>,
    stdout: Rc<RefCell<dyn Write>>,
    config: Config,
    // Active calls, innermost last
    frames: Vec<StackFrame>,
    imports: ImportResolver,
    current_file: Option<Rc<str>>,
    // Grimoire defining the running method, decides access to `_` and `__` spells
    context: Option<Rc<Grimoire>>,
}

impl Interpreter {
    pub fn new(stdout: Rc<RefCell<dyn Write>>) -> Self {
        Interpreter::with_config(stdout, Config::default())
    }

    pub fn with_config(stdout: Rc<RefCell<dyn Write>>, config: Config) -> Self {
        let globals = Rc::new(RefCell::new(Environment::new()));
        let mut interpreter = Interpreter {
            env: Rc::clone(&globals),
            globals,
            stdout,
            imports: ImportResolver::new(config.import_dir.clone()),
            config,
            frames: Vec::new(),
            current_file: None,
            context: None,
        };
        builtins::register(&mut interpreter);
        interpreter
    }

    /// Makes a native function callable from scripts under `name`.
    pub fn register_builtin(&mut self, name: &str, arity: Arity, func: BoxedFunction) {
        let native = Native::new(func, name, arity);
        self.globals
            .borrow_mut()
            .define(name, Value::Builtin(Rc::new(native)));
    }

    pub fn globals(&self) -> Rc<RefCell<Environment>> {
        Rc::clone(&self.globals)
    }

    pub fn stdout(&self) -> Rc<RefCell<dyn Write>> {
        Rc::clone(&self.stdout)
    }

    /// Names the file positions in errors are reported against.
    pub fn set_file(&mut self, file: &str) {
        self.current_file = Some(Rc::from(file));
    }

    pub fn interpret(&mut self, program: &Program) -> EvalResult {
        let globals = Rc::clone(&self.globals);
        self.evaluate(program, &globals)
    }

    /// Runs `program` against `env`. The result is the value of the last top level statement, or
    /// of the `main` block when the program has one.
    pub fn evaluate(&mut self, program: &Program, env: &Rc<RefCell<Environment>>) -> EvalResult {
        info!("running program of {} statements", program.statements.len());
        let previous = mem::replace(&mut self.env, Rc::clone(env));
        let flow = self.run_program(program, true);
        self.env = previous;

        let result = self.finish(flow);
        info!("program finished");
        result
    }

    fn run_program(&mut self, program: &Program, run_main: bool) -> Flow {
        if !program.has_main() {
            return self.execute_block(&program.statements);
        }

        // Everything but `main` runs first, bare expression values are thrown away
        for stmt in program.statements.iter().filter(|stmt| !stmt.is_main()) {
            match self.visit_stmt(stmt) {
                Flow::Value(_) => {}
                flow => return flow,
            }
        }
        if !run_main {
            return Flow::Value(Value::None);
        }

        let mut last = Value::None;
        for stmt in program.statements.iter().filter(|stmt| stmt.is_main()) {
            match self.visit_stmt(stmt) {
                Flow::Value(value) => last = value,
                flow => return flow,
            }
        }
        Flow::Value(last)
    }

    fn finish(&self, flow: Flow) -> EvalResult {
        match flow {
            Flow::Value(value) | Flow::Return(value) => Ok(value),
            Flow::Error(err) => Err(err),
            Flow::Break | Flow::Continue => Err(Rc::new(ErrorObject::Basic(BasicError::new(
                "stop or skip used outside of a loop",
            )))),
        }
    }

    pub(crate) fn execute_block(&mut self, stmts: &[Stmt]) -> Flow {
        let mut last = Value::None;
        for stmt in stmts {
            match self.visit_stmt(stmt) {
                Flow::Value(value) => last = value,
                flow => return flow,
            }
        }
        Flow::Value(last)
    }

    /// Runs the body of a spell in a fresh scope enclosed by `closure`. Methods additionally get
    /// `self` and, when the defining grimoire has a parent, `super`.
    pub(crate) fn invoke(
        &mut self,
        decl: &Rc<SpellDecl>,
        closure: Rc<RefCell<Environment>>,
        receiver: Option<(Value, Rc<Grimoire>)>,
        args: &[Value],
    ) -> EvalResult {
        if decl.is_arcane {
            return Err(Rc::new(ErrorObject::Basic(BasicError::new(format!(
                "cannot call arcane spell {}",
                decl.name.lexeme
            )))));
        }

        let mut env = Environment::with(closure);
        let mut context = None;
        if let Some((receiver, owner)) = receiver {
            env.define("self", receiver);
            if let Some(parent) = &owner.parent {
                env.define("super", Value::Grimoire(Rc::clone(parent)));
            }
            context = Some(owner);
        }

        let previous = mem::replace(&mut self.env, Rc::new(RefCell::new(env)));
        let previous_context = mem::replace(&mut self.context, context);
        let flow = match self.bind_params(decl, args) {
            Ok(()) => self.execute_block(&decl.body),
            Err(err) => Flow::Error(err),
        };
        self.env = previous;
        self.context = previous_context;

        match flow {
            Flow::Value(value) | Flow::Return(value) => Ok(value),
            Flow::Error(err) => Err(err),
            Flow::Break | Flow::Continue => Err(self.lift(
                BasicError::new("stop or skip used outside of a loop"),
                &decl.name,
            )),
        }
    }

    // Missing arguments take their default, evaluated in the callee's scope, or None
    fn bind_params(&mut self, decl: &SpellDecl, args: &[Value]) -> Result<(), Rc<ErrorObject>> {
        for (i, param) in decl.params.iter().enumerate() {
            let value = match (args.get(i), &param.default) {
                (Some(arg), _) => arg.clone(),
                (None, Some(default)) => self.visit_expr(default)?,
                (None, None) => Value::None,
            };
            if let Some(hint) = &param.type_hint {
                if !value.satisfies(&hint.lexeme) {
                    return Err(Rc::new(ErrorObject::Basic(BasicError::new(format!(
                        "parameter '{}' expects {} but got {}",
                        param.name.lexeme,
                        hint.lexeme,
                        value.kind()
                    )))));
                }
            }
            self.env.borrow_mut().define(&param.name.lexeme, value);
        }
        Ok(())
    }

    fn position(&self, token: &Token) -> SourcePosition {
        SourcePosition::new(self.current_file.clone(), token.line, token.col)
    }

    fn stack_snapshot(&self) -> Vec<StackFrame> {
        self.frames
            .iter()
            .rev()
            .take(self.config.stack_trace_limit)
            .cloned()
            .collect()
    }

    // Attaches the failing node's position and the current call stack to a plain error
    fn lift(&self, err: BasicError, token: &Token) -> Rc<ErrorObject> {
        let traced = ErrorWithTrace::new(classify(&err.message), &err.message, self.position(token))
            .with_stack(self.stack_snapshot());
        Rc::new(ErrorObject::Trace(traced))
    }

    fn locate(&self, err: Rc<ErrorObject>, token: &Token) -> Rc<ErrorObject> {
        match err.as_ref() {
            ErrorObject::Basic(basic) => self.lift(basic.clone(), token),
            _ => err,
        }
    }

    fn lookup(&self, name: &Token) -> EvalResult {
        self.env.borrow().get(&name.lexeme).ok_or_else(|| {
            self.lift(
                BasicError::new(format!("identifier not found: {}", name.lexeme)),
                name,
            )
        })
    }

    fn set_variable(&mut self, name: &str, value: Value) {
        if self.env.borrow().is_global(name) {
            Environment::root(&self.env).borrow_mut().define(name, value);
            return;
        }

        let assigned = self.env.borrow_mut().assign(name, value.clone());
        if assigned.is_err() {
            self.env.borrow_mut().define(name, value);
        }
    }

    fn assign_to(&mut self, target: &Expr, value: Value) -> Result<(), Rc<ErrorObject>> {
        match target {
            Expr::Identifier { name } => {
                self.set_variable(&name.lexeme, value);
                Ok(())
            }
            Expr::Dot { object, name } => {
                let object = self.visit_expr(object)?;
                self.set_attribute(&object, name, value)
            }
            Expr::Index {
                object,
                bracket,
                index,
            } => {
                let object = self.visit_expr(object)?;
                let index = self.visit_expr(index)?;
                ops::set_index(&object, &index, value).map_err(|err| self.lift(err, bracket))
            }
            Expr::Tuple { paren, elements } => {
                let values = match &value {
                    Value::Array(_) | Value::Tuple(_) => value.elements().unwrap_or_default(),
                    // A hash splits into an array of its keys and one of its values
                    Value::Hash(pairs) if elements.len() == 2 => {
                        let (keys, entries): (Vec<Value>, Vec<Value>) =
                            Value::sorted_pairs(&pairs.borrow()).into_iter().unzip();
                        vec![Value::array(keys), Value::array(entries)]
                    }
                    _ => {
                        return Err(self.lift(
                            BasicError::new(format!("cannot unpack {}", value.type_name())),
                            paren,
                        ))
                    }
                };
                if values.len() != elements.len() {
                    return Err(self.lift(
                        BasicError::new(format!(
                            "cannot unpack {} values into {} names",
                            values.len(),
                            elements.len()
                        )),
                        paren,
                    ));
                }
                for (element, value) in elements.iter().zip(values) {
                    self.assign_to(element, value)?;
                }
                Ok(())
            }
            _ => Err(self.lift(
                BasicError::new(format!("cannot assign to {}", target)),
                target.token(),
            )),
        }
    }

    // Reads the target once, applies the operator and writes the result back
    fn compound_assign(
        &mut self,
        target: &Expr,
        operator: &Token,
        value: Value,
    ) -> Result<(), Rc<ErrorObject>> {
        let op = ops::compound_operator(operator).ok_or_else(|| {
            self.lift(
                BasicError::new(format!("unknown operator: {}", operator.lexeme)),
                operator,
            )
        })?;

        match target {
            Expr::Identifier { name } => {
                let current = self.lookup(name)?;
                let result = ops::binary_op(&op, &current, &value).map_err(|err| self.lift(err, operator))?;
                self.set_variable(&name.lexeme, result);
                Ok(())
            }
            Expr::Dot { object, name } => {
                let object = self.visit_expr(object)?;
                let current = self.get_attribute(&object, name)?;
                let result = ops::binary_op(&op, &current, &value).map_err(|err| self.lift(err, operator))?;
                self.set_attribute(&object, name, result)
            }
            Expr::Index {
                object,
                bracket,
                index,
            } => {
                let object = self.visit_expr(object)?;
                let index = self.visit_expr(index)?;
                let current = ops::index(&object, &index).map_err(|err| self.lift(err, bracket))?;
                let result = ops::binary_op(&op, &current, &value).map_err(|err| self.lift(err, operator))?;
                ops::set_index(&object, &index, result).map_err(|err| self.lift(err, bracket))
            }
            _ => Err(self.lift(
                BasicError::new(format!("cannot assign to {}", target)),
                operator,
            )),
        }
    }

    fn get_attribute(&self, object: &Value, name: &Token) -> EvalResult {
        let attribute = &name.lexeme;
        let found = match object {
            // Fields shadow methods of the same name
            Value::Instance(instance) => match instance.field(attribute) {
                Some(field) => Some(field),
                None => match instance.grimoire.find_method(attribute) {
                    Some((method, owner)) => {
                        self.check_access(attribute, &owner, name)?;
                        Some(Value::BoundMethod(Rc::new(BoundMethod::new(
                            object.clone(),
                            method,
                            owner,
                        ))))
                    }
                    None => None,
                },
            },
            Value::Grimoire(grimoire) => match grimoire.find_method(attribute) {
                Some((method, owner)) => {
                    self.check_access(attribute, &owner, name)?;
                    Some(Value::Function(Rc::new(Function::new(method, Rc::clone(&owner.env)))))
                }
                None => None,
            },
            Value::Integer(_)
            | Value::Float(_)
            | Value::Boolean(_)
            | Value::Str(_)
            | Value::Array(_) => match self.wrap_primitive(object) {
                Some(wrapped) => return self.get_attribute(&wrapped, name),
                None => None,
            },
            Value::Namespace(namespace) => namespace.env.borrow().get_local(attribute),
            Value::Error(err) | Value::Caught(err) => match attribute.as_str() {
                "message" => Some(Value::from(err.message())),
                "name" | "type" => Some(Value::from(err.name())),
                _ => match err.instance() {
                    Some(instance) => return self.get_attribute(instance, name),
                    None => None,
                },
            },
            _ => None,
        };

        found.ok_or_else(|| {
            let owner = match object {
                Value::Instance(instance) => format!("{} instance", instance.grimoire.name),
                Value::Grimoire(grimoire) => format!("grimoire {}", grimoire.name),
                Value::Namespace(namespace) => format!("namespace {}", namespace.name),
                _ => String::from(object.type_name()),
            };
            self.lift(
                BasicError::new(format!("undefined attribute '{}' on {}", attribute, owner)),
                name,
            )
        })
    }

    // A primitive reached through dot access stands in as an instance of the grimoire named after
    // its type, when one is in scope. The primitive is its `value` field, `elements` for arrays.
    fn wrap_primitive(&self, value: &Value) -> Option<Value> {
        let found = self.env.borrow().get(value.kind());
        let grimoire = match found {
            Some(Value::Grimoire(grimoire)) => grimoire,
            _ => return None,
        };

        let instance = Instance::new(grimoire);
        let field = match value {
            Value::Array(_) => "elements",
            _ => "value",
        };
        instance.set_field(field, value.clone());
        Some(Value::Instance(Rc::new(instance)))
    }

    // `__name` spells are private to the grimoire defining them. `_name` spells are protected,
    // reachable from methods of grimoires on the same inheritance line.
    fn check_access(
        &self,
        method: &str,
        owner: &Rc<Grimoire>,
        token: &Token,
    ) -> Result<(), Rc<ErrorObject>> {
        let context = self.context.as_ref();
        let message = if method.starts_with("__") {
            if context.map_or(false, |context| Rc::ptr_eq(context, owner)) {
                return Ok(());
            }
            format!(
                "private method '{}' is not accessible outside grimoire {}",
                method, owner.name
            )
        } else if method.starts_with('_') {
            let related = context.map_or(false, |context| {
                context.is_subclass_of(owner) || owner.is_subclass_of(context)
            });
            if related {
                return Ok(());
            }
            format!(
                "protected method '{}' is not accessible outside the {} hierarchy",
                method, owner.name
            )
        } else {
            return Ok(());
        };

        Err(self.lift(BasicError::new(message), token))
    }

    fn set_attribute(&self, object: &Value, name: &Token, value: Value) -> Result<(), Rc<ErrorObject>> {
        match object {
            Value::Instance(instance) => {
                instance.set_field(&name.lexeme, value);
                Ok(())
            }
            _ => Err(self.lift(
                BasicError::new(format!(
                    "cannot assign to attribute '{}' of {}",
                    name.lexeme,
                    object.type_name()
                )),
                name,
            )),
        }
    }

    fn ensnares(&mut self, ensnare: &Ensnare, err: &Rc<ErrorObject>) -> Result<bool, Rc<ErrorObject>> {
        let condition = match &ensnare.condition {
            None => return Ok(true),
            Some(condition) => condition,
        };

        // A bare name that isn't bound to anything is the alias of a catch-all
        if let Expr::Identifier { name } = condition {
            if self.env.borrow().get(&name.lexeme).is_none() {
                return Ok(true);
            }
        }

        let matched = match self.visit_expr(condition)? {
            Value::Grimoire(grimoire) => {
                let raised_from = match err.instance() {
                    Some(Value::Instance(instance)) => instance.grimoire.is_subclass_of(&grimoire),
                    _ => false,
                };
                raised_from || err.name() == grimoire.name
            }
            Value::Str(name) => err.name() == name.as_ref() || err.message().starts_with(name.as_ref()),
            Value::Error(other) | Value::Caught(other) => err.name() == other.name(),
            _ => false,
        };
        Ok(matched)
    }

    fn raised(&self, value: Value, keyword: &Token) -> Rc<ErrorObject> {
        let custom = |name: &str, message: &str, instance: Option<Value>| {
            let mut custom = CustomError::new(name, message);
            custom.instance = instance;
            custom.position = self.position(keyword);
            custom.stack = self.stack_snapshot();
            Rc::new(ErrorObject::Custom(custom))
        };

        match value {
            Value::Error(err) => match err.as_ref() {
                ErrorObject::Custom(inner) => {
                    custom(inner.name.as_str(), inner.message.as_str(), inner.instance.clone())
                }
                ErrorObject::Basic(basic) => self.lift(basic.clone(), keyword),
                _ => err,
            },
            // Re-raising keeps the original position and stack
            Value::Caught(err) => err,
            Value::Str(message) => custom("Error", &*message, None),
            Value::Instance(instance) => {
                let message = instance
                    .field("message")
                    .map(|message| message.to_string())
                    .unwrap_or_default();
                let name = instance.grimoire.name.clone();
                custom(name.as_str(), message.as_str(), Some(Value::Instance(instance)))
            }
            other => self.lift(
                BasicError::new(format!("cannot raise non-error object: {}", other.type_name())),
                keyword,
            ),
        }
    }

    fn load_module(
        &mut self,
        keyword: &Token,
        import_path: &str,
        target: &ImportTarget,
    ) -> Result<Rc<RefCell<Environment>>, Rc<ErrorObject>> {
        let position = self.position(keyword);
        let display = target.path.display().to_string();

        let src = fs::read_to_string(&target.path).map_err(|err| {
            let cause = Rc::new(ErrorObject::Basic(BasicError::new(err.to_string())));
            let traced = ErrorWithTrace::new(
                "ImportError",
                &format!("cannot import '{}'", import_path),
                position.clone(),
            )
            .with_cause(cause)
            .with_stack(self.stack_snapshot())
            .with_detail("path", &display);
            Rc::new(ErrorObject::Trace(traced))
        })?;

        let mut parser = Parser::new(&src);
        let program = parser.parse_program();
        if !parser.diagnostics().is_empty() {
            let file: Rc<str> = Rc::from(display.as_str());
            let text: Rc<str> = Rc::from(src.as_str());
            let related = EnhancedError::from_parse_errors(parser.diagnostics(), Some(file))
                .into_iter()
                .map(|err| err.with_source(Rc::clone(&text)))
                .collect();
            let enhanced = EnhancedError::new(
                ErrorCategory::Import,
                "ImportError",
                &format!("module '{}' has syntax errors", import_path),
            )
            .at(position.clone())
            .with_label(position, "imported here")
            .with_related(related);
            return Err(Rc::new(ErrorObject::Enhanced(Box::new(enhanced))));
        }

        debug!("importing {}", display);
        let env = Rc::new(RefCell::new(Environment::with(Rc::clone(&self.env))));
        self.imports.insert(target.path.clone());

        let previous_file = mem::replace(&mut self.current_file, Some(Rc::from(display.as_str())));
        let previous_env = mem::replace(&mut self.env, Rc::clone(&env));
        let previous_context = self.context.take();
        let flow = self.run_program(&program, false);
        self.env = previous_env;
        self.context = previous_context;
        self.current_file = previous_file;

        match flow {
            Flow::Error(err) => {
                let traced = ErrorWithTrace::new(
                    "ImportError",
                    &format!("error while importing '{}'", import_path),
                    self.position(keyword),
                )
                .with_cause(err)
                .with_stack(self.stack_snapshot());
                Err(Rc::new(ErrorObject::Trace(traced)))
            }
            _ => Ok(env),
        }
    }
}

impl ExprVisitor for Interpreter {
    type Item = Value;
    type Error = Rc<ErrorObject>;

    fn visit_identifier(&mut self, name: &Token) -> EvalResult {
        self.lookup(name)
    }

    fn visit_literal(&mut self, _: &Token, value: &Literal) -> EvalResult {
        Ok(Value::from(value.clone()))
    }

    fn visit_prefix(&mut self, operator: &Token, right: &Expr) -> EvalResult {
        if let (Type::Increment | Type::Decrement, Expr::Identifier { name }) = (operator.ty, right) {
            let (_, updated) = self.step(name, operator)?;
            return Ok(updated);
        }

        let right = self.visit_expr(right)?;
        ops::unary_op(operator, &right).map_err(|err| self.lift(err, operator))
    }

    fn visit_infix(&mut self, left: &Expr, operator: &Token, right: &Expr) -> EvalResult {
        // `and` and `or` only evaluate the right side when it decides the result
        match operator.ty {
            Type::And => {
                let left = self.visit_expr(left)?;
                if !left.is_truthy() {
                    return Ok(Value::Boolean(false));
                }
                return Ok(Value::Boolean(self.visit_expr(right)?.is_truthy()));
            }
            Type::Or => {
                let left = self.visit_expr(left)?;
                if left.is_truthy() {
                    return Ok(Value::Boolean(true));
                }
                return Ok(Value::Boolean(self.visit_expr(right)?.is_truthy()));
            }
            _ => {}
        }

        let left = self.visit_expr(left)?;
        let right = self.visit_expr(right)?;
        ops::binary_op(operator, &left, &right).map_err(|err| self.lift(err, operator))
    }

    fn visit_postfix(&mut self, left: &Expr, operator: &Token) -> EvalResult {
        match left {
            Expr::Identifier { name } => {
                let (previous, _) = self.step(name, operator)?;
                Ok(previous)
            }
            _ => Err(self.lift(
                BasicError::new(format!("cannot apply '{}' to {}", operator.lexeme, left)),
                operator,
            )),
        }
    }

    fn visit_call(&mut self, callee: &Expr, paren: &Token, args: &[Expr]) -> EvalResult {
        let callee = self.visit_expr(callee)?;
        let mut evaluated = Vec::with_capacity(args.len());
        for arg in args {
            evaluated.push(self.visit_expr(arg)?);
        }

        let callable = callee.as_callable().ok_or_else(|| {
            self.lift(
                BasicError::new(format!("not a function: {}", callee.type_name())),
                paren,
            )
        })?;

        let arity = callable.arity();
        if !arity.accepts(evaluated.len()) {
            return Err(self.lift(
                BasicError::new(format!(
                    "wrong number of arguments: want={}, got={}",
                    arity,
                    evaluated.len()
                )),
                paren,
            ));
        }

        if callable.is_builtin() {
            return callable
                .execute(self, &evaluated)
                .map_err(|err| self.locate(err, paren));
        }

        if self.frames.len() >= self.config.max_call_depth {
            return Err(self.lift(BasicError::new("maximum recursion depth exceeded"), paren));
        }

        debug!("calling {}", callable.name());
        let frame = StackFrame::new(callable.name(), self.position(paren));
        self.frames.push(frame);
        let result = callable.execute(self, &evaluated);
        self.frames.pop();

        result.map_err(|err| self.locate(err, paren))
    }

    fn visit_index(&mut self, object: &Expr, bracket: &Token, index: &Expr) -> EvalResult {
        let object = self.visit_expr(object)?;
        let index = self.visit_expr(index)?;
        ops::index(&object, &index).map_err(|err| self.lift(err, bracket))
    }

    fn visit_slice(
        &mut self,
        object: &Expr,
        bracket: &Token,
        start: Option<&Expr>,
        end: Option<&Expr>,
    ) -> EvalResult {
        let object = self.visit_expr(object)?;
        let start = start.map(|start| self.visit_expr(start)).transpose()?;
        let end = end.map(|end| self.visit_expr(end)).transpose()?;
        ops::slice(&object, start.as_ref(), end.as_ref()).map_err(|err| self.lift(err, bracket))
    }

    fn visit_dot(&mut self, object: &Expr, name: &Token) -> EvalResult {
        let object = self.visit_expr(object)?;
        self.get_attribute(&object, name)
    }

    fn visit_array(&mut self, _: &Token, elements: &[Expr]) -> EvalResult {
        let mut values = Vec::with_capacity(elements.len());
        for element in elements {
            values.push(self.visit_expr(element)?);
        }
        Ok(Value::array(values))
    }

    fn visit_tuple(&mut self, _: &Token, elements: &[Expr]) -> EvalResult {
        let mut values = Vec::with_capacity(elements.len());
        for element in elements {
            values.push(self.visit_expr(element)?);
        }
        Ok(Value::tuple(values))
    }

    fn visit_hash(&mut self, brace: &Token, pairs: &[(Expr, Expr)]) -> EvalResult {
        let mut values = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let key = self.visit_expr(key)?;
            let value = self.visit_expr(value)?;
            values.push((key, value));
        }
        Value::hash(values).map_err(|err| self.lift(err, brace))
    }

    fn visit_fstring(&mut self, _: &Token, parts: &[FStringPart]) -> EvalResult {
        let mut result = String::new();
        for part in parts {
            match part {
                FStringPart::Text(text) => result.push_str(text),
                FStringPart::Expr(expr) => {
                    let value = self.visit_expr(expr)?;
                    result.push_str(&value.to_string());
                }
            }
        }
        Ok(Value::from(result))
    }

    fn visit_super(&mut self, keyword: &Token, method: &Token) -> EvalResult {
        let (parent, receiver) = {
            let env = self.env.borrow();
            (env.get("super"), env.get("self"))
        };

        match (parent, receiver) {
            (Some(Value::Grimoire(parent)), Some(receiver)) => {
                match parent.find_method(&method.lexeme) {
                    Some((decl, owner)) => {
                        self.check_access(&method.lexeme, &owner, method)?;
                        Ok(Value::BoundMethod(Rc::new(BoundMethod::new(
                            receiver, decl, owner,
                        ))))
                    }
                    None => Err(self.lift(
                        BasicError::new(format!(
                            "undefined method '{}' on grimoire {}",
                            method.lexeme, parent.name
                        )),
                        method,
                    )),
                }
            }
            _ => Err(self.lift(
                BasicError::new("super used outside of a method of a grimoire with a parent"),
                keyword,
            )),
        }
    }
}

impl Interpreter {
    // `++` and `--` on a variable, returning the value before and after the update
    fn step(&mut self, name: &Token, operator: &Token) -> Result<(Value, Value), Rc<ErrorObject>> {
        let current = self.lookup(name)?;
        let op = ops::compound_operator(operator).ok_or_else(|| {
            self.lift(
                BasicError::new(format!("unknown operator: {}", operator.lexeme)),
                operator,
            )
        })?;
        let updated = ops::binary_op(&op, &current, &Value::Integer(1))
            .map_err(|err| self.lift(err, operator))?;
        self.set_variable(&name.lexeme, updated.clone());
        Ok((current, updated))
    }
}

impl StmtVisitor for Interpreter {
    type Item = Flow;

    fn visit_expression(&mut self, expression: &Expr) -> Flow {
        Flow::Value(try_flow!(self.visit_expr(expression)))
    }

    fn visit_assign(&mut self, target: &Expr, operator: &Token, value: &Expr) -> Flow {
        let value = try_flow!(self.visit_expr(value));
        let result = if operator.is(Type::Assign) {
            self.assign_to(target, value)
        } else {
            self.compound_assign(target, operator, value)
        };

        match result {
            Ok(()) => Flow::Value(Value::None),
            Err(err) => Flow::Error(err),
        }
    }

    fn visit_return(&mut self, _: &Token, value: Option<&Expr>) -> Flow {
        match value {
            Some(value) => Flow::Return(try_flow!(self.visit_expr(value))),
            None => Flow::Return(Value::None),
        }
    }

    fn visit_if(
        &mut self,
        condition: &Expr,
        consequence: &[Stmt],
        branches: &[(Expr, Vec<Stmt>)],
        alternative: Option<&[Stmt]>,
    ) -> Flow {
        if try_flow!(self.visit_expr(condition)).is_truthy() {
            return self.execute_block(consequence);
        }
        for (condition, body) in branches {
            if try_flow!(self.visit_expr(condition)).is_truthy() {
                return self.execute_block(body);
            }
        }
        match alternative {
            Some(alternative) => self.execute_block(alternative),
            None => Flow::Value(Value::None),
        }
    }

    fn visit_while(&mut self, condition: &Expr, body: &[Stmt]) -> Flow {
        while try_flow!(self.visit_expr(condition)).is_truthy() {
            match self.execute_block(body) {
                Flow::Break => break,
                Flow::Value(_) | Flow::Continue => {}
                flow => return flow,
            }
        }
        Flow::Value(Value::None)
    }

    fn visit_for(
        &mut self,
        variable: &Expr,
        iterable: &Expr,
        body: &[Stmt],
        alternative: Option<&[Stmt]>,
    ) -> Flow {
        let sequence = try_flow!(self.visit_expr(iterable));
        let elements = match sequence.elements() {
            Some(elements) => elements,
            None => {
                return Flow::Error(self.lift(
                    BasicError::new(format!("cannot iterate over {}", sequence.type_name())),
                    iterable.token(),
                ))
            }
        };

        for element in elements {
            try_flow!(self.assign_to(variable, element));
            match self.execute_block(body) {
                // A stopped loop skips the else block
                Flow::Break => return Flow::Value(Value::None),
                Flow::Value(_) | Flow::Continue => {}
                flow => return flow,
            }
        }

        match alternative {
            Some(alternative) => self.execute_block(alternative),
            None => Flow::Value(Value::None),
        }
    }

    fn visit_spell(&mut self, decl: &Rc<SpellDecl>) -> Flow {
        debug!("defining spell {}", decl.name.lexeme);
        let function = Function::new(Rc::clone(decl), Rc::clone(&self.env));
        self.env
            .borrow_mut()
            .define(&decl.name.lexeme, Value::Function(Rc::new(function)));
        Flow::Value(Value::None)
    }

    fn visit_grimoire(&mut self, decl: &Rc<GrimoireDecl>) -> Flow {
        debug!("defining grimoire {}", decl.name.lexeme);
        let parent = match &decl.parent {
            Some(token) => match try_flow!(self.lookup(token)) {
                Value::Grimoire(parent) => Some(parent),
                other => {
                    return Flow::Error(self.lift(
                        BasicError::new(format!(
                            "cannot inherit from {}, it is not a grimoire",
                            other.type_name()
                        )),
                        token,
                    ))
                }
            },
            None => None,
        };

        let methods: AHashMap<String, Rc<SpellDecl>> = decl
            .methods
            .iter()
            .map(|method| (method.name.lexeme.clone(), Rc::clone(method)))
            .collect();

        let grimoire = Grimoire::new(
            &decl.name.lexeme,
            parent,
            decl.init.clone(),
            methods,
            Rc::clone(&self.env),
            decl.is_arcane,
        );
        self.env
            .borrow_mut()
            .define(&decl.name.lexeme, Value::Grimoire(grimoire));
        Flow::Value(Value::None)
    }

    fn visit_import(&mut self, keyword: &Token, path: &str, alias: Option<&Token>) -> Flow {
        let target = self.imports.resolve(path);
        if self.imports.is_imported(&target.path) {
            debug!("{} is already imported", target.path.display());
            return Flow::Value(Value::None);
        }
        let module = try_flow!(self.load_module(keyword, path, &target));

        match (&target.grimoire, alias) {
            (None, Some(alias)) => {
                let namespace = Namespace {
                    name: alias.lexeme.clone(),
                    env: module,
                };
                self.env
                    .borrow_mut()
                    .define(&alias.lexeme, Value::Namespace(Rc::new(namespace)));
            }
            (Some(name), alias) => {
                let grimoire = module.borrow().get_local(name);
                match grimoire {
                    Some(grimoire @ Value::Grimoire(_)) => {
                        let binding = alias.map_or(name.as_str(), |alias| alias.lexeme.as_str());
                        self.env.borrow_mut().define(binding, grimoire);
                    }
                    _ => {
                        let traced = ErrorWithTrace::new(
                            "ImportError",
                            &format!("grimoire {} not found in '{}'", name, path),
                            self.position(keyword),
                        )
                        .with_stack(self.stack_snapshot());
                        return Flow::Error(Rc::new(ErrorObject::Trace(traced)));
                    }
                }
            }
            (None, None) => {
                let entries = module.borrow().entries();
                for (name, value) in entries {
                    if matches!(value, Value::Grimoire(_)) {
                        self.env.borrow_mut().define(&name, value);
                    }
                }
            }
        }
        Flow::Value(Value::None)
    }

    fn visit_match(&mut self, subject: &Expr, cases: &[Case], default: Option<&[Stmt]>) -> Flow {
        let subject = try_flow!(self.visit_expr(subject));
        for case in cases {
            let candidate = try_flow!(self.visit_expr(&case.condition));
            if ops::matches_case(&subject, &candidate) {
                return self.execute_block(&case.body);
            }
        }
        match default {
            Some(default) => self.execute_block(default),
            None => Flow::Value(Value::None),
        }
    }

    fn visit_attempt(
        &mut self,
        body: &[Stmt],
        ensnares: &[Ensnare],
        resolve: Option<&[Stmt]>,
    ) -> Flow {
        let err = match self.execute_block(body) {
            Flow::Error(err) => err,
            flow => return flow,
        };

        let mut result = Flow::Error(Rc::clone(&err));
        for ensnare in ensnares {
            match self.ensnares(ensnare, &err) {
                Ok(true) => {
                    debug!("ensnared {}", err);
                    let mut env = self.env.borrow_mut();
                    if let Some(Expr::Identifier { name }) = &ensnare.condition {
                        if env.get(&name.lexeme).is_none() {
                            env.define(&name.lexeme, Value::Caught(Rc::clone(&err)));
                        }
                    }
                    if let Some(alias) = &ensnare.alias {
                        env.define(&alias.lexeme, Value::Caught(Rc::clone(&err)));
                    }
                    drop(env);

                    result = self.execute_block(&ensnare.body);
                    break;
                }
                Ok(false) => {}
                Err(err) => {
                    result = Flow::Error(err);
                    break;
                }
            }
        }

        // Only reached when the attempt block failed
        if let Some(resolve) = resolve {
            match self.execute_block(resolve) {
                Flow::Value(_) => {}
                flow => result = flow,
            }
        }
        result
    }

    fn visit_raise(&mut self, keyword: &Token, value: &Expr) -> Flow {
        let value = try_flow!(self.visit_expr(value));
        Flow::Error(self.raised(value, keyword))
    }

    fn visit_stop(&mut self) -> Flow {
        Flow::Break
    }

    fn visit_skip(&mut self) -> Flow {
        Flow::Continue
    }

    fn visit_ignore(&mut self) -> Flow {
        Flow::Value(Value::None)
    }

    fn visit_global(&mut self, names: &[Token]) -> Flow {
        let mut env = self.env.borrow_mut();
        for name in names {
            env.declare_global(&name.lexeme);
        }
        Flow::Value(Value::None)
    }

    // The body runs in its own scope. A resource with a `close` spell is closed however the body
    // ends, a failing close only surfaces when the body itself succeeded.
    fn visit_with(
        &mut self,
        keyword: &Token,
        resource: &Expr,
        alias: Option<&Token>,
        body: &[Stmt],
    ) -> Flow {
        let resource = try_flow!(self.visit_expr(resource));
        let mut env = Environment::with(Rc::clone(&self.env));
        if let Some(alias) = alias {
            env.define(&alias.lexeme, resource.clone());
        }

        let previous = mem::replace(&mut self.env, Rc::new(RefCell::new(env)));
        let flow = self.execute_block(body);
        self.env = previous;

        let close = match &resource {
            Value::Instance(instance) => instance.grimoire.find_method("close"),
            _ => None,
        };
        if let Some((method, owner)) = close {
            debug!("closing {} after with block", owner.name);
            let closure = Rc::clone(&owner.env);
            let closed = self.invoke(&method, closure, Some((resource, owner)), &[]);
            if let (Err(err), false) = (closed, matches!(flow, Flow::Error(_))) {
                return Flow::Error(self.locate(err, keyword));
            }
        }
        flow
    }

    fn visit_main(&mut self, body: &[Stmt]) -> Flow {
        self.execute_block(body)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::str;
    use std::thread;

    use crate::callable::Arity;
    use crate::config::Config;
    use crate::interpreter::Interpreter;
    use crate::parser::Parser;
    use crate::trace::BasicError;
    use crate::value::Value;

    // Deep recursion in the evaluator needs more native stack than the default test thread has
    fn run_with(src: &str, config: Config) -> (String, Result<String, String>) {
        let src = String::from(src);
        thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(move || {
                let mut parser = Parser::new(&src);
                let program = parser.parse_program();
                assert_eq!(parser.errors(), Vec::<String>::new(), "source:\n{}", src);

                let output: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
                let mut interpreter = Interpreter::with_config(output.clone(), config);
                let result = interpreter
                    .interpret(&program)
                    .map(|value| value.to_string())
                    .map_err(|err| err.to_string());
                let output = String::from(str::from_utf8(&output.borrow()).unwrap());
                (output, result)
            })
            .unwrap()
            .join()
            .unwrap()
    }

    fn run(src: &str) -> (String, Result<String, String>) {
        run_with(src, Config::default())
    }

    fn test_output(src: &str, expected: &str) {
        let (output, result) = run(src);
        assert!(result.is_ok(), "unexpected error {:?} for:\n{}", result, src);
        assert_eq!(output, expected, "source:\n{}", src);
    }

    fn test_value(src: &str, expected: &str) {
        let (_, result) = run(src);
        assert_eq!(result, Ok(String::from(expected)), "source:\n{}", src);
    }

    fn test_error(src: &str, expected: &str) {
        let (_, result) = run(src);
        assert_eq!(result, Err(String::from(expected)), "source:\n{}", src);
    }

    #[test]
    fn test_end_to_end_values() {
        let tests = [
            ("spell add(x, y): return x + y\nadd(2, 3)\n", "5"),
            ("x = 5\nx += 3\nx\n", "8"),
            ("[1, 2, 3][1]\n", "2"),
            ("\"hello\"[1]\n", "e"),
            ("7 / 2\n", "3"),
            ("-7 / 2\n", "-3"),
            ("7 / 2.0\n", "3.5"),
            ("1 + 2 * 3\n", "7"),
            ("2 ** 3 ** 2\n", "512"),
            ("-2 ** 2\n", "4"),
            ("h = {\"a\": 1}\nh[\"a\"]\n", "1"),
            ("h = {\"a\": 1}\nh[\"b\"]\n", "None"),
            ("0 and True\n", "True"),
            ("None or 0\n", "True"),
            ("not []\n", "True"),
            ("3 in [1, 2, 3]\n", "True"),
            ("\"z\" not in \"abc\"\n", "True"),
            ("x = 1\nx++\n", "1"),
            ("x = 1\n++x\n", "2"),
            ("a, b = 1, 2\na, b = b, a\n(a, b)\n", "(2, 1)"),
            ("[1, 2, 3, 4][1:3]\n", "[2, 3]"),
            ("f\"sum={1 + 2}\"\n", "sum=3"),
        ];

        for (src, expected) in tests {
            test_value(src, expected);
        }
    }

    #[test]
    fn test_programs() {
        let tests = [
            (
                "x = 0\nwhile x < 3:\n    print(x)\n    x += 1\n",
                "0\n1\n2\n",
            ),
            (
                "for i in range(5):\n    if i == 1: skip\n    if i == 3: stop\n    print(i)\nelse:\n    print(\"done\")\n",
                "0\n2\n",
            ),
            (
                "for i in range(2):\n    print(i)\nelse:\n    print(\"done\")\n",
                "0\n1\ndone\n",
            ),
            (
                "for k, v in pairs({\"b\": 2, \"a\": 1}):\n    print(k, v)\n",
                "a 1\nb 2\n",
            ),
            (
                "x = 15\nif x < 10:\n    print(\"small\")\notherwise x < 20:\n    print(\"medium\")\nelse:\n    print(\"large\")\n",
                "medium\n",
            ),
            (
                "match 2:\n    case 1:\n        print(\"one\")\n    case 2:\n        print(\"two\")\n    _:\n        print(\"other\")\n",
                "two\n",
            ),
            (
                "match 2.0:\n    case 2:\n        print(\"int\")\n    _:\n        print(\"other\")\n",
                "other\n",
            ),
            (
                "print(1, 2.0, \"three\", [\"four\"], None, True)\n",
                "1 2.0 three [\"four\"] None True\n",
            ),
            (
                "spell greet(name, greeting = \"hello\"):\n    print(greeting, name)\ngreet(\"bob\")\ngreet(\"amy\", \"hi\")\n",
                "hello bob\nhi amy\n",
            ),
            (
                "spell show(a, b):\n    print(a, b)\nshow(1)\n",
                "1 None\n",
            ),
        ];

        for (src, expected) in tests {
            test_output(src, expected);
        }
    }

    #[test]
    fn test_closures() {
        let src = "\
spell make_counter():
    count = 0
    spell counter():
        count += 1
        return count
    return counter

c = make_counter()
c()
c()
print(c())
other = make_counter()
print(other())
";
        test_output(src, "3\n1\n");
    }

    #[test]
    fn test_assignment_writes_to_defining_scope() {
        let src = "\
total = 0
spell add(n):
    total = total + n
add(2)
add(3)
print(total)
spell local():
    fresh = 1
local()
print(fresh)
";
        let (output, result) = run(src);
        assert_eq!(output, "5\n");
        assert_eq!(
            result,
            Err(String::from(
                "[line 10:7] NameError: identifier not found: fresh"
            ))
        );
    }

    #[test]
    fn test_global() {
        let src = "\
spell setup():
    global config
    config = 42
setup()
print(config)
";
        test_output(src, "42\n");
    }

    #[test]
    fn test_with_closes_resources() {
        let src = "\
grim Resource:
    init(name):
        self.name = name
    spell close():
        print(\"closing \" + self.name)

with Resource(\"log\") as r:
    print(\"using \" + r.name)
attempt:
    with Resource(\"db\") as db:
        raise Error(\"IOError\", \"disk full\")
ensnare as err:
    print(err.message)
with 5 as n: print(n + 1)
";
        test_output(src, "using log\nclosing log\nclosing db\ndisk full\n6\n");
        test_error(
            "with 1 as n: ignore\nn\n",
            "[line 2:1] NameError: identifier not found: n",
        );
    }

    #[test]
    fn test_map_unpacking() {
        test_output(
            "keys, values = {\"b\": 2, \"a\": 1}\nprint(keys, values)\n",
            "[\"a\", \"b\"] [1, 2]\n",
        );
        test_error(
            "a, b, c = {1: 2}\n",
            "[line 1:1] TypeError: cannot unpack MAP",
        );
    }

    #[test]
    fn test_grimoires() {
        let src = "\
grim Shape:
    init(name):
        self.name = name
    spell area():
        return 0
    spell describe():
        return f\"{self.name} with area {self.area()}\"

grim Square(Shape):
    init(side):
        super.init(\"square\")
        self.side = side
    spell area():
        return self.side * self.side

s = Square(3)
print(s.describe())
print(s)
print(Square)
print(s.area)
";
        test_output(
            src,
            "square with area 9\n<Square instance>\n<grimoire Square>\n<bound spell Square.area>\n",
        );
    }

    #[test]
    fn test_field_shadows_method() {
        let src = "\
grim Circle:
    init(r):
        self.r = r
    spell area():
        return 3 * self.r * self.r

c = Circle(2)
print(c.area())
c.area = \"field\"
print(c.area)
";
        test_output(src, "12\nfield\n");
    }

    #[test]
    fn test_static_method_access() {
        let src = "\
grim Math:
    spell double(x):
        return x * 2
print(Math.double(21))
";
        test_output(src, "42\n");
    }

    #[test]
    fn test_type_hints() {
        let src = "\
grim Shape:
    spell area():
        return 0

grim Square(Shape):
    init(side: int):
        self.side = side

spell scale(x: int, factor: float = 2):
    return x * factor
spell echo(s: str):
    return s
spell describe(shape: Shape, label: string):
    return f\"{label} {shape.side}\"

print(scale(3))
print(scale(1.5, 2))
print(echo(None))
print(describe(Square(2), \"square\"))
";
        test_output(src, "6\n3.0\nNone\nsquare 2\n");

        let tests = [
            (
                "spell f(x: int): return x\nf(\"a\")\n",
                "[line 2:2] TypeError: parameter 'x' expects int but got String",
            ),
            (
                "spell g(x: str = 5): return x\ng()\n",
                "[line 2:2] TypeError: parameter 'x' expects str but got Integer",
            ),
            (
                "grim Box:\n    init(size: int):\n        self.size = size\nBox([1])\n",
                "[line 4:4] TypeError: parameter 'size' expects int but got Array",
            ),
            (
                "grim A:\n    spell f():\n        return 1\nspell h(b: B): return b\nh(A())\n",
                "[line 5:2] TypeError: parameter 'b' expects B but got A",
            ),
        ];

        for (src, expected) in tests {
            test_error(src, expected);
        }
    }

    #[test]
    fn test_primitive_grimoires() {
        let src = "\
grim String:
    spell shout():
        return self.value + \"!\"

grim Array:
    spell total():
        acc = 0
        for x in self.elements:
            acc += x
        return acc

grim Integer:
    spell double():
        return self.value * 2

print(\"hi\".shout())
print([1, 2, 3].total())
n = 21
print(n.double())
";
        test_output(src, "hi!\n6\n42\n");

        test_error(
            "x = True\nx.flip()\n",
            "[line 2:3] AttributeError: undefined attribute 'flip' on BOOLEAN",
        );
    }

    #[test]
    fn test_method_access() {
        let base = "\
grim Account:
    init(balance):
        self.balance = balance
    spell __audit():
        return \"audited\"
    spell _fee():
        return 1
    spell withdraw(n):
        self.__audit()
        return self.balance - n - self._fee()
grim Savings(Account):
    spell _fee():
        return 0
    spell report():
        return self._fee()
    spell peek():
        return self.__audit()
a = Account(10)
s = Savings(10)
";
        test_output(
            &format!("{}print(a.withdraw(3))\nprint(s.withdraw(3))\nprint(s.report())\n", base),
            "6\n7\n0\n",
        );

        let tests = [
            (
                "a.__audit()\n",
                "[line 20:3] AttributeError: private method '__audit' is not accessible outside grimoire Account",
            ),
            (
                "a._fee()\n",
                "[line 20:3] AttributeError: protected method '_fee' is not accessible outside the Account hierarchy",
            ),
            (
                "s.peek()\n",
                "[line 17:21] AttributeError: private method '__audit' is not accessible outside grimoire Account",
            ),
            (
                "Account.__audit()\n",
                "[line 20:9] AttributeError: private method '__audit' is not accessible outside grimoire Account",
            ),
        ];

        for (src, expected) in tests {
            test_error(&format!("{}{}", base, src), expected);
        }
    }

    #[test]
    fn test_arcane_grimoires() {
        let base = "\
arcane grim Shape:
    @arcanespell
    spell area():
        ignore
    spell name():
        return \"shape\"

grim Square(Shape):
    spell area():
        return 4

grim Broken(Shape):
    ignore
";
        test_output(&format!("{}print(Square().area(), Square().name())\n", base), "4 shape\n");
        test_error(
            &format!("{}Shape()\n", base),
            "[line 14:6] TypeError: cannot instantiate arcane grimoire Shape",
        );
        test_error(
            &format!("{}Broken()\n", base),
            "[line 14:7] TypeError: cannot instantiate Broken: arcane spell area is not implemented",
        );
    }

    #[test]
    fn test_exception_flow() {
        let src = "\
spell risky():
    attempt:
        raise Error(\"ValueError\", \"x\")
    ensnare:
        return 1
risky()
";
        test_value(src, "1");

        let src = "\
attempt:
    raise Error(\"ValueError\", \"bad\")
ensnare \"KeyError\":
    print(\"wrong\")
";
        test_error(src, "[line 2:5] ValueError: bad");
    }

    #[test]
    fn test_ensnare_matching() {
        let src = "\
grim AppError:
    init(message):
        self.message = message
grim DbError(AppError):
    ignore

attempt:
    raise DbError(\"connection lost\")
ensnare AppError as err:
    print(err.type, err.message)

attempt:
    1 / 0
ensnare \"ZeroDivisionError\" as err:
    print(err.name, err.message)

attempt:
    [1][5]
ensnare \"index out of bounds\" as err:
    print(err.name)

attempt:
    missing
ensnare problem:
    print(problem.message)
";
        test_output(
            src,
            "DbError connection lost\nZeroDivisionError division by zero\nIndexError\nidentifier not found: missing\n",
        );
    }

    #[test]
    fn test_resolve_runs_only_after_an_error() {
        let src = "\
attempt:
    print(\"fine\")
ensnare:
    print(\"caught\")
resolve:
    print(\"resolve\")

attempt:
    raise \"boom\"
ensnare:
    print(\"caught\")
resolve:
    print(\"resolve\")
";
        test_output(src, "fine\ncaught\nresolve\n");
    }

    #[test]
    fn test_reraise_keeps_original() {
        let src = "\
attempt:
    attempt:
        raise Error(\"ValueError\", \"inner\")
    ensnare as err:
        raise err
ensnare as outer:
    print(outer.name, outer.message)
";
        test_output(src, "ValueError inner\n");
    }

    #[test]
    fn test_raise_non_error() {
        test_error("raise 5\n", "[line 1:1] TypeError: cannot raise non-error object: INTEGER");
    }

    #[test]
    fn test_runtime_errors() {
        let tests = [
            ("5 + True\n", "[line 1:3] TypeError: type mismatch: INTEGER + BOOLEAN"),
            ("1 / 0\n", "[line 1:3] ZeroDivisionError: division by zero"),
            ("x\n", "[line 1:1] NameError: identifier not found: x"),
            ("[1, 2][2]\n", "[line 1:7] IndexError: index out of bounds: index 2 for length 2"),
            ("{[1]: 2}\n", "[line 1:1] TypeError: unusable as hash key: ARRAY"),
            ("5()\n", "[line 1:2] TypeError: not a function: INTEGER"),
            (
                "spell f(a): return a\nf(1, 2)\n",
                "[line 2:2] ArgumentError: wrong number of arguments: want=<=1, got=2",
            ),
            ("len(1, 2)\n", "[line 1:4] ArgumentError: wrong number of arguments: want=1, got=2"),
            ("len(5)\n", "[line 1:4] TypeError: cannot take the length of INTEGER"),
            ("(1, 2)[0] = 3\n", "[line 1:7] TypeError: cannot assign to index of TUPLE"),
            ("a, b = [1]\n", "[line 1:1] TypeError: cannot unpack 1 values into 2 names"),
            (
                "super.init()\n",
                "[line 1:1] RuntimeError: super used outside of a method of a grimoire with a parent",
            ),
        ];

        for (src, expected) in tests {
            test_error(src, expected);
        }
    }

    #[test]
    fn test_recursion_limit() {
        let src = "spell down(n): return down(n + 1)\ndown(0)\n";
        let config = Config {
            max_call_depth: 50,
            ..Config::default()
        };
        let (_, result) = run_with(src, config);
        let err = result.unwrap_err();
        assert!(
            err.ends_with("RecursionError: maximum recursion depth exceeded"),
            "{}",
            err
        );
    }

    #[test]
    fn test_deep_recursion_within_limit() {
        let src = "\
spell fib(n):
    if n < 2: return n
    return fib(n - 1) + fib(n - 2)
fib(15)
";
        test_value(src, "610");
    }

    #[test]
    fn test_main_block_runs_last() {
        let src = "\
main:
    print(\"main\", value)
print(\"setup\")
value = 1
\"discarded\"
";
        let (output, result) = run(src);
        assert_eq!(output, "setup\nmain 1\n");
        assert_eq!(result, Ok(String::from("None")));
    }

    #[test]
    fn test_stack_trace() {
        let src = "\
spell inner():
    return 1 / 0
spell outer():
    return inner()
outer()
";
        let frames = thread::spawn(move || {
            let mut parser = Parser::new(src);
            let program = parser.parse_program();
            let output: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
            let mut interpreter = Interpreter::new(output);
            let err = interpreter.interpret(&program).unwrap_err();
            err.stack()
                .iter()
                .map(|frame| frame.to_string())
                .collect::<Vec<String>>()
        })
        .join()
        .unwrap();

        assert_eq!(
            frames,
            vec![
                String::from("[line 4:17] in inner"),
                String::from("[line 5:6] in outer"),
            ]
        );
    }

    #[test]
    fn test_register_builtin() {
        let output: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
        let mut interpreter = Interpreter::new(output.clone());
        interpreter.register_builtin(
            "double",
            Arity::Fixed(1),
            Box::new(|args: &[Value]| match &args[0] {
                Value::Integer(n) => Ok(Value::Integer(n * 2)),
                other => Err(BasicError::new(format!(
                    "type mismatch: double() expects INTEGER, got {}",
                    other.type_name()
                ))),
            }),
        );

        let mut parser = Parser::new("print(double(21))\ndouble(\"x\")\n");
        let program = parser.parse_program();
        let err = interpreter.interpret(&program).unwrap_err();

        assert_eq!(str::from_utf8(&output.borrow()).unwrap(), "42\n");
        assert_eq!(
            err.to_string(),
            "[line 2:7] TypeError: type mismatch: double() expects INTEGER, got STRING"
        );
    }
}
