use std::cell::RefCell;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::rc::Rc;

use crate::ast::Program;

pub mod ast;
pub mod callable;
pub mod config;
pub mod enhanced;
pub mod env;
pub mod error;
pub mod import;
pub mod interpreter;
pub mod parser;
pub mod trace;
pub mod value;

mod builtins;
mod limits;
mod ops;

pub use crate::config::Config;
pub use crate::error::{Error, ParseError};
pub use crate::interpreter::Interpreter;
pub use crate::parser::Parser;
pub use crate::value::Value;

/// Parses `src` into a program and its rendered diagnostics. A program with diagnostics is
/// incomplete and should not be run.
pub fn parse(src: &str) -> (Program, Vec<String>) {
    let mut parser = Parser::new(src);
    let program = parser.parse_program();
    (program, parser.errors())
}

/// Parses and runs `src` in a fresh interpreter writing to `stdout`.
pub fn run(src: &str, stdout: Rc<RefCell<dyn Write>>, config: Config) -> Result<Value, Error> {
    let mut parser = Parser::new(src);
    let program = parser.parse_program();
    if !parser.diagnostics().is_empty() {
        return Err(Error::Parse(parser.diagnostics().to_vec()));
    }

    let mut interpreter = Interpreter::with_config(stdout, config);
    interpreter.interpret(&program).map_err(Error::Runtime)
}

/// Like [`run`], reading the program from `path` and reporting error positions against it.
pub fn run_file(
    path: &Path,
    stdout: Rc<RefCell<dyn Write>>,
    config: Config,
) -> Result<Value, Error> {
    let src = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut parser = Parser::new(&src);
    let program = parser.parse_program();
    if !parser.diagnostics().is_empty() {
        return Err(Error::Parse(parser.diagnostics().to_vec()));
    }

    let mut interpreter = Interpreter::with_config(stdout, config);
    interpreter.set_file(&path.display().to_string());
    interpreter.interpret(&program).map_err(Error::Runtime)
}
