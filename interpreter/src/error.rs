use std::path::PathBuf;
use std::rc::Rc;

use carrion_core::Token;
use thiserror::Error;

use crate::trace::ErrorObject;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[error("[line {line}:{col}] parser error: {msg}")]
pub struct ParseError {
    // Copied from the offending token, thiserror can't format through field access
    pub line: usize,
    pub col: usize,
    pub msg: String,
}

impl ParseError {
    pub(crate) fn new(token: &Token, msg: &str) -> Self {
        ParseError {
            line: token.line,
            col: token.col,
            msg: String::from(msg),
        }
    }
}

/// Failures of a whole run, as seen by embedders and the command line.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{}", render_parse_errors(.0))]
    Parse(Vec<ParseError>),

    #[error("could not read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Runtime(Rc<ErrorObject>),
}

fn render_parse_errors(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(|err| err.to_string())
        .collect::<Vec<String>>()
        .join("\n")
}
