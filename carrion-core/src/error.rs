use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    #[error("[line {line}] unterminated block comment")]
    UnterminatedBlockComment { line: usize },

    #[error("[line {line}:{col}] unterminated string")]
    UnterminatedString { line: usize, col: usize },

    #[error("[line {line}:{col}] unexpected character '{ch}'")]
    UnexpectedCharacter { ch: char, line: usize, col: usize },

    #[error("[line {line}:{col}] unindent does not match any outer indentation level")]
    InconsistentDedent { line: usize, col: usize },
}

impl Error {
    /// The message without its position prefix.
    pub fn reason(&self) -> String {
        match self {
            Error::UnterminatedBlockComment { .. } => String::from("unterminated block comment"),
            Error::UnterminatedString { .. } => String::from("unterminated string"),
            Error::UnexpectedCharacter { ch, .. } => format!("unexpected character '{}'", ch),
            Error::InconsistentDedent { .. } => {
                String::from("unindent does not match any outer indentation level")
            }
        }
    }

    pub fn line(&self) -> usize {
        match self {
            Error::UnterminatedBlockComment { line } => *line,
            Error::UnterminatedString { line, .. } => *line,
            Error::UnexpectedCharacter { line, .. } => *line,
            Error::InconsistentDedent { line, .. } => *line,
        }
    }

    pub fn col(&self) -> usize {
        match self {
            Error::UnterminatedBlockComment { .. } => 1,
            Error::UnterminatedString { col, .. } => *col,
            Error::UnexpectedCharacter { col, .. } => *col,
            Error::InconsistentDedent { col, .. } => *col,
        }
    }
}
