use std::fmt;
use std::fmt::{Display, Formatter, Write};
use std::rc::Rc;

use crate::error::ParseError;
use crate::trace::{ErrorObject, SourcePosition, StackFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLevel {
    Error,
    Note,
    Help,
}

impl Display for ErrorLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorLevel::Error => "error",
            ErrorLevel::Note => "note",
            ErrorLevel::Help => "help",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Syntax,
    Type,
    Runtime,
    Semantic,
    Import,
    Io,
    Custom,
}

impl ErrorCategory {
    /// Stable code printed in the rendered header.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCategory::Syntax => "SYNTAX_ERROR",
            ErrorCategory::Type => "TYPE_ERROR",
            ErrorCategory::Runtime => "RUNTIME_ERROR",
            ErrorCategory::Semantic => "SEMANTIC_ERROR",
            ErrorCategory::Import => "IMPORT_ERROR",
            ErrorCategory::Io => "IO_ERROR",
            ErrorCategory::Custom => "CUSTOM_ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorSpan {
    pub start: SourcePosition,
    pub end: SourcePosition,
    pub label: Option<String>,
}

impl ErrorSpan {
    /// A span covering a single column.
    pub fn point(position: SourcePosition) -> Self {
        let mut end = position.clone();
        end.col += 1;
        ErrorSpan {
            start: position,
            end,
            label: None,
        }
    }

    fn width(&self) -> usize {
        if self.end.line == self.start.line && self.end.col > self.start.col {
            self.end.col - self.start.col
        } else {
            1
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fix {
    pub description: String,
    pub replacement: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub message: String,
    pub fixes: Vec<Fix>,
}

impl Suggestion {
    pub fn new(message: &str) -> Self {
        Suggestion {
            message: String::from(message),
            fixes: Vec::new(),
        }
    }

    pub fn with_fix(mut self, description: &str, replacement: Option<&str>) -> Self {
        self.fixes.push(Fix {
            description: String::from(description),
            replacement: replacement.map(String::from),
        });
        self
    }
}

/// The richest error representation, used for everything shown to a user at the top level.
#[derive(Debug, Clone)]
pub struct EnhancedError {
    pub code: String,
    pub title: String,
    pub message: String,
    pub level: ErrorLevel,
    pub category: ErrorCategory,
    pub primary: Option<ErrorSpan>,
    pub labels: Vec<ErrorSpan>,
    pub suggestions: Vec<Suggestion>,
    pub notes: Vec<String>,
    pub related: Vec<EnhancedError>,
    pub cause: Option<Rc<ErrorObject>>,
    pub stack: Vec<StackFrame>,
    /// Text of the file the spans point into, when it is not the file being rendered.
    pub source: Option<Rc<str>>,
}

impl EnhancedError {
    pub fn new(category: ErrorCategory, title: &str, message: &str) -> Self {
        EnhancedError {
            code: String::from(category.code()),
            title: String::from(title),
            message: String::from(message),
            level: ErrorLevel::Error,
            category,
            primary: None,
            labels: Vec::new(),
            suggestions: Vec::new(),
            notes: Vec::new(),
            related: Vec::new(),
            cause: None,
            stack: Vec::new(),
            source: None,
        }
    }

    pub fn at(mut self, position: SourcePosition) -> Self {
        if position.is_known() {
            self.primary = Some(ErrorSpan::point(position));
        }
        self
    }

    pub fn with_label(mut self, position: SourcePosition, label: &str) -> Self {
        let mut span = ErrorSpan::point(position);
        span.label = Some(String::from(label));
        self.labels.push(span);
        self
    }

    pub fn with_suggestion(mut self, suggestion: Suggestion) -> Self {
        self.suggestions.push(suggestion);
        self
    }

    pub fn with_note(mut self, note: &str) -> Self {
        self.notes.push(String::from(note));
        self
    }

    pub fn with_source(mut self, source: Rc<str>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_related(mut self, related: Vec<EnhancedError>) -> Self {
        self.related.extend(related);
        self
    }

    /// Upgrades any error value, inferring the category from its name and message and looking up
    /// a remediation for it.
    pub fn from_error(err: &ErrorObject) -> Self {
        if let ErrorObject::Enhanced(enhanced) = err {
            return enhanced.as_ref().clone();
        }

        let message = err.message();
        let category = if err.is_custom() {
            ErrorCategory::Custom
        } else if err.name() == "ImportError" {
            ErrorCategory::Import
        } else if err.name() == "NameError" || message.contains("undefined") {
            ErrorCategory::Semantic
        } else if err.name() == "TypeError" || message.starts_with("type mismatch") {
            ErrorCategory::Type
        } else {
            ErrorCategory::Runtime
        };

        let mut enhanced = EnhancedError::new(category, err.name(), message);
        if let Some(position) = err.position() {
            enhanced = enhanced.at(position.clone());
        }
        enhanced.suggestions = suggestions_for(message);
        enhanced.stack = err.stack().to_vec();
        enhanced.cause = err.cause().cloned();
        if let ErrorObject::Trace(traced) = err {
            for (key, value) in &traced.details {
                enhanced.notes.push(format!("{}: {}", key, value));
            }
        }
        enhanced
    }

    /// One syntax error per parser diagnostic, spans taken from the recorded positions.
    pub fn from_parse_errors(errors: &[ParseError], file: Option<Rc<str>>) -> Vec<Self> {
        errors
            .iter()
            .map(|err| {
                let mut enhanced = EnhancedError::new(ErrorCategory::Syntax, "SyntaxError", &err.msg)
                    .at(SourcePosition::new(file.clone(), err.line, err.col));
                enhanced.suggestions = suggestions_for(&err.msg);
                enhanced
            })
            .collect()
    }
}

impl Display for EnhancedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]: {}: {}", self.level, self.code, self.title, self.message)
    }
}

struct Remedy {
    patterns: &'static [&'static str],
    help: &'static str,
    // Description and, when there is one, the code to write instead
    fixes: &'static [(&'static str, Option<&'static str>)],
}

// Checked in order, the first entry with a matching pattern wins
const REMEDIES: &[Remedy] = &[
    Remedy {
        patterns: &["identifier not found", "undefined variable", "undefined function"],
        help: "the name is not defined in this scope",
        fixes: &[
            ("check the spelling of the name", None),
            ("assign it before it is used", Some("name = value")),
            ("define the spell before calling it", Some("spell name(): ...")),
        ],
    },
    Remedy {
        patterns: &["wrong number of arguments"],
        help: "the call passes more arguments than the spell declares",
        fixes: &[
            ("match the parameter list of the spell", None),
            ("add parameters with defaults", Some("spell f(a, b = 0)")),
        ],
    },
    Remedy {
        patterns: &["invalid assignment"],
        help: "only variables, fields and index expressions can be assigned to",
        fixes: &[("assign to a name instead", Some("x = value"))],
    },
    Remedy {
        patterns: &["division by zero", "modulo by zero"],
        help: "the right operand evaluated to zero",
        fixes: &[("check the divisor first", Some("if d != 0: ..."))],
    },
    Remedy {
        patterns: &["type mismatch"],
        help: "the operands have types this operator cannot combine",
        fixes: &[("convert one side explicitly", Some("str(x), int(x) or float(x)"))],
    },
    Remedy {
        patterns: &["index out of bounds"],
        help: "the index is outside the valid range",
        fixes: &[("check the length first", Some("if i < len(xs): ..."))],
    },
    Remedy {
        patterns: &["to be :"],
        help: "a block statement needs a colon before its body",
        fixes: &[("add ':' at the end of the statement header", None)],
    },
    Remedy {
        patterns: &["indent"],
        help: "indentation does not line up with an enclosing block",
        fixes: &[
            ("indent every line of a block by the same amount", None),
            ("avoid mixing tabs and spaces", None),
        ],
    },
    Remedy {
        patterns: &["expected next token", "unexpected", "no prefix parse function"],
        help: "the parser found a token it did not expect here",
        fixes: &[("look for missing or extra punctuation around this position", None)],
    },
];

pub fn suggestions_for(message: &str) -> Vec<Suggestion> {
    REMEDIES
        .iter()
        .find(|remedy| remedy.patterns.iter().any(|pattern| message.contains(pattern)))
        .map(|remedy| {
            let suggestion = Suggestion::new(remedy.help);
            vec![remedy
                .fixes
                .iter()
                .fold(suggestion, |suggestion, (description, replacement)| {
                    suggestion.with_fix(description, *replacement)
                })]
        })
        .unwrap_or_default()
}

/// Plain text rendering with a source excerpt under the header when `source` is given.
/// `source` is the text of the file `err` was raised in. Spans pointing into other files are
/// excerpted from the error's own `source`, or not at all.
pub fn render(err: &EnhancedError, source: Option<&str>) -> String {
    let file = err.primary.as_ref().and_then(|span| span.start.file.clone());
    let mut out = String::new();
    // Writing into a String can't fail
    let _ = render_into(&mut out, err, source.map(|text| (file.as_ref(), text)));
    out
}

// `source` pairs a file name with its text
fn render_into(
    out: &mut String,
    err: &EnhancedError,
    source: Option<(Option<&Rc<str>>, &str)>,
) -> fmt::Result {
    writeln!(out, "{}[{}]: {}", err.level, err.code, err.title)?;

    if let Some(primary) = &err.primary {
        writeln!(out, "  --> {}", location(&primary.start))?;
        let text = match (&err.source, source) {
            (Some(own), _) => Some(own.as_ref()),
            (None, Some((file, text))) if file == primary.start.file.as_ref() => Some(text),
            _ => None,
        };
        if let Some(text) = text {
            excerpt(out, text, primary, '^')?;
            for label in err.labels.iter().filter(|label| label.start.file == primary.start.file) {
                excerpt(out, text, label, '-')?;
            }
        }
    }
    writeln!(out, "   = {}", err.message)?;

    for suggestion in &err.suggestions {
        writeln!(out, "   = {}: {}", ErrorLevel::Help, suggestion.message)?;
        for fix in &suggestion.fixes {
            match &fix.replacement {
                Some(replacement) => {
                    writeln!(out, "       fix: {} `{}`", fix.description, replacement)?
                }
                None => writeln!(out, "       fix: {}", fix.description)?,
            }
        }
    }

    for note in &err.notes {
        writeln!(out, "   = {}: {}", ErrorLevel::Note, note)?;
    }

    if !err.stack.is_empty() {
        writeln!(out, "stack backtrace:")?;
        for (i, frame) in err.stack.iter().enumerate() {
            writeln!(out, "  {:>2}: {}", i, frame)?;
        }
    }

    let mut cause = err.cause.as_ref();
    while let Some(err) = cause {
        writeln!(out, "caused by: {}", err)?;
        cause = err.cause();
    }

    for related in &err.related {
        out.push('\n');
        render_into(out, related, source)?;
    }
    Ok(())
}

fn location(position: &SourcePosition) -> String {
    match &position.file {
        Some(file) => format!("{}:{}:{}", file, position.line, position.col),
        None => format!("<input>:{}:{}", position.line, position.col),
    }
}

fn excerpt(out: &mut String, source: &str, span: &ErrorSpan, marker: char) -> fmt::Result {
    let line_no = span.start.line;
    let line = match source.lines().nth(line_no.saturating_sub(1)) {
        Some(line) if line_no > 0 => line,
        _ => return Ok(()),
    };

    let gutter = line_no.to_string().len();
    let padding = " ".repeat(span.start.col.saturating_sub(1));
    let underline = marker.to_string().repeat(span.width());

    writeln!(out, "{:>w$} |", "", w = gutter + 1)?;
    writeln!(out, "{:>w$} | {}", line_no, line, w = gutter + 1)?;
    match &span.label {
        Some(label) => writeln!(
            out,
            "{:>w$} | {}{} {}",
            "",
            padding,
            underline,
            label,
            w = gutter + 1
        ),
        None => writeln!(out, "{:>w$} | {}{}", "", padding, underline, w = gutter + 1),
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::enhanced::{render, suggestions_for, EnhancedError, ErrorCategory};
    use crate::error::ParseError;
    use crate::trace::{
        BasicError, CustomError, ErrorObject, ErrorWithTrace, SourcePosition, StackFrame,
    };

    #[test]
    fn test_suggestions() {
        let tests = [
            ("identifier not found: foo", "the name is not defined in this scope"),
            ("division by zero", "the right operand evaluated to zero"),
            ("type mismatch: INTEGER + STRING", "the operands have types this operator cannot combine"),
            (
                "expected next token to be :, got NEWLINE instead",
                "a block statement needs a colon before its body",
            ),
            ("expected an indented block", "indentation does not line up with an enclosing block"),
        ];

        for (message, help) in tests {
            let suggestions = suggestions_for(message);
            assert_eq!(suggestions.len(), 1, "no suggestion for {:?}", message);
            assert_eq!(suggestions[0].message, help);
            assert!(!suggestions[0].fixes.is_empty());
        }

        assert!(suggestions_for("all good").is_empty());
    }

    #[test]
    fn test_categories() {
        let position = SourcePosition::new(None, 1, 1);
        let tests = [
            (
                ErrorObject::Trace(ErrorWithTrace::new("NameError", "identifier not found: x", position.clone())),
                ErrorCategory::Semantic,
                "SEMANTIC_ERROR",
            ),
            (
                ErrorObject::Trace(ErrorWithTrace::new(
                    "TypeError",
                    "type mismatch: INTEGER + BOOLEAN",
                    position.clone(),
                )),
                ErrorCategory::Type,
                "TYPE_ERROR",
            ),
            (
                ErrorObject::Custom(CustomError::new("ValueError", "bad")),
                ErrorCategory::Custom,
                "CUSTOM_ERROR",
            ),
            (
                ErrorObject::Basic(BasicError::new("boom")),
                ErrorCategory::Runtime,
                "RUNTIME_ERROR",
            ),
        ];

        for (err, category, code) in tests {
            let enhanced = EnhancedError::from_error(&err);
            assert_eq!(enhanced.category, category);
            assert_eq!(enhanced.code, code);
        }
    }

    #[test]
    fn test_render_runtime_error() {
        let source = "spell divide(a, b):\n    return a / b\ndivide(1, 0)\n";
        let file: Rc<str> = Rc::from("math.crl");
        let err = ErrorObject::Trace(
            ErrorWithTrace::new(
                "ZeroDivisionError",
                "division by zero",
                SourcePosition::new(Some(file.clone()), 2, 14),
            )
            .with_stack(vec![StackFrame::new(
                "divide",
                SourcePosition::new(Some(file), 3, 7),
            )]),
        );

        let rendered = render(&EnhancedError::from_error(&err), Some(source));
        let expected = "\
error[RUNTIME_ERROR]: ZeroDivisionError
  --> math.crl:2:14
   |
 2 |     return a / b
   |              ^
   = division by zero
   = help: the right operand evaluated to zero
       fix: check the divisor first `if d != 0: ...`
stack backtrace:
   0: [math.crl:3:7] in divide
";
        assert_eq!(rendered, expected);
    }

    #[test]
    fn test_render_parse_errors() {
        let errors = [ParseError {
            line: 1,
            col: 5,
            msg: String::from("expected next token to be :, got NEWLINE instead"),
        }];
        let enhanced = EnhancedError::from_parse_errors(&errors, None);
        assert_eq!(enhanced.len(), 1);
        assert_eq!(enhanced[0].code, "SYNTAX_ERROR");

        let rendered = render(&enhanced[0], Some("if x\n    y\n"));
        assert!(rendered.starts_with("error[SYNTAX_ERROR]: SyntaxError\n  --> <input>:1:5\n"));
        assert!(rendered.contains(" 1 | if x\n   |     ^\n"));
        assert!(rendered.contains("= help: a block statement needs a colon before its body"));
    }

    #[test]
    fn test_render_cause_and_related() {
        let cause = Rc::new(ErrorObject::Basic(BasicError::new("file not found")));
        let mut err = EnhancedError::new(ErrorCategory::Import, "ImportError", "cannot import 'lib'")
            .with_note("searched the current directory")
            .with_related(vec![EnhancedError::new(
                ErrorCategory::Syntax,
                "SyntaxError",
                "unexpected character '$'",
            )]);
        err.cause = Some(cause);

        let rendered = render(&err, None);
        assert!(rendered.starts_with("error[IMPORT_ERROR]: ImportError\n"));
        assert!(rendered.contains("   = note: searched the current directory\n"));
        assert!(rendered.contains("caused by: Error: file not found\n"));
        assert!(rendered.contains("\nerror[SYNTAX_ERROR]: SyntaxError\n"));
    }

    #[test]
    fn test_render_excerpts_come_from_the_spans_file() {
        let main_source = "x = 1\ny = 2\nSECRET = 3\nimport \"lib/bad\"\n";
        let module: Rc<str> = Rc::from("lib/bad.crl");
        let main: Rc<str> = Rc::from("main.crl");
        let syntax_error = |source: Option<Rc<str>>| {
            let mut err = EnhancedError::new(
                ErrorCategory::Syntax,
                "SyntaxError",
                "unexpected character '$'",
            )
            .at(SourcePosition::new(Some(module.clone()), 3, 5));
            err.source = source;
            err
        };

        let import_error = |related: EnhancedError| {
            EnhancedError::new(ErrorCategory::Import, "ImportError", "module 'lib/bad' has syntax errors")
                .at(SourcePosition::new(Some(main.clone()), 4, 1))
                .with_related(vec![related])
        };

        let with_source = import_error(syntax_error(Some(Rc::from("a = 1\nb = 2\nc = $\n"))));
        let rendered = render(&with_source, Some(main_source));
        assert!(rendered.contains(" 4 | import \"lib/bad\"\n"), "{}", rendered);
        assert!(rendered.contains("  --> lib/bad.crl:3:5\n   |\n 3 | c = $\n   |     ^\n"), "{}", rendered);
        assert!(!rendered.contains("SECRET"), "{}", rendered);

        let without_source = import_error(syntax_error(None));
        let rendered = render(&without_source, Some(main_source));
        assert!(rendered.contains("  --> lib/bad.crl:3:5\n   = unexpected character '$'\n"), "{}", rendered);
        assert!(!rendered.contains("SECRET"), "{}", rendered);
    }
}
