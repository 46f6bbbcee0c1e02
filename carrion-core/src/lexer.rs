use std::collections::VecDeque;

use log::trace;
use phf::{phf_map, Map};

use crate::error::Error;
use crate::token::{Literal, Token, Type};

const KEYWORDS: Map<&'static str, Type> = phf_map! {
    "import" => Type::Import,
    "match" => Type::Match,
    "case" => Type::Case,
    "spell" => Type::Spell,
    "self" => Type::SelfKw,
    "init" => Type::Init,
    "grim" => Type::Grim,
    "True" => Type::True,
    "False" => Type::False,
    "if" => Type::If,
    "otherwise" => Type::Otherwise,
    "else" => Type::Else,
    "for" => Type::For,
    "in" => Type::In,
    "while" => Type::While,
    "stop" => Type::Stop,
    "skip" => Type::Skip,
    "ignore" => Type::Ignore,
    "and" => Type::And,
    "or" => Type::Or,
    "not" => Type::Not,
    "return" => Type::Return,
    "attempt" => Type::Attempt,
    "resolve" => Type::Resolve,
    "ensnare" => Type::Ensnare,
    "raise" => Type::Raise,
    "as" => Type::As,
    "arcane" => Type::Arcane,
    "arcanespell" => Type::ArcaneSpell,
    "super" => Type::Super,
    "None" => Type::None,
    "main" => Type::Main,
    "global" => Type::Global,
    "with" => Type::With,
};

const TAB_WIDTH: usize = 4;

/// Pull based tokenizer. Block structure is synthesized from leading whitespace: a deeper line
/// opens an `Indent`, a shallower one closes one `Dedent` per popped level, and the remaining
/// levels are drained before `Eof` so every `Indent` is balanced.
pub struct Lexer {
    src: Vec<char>,

    // `start` and `current` points to the start and end of the token being scanned
    start: usize,
    current: usize,

    line: usize,
    line_start: usize,
    start_line: usize,
    start_col: usize,

    indents: Vec<usize>,
    pending: VecDeque<Token>,
    at_line_start: bool,
    line_has_tokens: bool,

    // Open brackets, newlines and indentation are insignificant while this is non-zero
    nesting: usize,

    // `finished` is set once the trailing tokens are queued, `eof_emitted` once the iterator
    // handed out the eof token.
    finished: bool,
    eof_emitted: bool,
    errors: Vec<Error>,
}

impl Lexer {
    pub fn new(src: &str) -> Self {
        Lexer {
            src: src.chars().collect(),
            start: 0,
            current: 0,
            line: 1,
            line_start: 0,
            start_line: 1,
            start_col: 1,
            indents: vec![0],
            pending: VecDeque::new(),
            at_line_start: true,
            line_has_tokens: false,
            nesting: 0,
            finished: false,
            eof_emitted: false,
            errors: Vec::new(),
        }
    }

    /// Errors behind every `Illegal` token emitted so far.
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    pub fn next_token(&mut self) -> Token {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return token;
            }

            if self.finished {
                self.mark_start();
                return self.make_token(Type::Eof);
            }

            if self.at_line_start && self.nesting == 0 {
                self.at_line_start = false;
                self.indentation();
                continue;
            }

            self.skip_whitespace();
            if self.is_at_end() {
                self.finish();
                continue;
            }

            self.mark_start();
            let c = self.advance();
            match c {
                '\n' => {
                    if self.nesting > 0 {
                        self.bump_line();
                        continue;
                    }

                    let token = self.make_token_with_lexeme(Type::Newline, "\\n", Literal::None);
                    self.newline();
                    if self.line_has_tokens {
                        self.line_has_tokens = false;
                        return token;
                    }
                }
                '/' if self.peek() == '/' => self.line_comment(),
                '/' if self.peek() == '*' => {
                    if let Some(token) = self.block_comment() {
                        return token;
                    }
                }
                _ => {
                    let token = self.scan_token(c);
                    self.line_has_tokens = true;
                    return token;
                }
            }
        }
    }

    fn indentation(&mut self) {
        let (width, pos) = self.measure_indent(self.current);
        if self.rest_is_blank(pos) {
            return;
        }

        self.current = pos;
        if self.peek() == '/' && self.peek_next() == '*' {
            self.mark_start();
            self.advance();
            if let Some(token) = self.block_comment() {
                self.pending.push_back(token);
                return;
            }

            let (_, after) = self.measure_indent(self.current);
            if self.rest_is_blank(after) {
                return;
            }
        }

        self.apply_indent(width);
    }

    fn apply_indent(&mut self, width: usize) {
        let top = self.indents.last().copied().unwrap_or(0);
        if width > top {
            trace!("line {}: indent {} -> {}", self.line, top, width);
            self.indents.push(width);
            let token = self.positioned(Type::Indent, width + 1);
            self.pending.push_back(token);
        } else if width < top {
            while let Some(&level) = self.indents.last() {
                if level <= width {
                    break;
                }
                self.indents.pop();
                let token = self.positioned(Type::Dedent, width + 1);
                self.pending.push_back(token);
            }

            if self.indents.last().copied().unwrap_or(0) != width {
                let err = Error::InconsistentDedent {
                    line: self.line,
                    col: width + 1,
                };
                let mut token = self.positioned(Type::Illegal, width + 1);
                token.value = Literal::Str(err.reason());
                self.errors.push(err);
                self.pending.push_back(token);

                // Adopt the new level so that following lines don't repeat the error
                self.indents.push(width);
            }
            trace!("line {}: dedent {} -> {}", self.line, top, width);
        }
    }

    fn finish(&mut self) {
        self.mark_start();
        if self.line_has_tokens {
            self.line_has_tokens = false;
            let token = self.make_token_with_lexeme(Type::Newline, "\\n", Literal::None);
            self.pending.push_back(token);
        }

        while self.indents.len() > 1 {
            self.indents.pop();
            let token = self.make_token(Type::Dedent);
            self.pending.push_back(token);
        }

        self.finished = true;
    }

    fn scan_token(&mut self, c: char) -> Token {
        match c {
            '(' => self.open(Type::LeftParen),
            '[' => self.open(Type::LeftBracket),
            '{' => self.open(Type::LeftBrace),
            ')' => self.close(Type::RightParen),
            ']' => self.close(Type::RightBracket),
            '}' => self.close(Type::RightBrace),
            ',' => self.make_token(Type::Comma),
            ':' => self.make_token(Type::Colon),
            ';' => self.make_token(Type::SemiColon),
            '.' => self.make_token(Type::Dot),
            '@' => self.make_token(Type::At),
            '%' => self.make_token(Type::Percent),
            '&' => self.make_token(Type::Ampersand),
            '|' => self.make_token(Type::Pipe),
            '^' => self.make_token(Type::Caret),
            '~' => self.make_token(Type::Tilde),

            '=' => self.either('=', Type::Equal, Type::Assign),
            '!' => self.either('=', Type::NotEqual, Type::Bang),
            '/' => self.either('=', Type::SlashAssign, Type::Slash),

            '+' => {
                if self.match_char('+') {
                    self.make_token(Type::Increment)
                } else {
                    self.either('=', Type::PlusAssign, Type::Plus)
                }
            }

            '-' => {
                if self.match_char('-') {
                    self.make_token(Type::Decrement)
                } else {
                    self.either('=', Type::MinusAssign, Type::Minus)
                }
            }

            '*' => {
                if self.match_char('*') {
                    self.make_token(Type::Power)
                } else {
                    self.either('=', Type::StarAssign, Type::Star)
                }
            }

            '<' => {
                if self.match_char('<') {
                    self.make_token(Type::ShiftLeft)
                } else {
                    self.either('=', Type::LessEqual, Type::Less)
                }
            }

            '>' => {
                if self.match_char('>') {
                    self.make_token(Type::ShiftRight)
                } else {
                    self.either('=', Type::GreaterEqual, Type::Greater)
                }
            }

            '"' | '\'' => self.string(c, Type::Str),

            'f' if self.peek() == '"' || self.peek() == '\'' => {
                let quote = self.advance();
                self.string(quote, Type::FStr)
            }

            '_' if !is_identifier_char(self.peek()) => self.make_token(Type::Underscore),

            _ => {
                if c.is_ascii_digit() {
                    self.number()
                } else if c.is_alphabetic() || c == '_' {
                    self.identifier()
                } else {
                    let err = Error::UnexpectedCharacter {
                        ch: c,
                        line: self.start_line,
                        col: self.start_col,
                    };
                    self.illegal(err)
                }
            }
        }
    }

    fn string(&mut self, quote: char, ty: Type) -> Token {
        let triple = self.peek() == quote && self.peek_next() == quote;
        if triple {
            self.advance();
            self.advance();
        }

        let multiline = triple || ty == Type::FStr;
        let mut value = String::new();
        loop {
            if self.is_at_end() {
                return self.unterminated_string();
            }

            let c = self.peek();
            if c == quote {
                if !triple {
                    self.advance();
                    break;
                }
                if self.peek_at(1) == quote && self.peek_at(2) == quote {
                    self.current += 3;
                    break;
                }
            }

            match c {
                '\n' if !multiline => return self.unterminated_string(),
                '\n' => {
                    self.advance();
                    self.bump_line();
                    value.push('\n');
                }
                '\\' => {
                    self.advance();
                    if self.is_at_end() {
                        return self.unterminated_string();
                    }
                    let escaped = self.advance();
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '0' => value.push('\0'),
                        '\n' => self.bump_line(),
                        other => value.push(other),
                    }
                }
                _ => {
                    self.advance();
                    value.push(c);
                }
            }
        }

        let lexeme = self.lexeme();
        self.make_token_with_lexeme(ty, &lexeme, Literal::Str(value))
    }

    fn unterminated_string(&mut self) -> Token {
        let err = Error::UnterminatedString {
            line: self.start_line,
            col: self.start_col,
        };
        self.illegal(err)
    }

    fn number(&mut self) -> Token {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }

            let lexeme = self.lexeme();
            let value = lexeme.parse::<f64>().map_or(Literal::None, Literal::Float);
            return self.make_token_with_lexeme(Type::Float, &lexeme, value);
        }

        // Overflowing literals are left without a value, the parser reports them
        let lexeme = self.lexeme();
        let value = lexeme.parse::<i64>().map_or(Literal::None, Literal::Int);
        self.make_token_with_lexeme(Type::Int, &lexeme, value)
    }

    fn identifier(&mut self) -> Token {
        while is_identifier_char(self.peek()) {
            self.advance();
        }

        let text = self.lexeme();
        match KEYWORDS.get(text.as_str()) {
            None => self.make_token(Type::Identifier),
            Some(Type::True) => self.make_token_with_lexeme(Type::True, &text, Literal::Bool(true)),
            Some(Type::False) => {
                self.make_token_with_lexeme(Type::False, &text, Literal::Bool(false))
            }
            Some(keyword) => self.make_token(*keyword),
        }
    }

    fn line_comment(&mut self) {
        while self.peek() != '\n' && !self.is_at_end() {
            self.advance();
        }
    }

    // The leading '/' has been consumed. Returns an illegal token if the comment never ends.
    fn block_comment(&mut self) -> Option<Token> {
        self.advance();
        while !self.is_at_end() {
            let c = self.advance();
            if c == '\n' {
                // Lines inside a comment never reach the indentation logic
                self.bump_line();
            } else if c == '*' && self.peek() == '/' {
                self.advance();
                return None;
            }
        }

        let err = Error::UnterminatedBlockComment {
            line: self.start_line,
        };
        Some(self.illegal(err))
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), ' ' | '\t' | '\r') && !self.is_at_end() {
            self.advance();
        }
    }

    fn measure_indent(&self, from: usize) -> (usize, usize) {
        let mut width = 0;
        let mut pos = from;
        while let Some(c) = self.src.get(pos) {
            match c {
                ' ' => width += 1,
                '\t' => width += TAB_WIDTH,
                '\r' => {}
                _ => break,
            }
            pos += 1;
        }
        (width, pos)
    }

    fn rest_is_blank(&self, pos: usize) -> bool {
        match self.src.get(pos) {
            None | Some('\n') => true,
            Some('/') => self.src.get(pos + 1) == Some(&'/'),
            _ => false,
        }
    }

    fn open(&mut self, ty: Type) -> Token {
        self.nesting += 1;
        self.make_token(ty)
    }

    fn close(&mut self, ty: Type) -> Token {
        self.nesting = self.nesting.saturating_sub(1);
        self.make_token(ty)
    }

    fn either(&mut self, next: char, matched: Type, otherwise: Type) -> Token {
        if self.match_char(next) {
            self.make_token(matched)
        } else {
            self.make_token(otherwise)
        }
    }

    fn illegal(&mut self, err: Error) -> Token {
        let lexeme = self.lexeme();
        let token =
            self.make_token_with_lexeme(Type::Illegal, &lexeme, Literal::Str(err.reason()));
        self.errors.push(err);
        token
    }

    fn newline(&mut self) {
        self.bump_line();
        self.at_line_start = true;
    }

    fn bump_line(&mut self) {
        self.line += 1;
        self.line_start = self.current;
    }

    fn mark_start(&mut self) {
        self.start = self.current;
        self.start_line = self.line;
        self.start_col = self.current - self.line_start + 1;
    }

    fn peek(&self) -> char {
        self.peek_at(0)
    }

    fn peek_next(&self) -> char {
        self.peek_at(1)
    }

    fn peek_at(&self, offset: usize) -> char {
        self.src.get(self.current + offset).copied().unwrap_or('\0')
    }

    fn advance(&mut self) -> char {
        let res = self.peek();
        self.current += 1;
        res
    }

    fn match_char(&mut self, c: char) -> bool {
        if self.is_at_end() || self.peek() != c {
            false
        } else {
            self.current += 1;
            true
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.src.len()
    }

    fn lexeme(&self) -> String {
        let end = self.current.min(self.src.len());
        self.src[self.start.min(end)..end].iter().collect()
    }

    fn positioned(&self, ty: Type, col: usize) -> Token {
        Token::new(ty, String::new(), self.line, col, Literal::None)
    }

    fn make_token(&mut self, ty: Type) -> Token {
        let lexeme = match ty {
            Type::Eof | Type::Dedent => String::new(),
            _ => self.lexeme(),
        };
        Token::new(ty, lexeme, self.start_line, self.start_col, Literal::None)
    }

    fn make_token_with_lexeme(&mut self, ty: Type, lexeme: &str, value: Literal) -> Token {
        Token::new(
            ty,
            String::from(lexeme),
            self.start_line,
            self.start_col,
            value,
        )
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

impl Iterator for Lexer {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        if self.eof_emitted {
            return None;
        }

        let token = self.next_token();
        if token.ty == Type::Eof {
            self.eof_emitted = true;
        }
        Some(token)
    }
}
