use std::fmt::{Display, Formatter};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Illegal,
    Eof,
    Newline,
    Indent,
    Dedent,

    Identifier,
    Int,
    Float,
    Str,
    FStr,

    // Operators
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Power,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    Increment,
    Decrement,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Bang,
    Ampersand,
    Pipe,
    Caret,
    Tilde,
    ShiftLeft,
    ShiftRight,

    // Delimiters
    Comma,
    SemiColon,
    Colon,
    Dot,
    At,
    Underscore,
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,

    // Keywords
    Import,
    Match,
    Case,
    Spell,
    SelfKw,
    Init,
    Grim,
    True,
    False,
    If,
    Otherwise,
    Else,
    For,
    In,
    While,
    Stop,
    Skip,
    Ignore,
    And,
    Or,
    Not,
    Return,
    Attempt,
    Resolve,
    Ensnare,
    Raise,
    As,
    Arcane,
    ArcaneSpell,
    Super,
    None,
    Main,
    Global,
    With,
}

impl Type {
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            Type::Import
                | Type::Match
                | Type::Case
                | Type::Spell
                | Type::SelfKw
                | Type::Init
                | Type::Grim
                | Type::True
                | Type::False
                | Type::If
                | Type::Otherwise
                | Type::Else
                | Type::For
                | Type::In
                | Type::While
                | Type::Stop
                | Type::Skip
                | Type::Ignore
                | Type::And
                | Type::Or
                | Type::Not
                | Type::Return
                | Type::Attempt
                | Type::Resolve
                | Type::Ensnare
                | Type::Raise
                | Type::As
                | Type::Arcane
                | Type::ArcaneSpell
                | Type::Super
                | Type::None
                | Type::Main
                | Type::Global
                | Type::With
        )
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Type::Illegal => "ILLEGAL",
            Type::Eof => "EOF",
            Type::Newline => "NEWLINE",
            Type::Indent => "INDENT",
            Type::Dedent => "DEDENT",
            Type::Identifier => "IDENT",
            Type::Int => "INT",
            Type::Float => "FLOAT",
            Type::Str => "STRING",
            Type::FStr => "FSTRING",
            Type::Assign => "=",
            Type::Plus => "+",
            Type::Minus => "-",
            Type::Star => "*",
            Type::Slash => "/",
            Type::Percent => "%",
            Type::Power => "**",
            Type::PlusAssign => "+=",
            Type::MinusAssign => "-=",
            Type::StarAssign => "*=",
            Type::SlashAssign => "/=",
            Type::Increment => "++",
            Type::Decrement => "--",
            Type::Equal => "==",
            Type::NotEqual => "!=",
            Type::Less => "<",
            Type::Greater => ">",
            Type::LessEqual => "<=",
            Type::GreaterEqual => ">=",
            Type::Bang => "!",
            Type::Ampersand => "&",
            Type::Pipe => "|",
            Type::Caret => "^",
            Type::Tilde => "~",
            Type::ShiftLeft => "<<",
            Type::ShiftRight => ">>",
            Type::Comma => ",",
            Type::SemiColon => ";",
            Type::Colon => ":",
            Type::Dot => ".",
            Type::At => "@",
            Type::Underscore => "_",
            Type::LeftParen => "(",
            Type::RightParen => ")",
            Type::LeftBrace => "{",
            Type::RightBrace => "}",
            Type::LeftBracket => "[",
            Type::RightBracket => "]",
            Type::Import => "IMPORT",
            Type::Match => "MATCH",
            Type::Case => "CASE",
            Type::Spell => "SPELL",
            Type::SelfKw => "SELF",
            Type::Init => "INIT",
            Type::Grim => "GRIM",
            Type::True => "TRUE",
            Type::False => "FALSE",
            Type::If => "IF",
            Type::Otherwise => "OTHERWISE",
            Type::Else => "ELSE",
            Type::For => "FOR",
            Type::In => "IN",
            Type::While => "WHILE",
            Type::Stop => "STOP",
            Type::Skip => "SKIP",
            Type::Ignore => "IGNORE",
            Type::And => "AND",
            Type::Or => "OR",
            Type::Not => "NOT",
            Type::Return => "RETURN",
            Type::Attempt => "ATTEMPT",
            Type::Resolve => "RESOLVE",
            Type::Ensnare => "ENSNARE",
            Type::Raise => "RAISE",
            Type::As => "AS",
            Type::Arcane => "ARCANE",
            Type::ArcaneSpell => "ARCANESPELL",
            Type::Super => "SUPER",
            Type::None => "NONE",
            Type::Main => "MAIN",
            Type::Global => "GLOBAL",
            Type::With => "WITH",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    None,
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Bool(value)
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::Str(value)
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Str(String::from(value))
    }
}

macro_rules! impl_from_int_for_literal {
    ( $( $t:ident )* ) => {
        $(
            impl From<$t> for Literal {
                fn from(n: $t) -> Literal {
                    Literal::Int(n as i64)
                }
            }
        )*
    }
}

impl_from_int_for_literal!(u8 i8 u16 i16 u32 i32 i64);

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Float(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub ty: Type,
    pub lexeme: String,
    // Both are 1-based, a zero line means the token was synthesized
    pub line: usize,
    pub col: usize,
    pub value: Literal,
}

impl Token {
    pub fn new(ty: Type, lexeme: String, line: usize, col: usize, value: Literal) -> Self {
        Token {
            ty,
            lexeme,
            line,
            col,
            value,
        }
    }

    /// A token that does not come from source text, used for desugared nodes.
    pub fn synthetic(ty: Type, lexeme: &str) -> Self {
        Token::new(ty, String::from(lexeme), 0, 0, Literal::None)
    }

    pub fn is(&self, ty: Type) -> bool {
        self.ty == ty
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.ty {
            Type::Identifier | Type::Int | Type::Float | Type::Illegal => {
                write!(f, "{} '{}'", self.ty, self.lexeme)
            }
            _ => write!(f, "{}", self.ty),
        }
    }
}
