use std::fmt::{Display, Formatter};
use std::rc::Rc;

use carrion_core::{Literal, Token, Type};

// Tokens are cloned into the nodes during parsing, they carry the position each node reports
// when evaluation fails.

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Identifier {
        name: Token,
    },
    Literal {
        token: Token,
        value: Literal,
    },
    Prefix {
        operator: Token,
        right: Box<Expr>,
    },
    Infix {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },
    Postfix {
        left: Box<Expr>,
        operator: Token,
    },
    Call {
        callee: Box<Expr>,
        paren: Token,
        args: Vec<Expr>,
    },
    Index {
        object: Box<Expr>,
        bracket: Token,
        index: Box<Expr>,
    },
    Slice {
        object: Box<Expr>,
        bracket: Token,
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
    },
    Dot {
        object: Box<Expr>,
        name: Token,
    },
    Array {
        bracket: Token,
        elements: Vec<Expr>,
    },
    Tuple {
        paren: Token,
        elements: Vec<Expr>,
    },
    Hash {
        brace: Token,
        pairs: Vec<(Expr, Expr)>,
    },
    FString {
        token: Token,
        parts: Vec<FStringPart>,
    },
    Super {
        keyword: Token,
        method: Token,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    Text(String),
    Expr(Expr),
}

impl Expr {
    pub(crate) fn identifier(name: Token) -> Self {
        Expr::Identifier { name }
    }

    pub(crate) fn literal(token: Token) -> Self {
        let value = token.value.clone();
        Expr::Literal { token, value }
    }

    pub(crate) fn prefix(operator: Token, right: Expr) -> Self {
        Expr::Prefix {
            operator,
            right: Box::new(right),
        }
    }

    pub(crate) fn infix(left: Expr, operator: Token, right: Expr) -> Self {
        Expr::Infix {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        }
    }

    pub(crate) fn postfix(left: Expr, operator: Token) -> Self {
        Expr::Postfix {
            left: Box::new(left),
            operator,
        }
    }

    pub(crate) fn call(callee: Expr, paren: Token, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: Box::new(callee),
            paren,
            args,
        }
    }

    pub(crate) fn index(object: Expr, bracket: Token, index: Expr) -> Self {
        Expr::Index {
            object: Box::new(object),
            bracket,
            index: Box::new(index),
        }
    }

    pub(crate) fn slice(
        object: Expr,
        bracket: Token,
        start: Option<Expr>,
        end: Option<Expr>,
    ) -> Self {
        Expr::Slice {
            object: Box::new(object),
            bracket,
            start: start.map(Box::new),
            end: end.map(Box::new),
        }
    }

    pub(crate) fn dot(object: Expr, name: Token) -> Self {
        Expr::Dot {
            object: Box::new(object),
            name,
        }
    }

    /// The token an evaluation failure of this node is reported at.
    pub fn token(&self) -> &Token {
        match self {
            Expr::Identifier { name } => name,
            Expr::Literal { token, .. } => token,
            Expr::Prefix { operator, .. } => operator,
            Expr::Infix { operator, .. } => operator,
            Expr::Postfix { operator, .. } => operator,
            Expr::Call { paren, .. } => paren,
            Expr::Index { bracket, .. } => bracket,
            Expr::Slice { bracket, .. } => bracket,
            Expr::Dot { name, .. } => name,
            Expr::Array { bracket, .. } => bracket,
            Expr::Tuple { paren, .. } => paren,
            Expr::Hash { brace, .. } => brace,
            Expr::FString { token, .. } => token,
            Expr::Super { keyword, .. } => keyword,
        }
    }
}

fn write_list(f: &mut Formatter<'_>, items: &[Expr]) -> std::fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Identifier { name } => write!(f, "{}", name.lexeme),
            Expr::Literal { value, .. } => match value {
                Literal::Int(n) => write!(f, "{}", n),
                Literal::Float(n) => write!(f, "{:?}", n),
                Literal::Str(s) => write!(f, "{:?}", s),
                Literal::Bool(true) => write!(f, "True"),
                Literal::Bool(false) => write!(f, "False"),
                Literal::None => write!(f, "None"),
            },
            Expr::Prefix { operator, right } if operator.is(Type::Not) => {
                write!(f, "({} {})", operator.lexeme, right)
            }
            Expr::Prefix { operator, right } => write!(f, "({}{})", operator.lexeme, right),
            Expr::Infix {
                left,
                operator,
                right,
            } => write!(f, "({} {} {})", left, operator.lexeme, right),
            Expr::Postfix { left, operator } => write!(f, "({}{})", left, operator.lexeme),
            Expr::Call { callee, args, .. } => {
                write!(f, "{}(", callee)?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Expr::Index { object, index, .. } => write!(f, "({}[{}])", object, index),
            Expr::Slice {
                object, start, end, ..
            } => {
                write!(f, "({}[", object)?;
                if let Some(start) = start {
                    write!(f, "{}", start)?;
                }
                write!(f, ":")?;
                if let Some(end) = end {
                    write!(f, "{}", end)?;
                }
                write!(f, "])")
            }
            Expr::Dot { object, name } => write!(f, "{}.{}", object, name.lexeme),
            Expr::Array { elements, .. } => {
                write!(f, "[")?;
                write_list(f, elements)?;
                write!(f, "]")
            }
            Expr::Tuple { elements, .. } => {
                write!(f, "(")?;
                write_list(f, elements)?;
                if elements.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Expr::Hash { pairs, .. } => {
                write!(f, "{{")?;
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
            Expr::FString { parts, .. } => {
                write!(f, "f\"")?;
                for part in parts {
                    match part {
                        FStringPart::Text(text) => write!(f, "{}", text)?,
                        FStringPart::Expr(expr) => write!(f, "{{{}}}", expr)?,
                    }
                }
                write!(f, "\"")
            }
            Expr::Super { method, .. } => write!(f, "super.{}", method.lexeme),
        }
    }
}

pub trait ExprVisitor {
    type Item;
    type Error;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Item, Self::Error> {
        match expr {
            Expr::Identifier { name } => self.visit_identifier(name),
            Expr::Literal { token, value } => self.visit_literal(token, value),
            Expr::Prefix { operator, right } => self.visit_prefix(operator, right),
            Expr::Infix {
                left,
                operator,
                right,
            } => self.visit_infix(left, operator, right),
            Expr::Postfix { left, operator } => self.visit_postfix(left, operator),
            Expr::Call {
                callee,
                paren,
                args,
            } => self.visit_call(callee, paren, args),
            Expr::Index {
                object,
                bracket,
                index,
            } => self.visit_index(object, bracket, index),
            Expr::Slice {
                object,
                bracket,
                start,
                end,
            } => self.visit_slice(object, bracket, start.as_deref(), end.as_deref()),
            Expr::Dot { object, name } => self.visit_dot(object, name),
            Expr::Array { bracket, elements } => self.visit_array(bracket, elements),
            Expr::Tuple { paren, elements } => self.visit_tuple(paren, elements),
            Expr::Hash { brace, pairs } => self.visit_hash(brace, pairs),
            Expr::FString { token, parts } => self.visit_fstring(token, parts),
            Expr::Super { keyword, method } => self.visit_super(keyword, method),
        }
    }
    fn visit_identifier(&mut self, name: &Token) -> Result<Self::Item, Self::Error>;
    fn visit_literal(&mut self, token: &Token, value: &Literal)
        -> Result<Self::Item, Self::Error>;
    fn visit_prefix(&mut self, operator: &Token, right: &Expr)
        -> Result<Self::Item, Self::Error>;
    fn visit_infix(
        &mut self,
        left: &Expr,
        operator: &Token,
        right: &Expr,
    ) -> Result<Self::Item, Self::Error>;
    fn visit_postfix(&mut self, left: &Expr, operator: &Token)
        -> Result<Self::Item, Self::Error>;
    fn visit_call(
        &mut self,
        callee: &Expr,
        paren: &Token,
        args: &[Expr],
    ) -> Result<Self::Item, Self::Error>;
    fn visit_index(
        &mut self,
        object: &Expr,
        bracket: &Token,
        index: &Expr,
    ) -> Result<Self::Item, Self::Error>;
    fn visit_slice(
        &mut self,
        object: &Expr,
        bracket: &Token,
        start: Option<&Expr>,
        end: Option<&Expr>,
    ) -> Result<Self::Item, Self::Error>;
    fn visit_dot(&mut self, object: &Expr, name: &Token) -> Result<Self::Item, Self::Error>;
    fn visit_array(&mut self, bracket: &Token, elements: &[Expr])
        -> Result<Self::Item, Self::Error>;
    fn visit_tuple(&mut self, paren: &Token, elements: &[Expr])
        -> Result<Self::Item, Self::Error>;
    fn visit_hash(
        &mut self,
        brace: &Token,
        pairs: &[(Expr, Expr)],
    ) -> Result<Self::Item, Self::Error>;
    fn visit_fstring(
        &mut self,
        token: &Token,
        parts: &[FStringPart],
    ) -> Result<Self::Item, Self::Error>;
    fn visit_super(&mut self, keyword: &Token, method: &Token)
        -> Result<Self::Item, Self::Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Token,
    pub type_hint: Option<Token>,
    pub default: Option<Expr>,
}

#[derive(Debug, PartialEq)]
pub struct SpellDecl {
    pub name: Token,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    // Arcane spells only declare a signature and must be overridden
    pub is_arcane: bool,
}

#[derive(Debug, PartialEq)]
pub struct GrimoireDecl {
    pub name: Token,
    pub parent: Option<Token>,
    pub init: Option<Rc<SpellDecl>>,
    pub methods: Vec<Rc<SpellDecl>>,
    pub is_arcane: bool,
}

#[derive(Debug, PartialEq)]
pub struct Case {
    pub condition: Expr,
    pub body: Vec<Stmt>,
}

#[derive(Debug, PartialEq)]
pub struct Ensnare {
    pub keyword: Token,
    pub condition: Option<Expr>,
    pub alias: Option<Token>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, PartialEq)]
pub enum Stmt {
    Expression {
        expression: Expr,
    },
    Assign {
        target: Expr,
        operator: Token,
        value: Expr,
    },
    Return {
        keyword: Token,
        value: Option<Expr>,
    },
    If {
        keyword: Token,
        condition: Expr,
        consequence: Vec<Stmt>,
        branches: Vec<(Expr, Vec<Stmt>)>,
        alternative: Option<Vec<Stmt>>,
    },
    While {
        keyword: Token,
        condition: Expr,
        body: Vec<Stmt>,
    },
    For {
        keyword: Token,
        variable: Expr,
        iterable: Expr,
        body: Vec<Stmt>,
        alternative: Option<Vec<Stmt>>,
    },
    Spell(Rc<SpellDecl>),
    Grimoire(Rc<GrimoireDecl>),
    Import {
        keyword: Token,
        path: String,
        alias: Option<Token>,
    },
    Match {
        keyword: Token,
        subject: Expr,
        cases: Vec<Case>,
        default: Option<Vec<Stmt>>,
    },
    Attempt {
        keyword: Token,
        body: Vec<Stmt>,
        ensnares: Vec<Ensnare>,
        resolve: Option<Vec<Stmt>>,
    },
    Raise {
        keyword: Token,
        value: Expr,
    },
    Stop {
        keyword: Token,
    },
    Skip {
        keyword: Token,
    },
    Ignore {
        keyword: Token,
    },
    Global {
        keyword: Token,
        names: Vec<Token>,
    },
    With {
        keyword: Token,
        resource: Expr,
        alias: Option<Token>,
        body: Vec<Stmt>,
    },
    Main {
        keyword: Token,
        body: Vec<Stmt>,
    },
}

impl Stmt {
    pub(crate) fn expression(expression: Expr) -> Self {
        Stmt::Expression { expression }
    }

    pub(crate) fn assign(target: Expr, operator: Token, value: Expr) -> Self {
        Stmt::Assign {
            target,
            operator,
            value,
        }
    }

    pub(crate) fn is_main(&self) -> bool {
        matches!(self, Stmt::Main { .. })
    }
}

pub trait StmtVisitor {
    type Item;

    fn visit_stmt(&mut self, stmt: &Stmt) -> Self::Item {
        match stmt {
            Stmt::Expression { expression } => self.visit_expression(expression),
            Stmt::Assign {
                target,
                operator,
                value,
            } => self.visit_assign(target, operator, value),
            Stmt::Return { keyword, value } => self.visit_return(keyword, value.as_ref()),
            Stmt::If {
                condition,
                consequence,
                branches,
                alternative,
                ..
            } => self.visit_if(condition, consequence, branches, alternative.as_deref()),
            Stmt::While {
                condition, body, ..
            } => self.visit_while(condition, body),
            Stmt::For {
                variable,
                iterable,
                body,
                alternative,
                ..
            } => self.visit_for(variable, iterable, body, alternative.as_deref()),
            Stmt::Spell(decl) => self.visit_spell(decl),
            Stmt::Grimoire(decl) => self.visit_grimoire(decl),
            Stmt::Import {
                keyword,
                path,
                alias,
            } => self.visit_import(keyword, path, alias.as_ref()),
            Stmt::Match {
                subject,
                cases,
                default,
                ..
            } => self.visit_match(subject, cases, default.as_deref()),
            Stmt::Attempt {
                body,
                ensnares,
                resolve,
                ..
            } => self.visit_attempt(body, ensnares, resolve.as_deref()),
            Stmt::Raise { keyword, value } => self.visit_raise(keyword, value),
            Stmt::Stop { .. } => self.visit_stop(),
            Stmt::Skip { .. } => self.visit_skip(),
            Stmt::Ignore { .. } => self.visit_ignore(),
            Stmt::Global { names, .. } => self.visit_global(names),
            Stmt::With {
                keyword,
                resource,
                alias,
                body,
            } => self.visit_with(keyword, resource, alias.as_ref(), body),
            Stmt::Main { body, .. } => self.visit_main(body),
        }
    }
    fn visit_expression(&mut self, expression: &Expr) -> Self::Item;
    fn visit_assign(&mut self, target: &Expr, operator: &Token, value: &Expr) -> Self::Item;
    fn visit_return(&mut self, keyword: &Token, value: Option<&Expr>) -> Self::Item;
    fn visit_if(
        &mut self,
        condition: &Expr,
        consequence: &[Stmt],
        branches: &[(Expr, Vec<Stmt>)],
        alternative: Option<&[Stmt]>,
    ) -> Self::Item;
    fn visit_while(&mut self, condition: &Expr, body: &[Stmt]) -> Self::Item;
    fn visit_for(
        &mut self,
        variable: &Expr,
        iterable: &Expr,
        body: &[Stmt],
        alternative: Option<&[Stmt]>,
    ) -> Self::Item;
    fn visit_spell(&mut self, decl: &Rc<SpellDecl>) -> Self::Item;
    fn visit_grimoire(&mut self, decl: &Rc<GrimoireDecl>) -> Self::Item;
    fn visit_import(&mut self, keyword: &Token, path: &str, alias: Option<&Token>) -> Self::Item;
    fn visit_match(
        &mut self,
        subject: &Expr,
        cases: &[Case],
        default: Option<&[Stmt]>,
    ) -> Self::Item;
    fn visit_attempt(
        &mut self,
        body: &[Stmt],
        ensnares: &[Ensnare],
        resolve: Option<&[Stmt]>,
    ) -> Self::Item;
    fn visit_raise(&mut self, keyword: &Token, value: &Expr) -> Self::Item;
    fn visit_stop(&mut self) -> Self::Item;
    fn visit_skip(&mut self) -> Self::Item;
    fn visit_ignore(&mut self) -> Self::Item;
    fn visit_global(&mut self, names: &[Token]) -> Self::Item;
    fn visit_with(
        &mut self,
        keyword: &Token,
        resource: &Expr,
        alias: Option<&Token>,
        body: &[Stmt],
    ) -> Self::Item;
    fn visit_main(&mut self, body: &[Stmt]) -> Self::Item;
}

/// A parsed source file, top-level statements in order.
#[derive(Debug, Default, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

impl Program {
    pub fn has_main(&self) -> bool {
        self.statements.iter().any(Stmt::is_main)
    }
}
