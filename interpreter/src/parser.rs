use std::rc::Rc;

use carrion_core::{Lexer, Literal, Token, Type};
use log::trace;

use crate::ast::{Case, Ensnare, Expr, FStringPart, GrimoireDecl, Param, Program, SpellDecl, Stmt};
use crate::error::ParseError;
use crate::limits::MAX_PARAMETERS;

type ParseResult<T> = Result<T, ParseError>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Or,
    And,
    Equals,
    LessGreater,
    Sum,
    Product,
    Exponent,
    Prefix,
    Call,
    Postfix,
    Index,
}

/// Single pass parser pulling tokens from the lexer on demand, with one token of lookahead.
///
/// Errors never abort the parse: the failing statement is recorded, the parser skips to the next
/// statement boundary and carries on so that one run reports as many problems as possible.
pub struct Parser {
    lexer: Lexer,
    cur: Token,
    peek: Token,
    errors: Vec<ParseError>,
}

impl Parser {
    pub fn new(src: &str) -> Self {
        let mut lexer = Lexer::new(src);
        let cur = lexer.next_token();
        let peek = lexer.next_token();
        Parser {
            lexer,
            cur,
            peek,
            errors: Vec::new(),
        }
    }

    pub fn parse_program(&mut self) -> Program {
        let mut statements = Vec::new();

        while !self.check(Type::Eof) {
            match self.cur.ty {
                Type::Newline | Type::SemiColon | Type::Dedent => {
                    self.advance();
                    continue;
                }
                Type::Indent => {
                    self.errors.push(ParseError::new(&self.cur, "unexpected indent"));
                    self.skip_block();
                    continue;
                }
                _ => {}
            }

            match self.statement() {
                Ok(stmt) => statements.push(stmt),
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize();
                }
            }
        }

        self.collect_lexer_errors();
        trace!(
            "parsed {} statements with {} errors",
            statements.len(),
            self.errors.len()
        );
        Program { statements }
    }

    /// Rendered diagnostics, in the order they were found.
    pub fn errors(&self) -> Vec<String> {
        self.errors.iter().map(|err| err.to_string()).collect()
    }

    pub fn diagnostics(&self) -> &[ParseError] {
        &self.errors
    }

    // Lexical errors normally surface through the illegal token they produce, but the token can
    // be skipped while recovering from an earlier error.
    fn collect_lexer_errors(&mut self) {
        let missing: Vec<ParseError> = self
            .lexer
            .errors()
            .iter()
            .filter(|err| {
                !self
                    .errors
                    .iter()
                    .any(|seen| seen.line == err.line() && seen.col == err.col())
            })
            .map(|err| ParseError {
                line: err.line(),
                col: err.col(),
                msg: err.reason(),
            })
            .collect();
        self.errors.extend(missing);
        self.errors.sort_by_key(|err| (err.line, err.col));
    }

    fn statement(&mut self) -> ParseResult<Stmt> {
        match self.cur.ty {
            Type::Spell | Type::Init => Ok(Stmt::Spell(self.spell(false)?)),
            Type::At => self.arcane_spell(),
            Type::Arcane | Type::Grim => self.grimoire(),
            Type::If => self.if_statement(),
            Type::While => self.while_statement(),
            Type::For => self.for_statement(),
            Type::Return => self.return_statement(),
            Type::Import => self.import_statement(),
            Type::Match => self.match_statement(),
            Type::Attempt => self.attempt_statement(),
            Type::Raise => {
                let keyword = self.advance();
                let value = self.expression()?;
                self.end_statement()?;
                Ok(Stmt::Raise { keyword, value })
            }
            Type::Stop => {
                let keyword = self.advance();
                self.end_statement()?;
                Ok(Stmt::Stop { keyword })
            }
            Type::Skip => {
                let keyword = self.advance();
                self.end_statement()?;
                Ok(Stmt::Skip { keyword })
            }
            Type::Ignore => {
                let keyword = self.advance();
                self.end_statement()?;
                Ok(Stmt::Ignore { keyword })
            }
            Type::Global => self.global_statement(),
            Type::With => self.with_statement(),
            Type::Main => {
                let keyword = self.advance();
                let body = self.block()?;
                Ok(Stmt::Main { keyword, body })
            }
            _ => self.expression_statement(),
        }
    }

    fn spell(&mut self, is_arcane: bool) -> ParseResult<Rc<SpellDecl>> {
        self.match_one(Type::Spell);
        let name = match self.cur.ty {
            Type::Identifier | Type::Init => self.advance(),
            _ => return Err(self.unexpected(Type::Identifier)),
        };
        self.consume(Type::LeftParen)?;

        let mut params = Vec::new();
        while !self.check(Type::RightParen) {
            if params.len() >= MAX_PARAMETERS {
                return Err(ParseError::new(
                    &self.cur,
                    &format!("can't have more than {} parameters", MAX_PARAMETERS),
                ));
            }

            let name = self.consume(Type::Identifier)?;
            let type_hint = if self.match_one(Type::Colon) {
                Some(self.consume(Type::Identifier)?)
            } else {
                None
            };
            let default = if self.match_one(Type::Assign) {
                Some(self.expression()?)
            } else {
                None
            };
            params.push(Param {
                name,
                type_hint,
                default,
            });

            if !self.match_one(Type::Comma) {
                break;
            }
        }
        self.consume(Type::RightParen)?;

        // Arcane spells may stop at the signature
        let body = if is_arcane && !self.check(Type::Colon) {
            self.end_statement()?;
            Vec::new()
        } else {
            self.block()?
        };

        Ok(Rc::new(SpellDecl {
            name,
            params,
            body,
            is_arcane,
        }))
    }

    fn arcane_spell(&mut self) -> ParseResult<Stmt> {
        self.advance();
        self.consume(Type::ArcaneSpell)?;
        while self.match_one(Type::Newline) {}
        if !self.check(Type::Spell) {
            return Err(self.unexpected(Type::Spell));
        }
        Ok(Stmt::Spell(self.spell(true)?))
    }

    fn grimoire(&mut self) -> ParseResult<Stmt> {
        let is_arcane = self.match_one(Type::Arcane);
        self.consume(Type::Grim)?;
        let name = self.consume(Type::Identifier)?;

        let parent = if self.match_one(Type::LeftParen) {
            let parent = self.consume(Type::Identifier)?;
            self.consume(Type::RightParen)?;
            Some(parent)
        } else {
            None
        };

        let mut init = None;
        let mut methods = Vec::new();
        for stmt in self.block()? {
            match stmt {
                Stmt::Spell(decl) if decl.name.lexeme == "init" => init = Some(decl),
                Stmt::Spell(decl) => methods.push(decl),
                // Docstrings and placeholders
                Stmt::Expression {
                    expression: Expr::Literal { .. },
                }
                | Stmt::Ignore { .. } => {}
                _ => self.errors.push(ParseError::new(
                    &name,
                    &format!("only spells may appear in the body of grimoire {}", name.lexeme),
                )),
            }
        }

        Ok(Stmt::Grimoire(Rc::new(GrimoireDecl {
            name,
            parent,
            init,
            methods,
            is_arcane,
        })))
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        let keyword = self.advance();
        let condition = self.expression()?;
        let consequence = self.block()?;

        let mut branches = Vec::new();
        while self.match_one(Type::Otherwise) {
            let condition = self.expression()?;
            let body = self.block()?;
            branches.push((condition, body));
        }

        let alternative = if self.match_one(Type::Else) {
            Some(self.block()?)
        } else {
            None
        };

        Ok(Stmt::If {
            keyword,
            condition,
            consequence,
            branches,
            alternative,
        })
    }

    fn while_statement(&mut self) -> ParseResult<Stmt> {
        let keyword = self.advance();
        let condition = self.expression()?;
        let body = self.block()?;
        Ok(Stmt::While {
            keyword,
            condition,
            body,
        })
    }

    fn for_statement(&mut self) -> ParseResult<Stmt> {
        let keyword = self.advance();

        let first = self.consume(Type::Identifier)?;
        let variable = if self.check(Type::Comma) {
            let paren = first.clone();
            let mut elements = vec![Expr::identifier(first)];
            while self.match_one(Type::Comma) {
                elements.push(Expr::identifier(self.consume(Type::Identifier)?));
            }
            Expr::Tuple { paren, elements }
        } else {
            Expr::identifier(first)
        };

        self.consume(Type::In)?;
        let iterable = self.expression()?;
        let body = self.block()?;
        let alternative = if self.match_one(Type::Else) {
            Some(self.block()?)
        } else {
            None
        };

        Ok(Stmt::For {
            keyword,
            variable,
            iterable,
            body,
            alternative,
        })
    }

    fn return_statement(&mut self) -> ParseResult<Stmt> {
        let keyword = self.advance();
        let value = if self.at_statement_end() {
            None
        } else {
            Some(self.expression_list()?)
        };
        self.end_statement()?;
        Ok(Stmt::Return { keyword, value })
    }

    fn import_statement(&mut self) -> ParseResult<Stmt> {
        let keyword = self.advance();
        let path = self.consume(Type::Str)?;
        let path = match path.value {
            Literal::Str(path) => path,
            _ => path.lexeme,
        };
        let alias = if self.match_one(Type::As) {
            Some(self.consume(Type::Identifier)?)
        } else {
            None
        };
        self.end_statement()?;
        Ok(Stmt::Import {
            keyword,
            path,
            alias,
        })
    }

    fn match_statement(&mut self) -> ParseResult<Stmt> {
        let keyword = self.advance();
        let subject = self.expression()?;
        self.consume(Type::Colon)?;
        self.consume(Type::Newline)?;
        self.consume(Type::Indent)?;

        let mut cases = Vec::new();
        let mut default = None;
        loop {
            match self.cur.ty {
                Type::Newline => {
                    self.advance();
                }
                Type::Case if self.peek.is(Type::Underscore) => {
                    self.advance();
                    self.advance();
                    default = Some(self.block()?);
                }
                Type::Case => {
                    self.advance();
                    let condition = self.expression()?;
                    let body = self.block()?;
                    cases.push(Case { condition, body });
                }
                Type::Underscore => {
                    self.advance();
                    default = Some(self.block()?);
                }
                Type::Dedent | Type::Eof => break,
                _ => return Err(self.unexpected(Type::Case)),
            }
        }
        self.match_one(Type::Dedent);

        Ok(Stmt::Match {
            keyword,
            subject,
            cases,
            default,
        })
    }

    fn attempt_statement(&mut self) -> ParseResult<Stmt> {
        let keyword = self.advance();
        let body = self.block()?;

        let mut ensnares = Vec::new();
        while self.check(Type::Ensnare) {
            let keyword = self.advance();
            let condition = if self.check(Type::Colon) || self.check(Type::As) {
                None
            } else {
                Some(self.expression()?)
            };
            let alias = if self.match_one(Type::As) {
                Some(self.consume(Type::Identifier)?)
            } else {
                None
            };
            let body = self.block()?;
            ensnares.push(Ensnare {
                keyword,
                condition,
                alias,
                body,
            });
        }

        let resolve = if self.match_one(Type::Resolve) {
            Some(self.block()?)
        } else {
            None
        };

        Ok(Stmt::Attempt {
            keyword,
            body,
            ensnares,
            resolve,
        })
    }

    fn with_statement(&mut self) -> ParseResult<Stmt> {
        let keyword = self.advance();
        let resource = self.expression()?;
        let alias = if self.match_one(Type::As) {
            Some(self.consume(Type::Identifier)?)
        } else {
            None
        };
        let body = self.block()?;
        Ok(Stmt::With {
            keyword,
            resource,
            alias,
            body,
        })
    }

    fn global_statement(&mut self) -> ParseResult<Stmt> {
        let keyword = self.advance();
        let mut names = vec![self.consume(Type::Identifier)?];
        while self.match_one(Type::Comma) {
            names.push(self.consume(Type::Identifier)?);
        }
        self.end_statement()?;
        Ok(Stmt::Global { keyword, names })
    }

    fn expression_statement(&mut self) -> ParseResult<Stmt> {
        let target = self.expression_list()?;

        let operator = match self.cur.ty {
            Type::Assign
            | Type::PlusAssign
            | Type::MinusAssign
            | Type::StarAssign
            | Type::SlashAssign => self.advance(),
            _ => {
                self.end_statement()?;
                return Ok(Stmt::expression(target));
            }
        };

        let assignable = match &target {
            Expr::Identifier { .. } | Expr::Dot { .. } | Expr::Index { .. } => true,
            Expr::Tuple { elements, .. } => {
                operator.is(Type::Assign)
                    && elements
                        .iter()
                        .all(|element| matches!(element, Expr::Identifier { .. }))
            }
            _ => false,
        };
        if !assignable {
            return Err(ParseError::new(
                &operator,
                &format!("invalid assignment target for '{}': {}", operator.lexeme, target),
            ));
        }

        let value = self.expression_list()?;
        self.end_statement()?;
        Ok(Stmt::assign(target, operator, value))
    }

    // Body of a compound statement, either a single statement on the same line or an indented
    // block on the lines that follow.
    fn block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.consume(Type::Colon)?;
        if !self.check(Type::Newline) {
            return Ok(vec![self.statement()?]);
        }

        self.advance();
        if !self.check(Type::Indent) {
            return Err(ParseError::new(&self.cur, "expected an indented block"));
        }
        self.advance();

        let mut statements = Vec::new();
        while !self.check(Type::Dedent) && !self.check(Type::Eof) {
            match self.cur.ty {
                Type::Newline | Type::SemiColon => {
                    self.advance();
                    continue;
                }
                Type::Indent => {
                    self.errors.push(ParseError::new(&self.cur, "unexpected indent"));
                    self.skip_block();
                    continue;
                }
                _ => {}
            }

            match self.statement() {
                Ok(stmt) => statements.push(stmt),
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize();
                }
            }
        }

        self.match_one(Type::Dedent);
        Ok(statements)
    }

    // Expressions separated by commas form a tuple without parentheses: `a, b = b, a`
    fn expression_list(&mut self) -> ParseResult<Expr> {
        let first = self.expression()?;
        if !self.check(Type::Comma) {
            return Ok(first);
        }

        let paren = first.token().clone();
        let mut elements = vec![first];
        while self.match_one(Type::Comma) {
            if self.at_statement_end() || self.check(Type::Assign) {
                break;
            }
            elements.push(self.expression()?);
        }
        Ok(Expr::Tuple { paren, elements })
    }

    pub(crate) fn expression(&mut self) -> ParseResult<Expr> {
        self.parse_precedence(Precedence::Lowest)
    }

    fn parse_precedence(&mut self, precedence: Precedence) -> ParseResult<Expr> {
        let mut left = self.prefix()?;
        while precedence < self.cur_precedence() {
            left = self.infix(left)?;
        }
        Ok(left)
    }

    fn cur_precedence(&self) -> Precedence {
        match self.cur.ty {
            Type::Or => Precedence::Or,
            Type::And => Precedence::And,
            Type::Equal | Type::NotEqual => Precedence::Equals,
            Type::Less
            | Type::Greater
            | Type::LessEqual
            | Type::GreaterEqual
            | Type::In
            | Type::Ampersand
            | Type::Pipe
            | Type::Caret
            | Type::ShiftLeft
            | Type::ShiftRight => Precedence::LessGreater,
            Type::Not if self.peek.is(Type::In) => Precedence::LessGreater,
            Type::Plus | Type::Minus => Precedence::Sum,
            Type::Star | Type::Slash | Type::Percent => Precedence::Product,
            Type::Power => Precedence::Exponent,
            Type::LeftParen | Type::Dot => Precedence::Call,
            Type::Increment | Type::Decrement => Precedence::Postfix,
            Type::LeftBracket => Precedence::Index,
            _ => Precedence::Lowest,
        }
    }

    fn prefix(&mut self) -> ParseResult<Expr> {
        match self.cur.ty {
            Type::Identifier => Ok(Expr::identifier(self.advance())),
            Type::SelfKw => Ok(Expr::identifier(self.advance())),
            Type::Int | Type::Float => {
                let token = self.advance();
                if token.value == Literal::None {
                    return Err(ParseError::new(
                        &token,
                        &format!("could not parse {} as a number", token.lexeme),
                    ));
                }
                Ok(Expr::literal(token))
            }
            Type::Str | Type::True | Type::False => Ok(Expr::literal(self.advance())),
            Type::None => {
                let token = self.advance();
                Ok(Expr::Literal {
                    token,
                    value: Literal::None,
                })
            }
            Type::FStr => self.fstring(),
            Type::Minus | Type::Plus | Type::Bang | Type::Not | Type::Tilde => {
                let operator = self.advance();
                let right = self.parse_precedence(Precedence::Prefix)?;
                Ok(Expr::prefix(operator, right))
            }
            Type::Increment | Type::Decrement => {
                let operator = self.advance();
                let right = self.parse_precedence(Precedence::Prefix)?;
                if !matches!(right, Expr::Identifier { .. }) {
                    return Err(ParseError::new(
                        &operator,
                        &format!("operand of '{}' must be a variable", operator.lexeme),
                    ));
                }
                Ok(Expr::prefix(operator, right))
            }
            Type::LeftParen => self.grouping(),
            Type::LeftBracket => {
                let bracket = self.advance();
                let elements = self.expression_sequence(Type::RightBracket)?;
                Ok(Expr::Array { bracket, elements })
            }
            Type::LeftBrace => self.hash(),
            Type::Super => {
                let keyword = self.advance();
                self.consume(Type::Dot)?;
                let method = self.member_name()?;
                Ok(Expr::Super { keyword, method })
            }
            Type::Illegal => {
                let msg = match &self.cur.value {
                    Literal::Str(msg) => msg.clone(),
                    _ => format!("illegal token {}", self.cur.lexeme),
                };
                Err(ParseError::new(&self.cur, &msg))
            }
            _ => Err(ParseError::new(
                &self.cur,
                &format!("no prefix parse function for {} found", self.cur.ty),
            )),
        }
    }

    fn infix(&mut self, left: Expr) -> ParseResult<Expr> {
        match self.cur.ty {
            Type::LeftParen => {
                let paren = self.advance();
                let args = self.expression_sequence(Type::RightParen)?;
                Ok(Expr::call(left, paren, args))
            }
            Type::Dot => {
                self.advance();
                let name = self.member_name()?;
                Ok(Expr::dot(left, name))
            }
            Type::LeftBracket => self.index(left),
            Type::Increment | Type::Decrement => {
                let operator = self.advance();
                if !matches!(left, Expr::Identifier { .. }) {
                    return Err(ParseError::new(
                        &operator,
                        &format!("operand of '{}' must be a variable", operator.lexeme),
                    ));
                }
                Ok(Expr::postfix(left, operator))
            }
            Type::Not => {
                let mut operator = self.advance();
                self.consume(Type::In)?;
                operator.lexeme = String::from("not in");
                let right = self.parse_precedence(Precedence::LessGreater)?;
                Ok(Expr::infix(left, operator, right))
            }
            Type::Power => {
                // Right associative
                let operator = self.advance();
                let right = self.parse_precedence(Precedence::Product)?;
                Ok(Expr::infix(left, operator, right))
            }
            _ => {
                let precedence = self.cur_precedence();
                let operator = self.advance();
                let right = self.parse_precedence(precedence)?;
                Ok(Expr::infix(left, operator, right))
            }
        }
    }

    fn grouping(&mut self) -> ParseResult<Expr> {
        let paren = self.advance();
        if self.match_one(Type::RightParen) {
            return Ok(Expr::Tuple {
                paren,
                elements: Vec::new(),
            });
        }

        let first = self.expression()?;
        if !self.check(Type::Comma) {
            self.consume(Type::RightParen)?;
            return Ok(first);
        }

        let mut elements = vec![first];
        while self.match_one(Type::Comma) {
            if self.check(Type::RightParen) {
                break;
            }
            elements.push(self.expression()?);
        }
        self.consume(Type::RightParen)?;
        Ok(Expr::Tuple { paren, elements })
    }

    fn hash(&mut self) -> ParseResult<Expr> {
        let brace = self.advance();
        let mut pairs = Vec::new();
        while !self.check(Type::RightBrace) {
            let key = self.expression()?;
            self.consume(Type::Colon)?;
            let value = self.expression()?;
            pairs.push((key, value));
            if !self.match_one(Type::Comma) {
                break;
            }
        }
        self.consume(Type::RightBrace)?;
        Ok(Expr::Hash { brace, pairs })
    }

    fn index(&mut self, object: Expr) -> ParseResult<Expr> {
        let bracket = self.advance();

        let start = if self.check(Type::Colon) {
            None
        } else {
            Some(self.expression()?)
        };

        if !self.match_one(Type::Colon) {
            self.consume(Type::RightBracket)?;
            return match start {
                Some(index) => Ok(Expr::index(object, bracket, index)),
                None => Err(ParseError::new(&bracket, "expected an index expression")),
            };
        }

        let end = if self.check(Type::RightBracket) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(Type::RightBracket)?;
        Ok(Expr::slice(object, bracket, start, end))
    }

    // Comma separated expressions up to `close`, a trailing comma is allowed
    fn expression_sequence(&mut self, close: Type) -> ParseResult<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.check(close) {
            items.push(self.expression()?);
            if !self.match_one(Type::Comma) {
                break;
            }
        }
        self.consume(close)?;
        Ok(items)
    }

    // Member names may collide with keywords, e.g. `self.init` or `err.type`
    fn member_name(&mut self) -> ParseResult<Token> {
        if self.check(Type::Identifier) || self.cur.ty.is_keyword() {
            let mut name = self.advance();
            name.ty = Type::Identifier;
            Ok(name)
        } else {
            Err(self.unexpected(Type::Identifier))
        }
    }

    fn fstring(&mut self) -> ParseResult<Expr> {
        let token = self.advance();
        let text = match &token.value {
            Literal::Str(text) => text.clone(),
            _ => String::new(),
        };

        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut depth = 1;
                    let mut source = String::new();
                    for c in chars.by_ref() {
                        match c {
                            '{' => depth += 1,
                            '}' => depth -= 1,
                            _ => {}
                        }
                        if depth == 0 {
                            break;
                        }
                        source.push(c);
                    }
                    if depth != 0 {
                        return Err(ParseError::new(&token, "unterminated '{' in f-string"));
                    }
                    if source.trim().is_empty() {
                        return Err(ParseError::new(&token, "empty expression in f-string"));
                    }

                    if !literal.is_empty() {
                        parts.push(FStringPart::Text(std::mem::take(&mut literal)));
                    }
                    parts.push(FStringPart::Expr(self.embedded(&token, &source)?));
                }
                _ => literal.push(c),
            }
        }

        if !literal.is_empty() {
            parts.push(FStringPart::Text(literal));
        }
        Ok(Expr::FString { token, parts })
    }

    fn embedded(&mut self, token: &Token, source: &str) -> ParseResult<Expr> {
        let mut parser = Parser::new(source.trim());
        let expr = parser.expression();
        let trailing = !(parser.check(Type::Newline) || parser.check(Type::Eof));

        match expr {
            Ok(expr) if !trailing && parser.lexer.errors().is_empty() => Ok(expr),
            Ok(_) => Err(ParseError::new(
                token,
                &format!("invalid expression in f-string: {}", source),
            )),
            Err(err) => Err(ParseError::new(
                token,
                &format!("in f-string: {}", err.msg),
            )),
        }
    }

    fn synchronize(&mut self) {
        loop {
            match self.cur.ty {
                Type::Eof | Type::Dedent => return,
                Type::Newline => {
                    self.advance();
                    // The body of the failed statement goes with it
                    if self.check(Type::Indent) {
                        self.skip_block();
                    }
                    return;
                }
                Type::Indent => self.skip_block(),
                _ => {
                    self.advance();
                }
            }
        }
    }

    // Skips a whole indented block, the current token must be its INDENT
    fn skip_block(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.cur.ty {
                Type::Eof => return,
                Type::Indent => depth += 1,
                Type::Dedent => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        self.advance();
                        return;
                    }
                }
                _ => {}
            }
            self.advance();
        }
    }

    fn end_statement(&mut self) -> ParseResult<()> {
        match self.cur.ty {
            Type::Newline | Type::SemiColon => {
                self.advance();
                Ok(())
            }
            Type::Eof | Type::Dedent => Ok(()),
            _ => Err(self.unexpected(Type::Newline)),
        }
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.cur.ty,
            Type::Newline | Type::SemiColon | Type::Eof | Type::Dedent
        )
    }

    fn unexpected(&self, expected: Type) -> ParseError {
        ParseError::new(
            &self.cur,
            &format!(
                "expected next token to be {}, got {} instead",
                expected, self.cur
            ),
        )
    }

    fn consume(&mut self, ty: Type) -> ParseResult<Token> {
        if self.check(ty) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(ty))
        }
    }

    fn match_one(&mut self, ty: Type) -> bool {
        if self.check(ty) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, ty: Type) -> bool {
        self.cur.is(ty)
    }

    fn advance(&mut self) -> Token {
        let next = self.lexer.next_token();
        let peek = std::mem::replace(&mut self.peek, next);
        std::mem::replace(&mut self.cur, peek)
    }
}

#[cfg(test)]
mod tests {
    use carrion_core::Literal;

    use crate::ast::{Expr, Stmt};
    use crate::parser::Parser;

    fn parse_expression(src: &str) -> String {
        let mut parser = Parser::new(src);
        let program = parser.parse_program();
        assert!(
            parser.errors().is_empty(),
            "unexpected errors for {:?}: {:?}",
            src,
            parser.errors()
        );
        match &program.statements[..] {
            [Stmt::Expression { expression }] => expression.to_string(),
            other => panic!("expected a single expression for {:?}, got {:?}", src, other),
        }
    }

    fn parse_errors(src: &str) -> Vec<String> {
        let mut parser = Parser::new(src);
        parser.parse_program();
        parser.errors()
    }

    #[test]
    fn test_operator_precedence() {
        let tests = [
            ("1 + 2 * 3", "(1 + (2 * 3))"),
            ("a + b * c - d", "((a + (b * c)) - d)"),
            ("-a * b", "((-a) * b)"),
            ("!x == y", "((!x) == y)"),
            ("a or b and c", "(a or (b and c))"),
            ("not a and b", "((not a) and b)"),
            ("a < b == c > d", "((a < b) == (c > d))"),
            ("2 ** 3 ** 2", "(2 ** (3 ** 2))"),
            ("2 ** 3 * 4", "((2 ** 3) * 4)"),
            ("-2 ** 2", "((-2) ** 2)"),
            ("(1 + 2) * 3", "((1 + 2) * 3)"),
            ("x not in y", "(x not in y)"),
            ("x in y and z", "((x in y) and z)"),
            ("a & b | c", "((a & b) | c)"),
            ("1 << 2 + 3", "(1 << (2 + 3))"),
            ("-f(x)", "(-f(x))"),
            ("a.b(c)[0]", "(a.b(c)[0])"),
            ("f(1, g(2))", "f(1, g(2))"),
            ("a[1:2]", "(a[1:2])"),
            ("a[:2]", "(a[:2])"),
            ("a[1:]", "(a[1:])"),
            ("[1, 2][0]", "([1, 2][0])"),
            ("(1, 2)", "(1, 2)"),
            ("(1,)", "(1,)"),
            ("()", "()"),
            ("{\"a\": 1}", "{\"a\": 1}"),
            ("x++", "(x++)"),
            ("--x", "(--x)"),
            ("self.name", "self.name"),
            ("super.area()", "super.area()"),
            ("f\"sum={a + b}!\"", "f\"sum={(a + b)}!\""),
        ];

        for (src, expected) in tests {
            assert_eq!(parse_expression(src), expected, "source: {:?}", src);
        }
    }

    #[test]
    fn test_literals() {
        let mut parser = Parser::new("42\n3.5\n\"hi\"\nTrue\nNone\n");
        let program = parser.parse_program();
        let values: Vec<Literal> = program
            .statements
            .iter()
            .map(|stmt| match stmt {
                Stmt::Expression {
                    expression: Expr::Literal { value, .. },
                } => value.clone(),
                other => panic!("expected a literal, got {:?}", other),
            })
            .collect();
        assert_eq!(
            values,
            vec![
                Literal::Int(42),
                Literal::Float(3.5),
                Literal::from("hi"),
                Literal::Bool(true),
                Literal::None,
            ]
        );
    }

    #[test]
    fn test_assignments() {
        let mut parser = Parser::new("x = 1\nx += 2\nobj.f = 3\na[0] -= 1\na, b = b, a\n");
        let program = parser.parse_program();
        assert!(parser.errors().is_empty(), "{:?}", parser.errors());
        assert_eq!(program.statements.len(), 5);

        let targets: Vec<String> = program
            .statements
            .iter()
            .map(|stmt| match stmt {
                Stmt::Assign {
                    target, operator, ..
                } => format!("{} {}", target, operator.lexeme),
                other => panic!("expected an assignment, got {:?}", other),
            })
            .collect();
        assert_eq!(targets, vec!["x =", "x +=", "obj.f =", "(a[0]) -=", "(a, b) ="]);

        match &program.statements[4] {
            Stmt::Assign {
                value: Expr::Tuple { elements, .. },
                ..
            } => assert_eq!(elements.len(), 2),
            other => panic!("expected a tuple value, got {:?}", other),
        }
    }

    #[test]
    fn test_inline_and_block_bodies() {
        let inline = "if x: y = 1\notherwise z: y = 2\nelse: y = 3\n";
        let block = "if x:\n    y = 1\notherwise z:\n    y = 2\nelse:\n    y = 3\n";

        for src in [inline, block] {
            let mut parser = Parser::new(src);
            let program = parser.parse_program();
            assert!(parser.errors().is_empty(), "{:?}", parser.errors());
            match &program.statements[..] {
                [Stmt::If {
                    consequence,
                    branches,
                    alternative: Some(alternative),
                    ..
                }] => {
                    assert_eq!(consequence.len(), 1);
                    assert_eq!(branches.len(), 1);
                    assert_eq!(alternative.len(), 1);
                }
                other => panic!("unexpected statements for {:?}: {:?}", src, other),
            }
        }
    }

    #[test]
    fn test_spell_parameters() {
        let mut parser = Parser::new("spell f(a, b: int, c = 1):\n    return a\n");
        let program = parser.parse_program();
        assert!(parser.errors().is_empty(), "{:?}", parser.errors());
        match &program.statements[..] {
            [Stmt::Spell(decl)] => {
                assert_eq!(decl.name.lexeme, "f");
                assert_eq!(decl.params.len(), 3);
                assert!(decl.params[0].type_hint.is_none());
                assert_eq!(
                    decl.params[1].type_hint.as_ref().map(|t| t.lexeme.as_str()),
                    Some("int")
                );
                assert!(decl.params[2].default.is_some());
                assert_eq!(decl.body.len(), 1);
            }
            other => panic!("expected a spell, got {:?}", other),
        }
    }

    #[test]
    fn test_grimoires() {
        let src = "\
grim Dog(Animal):
    \"A good dog\"
    init(name):
        self.name = name

    spell speak():
        return \"woof\"

arcane grim Shape:
    @arcanespell
    spell area()
";
        let mut parser = Parser::new(src);
        let program = parser.parse_program();
        assert!(parser.errors().is_empty(), "{:?}", parser.errors());
        match &program.statements[..] {
            [Stmt::Grimoire(dog), Stmt::Grimoire(shape)] => {
                assert_eq!(dog.name.lexeme, "Dog");
                assert_eq!(dog.parent.as_ref().map(|p| p.lexeme.as_str()), Some("Animal"));
                assert!(dog.init.is_some());
                assert_eq!(dog.methods.len(), 1);
                assert!(!dog.is_arcane);

                assert!(shape.is_arcane);
                assert_eq!(shape.methods.len(), 1);
                assert!(shape.methods[0].is_arcane);
                assert!(shape.methods[0].body.is_empty());
            }
            other => panic!("expected two grimoires, got {:?}", other),
        }
    }

    #[test]
    fn test_match_and_attempt() {
        let src = "\
match x:
    case 1:
        a
    case 2: b
    _:
        c
attempt:
    raise Error(\"x\")
ensnare \"x\" as e:
    print(e)
ensnare:
    ignore
resolve:
    print(1)
";
        let mut parser = Parser::new(src);
        let program = parser.parse_program();
        assert!(parser.errors().is_empty(), "{:?}", parser.errors());
        match &program.statements[..] {
            [Stmt::Match { cases, default, .. }, Stmt::Attempt {
                ensnares, resolve, ..
            }] => {
                assert_eq!(cases.len(), 2);
                assert!(default.is_some());
                assert_eq!(ensnares.len(), 2);
                assert!(ensnares[0].condition.is_some());
                assert_eq!(
                    ensnares[0].alias.as_ref().map(|a| a.lexeme.as_str()),
                    Some("e")
                );
                assert!(ensnares[1].condition.is_none());
                assert!(resolve.is_some());
            }
            other => panic!("unexpected statements: {:?}", other),
        }
    }

    #[test]
    fn test_imports_globals_and_main() {
        let src = "import \"lib/shapes.Circle\" as C\nglobal a, b\nmain:\n    run()\n";
        let mut parser = Parser::new(src);
        let program = parser.parse_program();
        assert!(parser.errors().is_empty(), "{:?}", parser.errors());
        assert!(program.has_main());
        match &program.statements[..] {
            [Stmt::Import { path, alias, .. }, Stmt::Global { names, .. }, Stmt::Main { body, .. }] =>
            {
                assert_eq!(path, "lib/shapes.Circle");
                assert_eq!(alias.as_ref().map(|a| a.lexeme.as_str()), Some("C"));
                assert_eq!(names.len(), 2);
                assert_eq!(body.len(), 1);
            }
            other => panic!("unexpected statements: {:?}", other),
        }
    }

    #[test]
    fn test_with_statement() {
        let mut parser = Parser::new("with open(path) as f:\n    print(f)\nwith lock: ignore\n");
        let program = parser.parse_program();
        assert!(parser.errors().is_empty(), "{:?}", parser.errors());
        match &program.statements[..] {
            [Stmt::With {
                resource: Expr::Call { .. },
                alias: Some(alias),
                body,
                ..
            }, Stmt::With {
                alias: None,
                body: inline,
                ..
            }] => {
                assert_eq!(alias.lexeme, "f");
                assert_eq!(body.len(), 1);
                assert_eq!(inline.len(), 1);
            }
            other => panic!("unexpected statements: {:?}", other),
        }
    }

    #[test]
    fn test_for_with_unpacking() {
        let mut parser = Parser::new("for k, v in pairs(h):\n    print(k)\nelse:\n    print(0)\n");
        let program = parser.parse_program();
        assert!(parser.errors().is_empty(), "{:?}", parser.errors());
        match &program.statements[..] {
            [Stmt::For {
                variable: Expr::Tuple { elements, .. },
                alternative: Some(_),
                ..
            }] => assert_eq!(elements.len(), 2),
            other => panic!("unexpected statements: {:?}", other),
        }
    }

    #[test]
    fn test_error_messages() {
        let tests = [
            ("x = \n", "[line 1:5] parser error: no prefix parse function for NEWLINE found"),
            (
                "if x\n    y\n",
                "[line 1:5] parser error: expected next token to be :, got NEWLINE instead",
            ),
            (
                "1 += 2\n",
                "[line 1:3] parser error: invalid assignment target for '+=': 1",
            ),
            ("x = $\n", "[line 1:5] parser error: unexpected character '$'"),
            ("if x:\ny\n", "[line 2:1] parser error: expected an indented block"),
        ];

        for (src, expected) in tests {
            assert_eq!(parse_errors(src), vec![String::from(expected)], "source: {:?}", src);
        }
    }

    #[test]
    fn test_errors_are_collected_past_the_first() {
        let mut parser = Parser::new("x = )\ny = 1\nz = (\n");
        let program = parser.parse_program();
        assert_eq!(parser.errors().len(), 2, "{:?}", parser.errors());
        assert_eq!(program.statements.len(), 1);
    }

    #[test]
    fn test_failed_header_skips_its_block() {
        let mut parser = Parser::new("while x y:\n    a = 1\n    b = 2\nc = 3\n");
        let program = parser.parse_program();
        assert_eq!(parser.errors().len(), 1, "{:?}", parser.errors());
        assert_eq!(program.statements.len(), 1);
    }
}
