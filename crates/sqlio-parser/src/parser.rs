//! Statement parser
//!
//! Hand-written recursive descent over the token stream. Expressions are
//! parsed in `expr.rs`.

use crate::ast::{
    Cte, Direction, Ident, Join, JoinKind, Name, OrderBy, Projection, Select, SelectKind, SetItem,
    Source, Statement, TableRef, Union, Update, Window,
};
use crate::error::{ParseError, Result};
use crate::lexer::Lexer;
use crate::token::{is_reserved, Token, TokenKind};

/// Parser over one SQL text
pub struct Parser {
    pub(crate) tokens: Vec<Token>,
    pub(crate) pos: usize,
}

impl Parser {
    /// Tokenize `sql`
    pub fn new(sql: &str) -> Result<Self> {
        Ok(Self {
            tokens: Lexer::tokenize(sql)?,
            pos: 0,
        })
    }

    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    pub(crate) fn peek(&self) -> &Token {
        // the lexer always ends the stream with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(crate) fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    pub(crate) fn peek_nth(&self, n: usize) -> &TokenKind {
        let i = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[i].kind
    }

    pub(crate) fn at_word(&self, kw: &str) -> bool {
        self.peek_kind().is_word(kw)
    }

    pub(crate) fn eat_word(&mut self, kw: &str) -> bool {
        if self.at_word(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_word(&mut self, kw: &str) -> Result<()> {
        if self.eat_word(kw) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{kw}'")))
        }
    }

    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() == kind {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: &TokenKind) -> Result<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected(&kind.to_string()))
        }
    }

    pub(crate) fn unexpected(&self, expected: &str) -> ParseError {
        ParseError::at(
            format!("expected {expected}, found {}", self.peek_kind()),
            self.peek(),
        )
    }

    /// Identifier at the cursor; reserved words only when quoted
    pub(crate) fn ident(&mut self) -> Result<Ident> {
        match self.peek_kind().clone() {
            TokenKind::Word(w) if !is_reserved(&w) => {
                self.pos += 1;
                Ok(Ident::new(w))
            }
            TokenKind::Quoted(w, q) => {
                self.pos += 1;
                Ok(Ident::quoted(w, q))
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    pub(crate) fn at_ident(&self) -> bool {
        match self.peek_kind() {
            TokenKind::Word(w) => !is_reserved(w),
            TokenKind::Quoted(..) => true,
            _ => false,
        }
    }

    fn name(&mut self) -> Result<Name> {
        let mut parts = vec![self.ident()?];
        while self.peek_kind() == &TokenKind::Dot {
            self.pos += 1;
            parts.push(self.ident()?);
        }
        Ok(Name(parts))
    }

    pub(crate) fn comma_list<T>(&mut self, mut item: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        let mut out = vec![item(self)?];
        while self.eat(&TokenKind::Comma) {
            out.push(item(self)?);
        }
        Ok(out)
    }

    fn alias(&mut self) -> Result<Option<Ident>> {
        if self.eat_word("AS") {
            return self.ident().map(Some);
        }
        if self.at_ident() {
            return self.ident().map(Some);
        }
        Ok(None)
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    /// Parse one statement and require the end of input
    pub fn statement(&mut self) -> Result<Statement> {
        let stmt = if self.at_word("UPDATE") {
            Statement::Update(Box::new(self.update()?))
        } else if self.at_word("SELECT") || self.at_word("WITH") {
            Statement::Select(Box::new(self.select()?))
        } else {
            return Err(self.unexpected("SELECT or UPDATE"));
        };
        self.finish()?;
        Ok(stmt)
    }

    /// Require the end of input, after an optional `;`
    pub fn finish(&mut self) -> Result<()> {
        self.eat(&TokenKind::Semicolon);
        if self.peek_kind() == &TokenKind::Eof {
            Ok(())
        } else {
            Err(self.unexpected("end of input"))
        }
    }

    /// `[WITH ..] SELECT ..`
    pub fn select(&mut self) -> Result<Select> {
        let mut select = Select::default();
        if self.eat_word("WITH") {
            select.with = self.comma_list(|p| {
                let name = p.ident()?;
                p.expect_word("AS")?;
                p.expect(&TokenKind::LParen)?;
                let body = p.select()?;
                p.expect(&TokenKind::RParen)?;
                Ok(Cte {
                    name,
                    select: Box::new(body),
                })
            })?;
        }
        self.expect_word("SELECT")?;
        if self.eat_word("DISTINCT") {
            select.kind = SelectKind::Distinct;
        } else {
            self.eat_word("ALL");
        }
        select.list = self.comma_list(|p| {
            let expr = p.expr()?;
            let alias = p.alias()?;
            Ok(Projection { expr, alias })
        })?;

        if self.eat_word("FROM") {
            let source = self.source()?;
            let alias = self.alias()?;
            select.from = Some(TableRef { source, alias });
            while let Some(kind) = self.join_kind()? {
                let with = self.source()?;
                let alias = self.alias()?;
                let on = if kind == JoinKind::Cross {
                    None
                } else {
                    self.expect_word("ON")?;
                    Some(self.expr()?)
                };
                select.joins.push(Join {
                    kind,
                    with,
                    alias,
                    on,
                });
            }
        }
        if self.eat_word("WHERE") {
            select.qualify = Some(self.expr()?);
        }
        if self.eat_word("GROUP") {
            self.expect_word("BY")?;
            select.group_by = self.comma_list(Self::expr)?;
        }
        if self.eat_word("HAVING") {
            select.having = Some(self.expr()?);
        }
        if self.eat_word("WINDOW") {
            select.window = self.comma_list(Self::window)?;
        }
        if self.eat_word("ORDER") {
            self.expect_word("BY")?;
            select.order_by = self.comma_list(Self::order_by)?;
        }
        if self.eat_word("LIMIT") {
            let first = self.expr()?;
            if self.eat(&TokenKind::Comma) {
                // LIMIT offset, count
                select.offset = Some(first);
                select.limit = Some(self.expr()?);
            } else {
                select.limit = Some(first);
            }
        }
        if select.offset.is_none() && self.eat_word("OFFSET") {
            select.offset = Some(self.expr()?);
        }
        if self.eat_word("UNION") {
            let all = self.eat_word("ALL");
            let rhs = self.select()?;
            select.union = Some(Box::new(Union { all, select: rhs }));
        }
        Ok(select)
    }

    fn source(&mut self) -> Result<Source> {
        if self.eat(&TokenKind::LParen) {
            let sub = self.select()?;
            self.expect(&TokenKind::RParen)?;
            return Ok(Source::Subquery(Box::new(sub)));
        }
        self.name().map(Source::Table)
    }

    fn join_kind(&mut self) -> Result<Option<JoinKind>> {
        let kind = if self.eat_word("JOIN") {
            return Ok(Some(JoinKind::Inner));
        } else if self.eat_word("INNER") {
            JoinKind::Inner
        } else if self.eat_word("CROSS") {
            JoinKind::Cross
        } else if self.eat_word("LEFT") {
            self.eat_word("OUTER");
            JoinKind::Left
        } else if self.eat_word("RIGHT") {
            self.eat_word("OUTER");
            JoinKind::Right
        } else if self.eat_word("FULL") {
            self.eat_word("OUTER");
            JoinKind::Full
        } else {
            return Ok(None);
        };
        self.expect_word("JOIN")?;
        Ok(Some(kind))
    }

    fn order_by(&mut self) -> Result<OrderBy> {
        let expr = self.expr()?;
        let direction = if self.eat_word("ASC") {
            Some(Direction::Asc)
        } else if self.eat_word("DESC") {
            Some(Direction::Desc)
        } else {
            None
        };
        Ok(OrderBy { expr, direction })
    }

    fn window(&mut self) -> Result<Window> {
        let name = self.ident()?;
        self.expect_word("AS")?;
        self.expect(&TokenKind::LParen)?;
        let mut window = Window {
            name,
            partition_by: Vec::new(),
            order_by: Vec::new(),
        };
        if self.eat_word("PARTITION") {
            self.expect_word("BY")?;
            window.partition_by = self.comma_list(Self::expr)?;
        }
        if self.eat_word("ORDER") {
            self.expect_word("BY")?;
            window.order_by = self.comma_list(Self::order_by)?;
        }
        self.expect(&TokenKind::RParen)?;
        Ok(window)
    }

    /// `UPDATE target [alias] SET c = v, .. [WHERE ..]`
    pub fn update(&mut self) -> Result<Update> {
        self.expect_word("UPDATE")?;
        let target = self.name()?;
        let alias = self.alias()?;
        self.expect_word("SET")?;
        let set = self.comma_list(|p| {
            let column = p.name()?;
            p.expect(&TokenKind::Eq)?;
            let value = p.expr()?;
            Ok(SetItem { column, value })
        })?;
        let qualify = if self.eat_word("WHERE") {
            Some(self.expr()?)
        } else {
            None
        };
        Ok(Update {
            target,
            alias,
            set,
            qualify,
        })
    }
}
