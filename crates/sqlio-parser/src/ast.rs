//! Syntax tree
//!
//! Every node implements `Display`, printing canonical SQL: upper-case
//! keywords, single spaces, `, ` between list items. Parenthesised
//! sub-expressions are kept as [`Expr::Nested`], so printing a parsed
//! statement and parsing it again yields the same tree.

use std::fmt;

/// Top-level statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `SELECT ...`
    Select(Box<Select>),
    /// `UPDATE ...`
    Update(Box<Update>),
}

/// Identifier, with the quote it was written in
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident {
    /// Name without quotes
    pub value: String,
    /// Opening quote: `` ` ``, `"` or `[`
    pub quote: Option<char>,
}

impl Ident {
    /// Unquoted identifier
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            quote: None,
        }
    }

    /// Quoted identifier
    pub fn quoted(value: impl Into<String>, quote: char) -> Self {
        Self {
            value: value.into(),
            quote: Some(quote),
        }
    }
}

/// Dotted name: `schema.table`, `t.column`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name(pub Vec<Ident>);

impl Name {
    /// Last part
    pub fn base(&self) -> Option<&Ident> {
        self.0.last()
    }
}

/// Literal value
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Integer
    Int(i64),
    /// Decimal or exponent number, as written
    Numeric(String),
    /// String
    String(String),
    /// `NULL`
    Null,
    /// `TRUE` / `FALSE`
    Bool(bool),
}

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `>=`
    Ge,
    /// `<=`
    Le,
    /// `IN`
    In,
    /// `NOT IN`
    NotIn,
    /// `IS`
    Is,
    /// `IS NOT`
    IsNot,
    /// `AND`
    And,
    /// `OR`
    Or,
}

/// Expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column or other bare name
    Ident(Ident),
    /// Dotted name
    Selector(Name),
    /// Literal
    Literal(Literal),
    /// Bind parameter as written
    Placeholder(String),
    /// `( expr )`
    Nested(Box<Expr>),
    /// `( a, b, ... )`
    List(Vec<Expr>),
    /// `( SELECT ... )`
    Subquery(Box<Select>),
    /// `CASE [operand] WHEN .. THEN .. [ELSE ..] END`
    Case {
        /// Simple-case operand
        operand: Option<Box<Expr>>,
        /// `WHEN` / `THEN` pairs
        whens: Vec<(Expr, Expr)>,
        /// `ELSE` branch
        otherwise: Option<Box<Expr>>,
    },
    /// Function call
    Call {
        /// Function name
        name: Name,
        /// `DISTINCT` before the arguments
        distinct: bool,
        /// Arguments
        args: Vec<Expr>,
    },
    /// `NOT expr`
    Not(Box<Expr>),
    /// `-expr`
    Neg(Box<Expr>),
    /// `*`, `t.*` or `* EXCEPT (a, b)`
    Star {
        /// Qualifier before `.*`
        qualifier: Option<Name>,
        /// Columns excluded with `EXCEPT`
        except: Vec<Ident>,
    },
    /// `left op right`
    Binary {
        /// Left operand
        left: Box<Expr>,
        /// Operator
        op: BinaryOp,
        /// Right operand
        right: Box<Expr>,
    },
}

impl Expr {
    /// `left op right`
    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Self::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }
}

/// `DISTINCT` or the default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectKind {
    /// All rows
    #[default]
    All,
    /// `DISTINCT`
    Distinct,
}

/// Projection item: `expr [AS alias]`
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    /// Expression
    pub expr: Expr,
    /// Alias
    pub alias: Option<Ident>,
}

/// Row source
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// Table name
    Table(Name),
    /// Derived table
    Subquery(Box<Select>),
}

/// `FROM` item
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    /// Source
    pub source: Source,
    /// Alias
    pub alias: Option<Ident>,
}

/// Join type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// `[INNER] JOIN`
    Inner,
    /// `LEFT [OUTER] JOIN`
    Left,
    /// `RIGHT [OUTER] JOIN`
    Right,
    /// `FULL [OUTER] JOIN`
    Full,
    /// `CROSS JOIN`
    Cross,
}

/// Join clause
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// Join type
    pub kind: JoinKind,
    /// Joined source
    pub with: Source,
    /// Alias of the joined source
    pub alias: Option<Ident>,
    /// Join condition; absent for `CROSS JOIN`
    pub on: Option<Expr>,
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `ASC`
    Asc,
    /// `DESC`
    Desc,
}

/// `ORDER BY` item
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    /// Sort key
    pub expr: Expr,
    /// Explicit direction
    pub direction: Option<Direction>,
}

/// Named window: `WINDOW w AS (PARTITION BY .. ORDER BY ..)`
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    /// Window name
    pub name: Ident,
    /// `PARTITION BY` keys
    pub partition_by: Vec<Expr>,
    /// `ORDER BY` keys
    pub order_by: Vec<OrderBy>,
}

/// Common table expression
#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    /// Name
    pub name: Ident,
    /// Body
    pub select: Box<Select>,
}

/// `UNION [ALL]` continuation
#[derive(Debug, Clone, PartialEq)]
pub struct Union {
    /// `UNION ALL`
    pub all: bool,
    /// Right-hand query
    pub select: Select,
}

/// `SELECT` statement
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Select {
    /// `WITH` clauses
    pub with: Vec<Cte>,
    /// `DISTINCT` or not
    pub kind: SelectKind,
    /// Projection
    pub list: Vec<Projection>,
    /// `FROM`
    pub from: Option<TableRef>,
    /// Joins
    pub joins: Vec<Join>,
    /// `WHERE`
    pub qualify: Option<Expr>,
    /// `GROUP BY`
    pub group_by: Vec<Expr>,
    /// `HAVING`
    pub having: Option<Expr>,
    /// `WINDOW`
    pub window: Vec<Window>,
    /// `ORDER BY`
    pub order_by: Vec<OrderBy>,
    /// `LIMIT`
    pub limit: Option<Expr>,
    /// `OFFSET`
    pub offset: Option<Expr>,
    /// `UNION [ALL] SELECT ...`
    pub union: Option<Box<Union>>,
}

/// `column = value` in `SET`
#[derive(Debug, Clone, PartialEq)]
pub struct SetItem {
    /// Target column
    pub column: Name,
    /// New value
    pub value: Expr,
}

/// `UPDATE` statement
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    /// Target table
    pub target: Name,
    /// Alias of the target
    pub alias: Option<Ident>,
    /// Assignments
    pub set: Vec<SetItem>,
    /// `WHERE`
    pub qualify: Option<Expr>,
}

// ============================================================================
// Printing
// ============================================================================

struct Sep<'a, T>(&'a [T]);

impl<T: fmt::Display> fmt::Display for Sep<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{item}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select(s) => write!(f, "{s}"),
            Self::Update(u) => write!(f, "{u}"),
        }
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.quote {
            None => f.write_str(&self.value),
            Some('[') => write!(f, "[{}]", self.value),
            Some(q) => write!(f, "{q}{}{q}", self.value),
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{part}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Numeric(n) => f.write_str(n),
            Self::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Self::Null => f.write_str("NULL"),
            Self::Bool(true) => f.write_str("TRUE"),
            Self::Bool(false) => f.write_str("FALSE"),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::Is => "IS",
            Self::IsNot => "IS NOT",
            Self::And => "AND",
            Self::Or => "OR",
        })
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(i) => write!(f, "{i}"),
            Self::Selector(n) => write!(f, "{n}"),
            Self::Literal(l) => write!(f, "{l}"),
            Self::Placeholder(p) => f.write_str(p),
            Self::Nested(e) => write!(f, "({e})"),
            Self::List(items) => write!(f, "({})", Sep(items)),
            Self::Subquery(s) => write!(f, "({s})"),
            Self::Case {
                operand,
                whens,
                otherwise,
            } => {
                f.write_str("CASE")?;
                if let Some(op) = operand {
                    write!(f, " {op}")?;
                }
                for (when, then) in whens {
                    write!(f, " WHEN {when} THEN {then}")?;
                }
                if let Some(e) = otherwise {
                    write!(f, " ELSE {e}")?;
                }
                f.write_str(" END")
            }
            Self::Call {
                name,
                distinct,
                args,
            } => {
                write!(f, "{name}(")?;
                if *distinct {
                    f.write_str("DISTINCT ")?;
                }
                write!(f, "{})", Sep(args))
            }
            Self::Not(e) => write!(f, "NOT {e}"),
            // "--" would open a comment
            Self::Neg(e) if matches!(**e, Self::Neg(_)) => write!(f, "- {e}"),
            Self::Neg(e) => write!(f, "-{e}"),
            Self::Star { qualifier, except } => {
                if let Some(q) = qualifier {
                    write!(f, "{q}.")?;
                }
                f.write_str("*")?;
                if !except.is_empty() {
                    write!(f, " EXCEPT ({})", Sep(except))?;
                }
                Ok(())
            }
            Self::Binary { left, op, right } => write!(f, "{left} {op} {right}"),
        }
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        if let Some(alias) = &self.alias {
            write!(f, " AS {alias}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table(name) => write!(f, "{name}"),
            Self::Subquery(s) => write!(f, "({s})"),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)?;
        if let Some(alias) = &self.alias {
            write!(f, " {alias}")?;
        }
        Ok(())
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
            Self::Full => "FULL JOIN",
            Self::Cross => "CROSS JOIN",
        })
    }
}

impl fmt::Display for Join {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.with)?;
        if let Some(alias) = &self.alias {
            write!(f, " {alias}")?;
        }
        if let Some(on) = &self.on {
            write!(f, " ON {on}")?;
        }
        Ok(())
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        match self.direction {
            Some(Direction::Asc) => f.write_str(" ASC"),
            Some(Direction::Desc) => f.write_str(" DESC"),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} AS (", self.name)?;
        if !self.partition_by.is_empty() {
            write!(f, "PARTITION BY {}", Sep(&self.partition_by))?;
        }
        if !self.order_by.is_empty() {
            if !self.partition_by.is_empty() {
                f.write_str(" ")?;
            }
            write!(f, "ORDER BY {}", Sep(&self.order_by))?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for Cte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} AS ({})", self.name, self.select)
    }
}

impl fmt::Display for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.with.is_empty() {
            write!(f, "WITH {} ", Sep(&self.with))?;
        }
        f.write_str("SELECT ")?;
        if self.kind == SelectKind::Distinct {
            f.write_str("DISTINCT ")?;
        }
        write!(f, "{}", Sep(&self.list))?;
        if let Some(from) = &self.from {
            write!(f, " FROM {from}")?;
        }
        for join in &self.joins {
            write!(f, " {join}")?;
        }
        if let Some(q) = &self.qualify {
            write!(f, " WHERE {q}")?;
        }
        if !self.group_by.is_empty() {
            write!(f, " GROUP BY {}", Sep(&self.group_by))?;
        }
        if let Some(h) = &self.having {
            write!(f, " HAVING {h}")?;
        }
        if !self.window.is_empty() {
            write!(f, " WINDOW {}", Sep(&self.window))?;
        }
        if !self.order_by.is_empty() {
            write!(f, " ORDER BY {}", Sep(&self.order_by))?;
        }
        if let Some(l) = &self.limit {
            write!(f, " LIMIT {l}")?;
        }
        if let Some(o) = &self.offset {
            write!(f, " OFFSET {o}")?;
        }
        if let Some(u) = &self.union {
            f.write_str(if u.all { " UNION ALL " } else { " UNION " })?;
            write!(f, "{}", u.select)?;
        }
        Ok(())
    }
}

impl fmt::Display for SetItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.column, self.value)
    }
}

impl fmt::Display for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UPDATE {}", self.target)?;
        if let Some(alias) = &self.alias {
            write!(f, " {alias}")?;
        }
        write!(f, " SET {}", Sep(&self.set))?;
        if let Some(q) = &self.qualify {
            write!(f, " WHERE {q}")?;
        }
        Ok(())
    }
}
