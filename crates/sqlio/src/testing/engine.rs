//! Statement interpreter of the in-memory database
//!
//! Understands the statement shapes this crate emits against a MySQL-like
//! server plus a few plain forms used by merge configurations:
//! `INSERT .. VALUES`, `INSERT .. SELECT`, `SELECT cols FROM t`,
//! `UPDATE .. WHERE k = ?`, `DELETE .. WHERE k IN (..)`, `TRUNCATE`,
//! `CREATE TABLE .. LIKE`, `SHOW CREATE TABLE`, `LOAD DATA LOCAL INFILE`,
//! the defaults `SELECT COALESCE(..) .. UNION` and session/lock functions.

use crate::connection::ExecResult;
use crate::error::{Error, Result};
use crate::load::{reader_data, NULL_MARKER};
use crate::mapping::is_zero_identity;
use crate::types::{Row, Value};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

macro_rules! re {
    ($name:ident, $pattern:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($pattern).unwrap());
    };
}

re!(INSERT_VALUES, r"(?is)^INSERT\s+INTO\s+(\S+?)\s*\(([^)]*)\)\s*VALUES\s*(.*)$");
re!(INSERT_SELECT, r"(?is)^INSERT\s+INTO\s+(\S+?)\s*\(([^)]*)\)\s*SELECT\s+(.+?)\s+FROM\s+(\S+)\s*$");
re!(RETURNING, r"(?is)\bRETURNING\s+(\S+)\s*$");
re!(ON_DUPLICATE, r"(?is)\bON\s+DUPLICATE\s+KEY\s+UPDATE\b");
re!(MAX_SCAN, r"(?is)^SELECT\s+COALESCE\(\s*MAX\((\S+?)\)\s*,\s*0\s*\)\s+FROM\s+(\S+)\s*$");
re!(SELECT, r"(?is)^SELECT\s+(.+?)\s+FROM\s+(\S+)(?:\s+ORDER\s+BY\s+(\S+))?\s*$");
re!(UPDATE, r"(?is)^UPDATE\s+(\S+)\s+SET\s+(.+?)\s+WHERE\s+(\S+)\s*=\s*\S+\s*$");
re!(DELETE_IN, r"(?is)^DELETE\s+FROM\s+(\S+)\s+WHERE\s+(\S+)\s+IN\s*\((.*)\)\s*$");
re!(DELETE_EQ, r"(?is)^DELETE\s+FROM\s+(\S+)\s+WHERE\s+(\S+)\s*=\s*\S+\s*$");
re!(DELETE_ALL, r"(?is)^(?:DELETE\s+FROM|TRUNCATE(?:\s+TABLE)?)\s+(\S+)\s*$");
re!(CREATE_LIKE, r"(?is)^CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?(\S+)\s+LIKE\s+(\S+)\s*$");
re!(SHOW_CREATE, r"(?is)^SHOW\s+CREATE\s+TABLE\s+(\S+)\s*$");
re!(
    LOAD,
    r"(?is)^LOAD\s+DATA\s+LOCAL\s+INFILE\s+'([^']+)'\s*(REPLACE|IGNORE)?\s+INTO\s+TABLE\s+(\S+)\s+FIELDS\s+TERMINATED\s+BY\s+'((?:\\.|[^'])*)'(?:\s+ENCLOSED\s+BY\s+'((?:\\.|[^'])*)')?\s+ESCAPED\s+BY\s+'((?:\\.|[^'])*)'\s+LINES\s+TERMINATED\s+BY\s+'((?:\\.|[^'])*)'(?:\s*\(([^)]*)\))?\s*$"
);
re!(DEFAULT_ITEM, r"(?is)^COALESCE\(\s*\S+\s*,\s*(.+)\)\s+AS\s+(\S+)$");
re!(POSITION_ITEM, r"(?is)^\S+\+0\s+AS\s+(\S+)$");
re!(LOCK_CALL, r"(?is)^SELECT\s+GET_LOCK\(");

/// Identifier without quotes or schema, lowercased
pub(super) fn ident(raw: &str) -> String {
    let bare = raw.rsplit('.').next().unwrap_or(raw);
    bare.trim_matches(|c| matches!(c, '`' | '"' | '[' | ']'))
        .to_ascii_lowercase()
}

fn list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ident)
        .collect()
}

/// Split on top-level commas, respecting parentheses and quotes
fn split_items(raw: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let (mut depth, mut quoted, mut start) = (0i32, false, 0);
    for (i, c) in raw.char_indices() {
        match c {
            '\'' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth -= 1,
            ',' if !quoted && depth == 0 => {
                items.push(raw[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(raw[start..].trim());
    items
}

/// Decode a single-character SQL literal body (`\t`, `\n`, `\\`, `x`)
fn unescape_literal(raw: &str) -> Option<char> {
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some('\\'), Some('t')) => Some('\t'),
        (Some('\\'), Some('n')) => Some('\n'),
        (Some('\\'), Some('r')) => Some('\r'),
        (Some('\\'), Some(c)) => Some(c),
        (Some(c), None) => Some(c),
        _ => None,
    }
}

/// Evaluate a default expression
fn eval_default(expr: &str) -> Value {
    let expr = expr.trim();
    let upper = expr.to_ascii_uppercase();
    if upper == "NULL" {
        return Value::Null;
    }
    if upper == "NOW()" || upper == "CURRENT_TIMESTAMP" || upper == "CURRENT_TIMESTAMP()" {
        return Value::DateTime(chrono::Utc::now().naive_utc());
    }
    if upper == "UUID()" {
        return Value::String(uuid::Uuid::new_v4().to_string());
    }
    if let Some(s) = expr.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        return Value::String(s.replace("''", "'"));
    }
    if let Ok(n) = expr.parse::<i64>() {
        return Value::Int64(n);
    }
    if let Ok(f) = expr.parse::<f64>() {
        return Value::Float64(f);
    }
    Value::String(expr.to_string())
}

/// A table of the in-memory database
#[derive(Debug, Clone)]
pub(super) struct Table {
    pub columns: Arc<[String]>,
    pub identity: Option<usize>,
    /// Next identity the table would assign
    pub counter: i64,
    pub rows: BTreeMap<u64, Vec<Value>>,
    pub next_rowid: u64,
}

impl Table {
    pub fn new(columns: &[&str], identity: Option<&str>) -> Self {
        let columns: Vec<String> = columns.iter().map(|c| c.to_ascii_lowercase()).collect();
        let identity = identity.and_then(|id| columns.iter().position(|c| c.eq_ignore_ascii_case(id)));
        Self {
            columns: columns.into(),
            identity,
            counter: 1,
            rows: BTreeMap::new(),
            next_rowid: 1,
        }
    }

    fn position(&self, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| *c == column)
            .ok_or_else(|| Error::driver(format!("Unknown column '{column}'")))
    }

    fn find_identity(&self, id: i64) -> Option<u64> {
        let pos = self.identity?;
        self.rows
            .iter()
            .find(|(_, v)| v[pos].as_i64() == Some(id))
            .map(|(rowid, _)| *rowid)
    }

    /// Next value above `id` in the server progression
    fn bump(&mut self, id: i64, increment: i64, offset: i64) {
        if id >= self.counter {
            let inc = increment.max(1);
            let steps = (id + 1 - offset + inc - 1).div_euclid(inc);
            self.counter = offset + steps.max(0) * inc;
        }
    }

    pub fn to_rows(&self) -> Vec<Row> {
        self.rows
            .values()
            .map(|v| Row::new(self.columns.clone(), v.clone()))
            .collect()
    }
}

/// Reverse operation recorded by an open transaction
#[derive(Debug, Clone)]
pub(super) enum Undo {
    Inserted { table: String, rowid: u64 },
    Deleted { table: String, rowid: u64, values: Vec<Value> },
    Updated { table: String, rowid: u64, values: Vec<Value> },
}

/// Injected statement failure
#[derive(Debug, Clone)]
pub(super) struct Failure {
    pub pattern: String,
    pub remaining: usize,
    pub retriable: bool,
}

/// Result of one statement
#[derive(Debug)]
pub(super) enum Outcome {
    Rows(Vec<Row>),
    Exec(ExecResult),
}

/// Conflict handling of an INSERT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Duplicate {
    Fail,
    Replace,
    Ignore,
}

/// Shared database state
#[derive(Debug)]
pub(super) struct State {
    pub version: String,
    pub schema: String,
    pub tables: HashMap<String, Table>,
    pub locks: HashMap<String, u64>,
    pub log: Vec<String>,
    pub failures: Vec<Failure>,
    pub delays: Vec<(String, Duration)>,
    pub open_statements: i64,
    pub open_transactions: i64,
    /// Highest number of simultaneously open transactions
    pub peak_transactions: i64,
    pub increment: i64,
    pub offset: i64,
}

impl Default for State {
    fn default() -> Self {
        Self {
            version: "8.0.33-mock".into(),
            schema: "test".into(),
            tables: HashMap::new(),
            locks: HashMap::new(),
            log: Vec::new(),
            failures: Vec::new(),
            delays: Vec::new(),
            open_statements: 0,
            open_transactions: 0,
            peak_transactions: 0,
            increment: 1,
            offset: 1,
        }
    }
}

/// Whether `sql` is a `GET_LOCK` call that may need polling
pub(super) fn is_lock_call(sql: &str) -> bool {
    LOCK_CALL.is_match(sql.trim())
}

impl State {
    /// Delay configured for `sql`
    pub fn delay_for(&self, sql: &str) -> Option<Duration> {
        let upper = sql.to_ascii_uppercase();
        self.delays
            .iter()
            .find(|(p, _)| upper.contains(&p.to_ascii_uppercase()))
            .map(|(_, d)| *d)
    }

    /// Consume an injected failure matching `sql`
    pub fn take_failure(&mut self, sql: &str) -> Option<Error> {
        let upper = sql.to_ascii_uppercase();
        let failure = self
            .failures
            .iter_mut()
            .find(|f| f.remaining > 0 && upper.contains(&f.pattern.to_ascii_uppercase()))?;
        failure.remaining -= 1;
        Some(if failure.retriable {
            Error::connection(format!("injected failure on '{}'", failure.pattern))
        } else {
            Error::driver_with_sql(format!("injected failure on '{}'", failure.pattern), sql)
        })
    }

    fn table_mut(&mut self, raw: &str) -> Result<&mut Table> {
        let name = ident(raw);
        self.tables
            .get_mut(&name)
            .ok_or_else(|| Error::driver(format!("Table '{name}' doesn't exist")))
    }

    fn table(&self, raw: &str) -> Result<&Table> {
        let name = ident(raw);
        self.tables
            .get(&name)
            .ok_or_else(|| Error::driver(format!("Table '{name}' doesn't exist")))
    }

    /// Try to take a named lock for `conn`
    pub fn try_lock(&mut self, name: &str, conn: u64) -> bool {
        match self.locks.get(name) {
            Some(owner) if *owner != conn => false,
            _ => {
                self.locks.insert(name.to_string(), conn);
                true
            }
        }
    }

    /// Drop every lock held by `conn`
    pub fn release_all(&mut self, conn: u64) {
        self.locks.retain(|_, owner| *owner != conn);
    }

    /// Insert one row; returns (rows affected, generated identity)
    fn insert_row(
        &mut self,
        table_name: &str,
        columns: &[String],
        values: &[Value],
        duplicate: Duplicate,
        undo: &mut Option<&mut Vec<Undo>>,
    ) -> Result<(u64, Option<i64>, Option<i64>)> {
        let (increment, offset) = (self.increment, self.offset);
        let key = ident(table_name);
        let table = self.table_mut(table_name)?;
        let mut row = vec![Value::Null; table.columns.len()];
        for (column, value) in columns.iter().zip(values) {
            row[table.position(column)?] = value.clone();
        }

        let mut generated = None;
        let mut id = None;
        if let Some(pos) = table.identity {
            if is_zero_identity(&row[pos]) {
                let next = table.counter;
                table.counter += increment.max(1);
                row[pos] = Value::Int64(next);
                generated = Some(next);
                id = Some(next);
            } else {
                let explicit = row[pos]
                    .as_i64()
                    .ok_or_else(|| Error::driver("identity must be an integer"))?;
                row[pos] = Value::Int64(explicit);
                table.bump(explicit, increment, offset);
                id = Some(explicit);
                if let Some(existing) = table.find_identity(explicit) {
                    return match duplicate {
                        Duplicate::Fail => Err(Error::driver(format!(
                            "Duplicate entry '{explicit}' for key 'PRIMARY'"
                        ))),
                        Duplicate::Ignore => Ok((0, None, id)),
                        Duplicate::Replace => {
                            let old = table.rows.insert(existing, row).unwrap_or_default();
                            if let Some(log) = undo.as_deref_mut() {
                                log.push(Undo::Updated {
                                    table: key,
                                    rowid: existing,
                                    values: old,
                                });
                            }
                            Ok((2, None, id))
                        }
                    };
                }
            }
        }

        let rowid = table.next_rowid;
        table.next_rowid += 1;
        table.rows.insert(rowid, row);
        if let Some(log) = undo.as_deref_mut() {
            log.push(Undo::Inserted { table: key, rowid });
        }
        Ok((1, generated, id))
    }

    /// Apply an undo log in reverse
    pub fn rollback(&mut self, undo: Vec<Undo>) {
        for entry in undo.into_iter().rev() {
            match entry {
                Undo::Inserted { table, rowid } => {
                    if let Some(t) = self.tables.get_mut(&table) {
                        t.rows.remove(&rowid);
                    }
                }
                Undo::Deleted { table, rowid, values } | Undo::Updated { table, rowid, values } => {
                    if let Some(t) = self.tables.get_mut(&table) {
                        t.rows.insert(rowid, values);
                    }
                }
            }
        }
    }

    /// Execute one statement
    pub fn run(
        &mut self,
        conn: u64,
        sql: &str,
        params: &[Value],
        mut undo: Option<&mut Vec<Undo>>,
    ) -> Result<Outcome> {
        let sql = sql.trim().trim_end_matches(';');
        let upper = sql.to_ascii_uppercase();
        let scalar = |v: Value| {
            Outcome::Rows(vec![Row::new(vec!["value".to_string()], vec![v])])
        };

        match upper.as_str() {
            "SELECT 1" => return Ok(scalar(Value::Int64(1))),
            "SELECT VERSION()" => return Ok(scalar(Value::String(self.version.clone()))),
            "SET FOREIGN_KEY_CHECKS = 0" | "SET FOREIGN_KEY_CHECKS = 1" => {
                return Ok(Outcome::Exec(ExecResult::rows(0)))
            }
            _ => {}
        }
        if upper.starts_with("SELECT CONNECTION_ID()") {
            return Ok(Outcome::Rows(vec![Row::new(
                ["pid", "catalog_name", "schema_name"].map(String::from).to_vec(),
                vec![
                    Value::Int64(conn as i64),
                    Value::String("def".into()),
                    Value::String(self.schema.clone()),
                ],
            )]));
        }
        if upper.starts_with("SELECT @@SESSION.AUTO_INCREMENT_INCREMENT") {
            return Ok(Outcome::Rows(vec![Row::new(
                ["increment_by", "start_value"].map(String::from).to_vec(),
                vec![Value::Int64(self.increment), Value::Int64(self.offset)],
            )]));
        }
        if upper.starts_with("SELECT RELEASE_LOCK(") {
            let name = params.first().and_then(Value::as_string).unwrap_or_default();
            let held = self.locks.get(&name) == Some(&conn);
            if held {
                self.locks.remove(&name);
            }
            return Ok(scalar(Value::Int64(i64::from(held))));
        }
        if upper.contains("SQLX_POS") {
            return self.defaults(sql, params);
        }
        if let Some(c) = SHOW_CREATE.captures(sql) {
            let table = self.table(&c[1])?;
            let name = ident(&c[1]);
            let mut ddl = format!("CREATE TABLE `{name}` (...) ENGINE=InnoDB");
            if table.identity.is_some() && table.counter > 1 {
                ddl.push_str(&format!(" AUTO_INCREMENT={}", table.counter));
            }
            return Ok(Outcome::Rows(vec![Row::new(
                ["Table", "Create Table"].map(String::from).to_vec(),
                vec![Value::String(name), Value::String(ddl)],
            )]));
        }
        if let Some(c) = MAX_SCAN.captures(sql) {
            let table = self.table(&c[2])?;
            let pos = table.position(&ident(&c[1]))?;
            let max = table
                .rows
                .values()
                .filter_map(|r| r[pos].as_i64())
                .max()
                .unwrap_or(0);
            return Ok(scalar(Value::Int64(max)));
        }
        if let Some(c) = INSERT_SELECT.captures(sql) {
            return self.insert_select(&c[1], &list(&c[2]), &list(&c[3]), &c[4], &mut undo);
        }
        if let Some(c) = INSERT_VALUES.captures(sql) {
            return self.insert_values(&c[1], &list(&c[2]), &c[3], params, &mut undo);
        }
        if let Some(c) = LOAD.captures(sql) {
            return self.load(&c, &mut undo);
        }
        if let Some(c) = UPDATE.captures(sql) {
            return self.update(&c[1], &c[2], &ident(&c[3]), params, &mut undo);
        }
        if let Some(c) = DELETE_IN.captures(sql) {
            let inner = c[3].trim();
            let keys: Vec<Value> = if inner.to_ascii_uppercase().starts_with("SELECT") {
                match self.run(conn, inner, &[], None)? {
                    Outcome::Rows(rows) => rows.into_iter().filter_map(|r| r.get(0).cloned()).collect(),
                    Outcome::Exec(_) => Vec::new(),
                }
            } else {
                params.to_vec()
            };
            return self.delete_where(&c[1], &ident(&c[2]), &keys, &mut undo);
        }
        if let Some(c) = DELETE_EQ.captures(sql) {
            return self.delete_where(&c[1], &ident(&c[2]), params, &mut undo);
        }
        if let Some(c) = DELETE_ALL.captures(sql) {
            let key = ident(&c[1]);
            let table = self.table_mut(&c[1])?;
            let removed = std::mem::take(&mut table.rows);
            let count = removed.len() as u64;
            if let Some(log) = undo.as_deref_mut() {
                for (rowid, values) in removed {
                    log.push(Undo::Deleted {
                        table: key.clone(),
                        rowid,
                        values,
                    });
                }
            }
            return Ok(Outcome::Exec(ExecResult::rows(count)));
        }
        if let Some(c) = CREATE_LIKE.captures(sql) {
            let name = ident(&c[1]);
            if !self.tables.contains_key(&name) {
                let mut like = self.table(&c[2])?.clone();
                like.rows.clear();
                like.counter = 1;
                self.tables.insert(name, like);
            }
            return Ok(Outcome::Exec(ExecResult::rows(0)));
        }
        if let Some(c) = SELECT.captures(sql) {
            return self.select(&c[1], &c[2], c.get(3).map(|m| m.as_str()));
        }
        Err(Error::driver_with_sql("You have an error in your SQL syntax", sql))
    }

    fn insert_values(
        &mut self,
        table: &str,
        columns: &[String],
        rest: &str,
        params: &[Value],
        undo: &mut Option<&mut Vec<Undo>>,
    ) -> Result<Outcome> {
        if columns.is_empty() || params.len() % columns.len() != 0 {
            return Err(Error::driver(format!(
                "Column count doesn't match value count: {} columns, {} values",
                columns.len(),
                params.len()
            )));
        }
        let duplicate = if ON_DUPLICATE.is_match(rest) {
            Duplicate::Replace
        } else {
            Duplicate::Fail
        };
        let returning = RETURNING.captures(rest).map(|c| ident(&c[1]));

        let mut affected = 0;
        let mut last_generated = None;
        let mut ids = Vec::new();
        for tuple in params.chunks(columns.len()) {
            let (n, generated, id) = self.insert_row(table, columns, tuple, duplicate, undo)?;
            affected += n;
            last_generated = generated.or(last_generated);
            ids.push(id);
        }

        if let Some(column) = returning {
            let names: Arc<[String]> = vec![column].into();
            return Ok(Outcome::Rows(
                ids.into_iter()
                    .map(|id| Row::new(names.clone(), vec![id.map_or(Value::Null, Value::Int64)]))
                    .collect(),
            ));
        }
        Ok(Outcome::Exec(ExecResult {
            rows_affected: affected,
            last_insert_id: last_generated,
        }))
    }

    fn insert_select(
        &mut self,
        target: &str,
        columns: &[String],
        source_columns: &[String],
        source: &str,
        undo: &mut Option<&mut Vec<Undo>>,
    ) -> Result<Outcome> {
        let src = self.table(source)?;
        let positions = source_columns
            .iter()
            .map(|c| src.position(c))
            .collect::<Result<Vec<_>>>()?;
        let rows: Vec<Vec<Value>> = src
            .rows
            .values()
            .map(|r| positions.iter().map(|&p| r[p].clone()).collect())
            .collect();
        let mut affected = 0;
        let mut last = None;
        for row in rows {
            let (n, generated, _) = self.insert_row(target, columns, &row, Duplicate::Fail, undo)?;
            affected += n;
            last = generated.or(last);
        }
        Ok(Outcome::Exec(ExecResult {
            rows_affected: affected,
            last_insert_id: last,
        }))
    }

    fn update(
        &mut self,
        table_name: &str,
        set: &str,
        key: &str,
        params: &[Value],
        undo: &mut Option<&mut Vec<Undo>>,
    ) -> Result<Outcome> {
        let table_key = ident(table_name);
        let table = self.table_mut(table_name)?;
        let targets = split_items(set)
            .into_iter()
            .map(|item| {
                let column = item.split('=').next().unwrap_or_default().trim();
                table.position(&ident(column))
            })
            .collect::<Result<Vec<_>>>()?;
        if params.len() != targets.len() + 1 {
            return Err(Error::driver("parameter count mismatch in UPDATE"));
        }
        let key_pos = table.position(key)?;
        let key_value = &params[targets.len()];

        let mut affected = 0;
        for (rowid, row) in table.rows.iter_mut() {
            if !values_equal(&row[key_pos], key_value) {
                continue;
            }
            let old = row.clone();
            for (pos, value) in targets.iter().zip(params) {
                row[*pos] = value.clone();
            }
            if *row != old {
                affected += 1;
            }
            if let Some(log) = undo.as_deref_mut() {
                log.push(Undo::Updated {
                    table: table_key.clone(),
                    rowid: *rowid,
                    values: old,
                });
            }
        }
        Ok(Outcome::Exec(ExecResult::rows(affected)))
    }

    fn delete_where(
        &mut self,
        table_name: &str,
        key: &str,
        keys: &[Value],
        undo: &mut Option<&mut Vec<Undo>>,
    ) -> Result<Outcome> {
        let table_key = ident(table_name);
        let table = self.table_mut(table_name)?;
        let pos = table.position(key)?;
        let doomed: Vec<u64> = table
            .rows
            .iter()
            .filter(|(_, r)| keys.iter().any(|k| values_equal(&r[pos], k)))
            .map(|(id, _)| *id)
            .collect();
        for rowid in &doomed {
            if let Some(values) = table.rows.remove(rowid) {
                if let Some(log) = undo.as_deref_mut() {
                    log.push(Undo::Deleted {
                        table: table_key.clone(),
                        rowid: *rowid,
                        values,
                    });
                }
            }
        }
        Ok(Outcome::Exec(ExecResult::rows(doomed.len() as u64)))
    }

    fn select(&self, items: &str, table_name: &str, order: Option<&str>) -> Result<Outcome> {
        let table = self.table(table_name)?;
        let mut sources = Vec::new();
        let mut names = Vec::new();
        for item in split_items(items) {
            if item == "*" {
                for (i, c) in table.columns.iter().enumerate() {
                    sources.push(i);
                    names.push(c.clone());
                }
                continue;
            }
            let mut parts = item.split_whitespace();
            let column = ident(parts.next().unwrap_or_default());
            let alias = match (parts.next(), parts.next()) {
                (Some(a), Some(name)) if a.eq_ignore_ascii_case("AS") => ident(name),
                _ => column.clone(),
            };
            sources.push(table.position(&column)?);
            names.push(alias);
        }
        let names: Arc<[String]> = names.into();
        let mut rows: Vec<Vec<Value>> = table
            .rows
            .values()
            .map(|r| sources.iter().map(|&p| r[p].clone()).collect())
            .collect();
        if let Some(order) = order {
            let order = ident(order);
            let pos = names
                .iter()
                .position(|n| *n == order)
                .ok_or_else(|| Error::driver(format!("Unknown column '{order}'")))?;
            rows.sort_by(|a, b| compare(&a[pos], &b[pos]));
        }
        Ok(Outcome::Rows(
            rows.into_iter().map(|v| Row::new(names.clone(), v)).collect(),
        ))
    }

    fn defaults(&self, sql: &str, params: &[Value]) -> Result<Outcome> {
        let mut params = params.iter();
        let mut names: Option<Arc<[String]>> = None;
        let mut rows = Vec::new();
        for part in sql.split(" UNION ") {
            let body = part
                .trim()
                .get(7..)
                .ok_or_else(|| Error::driver_with_sql("malformed default select", sql))?;
            let mut values = Vec::new();
            let mut columns = Vec::new();
            for item in split_items(body) {
                let arg = params.next().cloned().unwrap_or(Value::Null);
                if let Some(c) = DEFAULT_ITEM.captures(item) {
                    values.push(if arg.is_null() { eval_default(&c[1]) } else { arg });
                    columns.push(c[2].to_string());
                } else if let Some(c) = POSITION_ITEM.captures(item) {
                    values.push(Value::Int64(arg.as_i64().unwrap_or_default()));
                    columns.push(c[1].to_string());
                } else {
                    return Err(Error::driver_with_sql("malformed default select", sql));
                }
            }
            let names = names.get_or_insert_with(|| columns.into()).clone();
            rows.push(Row::new(names, values));
        }
        Ok(Outcome::Rows(rows))
    }

    fn load(&mut self, c: &regex::Captures<'_>, undo: &mut Option<&mut Vec<Undo>>) -> Result<Outcome> {
        let reader = &c[1];
        let data = reader_data(reader)
            .ok_or_else(|| Error::driver(format!("LOAD DATA LOCAL INFILE: unknown file '{reader}'")))?;
        let duplicate = match c.get(2).map(|m| m.as_str().to_ascii_uppercase()) {
            Some(m) if m == "REPLACE" => Duplicate::Replace,
            Some(m) if m == "IGNORE" => Duplicate::Ignore,
            _ => Duplicate::Fail,
        };
        let table = c[3].to_string();
        let separator = unescape_literal(&c[4]).unwrap_or('\t');
        let enclosure = c.get(5).and_then(|m| unescape_literal(m.as_str()));
        let escape = unescape_literal(&c[6]).unwrap_or('\\');
        let terminator = unescape_literal(&c[7]).unwrap_or('\n');
        let columns = match c.get(8) {
            Some(m) => list(m.as_str()),
            None => self.table(&table)?.columns.to_vec(),
        };

        let text = String::from_utf8_lossy(&data).into_owned();
        let mut affected = 0;
        for line in split_escaped(&text, terminator, escape) {
            if line.is_empty() {
                continue;
            }
            let values: Vec<Value> = split_escaped(&line, separator, escape)
                .into_iter()
                .map(|field| load_value(&field, enclosure, escape))
                .collect();
            let (n, _, _) = self.insert_row(&table, &columns, &values, duplicate, undo)?;
            affected += n;
        }
        Ok(Outcome::Exec(ExecResult::rows(affected)))
    }
}

/// Split on `delimiter` unless it is preceded by `escape`; escapes are kept
fn split_escaped(text: &str, delimiter: char, escape: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == escape {
            current.push(c);
            if let Some(next) = chars.next() {
                current.push(next);
            }
        } else if c == delimiter {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn load_value(field: &str, enclosure: Option<char>, escape: char) -> Value {
    if field == NULL_MARKER {
        return Value::Null;
    }
    let body = match enclosure {
        Some(q) => field
            .strip_prefix(q)
            .and_then(|f| f.strip_suffix(q))
            .unwrap_or(field),
        None => field,
    };
    let mut text = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c == escape {
            if let Some(next) = chars.next() {
                text.push(next);
            }
        } else {
            text.push(c);
        }
    }
    match text.parse::<i64>() {
        Ok(n) => Value::Int64(n),
        Err(_) => Value::String(text),
    }
}

/// Loose equality across integer widths and text
pub(super) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x == y,
        _ => match (a, b) {
            (Value::Null, _) | (_, Value::Null) => false,
            _ => a.to_string() == b.to_string(),
        },
    }
}

fn compare(a: &Value, b: &Value) -> std::cmp::Ordering {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> State {
        let mut s = State::default();
        s.tables
            .insert("users".into(), Table::new(&["id", "name"], Some("id")));
        s
    }

    #[test]
    fn test_insert_assigns_identities() {
        let mut s = state();
        let out = s
            .run(
                1,
                "INSERT INTO users(id,name) VALUES (?,?),(?,?)",
                &[Value::Int64(0), "a".into(), Value::Null, "b".into()],
                None,
            )
            .unwrap();
        match out {
            Outcome::Exec(r) => {
                assert_eq!(r.rows_affected, 2);
                assert_eq!(r.last_insert_id, Some(2));
            }
            Outcome::Rows(_) => panic!("expected exec result"),
        }
        assert_eq!(s.tables["users"].counter, 3);
    }

    #[test]
    fn test_rollback_keeps_counter() {
        let mut s = state();
        let mut undo = Vec::new();
        s.run(
            1,
            "INSERT INTO users(id,name) VALUES (?,?)",
            &[Value::Int64(10), "x".into()],
            Some(&mut undo),
        )
        .unwrap();
        s.rollback(undo);
        assert!(s.tables["users"].rows.is_empty());
        assert_eq!(s.tables["users"].counter, 11);
    }

    #[test]
    fn test_split_items_respects_parens() {
        assert_eq!(
            split_items("COALESCE(?, 'a,b') AS c, ?+0 AS SQLX_POS"),
            vec!["COALESCE(?, 'a,b') AS c", "?+0 AS SQLX_POS"]
        );
    }

    #[test]
    fn test_bump_aligns_to_progression() {
        let mut t = Table::new(&["id"], Some("id"));
        t.bump(14, 10, 5);
        assert_eq!(t.counter, 15);
        t.bump(15, 10, 5);
        assert_eq!(t.counter, 25);
    }
}
