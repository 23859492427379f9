//! Parser integration tests

use sqlio_parser::ast::{Direction, JoinKind, SelectKind, Source};
use sqlio_parser::{parse, parse_expr, parse_select, parse_update, BinaryOp, Expr, Literal, Statement};

fn canonical(sql: &str) -> String {
    parse(sql).unwrap().to_string()
}

/// Printing then parsing again yields the same tree
fn assert_round_trip(sql: &str) {
    let first = parse(sql).unwrap();
    let printed = first.to_string();
    let second = parse(&printed).unwrap_or_else(|e| panic!("reparse of {printed:?} failed: {e}"));
    assert_eq!(first, second, "round trip of {sql:?}");
}

// ============================================================================
// SELECT
// ============================================================================

#[test]
fn test_select_clauses() {
    let select = parse_select(
        "SELECT DISTINCT u.id, count(*) AS n \
         FROM users u \
         LEFT OUTER JOIN orders o ON o.user_id = u.id \
         WHERE u.active = TRUE \
         GROUP BY u.id \
         HAVING count(*) > 1 \
         ORDER BY n DESC, u.id \
         LIMIT 10 OFFSET 20",
    )
    .unwrap();

    assert_eq!(select.kind, SelectKind::Distinct);
    assert_eq!(select.list.len(), 2);
    assert_eq!(select.list[1].alias.as_ref().unwrap().value, "n");

    let from = select.from.as_ref().unwrap();
    assert!(matches!(&from.source, Source::Table(name) if name.to_string() == "users"));
    assert_eq!(from.alias.as_ref().unwrap().value, "u");

    assert_eq!(select.joins.len(), 1);
    assert_eq!(select.joins[0].kind, JoinKind::Left);
    assert!(select.joins[0].on.is_some());

    assert!(select.qualify.is_some());
    assert_eq!(select.group_by.len(), 1);
    assert!(select.having.is_some());
    assert_eq!(select.order_by[0].direction, Some(Direction::Desc));
    assert_eq!(select.order_by[1].direction, None);
    assert_eq!(select.limit, Some(Expr::Literal(Literal::Int(10))));
    assert_eq!(select.offset, Some(Expr::Literal(Literal::Int(20))));
}

#[test]
fn test_select_joins() {
    let select = parse_select(
        "SELECT * FROM a JOIN b ON a.id = b.id INNER JOIN c ON c.id = b.id \
         RIGHT JOIN d ON d.id = c.id FULL JOIN e ON e.id = d.id CROSS JOIN f",
    )
    .unwrap();
    let kinds: Vec<_> = select.joins.iter().map(|j| j.kind).collect();
    assert_eq!(
        kinds,
        vec![
            JoinKind::Inner,
            JoinKind::Inner,
            JoinKind::Right,
            JoinKind::Full,
            JoinKind::Cross
        ]
    );
    assert!(select.joins[4].on.is_none());

    let err = parse_select("SELECT * FROM a JOIN b").unwrap_err();
    assert!(err.message.contains("'ON'"), "{err}");
}

#[test]
fn test_select_with_union() {
    let select = parse_select(
        "WITH recent AS (SELECT id FROM events WHERE ts > ?) \
         SELECT id FROM recent UNION ALL SELECT id FROM archive",
    )
    .unwrap();
    assert_eq!(select.with.len(), 1);
    assert_eq!(select.with[0].name.value, "recent");
    let union = select.union.as_ref().unwrap();
    assert!(union.all);
    assert!(union.select.union.is_none());
}

#[test]
fn test_select_window_and_derived_table() {
    let select = parse_select(
        "SELECT t.k FROM (SELECT k FROM src) t \
         WINDOW w AS (PARTITION BY k ORDER BY k ASC)",
    )
    .unwrap();
    assert!(matches!(
        select.from.as_ref().unwrap().source,
        Source::Subquery(_)
    ));
    assert_eq!(select.window.len(), 1);
    assert_eq!(select.window[0].partition_by.len(), 1);
    assert_eq!(select.window[0].order_by[0].direction, Some(Direction::Asc));
}

#[test]
fn test_star_forms() {
    let select = parse_select("SELECT * EXCEPT (password, salt), t.* FROM users t").unwrap();
    match &select.list[0].expr {
        Expr::Star { qualifier, except } => {
            assert!(qualifier.is_none());
            let names: Vec<_> = except.iter().map(|i| i.value.as_str()).collect();
            assert_eq!(names, vec!["password", "salt"]);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(
        &select.list[1].expr,
        Expr::Star { qualifier: Some(q), except } if q.to_string() == "t" && except.is_empty()
    ));
}

#[test]
fn test_mysql_limit_form() {
    let select = parse_select("SELECT id FROM t LIMIT 5, 10").unwrap();
    assert_eq!(select.offset, Some(Expr::Literal(Literal::Int(5))));
    assert_eq!(select.limit, Some(Expr::Literal(Literal::Int(10))));
    assert_eq!(select.to_string(), "SELECT id FROM t LIMIT 10 OFFSET 5");
}

// ============================================================================
// UPDATE
// ============================================================================

#[test]
fn test_update() {
    let update = parse_update("UPDATE app.users u SET u.name = ?, visits = visits + 1 WHERE id = ?;").unwrap();
    assert_eq!(update.target.to_string(), "app.users");
    assert_eq!(update.alias.as_ref().unwrap().value, "u");
    assert_eq!(update.set.len(), 2);
    assert_eq!(update.set[0].column.to_string(), "u.name");
    assert!(matches!(
        update.set[1].value,
        Expr::Binary { op: BinaryOp::Add, .. }
    ));
    assert!(update.qualify.is_some());

    assert!(matches!(
        parse("update t set a = 1").unwrap(),
        Statement::Update(_)
    ));
}

// ============================================================================
// Expressions
// ============================================================================

#[test]
fn test_expression_precedence() {
    let expr = parse_expr("a = 1 AND NOT b IS NULL OR c NOT IN (1, 2)").unwrap();
    let Expr::Binary { left, op, right } = expr else {
        panic!("expected binary");
    };
    assert_eq!(op, BinaryOp::Or);
    assert!(matches!(*left, Expr::Binary { op: BinaryOp::And, .. }));
    assert!(matches!(*right, Expr::Binary { op: BinaryOp::NotIn, .. }));
}

#[test]
fn test_case_and_calls() {
    let expr = parse_expr("CASE status WHEN 1 THEN 'on' WHEN 0 THEN 'off' END").unwrap();
    let Expr::Case {
        operand,
        whens,
        otherwise,
    } = expr
    else {
        panic!("expected case");
    };
    assert!(operand.is_some());
    assert_eq!(whens.len(), 2);
    assert!(otherwise.is_none());

    let expr = parse_expr("coalesce(a.x, 'n/a')").unwrap();
    assert!(matches!(expr, Expr::Call { ref args, distinct: false, .. } if args.len() == 2));
}

#[test]
fn test_subquery_operand() {
    let expr = parse_expr("id IN (SELECT user_id FROM orders)").unwrap();
    let Expr::Binary { right, .. } = expr else {
        panic!("expected binary");
    };
    assert!(matches!(*right, Expr::Subquery(_)));
}

#[test]
fn test_quoted_identifiers_keep_quotes() {
    assert_eq!(
        canonical("SELECT `order`, \"from\" FROM `select`"),
        "SELECT `order`, \"from\" FROM `select`"
    );
}

// ============================================================================
// Printing
// ============================================================================

#[test]
fn test_canonical_spacing() {
    assert_eq!(
        canonical("select  a+b*2 as total,max(x)from t where(a<>1)and b<=2 order by 1"),
        "SELECT a + b * 2 AS total, max(x) FROM t WHERE (a != 1) AND b <= 2 ORDER BY 1"
    );
    assert_eq!(
        canonical("UPDATE t SET s='it''s' WHERE x IS NOT NULL"),
        "UPDATE t SET s = 'it''s' WHERE x IS NOT NULL"
    );
}

#[test]
fn test_round_trip() {
    for sql in [
        "SELECT a, b AS c FROM t WHERE a = ? AND b IN (1, 2, 3)",
        "SELECT DISTINCT count(DISTINCT x) FROM t GROUP BY y HAVING count(*) >= 2",
        "SELECT * EXCEPT (a) FROM t1 x LEFT JOIN t2 y ON x.id = y.id ORDER BY x.id DESC LIMIT 1",
        "WITH q AS (SELECT 1 AS one) SELECT one FROM q UNION SELECT 2",
        "SELECT CASE WHEN a > 0 THEN -a ELSE - -a END FROM t",
        "SELECT (a + b) * c, NOT (x OR y), 1.5e3, 'x' FROM t",
        "SELECT id FROM (SELECT id FROM t) s WINDOW w AS (ORDER BY id)",
        "UPDATE db.t SET a = :a, b = NULL WHERE c = FALSE",
    ] {
        assert_round_trip(sql);
    }
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_error_positions() {
    let err = parse("SELECT a FROM t WHERE").unwrap_err();
    assert_eq!(err.message, "expected expression, found end of input");
    assert_eq!((err.line, err.col), (1, 22));

    let err = parse("SELECT a,\n  FROM t").unwrap_err();
    assert_eq!(err.message, "expected expression, found 'FROM'");
    assert_eq!((err.line, err.col, err.position), (2, 3, 12));

    let err = parse("SELECT a FROM t extra junk").unwrap_err();
    assert!(err.message.starts_with("expected end of input"), "{err}");
    assert_eq!(err.to_string(), format!("{} at line 1, column 23", err.message));
}

#[test]
fn test_unsupported_statement() {
    let err = parse("DELETE FROM t").unwrap_err();
    assert_eq!(err.message, "expected SELECT or UPDATE, found 'DELETE'");
    assert_eq!((err.line, err.col), (1, 1));
}
