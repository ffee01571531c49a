// crates/nysm-store/src/sql_interp.rs
// ============================================================================
// Module: In-Memory SQL Interpreter
// Description: Executes the bounded SQL fragment `nysm_query::sql::compile`
//              emits, against in-memory concept state tables.
// Purpose: Let `InMemoryEventStore` honor the `query` contract (spec §4.F)
//          without a real relational engine underneath it.
// Dependencies: crate::{contract, error}, nysm-ir
// ============================================================================

//! ## Overview
//! This interpreter is deliberately not a general SQL engine: it recognizes
//! only the shapes [`crate::contract`]'s caller (the SQL lowering pass in
//! `nysm-query`) can produce — `SELECT proj FROM src [WHERE expr]` and
//! `SELECT * FROM (body) INNER JOIN (body) ON expr`, always terminated by
//! `ORDER BY id ASC COLLATE BINARY`. Feeding it hand-written SQL outside
//! that fragment returns [`StoreError::Query`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;
use std::collections::BTreeMap;

use nysm_ir::Value;

use crate::contract::Row;
use crate::error::StoreError;

// ============================================================================
// SECTION: AST
// ============================================================================

enum Expr {
    True,
    Eq(String),
    And(Vec<Expr>),
}

enum Proj {
    Star,
    Cols(Vec<(String, String)>),
}

enum Body {
    Select {
        proj: Proj,
        from: String,
        filter: Option<Expr>,
    },
    Join {
        left: Box<Body>,
        right: Box<Body>,
        on: Expr,
    },
}

// ============================================================================
// SECTION: Execution
// ============================================================================

/// Executes `sql` against `tables`, consuming `params` left to right for
/// each `?` placeholder encountered, depth-first.
pub fn execute(tables: &BTreeMap<String, Vec<Row>>, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError> {
    let trimmed = sql
        .strip_suffix(" ORDER BY id ASC COLLATE BINARY")
        .ok_or_else(|| StoreError::Query("query is missing the mandatory ORDER BY clause".to_string()))?;
    let (body, rest) = parse_body(trimmed)?;
    if !rest.is_empty() {
        return Err(StoreError::Query(format!("unexpected trailing SQL: {rest}")));
    }
    let mut cursor = 0usize;
    let mut rows = eval_body(tables, &body, params, &mut cursor)?;
    if cursor != params.len() {
        return Err(StoreError::Query("parameter count did not match placeholder count".to_string()));
    }
    rows.sort_by(|a, b| compare_rows_by_id(a, b));
    Ok(rows)
}

fn eval_body(tables: &BTreeMap<String, Vec<Row>>, body: &Body, params: &[Value], cursor: &mut usize) -> Result<Vec<Row>, StoreError> {
    match body {
        Body::Select {
            proj,
            from,
            filter,
        } => {
            let source = tables.get(from).cloned().unwrap_or_default();
            let mut out = Vec::new();
            for row in source {
                if eval_filter(filter, &row, params, cursor)? {
                    out.push(project(proj, &row));
                }
            }
            Ok(out)
        }
        Body::Join {
            left,
            right,
            on,
        } => {
            let left_rows = eval_body(tables, left, params, cursor)?;
            let right_rows = eval_body(tables, right, params, cursor)?;
            let mut out = Vec::new();
            for l in &left_rows {
                for r in &right_rows {
                    let mut merged = l.clone();
                    for (k, v) in r {
                        merged.insert(k.clone(), v.clone());
                    }
                    if eval_expr(on, &merged, params, cursor)? {
                        out.push(merged);
                    }
                }
            }
            Ok(out)
        }
    }
}

fn eval_filter(filter: &Option<Expr>, row: &Row, params: &[Value], cursor: &mut usize) -> Result<bool, StoreError> {
    match filter {
        None => Ok(true),
        Some(expr) => eval_expr(expr, row, params, cursor),
    }
}

fn eval_expr(expr: &Expr, row: &Row, params: &[Value], cursor: &mut usize) -> Result<bool, StoreError> {
    match expr {
        Expr::True => Ok(true),
        Expr::Eq(field) => {
            let value = params
                .get(*cursor)
                .ok_or_else(|| StoreError::Query("ran out of parameters while evaluating predicate".to_string()))?;
            *cursor += 1;
            Ok(row.get(field) == Some(value))
        }
        Expr::And(items) => {
            let mut all_true = true;
            for item in items {
                // Every placeholder is consumed in declaration order even
                // after a short-circuit, to keep `cursor` aligned with the
                // caller's flat `params` slice.
                if !eval_expr(item, row, params, cursor)? {
                    all_true = false;
                }
            }
            Ok(all_true)
        }
    }
}

fn project(proj: &Proj, row: &Row) -> Row {
    match proj {
        Proj::Star => row.clone(),
        Proj::Cols(cols) => {
            let mut out = Row::new();
            for (src, var) in cols {
                if let Some(value) = row.get(src) {
                    out.insert(var.clone(), value.clone());
                }
            }
            out
        }
    }
}

fn compare_rows_by_id(a: &Row, b: &Row) -> Ordering {
    match (a.get("id"), b.get("id")) {
        (Some(x), Some(y)) => compare_values_binary(x, y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare_values_binary(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => x.as_bytes().cmp(y.as_bytes()),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

fn parse_body(s: &str) -> Result<(Body, &str), StoreError> {
    let rest = expect_prefix(s, "SELECT ")?;
    if let Some(rest) = rest.strip_prefix("* FROM (") {
        let (left, rest) = parse_body(rest)?;
        let rest = expect_prefix(rest, ") INNER JOIN (")?;
        let (right, rest) = parse_body(rest)?;
        let rest = expect_prefix(rest, ") ON ")?;
        let (on, rest) = parse_expr(rest)?;
        return Ok((
            Body::Join {
                left: Box::new(left),
                right: Box::new(right),
                on,
            },
            rest,
        ));
    }

    let (proj, rest) = parse_proj(rest)?;
    let rest = expect_prefix(rest, " FROM ")?;
    let (from, rest) = parse_ident(rest)?;

    if let Some(rest) = rest.strip_prefix(" WHERE ") {
        let (filter, rest) = parse_expr(rest)?;
        Ok((
            Body::Select {
                proj,
                from,
                filter: Some(filter),
            },
            rest,
        ))
    } else {
        Ok((
            Body::Select {
                proj,
                from,
                filter: None,
            },
            rest,
        ))
    }
}

fn parse_proj(s: &str) -> Result<(Proj, &str), StoreError> {
    if let Some(rest) = s.strip_prefix('*') {
        return Ok((Proj::Star, rest));
    }
    let boundary = s.find(" FROM ").ok_or_else(|| StoreError::Query("missing FROM clause".to_string()))?;
    let (proj_text, rest) = s.split_at(boundary);
    let mut cols = Vec::new();
    for part in proj_text.split(", ") {
        if let Some((src, var)) = part.split_once(" AS ") {
            cols.push((src.to_string(), var.to_string()));
        } else {
            cols.push((part.to_string(), part.to_string()));
        }
    }
    Ok((Proj::Cols(cols), rest))
}

fn parse_ident(s: &str) -> Result<(String, &str), StoreError> {
    let end = s
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(s.len());
    if end == 0 {
        return Err(StoreError::Query(format!("expected identifier at: {s}")));
    }
    Ok((s[..end].to_string(), &s[end..]))
}

fn parse_expr(s: &str) -> Result<(Expr, &str), StoreError> {
    let (first, mut rest) = parse_term(s)?;
    let mut terms = vec![first];
    while let Some(after) = rest.strip_prefix(" AND ") {
        let (next, after) = parse_term(after)?;
        terms.push(next);
        rest = after;
    }
    if terms.len() == 1 {
        Ok((terms.into_iter().next().unwrap_or(Expr::True), rest))
    } else {
        Ok((Expr::And(terms), rest))
    }
}

fn parse_term(s: &str) -> Result<(Expr, &str), StoreError> {
    if let Some(rest) = s.strip_prefix('(') {
        let (inner, rest) = parse_expr(rest)?;
        let rest = expect_prefix(rest, ")")?;
        return Ok((inner, rest));
    }
    if let Some(rest) = s.strip_prefix("1 = 1") {
        return Ok((Expr::True, rest));
    }
    let (field, rest) = parse_ident(s)?;
    let rest = expect_prefix(rest, " = ?")?;
    Ok((Expr::Eq(field), rest))
}

fn expect_prefix<'a>(s: &'a str, prefix: &str) -> Result<&'a str, StoreError> {
    s.strip_prefix(prefix)
        .ok_or_else(|| StoreError::Query(format!("expected '{prefix}' at: {s}")))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: Vec<(&str, i64)>) -> Vec<Row> {
        rows.into_iter()
            .map(|(id, qty)| {
                let mut row = Row::new();
                row.insert("id".to_string(), Value::String(id.to_string()));
                row.insert("quantity".to_string(), Value::Int(qty));
                row
            })
            .collect()
    }

    #[test]
    fn select_with_equals_filter() {
        let mut tables = BTreeMap::new();
        tables.insert("inventory".to_string(), table(vec![("widget", 7), ("gadget", 2)]));
        let sql = "SELECT id, quantity FROM inventory WHERE id = ? ORDER BY id ASC COLLATE BINARY";
        let rows = execute(&tables, sql, &[Value::String("widget".to_string())]).expect("executes");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("quantity"), Some(&Value::Int(7)));
    }

    #[test]
    fn select_star_with_no_filter_returns_all_rows_sorted() {
        let mut tables = BTreeMap::new();
        tables.insert("inventory".to_string(), table(vec![("gadget", 2), ("widget", 7)]));
        let sql = "SELECT * FROM inventory ORDER BY id ASC COLLATE BINARY";
        let rows = execute(&tables, sql, &[]).expect("executes");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("id"), Some(&Value::String("gadget".to_string())));
    }

    #[test]
    fn missing_order_by_is_rejected() {
        let tables = BTreeMap::new();
        let err = execute(&tables, "SELECT * FROM inventory", &[]).unwrap_err();
        assert!(matches!(err, StoreError::Query(_)));
    }
}
