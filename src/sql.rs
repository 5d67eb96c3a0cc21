use chrono::NaiveDate;
use sqlparser::ast::{self, Expr, FromTable, ObjectNamePart, SelectItem, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertUnit {
        id: UnitId,
        owner_id: String,
    },
    DeleteUnit {
        id: UnitId,
    },
    SelectUnits,
    InsertRequester {
        id: RequesterId,
    },
    InsertReservation {
        request: ReservationRequest,
    },
    DeleteReservation {
        id: Ulid,
    },
    SelectReservations {
        filter: ReservationFilter,
    },
    SelectAvailability {
        unit_id: UnitId,
        start: NaiveDate,
        end: NaiveDate,
    },
    SelectAvailableUnits {
        start: NaiveDate,
        end: NaiveDate,
    },
    SelectConflicts {
        unit_id: UnitId,
        start: NaiveDate,
        end: NaiveDate,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReservationFilter {
    All,
    Id(Ulid),
    Unit(UnitId),
    UnitAndRequester(UnitId, RequesterId),
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let Some(first) = stmts.first() else {
        return Err(SqlError::Empty);
    };

    match first {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

const UNIT_COLUMNS: &[&str] = &["id", "owner_id"];
const REQUESTER_COLUMNS: &[&str] = &["id"];
const RESERVATION_COLUMNS: &[&str] = &["id", "unit_id", "requester_id", "start_date", "end_date"];

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;

    match table.as_str() {
        "units" => {
            let row = insert_row(insert, values, "units", UNIT_COLUMNS)?;
            Ok(Command::InsertUnit {
                id: parse_text(row[0])?,
                owner_id: parse_text(row[1])?,
            })
        }
        "requesters" => {
            let row = insert_row(insert, values, "requesters", REQUESTER_COLUMNS)?;
            Ok(Command::InsertRequester {
                id: parse_text(row[0])?,
            })
        }
        "reservations" => {
            let row = insert_row(insert, values, "reservations", RESERVATION_COLUMNS)?;
            Ok(Command::InsertReservation {
                request: ReservationRequest {
                    id: parse_ulid(row[0])?,
                    unit_id: parse_text(row[1])?,
                    requester_id: parse_text(row[2])?,
                    start: parse_date(row[3])?,
                    end: parse_date(row[4])?,
                },
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// VALUES in `columns` order. Without a column list the values are positional;
/// either way every column must be given exactly once.
fn insert_row<'a>(
    insert: &ast::Insert,
    values: &'a [Expr],
    table: &'static str,
    columns: &[&str],
) -> Result<Vec<&'a Expr>, SqlError> {
    if values.len() != columns.len() {
        return Err(SqlError::WrongArity(table, columns.len(), values.len()));
    }
    if insert.columns.is_empty() {
        return Ok(values.iter().collect());
    }
    if insert.columns.len() != values.len() {
        return Err(SqlError::Parse(format!(
            "{table}: {} columns but {} values",
            insert.columns.len(),
            values.len()
        )));
    }

    let named: Vec<String> = insert.columns.iter().map(|c| c.value.to_lowercase()).collect();
    let mut row = Vec::with_capacity(columns.len());
    for column in columns {
        let mut positions = named.iter().enumerate().filter(|(_, n)| n == column);
        match (positions.next(), positions.next()) {
            (Some((pos, _)), None) => row.push(&values[pos]),
            (None, _) => return Err(SqlError::Parse(format!("{table}: missing column {column}"))),
            (Some(_), Some(_)) => {
                return Err(SqlError::Parse(format!("{table}: column {column} given twice")));
            }
        }
    }
    // Same length, every expected column found once: nothing unknown remains.
    Ok(row)
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let filters = Filters::collect(delete.selection.as_ref())?;

    filters.only(&["id"])?;
    match table.as_str() {
        "units" => Ok(Command::DeleteUnit {
            id: filters.id.ok_or(SqlError::MissingFilter("id"))?,
        }),
        "reservations" => {
            let id = filters.id.ok_or(SqlError::MissingFilter("id"))?;
            Ok(Command::DeleteReservation { id: ulid_from_str(&id)? })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };
    if !select
        .projection
        .iter()
        .all(|item| matches!(item, SelectItem::Wildcard(_)))
    {
        return Err(SqlError::Unsupported("only SELECT * is supported".into()));
    }

    let Some(from) = select.from.first() else {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    };
    let table = table_factor_name(&from.relation)?;
    let filters = Filters::collect(select.selection.as_ref())?;

    match table.as_str() {
        "units" => {
            filters.only(&[])?;
            Ok(Command::SelectUnits)
        }
        "reservations" => {
            filters.only(&["id", "unit_id", "requester_id"])?;
            let filter = match (filters.id, filters.unit_id, filters.requester_id) {
                (Some(id), None, None) => ReservationFilter::Id(ulid_from_str(&id)?),
                (None, Some(unit), Some(requester)) => {
                    ReservationFilter::UnitAndRequester(unit, requester)
                }
                (None, Some(unit), None) => ReservationFilter::Unit(unit),
                (None, None, None) => ReservationFilter::All,
                (None, None, Some(_)) => return Err(SqlError::MissingFilter("unit_id")),
                _ => {
                    return Err(SqlError::Unsupported(
                        "filter reservations by id or by unit_id, not both".into(),
                    ));
                }
            };
            Ok(Command::SelectReservations { filter })
        }
        "availability" | "conflicts" => {
            filters.only(&["unit_id", "start_date", "end_date"])?;
            let unit_id = filters.unit_id.ok_or(SqlError::MissingFilter("unit_id"))?;
            let start = filters.start_date.ok_or(SqlError::MissingFilter("start_date"))?;
            let end = filters.end_date.ok_or(SqlError::MissingFilter("end_date"))?;
            Ok(if table == "availability" {
                Command::SelectAvailability { unit_id, start, end }
            } else {
                Command::SelectConflicts { unit_id, start, end }
            })
        }
        "available_units" => {
            filters.only(&["start_date", "end_date"])?;
            Ok(Command::SelectAvailableUnits {
                start: filters.start_date.ok_or(SqlError::MissingFilter("start_date"))?,
                end: filters.end_date.ok_or(SqlError::MissingFilter("end_date"))?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Column filters of a WHERE clause made of `AND`ed comparisons.
#[derive(Debug, Default)]
struct Filters {
    id: Option<String>,
    unit_id: Option<UnitId>,
    requester_id: Option<RequesterId>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

impl Filters {
    fn collect(selection: Option<&Expr>) -> Result<Self, SqlError> {
        let mut filters = Filters::default();
        if let Some(expr) = selection {
            filters.visit(expr)?;
        }
        Ok(filters)
    }

    /// Reject any filter the target table does not consume.
    fn only(&self, allowed: &[&str]) -> Result<(), SqlError> {
        let present = [
            ("id", self.id.is_some()),
            ("unit_id", self.unit_id.is_some()),
            ("requester_id", self.requester_id.is_some()),
            ("start_date", self.start_date.is_some()),
            ("end_date", self.end_date.is_some()),
        ];
        match present
            .iter()
            .find(|(name, set)| *set && !allowed.contains(name))
        {
            Some((name, _)) => Err(SqlError::Unsupported(format!("filter on {name}"))),
            None => Ok(()),
        }
    }

    fn visit(&mut self, expr: &Expr) -> Result<(), SqlError> {
        let (left, op, right) = match expr {
            Expr::Nested(inner) => return self.visit(inner),
            Expr::BinaryOp { left, op, right } => (left, op, right),
            other => return Err(SqlError::Unsupported(format!("WHERE {other}"))),
        };
        if *op == ast::BinaryOperator::And {
            self.visit(left)?;
            return self.visit(right);
        }

        let col = expr_column_name(left)
            .ok_or_else(|| SqlError::Unsupported(format!("WHERE {expr}")))?;
        match (col.as_str(), op) {
            ("id", ast::BinaryOperator::Eq) => self.id = Some(parse_text(right)?),
            ("unit_id", ast::BinaryOperator::Eq) => self.unit_id = Some(parse_text(right)?),
            ("requester_id", ast::BinaryOperator::Eq) => {
                self.requester_id = Some(parse_text(right)?)
            }
            ("start_date", ast::BinaryOperator::Eq | ast::BinaryOperator::GtEq) => {
                self.start_date = Some(parse_date(right)?)
            }
            ("end_date", ast::BinaryOperator::Eq | ast::BinaryOperator::LtEq) => {
                self.end_date = Some(parse_date(right)?)
            }
            _ => return Err(SqlError::Unsupported(format!("WHERE {expr}"))),
        }
        Ok(())
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    match tables.first() {
        Some(first) => table_factor_name(&first.relation),
        None => Err(SqlError::Parse("DELETE without table".into())),
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

/// The single VALUES row of an INSERT.
fn extract_insert_values(insert: &ast::Insert) -> Result<&[Expr], SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        // '2025-01-01'::date and (x)
        Expr::Cast { expr, .. } | Expr::Nested(expr) => extract_value(expr),
        _ => None,
    }
}

/// A string or bare number literal as text.
fn parse_text(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s) | Value::Number(s, _)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    ulid_from_str(&parse_text(expr)?)
}

fn ulid_from_str(s: &str) -> Result<Ulid, SqlError> {
    Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID {s:?}: {e}")))
}

fn parse_date(expr: &Expr) -> Result<NaiveDate, SqlError> {
    let text = match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => s,
        Some(value) => return Err(SqlError::Parse(format!("expected 'YYYY-MM-DD', got {value}"))),
        None => return Err(SqlError::Parse(format!("expected date, got {expr}"))),
    };
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|e| SqlError::Parse(format!("bad date {text:?}: {e}")))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}
