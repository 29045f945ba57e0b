//! The filter whitelist.
//!
//! A plan may only ask for filters by name. Each name maps to a fixed
//! argument signature and a builder that returns a typed [`Predicate`]; values
//! always travel as bound parameters. The table is built once per process
//! and is never extended from plan input.

use crate::core::error::PlanGateError;
use crate::core::store::TaskStatus;
use crate::core::time;
use crate::engine::specification::{DateField, FilterArg};
use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rustc_hash::FxHashMap;
use serde_json::Value as JsonValue;
use std::sync::LazyLock;

/// Columns a predicate may reference. Rendering goes through
/// [`Column::sql`], so no other identifier can reach the query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Priority,
    Status,
    Category,
    ScheduledTime,
    CreatedAt,
}

impl Column {
    pub fn sql(self) -> &'static str {
        match self {
            Column::Priority => "priority",
            Column::Status => "status",
            Column::Category => "category",
            Column::ScheduledTime => "scheduled_time",
            Column::CreatedAt => "created_at",
        }
    }
}

impl From<DateField> for Column {
    fn from(field: DateField) -> Self {
        match field {
            DateField::ScheduledTime => Column::ScheduledTime,
            DateField::CreatedAt => Column::CreatedAt,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// A safe predicate fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        column: Column,
        op: CompareOp,
        value: SqlValue,
    },
    /// Case-insensitive equality.
    EqualsFolded { column: Column, value: String },
    /// Every term must occur in the record's searchable text.
    TextSearch { terms: Vec<String> },
    All(Vec<Predicate>),
}

impl Predicate {
    fn compare(column: Column, op: CompareOp, value: SqlValue) -> Self {
        Predicate::Compare { column, op, value }
    }

    fn at(column: Column, op: CompareOp, ts: DateTime<Utc>) -> Self {
        Predicate::compare(column, op, SqlValue::Text(time::to_storage(ts)))
    }
}

/// Inputs a builder may read besides its argument.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext {
    pub now: DateTime<Utc>,
}

/// Argument signature of a registered filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    None,
    Priority,
    Status,
    Text,
    DateTime,
    DateRange,
}

impl ArgKind {
    pub fn describe(self) -> &'static str {
        match self {
            ArgKind::None => "no value",
            ArgKind::Priority => "integer 0-3",
            ArgKind::Status => "pending | in_progress | completed",
            ArgKind::Text => "non-empty text",
            ArgKind::DateTime => "ISO-8601 datetime",
            ArgKind::DateRange => "{from?, to?, field?}",
        }
    }

    /// Type-checks a raw plan value against this signature.
    pub fn parse(self, filter: &str, raw: Option<&JsonValue>) -> Result<FilterArg, PlanGateError> {
        let raw = raw.filter(|v| !v.is_null());
        let mismatch = || {
            PlanGateError::ValidationError(format!(
                "filter '{filter}' expects {}",
                self.describe()
            ))
        };
        match self {
            ArgKind::None => match raw {
                None => Ok(FilterArg::None),
                // Planners sometimes send `true` for flag filters.
                Some(JsonValue::Bool(true)) => Ok(FilterArg::None),
                Some(_) => Err(mismatch()),
            },
            ArgKind::Priority => {
                let n = raw.and_then(JsonValue::as_i64).ok_or_else(mismatch)?;
                if !(0..=3).contains(&n) {
                    return Err(mismatch());
                }
                Ok(FilterArg::Priority(n))
            }
            ArgKind::Status => raw
                .and_then(JsonValue::as_str)
                .and_then(TaskStatus::parse)
                .map(FilterArg::Status)
                .ok_or_else(mismatch),
            ArgKind::Text => {
                let s = raw.and_then(JsonValue::as_str).map(str::trim).unwrap_or("");
                if s.is_empty() {
                    return Err(mismatch());
                }
                Ok(FilterArg::Text(s.to_string()))
            }
            ArgKind::DateTime => raw
                .and_then(JsonValue::as_str)
                .and_then(time::parse_datetime)
                .map(FilterArg::DateTime)
                .ok_or_else(mismatch),
            ArgKind::DateRange => {
                let obj = raw.and_then(JsonValue::as_object).ok_or_else(mismatch)?;
                if obj.keys().any(|k| !matches!(k.as_str(), "from" | "to" | "field")) {
                    return Err(mismatch());
                }
                let bound = |key: &str| -> Result<Option<DateTime<Utc>>, PlanGateError> {
                    match obj.get(key) {
                        None | Some(JsonValue::Null) => Ok(None),
                        Some(v) => v
                            .as_str()
                            .and_then(time::parse_datetime)
                            .map(Some)
                            .ok_or_else(mismatch),
                    }
                };
                let from = bound("from")?;
                let to = bound("to")?;
                let field = match obj.get("field").and_then(JsonValue::as_str) {
                    None | Some("scheduled_time") => DateField::ScheduledTime,
                    Some("created_at") => DateField::CreatedAt,
                    Some(_) => return Err(mismatch()),
                };
                match (from, to) {
                    (None, None) => Err(mismatch()),
                    (Some(f), Some(t)) if f > t => Err(PlanGateError::ValidationError(format!(
                        "filter '{filter}' has from after to"
                    ))),
                    _ => Ok(FilterArg::DateRange { from, to, field }),
                }
            }
        }
    }
}

type BuildFn = fn(&FilterArg, &FilterContext) -> Option<Predicate>;

pub struct FilterEntry {
    pub name: &'static str,
    pub arg: ArgKind,
    pub description: &'static str,
    build: BuildFn,
}

pub struct FilterRegistry {
    entries: FxHashMap<&'static str, FilterEntry>,
}

static REGISTRY: LazyLock<FilterRegistry> = LazyLock::new(FilterRegistry::builtin);

impl FilterRegistry {
    /// The process-wide registry.
    pub fn global() -> &'static FilterRegistry {
        &REGISTRY
    }

    fn builtin() -> Self {
        let table: [FilterEntry; 15] = [
            FilterEntry {
                name: "is_overdue",
                arg: ArgKind::None,
                description: "scheduled in the past and not completed",
                build: |_, ctx| {
                    Some(Predicate::All(vec![
                        Predicate::at(Column::ScheduledTime, CompareOp::Lt, ctx.now),
                        Predicate::compare(
                            Column::Status,
                            CompareOp::Ne,
                            SqlValue::Text(TaskStatus::Completed.as_str().to_string()),
                        ),
                    ]))
                },
            },
            FilterEntry {
                name: "is_today",
                arg: ArgKind::None,
                description: "scheduled today (UTC)",
                build: |_, ctx| {
                    let (start, end) = time::day_bounds(ctx.now);
                    Some(window(Column::ScheduledTime, start, end))
                },
            },
            FilterEntry {
                name: "is_this_week",
                arg: ArgKind::None,
                description: "scheduled this Monday-to-Sunday week (UTC)",
                build: |_, ctx| {
                    let (start, end) = time::week_bounds(ctx.now);
                    Some(window(Column::ScheduledTime, start, end))
                },
            },
            FilterEntry {
                name: "is_completed",
                arg: ArgKind::None,
                description: "status is completed",
                build: |_, _| {
                    Some(Predicate::compare(
                        Column::Status,
                        CompareOp::Eq,
                        SqlValue::Text(TaskStatus::Completed.as_str().to_string()),
                    ))
                },
            },
            FilterEntry {
                name: "status_eq",
                arg: ArgKind::Status,
                description: "status equals the value",
                build: |arg, _| match arg {
                    FilterArg::Status(s) => Some(Predicate::compare(
                        Column::Status,
                        CompareOp::Eq,
                        SqlValue::Text(s.as_str().to_string()),
                    )),
                    _ => None,
                },
            },
            FilterEntry {
                name: "priority_min",
                arg: ArgKind::Priority,
                description: "priority at least the value",
                build: |arg, _| priority(arg, CompareOp::Ge),
            },
            FilterEntry {
                name: "priority_max",
                arg: ArgKind::Priority,
                description: "priority at most the value",
                build: |arg, _| priority(arg, CompareOp::Le),
            },
            FilterEntry {
                name: "priority_eq",
                arg: ArgKind::Priority,
                description: "priority equals the value",
                build: |arg, _| priority(arg, CompareOp::Eq),
            },
            FilterEntry {
                name: "category_eq",
                arg: ArgKind::Text,
                description: "category equals the value, ignoring case",
                build: |arg, _| match arg {
                    FilterArg::Text(s) => Some(Predicate::EqualsFolded {
                        column: Column::Category,
                        value: s.clone(),
                    }),
                    _ => None,
                },
            },
            FilterEntry {
                name: "keyword",
                arg: ArgKind::Text,
                description: "all words appear in title, description or category",
                build: |arg, _| match arg {
                    FilterArg::Text(s) => Some(Predicate::TextSearch {
                        terms: s.split_whitespace().map(str::to_lowercase).collect(),
                    }),
                    _ => None,
                },
            },
            FilterEntry {
                name: "date_range",
                arg: ArgKind::DateRange,
                description: "timestamp within [from, to], inclusive",
                build: |arg, _| match arg {
                    FilterArg::DateRange { from, to, field } => {
                        let column = Column::from(*field);
                        let mut parts = Vec::new();
                        if let Some(from) = from {
                            parts.push(Predicate::at(column, CompareOp::Ge, *from));
                        }
                        if let Some(to) = to {
                            parts.push(Predicate::at(column, CompareOp::Le, *to));
                        }
                        Some(Predicate::All(parts))
                    }
                    _ => None,
                },
            },
            FilterEntry {
                name: "scheduled_after",
                arg: ArgKind::DateTime,
                description: "scheduled at or after the value",
                build: |arg, _| instant(arg, Column::ScheduledTime, CompareOp::Ge),
            },
            FilterEntry {
                name: "scheduled_before",
                arg: ArgKind::DateTime,
                description: "scheduled at or before the value",
                build: |arg, _| instant(arg, Column::ScheduledTime, CompareOp::Le),
            },
            FilterEntry {
                name: "created_after",
                arg: ArgKind::DateTime,
                description: "created at or after the value",
                build: |arg, _| instant(arg, Column::CreatedAt, CompareOp::Ge),
            },
            FilterEntry {
                name: "created_before",
                arg: ArgKind::DateTime,
                description: "created at or before the value",
                build: |arg, _| instant(arg, Column::CreatedAt, CompareOp::Le),
            },
        ];
        let entries = table.into_iter().map(|entry| (entry.name, entry)).collect();
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&FilterEntry> {
        self.entries.get(name)
    }

    /// Registered entries sorted by name.
    pub fn entries(&self) -> Vec<&FilterEntry> {
        let mut out: Vec<&FilterEntry> = self.entries.values().collect();
        out.sort_by_key(|e| e.name);
        out
    }

    /// Builds the predicate for one validated filter.
    pub fn predicate(
        &self,
        name: &str,
        arg: &FilterArg,
        ctx: &FilterContext,
    ) -> Result<Predicate, PlanGateError> {
        let entry = self.get(name).ok_or_else(|| {
            PlanGateError::InvalidSpecification(format!("filter '{name}' is not registered"))
        })?;
        (entry.build)(arg, ctx).ok_or_else(|| {
            PlanGateError::ValidationError(format!(
                "filter '{name}' expects {}",
                entry.arg.describe()
            ))
        })
    }
}

fn window(column: Column, start: DateTime<Utc>, end: DateTime<Utc>) -> Predicate {
    Predicate::All(vec![
        Predicate::at(column, CompareOp::Ge, start),
        Predicate::at(column, CompareOp::Lt, end),
    ])
}

fn priority(arg: &FilterArg, op: CompareOp) -> Option<Predicate> {
    match arg {
        FilterArg::Priority(n) => Some(Predicate::compare(Column::Priority, op, SqlValue::Integer(*n))),
        _ => None,
    }
}

fn instant(arg: &FilterArg, column: Column, op: CompareOp) -> Option<Predicate> {
    match arg {
        FilterArg::DateTime(ts) => Some(Predicate::at(column, op, *ts)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> FilterContext {
        FilterContext {
            now: time::parse_datetime("2026-10-16T12:00:00Z").unwrap(),
        }
    }

    #[test]
    fn registry_holds_the_canonical_entries() {
        let reg = FilterRegistry::global();
        for name in [
            "is_overdue",
            "is_today",
            "is_this_week",
            "status_eq",
            "priority_min",
            "priority_max",
            "category_eq",
            "keyword",
            "date_range",
        ] {
            assert!(reg.get(name).is_some(), "missing {name}");
        }
        assert!(reg.get("raw_sql").is_none());
        assert_eq!(reg.entries().len(), 15);
    }

    #[test]
    fn priority_signature_rejects_out_of_range_and_wrong_type() {
        assert!(ArgKind::Priority.parse("priority_min", Some(&json!(4))).is_err());
        assert!(ArgKind::Priority.parse("priority_min", Some(&json!("high"))).is_err());
        assert_eq!(
            ArgKind::Priority.parse("priority_min", Some(&json!(2))).unwrap(),
            FilterArg::Priority(2)
        );
    }

    #[test]
    fn flag_filters_reject_values() {
        assert!(ArgKind::None.parse("is_today", Some(&json!("yes"))).is_err());
        assert_eq!(ArgKind::None.parse("is_today", None).unwrap(), FilterArg::None);
    }

    #[test]
    fn date_range_requires_ordered_bounds() {
        let bad = json!({"from": "2026-10-20", "to": "2026-10-01"});
        assert!(ArgKind::DateRange.parse("date_range", Some(&bad)).is_err());
        assert!(ArgKind::DateRange.parse("date_range", Some(&json!({}))).is_err());
        let ok = json!({"from": "2026-10-01", "field": "created_at"});
        assert!(matches!(
            ArgKind::DateRange.parse("date_range", Some(&ok)).unwrap(),
            FilterArg::DateRange { field: DateField::CreatedAt, to: None, .. }
        ));
    }

    #[test]
    fn overdue_binds_now_as_parameter() {
        let pred = FilterRegistry::global()
            .predicate("is_overdue", &FilterArg::None, &ctx())
            .unwrap();
        let Predicate::All(parts) = pred else {
            panic!("expected conjunction");
        };
        assert_eq!(
            parts[0],
            Predicate::Compare {
                column: Column::ScheduledTime,
                op: CompareOp::Lt,
                value: SqlValue::Text("2026-10-16T12:00:00.000Z".to_string()),
            }
        );
    }

    #[test]
    fn keyword_splits_into_lowercase_terms() {
        let pred = FilterRegistry::global()
            .predicate("keyword", &FilterArg::Text("Reading  Paper".into()), &ctx())
            .unwrap();
        assert_eq!(
            pred,
            Predicate::TextSearch {
                terms: vec!["reading".into(), "paper".into()]
            }
        );
    }

    #[test]
    fn mismatched_arg_is_a_validation_error() {
        let err = FilterRegistry::global()
            .predicate("priority_min", &FilterArg::Text("x".into()), &ctx())
            .unwrap_err();
        assert_eq!(err.kind(), crate::core::error::ErrorKind::ValidationError);
    }
}
