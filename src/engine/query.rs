//! Safe query composition.
//!
//! The only place SQL text for task selects is assembled. Identifiers come
//! from closed enums; every value is a numbered bound parameter. The user
//! scope is always `?1` and always the first conjunct.

use crate::core::error::PlanGateError;
use crate::core::schemas;
use crate::core::store::{self, UserScope};
use crate::engine::filters::{FilterContext, FilterRegistry, Predicate};
use crate::engine::specification::Filter;
use rusqlite::types::Value;

pub const CANONICAL_ORDER: &str =
    "priority DESC, scheduled_time IS NULL, scheduled_time ASC, created_at DESC, rowid DESC";

/// A fully composed select. Only `QueryBuilder` can construct one, so a
/// store never receives SQL that skipped scoping.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterizedQuery {
    sql: String,
    params: Vec<Value>,
}

impl ParameterizedQuery {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

#[derive(Default)]
struct SqlParts {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl SqlParts {
    fn bind(&mut self, value: Value) -> String {
        self.params.push(value);
        format!("?{}", self.params.len())
    }

    fn render(&mut self, pred: &Predicate) -> Option<String> {
        match pred {
            Predicate::Compare { column, op, value } => {
                let slot = self.bind(value.clone());
                Some(format!("{} {} {}", column.sql(), op.sql(), slot))
            }
            Predicate::EqualsFolded { column, value } => {
                let slot = self.bind(Value::Text(value.clone()));
                Some(format!("{} = {} COLLATE NOCASE", column.sql(), slot))
            }
            Predicate::TextSearch { terms } => {
                let parts: Vec<String> = terms
                    .iter()
                    .map(|term| {
                        let slot = self.bind(Value::Text(like_pattern(term)));
                        format!("search_text LIKE {slot} ESCAPE '\\'")
                    })
                    .collect();
                join_and(parts)
            }
            Predicate::All(preds) => {
                let parts: Vec<String> = preds.iter().filter_map(|p| self.render(p)).collect();
                join_and(parts)
            }
        }
    }
}

fn join_and(parts: Vec<String>) -> Option<String> {
    match parts.len() {
        0 => None,
        1 => parts.into_iter().next(),
        _ => Some(format!("({})", parts.join(" AND "))),
    }
}

/// `%term%` with LIKE wildcards in the term escaped.
pub fn like_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for c in store::fold_text(term).chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

pub struct QueryBuilder {
    registry: &'static FilterRegistry,
    default_limit: usize,
    max_limit: usize,
}

impl QueryBuilder {
    pub fn new(default_limit: usize, max_limit: usize) -> Self {
        Self {
            registry: FilterRegistry::global(),
            default_limit,
            max_limit,
        }
    }

    /// Builds a read query. Returns `Ok(None)` for `limit = 0`: nothing is
    /// composed and nothing should be executed.
    pub fn build(
        &self,
        user: &UserScope,
        filters: &[Filter],
        limit: Option<usize>,
        ctx: &FilterContext,
    ) -> Result<Option<ParameterizedQuery>, PlanGateError> {
        let limit = match limit {
            Some(0) => return Ok(None),
            Some(n) => n.min(self.max_limit),
            None => self.default_limit,
        };
        self.compose(user, filters, Some(limit), ctx).map(Some)
    }

    /// Builds an uncapped target-resolution query. A batch acts on every
    /// match and an ambiguity error carries the real count.
    pub fn build_match(
        &self,
        user: &UserScope,
        filters: &[Filter],
        ctx: &FilterContext,
    ) -> Result<ParameterizedQuery, PlanGateError> {
        self.compose(user, filters, None, ctx)
    }

    fn compose(
        &self,
        user: &UserScope,
        filters: &[Filter],
        limit: Option<usize>,
        ctx: &FilterContext,
    ) -> Result<ParameterizedQuery, PlanGateError> {
        let mut parts = SqlParts::default();
        let scope = parts.bind(Value::Text(user.as_str().to_string()));
        parts.clauses.push(format!("user_id = {scope}"));

        for filter in filters {
            let pred = self.registry.predicate(&filter.name, &filter.arg, ctx)?;
            if let Some(clause) = parts.render(&pred) {
                parts.clauses.push(clause);
            }
        }

        let mut sql = format!(
            "SELECT {} FROM tasks WHERE {} ORDER BY {}",
            schemas::TASK_COLUMNS,
            parts.clauses.join(" AND "),
            CANONICAL_ORDER
        );
        if let Some(limit) = limit {
            let slot = parts.bind(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
            sql.push_str(" LIMIT ");
            sql.push_str(&slot);
        }
        Ok(ParameterizedQuery {
            sql,
            params: parts.params,
        })
    }
}
