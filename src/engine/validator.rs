//! The trust boundary.
//!
//! Raw planner output is an untyped JSON tree. [`PlanValidator`] turns it into
//! a [`Specification`] or rejects it whole. It never touches storage, so a
//! rejected plan has no side effects by construction.

use crate::core::error::PlanGateError;
use crate::core::store::FieldUpdate;
use crate::engine::filters::FilterRegistry;
use crate::engine::specification::{
    Complexity, Filter, Operation, Specification, Step, StepParams, Target,
};
use serde_json::{Map, Value};

/// Step keys planners emit for their own bookkeeping. Accepted and ignored.
const IGNORED_STEP_KEYS: [&str; 3] = ["order", "strategy", "save_result_as"];

const STEP_KEYS: [&str; 9] = [
    "operation",
    "params",
    "modifications",
    "filters",
    "limit",
    "target",
    "batch",
    "selector",
    "index",
];

const FIELD_KEYS: [&str; 6] = [
    "title",
    "description",
    "category",
    "priority",
    "status",
    "scheduled_time",
];

fn invalid(msg: impl Into<String>) -> PlanGateError {
    PlanGateError::InvalidSpecification(msg.into())
}

fn rejected(msg: impl Into<String>) -> PlanGateError {
    PlanGateError::ValidationError(msg.into())
}

/// Maps spoken priority words onto the 0..=3 scale.
pub fn priority_word(word: &str) -> Option<i64> {
    match word.trim().to_ascii_lowercase().as_str() {
        "none" => Some(0),
        "low" | "minor" => Some(1),
        "medium" | "normal" | "moderate" => Some(2),
        "high" | "urgent" | "important" | "critical" => Some(3),
        _ => None,
    }
}

/// Older planner filter names.
fn canonical_filter_name(name: &str) -> &str {
    match name {
        "category" => "category_eq",
        "status" => "status_eq",
        "priority_equals" => "priority_eq",
        other => other,
    }
}

pub struct PlanValidator {
    registry: &'static FilterRegistry,
}

impl Default for PlanValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanValidator {
    pub fn new() -> Self {
        Self {
            registry: FilterRegistry::global(),
        }
    }

    pub fn validate_str(&self, raw: &str) -> Result<Specification, PlanGateError> {
        let value: Value = serde_json::from_str(raw)?;
        self.validate(&value)
    }

    pub fn validate(&self, raw: &Value) -> Result<Specification, PlanGateError> {
        let obj = raw
            .as_object()
            .ok_or_else(|| invalid("plan must be a JSON object"))?;

        let complexity = obj
            .get("complexity")
            .and_then(Value::as_str)
            .and_then(Complexity::parse)
            .ok_or_else(|| invalid("complexity must be simple, multi_step or interactive"))?;

        let natural_response = match obj.get("natural_response") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(_) => return Err(invalid("natural_response must be a string")),
        };

        let raw_steps = obj
            .get("steps")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid("steps must be an array"))?;

        match complexity {
            Complexity::Simple if raw_steps.len() != 1 => {
                return Err(invalid("a simple plan has exactly one step"));
            }
            _ if raw_steps.is_empty() => return Err(invalid("plan has no steps")),
            _ => {}
        }

        let steps = raw_steps
            .iter()
            .map(|s| self.validate_step(s))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Specification {
            complexity,
            steps,
            natural_response,
        })
    }

    /// Validates one step. Interactive proposals go through here too.
    pub fn validate_step(&self, raw: &Value) -> Result<Step, PlanGateError> {
        let obj = raw
            .as_object()
            .ok_or_else(|| invalid("step must be a JSON object"))?;

        let operation = match obj.get("operation") {
            Some(Value::String(s)) => Operation::parse(s)
                .ok_or_else(|| PlanGateError::InvalidOperation(s.clone()))?,
            _ => return Err(invalid("step is missing operation")),
        };

        for key in obj.keys() {
            let known = STEP_KEYS.contains(&key.as_str())
                || IGNORED_STEP_KEYS.contains(&key.as_str())
                || key == "use_result_from";
            if !known {
                return Err(invalid(format!("unknown step key '{key}'")));
            }
        }

        let mut fields = merged_fields(obj)?;
        let task_id = match fields.remove("task_id") {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) if !id.trim().is_empty() => Some(id),
            Some(_) => return Err(invalid("task_id must be a non-empty string")),
        };
        let limit = step_limit(obj, fields.remove("limit"))?;

        let params = match operation {
            Operation::Create | Operation::Update => parse_fields(operation, &fields)?,
            Operation::Read | Operation::Delete => {
                if let Some(key) = fields.keys().next() {
                    return Err(rejected(format!(
                        "{} does not accept param '{key}'",
                        operation.as_str()
                    )));
                }
                StepParams::default()
            }
        };

        if limit.is_some() && operation != Operation::Read {
            return Err(rejected("limit only applies to read"));
        }

        let filters = self.parse_filters(obj.get("filters"))?;
        if operation == Operation::Create && !filters.is_empty() {
            return Err(invalid("create does not take filters"));
        }

        let target = resolve_target(operation, obj, task_id, !filters.is_empty())?;

        let batch = match obj.get("batch") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(_) => return Err(invalid("batch must be a boolean")),
        };
        if batch && !(operation == Operation::Delete && target == Some(Target::FilterMatch)) {
            return Err(invalid("batch is only valid on delete with a filter match"));
        }

        Ok(Step {
            operation,
            params,
            filters,
            target,
            limit,
            batch,
        })
    }

    fn parse_filters(&self, raw: Option<&Value>) -> Result<Vec<Filter>, PlanGateError> {
        let items = match raw {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::Array(items)) => items,
            Some(_) => return Err(invalid("filters must be an array")),
        };
        items.iter().map(|item| self.parse_filter(item)).collect()
    }

    fn parse_filter(&self, item: &Value) -> Result<Filter, PlanGateError> {
        let obj = item
            .as_object()
            .ok_or_else(|| invalid("filter must be an object"))?;
        if let Some(key) = obj
            .keys()
            .find(|k| !matches!(k.as_str(), "name" | "type" | "value" | "arg"))
        {
            return Err(invalid(format!("unknown filter key '{key}'")));
        }
        let name = match (obj.get("name"), obj.get("type")) {
            (Some(Value::String(a)), Some(Value::String(b))) if a != b => {
                return Err(invalid("filter name and type disagree"));
            }
            (Some(Value::String(n)), _) | (None, Some(Value::String(n))) => n.as_str(),
            _ => return Err(invalid("filter is missing a name")),
        };
        let name = canonical_filter_name(name);
        let entry = self
            .registry
            .get(name)
            .ok_or_else(|| invalid(format!("filter '{name}' is not registered")))?;

        let raw_arg = match (obj.get("value"), obj.get("arg")) {
            (Some(a), Some(b)) if !a.is_null() && !b.is_null() && a != b => {
                return Err(invalid(format!("filter '{name}' has two values")));
            }
            (Some(v), _) if !v.is_null() => Some(v),
            (_, other) => other,
        };
        let arg = entry.arg.parse(name, raw_arg)?;
        Ok(Filter {
            name: entry.name.to_string(),
            arg,
        })
    }
}

/// `params` merged with `modifications`; a key in both is ambiguous.
fn merged_fields(step: &Map<String, Value>) -> Result<Map<String, Value>, PlanGateError> {
    let as_map = |key: &str| -> Result<Map<String, Value>, PlanGateError> {
        match step.get(key) {
            None | Some(Value::Null) => Ok(Map::new()),
            Some(Value::Object(m)) => Ok(m.clone()),
            Some(_) => Err(invalid(format!("{key} must be an object"))),
        }
    };
    let mut fields = as_map("params")?;
    for (key, value) in as_map("modifications")? {
        if fields.contains_key(&key) {
            return Err(invalid(format!("'{key}' appears in params and modifications")));
        }
        fields.insert(key, value);
    }
    Ok(fields)
}

fn step_limit(
    step: &Map<String, Value>,
    from_params: Option<Value>,
) -> Result<Option<usize>, PlanGateError> {
    let parse = |v: &Value| -> Result<Option<usize>, PlanGateError> {
        match v {
            Value::Null => Ok(None),
            other => other
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| rejected("limit must be a non-negative integer")),
        }
    };
    let top = step.get("limit").map(parse).transpose()?.flatten();
    let nested = from_params.as_ref().map(parse).transpose()?.flatten();
    match (top, nested) {
        (Some(a), Some(b)) if a != b => Err(invalid("two different limits on one step")),
        (a, b) => Ok(a.or(b)),
    }
}

fn parse_fields(op: Operation, fields: &Map<String, Value>) -> Result<StepParams, PlanGateError> {
    if let Some(key) = fields.keys().find(|k| !FIELD_KEYS.contains(&k.as_str())) {
        return Err(rejected(format!("unknown param '{key}'")));
    }

    let text = |key: &str| -> Result<Option<String>, PlanGateError> {
        match fields.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(rejected(format!("{key} must be a string"))),
        }
    };
    // Nullable fields: null clears on update and means "unset" on create.
    let nullable = |key: &str| -> Result<FieldUpdate<String>, PlanGateError> {
        match fields.get(key) {
            None => Ok(FieldUpdate::Keep),
            Some(Value::Null) if op == Operation::Update => Ok(FieldUpdate::Clear),
            Some(Value::Null) => Ok(FieldUpdate::Keep),
            Some(Value::String(s)) => Ok(FieldUpdate::Set(s.clone())),
            Some(_) => Err(rejected(format!("{key} must be a string or null"))),
        }
    };

    if matches!(fields.get("title"), Some(Value::Null)) {
        return Err(rejected("title cannot be null"));
    }

    let priority = match fields.get("priority") {
        None | Some(Value::Null) => None,
        Some(Value::String(word)) => Some(
            priority_word(word).ok_or_else(|| rejected(format!("unknown priority '{word}'")))?,
        ),
        Some(v) => Some(
            v.as_i64()
                .ok_or_else(|| rejected("priority must be an integer or a priority word"))?,
        ),
    };

    let status = match fields.get("status") {
        Some(Value::Null) => None,
        _ => text("status")?,
    };

    Ok(StepParams {
        title: text("title")?,
        description: nullable("description")?,
        category: nullable("category")?,
        priority,
        status,
        scheduled_time: nullable("scheduled_time")?,
    })
}

fn resolve_target(
    op: Operation,
    step: &Map<String, Value>,
    task_id: Option<String>,
    has_filters: bool,
) -> Result<Option<Target>, PlanGateError> {
    let mut sources: Vec<Target> = Vec::new();

    match step.get("target") {
        None | Some(Value::Null) => {}
        Some(Value::String(s)) if s == "filter_match" => sources.push(Target::FilterMatch),
        Some(Value::Object(t)) if t.len() == 1 => {
            if let Some(id) = t.get("id") {
                match id.as_str().map(str::trim) {
                    Some(id) if !id.is_empty() => sources.push(Target::Id(id.to_string())),
                    _ => return Err(invalid("target id must be a non-empty string")),
                }
            } else if let Some(n) = t.get("ordinal") {
                sources.push(Target::Ordinal(ordinal(n)?));
            } else {
                return Err(invalid("target must be id, ordinal or filter_match"));
            }
        }
        Some(_) => return Err(invalid("target must be id, ordinal or filter_match")),
    }

    if let Some(id) = task_id {
        sources.push(Target::Id(id));
    }

    match (step.get("selector"), step.get("index")) {
        (None | Some(Value::Null), None | Some(Value::Null)) => {}
        (Some(Value::String(sel)), Some(n)) if sel == "by_index" => {
            sources.push(Target::Ordinal(ordinal(n)?));
        }
        _ => return Err(invalid("selector must be by_index with an index")),
    }

    if sources.len() > 1 {
        return Err(invalid("step has more than one target"));
    }
    let explicit = sources.pop();

    if !op.is_mutation() || op == Operation::Create {
        if explicit.is_some() {
            return Err(invalid(format!("{} does not take a target", op.as_str())));
        }
        return Ok(None);
    }

    let target = match explicit {
        Some(Target::FilterMatch) if !has_filters => {
            return Err(invalid("filter_match needs at least one filter"));
        }
        Some(Target::Id(_) | Target::Ordinal(_)) if has_filters => {
            return Err(invalid("filters conflict with an explicit target"));
        }
        Some(t) => t,
        None if has_filters => Target::FilterMatch,
        None if step.get("use_result_from").is_some_and(|v| !v.is_null()) => Target::Ordinal(1),
        None => {
            return Err(invalid(format!("{} needs a target", op.as_str())));
        }
    };
    Ok(Some(target))
}

fn ordinal(raw: &Value) -> Result<usize, PlanGateError> {
    raw.as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .filter(|n| *n >= 1)
        .ok_or_else(|| invalid("ordinal must be an integer >= 1"))
}
