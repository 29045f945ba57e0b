//! One handler per operation kind.
//!
//! Handlers own range and value checks for their params, so a bad value
//! fails its own step and not the whole plan. Target resolution is shared
//! and never guesses: zero matches is `NotFound`, several is
//! `AmbiguousTarget` unless the step is an explicit batch delete.

use crate::core::error::PlanGateError;
use crate::core::store::{FieldUpdate, NewTask, Task, TaskPatch, TaskStatus, TaskStore, UserScope};
use crate::core::time;
use crate::engine::filters::FilterContext;
use crate::engine::query::QueryBuilder;
use crate::engine::session::OrdinalBuffer;
use crate::engine::specification::{Operation, Step, StepData, StepParams, Target};
use std::sync::Arc;
use tracing::debug;

pub const TITLE_MAX_CHARS: usize = 500;
pub const CATEGORY_MAX_CHARS: usize = 100;
pub const DESCRIPTION_MAX_CHARS: usize = 2000;

/// What a handler may see besides its step.
pub struct ExecutionContext<'a> {
    pub user: &'a UserScope,
    pub ordinals: &'a mut OrdinalBuffer,
    pub filters: FilterContext,
}

pub trait OperationHandler: Send + Sync {
    fn execute(&self, step: &Step, ctx: &mut ExecutionContext<'_>) -> Result<StepData, PlanGateError>;
}

struct Shared {
    store: Arc<dyn TaskStore>,
    queries: QueryBuilder,
}

impl Shared {
    fn fetch(&self, user: &UserScope, id: &str) -> Result<Task, PlanGateError> {
        self.store
            .get(user, id)?
            .ok_or_else(|| PlanGateError::NotFound(format!("no task with id {id}")))
    }

    /// Resolves the step's target to concrete records.
    fn resolve(&self, step: &Step, ctx: &ExecutionContext<'_>) -> Result<Vec<Task>, PlanGateError> {
        let target = step
            .target
            .as_ref()
            .ok_or_else(|| PlanGateError::InvalidSpecification("step has no target".into()))?;
        match target {
            Target::Id(id) => Ok(vec![self.fetch(ctx.user, id)?]),
            Target::Ordinal(n) => {
                let id = ctx.ordinals.resolve(*n).ok_or_else(|| {
                    PlanGateError::NotFound(format!(
                        "ordinal {n} is outside the last listing of {}",
                        ctx.ordinals.len()
                    ))
                })?;
                Ok(vec![self.fetch(ctx.user, id)?])
            }
            Target::FilterMatch => {
                let query = self.queries.build_match(ctx.user, &step.filters, &ctx.filters)?;
                let matches = self.store.select(&query)?;
                match matches.len() {
                    0 => Err(PlanGateError::NotFound("no task matches the filters".into())),
                    1 => Ok(matches),
                    _ if step.batch => Ok(matches),
                    n => Err(PlanGateError::AmbiguousTarget(n)),
                }
            }
        }
    }
}

fn check_title(title: &str) -> Result<String, PlanGateError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(PlanGateError::ValidationError("title must not be empty".into()));
    }
    if title.chars().count() > TITLE_MAX_CHARS {
        return Err(PlanGateError::ValidationError(format!(
            "title exceeds {TITLE_MAX_CHARS} characters"
        )));
    }
    Ok(title.to_string())
}

fn check_priority(priority: i64) -> Result<i64, PlanGateError> {
    if (0..=3).contains(&priority) {
        Ok(priority)
    } else {
        Err(PlanGateError::ValidationError(format!(
            "priority {priority} is outside 0-3"
        )))
    }
}

fn check_status(status: &str) -> Result<TaskStatus, PlanGateError> {
    TaskStatus::parse(status)
        .ok_or_else(|| PlanGateError::ValidationError(format!("unknown status '{status}'")))
}

fn check_text(field: &str, value: &str, max: usize) -> Result<Option<String>, PlanGateError> {
    let value = value.trim();
    if value.chars().count() > max {
        return Err(PlanGateError::ValidationError(format!(
            "{field} exceeds {max} characters"
        )));
    }
    Ok((!value.is_empty()).then(|| value.to_string()))
}

fn check_schedule(value: &str) -> Result<String, PlanGateError> {
    time::parse_datetime(value)
        .map(time::to_storage)
        .ok_or_else(|| PlanGateError::ValidationError(format!("unreadable scheduled_time '{value}'")))
}

/// Maps a nullable text change; an empty string clears.
fn text_update(
    field: &str,
    update: &FieldUpdate<String>,
    max: usize,
) -> Result<FieldUpdate<String>, PlanGateError> {
    Ok(match update {
        FieldUpdate::Keep => FieldUpdate::Keep,
        FieldUpdate::Clear => FieldUpdate::Clear,
        FieldUpdate::Set(v) => match check_text(field, v, max)? {
            Some(v) => FieldUpdate::Set(v),
            None => FieldUpdate::Clear,
        },
    })
}

fn set_value(update: &FieldUpdate<String>) -> Option<&str> {
    match update {
        FieldUpdate::Set(v) => Some(v.as_str()),
        FieldUpdate::Keep | FieldUpdate::Clear => None,
    }
}

pub fn new_task(params: &StepParams) -> Result<NewTask, PlanGateError> {
    let title = params
        .title
        .as_deref()
        .ok_or_else(|| PlanGateError::ValidationError("create requires a title".into()))
        .and_then(check_title)?;
    let description = set_value(&params.description)
        .map(|v| check_text("description", v, DESCRIPTION_MAX_CHARS))
        .transpose()?
        .flatten();
    let category = set_value(&params.category)
        .map(|v| check_text("category", v, CATEGORY_MAX_CHARS))
        .transpose()?
        .flatten();
    let priority = check_priority(params.priority.unwrap_or(0))?;
    let status = params
        .status
        .as_deref()
        .map(check_status)
        .transpose()?
        .unwrap_or(TaskStatus::Pending);
    let scheduled_time = set_value(&params.scheduled_time)
        .map(check_schedule)
        .transpose()?;
    Ok(NewTask {
        title,
        description,
        category,
        priority,
        status,
        scheduled_time,
    })
}

pub fn task_patch(params: &StepParams) -> Result<TaskPatch, PlanGateError> {
    let patch = TaskPatch {
        title: params.title.as_deref().map(check_title).transpose()?,
        description: text_update("description", &params.description, DESCRIPTION_MAX_CHARS)?,
        category: text_update("category", &params.category, CATEGORY_MAX_CHARS)?,
        priority: params.priority.map(check_priority).transpose()?,
        status: params.status.as_deref().map(check_status).transpose()?,
        scheduled_time: match &params.scheduled_time {
            FieldUpdate::Keep => FieldUpdate::Keep,
            FieldUpdate::Clear => FieldUpdate::Clear,
            FieldUpdate::Set(v) => FieldUpdate::Set(check_schedule(v)?),
        },
    };
    if patch.is_empty() {
        return Err(PlanGateError::ValidationError("update changes nothing".into()));
    }
    Ok(patch)
}

pub struct CreateHandler(Arc<Shared>);
pub struct ReadHandler(Arc<Shared>);
pub struct UpdateHandler(Arc<Shared>);
pub struct DeleteHandler(Arc<Shared>);

impl OperationHandler for CreateHandler {
    fn execute(&self, step: &Step, ctx: &mut ExecutionContext<'_>) -> Result<StepData, PlanGateError> {
        let task = new_task(&step.params)?;
        let created = self.0.store.insert(ctx.user, &task)?;
        debug!(task_id = %created.id, "task created");
        Ok(StepData::Record(created))
    }
}

impl OperationHandler for ReadHandler {
    fn execute(&self, step: &Step, ctx: &mut ExecutionContext<'_>) -> Result<StepData, PlanGateError> {
        let Some(query) = self
            .0
            .queries
            .build(ctx.user, &step.filters, step.limit, &ctx.filters)?
        else {
            return Ok(StepData::List(Vec::new()));
        };
        let tasks = self.0.store.select(&query)?;
        ctx.ordinals
            .replace(tasks.iter().map(|t| t.id.clone()).collect());
        debug!(rows = tasks.len(), "read listed tasks");
        Ok(StepData::List(tasks))
    }
}

impl OperationHandler for UpdateHandler {
    fn execute(&self, step: &Step, ctx: &mut ExecutionContext<'_>) -> Result<StepData, PlanGateError> {
        let patch = task_patch(&step.params)?;
        let target = self
            .0
            .resolve(step, ctx)?
            .into_iter()
            .next()
            .ok_or_else(|| PlanGateError::NotFound("no task to update".into()))?;
        let updated = self
            .0
            .store
            .update(ctx.user, &target.id, &patch)?
            .ok_or_else(|| PlanGateError::NotFound(format!("task {} is gone", target.id)))?;
        debug!(task_id = %updated.id, "task updated");
        Ok(StepData::Record(updated))
    }
}

impl OperationHandler for DeleteHandler {
    fn execute(&self, step: &Step, ctx: &mut ExecutionContext<'_>) -> Result<StepData, PlanGateError> {
        let targets = self.0.resolve(step, ctx)?;
        let ids: Vec<String> = targets.iter().map(|t| t.id.clone()).collect();
        let removed = self.0.store.delete(ctx.user, &ids)?;
        if removed == 0 {
            return Err(PlanGateError::NotFound("nothing was deleted".into()));
        }
        debug!(removed, "tasks deleted");
        if step.batch {
            Ok(StepData::List(targets))
        } else {
            Ok(targets.into_iter().next().map(StepData::Record).unwrap_or_default())
        }
    }
}

/// Closed dispatch over [`Operation`].
pub struct OperationRegistry {
    create: CreateHandler,
    read: ReadHandler,
    update: UpdateHandler,
    delete: DeleteHandler,
}

impl OperationRegistry {
    pub fn new(store: Arc<dyn TaskStore>, queries: QueryBuilder) -> Self {
        let shared = Arc::new(Shared { store, queries });
        Self {
            create: CreateHandler(Arc::clone(&shared)),
            read: ReadHandler(Arc::clone(&shared)),
            update: UpdateHandler(Arc::clone(&shared)),
            delete: DeleteHandler(shared),
        }
    }

    pub fn handler(&self, op: Operation) -> &dyn OperationHandler {
        match op {
            Operation::Create => &self.create,
            Operation::Read => &self.read,
            Operation::Update => &self.update,
            Operation::Delete => &self.delete,
        }
    }
}
