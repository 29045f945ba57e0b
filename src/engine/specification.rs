//! Typed plan model.
//!
//! A [`Specification`] only exists once `PlanValidator` has accepted a raw
//! plan. It is built per request and dropped after the result is returned.

use crate::core::error::ErrorKind;
use crate::core::store::{FieldUpdate, Task};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    MultiStep,
    Interactive,
}

impl Complexity {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "simple" => Some(Complexity::Simple),
            "multi_step" => Some(Complexity::MultiStep),
            "interactive" => Some(Complexity::Interactive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl Operation {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Operation::Create),
            "read" => Some(Operation::Read),
            "update" => Some(Operation::Update),
            "delete" => Some(Operation::Delete),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    pub fn is_mutation(self) -> bool {
        !matches!(self, Operation::Read)
    }
}

/// Which timestamp a `date_range` filter applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateField {
    ScheduledTime,
    CreatedAt,
}

/// A filter argument after type checking against the registry signature.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterArg {
    None,
    Priority(i64),
    Status(crate::core::store::TaskStatus),
    Text(String),
    DateTime(DateTime<Utc>),
    DateRange {
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        field: DateField,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Filter {
    pub name: String,
    pub arg: FilterArg,
}

/// How an update/delete finds its record(s).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Id(String),
    /// 1-based position in the session's most recent read.
    Ordinal(usize),
    FilterMatch,
}

/// Step parameters, type-checked but not yet range-checked.
///
/// Range and value checks (priority 0..=3, known status, parseable
/// datetime) belong to the operation handlers so that they fail per step.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct StepParams {
    pub title: Option<String>,
    pub description: FieldUpdate<String>,
    pub category: FieldUpdate<String>,
    pub priority: Option<i64>,
    pub status: Option<String>,
    pub scheduled_time: FieldUpdate<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    pub operation: Operation,
    pub params: StepParams,
    pub filters: Vec<Filter>,
    pub target: Option<Target>,
    pub limit: Option<usize>,
    /// Delete every filter match instead of requiring a unique one.
    pub batch: bool,
}

impl Step {
    pub fn is_noop_read(&self) -> bool {
        self.operation == Operation::Read && self.limit == Some(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Specification {
    pub complexity: Complexity,
    pub steps: Vec<Step>,
    pub natural_response: String,
}

impl Specification {
    /// Greeting / non-task sentinel: a simple plan whose single step is a
    /// read with `limit = 0`. It never reaches storage.
    pub fn is_noop(&self) -> bool {
        self.complexity == Complexity::Simple
            && self.steps.len() == 1
            && self.steps[0].is_noop_read()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum StepData {
    #[default]
    None,
    Record(Task),
    List(Vec<Task>),
}

impl StepData {
    pub fn tasks(&self) -> &[Task] {
        match self {
            StepData::None => &[],
            StepData::Record(task) => std::slice::from_ref(task),
            StepData::List(tasks) => tasks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// 0-based position in execution order.
    pub index: usize,
    pub operation: Operation,
    pub data: StepData,
    pub error: Option<ErrorKind>,
}

impl StepResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "step")]
pub enum ExecutionState {
    Planned,
    Validating,
    Executing(usize),
    Completed,
    Failed,
    Aborted,
}

impl ExecutionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionState::Completed | ExecutionState::Failed | ExecutionState::Aborted
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub state: ExecutionState,
    /// Data of the last successful step.
    pub data: StepData,
    pub natural_response: String,
    /// Number of steps that completed successfully.
    pub steps_executed: usize,
    pub latency_ms: u64,
    pub error: Option<ErrorKind>,
    pub step_results: Vec<StepResult>,
}
