//! Final user-facing text.
//!
//! Read results are described from the rows actually returned, never from
//! the planner's guess. Mutations keep the planner's wording and gain one
//! line per affected record. Errors never leak detail.

use crate::core::error::ErrorKind;
use crate::core::store::{Task, TaskStatus};
use crate::core::time;
use crate::engine::specification::{Operation, StepResult};
use std::fmt::Write;

pub const NO_TASKS: &str = "No tasks found matching your criteria.";

pub struct ResponseEnricher {
    list_cap: usize,
}

impl ResponseEnricher {
    pub fn new(list_cap: usize) -> Self {
        Self {
            list_cap: list_cap.max(1),
        }
    }

    pub fn enrich(&self, base: &str, results: &[StepResult], failure: Option<ErrorKind>) -> String {
        if let Some(kind) = failure {
            let partial = results
                .iter()
                .any(|r| r.is_ok() && r.operation.is_mutation());
            return self.fallback(kind, partial);
        }

        let mut lines: Vec<String> = Vec::new();
        match results.iter().rev().find(|r| r.is_ok()) {
            Some(last) if last.operation == Operation::Read => {
                lines.push(self.list(last.data.tasks()));
            }
            _ => {
                if !base.trim().is_empty() {
                    lines.push(base.trim().to_string());
                }
            }
        }

        for result in results.iter().filter(|r| r.is_ok()) {
            let verb = match result.operation {
                Operation::Create => "Created",
                Operation::Update => "Updated",
                Operation::Delete => "Deleted",
                Operation::Read => continue,
            };
            for task in result.data.tasks() {
                lines.push(format!("{verb}: \"{}\" ({})", task.title, task.id));
            }
        }

        if lines.is_empty() {
            return base.to_string();
        }
        lines.join("\n")
    }

    /// Renders a read listing capped at `list_cap` lines.
    pub fn list(&self, tasks: &[Task]) -> String {
        if tasks.is_empty() {
            return NO_TASKS.to_string();
        }
        let mut out = if tasks.len() == 1 {
            "You have 1 task:".to_string()
        } else {
            format!("You have {} tasks:", tasks.len())
        };
        for (i, task) in tasks.iter().take(self.list_cap).enumerate() {
            let _ = write!(out, "\n{}. {}", i + 1, describe(task));
        }
        if tasks.len() > self.list_cap {
            let _ = write!(out, "\n...and {} more.", tasks.len() - self.list_cap);
        }
        out
    }

    /// Safe generic text per error kind.
    pub fn fallback(&self, kind: ErrorKind, partial: bool) -> String {
        let msg = match kind {
            ErrorKind::InvalidSpecification | ErrorKind::InvalidOperation => {
                "Sorry, I couldn't understand that request."
            }
            ErrorKind::ValidationError => "Some of the details in that request aren't valid.",
            ErrorKind::AmbiguousTarget => {
                "More than one task matches that. Could you be more specific?"
            }
            ErrorKind::NotFound => "I couldn't find that task.",
            ErrorKind::ConstraintViolation => "I couldn't save that change.",
            ErrorKind::Aborted => "That request took too many steps, so I stopped.",
        };
        if partial {
            format!("{msg} Earlier changes in this request were kept.")
        } else {
            msg.to_string()
        }
    }
}

fn priority_label(priority: i64) -> Option<&'static str> {
    match priority {
        1 => Some("low"),
        2 => Some("medium"),
        3 => Some("high"),
        _ => None,
    }
}

/// `Title [high priority] (in progress, scheduled 2026-10-17 14:00 UTC)`
fn describe(task: &Task) -> String {
    let mut out = task.title.clone();
    if let Some(label) = priority_label(task.priority) {
        let _ = write!(out, " [{label} priority]");
    }
    let status = match TaskStatus::parse(&task.status) {
        Some(TaskStatus::InProgress) => "in progress",
        Some(TaskStatus::Completed) => "completed",
        _ => "pending",
    };
    match &task.scheduled_time {
        Some(ts) => {
            let _ = write!(out, " ({status}, scheduled {})", time::display(ts));
        }
        None => {
            let _ = write!(out, " ({status})");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::specification::StepData;

    fn task(id: &str, title: &str, priority: i64) -> Task {
        Task {
            id: id.into(),
            user_id: "u".into(),
            title: title.into(),
            description: None,
            category: None,
            priority,
            status: "pending".into(),
            scheduled_time: None,
            created_at: "2026-10-16T00:00:00.000Z".into(),
            updated_at: "2026-10-16T00:00:00.000Z".into(),
            completed_at: None,
        }
    }

    fn ok(index: usize, operation: Operation, data: StepData) -> StepResult {
        StepResult {
            index,
            operation,
            data,
            error: None,
        }
    }

    #[test]
    fn empty_read_uses_canonical_message() {
        let e = ResponseEnricher::new(5);
        let out = e.enrich("Here you go", &[ok(0, Operation::Read, StepData::List(vec![]))], None);
        assert_eq!(out, NO_TASKS);
    }

    #[test]
    fn long_listing_is_truncated() {
        let e = ResponseEnricher::new(5);
        let tasks: Vec<Task> = (0..7).map(|i| task(&format!("task_{i}"), &format!("T{i}"), 0)).collect();
        let out = e.list(&tasks);
        assert!(out.starts_with("You have 7 tasks:"));
        assert!(out.contains("5. T4 (pending)"));
        assert!(!out.contains("T5"));
        assert!(out.ends_with("...and 2 more."));
    }

    #[test]
    fn listing_line_carries_priority_status_and_schedule() {
        let mut t = task("task_1", "Dentist", 3);
        t.status = "in_progress".into();
        t.scheduled_time = Some("2026-10-17T14:00:00.000Z".into());
        let out = ResponseEnricher::new(5).list(&[t]);
        assert_eq!(
            out,
            "You have 1 task:\n1. Dentist [high priority] (in progress, scheduled 2026-10-17 14:00 UTC)"
        );
    }

    #[test]
    fn mutation_keeps_base_and_names_record() {
        let e = ResponseEnricher::new(5);
        let out = e.enrich(
            "Added it.",
            &[ok(0, Operation::Create, StepData::Record(task("task_9", "Buy milk", 2)))],
            None,
        );
        assert_eq!(out, "Added it.\nCreated: \"Buy milk\" (task_9)");
    }

    #[test]
    fn failure_after_mutation_mentions_kept_changes() {
        let e = ResponseEnricher::new(5);
        let results = [ok(0, Operation::Create, StepData::Record(task("task_1", "A", 0)))];
        let out = e.enrich("ignored", &results, Some(ErrorKind::ValidationError));
        assert!(out.ends_with("Earlier changes in this request were kept."));
        assert!(!out.contains("ignored"));
    }
}
