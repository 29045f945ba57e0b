//! The narrow capability the interactive tier needs from a planner.
//!
//! The coordinator only ever asks "what next?" and gets back a raw step
//! proposal (validated like any plan step) or a final response.

use crate::core::error::PlanGateError;
use crate::engine::specification::StepResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::debug;

/// One prior turn of the conversation. Forwarded read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct PlannerRequest<'a> {
    pub history: &'a [ConversationTurn],
    pub results: &'a [StepResult],
    pub last: Option<&'a StepResult>,
    pub steps_remaining: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlannerReply {
    /// An unvalidated step, in plan wire format.
    Propose { step: Value },
    /// Stop. An empty response keeps the plan's own text.
    Finish {
        #[serde(default)]
        natural_response: String,
    },
}

pub trait InteractivePlanner: Send + Sync {
    fn next_step(&self, request: &PlannerRequest<'_>) -> Result<PlannerReply, PlanGateError>;
}

/// Planner that never proposes anything. Interactive plans then run only
/// their seed steps.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFollowUp;

impl InteractivePlanner for NoFollowUp {
    fn next_step(&self, _request: &PlannerRequest<'_>) -> Result<PlannerReply, PlanGateError> {
        Ok(PlannerReply::Finish {
            natural_response: String::new(),
        })
    }
}

/// Planner backed by a subprocess: one JSON request on stdin, one JSON reply
/// on stdout, per round trip.
#[derive(Debug, Clone)]
pub struct CommandPlanner {
    program: String,
    args: Vec<String>,
}

impl CommandPlanner {
    pub fn parse(command_line: &str) -> Result<Self, PlanGateError> {
        let mut words = shell_words::split(command_line)
            .map_err(|e| PlanGateError::Config(format!("planner command: {e}")))?
            .into_iter();
        let program = words
            .next()
            .ok_or_else(|| PlanGateError::Config("planner command is empty".into()))?;
        Ok(Self {
            program,
            args: words.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl InteractivePlanner for CommandPlanner {
    fn next_step(&self, request: &PlannerRequest<'_>) -> Result<PlannerReply, PlanGateError> {
        let body = serde_json::to_vec(request)?;
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PlanGateError::Planner(format!("spawn {}: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&body)
                .and_then(|_| stdin.write_all(b"\n"))
                .map_err(|e| PlanGateError::Planner(format!("write request: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| PlanGateError::Planner(format!("wait: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let preview: String = stderr.chars().take(200).collect();
            return Err(PlanGateError::Planner(format!(
                "{} exited with {}: {preview}",
                self.program, output.status
            )));
        }
        debug!(bytes = output.stdout.len(), "planner replied");
        serde_json::from_slice(&output.stdout)
            .map_err(|e| PlanGateError::Planner(format!("unreadable reply: {e}")))
    }
}
