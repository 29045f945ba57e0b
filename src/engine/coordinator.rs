//! Three-tier execution state machine.
//!
//! `Planned -> Validating -> Executing(i) -> Completed | Failed | Aborted`.
//! Steps of one specification run strictly in order on the caller's thread;
//! no lock is held across steps and each step is its own storage transaction.

use crate::core::error::{ErrorKind, PlanGateError};
use crate::core::store::TaskStore;
use crate::core::time::Clock;
use crate::core::trace;
use crate::engine::enricher::ResponseEnricher;
use crate::engine::filters::FilterContext;
use crate::engine::operations::{ExecutionContext, OperationRegistry};
use crate::engine::planner::{ConversationTurn, InteractivePlanner, NoFollowUp, PlannerReply, PlannerRequest};
use crate::engine::query::QueryBuilder;
use crate::engine::session::Session;
use crate::engine::specification::{
    Complexity, ExecutionResult, ExecutionState, Specification, Step, StepData, StepResult,
};
use crate::engine::validator::PlanValidator;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Shared flag checked before each step is scheduled. An in-flight step
/// always finishes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub interactive_step_ceiling: usize,
    pub interactive_budget: Duration,
    pub default_read_limit: usize,
    pub max_read_limit: usize,
    pub list_cap: usize,
    pub trace_path: Option<PathBuf>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            interactive_step_ceiling: 5,
            interactive_budget: Duration::from_millis(15_000),
            default_read_limit: 50,
            max_read_limit: 200,
            list_cap: 5,
            trace_path: None,
        }
    }
}

/// Per-request collaborators.
pub struct RunOptions<'a> {
    pub history: &'a [ConversationTurn],
    pub planner: &'a dyn InteractivePlanner,
    pub cancel: Option<&'a CancelToken>,
}

impl Default for RunOptions<'_> {
    fn default() -> Self {
        Self {
            history: &[],
            planner: &NoFollowUp,
            cancel: None,
        }
    }
}

/// How a run ended, before enrichment.
struct Outcome {
    state: ExecutionState,
    error: Option<ErrorKind>,
    results: Vec<StepResult>,
    response_override: Option<String>,
}

impl Outcome {
    fn new() -> Self {
        Self {
            state: ExecutionState::Planned,
            error: None,
            results: Vec::new(),
            response_override: None,
        }
    }

    /// Terminal states are final; later transitions are ignored.
    fn advance(&mut self, next: ExecutionState) {
        if self.state.is_terminal() {
            return;
        }
        debug!(from = ?self.state, to = ?next, "state transition");
        self.state = next;
    }

    fn halt(&mut self, state: ExecutionState, kind: ErrorKind) {
        if !self.state.is_terminal() {
            self.error = Some(kind);
        }
        self.advance(state);
    }
}

pub struct ExecutionCoordinator {
    validator: PlanValidator,
    operations: OperationRegistry,
    enricher: ResponseEnricher,
    clock: Arc<dyn Clock>,
    config: CoordinatorConfig,
}

impl ExecutionCoordinator {
    pub fn new(store: Arc<dyn TaskStore>, clock: Arc<dyn Clock>, config: CoordinatorConfig) -> Self {
        let queries = QueryBuilder::new(config.default_read_limit, config.max_read_limit);
        Self {
            validator: PlanValidator::new(),
            operations: OperationRegistry::new(store, queries),
            enricher: ResponseEnricher::new(config.list_cap),
            clock,
            config,
        }
    }

    /// Validates and executes a raw plan. Nothing touches storage unless
    /// validation succeeds.
    pub fn run_plan(&self, raw: &Value, session: &mut Session, opts: &RunOptions<'_>) -> ExecutionResult {
        let started = Instant::now();
        let mut outcome = Outcome::new();
        debug!(user = %session.user, "validating plan");
        outcome.advance(ExecutionState::Validating);
        let result = match self.validator.validate(raw) {
            Ok(spec) => self.drive(&spec, session, opts, started, outcome),
            Err(err) => {
                let kind = err.kind();
                warn!(user = %session.user, error_kind = %kind, detail = %err, "plan rejected");
                outcome.halt(ExecutionState::Failed, kind);
                ExecutionResult {
                    success: false,
                    state: outcome.state,
                    data: StepData::None,
                    natural_response: self.enricher.fallback(kind, false),
                    steps_executed: 0,
                    latency_ms: elapsed_ms(started),
                    error: Some(kind),
                    step_results: Vec::new(),
                }
            }
        };
        self.record_trace(raw, session, &result);
        result
    }

    /// Executes an already validated specification.
    pub fn execute(&self, spec: &Specification, session: &mut Session, opts: &RunOptions<'_>) -> ExecutionResult {
        self.drive(spec, session, opts, Instant::now(), Outcome::new())
    }

    fn drive(
        &self,
        spec: &Specification,
        session: &mut Session,
        opts: &RunOptions<'_>,
        started: Instant,
        mut outcome: Outcome,
    ) -> ExecutionResult {
        if spec.is_noop() {
            debug!(user = %session.user, "no-op plan");
            outcome.advance(ExecutionState::Completed);
            return ExecutionResult {
                success: true,
                state: outcome.state,
                data: StepData::None,
                natural_response: spec.natural_response.clone(),
                steps_executed: 0,
                latency_ms: elapsed_ms(started),
                error: None,
                step_results: Vec::new(),
            };
        }

        let mut ctx = ExecutionContext {
            user: &session.user,
            ordinals: &mut session.ordinals,
            filters: FilterContext {
                now: self.clock.now(),
            },
        };

        let outcome = match spec.complexity {
            Complexity::Simple | Complexity::MultiStep => {
                self.run_sequential(&spec.steps, &mut ctx, opts, outcome)
            }
            Complexity::Interactive => self.run_interactive(&spec.steps, &mut ctx, opts, started, outcome),
        };

        let success = outcome.state == ExecutionState::Completed && outcome.error.is_none();
        let steps_executed = outcome.results.iter().filter(|r| r.is_ok()).count();
        let data = outcome
            .results
            .iter()
            .rev()
            .find(|r| r.is_ok())
            .map(|r| r.data.clone())
            .unwrap_or_default();
        let base = outcome
            .response_override
            .as_deref()
            .unwrap_or(&spec.natural_response);
        let natural_response = self.enricher.enrich(base, &outcome.results, outcome.error);
        let latency_ms = elapsed_ms(started);

        info!(
            user = %session.user,
            complexity = ?spec.complexity,
            state = ?outcome.state,
            steps_executed,
            latency_ms,
            "plan finished"
        );

        ExecutionResult {
            success,
            state: outcome.state,
            data,
            natural_response,
            steps_executed,
            latency_ms,
            error: outcome.error,
            step_results: outcome.results,
        }
    }

    fn run_sequential(
        &self,
        steps: &[Step],
        ctx: &mut ExecutionContext<'_>,
        opts: &RunOptions<'_>,
        mut outcome: Outcome,
    ) -> Outcome {
        for step in steps {
            if is_cancelled(opts) {
                outcome.halt(ExecutionState::Aborted, ErrorKind::Aborted);
                return outcome;
            }
            let index = outcome.results.len();
            outcome.advance(ExecutionState::Executing(index));
            let result = self.run_step(index, step, ctx);
            let failed = result.error;
            outcome.results.push(result);
            if let Some(kind) = failed {
                // Later steps may depend on this one; applied steps stand.
                outcome.halt(ExecutionState::Failed, kind);
                return outcome;
            }
        }
        outcome.advance(ExecutionState::Completed);
        outcome
    }

    fn run_interactive(
        &self,
        seed: &[Step],
        ctx: &mut ExecutionContext<'_>,
        opts: &RunOptions<'_>,
        started: Instant,
        mut outcome: Outcome,
    ) -> Outcome {
        let ceiling = self.config.interactive_step_ceiling;
        let mut queue: VecDeque<Step> = seed.iter().cloned().collect();

        loop {
            if queue.is_empty() {
                if started.elapsed() > self.config.interactive_budget {
                    warn!(user = %ctx.user, "interactive budget exhausted");
                    outcome.halt(ExecutionState::Aborted, ErrorKind::Aborted);
                    return outcome;
                }
                let request = PlannerRequest {
                    history: opts.history,
                    results: &outcome.results,
                    last: outcome.results.last(),
                    steps_remaining: ceiling.saturating_sub(outcome.results.len()),
                };
                match opts.planner.next_step(&request) {
                    Ok(PlannerReply::Finish { natural_response }) => {
                        if !natural_response.trim().is_empty() {
                            outcome.response_override = Some(natural_response);
                        }
                        break;
                    }
                    Ok(PlannerReply::Propose { step }) => match self.validator.validate_step(&step) {
                        Ok(step) => queue.push_back(step),
                        Err(err) => {
                            warn!(user = %ctx.user, detail = %err, "planner proposed an invalid step");
                            outcome.halt(ExecutionState::Failed, err.kind());
                            return outcome;
                        }
                    },
                    Err(err) => {
                        warn!(user = %ctx.user, detail = %err, "planner round trip failed");
                        outcome.halt(ExecutionState::Aborted, err.kind());
                        return outcome;
                    }
                }
                continue;
            }

            if is_cancelled(opts) {
                outcome.halt(ExecutionState::Aborted, ErrorKind::Aborted);
                return outcome;
            }
            if outcome.results.len() >= ceiling {
                warn!(user = %ctx.user, ceiling, "interactive step ceiling reached");
                outcome.halt(ExecutionState::Aborted, ErrorKind::Aborted);
                return outcome;
            }
            let Some(step) = queue.pop_front() else {
                continue;
            };

            let index = outcome.results.len();
            outcome.advance(ExecutionState::Executing(index));
            let result = self.run_step(index, &step, ctx);
            let failed = result.error;
            outcome.results.push(result);
            match failed {
                None => {}
                // The planner may disambiguate.
                Some(ErrorKind::NotFound | ErrorKind::AmbiguousTarget) => {}
                Some(kind) => {
                    outcome.halt(ExecutionState::Failed, kind);
                    return outcome;
                }
            }
        }

        outcome.advance(ExecutionState::Completed);
        if let Some(kind) = outcome.results.last().and_then(|r| r.error) {
            outcome.error = Some(kind);
        }
        outcome
    }

    fn run_step(&self, index: usize, step: &Step, ctx: &mut ExecutionContext<'_>) -> StepResult {
        debug!(user = %ctx.user, index, operation = step.operation.as_str(), "executing step");
        let handler = self.operations.handler(step.operation);
        match handler.execute(step, ctx) {
            Ok(data) => StepResult {
                index,
                operation: step.operation,
                data,
                error: None,
            },
            Err(err) => {
                let kind = err.kind();
                log_step_failure(ctx, index, step, &err);
                StepResult {
                    index,
                    operation: step.operation,
                    data: StepData::None,
                    error: Some(kind),
                }
            }
        }
    }

    fn record_trace(&self, raw: &Value, session: &Session, result: &ExecutionResult) {
        let Some(path) = &self.config.trace_path else {
            return;
        };
        if let Err(err) = trace::append_execution(path, self.clock.now(), session.user.as_str(), raw, result) {
            warn!(detail = %err, "failed to append execution trace");
        }
    }
}

fn log_step_failure(ctx: &ExecutionContext<'_>, index: usize, step: &Step, err: &PlanGateError) {
    warn!(
        user = %ctx.user,
        index,
        operation = step.operation.as_str(),
        error_kind = %err.kind(),
        detail = %err,
        "step failed"
    );
}

fn is_cancelled(opts: &RunOptions<'_>) -> bool {
    opts.cancel.is_some_and(CancelToken::is_cancelled)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
