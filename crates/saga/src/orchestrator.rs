//! Generic saga orchestrator.

use std::time::Instant;

use serde::Serialize;

use crate::error::{Result, SagaError};
use crate::state::SagaState;
use crate::step::{SagaStep, StepError};

/// Summary of a completed saga run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SagaReport {
    pub saga: String,
    pub state: SagaState,
    pub completed_steps: Vec<String>,
}

/// An ordered list of steps executed against a context `C`.
///
/// Steps run strictly in declaration order. When step `i` fails, steps
/// `i-1..=0` are compensated strictly in reverse order; the failing step
/// itself is not compensated. If a compensation fails, compensation stops
/// there and [`SagaError::CompensationFailed`] is returned.
pub struct Saga<C> {
    name: String,
    steps: Vec<Box<dyn SagaStep<C>>>,
}

impl<C: Send> Saga<C> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Appends a step.
    pub fn step(mut self, step: impl SagaStep<C> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    #[tracing::instrument(skip(self, ctx), fields(saga = %self.name))]
    pub async fn execute(&self, ctx: &mut C) -> Result<SagaReport> {
        if self.steps.is_empty() {
            return Err(SagaError::Empty(self.name.clone()));
        }

        metrics::counter!("saga_executions_total", "saga" => self.name.clone()).increment(1);
        let started = Instant::now();
        let mut completed: Vec<String> = Vec::with_capacity(self.steps.len());

        for (index, step) in self.steps.iter().enumerate() {
            let state = SagaState::Running(index);
            tracing::info!(step = step.name(), %state, "saga step started");

            if let Err(error) = step.execute(ctx).await {
                tracing::warn!(step = step.name(), error = %error, "saga step failed");
                let result = self.compensate(ctx, index, &error).await;
                metrics::histogram!("saga_duration_seconds", "saga" => self.name.clone())
                    .record(started.elapsed().as_secs_f64());
                return Err(result);
            }
            completed.push(step.name().to_string());
        }

        let duration = started.elapsed().as_secs_f64();
        metrics::histogram!("saga_duration_seconds", "saga" => self.name.clone()).record(duration);
        metrics::counter!("saga_completed", "saga" => self.name.clone()).increment(1);
        tracing::info!(duration, "saga completed");

        Ok(SagaReport {
            saga: self.name.clone(),
            state: SagaState::Completed,
            completed_steps: completed,
        })
    }

    /// Compensates steps `failed - 1` down to `0`.
    async fn compensate(&self, ctx: &mut C, failed: usize, cause: &StepError) -> SagaError {
        let failed_step = self.steps[failed].name();
        let state = SagaState::Compensating(failed);
        tracing::info!(failed_step, %state, "compensation started");

        let mut compensated = Vec::with_capacity(failed);
        for step in self.steps[..failed].iter().rev() {
            match step.compensate(ctx).await {
                Ok(()) => {
                    tracing::info!(step = step.name(), "step compensated");
                    compensated.push(step.name().to_string());
                }
                Err(error) => {
                    tracing::error!(
                        saga = %self.name,
                        step = step.name(),
                        failed_step,
                        error = %error,
                        compensated = ?compensated,
                        requires_manual_intervention = true,
                        "compensation failed"
                    );
                    metrics::counter!("saga_compensation_failed", "saga" => self.name.clone())
                        .increment(1);
                    return SagaError::CompensationFailed {
                        step: step.name().to_string(),
                        reason: error.to_string(),
                        failed_step: failed_step.to_string(),
                        failed_reason: cause.to_string(),
                        compensated,
                    };
                }
            }
        }

        metrics::counter!("saga_failed", "saga" => self.name.clone()).increment(1);
        tracing::warn!(failed_step, state = %SagaState::Failed, "saga failed and was compensated");
        SagaError::StepFailed {
            step: failed_step.to_string(),
            error: cause.clone(),
            compensated,
        }
    }
}
