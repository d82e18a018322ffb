//! Flows: named user journeys and the state machine that runs them.
//!
//! A [`Flow`] is an ordered list of [`FunnelStep`]s plus the data that shapes
//! how far a visitor gets through it:
//!
//! - **gates** sit in front of a step and let the flow continue with a fixed
//!   probability. A closed gate ends the flow as `Completed`; under-execution
//!   is the point, not a failure.
//! - **draws** are random values (a review score, a review text) sampled once
//!   when the flow starts, so that rendering stays a pure function of the
//!   session.
//! - an **authentication requirement** which, when unmet, aborts the flow
//!   before it sends anything.
//!
//! # State machine
//!
//! ```text
//! NotStarted ──(auth unmet)──────────────────────────────▶ Aborted
//!     │
//!     ▼
//! Running(i) ──(gate before i closed)────────────────────▶ Completed
//!     │      ──(step i fails, load-bearing)──────────────▶ Aborted
//!     │      ──(step i gets no response)─────────────────▶ Aborted
//!     │      ──(i == steps.len())────────────────────────▶ Completed
//!     └──────(step i ok, or fails best-effort)──▶ Running(i + 1)
//! ```
//!
//! Both terminals mean "iteration done" to the session; they differ only in
//! what gets logged.

use std::collections::BTreeMap;

use rand::{Rng, seq::IndexedRandom};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    aggregate::Aggregate,
    error::{Error, Failure, Result},
    metric::StepMetric,
    session::SessionState,
    step::FunnelStep,
    transport::Transport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthRequirement {
    #[default]
    None,
    Required,
}

/// A continuation probability checked before a step.
#[derive(Debug, Clone, PartialEq)]
pub struct Gate {
    pub name: String,
    pub probability: f64,
}

impl Gate {
    /// Draws `u` in `[0, 1)`; the flow continues when `u < probability`.
    pub fn passes<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.random::<f64>() < self.probability
    }
}

/// How a [`Draw`] produces its value.
#[derive(Debug, Clone, PartialEq)]
pub enum Sampler {
    /// Integer uniform over `low..=high`.
    IntRange { low: i64, high: i64 },
    /// One of these strings, uniformly.
    Choice(Vec<String>),
}

/// A per-execution random value stored into the session under `name`.
#[derive(Debug, Clone, PartialEq)]
pub struct Draw {
    pub name: String,
    pub sampler: Sampler,
}

impl Draw {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Value> {
        match &self.sampler {
            Sampler::IntRange { low, high } if low <= high => {
                Some(Value::from(rng.random_range(*low..=*high)))
            }
            Sampler::IntRange { .. } => None,
            Sampler::Choice(options) => options.choose(rng).cloned().map(Value::String),
        }
    }
}

/// Why a flow ended in `Aborted`.
#[derive(Debug, Clone, PartialEq)]
pub enum AbortReason {
    Unauthenticated,
    StepFailed { step: String, failure: Failure },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlowState {
    NotStarted,
    /// Index of the next step to run.
    Running(usize),
    /// Carries the name of the gate that closed, if one did.
    Completed(Option<String>),
    Aborted(AbortReason),
}

/// Terminal result of one flow execution.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowOutcome {
    Completed {
        flow: String,
        stopped_at: Option<String>,
        steps: usize,
    },
    Aborted {
        flow: String,
        reason: AbortReason,
        steps: usize,
    },
}

impl FlowOutcome {
    pub fn flow(&self) -> &str {
        match self {
            FlowOutcome::Completed { flow, .. } | FlowOutcome::Aborted { flow, .. } => flow,
        }
    }

    /// Number of steps that were actually executed.
    pub fn steps(&self) -> usize {
        match self {
            FlowOutcome::Completed { steps, .. } | FlowOutcome::Aborted { steps, .. } => *steps,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, FlowOutcome::Completed { .. })
    }
}

/// One named user journey. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Flow {
    pub name: String,
    pub weight: u32,
    pub requirement: AuthRequirement,
    pub steps: Vec<FunnelStep>,
    /// Keyed by the index of the step the gate sits in front of.
    pub gates: BTreeMap<usize, Gate>,
    pub draws: Vec<Draw>,
}

impl Flow {
    pub fn builder(name: impl Into<String>) -> FlowBuilder {
        FlowBuilder {
            name: name.into(),
            weight: 1,
            requirement: AuthRequirement::None,
            steps: Vec::new(),
            gates: BTreeMap::new(),
            draws: Vec::new(),
        }
    }

    pub fn requires_auth(&self) -> bool {
        self.requirement == AuthRequirement::Required
    }

    /// Run the flow to a terminal state, emitting one [`StepMetric`] per
    /// executed step into `sink`.
    pub async fn execute<T, R, A>(
        &self,
        transport: &T,
        session: &mut SessionState,
        rng: &mut R,
        sink: &mut A,
    ) -> FlowOutcome
    where
        T: Transport,
        R: Rng + Send,
        A: Aggregate<Metric = StepMetric>,
    {
        let mut state = FlowState::NotStarted;
        let mut executed = 0;

        loop {
            state = match state {
                FlowState::NotStarted => {
                    if self.requires_auth() && !session.is_authenticated() {
                        FlowState::Aborted(AbortReason::Unauthenticated)
                    } else {
                        for draw in &self.draws {
                            if let Some(value) = draw.sample(rng) {
                                session.store(draw.name.clone(), value);
                            }
                        }
                        FlowState::Running(0)
                    }
                }
                FlowState::Running(i) if i >= self.steps.len() => FlowState::Completed(None),
                FlowState::Running(i) => {
                    match self.gates.get(&i) {
                        Some(gate) if !gate.passes(rng) => {
                            tracing::trace!(flow = %self.name, gate = %gate.name, "gate closed");
                            FlowState::Completed(Some(gate.name.clone()))
                        }
                        _ => {
                            let step = &self.steps[i];
                            let result = step.execute(transport, session, rng).await;
                            executed += 1;

                            let metric = StepMetric::new(&self.name, step, &result);
                            tracing::debug!(
                                flow = %metric.flow,
                                step = %metric.step,
                                status = ?metric.status,
                                latency_ms = metric.latency.as_millis() as u64,
                                success = metric.success,
                                "step finished"
                            );
                            sink.consume(&metric);

                            match result.outcome {
                                // No response at all ends the journey, even on a best-effort step
                                Err(failure)
                                    if step.load_bearing || matches!(failure, Failure::Transport(_)) =>
                                {
                                    FlowState::Aborted(AbortReason::StepFailed {
                                        step: step.name.clone(),
                                        failure,
                                    })
                                }
                                _ => FlowState::Running(i + 1),
                            }
                        }
                    }
                }
                FlowState::Completed(stopped_at) => {
                    tracing::debug!(flow = %self.name, ?stopped_at, steps = executed, "flow completed");
                    return FlowOutcome::Completed {
                        flow: self.name.clone(),
                        stopped_at,
                        steps: executed,
                    };
                }
                FlowState::Aborted(reason) => {
                    match &reason {
                        AbortReason::StepFailed { step, failure } => {
                            tracing::warn!(flow = %self.name, %step, %failure, "flow aborted")
                        }
                        AbortReason::Unauthenticated => {
                            tracing::debug!(flow = %self.name, "flow aborted: not logged in")
                        }
                    }
                    return FlowOutcome::Aborted {
                        flow: self.name.clone(),
                        reason,
                        steps: executed,
                    };
                }
            };
        }
    }
}

/// Builds a [`Flow`] in reading order: a gate added with [`FlowBuilder::gate`]
/// guards whichever step is added next.
#[derive(Debug, Clone)]
pub struct FlowBuilder {
    name: String,
    weight: u32,
    requirement: AuthRequirement,
    steps: Vec<FunnelStep>,
    gates: BTreeMap<usize, Gate>,
    draws: Vec<Draw>,
}

impl FlowBuilder {
    pub fn weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn requires_auth(mut self) -> Self {
        self.requirement = AuthRequirement::Required;
        self
    }

    pub fn step(mut self, step: FunnelStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn gate(mut self, name: impl Into<String>, probability: f64) -> Self {
        self.gates.insert(
            self.steps.len(),
            Gate {
                name: name.into(),
                probability,
            },
        );
        self
    }

    pub fn draw(mut self, name: impl Into<String>, sampler: Sampler) -> Self {
        self.draws.push(Draw {
            name: name.into(),
            sampler,
        });
        self
    }

    pub fn build(self) -> Result<Flow> {
        if self.weight == 0 {
            return Err(Error::config(format!("flow '{}' has zero weight", self.name)));
        }
        if self.steps.is_empty() {
            return Err(Error::config(format!("flow '{}' has no steps", self.name)));
        }
        for (at, gate) in &self.gates {
            if !(0.0..=1.0).contains(&gate.probability) {
                return Err(Error::config(format!(
                    "gate '{}' of flow '{}' has probability {} outside [0, 1]",
                    gate.name, self.name, gate.probability
                )));
            }
            if *at >= self.steps.len() {
                return Err(Error::config(format!(
                    "gate '{}' of flow '{}' guards no step",
                    gate.name, self.name
                )));
            }
        }

        Ok(Flow {
            name: self.name,
            weight: self.weight,
            requirement: self.requirement,
            steps: self.steps,
            gates: self.gates,
            draws: self.draws,
        })
    }
}
