//! Virtual users.
//!
//! A [`VirtualUser`] is one simulated visitor: it owns an identity, its own
//! transport (and with it its own cookies), its own RNG and the
//! [`SessionState`] its flows read and write. Nothing here is shared between
//! sessions, which is why none of it needs a lock.
//!
//! Lifecycle: `Initializing` (identity, optional onboarding) → `Active`
//! (scheduler pick, flow, think time, repeat) → `Terminated`. Termination is
//! only observed between iterations, so a flow always reaches one of its
//! terminal states.

use std::{collections::HashMap, sync::Arc, time::Duration};

use rand::{Rng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch::Receiver;

use crate::{
    aggregate::Aggregate,
    flow::FlowOutcome,
    identity::Identity,
    metric::StepMetric,
    scenario::Scenario,
    transport::Transport,
};

/// Per-session mutable state.
///
/// `authenticated` can only ever go from `false` to `true`; there is no
/// logout.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    identity: Identity,
    authenticated: bool,
    values: HashMap<String, Value>,
}

impl SessionState {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            authenticated: false,
            values: HashMap::new(),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn mark_authenticated(&mut self) {
        self.authenticated = true;
    }

    /// A value extracted (or drawn) earlier in this session.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Store a value, overwriting any previous one under the same name.
    pub fn store(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn forget(&mut self, name: &str) {
        self.values.remove(name);
    }
}

/// Pause between iterations, uniform over `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThinkTime {
    pub min: Duration,
    pub max: Duration,
}

impl Default for ThinkTime {
    fn default() -> Self {
        Self::between(Duration::from_secs(1), Duration::from_secs(3))
    }
}

impl ThinkTime {
    pub fn between(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub fn none() -> Self {
        Self::between(Duration::ZERO, Duration::ZERO)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        Duration::from_secs_f64(rng.random_range(self.min.as_secs_f64()..=self.max.as_secs_f64()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Initializing,
    Active,
    Terminated,
}

pub struct VirtualUser<T> {
    id: usize,
    transport: T,
    state: SessionState,
    rng: StdRng,
    phase: SessionPhase,
    iterations: u64,
}

impl<T: Transport> VirtualUser<T> {
    /// Creates the session and draws its identity.
    pub fn new(id: usize, transport: T, scenario: &Scenario, mut rng: StdRng) -> Self {
        let identity = scenario.identity.generate(&mut rng);
        Self {
            id,
            transport,
            state: SessionState::new(identity),
            rng,
            phase: SessionPhase::Initializing,
            iterations: 0,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Runs the onboarding flow, if the scenario has one, and moves the
    /// session to `Active`. Authentication is granted by the onboarding
    /// flow's login step and nothing else.
    pub async fn initialize<A>(&mut self, scenario: &Scenario, sink: &mut A) -> Option<FlowOutcome>
    where
        A: Aggregate<Metric = StepMetric>,
    {
        if self.phase != SessionPhase::Initializing {
            return None;
        }

        let outcome = match &scenario.onboarding {
            Some(onboarding) => Some(
                onboarding
                    .execute(&self.transport, &mut self.state, &mut self.rng, sink)
                    .await,
            ),
            None => None,
        };

        tracing::debug!(
            user = self.id,
            email = %self.state.identity().email,
            authenticated = self.state.is_authenticated(),
            "session initialized"
        );
        self.phase = SessionPhase::Active;
        outcome
    }

    /// One iteration: pick a flow and run it to completion.
    ///
    /// Returns `None` when no flow is eligible for this session, or when the
    /// session is not `Active`.
    pub async fn iterate<A>(&mut self, scenario: &Scenario, sink: &mut A) -> Option<FlowOutcome>
    where
        A: Aggregate<Metric = StepMetric>,
    {
        if self.phase != SessionPhase::Active {
            return None;
        }

        let flow = scenario.scheduler.next(&self.state, &mut self.rng)?;
        let outcome = flow
            .execute(&self.transport, &mut self.state, &mut self.rng, sink)
            .await;
        self.iterations += 1;

        if let FlowOutcome::Aborted { flow, reason, .. } = &outcome {
            tracing::debug!(user = self.id, %flow, ?reason, "iteration ended early");
        }
        Some(outcome)
    }

    pub fn terminate(&mut self) {
        self.phase = SessionPhase::Terminated;
    }

    /// Drives the whole lifecycle until `shutdown` flips to `true` (or its
    /// sender goes away) and returns everything the session recorded.
    pub async fn run<A>(mut self, scenario: Arc<Scenario>, mut shutdown: Receiver<bool>) -> A
    where
        A: Aggregate<Metric = StepMetric>,
    {
        let mut agg = A::new();
        self.initialize(&scenario, &mut agg).await;

        loop {
            let stopped = *shutdown.borrow();
            if stopped {
                break;
            }

            if self.iterate(&scenario, &mut agg).await.is_none() {
                tracing::trace!(user = self.id, "no eligible flow this iteration");
            }

            let pause = scenario.think_time.sample(&mut self.rng);
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown.wait_for(|stop| *stop) => break,
            }
        }

        self.terminate();
        tracing::debug!(user = self.id, iterations = self.iterations, "session terminated");
        agg
    }
}
