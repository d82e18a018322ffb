//! The `Population` executor: a fixed number of virtual users, spawned at a
//! constant rate, kept alive for a fixed run time.
//!
//! # High-level flow
//! 1. A `watch` channel is created to broadcast shutdown to every session.
//! 2. Every `tick`, the spawner works out how many new sessions are due and
//!    starts them, each as its own task holding its own transport, RNG and
//!    aggregate.
//! 3. Spawning stops once `users` sessions exist or the run time is over,
//!    whichever comes first.
//! 4. When `run_time` has elapsed since the start, shutdown is signalled.
//!    Sessions finish the iteration they are in, then hand back their
//!    aggregates, which are merged into the final result.
//!
//! # Spawn arithmetic
//! Spawning is quantized to ticks with a fractional carry, so the long-term
//! spawn rate is exact even when `spawn_rate * tick` is not an integer:
//!
//! ```text
//! due = spawn_rate * tick_seconds + fractional
//! spawn = floor(due)
//! fractional = due - spawn
//! ```

use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use rand::{SeedableRng, rngs::StdRng};
use tokio::{
    sync::watch::{self, Sender},
    task::JoinHandle,
    time::Instant,
};
use tracing::Instrument;
use typed_builder::TypedBuilder;

use super::Executor;
use crate::{
    aggregate::Aggregate,
    error::{Error, Result},
    metric::StepMetric,
    scenario::Scenario,
    session::VirtualUser,
    transport::Transport,
};

/// Executor that grows a population of virtual users and runs it for a fixed
/// time.
///
/// # Tuning knobs
/// - `tick`: granularity of the spawner. Smaller ticks spread arrivals more
///   evenly at the cost of more wakeups.
/// - `seed`: when set, session `i` gets an RNG seeded with `seed + i`, which
///   makes identities and flow choices reproducible across runs.
#[derive(Debug, Clone, TypedBuilder)]
pub struct Population {
    /// Number of concurrent sessions to reach.
    pub users: usize,
    /// Sessions started per second.
    pub spawn_rate: f64,
    /// Wall-clock duration of the run, measured from the first spawn.
    pub run_time: Duration,
    #[builder(default = Duration::from_millis(100))]
    pub tick: Duration,
    #[builder(default)]
    pub seed: Option<u64>,
}

impl Population {
    fn validate(&self) -> Result<()> {
        if self.users == 0 {
            return Err(Error::config("population needs at least one user"));
        }
        if !(self.spawn_rate.is_finite() && self.spawn_rate > 0.0) {
            return Err(Error::config(format!(
                "spawn rate must be a positive number, got {}",
                self.spawn_rate
            )));
        }
        if self.tick.is_zero() {
            return Err(Error::config("tick must be non-zero"));
        }
        Ok(())
    }

    fn rng_for(&self, id: usize) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id as u64)),
            None => StdRng::from_rng(&mut rand::rng()),
        }
    }
}

impl<A> Executor<A> for Population
where
    A: Aggregate<Metric = StepMetric> + 'static,
{
    type Error = Error;

    async fn exec<T, F>(&self, scenario: Arc<Scenario>, transports: F) -> Result<A>
    where
        T: Transport + 'static,
        F: Fn(usize) -> Result<T> + Send + Sync,
    {
        self.validate()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles: Vec<JoinHandle<A>> = Vec::with_capacity(self.users);
        let mut fractional = 0.0;

        let started = Instant::now();
        let deadline = started + self.run_time;
        let mut next_tick = started;

        tracing::info!(
            "Running scenario: {} ({} users at {}/s for {:?})",
            scenario.name,
            self.users,
            self.spawn_rate,
            self.run_time
        );

        while handles.len() < self.users && Instant::now() < deadline {
            next_tick += self.tick;

            let (due, f) = calc_spawn_count(self.spawn_rate, self.tick, fractional);
            fractional = f;

            for _ in 0..due.min(self.users - handles.len()) {
                let id = handles.len();
                let transport = match transports(id) {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::error!("Failed to create transport for user {id}: {e}");
                        stop(&shutdown_tx)?;
                        collect(handles).await;
                        return Err(e);
                    }
                };

                let user = VirtualUser::new(id, transport, &scenario, self.rng_for(id));
                let session = user
                    .run::<A>(scenario.clone(), shutdown_rx.clone())
                    .instrument(tracing::info_span!("session", user = id));
                handles.push(tokio::spawn(session));
            }

            tokio::time::sleep_until(next_tick.min(deadline)).await;
        }
        tracing::info!("{} users spawned in {:?}", handles.len(), started.elapsed());

        tokio::time::sleep_until(deadline).await;
        tracing::info!("Run time elapsed, signaling shutdown...");
        stop(&shutdown_tx)?;

        tracing::info!("Retrieving data from sessions...");
        let agg = collect(handles).await;

        tracing::info!("Done running scenario: {}!", scenario.name);
        Ok(agg)
    }
}

fn stop(shutdown: &Sender<bool>) -> Result<()> {
    // Every session holds a receiver until it returns, so an error here means
    // nobody is listening any more.
    shutdown.send(true).map_err(|_| Error::Shutdown)
}

/// Joins every session and merges what they recorded. A panicked session
/// contributes an empty aggregate rather than sinking the whole run.
async fn collect<A: Aggregate + 'static>(handles: Vec<JoinHandle<A>>) -> A {
    let mut final_agg = A::new();
    for res in join_all(handles).await {
        match res {
            Ok(agg) => final_agg.merge(agg),
            Err(e) => tracing::error!("Session panicked with error: {e}"),
        }
    }
    final_agg
}

/// Pure function computing how many sessions to start this tick.
///
/// Carries the fractional remainder into the next tick so the long-term
/// average matches `spawn_rate`.
///
/// Returns `(sessions_to_spawn, next_fractional_part)`.
pub fn calc_spawn_count(spawn_rate: f64, tick: Duration, fractional: f64) -> (usize, f64) {
    let due = spawn_rate * tick.as_secs_f64() + fractional;
    let spawn = due.floor();
    let fractional = due - spawn;

    let spawn = if spawn >= usize::MAX as f64 {
        usize::MAX
    } else if spawn < 0.0 {
        0
    } else {
        spawn as usize
    };

    (spawn, fractional)
}
