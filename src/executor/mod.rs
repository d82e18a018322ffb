//! Executor: orchestration of a whole run.
//!
//! The `Executor` trait is the runtime that turns a [`Scenario`] into a set of
//! live sessions and, eventually, a merged [`Aggregate`]. Shopload ships
//! [`Population`], which spawns a fixed number of virtual users at a given
//! spawn rate and keeps them running for a fixed wall-clock time.
pub mod population;
pub use population::Population;

use std::{future::Future, sync::Arc};

use crate::{
    aggregate::Aggregate, error::Result, metric::StepMetric, scenario::Scenario,
    transport::Transport,
};

/// The runtime hook that executes a `Scenario`.
///
/// Every session gets its own transport from `transports`, called with the
/// session id. Transports are never shared, so cookies and connection state
/// stay per user.
pub trait Executor<A>
where
    Self: Send + Sync + Sized,
    A: Aggregate<Metric = StepMetric> + 'static,
{
    type Error;

    /// Run the scenario to the end and return the merged aggregate of every
    /// session.
    fn exec<T, F>(
        &self,
        scenario: Arc<Scenario>,
        transports: F,
    ) -> impl Future<Output = std::result::Result<A, Self::Error>> + Send
    where
        T: Transport + 'static,
        F: Fn(usize) -> Result<T> + Send + Sync;
}
