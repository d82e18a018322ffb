use std::{collections::BTreeMap, fmt::Debug, time::Duration};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    Metric,
    macros::aggregate,
    metric::StepMetric,
};

/// The `Aggregate` trait defines how raw [`Metric`] values are collected and
/// combined into an intermediate, mergeable representation.
///
/// Aggregates are the reporting collaborator's side of the seam: sessions
/// push one metric per executed step into a session-local aggregate, and the
/// executor merges every session's aggregate once the run is over. Final
/// statistics (averages, ratios) belong in a [`crate::Report`], not here.
///
/// # Implementor notes
/// - `merge` must be **associative** and **commutative**; session aggregates
///   are merged in whatever order the sessions finish.
/// - Keep `consume` cheap, it runs after every request.
pub trait Aggregate
where
    Self: Serialize + DeserializeOwned + PartialOrd + PartialEq + Send + Sync + Debug + Clone,
{
    /// The metric type this aggregate summarizes.
    type Metric: Metric;

    /// Create a new, empty instance of the aggregate.
    fn new() -> Self;

    /// Aggregate multiple metrics into the current instance.
    fn aggregate(&mut self, metrics: &[Self::Metric]) {
        metrics.iter().for_each(|m| self.consume(m));
    }

    /// Incorporate a single metric into the aggregate.
    fn consume(&mut self, metric: &Self::Metric);

    /// Combine two different aggregates into one.
    fn merge(&mut self, other: Self);
}

/// Raw counters for one step of one flow.
#[derive(Serialize, Deserialize, PartialOrd, PartialEq, Debug, Clone, Default)]
pub struct StepTally {
    /// Requests actually sent.
    pub count: usize,
    /// Steps that failed before a request could be built. Not part of
    /// `count`, `failures` or the latencies.
    pub unsent: usize,
    pub failures: usize,
    pub total_latency: Duration,
    pub max_latency: Duration,
    /// Responses by status code. Transport failures have no status.
    pub statuses: BTreeMap<u16, usize>,
}

impl StepTally {
    fn consume(&mut self, metric: &StepMetric) {
        if !metric.sent {
            self.unsent += 1;
            return;
        }
        self.count += 1;
        self.failures += usize::from(!metric.success);
        self.total_latency += metric.latency;
        self.max_latency = self.max_latency.max(metric.latency);
        if let Some(status) = metric.status {
            *self.statuses.entry(status).or_default() += 1;
        }
    }

    fn merge(&mut self, other: StepTally) {
        self.count += other.count;
        self.unsent += other.unsent;
        self.failures += other.failures;
        self.total_latency += other.total_latency;
        self.max_latency = self.max_latency.max(other.max_latency);
        for (status, n) in other.statuses {
            *self.statuses.entry(status).or_default() += n;
        }
    }
}

/// Per-flow, per-step tallies of [`StepMetric`]s.
#[aggregate]
pub struct FunnelAggregate {
    /// flow name -> step name -> tally
    pub flows: BTreeMap<String, BTreeMap<String, StepTally>>,
}

impl FunnelAggregate {
    pub fn tally(&self, flow: &str, step: &str) -> Option<&StepTally> {
        self.flows.get(flow)?.get(step)
    }

    pub fn total_requests(&self) -> usize {
        self.tallies().map(|t| t.count).sum()
    }

    pub fn total_failures(&self) -> usize {
        self.tallies().map(|t| t.failures).sum()
    }

    pub fn total_unsent(&self) -> usize {
        self.tallies().map(|t| t.unsent).sum()
    }

    fn tallies(&self) -> impl Iterator<Item = &StepTally> {
        self.flows.values().flat_map(|steps| steps.values())
    }
}

impl Aggregate for FunnelAggregate {
    type Metric = StepMetric;

    fn new() -> Self {
        FunnelAggregate::default()
    }

    fn consume(&mut self, metric: &Self::Metric) {
        self.flows
            .entry(metric.flow.clone())
            .or_default()
            .entry(metric.step.clone())
            .or_default()
            .consume(metric);
    }

    fn merge(&mut self, other: Self) {
        for (flow, steps) in other.flows {
            let ours = self.flows.entry(flow).or_default();
            for (step, tally) in steps {
                ours.entry(step).or_default().merge(tally);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(flow: &str, step: &str, status: Option<u16>, ms: u64, success: bool) -> StepMetric {
        StepMetric {
            flow: flow.into(),
            step: step.into(),
            status,
            latency: Duration::from_millis(ms),
            success,
            error: None,
            sent: true,
        }
    }

    #[test]
    fn consume_tallies_by_flow_and_step() {
        let mut agg = FunnelAggregate::new();
        agg.aggregate(&[
            metric("browse", "dashboard", Some(200), 10, true),
            metric("browse", "dashboard", Some(500), 30, false),
            metric("browse", "list_products", None, 5, false),
        ]);

        let dashboard = agg.tally("browse", "dashboard").unwrap();
        assert_eq!(dashboard.count, 2);
        assert_eq!(dashboard.failures, 1);
        assert_eq!(dashboard.total_latency, Duration::from_millis(40));
        assert_eq!(dashboard.max_latency, Duration::from_millis(30));
        assert_eq!(dashboard.statuses.get(&500), Some(&1));

        let products = agg.tally("browse", "list_products").unwrap();
        assert!(products.statuses.is_empty());
        assert_eq!(agg.total_requests(), 3);
        assert_eq!(agg.total_failures(), 2);
    }

    #[test]
    fn unsent_steps_are_not_requests() {
        let mut agg = FunnelAggregate::new();
        agg.aggregate(&[
            metric("purchase", "view_invoice", Some(200), 10, true),
            StepMetric {
                sent: false,
                status: None,
                latency: Duration::ZERO,
                error: Some("no value extracted for 'invoiceId'".into()),
                ..metric("purchase", "view_invoice", None, 0, false)
            },
        ]);

        let invoice = agg.tally("purchase", "view_invoice").unwrap();
        assert_eq!(invoice.count, 1);
        assert_eq!(invoice.unsent, 1);
        assert_eq!(invoice.failures, 0);
        assert_eq!(agg.total_requests(), 1);
        assert_eq!(agg.total_unsent(), 1);

        let mut merged = FunnelAggregate::new();
        merged.merge(agg.clone());
        merged.merge(agg);
        assert_eq!(merged.total_unsent(), 2);
        assert_eq!(merged.total_requests(), 2);
    }

    #[test]
    fn default_is_the_empty_aggregate() {
        assert_eq!(FunnelAggregate::default(), FunnelAggregate::new());
        assert_eq!(FunnelAggregate::default().total_requests(), 0);
    }

    #[test]
    fn merge_is_order_independent() {
        let a_metrics = [
            metric("browse", "dashboard", Some(200), 10, true),
            metric("purchase", "payment_api", Some(402), 50, false),
        ];
        let b_metrics = [metric("browse", "dashboard", Some(200), 20, true)];

        let mut a = FunnelAggregate::new();
        a.aggregate(&a_metrics);
        let mut b = FunnelAggregate::new();
        b.aggregate(&b_metrics);

        let mut ab = a.clone();
        ab.merge(b.clone());
        let mut ba = b;
        ba.merge(a);

        assert_eq!(ab, ba);
        assert_eq!(ab.tally("browse", "dashboard").unwrap().count, 2);
        assert_eq!(ab.total_failures(), 1);
    }
}
