use std::{
    collections::BTreeMap,
    fmt::{self, Debug, Display},
    future::Future,
    path::PathBuf,
    time::Duration,
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{Aggregate, aggregate::FunnelAggregate};

/// A [`Report`] is the processed form of an [`Aggregate`].
///
/// Reports turn raw counters into final figures (averages, ratios, totals).
/// They are pure data: building one does no I/O, so the same aggregate can
/// feed several reports, and a report can be serialized, logged, or handed to
/// a [`Reporter`].
///
/// Implementors construct the report from the aggregate via [`From<A>`].
pub trait Report<A>
where
    Self: Send + Sync + Debug + From<A> + Serialize + DeserializeOwned,
    A: Aggregate,
{
}

/// A [`Reporter`] consumes a [`Report`] and performs the side effects:
/// printing it, writing it to a file, sending it somewhere.
///
/// # Example
/// ```rust
/// use shopload::{Aggregate, Report, Reporter};
/// struct DebugReporter;
/// impl<A: Aggregate, R: Report<A>> Reporter<A, R> for DebugReporter {
///     async fn report(&self, report: &R) -> Result<(), Box<dyn std::error::Error>> {
///         println!("{:?}", report);
///         Ok(())
///     }
/// }
/// ```
pub trait Reporter<A: Aggregate, R: Report<A>> {
    fn report(&self, report: &R) -> impl Future<Output = Result<(), Box<dyn std::error::Error>>>;
}

/// Final figures for one step of one flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRow {
    pub flow: String,
    pub step: String,
    pub requests: usize,
    pub failures: usize,
    /// Steps skipped because their request could not be built.
    pub unsent: usize,
    /// In `[0, 1]`.
    pub failure_rate: f64,
    pub avg_latency: Duration,
    pub max_latency: Duration,
    pub statuses: BTreeMap<u16, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelReport {
    pub rows: Vec<StepRow>,
    pub total_requests: usize,
    pub total_failures: usize,
    pub total_unsent: usize,
}

impl From<FunnelAggregate> for FunnelReport {
    fn from(agg: FunnelAggregate) -> Self {
        let total_requests = agg.total_requests();
        let total_failures = agg.total_failures();
        let total_unsent = agg.total_unsent();

        let rows = agg
            .flows
            .into_iter()
            .flat_map(|(flow, steps)| {
                steps.into_iter().map(move |(step, t)| StepRow {
                    flow: flow.clone(),
                    step,
                    requests: t.count,
                    failures: t.failures,
                    unsent: t.unsent,
                    failure_rate: ratio(t.failures, t.count),
                    avg_latency: average(t.total_latency, t.count),
                    max_latency: t.max_latency,
                    statuses: t.statuses,
                })
            })
            .collect();

        Self {
            rows,
            total_requests,
            total_failures,
            total_unsent,
        }
    }
}

impl Report<FunnelAggregate> for FunnelReport {}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn average(total: Duration, count: usize) -> Duration {
    match u32::try_from(count) {
        Ok(0) => Duration::ZERO,
        Ok(n) => total / n,
        Err(_) => Duration::from_secs_f64(total.as_secs_f64() / count as f64),
    }
}

impl Display for FunnelReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<12} {:<16} {:>8} {:>8} {:>7} {:>9} {:>9} {:>7}  statuses",
            "flow", "step", "reqs", "fails", "fail%", "avg(ms)", "max(ms)", "unsent"
        )?;
        for row in &self.rows {
            let statuses = row
                .statuses
                .iter()
                .map(|(code, n)| format!("{code}:{n}"))
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(
                f,
                "{:<12} {:<16} {:>8} {:>8} {:>6.2}% {:>9.1} {:>9.1} {:>7}  {}",
                row.flow,
                row.step,
                row.requests,
                row.failures,
                row.failure_rate * 100.0,
                row.avg_latency.as_secs_f64() * 1000.0,
                row.max_latency.as_secs_f64() * 1000.0,
                row.unsent,
                statuses
            )?;
        }
        write!(
            f,
            "total: {} requests, {} failures ({:.2}%)",
            self.total_requests,
            self.total_failures,
            ratio(self.total_failures, self.total_requests) * 100.0
        )?;
        if self.total_unsent > 0 {
            write!(f, ", {} steps not sent", self.total_unsent)?;
        }
        Ok(())
    }
}

/// Prints the report as a table on stdout.
pub struct StdoutReporter;

impl Reporter<FunnelAggregate, FunnelReport> for StdoutReporter {
    async fn report(&self, report: &FunnelReport) -> Result<(), Box<dyn std::error::Error>> {
        println!("{report}");
        Ok(())
    }
}

/// Writes any report as pretty JSON, to a file or to stdout.
#[derive(Debug, Default)]
pub struct JsonReporter {
    pub path: Option<PathBuf>,
}

impl<A: Aggregate, R: Report<A>> Reporter<A, R> for JsonReporter {
    async fn report(&self, report: &R) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string_pretty(report)?;
        match &self.path {
            Some(path) => std::fs::write(path, json)?,
            None => println!("{json}"),
        }
        Ok(())
    }
}
