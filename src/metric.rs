use std::{fmt::Debug, time::Duration};

use serde::{Serialize, de::DeserializeOwned};

use crate::{
    macros::metric,
    step::{FunnelStep, StepResult},
};

/// A `Metric` is a single observation produced while traffic is generated.
///
/// Metrics are the most granular level of data: one sample per executed
/// funnel step. They are collected and summarized by an [`crate::Aggregate`],
/// then turned into statistics by a [`crate::Report`] and written out by a
/// [`crate::Reporter`]. The engine itself never aggregates, it only emits.
///
/// ## Design principles
/// - **Plain data:** a metric is serializable and comparable, nothing more.
/// - **Thread-safe and clonable:** sessions run on any worker thread.
///
/// Use the [`metric`](crate::macros::metric) attribute to derive everything
/// at once:
///
/// ```rust
/// use shopload::macros::metric;
///
/// #[metric]
/// struct Ping {
///     micros: u64,
/// }
/// ```
pub trait Metric
where
    Self: Serialize + DeserializeOwned + PartialOrd + PartialEq + Send + Sync + Debug + Clone,
{
}

/// The outcome record of one executed funnel step.
#[metric]
pub struct StepMetric {
    pub flow: String,
    pub step: String,
    /// `None` when no response was received.
    pub status: Option<u16>,
    pub latency: Duration,
    pub success: bool,
    pub error: Option<String>,
    /// `false` when the step never produced a request.
    pub sent: bool,
}

impl StepMetric {
    pub fn new(flow: &str, step: &FunnelStep, result: &StepResult) -> Self {
        Self {
            flow: flow.to_string(),
            step: step.name.clone(),
            status: result.status,
            latency: result.latency,
            success: result.is_success(),
            error: result.outcome.as_ref().err().map(ToString::to_string),
            sent: result.sent,
        }
    }
}
