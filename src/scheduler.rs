use rand::{
    Rng,
    distr::{Distribution, weighted::WeightedIndex},
};

use crate::{
    error::{Error, Result},
    flow::Flow,
    session::SessionState,
};

/// Weighted choice between flows over a subset of the registered flows.
#[derive(Debug, Clone)]
struct Picker {
    indices: Vec<usize>,
    dist: WeightedIndex<u32>,
}

impl Picker {
    fn over(flows: &[Flow], indices: Vec<usize>) -> Result<Option<Self>> {
        if indices.is_empty() {
            return Ok(None);
        }
        let weights: Vec<u32> = indices.iter().map(|&i| flows[i].weight).collect();
        let dist = WeightedIndex::new(&weights)
            .map_err(|e| Error::config(format!("failed to build weighted distribution: {e}")))?;
        Ok(Some(Self { indices, dist }))
    }

    fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        self.indices[self.dist.sample(rng)]
    }
}

/// Picks the next flow a session runs.
///
/// Each call is an independent weighted draw (`weight / sum(weights)`) over
/// the flows the session is eligible for. There is no memory between calls
/// and no fairness: a session may well pick the same flow forever.
///
/// With the eligibility filter on (the default), flows that require
/// authentication are simply not candidates for an anonymous session. With it
/// off they stay in the draw and the flow's own runtime check aborts them.
#[derive(Debug, Clone)]
pub struct TaskScheduler {
    flows: Vec<Flow>,
    everyone: Picker,
    anonymous: Option<Picker>,
    eligibility_filter: bool,
}

impl TaskScheduler {
    pub fn new(flows: Vec<Flow>) -> Result<Self> {
        if let Some(flow) = flows.iter().find(|f| f.weight == 0) {
            return Err(Error::config(format!("flow '{}' has zero weight", flow.name)));
        }

        let everyone = Picker::over(&flows, (0..flows.len()).collect())?
            .ok_or_else(|| Error::config("scheduler needs at least one flow"))?;
        let anonymous = Picker::over(
            &flows,
            flows
                .iter()
                .enumerate()
                .filter(|(_, f)| !f.requires_auth())
                .map(|(i, _)| i)
                .collect(),
        )?;

        Ok(Self {
            flows,
            everyone,
            anonymous,
            eligibility_filter: true,
        })
    }

    /// Whether auth-required flows are excluded up front for anonymous
    /// sessions.
    pub fn eligibility_filter(mut self, enabled: bool) -> Self {
        self.eligibility_filter = enabled;
        self
    }

    pub fn flows(&self) -> &[Flow] {
        &self.flows
    }

    /// `None` only when the session is anonymous, the filter is on, and every
    /// flow requires authentication.
    pub fn next<R: Rng + ?Sized>(&self, session: &SessionState, rng: &mut R) -> Option<&Flow> {
        let picker = if session.is_authenticated() || !self.eligibility_filter {
            &self.everyone
        } else {
            self.anonymous.as_ref()?
        };
        Some(&self.flows[picker.pick(rng)])
    }
}
