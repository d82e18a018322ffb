//! A single funnel interaction.
//!
//! A [`FunnelStep`] is declarative: a method, templates for path and body,
//! the statuses it accepts, and optionally a rule for pulling a value out of
//! the response so later steps can reference it. Executing a step never
//! panics or returns early with `?` across the flow: whatever happens ends up
//! in the [`StepResult`].

use std::time::{Duration, Instant};

use rand::{Rng, seq::IndexedRandom};
use serde_json::{Value, json};

use crate::{
    error::Failure,
    session::SessionState,
    template,
    transport::{Method, Transport},
    validator::{self, AcceptedStatus, Outcome, Payload},
};

/// How to pull a value out of a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum Extract {
    /// The whole body.
    Payload,
    /// The first of these object fields that is present and not `null`.
    Field(Vec<String>),
    /// A uniformly chosen element of an array body.
    RandomElement,
    /// A uniformly chosen array element among those whose field is present
    /// and not `null`. Elements a later template could not address are never
    /// picked.
    RandomElementWith(String),
}

impl Extract {
    pub fn field(name: impl Into<String>) -> Self {
        Extract::Field(vec![name.into()])
    }

    pub fn random_element_with(field: impl Into<String>) -> Self {
        Extract::RandomElementWith(field.into())
    }

    pub fn first_of<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Extract::Field(names.into_iter().map(Into::into).collect())
    }

    pub fn apply<R: Rng + ?Sized>(&self, payload: &Payload, rng: &mut R) -> Option<Value> {
        match self {
            Extract::Payload => match payload {
                Payload::Json(value) => Some(value.clone()),
                Payload::Raw(bytes) => Some(Value::String(String::from_utf8_lossy(bytes).into_owned())),
            },
            Extract::Field(names) => {
                let body = payload.json()?;
                names
                    .iter()
                    .filter_map(|name| body.get(name))
                    .find(|value| !value.is_null())
                    .cloned()
            }
            Extract::RandomElement => match payload.json()? {
                Value::Array(items) => items.choose(rng).cloned(),
                _ => None,
            },
            Extract::RandomElementWith(field) => match payload.json()? {
                Value::Array(items) => {
                    let usable: Vec<&Value> = items
                        .iter()
                        .filter(|item| item.get(field).is_some_and(|value| !value.is_null()))
                        .collect();
                    usable.choose(rng).map(|item| (*item).clone())
                }
                _ => None,
            },
        }
    }
}

/// Value stored when a successful response has nothing to extract.
#[derive(Debug, Clone, PartialEq)]
pub enum Fallback {
    /// A stand-in catalog entry `{id: U[1, catalog_bound], price: 1}`.
    ///
    /// Keeps checkout traffic flowing against a catalog emptied by earlier
    /// runs instead of turning every purchase into a failure.
    SyntheticProduct { catalog_bound: u32 },
    Value(Value),
}

impl Fallback {
    pub fn resolve<R: Rng + ?Sized>(&self, rng: &mut R) -> Value {
        match self {
            Fallback::SyntheticProduct { catalog_bound } => {
                json!({ "id": rng.random_range(1..=(*catalog_bound).max(1)), "price": 1 })
            }
            Fallback::Value(value) => value.clone(),
        }
    }
}

/// A request ready to be sent. Two renders of the same step against the same
/// session state are equal.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

/// Everything the engine learned from executing a step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub outcome: Outcome,
    /// `None` when the request never got a response.
    pub status: Option<u16>,
    pub latency: Duration,
    /// `false` when the request could not be rendered and never left the
    /// session.
    pub sent: bool,
}

impl StepResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    fn unsent(failure: Failure) -> Self {
        Self {
            outcome: Err(failure),
            status: None,
            latency: Duration::ZERO,
            sent: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunnelStep {
    /// Label the step reports under.
    pub name: String,
    pub method: Method,
    pub path: String,
    pub payload: Option<Value>,
    pub accepted: AcceptedStatus,
    pub decode_json: bool,
    /// Where to store the extracted value, and how to extract it.
    pub response_name: Option<(String, Extract)>,
    pub fallback: Option<Fallback>,
    /// Later steps depend on this one; its failure aborts the flow.
    pub load_bearing: bool,
    /// Success marks the session as logged in.
    pub authenticates: bool,
}

impl FunnelStep {
    pub fn new(name: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method,
            path: path.into(),
            payload: None,
            accepted: AcceptedStatus::default(),
            decode_json: false,
            response_name: None,
            fallback: None,
            load_bearing: false,
            authenticates: false,
        }
    }

    pub fn get(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, Method::Get, path)
    }

    pub fn post(name: impl Into<String>, path: impl Into<String>, payload: Value) -> Self {
        Self::new(name, Method::Post, path).with_payload(payload)
    }

    pub fn delete(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, Method::Delete, path)
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Replace the expected status set.
    pub fn expect(mut self, statuses: impl Into<Vec<u16>>) -> Self {
        self.accepted.expected = statuses.into();
        self
    }

    /// Additional statuses this step accepts without counting a failure.
    pub fn tolerate(mut self, statuses: impl Into<Vec<u16>>) -> Self {
        self.accepted.tolerated = statuses.into();
        self
    }

    /// Require the body to be JSON.
    pub fn json(mut self) -> Self {
        self.decode_json = true;
        self
    }

    pub fn store(mut self, name: impl Into<String>, extract: Extract) -> Self {
        self.response_name = Some((name.into(), extract));
        self
    }

    pub fn or_fallback(mut self, fallback: Fallback) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn load_bearing(mut self) -> Self {
        self.load_bearing = true;
        self
    }

    pub fn authenticates(mut self) -> Self {
        self.authenticates = true;
        self
    }

    pub fn render(&self, state: &SessionState) -> Result<RenderedRequest, Failure> {
        let path = template::render_str(&self.path, state)?;
        let body = self
            .payload
            .as_ref()
            .map(|payload| template::render_value(payload, state))
            .transpose()?;

        Ok(RenderedRequest {
            method: self.method,
            path,
            body,
        })
    }

    pub async fn execute<T, R>(
        &self,
        transport: &T,
        state: &mut SessionState,
        rng: &mut R,
    ) -> StepResult
    where
        T: Transport,
        R: Rng + Send,
    {
        let request = match self.render(state) {
            Ok(request) => request,
            Err(failure) => return StepResult::unsent(failure),
        };

        let start = Instant::now();
        let response = transport
            .request(request.method, &request.path, request.body.as_ref())
            .await;
        let latency = start.elapsed();

        let response = match response {
            Ok(response) => response,
            Err(failure) => {
                return StepResult {
                    outcome: Err(failure),
                    status: None,
                    latency,
                    sent: true,
                };
            }
        };

        let outcome = validator::validate(&response, &self.accepted, self.decode_json);
        if let Ok(payload) = &outcome {
            self.absorb(payload, state, rng);
        }

        StepResult {
            outcome,
            status: Some(response.status),
            latency,
            sent: true,
        }
    }

    /// Apply the side effects of a successful response to the session.
    fn absorb<R: Rng + ?Sized>(&self, payload: &Payload, state: &mut SessionState, rng: &mut R) {
        if self.authenticates {
            state.mark_authenticated();
        }

        let Some((name, extract)) = &self.response_name else {
            return;
        };
        let value = extract
            .apply(payload, rng)
            .or_else(|| self.fallback.as_ref().map(|f| f.resolve(rng)));
        match value {
            Some(value) => state.store(name.clone(), value),
            // Stale values from an earlier iteration must not leak into this one
            None => state.forget(name),
        }
    }
}
