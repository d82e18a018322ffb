//! Shopload: a virtual-user load generator for web storefronts.
//!
//! Shopload produces a statistically shaped mix of shopper journeys
//! (anonymous browsing, registration and login, wishlist management,
//! checkout, post-purchase reviews) so a storefront sees traffic that looks
//! like its production population rather than uniform hits on one URL.
//!
//! # Architecture
//!
//! The core is the behavior engine. It decides *what* a session does next
//! and *whether* a response was acceptable:
//!
//! - [`FunnelStep`]: one named HTTP interaction. Path and payload are
//!   templates over the session state; a step may extract a value from its
//!   response for later steps.
//! - [`Flow`]: an ordered journey of steps with probability gates, per-run
//!   random draws and an optional authentication requirement.
//! - [`TaskScheduler`]: memoryless weighted choice of the next flow.
//! - [`VirtualUser`]: one identity, one auth state, one cookie jar, looping
//!   over scheduler picks with think time in between.
//! - [`Scenario`]: the immutable glue shared by every session.
//!
//! Around the core sits a small harness, built from replaceable pieces:
//!
//! - [`Transport`]: the network seam. [`HttpTransport`] is the reqwest-backed
//!   implementation.
//! - [`Executor`]: spawns and stops sessions. [`Population`] grows a fixed
//!   number of users at a fixed spawn rate for a fixed time.
//! - [`Metric`] / [`Aggregate`] / [`Report`] / [`Reporter`]: every executed
//!   step emits a [`StepMetric`], sessions fold them into a
//!   [`FunnelAggregate`], the executor merges those, and a [`FunnelReport`]
//!   is printed or written as JSON.
//!
//! # Where to start
//!
//! [`storefront::scenario`] builds the full storefront scenario from a
//! [`StorefrontProfile`]; read it alongside [`Flow`] and [`FunnelStep`].

extern crate self as shopload;

/// Metric aggregators
pub mod aggregate;
/// Storefront traffic profile
pub mod config;
pub mod error;
/// Orchestrators that define how sessions actually run
pub mod executor;
pub mod flow;
pub mod identity;
/// Single metrics
pub mod metric;
/// Reports and Reporters
pub mod report;
/// Glue between scheduler, onboarding, identities and think time
pub mod scenario;
pub mod scheduler;
pub mod session;
pub mod step;
pub mod storefront;
pub mod template;
pub mod transport;
pub mod validator;

/// Attribute macros deriving the traits reporting types need.
pub mod macros {
    pub use shopload_macros::*;
}

pub use aggregate::{Aggregate, FunnelAggregate};
pub use config::{AuthGating, StorefrontProfile};
pub use error::{Error, Failure, Result};
pub use executor::{Executor, Population};
pub use flow::{Flow, FlowOutcome, Sampler};
pub use identity::{Identity, IdentityGenerator};
pub use metric::{Metric, StepMetric};
pub use report::{FunnelReport, JsonReporter, Report, Reporter, StdoutReporter};
pub use scenario::Scenario;
pub use scheduler::TaskScheduler;
pub use session::{SessionState, ThinkTime, VirtualUser};
pub use step::{Extract, Fallback, FunnelStep};
pub use transport::{HttpTransport, Method, Transport};
