use typed_builder::TypedBuilder;

use crate::{
    flow::Flow, identity::IdentityGenerator, scheduler::TaskScheduler, session::ThinkTime,
};

/// Everything a virtual user needs to know about the traffic it generates.
///
/// A scenario is read-only once built and is shared by all sessions of a run
/// behind an `Arc`.
///
/// ```rust
/// use shopload::{Flow, FunnelStep, Scenario, TaskScheduler, ThinkTime};
///
/// let scenario = Scenario::builder()
///     .name("smoke")
///     .scheduler(
///         TaskScheduler::new(vec![
///             Flow::builder("dashboard")
///                 .step(FunnelStep::get("dashboard", "/"))
///                 .build()
///                 .unwrap(),
///         ])
///         .unwrap(),
///     )
///     .think_time(ThinkTime::none())
///     .build();
/// assert!(scenario.onboarding.is_none());
/// ```
#[derive(Debug, Clone, TypedBuilder)]
pub struct Scenario {
    #[builder(setter(into))]
    pub name: String,
    pub scheduler: TaskScheduler,
    /// Runs once per session before the scheduler takes over. Never
    /// registered with the scheduler.
    #[builder(default, setter(strip_option))]
    pub onboarding: Option<Flow>,
    #[builder(default)]
    pub identity: IdentityGenerator,
    #[builder(default)]
    pub think_time: ThinkTime,
}
