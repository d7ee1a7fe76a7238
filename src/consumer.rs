//! Consumer side: update planning, the failed-transition blacklist and the
//! refresh engine.

pub mod config;
pub mod engine;
pub mod failed;
pub mod listener;
pub mod plan;
pub mod planner;

pub use config::{ConsumerConfig, FailurePolicy};
pub use engine::Consumer;
pub use failed::FailedTransitionTracker;
pub use listener::{
    ConsumerRefreshMetrics, RefreshListener, RefreshMetricsListener, UpdatePlanDetails,
};
pub use plan::UpdatePlan;
pub use planner::{plan_update, UpdatePlanner};
