#[path = "../common/e2e_support.rs"]
mod e2e_support;

mod concurrency;
mod core;
mod observability;
mod resilience;
