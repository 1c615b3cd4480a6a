pub mod health_checker;
pub mod task_action;

pub use health_checker::HealthChecker;
pub use task_action::{action_fn, FnAction, TaskAction};
