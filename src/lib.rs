pub mod app;
pub mod shutdown;

pub use app::{task_component, Application, CONDITION_RETRIES_EXHAUSTED};
pub use shutdown::{wait_for_shutdown_signal, ShutdownManager};
