//! Domain engines. Each engine owns one slice of behavior over the shared
//! store; the [`crate::app::App`] wires them together and routes sync
//! triggers.

pub mod activity;
pub mod alarm;
pub mod flow;
pub mod task;
pub mod unlogged;

pub use activity::{ActivityEngine, StartOutcome};
pub use alarm::AlarmScheduler;
pub use flow::{AlarmChoice, FlowEngine, FlowOffer};
pub use task::{TaskCompletion, TaskCoordinator, TASK_CATEGORY};
pub use unlogged::UnloggedTracker;
