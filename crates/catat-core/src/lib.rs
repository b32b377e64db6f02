//! # Catat Core Library
//!
//! Core engine of catat, a personal time-awareness logger: every span of
//! the day is either a named activity, an ad-hoc task or an unlogged block,
//! and the whole record set converges across devices through an external
//! remote store.
//!
//! ## Architecture
//!
//! - **Activity engine**: single-running-activity lifecycle with pause
//!   accounting and orphan sanitization
//! - **Task coordinator**: ad-hoc interruptions that borrow the running
//!   slot and hand it back on completion
//! - **Flow engine**: daily safety windows with repeating alarms, guided
//!   step execution and lazy missed/skipped settlement
//! - **Storage**: SQLite record store plus TOML configuration
//! - **Sync**: event-triggered push/pull rounds with per-record
//!   last-write-wins and remote-wins running-slot repair
//!
//! There are no internal threads: the embedding layer drives time via
//! [`App::tick`] and [`App::opened`].
//!
//! ## Key Components
//!
//! - [`App`]: facade wiring the engines and routing sync triggers
//! - [`ActivityEngine`], [`TaskCoordinator`], [`FlowEngine`]
//! - [`LocalStore`]: record persistence
//! - [`SyncCoordinator`]: cross-device convergence

pub mod app;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod model;
pub mod store;
pub mod sync;

pub use app::{App, OpenReport, TickReport};
pub use clock::{Clock, ManualClock, SystemClock, TimerToken, Timers};
pub use config::Config;
pub use engine::{
    ActivityEngine, AlarmChoice, FlowEngine, FlowOffer, StartOutcome, TaskCompletion,
    TaskCoordinator, UnloggedTracker,
};
pub use error::{ConfigError, CoreError, Result, StoreError, SyncError};
pub use events::{ChangeEvent, SyncTrigger};
pub use model::{
    Activity, ActivityOutcome, ActivitySource, AdHocTask, FlowOccurrenceState, FlowStep,
    FlowTemplate, GuidedFlowLog, HaidMode, PauseLog, PauseReason, SafetyWindow, SyncState,
    TaskExecutionState, UnloggedBlock,
};
pub use store::{InMemoryRemote, LocalStore, Notifier, RemoteStore};
pub use sync::{SyncCoordinator, SyncOutcome, SyncRecord};
