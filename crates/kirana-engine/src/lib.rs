//! # Kirana Engine
//!
//! The periodic heart of the campaign system. Everything here is driven
//! by `Orchestrator::tick`, invoked either by the in-process loop
//! (`run_loop`) or one-shot by an external scheduler (`kirana tick`).
//! One tick does a bounded amount of work and checkpoints everything in
//! the store, so progress survives across invocations.
//!
//! ## Architecture
//! ```text
//! Orchestrator::tick (bounded wall-clock budget)
//!   ├── release stale claims (recovery from killed invocations)
//!   ├── promote due scheduled campaigns
//!   │     AudienceResolver -> enroll -> sending (or failed if empty)
//!   ├── drain sending campaigns
//!   │     Dispatcher: claim batch -> send via MessageSender -> mark
//!   │     sent/failed, sleep ceil(60000/rate) ms between sends
//!   └── lifecycle reminders
//!         cart recovery / payment / delivery confirm / review + win-back
//! ```
//!
//! There is no in-process parallelism: every unit of work in a tick runs
//! sequentially, and sleeps exist only to throttle outbound sends.

pub mod audience;
pub mod dispatcher;
pub mod orchestrator;
pub mod reminders;

pub use dispatcher::{Dispatcher, DrainOutcome};
pub use orchestrator::{Orchestrator, TickSummary, run_loop, start_campaign};
pub use reminders::{ReminderEngine, ReminderSummary};

#[cfg(test)]
pub(crate) mod testing;
