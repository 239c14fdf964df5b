//! Belfry: durable, type-dispatched delayed-task scheduler.
//!
//! Any part of a host application can say "run this logic, with this
//! payload, at this future time" and have it survive process restarts, be
//! cancellable in bulk, and recover gracefully when the handling logic
//! fails. Built for community-bot workloads (reminders, message cleanup,
//! periodic refreshes) where second-to-minute timing precision is enough.
//!
//! # Architecture
//!
//! - **Payloads**: one struct per task type implementing [`TaskPayload`];
//!   payload shape is checked by the compiler and serde, not by runtime
//!   dictionary lookups.
//! - **Handlers**: a [`TaskHandler`] per task type, collected into a
//!   [`HandlerRegistry`] at startup.
//! - **Store**: pending durable tasks persist through [`TaskStore`]
//!   (bundled: [`SqliteTaskStore`]); runtime-only tasks skip it by design.
//! - **Scheduler**: a fixed-interval tick loop dispatches due tasks
//!   concurrently, each inside its own failure boundary. Components and
//!   handlers schedule work through a cloneable [`SchedulerHandle`] —
//!   explicit injection, no global.
//!
//! # Startup order
//!
//! Register every handler, construct the [`Scheduler`], call
//! [`Scheduler::load_persisted`], then [`Scheduler::start`]. On shutdown,
//! [`Scheduler::stop`] drains in-flight executions.

pub mod config;
pub mod error;
pub mod handler;
pub mod registry;
pub mod runner;
pub mod store;
pub mod task;

pub use config::SchedulerConfig;
pub use error::{Error, Result};
pub use handler::{TaskHandler, TaskPayload};
pub use registry::HandlerRegistry;
pub use runner::{Scheduler, SchedulerHandle};
pub use store::{NewTask, SqliteTaskStore, TaskStore};
pub use task::{SchedulerSnapshot, TaskId, TaskRecord, TaskRunOutcome, TaskRunRecord};
