//! # trellis-event
//!
//! Application events and their delivery to listeners.
//!
//! - **Event**: typed events with an explicit supertype chain.
//! - **Listener**: listener contract, closure adapter, and named listener beans.
//! - **Multicaster**: registration sets plus a type-filtered listener cache.
//! - **Executor**: synchronous and Tokio-backed dispatch, error handlers.
//! - **Startup**: step instrumentation for container bootstrap.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod event;
pub mod executor;
pub mod listener;
pub mod multicaster;
pub mod startup;

pub use event::{ApplicationEvent, ContextEvent, ContextEventKind, EventType, PayloadApplicationEvent};
pub use executor::{ErrorHandler, LoggingErrorHandler, SyncTaskExecutor, TaskExecutor, TokioTaskExecutor};
pub use listener::{ApplicationListener, FnListener, ListenerBeanResolver, ListenerBeanTable};
pub use multicaster::SimpleApplicationEventMulticaster;
pub use startup::{
    ApplicationStartup, BufferingApplicationStartup, DefaultApplicationStartup, StartupStep,
    StepRecord, TracingApplicationStartup,
};
