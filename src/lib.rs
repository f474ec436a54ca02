//! Core library for the `loadcanvas` CLI.
//!
//! A canvas execution engine for load tests: projects own scenarios, both own
//! components wired together through typed terminals, and a runner drives
//! every canvas through its START, PRE_STOP and STOP phases. Scenarios can be
//! deployed to remote agents whose statistics are reconciled on completion.
pub mod args;
pub mod behaviors;
pub mod canvas;
pub mod component;
pub mod config;
pub mod counter;
pub mod distributed;
pub mod entry;
pub mod error;
pub mod events;
pub mod execution;
pub mod logger;
pub mod statistics;
pub mod summary;
pub mod terminal;
pub mod workspace;

mod sync;

#[cfg(test)]
mod test_support;
