//! Batch orchestration on top of the transfer engine and the task registry.
//!
//! A task holds an ordered list of items. [`Orchestrator::run`] processes
//! them one at a time and keeps the task record current; single downloads
//! are simply tasks with one item.

pub mod orchestrator;

pub use orchestrator::{aggregate_progress, BatchOptions, Orchestrator};
