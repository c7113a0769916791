//! Pollable task records.
//!
//! - [`model`] - task, item and snapshot types
//! - [`store`] - storage trait and the in-memory store
//! - [`registry`] - the registry enforcing task lifecycle rules
//!
//! # Example
//!
//! ```rust
//! use comfy_fetch::task::{TaskKind, TaskRegistry, TaskStatus};
//!
//! let registry = TaskRegistry::new();
//! let id = registry.create(TaskKind::PluginUninstall, vec![]);
//! registry.alias("uninstall:ComfyUI-Manager", &id);
//! registry.complete(&id);
//!
//! let snapshot = registry.snapshot(&id).unwrap();
//! assert_eq!(snapshot.status, TaskStatus::Completed);
//! assert_eq!(snapshot.overall_progress, 100);
//! ```

pub mod model;
pub mod registry;
pub mod store;

pub use model::{
    CancelAck, ItemError, TaskId, TaskKind, TaskSnapshot, TaskStatus, TransferItem, TransferTask,
};
pub use registry::TaskRegistry;
pub use store::{MemoryTaskStore, TaskStore};
