//! Storage behind the task registry.
//!
//! The registry only talks to [`TaskStore`], so a persistent store can
//! replace [`MemoryTaskStore`] without touching callers. The in-memory store
//! keeps everything for the lifetime of the process.

use super::model::{TaskId, TransferTask};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt::Debug;

/// Keyed storage for task records and their aliases.
pub trait TaskStore: Send + Sync + Debug {
    /// Insert `task` unless its id is taken; returns whether it was inserted.
    fn insert_if_absent(&self, task: TransferTask) -> bool;

    /// A copy of the record.
    fn get(&self, id: &TaskId) -> Option<TransferTask>;

    /// Mutate the record in place under the store's lock.
    ///
    /// Returns `false` when the id is unknown.
    fn modify(&self, id: &TaskId, f: &mut dyn FnMut(&mut TransferTask)) -> bool;

    /// Drop a record and every alias pointing at it.
    fn remove(&self, id: &TaskId) -> Option<TransferTask>;

    /// All known ids.
    fn ids(&self) -> Vec<TaskId>;

    /// Point `name` at `id`, replacing any previous target.
    fn set_alias(&self, name: &str, id: TaskId);

    /// Target of `name`.
    fn alias(&self, name: &str) -> Option<TaskId>;
}

/// Process-lifetime store on top of [`DashMap`].
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: DashMap<TaskId, TransferTask>,
    aliases: DashMap<String, TaskId>,
}

impl MemoryTaskStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskStore for MemoryTaskStore {
    fn insert_if_absent(&self, task: TransferTask) -> bool {
        match self.tasks.entry(task.id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(task);
                true
            }
        }
    }

    fn get(&self, id: &TaskId) -> Option<TransferTask> {
        self.tasks.get(id).map(|task| task.clone())
    }

    fn modify(&self, id: &TaskId, f: &mut dyn FnMut(&mut TransferTask)) -> bool {
        match self.tasks.get_mut(id) {
            Some(mut task) => {
                f(&mut task);
                true
            }
            None => false,
        }
    }

    fn remove(&self, id: &TaskId) -> Option<TransferTask> {
        self.aliases.retain(|_, target| target != id);
        self.tasks.remove(id).map(|(_, task)| task)
    }

    fn ids(&self) -> Vec<TaskId> {
        self.tasks.iter().map(|entry| entry.key().clone()).collect()
    }

    fn set_alias(&self, name: &str, id: TaskId) {
        self.aliases.insert(name.to_string(), id);
    }

    fn alias(&self, name: &str) -> Option<TaskId> {
        self.aliases.get(name).map(|id| id.clone())
    }
}
