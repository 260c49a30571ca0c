//! Task table: owns every spawned module scheduler during `execute()`

use crate::scheduler::{ModuleStats, Schedulable};
use leap_core::TaskId;
use std::sync::Mutex;

type Slot = Mutex<Option<Box<dyn Schedulable>>>;

/// Fixed set of task slots indexed by `TaskId`.
///
/// A task is taken out of its slot while a worker runs it and put back
/// afterwards; since the ready queue holds each id at most once, the slot
/// lock is never contended.
pub struct TaskTable {
    slots: Vec<Slot>,
}

impl TaskTable {
    pub fn new(tasks: Vec<Box<dyn Schedulable>>) -> Self {
        Self {
            slots: tasks.into_iter().map(|t| Mutex::new(Some(t))).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = TaskId> {
        (0..self.slots.len() as u32).map(TaskId::new)
    }

    pub fn take(&self, id: TaskId) -> Option<Box<dyn Schedulable>> {
        self.slots.get(id.as_usize())?.lock().unwrap().take()
    }

    pub fn put(&self, id: TaskId, task: Box<dyn Schedulable>) {
        if let Some(slot) = self.slots.get(id.as_usize()) {
            *slot.lock().unwrap() = Some(task);
        }
    }

    /// Counters of every task currently in its slot
    pub fn stats(&self) -> Vec<ModuleStats> {
        self.slots
            .iter()
            .filter_map(|slot| slot.lock().unwrap().as_ref().map(|t| t.stats()))
            .collect()
    }

    pub fn into_tasks(self) -> Vec<Box<dyn Schedulable>> {
        self.slots
            .into_iter()
            .filter_map(|slot| slot.into_inner().unwrap_or_else(|p| p.into_inner()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::RuleScheduler;

    #[test]
    fn test_take_and_put() {
        let a: Box<dyn Schedulable> = Box::new(RuleScheduler::new("a", ()));
        let b: Box<dyn Schedulable> = Box::new(RuleScheduler::new("b", ()));
        let table = TaskTable::new(vec![a, b]);
        assert_eq!(table.len(), 2);

        let id = TaskId::new(1);
        let task = table.take(id).unwrap();
        assert_eq!(task.name(), "b");
        assert!(table.take(id).is_none());
        assert_eq!(table.stats().len(), 1);

        table.put(id, task);
        let names: Vec<String> = table.stats().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(table.take(TaskId::new(7)).is_none());
        assert_eq!(table.into_tasks().len(), 2);
    }
}
