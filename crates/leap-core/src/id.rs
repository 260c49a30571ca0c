//! Module task identifier

use core::fmt;

/// Identifier of a spawned module scheduler task
///
/// Indexes the runtime's task table. The maximum value is reserved as a
/// sentinel for "no task".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct TaskId(u32);

impl TaskId {
    pub const NONE: TaskId = TaskId(u32::MAX);

    #[inline]
    pub const fn new(id: u32) -> Self {
        TaskId(id)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == u32::MAX
    }
}

impl From<u32> for TaskId {
    #[inline]
    fn from(id: u32) -> Self {
        TaskId(id)
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "TaskId(NONE)")
        } else {
            write!(f, "TaskId({})", self.0)
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id() {
        let id = TaskId::new(3);
        assert_eq!(id.as_usize(), 3);
        assert!(!id.is_none());
        assert!(TaskId::NONE.is_none());
        assert_eq!(format!("{:?}", TaskId::NONE), "TaskId(NONE)");
        assert_eq!(TaskId::from(9).to_string(), "9");
    }
}
