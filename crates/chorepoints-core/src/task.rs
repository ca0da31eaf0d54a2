//! Task: a point-valued chore assigned to one kid.
//!
//! The state machine is deliberately tiny: Pending -> Complete, one-way.
//! Re-completing a complete task is a no-op, never an error, so the award
//! path can be retried safely.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};
use crate::types::{KidId, ParentId, TaskId};

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    /// Assigned, not yet done.
    Pending,
    /// Done; points have been awarded exactly once.
    Complete,
}

impl TaskState {
    /// Encode for storage.
    pub fn to_u8(self) -> u8 {
        match self {
            TaskState::Pending => 0,
            TaskState::Complete => 1,
        }
    }

    /// Decode from storage.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(TaskState::Pending),
            1 => Some(TaskState::Complete),
            _ => None,
        }
    }
}

/// A chore assigned to exactly one kid, created by exactly one parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub kid_id: KidId,
    pub created_by: ParentId,
    pub title: String,
    pub points: i64,
    pub state: TaskState,
    pub completed_at: Option<i64>,
    pub created_at: i64,
}

/// Outcome of asking a task to complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The task just transitioned; the caller must award points in the same
    /// atomic unit.
    Transitioned,
    /// The task was already complete; nothing to do.
    AlreadyComplete,
}

impl Task {
    /// Create a new pending task with a fresh id. Points must be non-negative.
    pub fn new(
        kid_id: KidId,
        created_by: ParentId,
        title: impl Into<String>,
        points: i64,
        now: i64,
    ) -> Result<Self> {
        if points < 0 {
            return Err(DomainError::NegativeTaskPoints(points));
        }
        Ok(Self {
            id: TaskId::generate(),
            kid_id,
            created_by,
            title: title.into(),
            points,
            state: TaskState::Pending,
            completed_at: None,
            created_at: now,
        })
    }

    /// Transition to Complete. Idempotent: a second call reports
    /// [`Completion::AlreadyComplete`] and changes nothing.
    pub fn complete(&mut self, now: i64) -> Completion {
        match self.state {
            TaskState::Complete => Completion::AlreadyComplete,
            TaskState::Pending => {
                self.state = TaskState::Complete;
                self.completed_at = Some(now);
                Completion::Transitioned
            }
        }
    }

    /// Whether this task is complete.
    pub fn is_complete(&self) -> bool {
        self.state == TaskState::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_task(points: i64) -> Task {
        Task::new(KidId::generate(), ParentId::generate(), "Brush Teeth", points, 1000).unwrap()
    }

    #[test]
    fn test_new_task_is_pending() {
        let task = make_task(50);
        assert_eq!(task.state, TaskState::Pending);
        assert_eq!(task.completed_at, None);
    }

    #[test]
    fn test_rejects_negative_points() {
        assert!(Task::new(KidId::ZERO, ParentId::ZERO, "x", -5, 0).is_err());
    }

    #[test]
    fn test_complete_transitions_once() {
        let mut task = make_task(50);
        assert_eq!(task.complete(2000), Completion::Transitioned);
        assert_eq!(task.state, TaskState::Complete);
        assert_eq!(task.completed_at, Some(2000));
    }

    #[test]
    fn test_complete_is_idempotent() {
        let mut task = make_task(50);
        task.complete(2000);
        assert_eq!(task.complete(3000), Completion::AlreadyComplete);
        // Timestamp from the first completion is preserved.
        assert_eq!(task.completed_at, Some(2000));
    }

    #[test]
    fn test_state_storage_roundtrip() {
        for state in [TaskState::Pending, TaskState::Complete] {
            assert_eq!(TaskState::from_u8(state.to_u8()), Some(state));
        }
        assert_eq!(TaskState::from_u8(7), None);
    }
}
