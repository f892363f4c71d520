use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// 下载任务状态
///
/// `Idle → Connecting → {Running, Failed, Paused, Cancelled}`，`Running → {Paused, Cancelled, Completed, Failed}`。
/// 终态不可恢复，继续下载需要新的任务实例。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Idle,
    Connecting,
    Running,
    Completed,
    Failed(String),
    Paused,
    Cancelled,
}

impl TaskStatus {
    /// 已登记、尚未进入终态
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Idle | TaskStatus::Connecting | TaskStatus::Running)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    pub fn can_transition_to(&self, next: &TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Running)
                | (Connecting, Failed(_))
                | (Connecting, Paused)
                | (Connecting, Cancelled)
                | (Running, Paused)
                | (Running, Cancelled)
                | (Running, Completed)
                | (Running, Failed(_))
        )
    }
}

/// 任务状态的共享视图，供管理器同步读取
#[derive(Debug, Clone)]
pub struct SharedStatus(Arc<Mutex<TaskStatus>>);

impl SharedStatus {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(TaskStatus::Idle)))
    }

    pub fn get(&self) -> TaskStatus {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    /// 非法迁移被忽略并返回 false
    pub fn transition(&self, next: TaskStatus) -> bool {
        let mut current = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if current.can_transition_to(&next) {
            *current = next;
            true
        } else {
            log::warn!("忽略非法状态迁移: {:?} -> {:?}", *current, next);
            false
        }
    }

    pub fn is_active(&self) -> bool {
        self.get().is_active()
    }
}

impl Default for SharedStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        let status = SharedStatus::new();
        assert!(status.is_active());
        assert!(status.transition(TaskStatus::Connecting));
        assert!(status.transition(TaskStatus::Running));
        assert!(status.transition(TaskStatus::Completed));
        assert!(!status.is_active());

        assert!(!status.transition(TaskStatus::Running));
        assert_eq!(status.get(), TaskStatus::Completed);
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [
            TaskStatus::Completed,
            TaskStatus::Failed("x".into()),
            TaskStatus::Paused,
            TaskStatus::Cancelled,
        ] {
            assert!(terminal.is_terminal());
            for next in [TaskStatus::Idle, TaskStatus::Connecting, TaskStatus::Running, TaskStatus::Completed] {
                assert!(!terminal.can_transition_to(&next));
            }
        }
    }

    #[test]
    fn test_connecting_cannot_complete() {
        assert!(!TaskStatus::Connecting.can_transition_to(&TaskStatus::Completed));
        assert!(!TaskStatus::Idle.can_transition_to(&TaskStatus::Running));
    }
}
