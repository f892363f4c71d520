use actix::Message;
use uuid::Uuid;

use super::download::SegmentOutcome;

/// 启动任务
pub struct StartTask;
impl Message for StartTask { type Result = (); }

/// 暂停任务
pub struct PauseTask;
impl Message for PauseTask { type Result = (); }

/// 取消任务
pub struct CancelTask;
impl Message for CancelTask { type Result = (); }

/// 分段工作者退出
pub struct SegmentExited {
    pub index: usize,
    pub outcome: SegmentOutcome,
}
impl Message for SegmentExited { type Result = (); }

/// 任务的工作者已全部退出，通知管理器注销
///
/// `id` 用于区分同一 key 的前后两个实例。
#[derive(Debug, Clone)]
pub struct TaskDestroyed {
    pub key: String,
    pub id: Uuid,
}
impl Message for TaskDestroyed { type Result = (); }
