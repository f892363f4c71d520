//! `task` 模块包含了与单个下载任务相关的所有逻辑
//!
//! 主要包括：
//! - `actor`: 任务编排者 `DownloadTaskActor`
//! - `state`: 任务状态 `TaskStatus`
//! - `messages`: Actor 之间传递的消息
//! - `handlers`: 消息处理器
//! - `download`: 分段工作者
//! - `chunk_manager`: 分段划分与进度汇总
//! - `util`: 停止信号与进度节流

pub mod actor;
pub mod state;
pub mod messages;
pub mod handlers;
pub mod download;
pub mod chunk_manager;
pub mod util;

pub use actor::{DownloadTaskActor, TaskContext};
pub use chunk_manager::{DownloadInfo, Segment};
pub use messages::{CancelTask, PauseTask, StartTask, TaskDestroyed};
pub use state::{SharedStatus, TaskStatus};
