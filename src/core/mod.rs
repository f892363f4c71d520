//! Core: 下载任务的注册表、任务编排、分段存储、状态投递等核心逻辑模块

pub mod actor_manager;
pub mod delivery;
pub mod error;
pub mod manager;
pub mod request;
pub mod store;
pub mod task;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// 只导出宿主实际用到的类型
pub use delivery::{DownloadCallback, DownloadEvent, StatusDelivery};
pub use error::{DownloadError, DownloadResult};
pub use manager::DownloadManager;
pub use request::{task_key, DownloadRequest};
pub use store::{JsonSegmentStore, SegmentStore};
pub use task::{DownloadInfo, TaskStatus};
pub use transport::{HttpTransport, Transport};
