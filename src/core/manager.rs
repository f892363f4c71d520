//! 对外的下载管理器句柄
//!
//! `DownloadManager` 由宿主在 actix System 中显式构造并传给调用方，
//! 所有注册表操作都转发给 [`DownloadManagerActor`] 串行执行。

use actix::prelude::*;
use std::rc::Rc;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::config::Config;
use crate::core::actor_manager::*;
use crate::core::delivery::{DownloadCallback, StatusDelivery};
use crate::core::error::DownloadResult;
use crate::core::request::{task_key, DownloadRequest};
use crate::core::store::{JsonSegmentStore, SegmentStore};
use crate::core::task::{DownloadInfo, TaskContext};
use crate::core::transport::{HttpTransport, Transport};

#[derive(Clone)]
pub struct DownloadManager {
    addr: Addr<DownloadManagerActor>,
    store: Arc<dyn SegmentStore>,
}

impl DownloadManager {
    /// 使用 HTTP 传输、JSON 分段存储和专用回调线程初始化
    ///
    /// 必须在 actix System 内调用。
    pub fn init(config: Config) -> DownloadResult<Self> {
        config.validate()?;
        let store: Arc<dyn SegmentStore> = Arc::new(JsonSegmentStore::open(&config.store_dir)?);
        let transport: Rc<dyn Transport> = Rc::new(HttpTransport::new(&config));
        Self::init_with(config, store, transport, StatusDelivery::dedicated())
    }

    pub fn init_with(
        config: Config,
        store: Arc<dyn SegmentStore>,
        transport: Rc<dyn Transport>,
        delivery: StatusDelivery,
    ) -> DownloadResult<Self> {
        config.validate()?;
        log::info!(
            "[manager] 初始化: 分段数 {}, 工作池容量 {}",
            config.thread_count,
            config.max_thread_count
        );
        let context = TaskContext {
            pool: Arc::new(Semaphore::new(config.max_thread_count)),
            config: Arc::new(config),
            store: store.clone(),
            delivery,
            transport,
        };
        let addr = DownloadManagerActor::new(context).start();
        Ok(Self { addr, store })
    }

    pub async fn download(
        &self,
        request: DownloadRequest,
        tag: &str,
        callback: Arc<dyn DownloadCallback>,
    ) -> DownloadResult<()> {
        self.addr
            .send(Download { key: task_key(tag), request, callback })
            .await?
    }

    /// 暂停是异步的，返回后 `is_running` 可能短暂仍为 true
    pub async fn pause(&self, tag: &str) -> DownloadResult<()> {
        Ok(self.addr.send(Pause { key: task_key(tag) }).await?)
    }

    pub async fn cancel(&self, tag: &str) -> DownloadResult<()> {
        Ok(self.addr.send(Cancel { key: task_key(tag) }).await?)
    }

    pub async fn pause_all(&self) -> DownloadResult<Vec<String>> {
        Ok(self.addr.send(PauseAll).await?)
    }

    pub async fn cancel_all(&self) -> DownloadResult<Vec<String>> {
        Ok(self.addr.send(CancelAll).await?)
    }

    /// 删除持久化的分段记录，与任务是否登记无关
    pub async fn delete(&self, tag: &str) -> DownloadResult<()> {
        self.store.delete_segments(&task_key(tag)).await
    }

    pub async fn is_running(&self, tag: &str) -> bool {
        self.addr
            .send(QueryRunning { key: task_key(tag) })
            .await
            .unwrap_or(false)
    }

    /// 已登记任务的 key 列表
    pub async fn list_tasks(&self) -> DownloadResult<Vec<String>> {
        Ok(self.addr.send(ListTasks).await?)
    }

    /// 仅由持久化的分段计算进度，没有分段时返回 `None`
    pub async fn get_download_info(&self, tag: &str) -> DownloadResult<Option<DownloadInfo>> {
        let segments = self.store.get_segments(&task_key(tag)).await?;
        Ok(DownloadInfo::from_segments(&segments))
    }
}
