use actix::Addr;
use futures::StreamExt;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use tokio::io::{AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tokio::sync::Semaphore;

use crate::core::delivery::{DownloadCallback, DownloadEvent, StatusDelivery};
use crate::core::error::DownloadError;
use crate::core::store::SegmentStore;
use crate::core::transport::{ByteRange, Transport};
use super::actor::DownloadTaskActor;
use super::chunk_manager::Segment;
use super::messages::SegmentExited;
use super::util::{ProgressTracker, TaskControl};

/// 分段工作者的退出结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentOutcome {
    Completed,
    /// 观察到暂停、取消或停止信号后退出
    Stopped,
    Failed(DownloadError),
}

/// 下载单个分段 `[start + finished, end)` 并写入目标文件对应偏移
pub struct SegmentWorker {
    pub key: String,
    pub url: String,
    pub part_path: PathBuf,
    pub segment: Segment,
    pub supports_range: bool,
    pub chunk_size: usize,
    pub control: TaskControl,
    pub pool: Arc<Semaphore>,
    pub store: Arc<dyn SegmentStore>,
    pub transport: Rc<dyn Transport>,
    pub progress: Arc<ProgressTracker>,
    pub delivery: StatusDelivery,
    pub callback: Arc<dyn DownloadCallback>,
}

impl SegmentWorker {
    /// 在共享工作池中运行，结束后通知所属任务
    pub async fn run_and_report(self, task: Addr<DownloadTaskActor>) {
        let index = self.segment.index;
        let outcome = self.run().await;
        task.do_send(SegmentExited { index, outcome });
    }

    pub async fn run(self) -> SegmentOutcome {
        let _permit = match self.pool.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return SegmentOutcome::Failed(DownloadError::storage("工作池已关闭")),
        };

        if self.control.should_stop() {
            return self.stopped().await;
        }

        log::debug!(
            "[segment] {}#{} 开始下载 {}..{} (已完成 {})",
            self.key,
            self.segment.index,
            self.segment.start,
            self.segment.end,
            self.segment.finished
        );
        match self.transfer().await {
            Ok(true) => SegmentOutcome::Completed,
            Ok(false) => self.stopped().await,
            Err(e) => {
                log::warn!("[segment] {}#{} 下载失败: {}", self.key, self.segment.index, e);
                SegmentOutcome::Failed(e)
            }
        }
    }

    async fn stopped(&self) -> SegmentOutcome {
        if self.control.is_cancelled() {
            if let Err(e) = self.store.delete_segment(&self.key, self.segment.index).await {
                log::warn!("[segment] 删除分段 {}#{} 失败: {}", self.key, self.segment.index, e);
            }
        }
        SegmentOutcome::Stopped
    }

    /// 返回 `Ok(false)` 表示在块边界观察到停止信号
    async fn transfer(&self) -> Result<bool, DownloadError> {
        let length = self.segment.len();
        let mut finished = self.segment.finished;
        if finished >= length {
            return Ok(true);
        }

        let range = if self.supports_range {
            Some(ByteRange { start: self.segment.offset(), end: self.segment.end })
        } else {
            None
        };
        let mut stream = self.transport.open(&self.url, range).await?;

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .open(&self.part_path)
            .await?;
        file.seek(SeekFrom::Start(self.segment.offset())).await?;

        while finished < length {
            let bytes = match stream.next().await {
                Some(chunk) => chunk?,
                None => {
                    return Err(DownloadError::SizeMismatch { expected: length, actual: finished });
                }
            };

            for piece in bytes.chunks(self.chunk_size) {
                let take = piece.len().min((length - finished) as usize);
                file.write_all(&piece[..take]).await?;
                file.flush().await?;
                // 数据落盘后才登记，系统崩溃时记录也不会超过实际写入量
                file.sync_data().await?;

                // 已写入但未登记的字节只会导致少量重复下载
                if self.control.should_stop() {
                    return Ok(false);
                }

                finished += take as u64;
                self.store
                    .update_finished(&self.key, self.segment.index, finished)
                    .await?;

                if let Some((total_finished, total, percent)) = self.progress.advance(take as u64) {
                    if !self.control.should_stop() {
                        self.delivery.post(
                            &self.callback,
                            DownloadEvent::Progress { finished: total_finished, length: total, percent },
                        );
                    }
                }

                if finished >= length {
                    break;
                }
            }
        }

        log::debug!("[segment] {}#{} 完成", self.key, self.segment.index);
        Ok(true)
    }
}
