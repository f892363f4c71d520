use actix::prelude::*;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::config::Config;
use crate::core::delivery::{DownloadCallback, DownloadEvent, StatusDelivery};
use crate::core::error::{DownloadError, DownloadResult};
use crate::core::request::DownloadRequest;
use crate::core::store::SegmentStore;
use crate::core::transport::{FileInfo, Transport};
use super::chunk_manager::{is_valid_partition, partition, Segment};
use super::download::{SegmentOutcome, SegmentWorker};
use super::messages::TaskDestroyed;
use super::state::{SharedStatus, TaskStatus};
use super::util::{ProgressTracker, TaskControl};

/// 所有任务共享的运行环境
#[derive(Clone)]
pub struct TaskContext {
    pub config: Arc<Config>,
    /// 全局工作池，许可数为 `max_thread_count`
    pub pool: Arc<Semaphore>,
    pub store: Arc<dyn SegmentStore>,
    pub delivery: StatusDelivery,
    pub transport: Rc<dyn Transport>,
}

/// 单任务 Actor：探测资源、准备分段、调度工作者并汇总结果
pub struct DownloadTaskActor {
    pub id: Uuid,
    pub key: String,
    pub request: DownloadRequest,
    pub(super) callback: Arc<dyn DownloadCallback>,
    pub(super) context: TaskContext,
    pub(super) status: SharedStatus,
    pub(super) control: TaskControl,
    pub(super) file_info: Option<FileInfo>,
    pub(super) segments: Vec<Segment>,
    pub(super) active_workers: usize,
    pub(super) completed_segments: usize,
    /// 探测或准备分段尚未返回
    pub(super) preparing: bool,
    pub(super) settling: bool,
    /// 第一个失败，之后的失败只记录日志
    pub(super) failure: Option<DownloadError>,
    on_destroyed: Option<Recipient<TaskDestroyed>>,
}

impl Actor for DownloadTaskActor {
    type Context = Context<Self>;

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        log::debug!("[task] {} 实例 {} 已销毁", self.key, self.id);
    }
}

impl DownloadTaskActor {
    pub fn new(
        key: String,
        request: DownloadRequest,
        callback: Arc<dyn DownloadCallback>,
        context: TaskContext,
        on_destroyed: Recipient<TaskDestroyed>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            request,
            callback,
            context,
            status: SharedStatus::new(),
            control: TaskControl::new(),
            file_info: None,
            segments: Vec::new(),
            active_workers: 0,
            completed_segments: 0,
            preparing: false,
            settling: false,
            failure: None,
            on_destroyed: Some(on_destroyed),
        }
    }

    pub fn status_handle(&self) -> SharedStatus {
        self.status.clone()
    }

    pub(super) fn post(&self, event: DownloadEvent) {
        self.context.delivery.post(&self.callback, event);
    }

    pub(super) fn on_probed(&mut self, result: DownloadResult<FileInfo>, ctx: &mut Context<Self>) {
        self.preparing = false;
        let info = match result {
            Ok(info) => info,
            Err(e) => {
                log::warn!("[task] {} 探测失败: {}", self.key, e);
                self.latch_failure(e);
                return self.try_settle(ctx);
            }
        };
        if self.control.should_stop() {
            return self.try_settle(ctx);
        }

        log::info!(
            "[task] {} 已连接: {} 字节, 分段续传: {}",
            self.key,
            info.size,
            if info.supports_range { "支持" } else { "不支持" }
        );
        self.status.transition(TaskStatus::Running);
        self.post(DownloadEvent::Connected { length: info.size, supports_range: info.supports_range });
        self.file_info = Some(info.clone());

        self.preparing = true;
        let fut = prepare_segments(
            self.context.store.clone(),
            self.key.clone(),
            info,
            self.context.config.thread_count,
            self.request.destination.clone(),
            self.request.resume,
        );
        ctx.spawn(fut.into_actor(self).map(|result, act, ctx| act.on_prepared(result, ctx)));
    }

    fn on_prepared(&mut self, result: DownloadResult<Vec<Segment>>, ctx: &mut Context<Self>) {
        self.preparing = false;
        let segments = match result {
            Ok(segments) => segments,
            Err(e) => {
                log::error!("[task] {} 准备分段失败: {}", self.key, e);
                self.latch_failure(e);
                return self.try_settle(ctx);
            }
        };
        if self.control.should_stop() {
            return self.try_settle(ctx);
        }
        self.segments = segments;
        self.spawn_workers(ctx);
        self.try_settle(ctx);
    }

    fn spawn_workers(&mut self, ctx: &mut Context<Self>) {
        let Some(info) = self.file_info.clone() else {
            return;
        };
        let already: u64 = self.segments.iter().map(|s| s.finished).sum();
        let progress = Arc::new(ProgressTracker::new(
            info.size,
            already,
            self.context.config.progress_interval(),
        ));
        log::debug!("[task] {} 启动 {} 个分段，已完成 {} 字节", self.key, self.segments.len(), already);

        let part_path = self.request.part_path();
        for segment in self.segments.clone() {
            if segment.is_completed() {
                self.completed_segments += 1;
                continue;
            }
            let worker = SegmentWorker {
                key: self.key.clone(),
                url: self.request.url.clone(),
                part_path: part_path.clone(),
                segment,
                supports_range: info.supports_range,
                chunk_size: self.context.config.chunk_size,
                control: self.control.clone(),
                pool: self.context.pool.clone(),
                store: self.context.store.clone(),
                transport: self.context.transport.clone(),
                progress: progress.clone(),
                delivery: self.context.delivery.clone(),
                callback: self.callback.clone(),
            };
            self.active_workers += 1;
            actix::spawn(worker.run_and_report(ctx.address()));
        }
    }

    pub(super) fn on_segment_exited(&mut self, index: usize, outcome: SegmentOutcome, ctx: &mut Context<Self>) {
        self.active_workers = self.active_workers.saturating_sub(1);
        match outcome {
            SegmentOutcome::Completed => self.completed_segments += 1,
            SegmentOutcome::Stopped => {}
            SegmentOutcome::Failed(e) => {
                if self.control.is_paused() || self.control.is_cancelled() {
                    log::debug!("[task] {}#{} 在停止过程中出错，忽略: {}", self.key, index, e);
                } else if self.failure.is_some() {
                    log::warn!("[task] {}#{} 后续失败被忽略: {}", self.key, index, e);
                } else {
                    log::error!("[task] {}#{} 失败，停止其余分段: {}", self.key, index, e);
                    self.latch_failure(e);
                }
            }
        }
        self.try_settle(ctx);
    }

    fn latch_failure(&mut self, error: DownloadError) {
        if self.failure.is_none() {
            self.control.halt();
            self.failure = Some(error);
        }
    }

    /// 所有工作者退出后决定终态，取消优先于完成，完成优先于失败和暂停
    pub(super) fn try_settle(&mut self, ctx: &mut Context<Self>) {
        if self.active_workers > 0 || self.preparing || self.settling {
            return;
        }
        self.settling = true;

        if self.control.is_cancelled() {
            let fut = discard(self.context.store.clone(), self.key.clone(), self.request.part_path());
            ctx.spawn(fut.into_actor(self).map(|result, act, ctx| {
                if let Err(e) = result {
                    log::warn!("[task] {} 清理取消的任务失败: {}", act.key, e);
                }
                act.finish(TaskStatus::Cancelled, DownloadEvent::Canceled, ctx);
            }));
            return;
        }

        if self.failure.is_none() && !self.segments.is_empty() && self.completed_segments == self.segments.len() {
            let fut = finalize(
                self.context.store.clone(),
                self.key.clone(),
                self.request.part_path(),
                self.request.destination.clone(),
            );
            ctx.spawn(fut.into_actor(self).map(|result, act, ctx| match result {
                Ok(()) => act.finish(TaskStatus::Completed, DownloadEvent::Completed, ctx),
                Err(e) => {
                    log::error!("[task] {} 合并到目标文件失败: {}", act.key, e);
                    act.finish(TaskStatus::Failed(e.to_string()), DownloadEvent::Failed(e), ctx)
                }
            }));
            return;
        }

        if let Some(error) = self.failure.clone() {
            return self.finish(TaskStatus::Failed(error.to_string()), DownloadEvent::Failed(error), ctx);
        }
        if self.control.is_paused() {
            return self.finish(TaskStatus::Paused, DownloadEvent::Paused, ctx);
        }

        let error = DownloadError::storage("分段工作者意外退出");
        self.finish(TaskStatus::Failed(error.to_string()), DownloadEvent::Failed(error), ctx);
    }

    /// 先通知管理器注销，再投递终态事件
    fn finish(&mut self, status: TaskStatus, event: DownloadEvent, ctx: &mut Context<Self>) {
        log::info!("[task] {} 结束: {:?}", self.key, status);
        self.status.transition(status);
        if let Some(recipient) = self.on_destroyed.take() {
            recipient.do_send(TaskDestroyed { key: self.key.clone(), id: self.id });
        }
        self.post(event);
        ctx.stop();
    }
}

/// 复用或新建分段记录，保证返回时 `.part` 文件已存在
async fn prepare_segments(
    store: Arc<dyn SegmentStore>,
    key: String,
    info: FileInfo,
    thread_count: usize,
    destination: PathBuf,
    resume: bool,
) -> DownloadResult<Vec<Segment>> {
    let part_path = crate::core::request::part_path(&destination);
    let existing = store.get_segments(&key).await?;

    if !existing.is_empty() {
        let part_exists = tokio::fs::try_exists(&part_path).await.unwrap_or(false);
        let reusable = resume
            && part_exists
            && is_valid_partition(&existing, info.size)
            && (info.supports_range || existing.len() == 1);
        if reusable {
            return restore_segments(store.as_ref(), &key, existing, info.supports_range).await;
        }
        log::info!("[task] {} 丢弃已有的 {} 条分段记录，重新下载", key, existing.len());
        store.delete_segments(&key).await?;
    }

    create_part_file(&part_path, info.size).await?;
    let plan = partition(info.size, thread_count, info.supports_range);
    store.create_or_get_segments(&key, &plan).await
}

async fn restore_segments(
    store: &dyn SegmentStore,
    key: &str,
    mut segments: Vec<Segment>,
    supports_range: bool,
) -> DownloadResult<Vec<Segment>> {
    let finished: u64 = segments.iter().map(|s| s.finished).sum();
    if !supports_range && finished > 0 {
        // 无法从中间偏移继续，只能从头开始
        log::info!("[task] {} 资源不支持分段续传，已下载的 {} 字节作废", key, finished);
        for segment in segments.iter_mut() {
            segment.finished = 0;
            store.update_finished(key, segment.index, 0).await?;
        }
    } else {
        log::info!("[task] {} 从 {} 字节处续传", key, finished);
    }
    Ok(segments)
}

async fn create_part_file(part_path: &Path, length: u64) -> DownloadResult<()> {
    if let Some(parent) = part_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(part_path)
        .await?;
    file.set_len(length).await?;
    Ok(())
}

async fn finalize(
    store: Arc<dyn SegmentStore>,
    key: String,
    part_path: PathBuf,
    destination: PathBuf,
) -> DownloadResult<()> {
    tokio::fs::rename(&part_path, &destination).await?;
    store.delete_segments(&key).await
}

async fn discard(store: Arc<dyn SegmentStore>, key: String, part_path: PathBuf) -> DownloadResult<()> {
    store.delete_segments(&key).await?;
    match tokio::fs::remove_file(&part_path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
