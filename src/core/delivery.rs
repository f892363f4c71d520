//! 状态投递：把任意线程产生的下载事件汇集到同一个回调执行上下文
//!
//! `StatusDelivery` 背后是一个运行在指定 arbiter 上的 actor，
//! 其邮箱即单消费者队列。同一任务的事件按投递顺序被回调，且回调之间不会并发。

use actix::prelude::*;
use actix::{Arbiter, ArbiterHandle};
use std::fmt;
use std::sync::Arc;

use super::error::DownloadError;

/// 宿主实现的下载回调，所有方法都在投递上下文中调用
#[allow(unused_variables)]
pub trait DownloadCallback: Send + Sync + 'static {
    fn on_connecting(&self) {}
    fn on_connected(&self, length: u64, supports_range: bool) {}
    fn on_progress(&self, finished: u64, length: u64, percent: u8) {}
    fn on_completed(&self) {}
    fn on_download_paused(&self) {}
    fn on_download_canceled(&self) {}
    fn on_failed(&self, error: DownloadError) {}
}

/// 下载事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    Connecting,
    Connected { length: u64, supports_range: bool },
    Progress { finished: u64, length: u64, percent: u8 },
    Completed,
    Paused,
    Canceled,
    Failed(DownloadError),
}

impl DownloadEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadEvent::Completed | DownloadEvent::Paused | DownloadEvent::Canceled | DownloadEvent::Failed(_)
        )
    }
}

/// 待投递的状态：事件及其目标回调
pub struct DownloadStatus {
    pub callback: Arc<dyn DownloadCallback>,
    pub event: DownloadEvent,
}

impl fmt::Debug for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadStatus").field("event", &self.event).finish()
    }
}

impl Message for DownloadStatus {
    type Result = ();
}

/// 回调执行上下文
pub struct DeliveryActor;

impl Actor for DeliveryActor {
    type Context = Context<Self>;
}

impl Handler<DownloadStatus> for DeliveryActor {
    type Result = ();

    fn handle(&mut self, status: DownloadStatus, _ctx: &mut Self::Context) {
        let callback = status.callback;
        match status.event {
            DownloadEvent::Connecting => callback.on_connecting(),
            DownloadEvent::Connected { length, supports_range } => callback.on_connected(length, supports_range),
            DownloadEvent::Progress { finished, length, percent } => callback.on_progress(finished, length, percent),
            DownloadEvent::Completed => callback.on_completed(),
            DownloadEvent::Paused => callback.on_download_paused(),
            DownloadEvent::Canceled => callback.on_download_canceled(),
            DownloadEvent::Failed(error) => callback.on_failed(error),
        }
    }
}

/// 可在任意线程克隆和调用的投递句柄
#[derive(Clone)]
pub struct StatusDelivery {
    addr: Addr<DeliveryActor>,
}

impl StatusDelivery {
    /// 绑定到给定的 arbiter
    pub fn start_in(arbiter: &ArbiterHandle) -> Self {
        let addr = DeliveryActor::start_in_arbiter(arbiter, |_| DeliveryActor);
        Self { addr }
    }

    /// 在一个新建的专用线程上运行回调
    pub fn dedicated() -> Self {
        let arbiter = Arbiter::new();
        let delivery = Self::start_in(&arbiter.handle());
        // arbiter 线程随 System 一起退出
        drop(arbiter);
        delivery
    }

    pub fn post(&self, callback: &Arc<dyn DownloadCallback>, event: DownloadEvent) {
        log::trace!("[delivery] {:?}", event);
        self.addr.do_send(DownloadStatus { callback: callback.clone(), event });
    }
}
