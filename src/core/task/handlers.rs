use actix::{ActorFutureExt, AsyncContext, Context, Handler, WrapFuture};

use crate::core::delivery::DownloadEvent;
use super::actor::DownloadTaskActor;
use super::messages::*;
use super::state::TaskStatus;

impl Handler<StartTask> for DownloadTaskActor {
    type Result = ();
    fn handle(&mut self, _msg: StartTask, ctx: &mut Context<Self>) {
        if !self.status.transition(TaskStatus::Connecting) {
            return;
        }
        log::info!("[task] {} 开始连接 {}", self.key, self.request.url);
        self.post(DownloadEvent::Connecting);

        self.preparing = true;
        let transport = self.context.transport.clone();
        let url = self.request.url.clone();
        let fut = async move { transport.probe(&url).await };
        ctx.spawn(fut.into_actor(self).map(|result, act, ctx| act.on_probed(result, ctx)));
    }
}

impl Handler<PauseTask> for DownloadTaskActor {
    type Result = ();
    fn handle(&mut self, _msg: PauseTask, ctx: &mut Context<Self>) {
        if !self.status.is_active() || self.control.is_cancelled() {
            return;
        }
        log::info!("[task] {} 暂停，等待 {} 个分段退出", self.key, self.active_workers);
        self.control.pause();
        self.try_settle(ctx);
    }
}

impl Handler<CancelTask> for DownloadTaskActor {
    type Result = ();
    fn handle(&mut self, _msg: CancelTask, ctx: &mut Context<Self>) {
        if !self.status.is_active() {
            return;
        }
        log::info!("[task] {} 取消，等待 {} 个分段退出", self.key, self.active_workers);
        self.control.cancel();
        self.try_settle(ctx);
    }
}

impl Handler<SegmentExited> for DownloadTaskActor {
    type Result = ();
    fn handle(&mut self, msg: SegmentExited, ctx: &mut Context<Self>) {
        self.on_segment_exited(msg.index, msg.outcome, ctx);
    }
}
