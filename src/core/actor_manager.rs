use actix::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::delivery::DownloadCallback;
use crate::core::error::DownloadError;
use crate::core::request::DownloadRequest;
use crate::core::task::{CancelTask, DownloadTaskActor, PauseTask, SharedStatus, StartTask, TaskContext, TaskDestroyed};

/// ================== 注册表条目 ==================
pub struct TaskEntry {
    pub id: Uuid,
    pub addr: Addr<DownloadTaskActor>,
    pub status: SharedStatus,
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Pause,
    Cancel,
}

/// 启动下载，key 相同的运行中任务存在时忽略
pub struct Download {
    pub key: String,
    pub request: DownloadRequest,
    pub callback: Arc<dyn DownloadCallback>,
}
impl Message for Download { type Result = Result<(), DownloadError>; }
impl Handler<Download> for DownloadManagerActor {
    type Result = Result<(), DownloadError>;
    fn handle(&mut self, msg: Download, ctx: &mut Self::Context) -> Self::Result {
        msg.request.validate()?;

        if let Some(entry) = self.tasks.get(&msg.key) {
            if entry.status.is_active() {
                log::debug!("[manager] {} 已在运行，忽略重复请求", msg.key);
                return Ok(());
            }
            return Err(DownloadError::ProtocolViolation(format!(
                "任务 {} 已登记但未运行 ({:?})",
                msg.key,
                entry.status.get()
            )));
        }
        if let Some(id) = self.retiring.get(&msg.key) {
            return Err(DownloadError::ProtocolViolation(format!(
                "任务 {} 的上一个实例 {} 尚未退出",
                msg.key, id
            )));
        }

        let actor = DownloadTaskActor::new(
            msg.key.clone(),
            msg.request,
            msg.callback,
            self.context.clone(),
            ctx.address().recipient(),
        );
        let id = actor.id;
        let status = actor.status_handle();
        let addr = actor.start();
        addr.do_send(StartTask);
        log::info!("[manager] 登记任务 {} (实例 {})", msg.key, id);
        self.tasks.insert(msg.key, TaskEntry { id, addr, status });
        Ok(())
    }
}

/// 暂停任务并立即注销
pub struct Pause { pub key: String }
impl Message for Pause { type Result = (); }
impl Handler<Pause> for DownloadManagerActor {
    type Result = ();
    fn handle(&mut self, msg: Pause, _ctx: &mut Self::Context) {
        self.retire(&msg.key, Signal::Pause);
    }
}

/// 取消任务并立即注销
pub struct Cancel { pub key: String }
impl Message for Cancel { type Result = (); }
impl Handler<Cancel> for DownloadManagerActor {
    type Result = ();
    fn handle(&mut self, msg: Cancel, _ctx: &mut Self::Context) {
        self.retire(&msg.key, Signal::Cancel);
    }
}

/// 暂停所有运行中的任务，返回受影响的 key
pub struct PauseAll;
impl Message for PauseAll { type Result = Vec<String>; }
impl Handler<PauseAll> for DownloadManagerActor {
    type Result = MessageResult<PauseAll>;
    fn handle(&mut self, _msg: PauseAll, _ctx: &mut Self::Context) -> Self::Result {
        let keys = self.running_keys();
        for key in &keys {
            self.retire(key, Signal::Pause);
        }
        MessageResult(keys)
    }
}

/// 取消所有运行中的任务，返回受影响的 key
pub struct CancelAll;
impl Message for CancelAll { type Result = Vec<String>; }
impl Handler<CancelAll> for DownloadManagerActor {
    type Result = MessageResult<CancelAll>;
    fn handle(&mut self, _msg: CancelAll, _ctx: &mut Self::Context) -> Self::Result {
        let keys = self.running_keys();
        for key in &keys {
            self.retire(key, Signal::Cancel);
        }
        MessageResult(keys)
    }
}

/// 查询任务是否处于活动状态
pub struct QueryRunning { pub key: String }
impl Message for QueryRunning { type Result = bool; }
impl Handler<QueryRunning> for DownloadManagerActor {
    type Result = bool;
    fn handle(&mut self, msg: QueryRunning, _ctx: &mut Self::Context) -> Self::Result {
        self.tasks.get(&msg.key).map(|e| e.status.is_active()).unwrap_or(false)
    }
}

/// 查询所有已登记任务的 key
pub struct ListTasks;
impl Message for ListTasks { type Result = Vec<String>; }
impl Handler<ListTasks> for DownloadManagerActor {
    type Result = MessageResult<ListTasks>;
    fn handle(&mut self, _msg: ListTasks, _ctx: &mut Self::Context) -> Self::Result {
        let mut keys: Vec<String> = self.tasks.keys().cloned().collect();
        keys.sort();
        MessageResult(keys)
    }
}

impl Handler<TaskDestroyed> for DownloadManagerActor {
    type Result = ();
    fn handle(&mut self, msg: TaskDestroyed, _ctx: &mut Self::Context) {
        if self.tasks.get(&msg.key).map(|e| e.id) == Some(msg.id) {
            self.tasks.remove(&msg.key);
            log::debug!("[manager] 注销任务 {} (实例 {})", msg.key, msg.id);
        }
        if self.retiring.get(&msg.key) == Some(&msg.id) {
            self.retiring.remove(&msg.key);
            log::debug!("[manager] 任务 {} 的实例 {} 已退出", msg.key, msg.id);
        }
    }
}

impl Actor for DownloadManagerActor {
    type Context = Context<Self>;
}

/// 全局任务注册表 Actor，所有注册表变更都经过它的邮箱串行执行
pub struct DownloadManagerActor {
    pub context: TaskContext,
    pub tasks: HashMap<String, TaskEntry>,
    /// 已注销但工作者尚未全部退出的实例
    pub retiring: HashMap<String, Uuid>,
}

impl DownloadManagerActor {
    pub fn new(context: TaskContext) -> Self {
        Self {
            context,
            tasks: HashMap::new(),
            retiring: HashMap::new(),
        }
    }

    fn running_keys(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|(_, entry)| entry.status.is_active())
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn retire(&mut self, key: &str, signal: Signal) {
        if let Some(entry) = self.tasks.remove(key) {
            log::info!("[manager] 注销任务 {} (实例 {}): {:?}", key, entry.id, signal);
            match signal {
                Signal::Pause => entry.addr.do_send(PauseTask),
                Signal::Cancel => entry.addr.do_send(CancelTask),
            }
            self.retiring.insert(key.to_string(), entry.id);
        }
    }
}
