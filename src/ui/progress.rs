use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::mpsc::UnboundedSender;

use crate::core::delivery::{DownloadCallback, DownloadEvent};
use crate::core::error::DownloadError;

const BAR_TEMPLATE: &str = "{prefix:.bold} [{bar:30.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec} ETA {eta} {msg}";

/// 任务的终态通知，交给主循环决定是否重试
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskNotice {
    pub index: usize,
    pub event: DownloadEvent,
}

/// 管理所有任务的进度条
pub struct ProgressManager {
    multi: MultiProgress,
}

impl ProgressManager {
    pub fn new() -> Self {
        Self { multi: MultiProgress::new() }
    }

    /// 不输出到终端，用于测试
    pub fn hidden() -> Self {
        Self { multi: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()) }
    }

    pub fn add_task(&self, name: &str) -> ProgressBar {
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        let bar = self.multi.add(ProgressBar::new(0));
        bar.set_style(style);
        bar.set_prefix(name.to_string());
        bar.set_message("等待中");
        bar
    }

    /// 在进度条上方打印一行
    pub fn println(&self, line: &str) {
        let _ = self.multi.println(line);
    }
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 把下载事件渲染到一个进度条上
pub struct ProgressCallback {
    index: usize,
    bar: ProgressBar,
    notices: UnboundedSender<TaskNotice>,
}

impl ProgressCallback {
    pub fn new(index: usize, bar: ProgressBar, notices: UnboundedSender<TaskNotice>) -> Self {
        Self { index, bar, notices }
    }

    fn notify(&self, event: DownloadEvent) {
        let _ = self.notices.send(TaskNotice { index: self.index, event });
    }
}

impl DownloadCallback for ProgressCallback {
    fn on_connecting(&self) {
        self.bar.set_message("连接中");
    }

    fn on_connected(&self, length: u64, supports_range: bool) {
        self.bar.set_length(length);
        self.bar.set_message(if supports_range { "分段下载" } else { "单线程下载" });
    }

    fn on_progress(&self, finished: u64, length: u64, _percent: u8) {
        self.bar.set_length(length);
        self.bar.set_position(finished);
    }

    fn on_completed(&self) {
        if let Some(length) = self.bar.length() {
            self.bar.set_position(length);
        }
        self.bar.finish_with_message("✓ 完成");
        self.notify(DownloadEvent::Completed);
    }

    fn on_download_paused(&self) {
        self.bar.set_message("已暂停");
        self.notify(DownloadEvent::Paused);
    }

    fn on_download_canceled(&self) {
        self.bar.abandon_with_message("已取消");
        self.notify(DownloadEvent::Canceled);
    }

    fn on_failed(&self, error: DownloadError) {
        self.bar.set_message(format!("✗ {}", error));
        self.notify(DownloadEvent::Failed(error));
    }
}
