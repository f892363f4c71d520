use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::chunk_manager::percent;

/// 任务内所有工作者共享的协作式停止信号
#[derive(Debug, Clone, Default)]
pub struct TaskControl {
    is_paused: Arc<AtomicBool>,
    is_cancelled: Arc<AtomicBool>,
    /// 首个失败后让其余工作者停下
    is_halted: Arc<AtomicBool>,
}

impl TaskControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.is_paused.store(true, Ordering::SeqCst);
    }

    pub fn cancel(&self) {
        self.is_cancelled.store(true, Ordering::SeqCst);
    }

    pub fn halt(&self) {
        self.is_halted.store(true, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.is_cancelled.load(Ordering::SeqCst)
    }

    pub fn is_halted(&self) -> bool {
        self.is_halted.load(Ordering::SeqCst)
    }

    pub fn should_stop(&self) -> bool {
        self.is_paused() || self.is_cancelled() || self.is_halted()
    }
}

/// 任务级进度汇总与节流
///
/// 进度增加至少 1 个百分点，或距上次上报超过间隔时才产生一次上报。
#[derive(Debug)]
pub struct ProgressTracker {
    length: u64,
    finished: AtomicU64,
    interval: Duration,
    last: Mutex<(u8, Instant)>,
}

impl ProgressTracker {
    pub fn new(length: u64, already_finished: u64, interval: Duration) -> Self {
        Self {
            length,
            finished: AtomicU64::new(already_finished),
            interval,
            last: Mutex::new((percent(already_finished, length), Instant::now())),
        }
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn finished(&self) -> u64 {
        self.finished.load(Ordering::SeqCst)
    }

    /// 记录新写入的字节，需要上报时返回 `(finished, length, percent)`
    pub fn advance(&self, bytes: u64) -> Option<(u64, u64, u8)> {
        let finished = self.finished.fetch_add(bytes, Ordering::SeqCst) + bytes;
        let current = percent(finished, self.length);

        let mut last = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();
        if current > last.0 || now.duration_since(last.1) >= self.interval {
            *last = (current, now);
            Some((finished, self.length, current))
        } else {
            None
        }
    }
}
