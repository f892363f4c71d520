//! 测试用的内存传输、回调记录器和故障存储

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::delivery::{DownloadCallback, DownloadEvent};
use super::error::{DownloadError, DownloadResult};
use super::store::{JsonSegmentStore, SegmentStore};
use super::task::chunk_manager::Segment;
use super::transport::{ByteRange, ByteStream, FileInfo, Transport};

/// 针对某个起始偏移的一次性故障
#[derive(Debug, Clone)]
pub enum Fault {
    /// 发送指定字节数后返回网络错误
    FailAfter(u64),
    /// 发送指定字节数后正常结束数据流
    TruncateAfter(u64),
    /// 每个数据块之前等待
    Delay(Duration),
}

pub struct MemoryTransport {
    data: Bytes,
    supports_range: bool,
    piece: usize,
    delay: Cell<Duration>,
    probe_delay: Cell<Duration>,
    probe_error: RefCell<Option<DownloadError>>,
    faults: RefCell<HashMap<u64, Fault>>,
    requests: RefCell<Vec<Option<ByteRange>>>,
}

impl MemoryTransport {
    pub fn new(data: Vec<u8>, supports_range: bool) -> Self {
        Self {
            data: Bytes::from(data),
            supports_range,
            piece: 500,
            delay: Cell::new(Duration::ZERO),
            probe_delay: Cell::new(Duration::ZERO),
            probe_error: RefCell::new(None),
            faults: RefCell::new(HashMap::new()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay.set(delay);
    }

    pub fn set_probe_delay(&self, delay: Duration) {
        self.probe_delay.set(delay);
    }

    pub fn fail_probe(&self, error: DownloadError) {
        *self.probe_error.borrow_mut() = Some(error);
    }

    pub fn inject(&self, start: u64, fault: Fault) {
        self.faults.borrow_mut().insert(start, fault);
    }

    pub fn requests(&self) -> Vec<Option<ByteRange>> {
        self.requests.borrow().clone()
    }

    pub fn take_requests(&self) -> Vec<Option<ByteRange>> {
        std::mem::take(&mut *self.requests.borrow_mut())
    }
}

#[async_trait(?Send)]
impl Transport for MemoryTransport {
    async fn probe(&self, _url: &str) -> DownloadResult<FileInfo> {
        let delay = self.probe_delay.get();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.probe_error.borrow().clone() {
            return Err(error);
        }
        Ok(FileInfo {
            size: self.data.len() as u64,
            supports_range: self.supports_range,
            last_modified: None,
            etag: None,
        })
    }

    async fn open(&self, _url: &str, range: Option<ByteRange>) -> DownloadResult<ByteStream> {
        self.requests.borrow_mut().push(range);
        let (start, end) = match range {
            Some(r) => (r.start, r.end),
            None => (0, self.data.len() as u64),
        };
        let mut body = self.data.slice(start as usize..end as usize);
        let mut delay = self.delay.get();
        let mut truncated = false;
        match self.faults.borrow_mut().remove(&start) {
            Some(Fault::FailAfter(n)) => {
                body = body.slice(..(n as usize).min(body.len()));
                truncated = true;
            }
            Some(Fault::TruncateAfter(n)) => body = body.slice(..(n as usize).min(body.len())),
            Some(Fault::Delay(d)) => delay = d,
            None => {}
        }

        let mut items: Vec<DownloadResult<Bytes>> = Vec::new();
        let mut offset = 0;
        while offset < body.len() {
            let next = (offset + self.piece).min(body.len());
            items.push(Ok(body.slice(offset..next)));
            offset = next;
        }
        if truncated {
            items.push(Err(DownloadError::network("连接被重置")));
        }

        Ok(stream::iter(items)
            .then(move |item| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                item
            })
            .boxed_local())
    }
}

/// 把回调转成事件流
pub struct Recorder {
    tx: mpsc::UnboundedSender<DownloadEvent>,
}

impl Recorder {
    pub fn new() -> (Arc<dyn DownloadCallback>, mpsc::UnboundedReceiver<DownloadEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }

    fn record(&self, event: DownloadEvent) {
        let _ = self.tx.send(event);
    }
}

impl DownloadCallback for Recorder {
    fn on_connecting(&self) {
        self.record(DownloadEvent::Connecting);
    }
    fn on_connected(&self, length: u64, supports_range: bool) {
        self.record(DownloadEvent::Connected { length, supports_range });
    }
    fn on_progress(&self, finished: u64, length: u64, percent: u8) {
        self.record(DownloadEvent::Progress { finished, length, percent });
    }
    fn on_completed(&self) {
        self.record(DownloadEvent::Completed);
    }
    fn on_download_paused(&self) {
        self.record(DownloadEvent::Paused);
    }
    fn on_download_canceled(&self) {
        self.record(DownloadEvent::Canceled);
    }
    fn on_failed(&self, error: DownloadError) {
        self.record(DownloadEvent::Failed(error));
    }
}

/// 收集事件直到终态
pub async fn wait_terminal(rx: &mut mpsc::UnboundedReceiver<DownloadEvent>) -> Vec<DownloadEvent> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("等待终态事件超时")
            .expect("回调通道已关闭");
        let done = event.is_terminal();
        events.push(event);
        if done {
            return events;
        }
    }
}

/// 进度写入总是失败的存储
pub struct FailingStore {
    inner: JsonSegmentStore,
}

impl FailingStore {
    pub fn new(inner: JsonSegmentStore) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl SegmentStore for FailingStore {
    async fn create_or_get_segments(&self, key: &str, partition: &[Segment]) -> DownloadResult<Vec<Segment>> {
        self.inner.create_or_get_segments(key, partition).await
    }

    async fn update_finished(&self, _key: &str, _index: usize, _finished: u64) -> DownloadResult<()> {
        Err(DownloadError::storage("磁盘已满"))
    }

    async fn get_segments(&self, key: &str) -> DownloadResult<Vec<Segment>> {
        self.inner.get_segments(key).await
    }

    async fn delete_segment(&self, key: &str, index: usize) -> DownloadResult<()> {
        self.inner.delete_segment(key, index).await
    }

    async fn delete_segments(&self, key: &str) -> DownloadResult<()> {
        self.inner.delete_segments(key).await
    }
}
