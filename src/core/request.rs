use std::ffi::OsString;
use std::path::{Path, PathBuf};
use url::Url;

use super::error::DownloadError;

/// 下载请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub destination: PathBuf,
    /// 为 false 时丢弃已持久化的分段，从头下载
    pub resume: bool,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self { url: url.into(), destination: destination.into(), resume: true }
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn validate(&self) -> Result<(), DownloadError> {
        let parsed = Url::parse(&self.url).map_err(|_| DownloadError::InvalidUrl(self.url.clone()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DownloadError::InvalidUrl(self.url.clone()));
        }
        if self.destination.as_os_str().is_empty() {
            return Err(DownloadError::IoError("目标路径不能为空".into()));
        }
        Ok(())
    }

    /// 下载过程中写入的临时文件，完成后重命名为目标文件
    pub fn part_path(&self) -> PathBuf {
        part_path(&self.destination)
    }
}

pub fn part_path(destination: &Path) -> PathBuf {
    let mut name = OsString::from(destination.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

/// 由 tag 得到稳定的任务 key，进程重启后仍能找到同一组分段
pub fn task_key(tag: &str) -> String {
    format!("{:x}", md5::compute(tag.as_bytes()))
}
