use std::borrow::Cow;
use std::io;
use thiserror::Error;

/// 下载引擎的统一错误类型
///
/// 错误会随 `Failed` 事件投递给回调，因此只携带可克隆的描述信息。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DownloadError {
    #[error("配置错误: {0}")]
    ConfigurationError(Cow<'static, str>),

    #[error("调用协议错误: {0}")]
    ProtocolViolation(String),

    #[error("无效的URL: {0}")]
    InvalidUrl(String),

    #[error("网络错误: {0}")]
    NetworkError(Cow<'static, str>),

    #[error("服务器错误: HTTP {0}")]
    ServerError(u16),

    #[error("数据流提前结束: 预期 {expected} 字节, 实际 {actual} 字节")]
    SizeMismatch {
        expected: u64,
        actual: u64,
    },

    #[error("无法获取资源长度")]
    UnknownLength,

    #[error("分段存储错误: {0}")]
    StorageError(Cow<'static, str>),

    #[error("IO错误: {0}")]
    IoError(Cow<'static, str>),

    #[error("Actor 邮箱错误: {0}")]
    Mailbox(String),
}

impl DownloadError {
    /// 探测或数据流阶段产生的错误
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            DownloadError::InvalidUrl(_)
                | DownloadError::NetworkError(_)
                | DownloadError::ServerError(_)
                | DownloadError::SizeMismatch { .. }
                | DownloadError::UnknownLength
        )
    }

    /// 分段存储或目标文件写入失败
    pub fn is_storage(&self) -> bool {
        matches!(self, DownloadError::StorageError(_) | DownloadError::IoError(_))
    }

    /// 调用方使用错误，重试也不会成功
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DownloadError::ConfigurationError(_)
                | DownloadError::ProtocolViolation(_)
                | DownloadError::InvalidUrl(_)
        )
    }

    pub fn storage(msg: impl Into<Cow<'static, str>>) -> Self {
        DownloadError::StorageError(msg.into())
    }

    pub fn network(msg: impl Into<Cow<'static, str>>) -> Self {
        DownloadError::NetworkError(msg.into())
    }
}

impl From<io::Error> for DownloadError {
    fn from(error: io::Error) -> Self {
        DownloadError::IoError(error.to_string().into())
    }
}

impl From<actix::MailboxError> for DownloadError {
    fn from(error: actix::MailboxError) -> Self {
        DownloadError::Mailbox(error.to_string())
    }
}

pub type DownloadResult<T> = Result<T, DownloadError>;
