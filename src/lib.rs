//! MultiDown: 可断点续传的多线程分段下载引擎
//!
//! 宿主在 actix System 中用 [`DownloadManager::init`] 构造管理器，
//! 通过 [`DownloadCallback`] 接收连接、进度和终态事件。

pub mod cli;
pub mod config;
pub mod core;
pub mod ui;
pub mod utils;

pub use crate::config::Config;
pub use crate::core::{
    task_key, DownloadCallback, DownloadError, DownloadEvent, DownloadInfo, DownloadManager, DownloadRequest,
    DownloadResult,
};
