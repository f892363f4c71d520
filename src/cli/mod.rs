//! CLI: 命令行接口和参数解析模块
//!
//! ## 主要功能
//!
//! - 命令行参数解析和验证
//! - 配置文件路径管理
//! - URL 列表处理（命令行参数和文件）
//! - 配置文件编辑器集成
//!
//! ## 支持的命令
//!
//! - 基本下载：`multidown <url>`
//! - 批量下载：`multidown -f urls.txt`
//! - 编辑配置：`multidown -e`
//! - 指定配置：`multidown -c config.conf <url>`
//! - 丢弃进度重新下载：`multidown --fresh <url>`
//!
//! ## 平台支持
//!
//! - Windows: `%APPDATA%/multidown/multidown.conf`
//! - macOS: `~/Library/Application Support/multidown/multidown.conf`
//! - Linux: `~/.config/multidown/multidown.conf`

use clap::Parser;
use std::borrow::Cow;
use std::env;
use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::core::error::DownloadError;
use crate::utils::validator::is_valid_url;

/// 获取平台默认配置文件路径
pub fn default_config_path() -> String {
    #[cfg(target_os = "windows")]
    {
        let appdata = env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        format!("{}/multidown/multidown.conf", appdata)
    }
    #[cfg(target_os = "macos")]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/Library/Application Support/multidown/multidown.conf", home)
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/.config/multidown/multidown.conf", home)
    }
}

/// 打开配置文件编辑器
pub fn open_config_in_editor(config_path: &str) {
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("notepad").arg(config_path).status().ok();
    }
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg("-e").arg(config_path).status().ok();
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        // 优先 xdg-open，否则 nano
        if std::process::Command::new("xdg-open").arg(config_path).status().is_err() {
            let _ = std::process::Command::new("nano").arg(config_path).status();
        }
    }
}

fn long_version() -> &'static str {
    concat!(env!("CARGO_PKG_VERSION"), " (built ", env!("VERGEN_BUILD_TIMESTAMP"), ")")
}

/// MultiDown 命令行参数
///
/// 示例用法：
///   multidown https://example.com/file.zip
///   multidown -e  # 编辑配置文件
///   multidown -c /path/to/config.conf https://example.com/file.zip
///
/// 更多用法请加 --help 查看
#[derive(Parser, Debug, Clone)]
#[command(
    name = "multidown",
    author = "panzhifu",
    version = long_version(),
    about = "一个用 Rust 编写的可断点续传多线程分段下载器",
    long_about = "按分段并发下载，进度持久化到本地，暂停或中断后再次运行同一命令即可续传。\n\n示例：\n  multidown https://example.com/file.zip\n  multidown -e\n  multidown -t 8 -d ~/Downloads https://example.com/file.zip\n"
)]
pub struct Args {
    /// 要下载的URL列表（可同时指定多个）
    #[arg(required = false, help = "要下载的URL列表，可以同时指定多个URL。")]
    pub urls: Vec<String>,

    /// 包含URL列表的文件路径
    #[arg(short, long, help = "包含URL列表的文件路径，每行一个URL。")]
    pub file: Option<String>,

    /// 配置文件路径，默认为平台推荐路径
    #[arg(short = 'c', long, default_value_t = default_config_path(), help = "配置文件路径，默认为平台推荐路径。")]
    pub config: String,

    /// 编辑配置文件（-e 或 --edit）
    #[arg(short = 'e', long = "edit", help = "用系统默认编辑器打开配置文件并退出。")]
    pub edit_config: bool,

    /// 指定下载目录
    #[arg(long, short = 'd', help = "指定下载目录，覆盖配置文件中的设置。")]
    pub download_dir: Option<String>,

    /// 指定下载文件名
    #[arg(long, short = 'n', help = "指定下载文件名，覆盖URL自动推断，仅在单个URL时有效。")]
    pub file_name: Option<String>,

    /// 指定分段数
    #[arg(long, short = 't', help = "指定每个任务的分段数，覆盖配置文件中的设置。")]
    pub thread_count: Option<usize>,

    /// 丢弃已保存的进度
    #[arg(long, help = "丢弃已保存的分段进度，从头下载。")]
    pub fresh: bool,
}

impl Args {
    /// 解析命令行参数并加载合并后的配置
    pub fn parse_args() -> Result<(Self, Config), DownloadError> {
        let args = Args::parse();

        if args.edit_config {
            if !Path::new(&args.config).exists() {
                Config::default().save_with_tutorial(&args.config)?;
            }
            open_config_in_editor(&args.config);
            std::process::exit(0);
        }

        let config = args.load_config()?;
        Ok((args, config))
    }

    pub fn load_config(&self) -> Result<Config, DownloadError> {
        let mut config = Config::load(&self.config)?;
        config.merge_from_args(self);
        config.validate()?;
        Ok(config)
    }

    /// 汇总命令行和文件中的URL
    pub fn get_urls(&self) -> Result<Vec<String>, DownloadError> {
        let mut urls = Vec::new();
        urls.extend_from_slice(&self.urls);

        if let Some(file_path) = &self.file {
            let content = fs::read_to_string(file_path)
                .map_err(|e| DownloadError::IoError(format!("无法读取URL文件 {}: {}", file_path, e).into()))?;

            // 按行读取URL，忽略空行和注释
            for line in content.lines() {
                let line = line.trim();
                if !line.is_empty() && !line.starts_with('#') {
                    urls.push(line.to_string());
                }
            }
        }

        if let Some(bad) = urls.iter().find(|url| !is_valid_url(url)) {
            return Err(DownloadError::InvalidUrl(bad.clone()));
        }
        if urls.is_empty() {
            return Err(DownloadError::ConfigurationError(Cow::Borrowed(
                "未提供任何URL。请通过命令行参数或文件提供至少一个URL。",
            )));
        }

        Ok(urls)
    }
}
