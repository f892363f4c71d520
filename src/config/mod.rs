use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::core::error::DownloadError;

/// 配置结构体
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// 每个任务的分段数（默认并行度）
    pub thread_count: usize,
    /// 共享工作池容量（同时运行的分段上限）
    pub max_thread_count: usize,
    /// 单次写入与持久化的块大小（字节）
    pub chunk_size: usize,
    /// 进度事件最小间隔（毫秒）
    pub progress_interval_ms: u64,
    /// 探测请求超时时间（秒），0 表示不限
    pub timeout: u64,
    /// User-Agent
    pub user_agent: String,
    /// 分段进度存储目录
    pub store_dir: String,
    /// 默认下载目录
    pub download_dir: String,
    /// 失败后的重试次数（仅由宿主程序使用）
    pub retry_count: usize,
    /// 重试延迟（秒）
    pub retry_delay: u64,
    /// 最大重试延迟（秒）
    pub retry_max_delay: u64,
    /// 日志文件
    pub log_file: String,
    /// 日志级别
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            thread_count: 4,
            max_thread_count: 8,
            chunk_size: 64 * 1024,
            progress_interval_ms: 500,
            timeout: 30,
            user_agent: "MultiDown/1.0".to_string(),
            store_dir: "./downloads/.segments".to_string(),
            download_dir: "./downloads".to_string(),
            retry_count: 3,
            retry_delay: 5,
            retry_max_delay: 60,
            log_file: "logs/app.log".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// 加载配置文件，不存在时写入带注释的默认配置
    pub fn load(path: &str) -> Result<Self, DownloadError> {
        if Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            match toml::from_str(&content) {
                Ok(config) => Ok(config),
                Err(e) => {
                    log::warn!("配置文件格式错误: {}，将使用默认配置", e);
                    Ok(Config::default())
                }
            }
        } else {
            let config = Config::default();
            config.save_with_tutorial(path)?;
            Ok(config)
        }
    }

    /// 保存带教程的配置文件（唯一写入方法）
    pub fn save_with_tutorial(&self, path: &str) -> Result<(), DownloadError> {
        if let Some(parent) = Path::new(path).parent() {
            fs::create_dir_all(parent)?;
        }
        let config_content = toml::to_string_pretty(self)
            .map_err(|e| DownloadError::ConfigurationError(format!("无法序列化配置: {}", e).into()))?;
        let full_content = format!("{}\n{}", Config::generate_tutorial_content(), config_content);
        fs::write(path, full_content)?;
        Ok(())
    }

    fn generate_tutorial_content() -> &'static str {
        r#"# MultiDown 配置文件
# ====================
#
# 命令行参数会覆盖配置文件中的设置，优先级：命令行 > 配置文件 > 默认值
#
# thread_count         每个任务切分的分段数；服务器不支持 Range 时固定为 1
# max_thread_count     共享工作池容量，必须 >= thread_count
# chunk_size           每次写入并记录进度的块大小（字节），暂停/取消在块边界生效
# progress_interval_ms 进度回调的最小间隔（毫秒），进度每增加 1% 也会回调
# timeout              探测请求超时（秒），0 表示不限；分段数据流不设超时
# store_dir            分段进度存储目录，进程重启后据此断点续传
# retry_count          失败后由命令行程序发起的重试次数（引擎本身不重试）
# retry_delay          第一次重试前的等待时间（秒），之后指数退避
# retry_max_delay      重试延迟上限（秒）
#
# 示例：
#   multidown https://example.com/file.zip
#   multidown -t 8 https://example.com/file.zip
#   multidown -d /path/to/downloads -f urls.txt
"#
    }

    /// 校验配置合法性
    pub fn validate(&self) -> Result<(), DownloadError> {
        if self.thread_count == 0 {
            return Err(DownloadError::ConfigurationError(Cow::Borrowed("线程数必须大于0")));
        }
        if self.max_thread_count == 0 {
            return Err(DownloadError::ConfigurationError(Cow::Borrowed("最大线程数必须大于0")));
        }
        if self.thread_count > self.max_thread_count {
            return Err(DownloadError::ConfigurationError(
                format!(
                    "线程数 {} 不能超过最大线程数 {}",
                    self.thread_count, self.max_thread_count
                )
                .into(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(DownloadError::ConfigurationError(Cow::Borrowed("块大小必须大于0")));
        }
        if self.store_dir.is_empty() {
            return Err(DownloadError::ConfigurationError(Cow::Borrowed("存储目录不能为空")));
        }
        Ok(())
    }

    /// 合并命令行参数到配置
    pub fn merge_from_args(&mut self, args: &crate::cli::Args) {
        if let Some(dir) = &args.download_dir {
            self.download_dir = dir.clone();
        }
        if let Some(thread_count) = args.thread_count {
            self.thread_count = thread_count;
            // 仅提高并行度时同步抬高池容量
            if self.max_thread_count < thread_count {
                self.max_thread_count = thread_count;
            }
        }
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn probe_timeout(&self) -> Option<Duration> {
        if self.timeout == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout))
        }
    }

    /// 获取配置摘要信息
    pub fn get_summary(&self) -> String {
        format!(
            "配置摘要:\n\
            - 下载目录: {}\n\
            - 分段数: {}\n\
            - 工作池容量: {}\n\
            - 块大小: {} 字节\n\
            - 探测超时: {}\n\
            - 重试次数: {}\n\
            - 进度存储: {}",
            self.download_dir,
            self.thread_count,
            self.max_thread_count,
            self.chunk_size,
            if self.timeout == 0 { "不限".to_string() } else { format!("{} 秒", self.timeout) },
            self.retry_count,
            self.store_dir,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.thread_count, 4);
        assert_eq!(config.max_thread_count, 8);
        assert_eq!(config.timeout, 30);
        assert_eq!(config.retry_count, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.thread_count = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_thread_count_against_pool_capacity() {
        for capacity in 1..=6 {
            for count in 1..=8 {
                let config = Config {
                    thread_count: count,
                    max_thread_count: capacity,
                    ..Config::default()
                };
                let result = config.validate();
                if count <= capacity {
                    assert!(result.is_ok(), "{} <= {} 应当合法", count, capacity);
                } else {
                    assert!(matches!(result, Err(DownloadError::ConfigurationError(_))));
                }
            }
        }
    }

    #[test]
    fn test_config_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multidown.conf");
        let path = path.to_str().unwrap();

        let config = Config {
            thread_count: 6,
            chunk_size: 4096,
            ..Config::default()
        };
        config.save_with_tutorial(path).expect("保存带教程的配置失败");
        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("MultiDown 配置文件"));

        let loaded = Config::load(path).expect("加载配置失败");
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_config_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("multidown.conf");
        let path = path.to_str().unwrap();

        let loaded = Config::load(path).unwrap();
        assert_eq!(loaded, Config::default());
        assert!(Path::new(path).exists());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str("thread_count = 2\n").unwrap();
        assert_eq!(config.thread_count, 2);
        assert_eq!(config.max_thread_count, 8);
    }

    #[test]
    fn test_config_summary() {
        let summary = Config::default().get_summary();
        assert!(summary.contains("配置摘要"));
        assert!(summary.contains("分段数"));
        assert!(summary.contains("30 秒"));
    }
}
