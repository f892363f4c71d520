use chrono::Local; // 用于获取本地时间
use env_logger::{Builder, Target};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::core::error::DownloadError;

/// 默认单个日志文件上限
pub const DEFAULT_MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// 超过上限时把当前文件改名为 `.backup` 并重新打开
pub struct RotatingFile {
    file: File,
    file_path: PathBuf,
    max_size: u64,
    current_size: u64,
}

impl RotatingFile {
    pub fn open(file_path: impl AsRef<Path>, max_size: u64) -> io::Result<Self> {
        let file_path = file_path.as_ref().to_path_buf();
        // 确保日志目录存在
        if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&file_path)?;
        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self { file, file_path, max_size, current_size })
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self.file_path.clone().into_os_string();
        name.push(".backup");
        PathBuf::from(name)
    }

    /// 检查并执行日志轮转
    fn check_rotation(&mut self) -> io::Result<()> {
        if self.current_size > self.max_size {
            self.file.flush()?;
            let backup_path = self.backup_path();
            if backup_path.exists() {
                std::fs::remove_file(&backup_path)?;
            }
            std::fs::rename(&self.file_path, &backup_path)?;
            self.file = OpenOptions::new().create(true).append(true).open(&self.file_path)?;
            self.current_size = 0;
        }
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_rotation()?;
        self.file.write_all(buf)?;
        self.current_size += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// 安装写入日志文件的全局 logger，终端留给进度条
///
/// `level` 使用 env_logger 的过滤语法，例如 `info` 或 `multidown=debug`。
pub fn init(file_path: &str, level: &str) -> Result<(), DownloadError> {
    let file = RotatingFile::open(file_path, DEFAULT_MAX_LOG_SIZE)?;
    Builder::new()
        .parse_filters(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(file)))
        .try_init()
        .map_err(|e| DownloadError::ConfigurationError(format!("日志初始化失败: {}", e).into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rotation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs/app.log");
        let mut file = RotatingFile::open(&path, 16).unwrap();

        file.write_all(b"first line of the log\n").unwrap();
        file.write_all(b"second\n").unwrap();
        file.flush().unwrap();

        let backup = dir.path().join("logs/app.log.backup");
        assert_eq!(std::fs::read_to_string(backup).unwrap(), "first line of the log\n");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second\n");
    }

    #[test]
    fn test_reopen_keeps_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "0123456789").unwrap();
        let file = RotatingFile::open(&path, 1024).unwrap();
        assert_eq!(file.current_size, 10);
    }
}
