mod progress;

use std::fmt;
pub use progress::{ProgressCallback, ProgressManager, TaskNotice};

pub fn print_success(message: &str) {
    println!("✓ {}", message);
}

pub fn print_error(message: &str) {
    println!("✗ {}", message);
}

#[derive(Debug, Default, Clone)]
pub struct DownloadSummary {
    pub total_files: usize,
    pub total_size: u64,
    pub elapsed_time: std::time::Duration,
    pub success_count: usize,
    pub paused_count: usize,
    pub canceled_count: usize,
    pub failed_count: usize,
}

impl fmt::Display for DownloadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n下载摘要:")?;
        writeln!(f, "总文件数: {}", self.total_files)?;
        writeln!(f, "已完成大小: {}", format_size(self.total_size))?;
        writeln!(f, "耗时: {:.2}秒", self.elapsed_time.as_secs_f64())?;
        writeln!(f, "成功: {}", self.success_count)?;
        if self.paused_count > 0 {
            writeln!(f, "暂停: {} (再次运行同一命令即可续传)", self.paused_count)?;
        }
        if self.canceled_count > 0 {
            writeln!(f, "取消: {}", self.canceled_count)?;
        }
        writeln!(f, "失败: {}", self.failed_count)?;
        Ok(())
    }
}

pub fn format_size(size: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512.00 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(5 * 1024 * 1024 * 1024), "5.00 GB");
    }

    #[test]
    fn test_summary_mentions_paused() {
        let summary = DownloadSummary { total_files: 2, success_count: 1, paused_count: 1, ..Default::default() };
        let text = summary.to_string();
        assert!(text.contains("暂停: 1"));
        assert!(!text.contains("取消"));
    }
}
