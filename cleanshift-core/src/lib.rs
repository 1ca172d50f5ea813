use serde::{Deserialize, Serialize};

pub mod classify;
pub mod command;
pub mod config;
pub mod drives;
pub mod environment;
pub mod error;
pub mod fs_ops;
pub mod guard;
pub mod relocation;
pub mod retention;
pub mod scanner;
pub mod service;
pub mod size;

#[cfg(all(test, unix))]
mod testutil;

pub use classify::PatternClassifier;
pub use command::{CommandOutcome, run_command};
pub use config::CleanShiftConfig;
pub use drives::{DriveInventory, VolumeInfo, system_root, volume_root};
pub use environment::{CleanupSuggestion, EnvironmentEntry, EnvironmentLocator, Priority};
pub use error::{ConfigError, RelocationError, ScanError};
pub use guard::CriticalPathGuard;
pub use relocation::{RelocationEngine, RelocationRecord};
pub use retention::{JunkCategory, JunkLocations, RetentionCleaner};
pub use scanner::{DirectoryReport, DirectoryScanner};
pub use service::{CleanShift, Housekeeper};
pub use size::{Measurement, SizeAggregator, parse_size_string};

/// 清理结果统计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanSummary {
    pub cleaned_items: usize,
    pub total_size_freed: u64,
    /// 未能完全清理的条目
    pub failed_items: Vec<String>,
    pub duration_ms: u64,
}

impl Default for CleanSummary {
    fn default() -> Self {
        Self::new()
    }
}

impl CleanSummary {
    pub fn new() -> Self {
        Self {
            cleaned_items: 0,
            total_size_freed: 0,
            failed_items: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn add_success(&mut self, size_freed: u64) {
        self.cleaned_items += 1;
        self.total_size_freed += size_freed;
    }

    pub fn add_failure(&mut self, item: String) {
        self.failed_items.push(item);
    }

    /// 部分删除：释放的空间计入总数，条目记为失败
    pub fn add_partial(&mut self, item: String, size_freed: u64) {
        self.total_size_freed += size_freed;
        self.failed_items.push(item);
    }

    pub fn format_size(&self) -> String {
        format_bytes(self.total_size_freed)
    }
}

/// 格式化字节大小为人类可读格式
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(200 * 1024 * 1024), "200.00 MB");
        assert_eq!(format_bytes(1073741824), "1.00 GB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024 * 1024 * 1024), "5120.00 TB");
    }

    #[test]
    fn test_clean_summary() {
        let mut summary = CleanSummary::new();
        summary.add_success(1024);
        summary.add_success(0);
        assert_eq!(summary.cleaned_items, 2);
        assert_eq!(summary.format_size(), "1.00 KB");

        summary.add_partial("/data/node_modules".to_string(), 512);
        assert_eq!(summary.cleaned_items, 2);
        assert_eq!(summary.total_size_freed, 1536);
        assert_eq!(summary.failed_items, vec!["/data/node_modules".to_string()]);

        summary.add_failure("/data/.npm".to_string());
        assert_eq!(summary.failed_items.len(), 2);
    }
}
