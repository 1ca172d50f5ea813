use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::ConfigError;

/// 一次目录大小统计的结果
///
/// `bytes` 只包含成功读取到元数据的文件，`skipped` 记录因权限或 IO 错误而
/// 被跳过的条目数。结果是下界而不是错误。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Measurement {
    pub bytes: u64,
    pub skipped: usize,
}

impl Measurement {
    pub fn is_complete(&self) -> bool {
        self.skipped == 0
    }
}

/// 目录大小统计器
///
/// 不跟随符号链接：链接本身不计入大小，也不会进入链接指向的目录，
/// 避免重复统计和循环。
#[derive(Debug, Clone, Copy, Default)]
pub struct SizeAggregator;

impl SizeAggregator {
    pub fn new() -> Self {
        Self
    }

    /// 统计路径下所有文件的总大小（字节），路径不存在时返回 0
    pub fn directory_size<P: AsRef<Path>>(&self, path: P) -> u64 {
        self.measure(path).bytes
    }

    /// 统计路径下所有文件的总大小，同时记录跳过的条目数
    pub fn measure<P: AsRef<Path>>(&self, path: P) -> Measurement {
        let path = path.as_ref();
        let mut measurement = Measurement::default();

        if std::fs::symlink_metadata(path).is_err() {
            return measurement;
        }

        for entry in WalkDir::new(path)
            .follow_links(false)
            .follow_root_links(false)
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("跳过无法访问的条目: {}", e);
                    measurement.skipped += 1;
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            match entry.metadata() {
                Ok(metadata) => measurement.bytes += metadata.len(),
                Err(e) => {
                    debug!("无法读取文件元数据 {:?}: {}", entry.path(), e);
                    measurement.skipped += 1;
                }
            }
        }

        measurement
    }
}

/// 解析大小字符串（如 "10MB", "1GB", "500KiB"）
pub fn parse_size_string(size_str: &str) -> Result<u64, ConfigError> {
    let size_str = size_str.trim().to_uppercase();

    // 提取数字部分和单位部分
    let (number_part, unit_part) = if let Some(pos) = size_str.find(|c: char| c.is_alphabetic())
    {
        (size_str[..pos].trim(), &size_str[pos..])
    } else {
        (size_str.as_str(), "")
    };

    let number: f64 = number_part
        .parse()
        .map_err(|_| ConfigError::InvalidSize(format!("无效的数字: {number_part}")))?;

    if number < 0.0 {
        return Err(ConfigError::InvalidSize(format!("大小不能为负数: {number_part}")));
    }

    let multiplier = match unit_part {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1_024,
        "MB" | "M" => 1_000_000,
        "MIB" => 1_024 * 1_024,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1_024 * 1_024 * 1_024,
        "TB" | "T" => 1_000_000_000_000,
        "TIB" => 1_024_u64.pow(4),
        _ => {
            return Err(ConfigError::InvalidSize(format!(
                "不支持的单位: {unit_part}"
            )));
        }
    };

    Ok((number * multiplier as f64) as u64)
}
