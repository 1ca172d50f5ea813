use ignore::{DirEntry, WalkBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::classify::PatternClassifier;
use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::guard::CriticalPathGuard;
use crate::size::SizeAggregator;

/// 大目录报告
///
/// 嵌套目录会被分别报告（父目录的大小已经包含子目录），所以不能把
/// 所有报告的大小加起来当作磁盘占用总量。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryReport {
    pub path: PathBuf,
    pub size: u64,
    pub folder_type: String,
}

impl DirectoryReport {
    pub fn formatted_size(&self) -> String {
        crate::format_bytes(self.size)
    }
}

/// 大目录扫描器
pub struct DirectoryScanner {
    guard: CriticalPathGuard,
    classifier: PatternClassifier,
    sizer: SizeAggregator,
    max_depth: Option<usize>,
}

impl DirectoryScanner {
    pub fn new(guard: CriticalPathGuard, classifier: PatternClassifier) -> Self {
        Self {
            guard,
            classifier,
            sizer: SizeAggregator::new(),
            max_depth: None,
        }
    }

    /// 根据扫描配置创建扫描器（追加额外的保护路径和分类规则）
    pub fn from_config(config: &ScanConfig) -> Self {
        let guard = CriticalPathGuard::with_extra(&config.extra_critical_paths);
        let classifier = PatternClassifier::with_extra(&config.extra_patterns);
        Self::new(guard, classifier).with_max_depth(config.max_depth)
    }

    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn guard(&self) -> &CriticalPathGuard {
        &self.guard
    }

    pub fn classifier(&self) -> &PatternClassifier {
        &self.classifier
    }

    /// 扫描 `root` 下所有大小不小于 `min_size` 的目录，按大小降序返回
    ///
    /// 文件系统错误只会跳过对应的子树；只有空路径这种调用错误才会返回 Err。
    pub fn scan<P: AsRef<Path>>(
        &self,
        root: P,
        min_size: u64,
    ) -> Result<Vec<DirectoryReport>, ScanError> {
        let root = root.as_ref();
        if root.as_os_str().is_empty() {
            return Err(ScanError::EmptyRoot);
        }

        // 相对路径转换为绝对路径后再遍历，报告和关键路径判断都基于它
        let root = match absolute_root(root) {
            Ok(root) => root,
            Err(e) => {
                warn!("无法解析扫描路径 {:?}: {}", root, e);
                return Ok(Vec::new());
            }
        };
        let root = root.as_path();

        info!("开始扫描路径: {:?}", root);

        if !root.is_dir() {
            warn!("路径不存在或不是目录: {:?}", root);
            return Ok(Vec::new());
        }

        if self.guard.is_critical(root) {
            warn!("根路径是系统关键路径，跳过: {:?}", root);
            return Ok(Vec::new());
        }

        let mut builder = WalkBuilder::new(root);
        builder
            .standard_filters(false)
            .follow_links(false)
            .max_depth(self.max_depth);

        // 在进入子目录之前剪枝
        let guard = self.guard.clone();
        builder.filter_entry(move |entry| !is_critical_dir(&guard, entry));

        let mut reports = Vec::new();
        for entry in builder.build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("扫描错误: {}", e);
                    continue;
                }
            };

            if let Some(report) = self.process_entry(&entry, min_size) {
                reports.push(report);
            }
        }

        info!("找到 {} 个大目录", reports.len());
        Ok(Self::sort_by_size(reports))
    }

    /// 处理单个目录条目
    fn process_entry(&self, entry: &DirEntry, min_size: u64) -> Option<DirectoryReport> {
        if !entry.file_type().is_some_and(|t| t.is_dir()) {
            return None;
        }

        let path = entry.path();
        if self.guard.is_critical(path) {
            return None;
        }

        let measurement = self.sizer.measure(path);
        if measurement.skipped > 0 {
            debug!("{:?} 中有 {} 个条目无法访问", path, measurement.skipped);
        }

        if measurement.bytes < min_size {
            return None;
        }

        let folder_type = self.classifier.classify(path).to_string();
        debug!(
            "大目录: {:?} ({}, {})",
            path,
            crate::format_bytes(measurement.bytes),
            folder_type
        );

        Some(DirectoryReport {
            path: path.to_path_buf(),
            size: measurement.bytes,
            folder_type,
        })
    }

    /// 按大小排序（从大到小），大小相同时按路径排序保证结果稳定
    pub fn sort_by_size(mut reports: Vec<DirectoryReport>) -> Vec<DirectoryReport> {
        reports.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.path.cmp(&b.path)));
        reports
    }
}

impl Default for DirectoryScanner {
    fn default() -> Self {
        Self::new(CriticalPathGuard::default(), PatternClassifier::default())
    }
}

fn is_critical_dir(guard: &CriticalPathGuard, entry: &DirEntry) -> bool {
    let critical =
        entry.file_type().is_some_and(|t| t.is_dir()) && guard.is_critical(entry.path());
    if critical {
        debug!("跳过系统关键目录: {:?}", entry.path());
    }
    critical
}

/// 相对路径按当前工作目录解析成规范路径，绝对路径原样返回
pub(crate) fn absolute_root(root: &Path) -> std::io::Result<PathBuf> {
    if root.is_relative() {
        root.canonicalize()
    } else {
        Ok(root.to_path_buf())
    }
}
