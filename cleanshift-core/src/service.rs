use std::path::Path;
use tracing::debug;

use crate::CleanSummary;
use crate::config::CleanShiftConfig;
use crate::drives::{DriveInventory, VolumeInfo};
use crate::environment::{EnvironmentEntry, EnvironmentLocator};
use crate::error::{RelocationError, ScanError};
use crate::relocation::{RelocationEngine, RelocationRecord};
use crate::retention::{JunkCategory, JunkLocations, RetentionCleaner};
use crate::scanner::{DirectoryReport, DirectoryScanner};

/// 磁盘整理服务的全部能力，前端只依赖这个 trait
pub trait Housekeeper {
    /// 扫描大目录
    fn scan(&self, root: &Path, min_size: u64) -> Result<Vec<DirectoryReport>, ScanError>;

    /// 清理指定类别的临时文件或缓存
    fn clean(&self, categories: &[JunkCategory], dry_run: bool) -> CleanSummary;

    fn find_environments(&self) -> Vec<EnvironmentEntry>;

    fn clean_environments(&self, entries: &[EnvironmentEntry], dry_run: bool) -> CleanSummary;

    /// 把目录迁移到其他卷并留下链接
    fn relocate(
        &self,
        source: &Path,
        target_volume: &Path,
        dry_run: bool,
    ) -> Result<RelocationRecord, RelocationError>;

    fn restore(&self, link: &Path, dry_run: bool) -> Result<RelocationRecord, RelocationError>;

    fn volumes(&self) -> Vec<VolumeInfo>;
}

/// 由各组件组合而成的默认实现
pub struct CleanShift {
    scanner: DirectoryScanner,
    retention: RetentionCleaner,
    environments: EnvironmentLocator,
    relocation: RelocationEngine,
    drives: DriveInventory,
}

impl CleanShift {
    pub fn from_config(config: &CleanShiftConfig) -> Self {
        let scanner = DirectoryScanner::from_config(&config.scan);
        // 开发环境查找、迁移与扫描共用同一份保护列表
        let environments = EnvironmentLocator::new(&config.environment, scanner.guard().clone());
        let relocation = RelocationEngine::new(&config.relocation, scanner.guard().clone());

        debug!(
            "受保护路径 {} 条，分类规则 {} 条",
            scanner.guard().prefixes().len(),
            scanner.classifier().patterns().count()
        );

        Self {
            scanner,
            retention: RetentionCleaner::new(JunkLocations::platform_default(), &config.retention),
            environments,
            relocation,
            drives: DriveInventory::new(),
        }
    }

    /// 替换清理位置，主要用于把清理范围限制在指定目录
    pub fn with_junk_locations(mut self, locations: JunkLocations, config: &CleanShiftConfig) -> Self {
        self.retention = RetentionCleaner::new(locations, &config.retention);
        self
    }

    pub fn scanner(&self) -> &DirectoryScanner {
        &self.scanner
    }

    pub fn retention(&self) -> &RetentionCleaner {
        &self.retention
    }

    pub fn environments(&self) -> &EnvironmentLocator {
        &self.environments
    }

    pub fn relocation(&self) -> &RelocationEngine {
        &self.relocation
    }
}

impl Default for CleanShift {
    fn default() -> Self {
        Self::from_config(&CleanShiftConfig::default())
    }
}

impl Housekeeper for CleanShift {
    fn scan(&self, root: &Path, min_size: u64) -> Result<Vec<DirectoryReport>, ScanError> {
        self.scanner.scan(root, min_size)
    }

    fn clean(&self, categories: &[JunkCategory], dry_run: bool) -> CleanSummary {
        self.retention.clean(categories, dry_run)
    }

    fn find_environments(&self) -> Vec<EnvironmentEntry> {
        self.environments.find_environments()
    }

    fn clean_environments(&self, entries: &[EnvironmentEntry], dry_run: bool) -> CleanSummary {
        self.environments.clean_environments(entries, dry_run)
    }

    fn relocate(
        &self,
        source: &Path,
        target_volume: &Path,
        dry_run: bool,
    ) -> Result<RelocationRecord, RelocationError> {
        self.relocation.move_with_link(source, target_volume, dry_run)
    }

    fn restore(&self, link: &Path, dry_run: bool) -> Result<RelocationRecord, RelocationError> {
        self.relocation.restore_link(link, dry_run)
    }

    fn volumes(&self) -> Vec<VolumeInfo> {
        self.drives.list_volumes()
    }
}
