use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::CleanSummary;
use crate::command::{CommandOutcome, run_command};
use crate::config::RetentionConfig;
use crate::fs_ops::remove_best_effort;
use crate::size::SizeAggregator;

/// 可清理的垃圾类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JunkCategory {
    Temp,
    BrowserCache,
    SystemCache,
}

impl fmt::Display for JunkCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Temp => "Temp files",
            Self::BrowserCache => "Browser cache",
            Self::SystemCache => "System cache",
        };
        f.write_str(label)
    }
}

/// 浏览器缓存位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserCache {
    /// 整个目录都是缓存（Chrome/Edge）
    Directory(PathBuf),
    /// 配置文件根目录，每个配置文件下的 `cache_dir` 子目录是缓存（Firefox）
    Profiles { root: PathBuf, cache_dir: String },
}

/// 系统缓存清理方案
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemCachePlan {
    /// 清理前执行的系统维护工具
    pub maintenance_commands: Vec<String>,
    /// 删除缓存期间需要停止的服务
    pub services: Vec<String>,
    /// 停止服务的命令模板，`{}` 会被替换为服务名
    pub stop_template: String,
    /// 启动服务的命令模板
    pub start_template: String,
    /// 需要整体删除的缓存目录
    pub cache_dirs: Vec<PathBuf>,
}

/// 各类垃圾文件的位置
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JunkLocations {
    pub temp_dirs: Vec<PathBuf>,
    pub browser_caches: Vec<BrowserCache>,
    pub system: SystemCachePlan,
}

impl JunkLocations {
    /// 当前平台的默认位置
    pub fn platform_default() -> Self {
        let mut temp_dirs = vec![std::env::temp_dir()];
        for var in ["TEMP", "TMP"] {
            if let Some(dir) = std::env::var_os(var) {
                temp_dirs.push(PathBuf::from(dir));
            }
        }

        Self {
            temp_dirs: platform_temp_dirs(temp_dirs),
            browser_caches: platform_browser_caches(),
            system: platform_system_plan(),
        }
    }
}

#[cfg(windows)]
fn platform_temp_dirs(mut temp_dirs: Vec<PathBuf>) -> Vec<PathBuf> {
    temp_dirs.push(PathBuf::from(r"C:\Windows\Temp"));
    temp_dirs.push(PathBuf::from(r"C:\Windows\Prefetch"));
    if let Some(local) = dirs::data_local_dir() {
        temp_dirs.push(local.join("Temp"));
    }
    temp_dirs
}

#[cfg(not(windows))]
fn platform_temp_dirs(temp_dirs: Vec<PathBuf>) -> Vec<PathBuf> {
    temp_dirs
}

#[cfg(windows)]
fn platform_browser_caches() -> Vec<BrowserCache> {
    let mut caches = Vec::new();
    if let Some(local) = dirs::data_local_dir() {
        caches.push(BrowserCache::Directory(
            local.join(r"Google\Chrome\User Data\Default\Cache"),
        ));
        caches.push(BrowserCache::Directory(
            local.join(r"Microsoft\Edge\User Data\Default\Cache"),
        ));
    }
    if let Some(roaming) = dirs::data_dir() {
        caches.push(BrowserCache::Profiles {
            root: roaming.join(r"Mozilla\Firefox\Profiles"),
            cache_dir: "cache2".to_string(),
        });
    }
    caches
}

#[cfg(target_os = "macos")]
fn platform_browser_caches() -> Vec<BrowserCache> {
    let mut caches = Vec::new();
    if let Some(cache) = dirs::cache_dir() {
        caches.push(BrowserCache::Directory(cache.join("Google/Chrome/Default/Cache")));
        caches.push(BrowserCache::Directory(cache.join("Microsoft Edge/Default/Cache")));
        caches.push(BrowserCache::Profiles {
            root: cache.join("Firefox/Profiles"),
            cache_dir: "cache2".to_string(),
        });
    }
    caches
}

#[cfg(all(unix, not(target_os = "macos")))]
fn platform_browser_caches() -> Vec<BrowserCache> {
    let mut caches = Vec::new();
    if let Some(cache) = dirs::cache_dir() {
        caches.push(BrowserCache::Directory(cache.join("google-chrome/Default/Cache")));
        caches.push(BrowserCache::Directory(cache.join("microsoft-edge/Default/Cache")));
        caches.push(BrowserCache::Profiles {
            root: cache.join("mozilla/firefox"),
            cache_dir: "cache2".to_string(),
        });
    }
    caches
}

#[cfg(windows)]
fn platform_system_plan() -> SystemCachePlan {
    SystemCachePlan {
        maintenance_commands: vec!["cleanmgr /sagerun:1".to_string()],
        services: ["wuauserv", "cryptSvc", "bits", "msiserver"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        stop_template: "net stop {}".to_string(),
        start_template: "net start {}".to_string(),
        cache_dirs: vec![PathBuf::from(r"C:\Windows\SoftwareDistribution\Download")],
    }
}

#[cfg(not(windows))]
fn platform_system_plan() -> SystemCachePlan {
    SystemCachePlan::default()
}

/// 停止的服务在 drop 时重新启动，删除步骤失败也不例外
struct StoppedServices<'a> {
    services: Vec<String>,
    start_template: &'a str,
    timeout: Duration,
}

impl<'a> StoppedServices<'a> {
    fn stop(plan: &'a SystemCachePlan, timeout: Duration) -> Self {
        let mut stopped = Self {
            services: Vec::new(),
            start_template: &plan.start_template,
            timeout,
        };

        for service in &plan.services {
            let command = plan.stop_template.replace("{}", service);
            match run_command(&command, None, timeout) {
                CommandOutcome::Succeeded => stopped.services.push(service.clone()),
                outcome => warn!("停止服务 {} 失败: {:?}", service, outcome),
            }
        }
        stopped
    }
}

impl Drop for StoppedServices<'_> {
    fn drop(&mut self) {
        for service in &self.services {
            let command = self.start_template.replace("{}", service);
            let outcome = run_command(&command, None, self.timeout);
            if !outcome.is_success() {
                warn!("重新启动服务 {} 失败: {:?}", service, outcome);
            }
        }
    }
}

/// 临时文件与缓存清理器
pub struct RetentionCleaner {
    locations: JunkLocations,
    sizer: SizeAggregator,
    maintenance_timeout: Duration,
}

impl RetentionCleaner {
    pub fn new(locations: JunkLocations, config: &RetentionConfig) -> Self {
        let mut locations = locations;
        locations
            .temp_dirs
            .extend(config.extra_temp_dirs.iter().cloned());
        locations.temp_dirs = dedup_dirs(locations.temp_dirs);

        Self {
            locations,
            sizer: SizeAggregator::new(),
            maintenance_timeout: Duration::from_secs(config.maintenance_timeout_secs),
        }
    }

    pub fn locations(&self) -> &JunkLocations {
        &self.locations
    }

    /// 清理临时目录中的所有条目（目录本身保留）
    pub fn clean_temp(&self, dry_run: bool) -> u64 {
        let mut total_freed = 0;

        for temp_dir in &self.locations.temp_dirs {
            let entries = match fs::read_dir(temp_dir) {
                Ok(entries) => entries,
                Err(e) => {
                    debug!("无法读取临时目录 {:?}: {}", temp_dir, e);
                    continue;
                }
            };

            for entry in entries.flatten() {
                total_freed += self.clean_entry(&entry.path(), dry_run);
            }
        }

        info!(
            "临时文件{}: {}",
            if dry_run { "（预览）" } else { "" },
            crate::format_bytes(total_freed)
        );
        total_freed
    }

    /// 清理浏览器缓存
    pub fn clean_browser_cache(&self, dry_run: bool) -> u64 {
        let mut total_freed = 0;

        for cache in &self.locations.browser_caches {
            match cache {
                BrowserCache::Directory(path) => {
                    total_freed += self.clean_directory(path, dry_run);
                }
                BrowserCache::Profiles { root, cache_dir } => {
                    let profiles = match fs::read_dir(root) {
                        Ok(profiles) => profiles,
                        Err(_) => continue,
                    };
                    for profile in profiles.flatten() {
                        let cache_path = profile.path().join(cache_dir);
                        total_freed += self.clean_directory(&cache_path, dry_run);
                    }
                }
            }
        }

        info!(
            "浏览器缓存{}: {}",
            if dry_run { "（预览）" } else { "" },
            crate::format_bytes(total_freed)
        );
        total_freed
    }

    /// 清理系统缓存
    ///
    /// 真实执行时先运行系统维护工具，再停止相关服务、删除缓存目录，
    /// 最后无论删除是否成功都会重新启动已停止的服务。
    pub fn clean_system_cache(&self, dry_run: bool) -> u64 {
        let plan = &self.locations.system;

        if dry_run {
            return plan
                .cache_dirs
                .iter()
                .map(|dir| self.clean_directory(dir, true))
                .sum();
        }

        for command in &plan.maintenance_commands {
            let outcome = run_command(command, None, self.maintenance_timeout);
            debug!("维护工具 {} 结果: {:?}", command, outcome);
        }

        let _stopped = StoppedServices::stop(plan, self.maintenance_timeout);

        let total_freed = plan
            .cache_dirs
            .iter()
            .map(|dir| self.clean_directory(dir, false))
            .sum();

        info!("系统缓存: {}", crate::format_bytes(total_freed));
        total_freed
    }

    /// 一次清理多个类别
    pub fn clean(&self, categories: &[JunkCategory], dry_run: bool) -> CleanSummary {
        let start_time = Instant::now();
        let mut summary = CleanSummary::new();

        for category in categories {
            let freed = self.clean_category(*category, dry_run);
            debug!("{}: {}", category, crate::format_bytes(freed));
            summary.add_success(freed);
        }

        summary.duration_ms = start_time.elapsed().as_millis() as u64;
        summary
    }

    pub fn clean_category(&self, category: JunkCategory, dry_run: bool) -> u64 {
        match category {
            JunkCategory::Temp => self.clean_temp(dry_run),
            JunkCategory::BrowserCache => self.clean_browser_cache(dry_run),
            JunkCategory::SystemCache => self.clean_system_cache(dry_run),
        }
    }

    /// 清理单个条目：文件按长度计算，目录按递归大小计算
    fn clean_entry(&self, path: &Path, dry_run: bool) -> u64 {
        let metadata = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(_) => return 0,
        };

        if metadata.is_dir() {
            return self.clean_directory(path, dry_run);
        }

        let size = if metadata.is_file() { metadata.len() } else { 0 };
        if dry_run {
            return size;
        }

        match remove_best_effort(path) {
            0 => size,
            _ => {
                debug!("文件正在使用或无权限，跳过: {:?}", path);
                0
            }
        }
    }

    /// 删除整个目录，返回删除前测得的大小
    fn clean_directory(&self, path: &Path, dry_run: bool) -> u64 {
        if !path.is_dir() {
            return 0;
        }

        let size = self.sizer.directory_size(path);
        if !dry_run {
            let leftovers = remove_best_effort(path);
            if leftovers > 0 {
                debug!("{:?} 有 {} 个条目未能删除", path, leftovers);
            }
        }
        size
    }
}

impl Default for RetentionCleaner {
    fn default() -> Self {
        Self::new(JunkLocations::platform_default(), &RetentionConfig::default())
    }
}

/// 去重（TEMP 和 TMP 通常指向同一目录），保留首次出现的顺序
fn dedup_dirs(dirs: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    dirs.into_iter()
        .filter(|dir| !dir.as_os_str().is_empty())
        .filter(|dir| {
            let key = dir.canonicalize().unwrap_or_else(|_| dir.clone());
            seen.insert(key)
        })
        .collect()
}
