use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::CleanSummary;
use crate::command::run_command;
use crate::config::EnvironmentConfig;
use crate::drives::system_root;
use crate::fs_ops::remove_best_effort;
use crate::guard::CriticalPathGuard;
use crate::scanner::absolute_root;
use crate::size::SizeAggregator;

const GIB: u64 = 1024 * 1024 * 1024;
const MIB: u64 = 1024 * 1024;

/// 开发环境特征
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentSignature {
    pub key: &'static str,
    pub category: &'static str,
    pub patterns: &'static [&'static str],
    pub description: &'static str,
    pub command: Option<&'static str>,
}

/// 内置的开发环境特征表，按优先级排列
pub const ENVIRONMENT_SIGNATURES: &[EnvironmentSignature] = &[
    EnvironmentSignature {
        key: "node_modules",
        category: "Node.js",
        patterns: &["node_modules"],
        description: "Node.js package cache",
        command: Some("npm cache clean --force"),
    },
    EnvironmentSignature {
        key: "python_cache",
        category: "Python",
        patterns: &["__pycache__", ".pyc"],
        description: "Python bytecode cache",
        command: None,
    },
    EnvironmentSignature {
        key: "pip_cache",
        category: "Python",
        patterns: &[".pip", "pip-cache"],
        description: "Pip package cache",
        command: Some("pip cache purge"),
    },
    EnvironmentSignature {
        key: "conda_env",
        category: "Conda",
        patterns: &["miniconda", "anaconda", ".conda"],
        description: "Conda environments",
        command: Some("conda clean --all"),
    },
    EnvironmentSignature {
        key: "npm_cache",
        category: "NPM",
        patterns: &[".npm"],
        description: "NPM cache directory",
        command: Some("npm cache clean --force"),
    },
    EnvironmentSignature {
        key: "gradle_cache",
        category: "Gradle",
        patterns: &[".gradle"],
        description: "Gradle build cache",
        command: None,
    },
    EnvironmentSignature {
        key: "maven_cache",
        category: "Maven",
        patterns: &[".m2"],
        description: "Maven repository cache",
        command: None,
    },
];

/// 找到的开发环境目录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentEntry {
    pub name: String,
    pub category: String,
    pub path: PathBuf,
    pub size: u64,
    pub description: String,
    pub command: Option<String>,
    pub key: String,
}

impl EnvironmentEntry {
    fn from_signature(signature: &EnvironmentSignature, path: &Path, size: u64) -> Self {
        Self {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.to_string_lossy().to_string()),
            category: signature.category.to_string(),
            path: path.to_path_buf(),
            size,
            description: signature.description.to_string(),
            command: signature.command.map(str::to_string),
            key: signature.key.to_string(),
        }
    }

    pub fn formatted_size(&self) -> String {
        crate::format_bytes(self.size)
    }
}

/// 清理建议的优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// 高: ≥ 1 GiB，中: ≥ 500 MiB，其余为低
    pub fn from_size(total_size: u64) -> Self {
        if total_size >= GIB {
            Self::High
        } else if total_size >= 500 * MIB {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        };
        f.write_str(label)
    }
}

/// 按类别汇总的清理建议
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupSuggestion {
    pub category: String,
    pub count: usize,
    pub total_size: u64,
    pub priority: Priority,
    pub suggestion: String,
}

/// 开发环境查找器
pub struct EnvironmentLocator {
    guard: CriticalPathGuard,
    sizer: SizeAggregator,
    max_depth: usize,
    min_size: u64,
    command_timeout: Duration,
}

impl EnvironmentLocator {
    pub fn new(config: &EnvironmentConfig, guard: CriticalPathGuard) -> Self {
        Self {
            guard,
            sizer: SizeAggregator::new(),
            max_depth: config.max_depth,
            min_size: config.min_size_bytes(),
            command_timeout: Duration::from_secs(config.command_timeout_secs),
        }
    }

    /// 默认搜索位置：用户目录、系统盘根目录、本地/漫游应用数据目录
    pub fn default_search_roots() -> Vec<PathBuf> {
        let mut roots = Vec::new();
        if let Some(home) = dirs::home_dir() {
            roots.push(home);
        }
        roots.push(system_root());
        if let Some(local) = dirs::data_local_dir() {
            roots.push(local);
        }
        if let Some(roaming) = dirs::data_dir() {
            roots.push(roaming);
        }

        let mut seen = HashSet::new();
        roots.retain(|root| seen.insert(root.clone()));
        roots
    }

    /// 在默认位置查找开发环境，按大小降序返回
    pub fn find_environments(&self) -> Vec<EnvironmentEntry> {
        self.find_in(&Self::default_search_roots())
    }

    /// 在指定位置查找开发环境，按大小降序返回
    pub fn find_in<P: AsRef<Path>>(&self, roots: &[P]) -> Vec<EnvironmentEntry> {
        let start_time = Instant::now();
        let mut found = Vec::new();

        for root in roots {
            let Ok(root) = absolute_root(root.as_ref()) else {
                debug!("搜索位置不存在: {:?}", root.as_ref());
                continue;
            };
            let root = root.as_path();
            if !root.is_dir() {
                debug!("搜索位置不存在: {:?}", root);
                continue;
            }
            info!("查找开发环境: {:?}", root);
            self.scan_root(root, &mut found);
        }

        let mut entries = remove_nested(found);
        entries.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.path.cmp(&b.path)));

        info!(
            "找到 {} 个开发环境，耗时 {}ms",
            entries.len(),
            start_time.elapsed().as_millis()
        );
        entries
    }

    fn scan_root(&self, root: &Path, found: &mut Vec<EnvironmentEntry>) {
        let mut walker = WalkDir::new(root)
            .follow_links(false)
            .max_depth(self.max_depth)
            .into_iter();

        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("跳过无法访问的目录: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_dir() {
                continue;
            }

            let path = entry.path();
            if self.guard.is_critical(path) {
                debug!("跳过系统关键目录: {:?}", path);
                walker.skip_current_dir();
                continue;
            }

            let Some(signature) = match_signature(&entry.file_name().to_string_lossy()) else {
                continue;
            };

            // 已匹配的目录不再深入，避免 node_modules 嵌套重复统计
            walker.skip_current_dir();

            let size = self.sizer.directory_size(path);
            if size < self.min_size {
                debug!(
                    "{:?} 只有 {}，低于阈值",
                    path,
                    crate::format_bytes(size)
                );
                continue;
            }

            debug!("发现 {} 环境: {:?}", signature.category, path);
            found.push(EnvironmentEntry::from_signature(signature, path, size));
        }
    }

    /// 按类别汇总，生成按总大小降序排列的清理建议
    pub fn suggest_cleanup(&self, entries: &[EnvironmentEntry]) -> Vec<CleanupSuggestion> {
        suggest_cleanup(entries)
    }

    /// 清理单个开发环境，返回释放（或预计释放）的字节数
    pub fn clean_environment(&self, entry: &EnvironmentEntry, dry_run: bool) -> u64 {
        if dry_run {
            info!(
                "DRY RUN: 将清理 {} ({})",
                entry.path.display(),
                entry.formatted_size()
            );
            return entry.size;
        }

        if let Some(command) = &entry.command {
            let outcome = run_command(command, entry.path.parent(), self.command_timeout);
            debug!("清理命令 {} 结果: {:?}", command, outcome);
        }

        if std::fs::symlink_metadata(&entry.path).is_err() {
            debug!("{:?} 已不存在", entry.path);
            return 0;
        }

        let size = self.sizer.directory_size(&entry.path);
        let leftovers = remove_best_effort(&entry.path);
        if leftovers > 0 {
            warn!("{:?} 有 {} 个条目未能删除", entry.path, leftovers);
        }
        info!("已清理 {:?} ({})", entry.path, crate::format_bytes(size));
        size
    }

    /// 批量清理开发环境
    pub fn clean_environments(&self, entries: &[EnvironmentEntry], dry_run: bool) -> CleanSummary {
        let start_time = Instant::now();
        let mut summary = CleanSummary::new();

        for entry in entries {
            let freed = self.clean_environment(entry, dry_run);
            if !dry_run && entry.path.exists() {
                summary.add_partial(entry.path.to_string_lossy().to_string(), freed);
            } else {
                summary.add_success(freed);
            }
        }

        summary.duration_ms = start_time.elapsed().as_millis() as u64;
        info!(
            "开发环境清理完成: 成功 {} 个，失败 {} 个，释放空间 {}",
            summary.cleaned_items,
            summary.failed_items.len(),
            summary.format_size()
        );
        summary
    }
}

impl Default for EnvironmentLocator {
    fn default() -> Self {
        Self::new(&EnvironmentConfig::default(), CriticalPathGuard::default())
    }
}

/// 目录名匹配的第一个特征（大小写不敏感）
pub fn match_signature(dir_name: &str) -> Option<&'static EnvironmentSignature> {
    let lowered = dir_name.to_lowercase();
    ENVIRONMENT_SIGNATURES.iter().find(|signature| {
        signature
            .patterns
            .iter()
            .any(|pattern| lowered.contains(pattern))
    })
}

/// 按类别汇总环境条目
pub fn suggest_cleanup(entries: &[EnvironmentEntry]) -> Vec<CleanupSuggestion> {
    // 按首次出现的顺序分组，排序稳定
    let mut groups: Vec<(String, usize, u64)> = Vec::new();
    for entry in entries {
        match groups.iter_mut().find(|(category, _, _)| *category == entry.category) {
            Some((_, count, total)) => {
                *count += 1;
                *total += entry.size;
            }
            None => groups.push((entry.category.clone(), 1, entry.size)),
        }
    }

    let mut suggestions: Vec<CleanupSuggestion> = groups
        .into_iter()
        .map(|(category, count, total_size)| CleanupSuggestion {
            suggestion: format!(
                "Clean {count} {category} environments to free {}",
                crate::format_bytes(total_size)
            ),
            priority: Priority::from_size(total_size),
            category,
            count,
            total_size,
        })
        .collect();

    suggestions.sort_by(|a, b| b.total_size.cmp(&a.total_size));
    suggestions
}

/// 去掉位于其他条目内部的条目（多个搜索位置可能重叠）
fn remove_nested(mut entries: Vec<EnvironmentEntry>) -> Vec<EnvironmentEntry> {
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    let mut kept: Vec<EnvironmentEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        if kept.iter().any(|k| entry.path.starts_with(&k.path)) {
            continue;
        }
        kept.push(entry);
    }
    kept
}
