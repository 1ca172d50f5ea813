use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::ConfigError;

const MIB: u64 = 1024 * 1024;

/// CleanShift 全局配置
///
/// 所有字段都有默认值，配置文件里只需要写想覆盖的部分。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanShiftConfig {
    pub scan: ScanConfig,
    pub environment: EnvironmentConfig,
    pub retention: RetentionConfig,
    pub relocation: RelocationConfig,
}

/// 大目录扫描配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// 报告阈值（MiB）
    pub min_size_mb: u64,
    /// 最大扫描深度，None 表示不限制
    pub max_depth: Option<usize>,
    /// 额外的受保护路径前缀（只能追加，不能移除内置列表）
    pub extra_critical_paths: Vec<String>,
    /// 追加在内置分类表之后的分类规则
    pub extra_patterns: Vec<PatternRule>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            min_size_mb: 100,
            max_depth: None,
            extra_critical_paths: Vec::new(),
            extra_patterns: Vec::new(),
        }
    }
}

impl ScanConfig {
    pub fn min_size_bytes(&self) -> u64 {
        self.min_size_mb.saturating_mul(MIB)
    }
}

/// 一条分类规则：路径中包含 `pattern` 时归类为 `label`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRule {
    pub pattern: String,
    pub label: String,
}

/// 开发环境缓存查找配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub max_depth: usize,
    pub min_size_mb: u64,
    pub command_timeout_secs: u64,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            min_size_mb: 50,
            command_timeout_secs: 60,
        }
    }
}

impl EnvironmentConfig {
    pub fn min_size_bytes(&self) -> u64 {
        self.min_size_mb.saturating_mul(MIB)
    }
}

/// 临时文件/缓存清理配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub maintenance_timeout_secs: u64,
    /// 追加的临时目录
    pub extra_temp_dirs: Vec<PathBuf>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            maintenance_timeout_secs: 300,
            extra_temp_dirs: Vec::new(),
        }
    }
}

/// 目录迁移配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelocationConfig {
    /// 目标卷上存放迁移目录的文件夹名
    pub staging_dir: String,
}

impl Default for RelocationConfig {
    fn default() -> Self {
        Self {
            staging_dir: "CleanShift_Moved".to_string(),
        }
    }
}

impl CleanShiftConfig {
    /// 默认配置文件路径: `<config_dir>/cleanshift/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cleanshift").join("config.toml"))
    }

    /// 从指定文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("已加载配置文件: {:?}", path);
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// 指定了路径就必须能读取；否则尝试默认路径，不存在时使用默认配置
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from_file(path),
            _ => {
                debug!("未找到配置文件，使用默认配置");
                Ok(Self::default())
            }
        }
    }
}
