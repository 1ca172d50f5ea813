use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::relocation::RelocationRecord;

/// 扫描错误，仅在调用方传入非法参数时出现
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("扫描根路径为空")]
    EmptyRoot,
}

/// 迁移/还原错误
///
/// `PartiallyMoved` 与 `SourceNotRemoved` 与其他变体不同：数据已经完整地位于
/// 目标卷上，原路径处却没有链接。前者原路径已空出，调用方应当使用
/// [`crate::RelocationEngine::repair_link`] 修复链接，而不是重新执行整个迁移；
/// 后者原路径还残留部分文件，需要先清理残留再修复。
#[derive(Debug, Error)]
pub enum RelocationError {
    #[error("源路径不存在: {0:?}")]
    SourceMissing(PathBuf),

    #[error("拒绝操作系统关键路径: {0:?}")]
    Protected(PathBuf),

    #[error("目标路径位于源目录之内: {0:?}")]
    TargetInsideSource(PathBuf),

    #[error("源路径不是普通目录: {0:?}")]
    NotADirectory(PathBuf),

    #[error("目标路径已存在: {0:?}")]
    TargetExists(PathBuf),

    #[error("路径不是符号链接: {0:?}")]
    NotALink(PathBuf),

    #[error("链接指向的目录不存在: {0:?}")]
    TargetMissing(PathBuf),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("数据已移动到 {:?}，但在 {:?} 创建链接失败: {source}", .record.relocated, .record.original)]
    PartiallyMoved {
        record: RelocationRecord,
        #[source]
        source: io::Error,
    },

    #[error("数据已复制到 {:?}，但 {:?} 中有 {leftovers} 个条目无法删除，链接未创建", .record.relocated, .record.original)]
    SourceNotRemoved {
        record: RelocationRecord,
        leftovers: usize,
    },
}

impl RelocationError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// 是否处于"数据已在目标卷但未链接"的中间状态
    pub fn is_partial(&self) -> bool {
        matches!(
            self,
            Self::PartiallyMoved { .. } | Self::SourceNotRemoved { .. }
        )
    }

    /// 中间状态下的迁移记录，可用于修复链接
    pub fn partial_record(&self) -> Option<&RelocationRecord> {
        match self {
            Self::PartiallyMoved { record, .. } | Self::SourceNotRemoved { record, .. } => {
                Some(record)
            }
            _ => None,
        }
    }
}

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件失败 {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("解析配置文件失败 {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("无效的大小: {0}")]
    InvalidSize(String),
}
