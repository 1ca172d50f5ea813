use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::config::RelocationConfig;
use crate::error::RelocationError;
use crate::fs_ops::{MoveError, create_dir_link, is_link, move_tree, remove_dir_link};
use crate::guard::CriticalPathGuard;
use crate::size::SizeAggregator;

/// 一次迁移（或还原）涉及的两个位置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocationRecord {
    /// 原始位置（迁移后是一个链接）
    pub original: PathBuf,
    /// 目标卷上的新位置
    pub relocated: PathBuf,
    /// 涉及的数据大小
    pub bytes: u64,
}

impl RelocationRecord {
    pub fn formatted_size(&self) -> String {
        crate::format_bytes(self.bytes)
    }
}

type LinkFn = fn(&Path, &Path) -> io::Result<()>;
type MoveFn = fn(&Path, &Path) -> Result<(), MoveError>;

/// 目录迁移器：把目录移到其他卷，并在原位置留下目录链接
pub struct RelocationEngine {
    staging_dir: String,
    guard: CriticalPathGuard,
    sizer: SizeAggregator,
    link_dir: LinkFn,
    move_dir: MoveFn,
}

impl RelocationEngine {
    pub fn new(config: &RelocationConfig, guard: CriticalPathGuard) -> Self {
        Self {
            staging_dir: config.staging_dir.clone(),
            guard,
            sizer: SizeAggregator::new(),
            link_dir: create_dir_link,
            move_dir: move_tree,
        }
    }

    /// 替换底层的链接与移动操作
    #[cfg(test)]
    fn with_fs_ops(mut self, link_dir: LinkFn, move_dir: MoveFn) -> Self {
        self.link_dir = link_dir;
        self.move_dir = move_dir;
        self
    }

    pub fn guard(&self) -> &CriticalPathGuard {
        &self.guard
    }

    /// 迁移后的目标路径: `target_volume/<staging_dir>/<source 的目录名>`
    pub fn target_path_for(&self, source: &Path, target_volume: &Path) -> Option<PathBuf> {
        let name = source.file_name()?;
        Some(target_volume.join(&self.staging_dir).join(name))
    }

    fn ensure_unprotected(&self, path: &Path) -> Result<(), RelocationError> {
        if self.guard.is_critical(path) {
            warn!("拒绝操作系统关键路径: {:?}", path);
            return Err(RelocationError::Protected(path.to_path_buf()));
        }
        Ok(())
    }

    /// 把 `source` 移动到 `target_volume` 并在原位置创建目录链接
    ///
    /// 两个路径都会先解析成绝对路径，链接总是指向绝对路径。
    /// 数据已到达目标卷但原位置没有链接时，返回 [`RelocationError::is_partial`]
    /// 为真的错误，其中带有迁移记录。
    pub fn move_with_link(
        &self,
        source: &Path,
        target_volume: &Path,
        dry_run: bool,
    ) -> Result<RelocationRecord, RelocationError> {
        let metadata = fs::symlink_metadata(source)
            .map_err(|_| RelocationError::SourceMissing(source.to_path_buf()))?;
        if !metadata.is_dir() {
            return Err(RelocationError::NotADirectory(source.to_path_buf()));
        }

        // source 本身不是链接，规范化只会展开上层目录
        let source = fs::canonicalize(source)
            .map_err(|e| RelocationError::io(format!("无法解析路径 {source:?}"), e))?;
        self.ensure_unprotected(&source)?;
        if self.guard.contains_critical(&source) {
            warn!("源目录包含系统关键路径: {:?}", source);
            return Err(RelocationError::Protected(source));
        }

        let target_volume = resolve_path(target_volume)?;
        let relocated = self
            .target_path_for(&source, &target_volume)
            .ok_or_else(|| RelocationError::NotADirectory(source.clone()))?;
        self.ensure_unprotected(&relocated)?;
        if relocated.starts_with(&source) {
            return Err(RelocationError::TargetInsideSource(relocated));
        }

        let record = RelocationRecord {
            bytes: self.sizer.directory_size(&source),
            original: source,
            relocated,
        };

        if dry_run {
            info!(
                "DRY RUN: 将移动 {:?} -> {:?} ({})，并创建链接",
                record.original,
                record.relocated,
                record.formatted_size()
            );
            return Ok(record);
        }

        if fs::symlink_metadata(&record.relocated).is_ok() {
            warn!("目标路径已存在: {:?}", record.relocated);
            return Err(RelocationError::TargetExists(record.relocated));
        }

        if let Some(staging) = record.relocated.parent() {
            fs::create_dir_all(staging)
                .map_err(|e| RelocationError::io(format!("创建目录 {staging:?} 失败"), e))?;
        }

        info!("移动 {:?} -> {:?}", record.original, record.relocated);
        match (self.move_dir)(&record.original, &record.relocated) {
            Ok(()) => {}
            Err(MoveError::Aborted(e)) => {
                return Err(RelocationError::io(
                    format!("移动 {:?} 失败", record.original),
                    e,
                ));
            }
            Err(MoveError::SourceRemains { leftovers }) => {
                error!(
                    "数据已复制到 {:?}，但 {:?} 中有 {} 个条目未能删除",
                    record.relocated, record.original, leftovers
                );
                return Err(RelocationError::SourceNotRemoved { record, leftovers });
            }
        }

        if let Err(source) = (self.link_dir)(&record.relocated, &record.original) {
            error!(
                "数据已移动到 {:?}，但创建链接 {:?} 失败: {}",
                record.relocated, record.original, source
            );
            return Err(RelocationError::PartiallyMoved { record, source });
        }

        info!(
            "迁移完成: {:?} -> {:?} ({})",
            record.original,
            record.relocated,
            record.formatted_size()
        );
        Ok(record)
    }

    /// 删除链接并把数据移回原位置
    pub fn restore_link(
        &self,
        link_path: &Path,
        dry_run: bool,
    ) -> Result<RelocationRecord, RelocationError> {
        if !is_link(link_path) {
            return Err(RelocationError::NotALink(link_path.to_path_buf()));
        }

        let link_path = std::path::absolute(link_path)
            .map_err(|e| RelocationError::io(format!("无法解析路径 {link_path:?}"), e))?;
        self.ensure_unprotected(&link_path)?;

        let target = fs::read_link(&link_path)
            .map_err(|e| RelocationError::io(format!("读取链接 {link_path:?} 失败"), e))?;
        // 相对链接以链接所在目录为基准
        let target = match link_path.parent() {
            Some(parent) if target.is_relative() => parent.join(target),
            _ => target,
        };

        if !target.is_dir() {
            return Err(RelocationError::TargetMissing(target));
        }
        self.ensure_unprotected(&target)?;

        let record = RelocationRecord {
            bytes: self.sizer.directory_size(&target),
            original: link_path,
            relocated: target,
        };

        if dry_run {
            info!(
                "DRY RUN: 将还原 {:?} -> {:?} ({})",
                record.relocated,
                record.original,
                record.formatted_size()
            );
            return Ok(record);
        }

        remove_dir_link(&record.original).map_err(|e| {
            RelocationError::io(format!("删除链接 {:?} 失败", record.original), e)
        })?;

        match (self.move_dir)(&record.relocated, &record.original) {
            Ok(()) => {}
            Err(MoveError::SourceRemains { leftovers }) => {
                // 数据已完整回到原位置，只剩目标卷上的残留
                warn!(
                    "已还原到 {:?}，但 {:?} 中有 {} 个条目未能删除",
                    record.original, record.relocated, leftovers
                );
            }
            Err(MoveError::Aborted(e)) => {
                // 尽量恢复链接，让原路径保持可用
                if let Err(relink) = (self.link_dir)(&record.relocated, &record.original) {
                    error!("还原失败且无法恢复链接 {:?}: {}", record.original, relink);
                }
                return Err(RelocationError::io(
                    format!("移回 {:?} 失败", record.relocated),
                    e,
                ));
            }
        }

        info!(
            "还原完成: {:?} -> {:?}",
            record.relocated, record.original
        );
        Ok(record)
    }

    /// 为"已移动但未链接"的记录重新创建链接
    pub fn repair_link(&self, record: &RelocationRecord) -> Result<(), RelocationError> {
        // 原位置可能已经是链接，不能规范化
        let original = std::path::absolute(&record.original).map_err(|e| {
            RelocationError::io(format!("无法解析路径 {:?}", record.original), e)
        })?;
        let relocated = resolve_path(&record.relocated)?;
        self.ensure_unprotected(&original)?;
        self.ensure_unprotected(&relocated)?;

        if !relocated.is_dir() {
            return Err(RelocationError::TargetMissing(relocated));
        }
        if fs::symlink_metadata(&original).is_ok() {
            return Err(RelocationError::TargetExists(original));
        }

        (self.link_dir)(&relocated, &original)
            .map_err(|e| RelocationError::io(format!("创建链接 {original:?} 失败"), e))?;
        info!("已修复链接: {:?} -> {:?}", original, relocated);
        Ok(())
    }
}

impl Default for RelocationEngine {
    fn default() -> Self {
        Self::new(&RelocationConfig::default(), CriticalPathGuard::default())
    }
}

/// 把路径解析成绝对路径：最近的已存在祖先取规范形式，其余部分原样拼接
fn resolve_path(path: &Path) -> Result<PathBuf, RelocationError> {
    let absolute = std::path::absolute(path)
        .map_err(|e| RelocationError::io(format!("无法解析路径 {path:?}"), e))?;

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(canonical) = fs::canonicalize(existing) {
            return Ok(missing
                .iter()
                .rev()
                .fold(canonical, |resolved, name| resolved.join(name)));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name);
                existing = parent;
            }
            _ => return Ok(absolute.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_ops::copy_tree;
    use tempfile::TempDir;

    fn guarded_engine(protected: &Path) -> RelocationEngine {
        RelocationEngine::new(
            &RelocationConfig::default(),
            CriticalPathGuard::with_extra([protected.to_string_lossy()]),
        )
    }

    fn refuse_link(_target: &Path, _link: &Path) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
    }

    /// 复制成功，但源目录删不掉
    fn copy_keep_source(source: &Path, destination: &Path) -> Result<(), MoveError> {
        copy_tree(source, destination)?;
        Err(MoveError::SourceRemains { leftovers: 1 })
    }

    fn build_source(root: &Path) -> PathBuf {
        let source = root.join("cache");
        fs::create_dir_all(source.join("nested")).unwrap();
        fs::write(source.join("a.bin"), vec![1u8; 100]).unwrap();
        fs::write(source.join("nested").join("b.bin"), vec![2u8; 50]).unwrap();
        source
    }

    #[test]
    fn test_target_path_for() {
        let engine = RelocationEngine::default();
        assert_eq!(
            engine.target_path_for(Path::new("/home/alice/.npm"), Path::new("/mnt/d")),
            Some(PathBuf::from("/mnt/d/CleanShift_Moved/.npm"))
        );
    }

    #[test]
    fn test_move_missing_source_fails() {
        let temp_dir = TempDir::new().unwrap();
        let engine = RelocationEngine::default();
        let result = engine.move_with_link(
            &temp_dir.path().join("missing"),
            &temp_dir.path().join("vol"),
            false,
        );
        assert!(matches!(result, Err(RelocationError::SourceMissing(_))));
        assert!(!temp_dir.path().join("vol").exists());
    }

    #[test]
    fn test_move_file_source_fails() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file.txt");
        fs::write(&file, "x").unwrap();

        let engine = RelocationEngine::default();
        let result = engine.move_with_link(&file, temp_dir.path(), false);
        assert!(matches!(result, Err(RelocationError::NotADirectory(_))));
    }

    #[test]
    fn test_dry_run_does_not_mutate() {
        let temp_dir = TempDir::new().unwrap();
        let source = build_source(&temp_dir.path().join("home"));
        let volume = temp_dir.path().join("vol");

        let engine = RelocationEngine::default();
        let record = engine.move_with_link(&source, &volume, true).unwrap();

        assert_eq!(record.bytes, 150);
        assert_eq!(record.relocated, volume.join("CleanShift_Moved").join("cache"));
        assert!(!volume.exists());
        assert!(!is_link(&source));
    }

    #[test]
    fn test_existing_target_fails_without_mutation() {
        let temp_dir = TempDir::new().unwrap();
        let source = build_source(&temp_dir.path().join("home"));
        let volume = temp_dir.path().join("vol");
        let occupied = volume.join("CleanShift_Moved").join("cache");
        fs::create_dir_all(&occupied).unwrap();

        let engine = RelocationEngine::default();
        let result = engine.move_with_link(&source, &volume, false);

        assert!(matches!(result, Err(RelocationError::TargetExists(_))));
        assert!(!is_link(&source));
        assert_eq!(fs::read(source.join("a.bin")).unwrap(), vec![1u8; 100]);
        assert_eq!(fs::read_dir(&occupied).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_move_then_restore_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let source = build_source(&temp_dir.path().join("home"));
        let volume = temp_dir.path().join("vol");

        let engine = RelocationEngine::default();
        let preview = engine.move_with_link(&source, &volume, true).unwrap();
        let record = engine.move_with_link(&source, &volume, false).unwrap();
        assert_eq!(preview, record);

        assert!(is_link(&source));
        assert_eq!(fs::read(source.join("a.bin")).unwrap(), vec![1u8; 100]);
        assert!(record.relocated.join("nested").join("b.bin").exists());

        let restored = engine.restore_link(&source, false).unwrap();
        assert_eq!(restored.bytes, 150);
        assert!(!is_link(&source));
        assert!(source.is_dir());
        assert_eq!(fs::read(source.join("nested").join("b.bin")).unwrap(), vec![2u8; 50]);
        assert!(!record.relocated.exists());
    }

    #[test]
    fn test_restore_requires_link() {
        let temp_dir = TempDir::new().unwrap();
        let source = build_source(temp_dir.path());

        let engine = RelocationEngine::default();
        let result = engine.restore_link(&source, false);
        assert!(matches!(result, Err(RelocationError::NotALink(_))));
        assert!(source.join("a.bin").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_restore_dry_run_keeps_link() {
        let temp_dir = TempDir::new().unwrap();
        let source = build_source(&temp_dir.path().join("home"));
        let volume = temp_dir.path().join("vol");

        let engine = RelocationEngine::default();
        engine.move_with_link(&source, &volume, false).unwrap();

        let record = engine.restore_link(&source, true).unwrap();
        assert_eq!(record.bytes, 150);
        assert!(is_link(&source));
    }

    #[cfg(unix)]
    #[test]
    fn test_restore_dangling_link_fails() {
        let temp_dir = TempDir::new().unwrap();
        let link = temp_dir.path().join("dangling");
        std::os::unix::fs::symlink(temp_dir.path().join("nowhere"), &link).unwrap();

        let engine = RelocationEngine::default();
        let result = engine.restore_link(&link, false);
        assert!(matches!(result, Err(RelocationError::TargetMissing(_))));
        assert!(is_link(&link));
    }

    #[cfg(unix)]
    #[test]
    fn test_repair_link_after_partial_move() {
        let temp_dir = TempDir::new().unwrap();
        let original = temp_dir.path().join("home").join("cache");
        let relocated = temp_dir.path().join("vol").join("cache");
        fs::create_dir_all(&relocated).unwrap();
        fs::write(relocated.join("a.bin"), "data").unwrap();
        fs::create_dir_all(original.parent().unwrap()).unwrap();

        let record = RelocationRecord {
            original: original.clone(),
            relocated,
            bytes: 4,
        };

        let engine = RelocationEngine::default();
        engine.repair_link(&record).unwrap();
        assert!(is_link(&original));
        assert_eq!(fs::read_to_string(original.join("a.bin")).unwrap(), "data");

        // 原位置已被占用时不能再修复
        assert!(matches!(
            engine.repair_link(&record),
            Err(RelocationError::TargetExists(_))
        ));
    }

    #[test]
    fn test_custom_staging_dir() {
        let engine = RelocationEngine::new(
            &RelocationConfig {
                staging_dir: "Moved".to_string(),
            },
            CriticalPathGuard::default(),
        );
        assert_eq!(
            engine.target_path_for(Path::new("/data/x"), Path::new("/vol")),
            Some(PathBuf::from("/vol/Moved/x"))
        );
    }

    #[test]
    fn test_protected_source_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let protected = temp_dir.path().join("protected");
        let source = build_source(&protected);
        let volume = temp_dir.path().join("vol");

        let engine = guarded_engine(&protected);
        for dry_run in [true, false] {
            let result = engine.move_with_link(&source, &volume, dry_run);
            assert!(matches!(result, Err(RelocationError::Protected(_))));
        }
        assert!(!is_link(&source));
        assert!(source.join("a.bin").exists());
        assert!(!volume.exists());
    }

    #[test]
    fn test_source_above_protected_path_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let source = build_source(&temp_dir.path().join("home"));
        let volume = temp_dir.path().join("vol");

        let engine = guarded_engine(&source.join("nested"));
        let result = engine.move_with_link(&source, &volume, false);
        assert!(matches!(result, Err(RelocationError::Protected(_))));
        assert!(source.join("nested").join("b.bin").exists());
        assert!(!volume.exists());
    }

    #[test]
    fn test_protected_target_volume_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let source = build_source(&temp_dir.path().join("home"));
        let volume = temp_dir.path().join("vault");

        let engine = guarded_engine(&volume);
        let result = engine.move_with_link(&source, &volume, false);
        assert!(matches!(result, Err(RelocationError::Protected(_))));
        assert!(!volume.exists());
        assert!(!is_link(&source));
    }

    #[cfg(unix)]
    #[test]
    fn test_restore_protected_link_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let home = temp_dir.path().join("home");
        let source = build_source(&home);
        let volume = temp_dir.path().join("vol");
        RelocationEngine::default()
            .move_with_link(&source, &volume, false)
            .unwrap();

        let engine = guarded_engine(&home);
        for dry_run in [true, false] {
            let result = engine.restore_link(&source, dry_run);
            assert!(matches!(result, Err(RelocationError::Protected(_))));
        }
        assert!(is_link(&source));
    }

    #[test]
    fn test_target_inside_source_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let source = build_source(&temp_dir.path().join("home"));
        let volume = source.join("inner");

        let engine = RelocationEngine::default();
        let result = engine.move_with_link(&source, &volume, false);
        assert!(matches!(result, Err(RelocationError::TargetInsideSource(_))));
        assert!(!volume.exists());
        assert!(!is_link(&source));
    }

    #[cfg(unix)]
    #[test]
    fn test_relative_target_volume_links_to_absolute_path() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().canonicalize().unwrap();
        let source = build_source(&base.join("home"));
        let volume = crate::testutil::relative_from_cwd(&base.join("vol"));
        assert!(volume.is_relative());

        let engine = RelocationEngine::default();
        let record = engine.move_with_link(&source, &volume, false).unwrap();

        assert_eq!(record.relocated, base.join("vol").join("CleanShift_Moved").join("cache"));
        assert_eq!(fs::read_link(&source).unwrap(), record.relocated);
        assert_eq!(fs::read(source.join("a.bin")).unwrap(), vec![1u8; 100]);
    }

    #[cfg(unix)]
    #[test]
    fn test_link_failure_leaves_repairable_partial_state() {
        let temp_dir = TempDir::new().unwrap();
        let source = build_source(&temp_dir.path().join("home"));
        let volume = temp_dir.path().join("vol");

        let engine = RelocationEngine::default().with_fs_ops(refuse_link, move_tree);
        let err = engine.move_with_link(&source, &volume, false).unwrap_err();

        assert!(matches!(err, RelocationError::PartiallyMoved { .. }));
        assert!(err.is_partial());
        let record = err.partial_record().unwrap().clone();
        assert!(fs::symlink_metadata(&source).is_err());
        assert_eq!(
            fs::read(record.relocated.join("nested").join("b.bin")).unwrap(),
            vec![2u8; 50]
        );

        RelocationEngine::default().repair_link(&record).unwrap();
        assert!(is_link(&source));
        assert_eq!(fs::read(source.join("a.bin")).unwrap(), vec![1u8; 100]);
    }

    #[test]
    fn test_unremovable_source_is_reported_as_partial() {
        let temp_dir = TempDir::new().unwrap();
        let source = build_source(&temp_dir.path().join("home"));
        let volume = temp_dir.path().join("vol");

        let engine = RelocationEngine::default().with_fs_ops(create_dir_link, copy_keep_source);
        let err = engine.move_with_link(&source, &volume, false).unwrap_err();

        assert!(matches!(
            err,
            RelocationError::SourceNotRemoved { leftovers: 1, .. }
        ));
        let record = err.partial_record().unwrap();
        assert_eq!(fs::read(record.relocated.join("a.bin")).unwrap(), vec![1u8; 100]);
        assert!(!is_link(&source));
        assert!(source.join("a.bin").exists());
    }
}
