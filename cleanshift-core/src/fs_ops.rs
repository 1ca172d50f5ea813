//! 文件系统辅助操作：尽力删除、跨卷移动、目录链接

use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// 尽力删除文件或目录树，单个条目删除失败不会中断整个过程
///
/// 返回删除失败的条目数。符号链接只删除链接本身。
pub fn remove_best_effort(path: &Path) -> usize {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(_) => return 0,
    };

    if !metadata.is_dir() {
        return match remove_entry(path, metadata.file_type().is_symlink()) {
            Ok(()) => 0,
            Err(e) => {
                debug!("删除失败 {:?}: {}", path, e);
                1
            }
        };
    }

    // 快速路径：大多数情况下一次就能删干净
    if fs::remove_dir_all(path).is_ok() {
        return 0;
    }

    let mut failures = 0;
    for entry in WalkDir::new(path)
        .follow_links(false)
        .follow_root_links(false)
        .contents_first(true)
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("无法访问 {}", e);
                failures += 1;
                continue;
            }
        };

        let file_type = entry.file_type();
        let result = if file_type.is_dir() {
            fs::remove_dir(entry.path())
        } else {
            remove_entry(entry.path(), file_type.is_symlink())
        };

        if let Err(e) = result {
            if e.kind() != io::ErrorKind::NotFound {
                debug!("删除失败 {:?}: {}", entry.path(), e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        warn!("{:?} 中有 {} 个条目无法删除", path, failures);
    }
    failures
}

fn remove_entry(path: &Path, is_symlink: bool) -> io::Result<()> {
    match fs::remove_file(path) {
        // Windows 上的目录链接需要用 remove_dir 删除
        Err(e) if is_symlink => fs::remove_dir(path).map_err(|_| e),
        other => other,
    }
}

/// [`move_tree`] 的失败情形
#[derive(Debug, Error)]
pub enum MoveError {
    /// 没有移动任何数据，源目录保持原样
    #[error(transparent)]
    Aborted(#[from] io::Error),

    /// 数据已完整复制到目标，但源目录没能完全删除
    #[error("源目录有 {leftovers} 个条目无法删除")]
    SourceRemains { leftovers: usize },
}

/// 移动目录树：先尝试 rename，跨卷失败时复制后删除源目录
///
/// 复制失败时会清理已复制的部分，源目录保持不变。
pub fn move_tree(source: &Path, destination: &Path) -> Result<(), MoveError> {
    match fs::rename(source, destination) {
        Ok(()) => return Ok(()),
        Err(e) => debug!("rename 失败，改为复制: {}", e),
    }

    if let Err(e) = copy_tree(source, destination) {
        remove_best_effort(destination);
        return Err(MoveError::Aborted(e));
    }

    let leftovers = remove_best_effort(source);
    if leftovers > 0 {
        warn!("源目录 {:?} 有 {} 个条目未能删除", source, leftovers);
        return Err(MoveError::SourceRemains { leftovers });
    }
    Ok(())
}

/// 递归复制目录树，符号链接按链接复制
pub fn copy_tree(source: &Path, destination: &Path) -> io::Result<()> {
    for entry in WalkDir::new(source)
        .follow_links(false)
        .follow_root_links(false)
    {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        let target = destination.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            let link_target = fs::read_link(entry.path())?;
            create_link(&link_target, &target, entry.path().is_dir())?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// 在 `link` 处创建指向 `target` 的目录链接
pub fn create_dir_link(target: &Path, link: &Path) -> io::Result<()> {
    create_link(target, link, true)
}

#[cfg(unix)]
fn create_link(target: &Path, link: &Path, _is_dir: bool) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_link(target: &Path, link: &Path, is_dir: bool) -> io::Result<()> {
    if is_dir {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    }
}

/// 删除目录链接本身（不触碰链接指向的内容）
pub fn remove_dir_link(link: &Path) -> io::Result<()> {
    remove_entry(link, true)
}

/// 路径本身是否为符号链接
pub fn is_link(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}
