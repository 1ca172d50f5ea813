//! 单元测试共用的辅助函数

use std::path::{Path, PathBuf};

/// 从当前工作目录指向绝对路径 `target` 的相对路径
pub(crate) fn relative_from_cwd(target: &Path) -> PathBuf {
    let cwd = std::env::current_dir().unwrap();
    let mut relative = PathBuf::new();
    for _ in cwd.components().skip(1) {
        relative.push("..");
    }
    relative.join(target.strip_prefix("/").unwrap())
}
