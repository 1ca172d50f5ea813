use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use sysinfo::Disks;
use tracing::debug;

use crate::guard::normalize_path;

/// 网络文件系统，不属于本地固定卷
const NETWORK_FILE_SYSTEMS: &[&str] = &[
    "nfs", "nfs4", "cifs", "smb", "smbfs", "smb2", "sshfs", "fuse.sshfs", "afs", "9p", "ncpfs",
    "davfs", "fuse.davfs2", "glusterfs", "ceph", "webdav",
];

/// 虚拟/伪文件系统，没有可释放的磁盘空间
const PSEUDO_FILE_SYSTEMS: &[&str] = &[
    "proc", "sysfs", "tmpfs", "devtmpfs", "devfs", "ramfs", "cgroup", "cgroup2", "squashfs",
    "autofs", "efivarfs", "securityfs", "debugfs", "tracefs", "pstore", "bpf", "mqueue",
    "hugetlbfs", "configfs", "fusectl", "binfmt_misc",
];

/// 卷信息快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeInfo {
    /// 挂载点或盘符
    pub mount_point: PathBuf,
    pub name: String,
    pub file_system: String,
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

impl VolumeInfo {
    pub fn new(
        mount_point: PathBuf,
        name: String,
        file_system: String,
        total: u64,
        free: u64,
    ) -> Self {
        let free = free.min(total);
        Self {
            mount_point,
            name,
            file_system,
            total,
            used: total - free,
            free,
        }
    }

    /// 已用比例（0.0 ~ 1.0），容量为 0 时返回 0.0
    pub fn usage_fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.used as f64 / self.total as f64
        }
    }

    pub fn usage_percent(&self) -> f64 {
        self.usage_fraction() * 100.0
    }
}

/// 是否为本地固定卷
pub fn is_fixed_volume(file_system: &str, is_removable: bool) -> bool {
    if is_removable {
        return false;
    }
    let fs = file_system.to_lowercase();
    !NETWORK_FILE_SYSTEMS.contains(&fs.as_str()) && !PSEUDO_FILE_SYSTEMS.contains(&fs.as_str())
}

/// 系统盘根目录
#[cfg(windows)]
pub fn system_root() -> PathBuf {
    let drive = std::env::var("SystemDrive").unwrap_or_else(|_| "C:".to_string());
    PathBuf::from(format!("{drive}\\"))
}

#[cfg(not(windows))]
pub fn system_root() -> PathBuf {
    PathBuf::from("/")
}

/// 把用户输入的卷标识转换为根目录路径，`D:` 这样的盘符会补上分隔符
pub fn volume_root(input: &str) -> PathBuf {
    let input = input.trim();
    let bytes = input.as_bytes();
    if bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        PathBuf::from(format!("{input}\\"))
    } else {
        PathBuf::from(input)
    }
}

/// 磁盘清单
#[derive(Debug, Clone, Copy, Default)]
pub struct DriveInventory;

impl DriveInventory {
    pub fn new() -> Self {
        Self
    }

    /// 列出所有本地固定卷；无法查询的卷直接忽略
    pub fn list_volumes(&self) -> Vec<VolumeInfo> {
        let disks = Disks::new_with_refreshed_list();
        let mut seen = HashSet::new();
        let mut volumes = Vec::new();

        for disk in disks.list() {
            let mount_point = disk.mount_point().to_path_buf();
            let file_system = disk.file_system().to_string_lossy().to_string();

            if !is_fixed_volume(&file_system, disk.is_removable()) {
                debug!("跳过非固定卷 {:?} ({})", mount_point, file_system);
                continue;
            }

            let total = disk.total_space();
            if total == 0 {
                debug!("卷 {:?} 未就绪，跳过", mount_point);
                continue;
            }

            if !seen.insert(mount_point.clone()) {
                continue;
            }

            volumes.push(VolumeInfo::new(
                mount_point,
                disk.name().to_string_lossy().to_string(),
                file_system,
                total,
                disk.available_space(),
            ));
        }

        volumes.sort_by(|a, b| a.mount_point.cmp(&b.mount_point));
        volumes
    }

    /// 找到包含指定路径的卷（挂载点最长前缀匹配）
    pub fn volume_for<P: AsRef<Path>>(&self, path: P) -> Option<VolumeInfo> {
        volume_containing(self.list_volumes(), path.as_ref())
    }
}

/// 在给定的卷列表中找到包含 `path` 的卷
pub fn volume_containing(volumes: Vec<VolumeInfo>, path: &Path) -> Option<VolumeInfo> {
    let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let normalized = normalize_path(&path);

    volumes
        .into_iter()
        .filter(|volume| {
            let mount = normalize_path(&volume.mount_point);
            let mount = mount.trim_end_matches('/');
            mount.is_empty()
                || normalized == mount
                || normalized.starts_with(&format!("{mount}/"))
        })
        .max_by_key(|volume| volume.mount_point.as_os_str().len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume(mount: &str, total: u64, free: u64) -> VolumeInfo {
        VolumeInfo::new(
            PathBuf::from(mount),
            "disk".to_string(),
            "ext4".to_string(),
            total,
            free,
        )
    }

    #[test]
    fn test_usage_fraction() {
        let v = volume("/", 1000, 250);
        assert_eq!(v.used, 750);
        assert!((v.usage_fraction() - 0.75).abs() < f64::EPSILON);
        assert!((v.usage_percent() - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_capacity_volume() {
        let v = volume("/", 0, 0);
        assert_eq!(v.usage_fraction(), 0.0);
    }

    #[test]
    fn test_free_is_clamped_to_total() {
        let v = volume("/", 100, 500);
        assert_eq!(v.free, 100);
        assert_eq!(v.used, 0);
    }

    #[test]
    fn test_is_fixed_volume() {
        assert!(is_fixed_volume("ext4", false));
        assert!(is_fixed_volume("NTFS", false));
        assert!(is_fixed_volume("apfs", false));
        assert!(!is_fixed_volume("ext4", true));
        assert!(!is_fixed_volume("nfs4", false));
        assert!(!is_fixed_volume("CIFS", false));
        assert!(!is_fixed_volume("tmpfs", false));
        assert!(!is_fixed_volume("proc", false));
    }

    #[test]
    fn test_volume_containing_prefers_longest_mount() {
        let volumes = vec![
            volume("/", 100, 50),
            volume("/home", 200, 100),
            volume("/home2", 300, 100),
        ];
        let found = volume_containing(volumes.clone(), Path::new("/home/alice/data")).unwrap();
        assert_eq!(found.mount_point, PathBuf::from("/home"));

        let found = volume_containing(volumes.clone(), Path::new("/home2/x")).unwrap();
        assert_eq!(found.mount_point, PathBuf::from("/home2"));

        let found = volume_containing(volumes, Path::new("/var/log")).unwrap();
        assert_eq!(found.mount_point, PathBuf::from("/"));
    }

    #[test]
    fn test_volume_root() {
        assert_eq!(volume_root("D:"), PathBuf::from("D:\\"));
        assert_eq!(volume_root(" e: "), PathBuf::from("e:\\"));
        assert_eq!(volume_root("/mnt/data"), PathBuf::from("/mnt/data"));
        assert_eq!(volume_root("D:\\Archive"), PathBuf::from("D:\\Archive"));
    }

    #[test]
    fn test_volume_for_is_one_of_listed_volumes() {
        let inventory = DriveInventory::new();
        let volumes = inventory.list_volumes();
        if let Some(found) = inventory.volume_for(std::env::temp_dir()) {
            assert!(volumes.iter().any(|v| v.mount_point == found.mount_point));
        }
    }

    #[test]
    fn test_list_volumes_only_reports_fixed_volumes() {
        let volumes = DriveInventory::new().list_volumes();
        for v in &volumes {
            assert!(v.total > 0);
            assert_eq!(v.used + v.free, v.total);
            assert!(is_fixed_volume(&v.file_system, false));
        }
    }
}
