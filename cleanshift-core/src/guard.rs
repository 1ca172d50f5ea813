use std::path::Path;

/// 内置的受保护路径前缀（小写、使用 `/` 作为分隔符）
///
/// 这里的列表宁可多排除也不要少排除：命中的目录既不会被遍历也不会被删除或迁移。
pub const DEFAULT_CRITICAL_PATHS: &[&str] = &[
    // Windows
    "c:/windows/system32",
    "c:/windows/syswow64",
    "c:/program files/windows",
    "c:/programdata/microsoft/windows",
    "c:/users/all users",
    // Unix / macOS
    "/proc",
    "/sys",
    "/dev",
    "/boot",
    "/bin",
    "/sbin",
    "/lib",
    "/lib64",
    "/usr/bin",
    "/usr/sbin",
    "/usr/lib",
    "/etc",
    "/system",
    "/private/var/db",
];

/// 把路径统一成小写、`/` 分隔的字符串，用于大小写不敏感的比较
///
/// `.` 和 `..` 按字面折叠，不访问文件系统。
pub(crate) fn normalize_path(path: &Path) -> String {
    let lowered = path.to_string_lossy().to_lowercase().replace('\\', "/");
    // Windows 的 verbatim 前缀（canonicalize 的结果）不影响匹配
    let lowered = lowered.strip_prefix("//?/").unwrap_or(&lowered);
    collapse_dots(lowered)
}

fn collapse_dots(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&"..") => parts.push(".."),
                // 盘符之上没有父目录
                Some(last) if parts.len() == 1 && last.ends_with(':') => {}
                Some(_) => {
                    parts.pop();
                }
                None if rooted => {}
                None => parts.push(".."),
            },
            _ => parts.push(part),
        }
    }

    let joined = parts.join("/");
    if rooted { format!("/{joined}") } else { joined }
}

/// 系统关键路径守卫
#[derive(Debug, Clone)]
pub struct CriticalPathGuard {
    prefixes: Vec<String>,
}

impl Default for CriticalPathGuard {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl CriticalPathGuard {
    /// 仅包含内置列表
    pub fn with_defaults() -> Self {
        Self {
            prefixes: DEFAULT_CRITICAL_PATHS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }

    /// 在内置列表之后追加额外的受保护前缀
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut guard = Self::with_defaults();
        for prefix in extra {
            guard.add(prefix.as_ref());
        }
        guard
    }

    /// 追加一个受保护前缀，空字符串会被忽略
    pub fn add(&mut self, prefix: &str) {
        let normalized = normalize_path(Path::new(prefix.trim()));
        let normalized = normalized.trim_end_matches('/');
        if normalized.is_empty() {
            return;
        }
        if !self.prefixes.iter().any(|p| p == normalized) {
            self.prefixes.push(normalized.to_string());
        }
    }

    /// 判断路径是否位于受保护前缀之下（大小写不敏感）
    ///
    /// 相对路径还会以当前工作目录补全后再比较一次。
    pub fn is_critical<P: AsRef<Path>>(&self, path: P) -> bool {
        let path = path.as_ref();
        if self.matches(&normalize_path(path)) {
            return true;
        }
        path.is_relative()
            && std::path::absolute(path).is_ok_and(|absolute| self.matches(&normalize_path(&absolute)))
    }

    /// 判断路径之下是否含有受保护前缀，例如 `/usr` 之下有 `/usr/bin`
    pub fn contains_critical<P: AsRef<Path>>(&self, path: P) -> bool {
        let normalized = normalize_path(path.as_ref());
        let normalized = normalized.trim_end_matches('/');
        self.prefixes.iter().any(|prefix| {
            prefix
                .strip_prefix(normalized)
                .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    fn matches(&self, normalized: &str) -> bool {
        self.prefixes
            .iter()
            .any(|prefix| normalized.starts_with(prefix.as_str()))
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }
}
