use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// 外部命令的执行结果，仅作参考，不影响调用方的返回值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Succeeded,
    Failed(Option<i32>),
    TimedOut,
    SpawnFailed,
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 执行一条外部命令（按空白切分参数），最多等待 `timeout`
///
/// 超时后不再等待，也不会杀掉子进程。
pub fn run_command(command_line: &str, cwd: Option<&Path>, timeout: Duration) -> CommandOutcome {
    let mut parts = command_line.split_whitespace();
    let Some(program) = parts.next() else {
        return CommandOutcome::SpawnFailed;
    };

    let mut cmd = Command::new(program);
    cmd.args(parts)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    if let Some(dir) = cwd.filter(|dir| dir.is_dir()) {
        cmd.current_dir(dir);
    }

    debug!("执行命令: {}", command_line);
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            debug!("无法启动命令 {}: {}", command_line, e);
            return CommandOutcome::SpawnFailed;
        }
    };

    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) if status.success() => return CommandOutcome::Succeeded,
            Ok(Some(status)) => {
                debug!("命令 {} 退出码: {:?}", command_line, status.code());
                return CommandOutcome::Failed(status.code());
            }
            Ok(None) => {}
            Err(e) => {
                warn!("等待命令 {} 失败: {}", command_line, e);
                return CommandOutcome::Failed(None);
            }
        }

        if started.elapsed() >= timeout {
            warn!("命令 {} 超时 ({:?})，放弃等待", command_line, timeout);
            return CommandOutcome::TimedOut;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}
