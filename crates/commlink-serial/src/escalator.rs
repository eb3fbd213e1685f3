//! 设备权限恢复
//!
//! 打开串口被拒绝（`EACCES` / `EPERM`）时，传输层会调用一次
//! [`PrivilegeEscalator::make_accessible`]，成功后重试打开。
//! 默认实现不做任何事（[`NoEscalation`]）；在 root 过的设备上可以注入 [`SuChmod`]。

use std::io;
use std::path::Path;
use std::process::Command;
use thiserror::Error;
use tracing::{error, info};

/// 权限恢复失败
#[derive(Error, Debug)]
pub enum EscalationError {
    /// 当前平台/配置不提供提权手段
    #[error("privilege escalation not available")]
    Unavailable,

    /// 无法启动辅助进程
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// 辅助进程以非零状态退出
    #[error("'{program}' exited with {status}")]
    Failed { program: String, status: String },
}

/// "让这个路径可访问" 的能力
///
/// 实现者同步执行，返回前完成全部副作用。
pub trait PrivilegeEscalator: Send + Sync {
    fn make_accessible(&self, path: &Path) -> Result<(), EscalationError>;
}

/// 不提权
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEscalation;

impl PrivilegeEscalator for NoEscalation {
    fn make_accessible(&self, _path: &Path) -> Result<(), EscalationError> {
        Err(EscalationError::Unavailable)
    }
}

/// 通过 `su -c "chmod <mode> '<path>'"` 放宽设备权限
///
/// 同步等待辅助进程退出，调用线程在此期间阻塞。
#[derive(Debug, Clone)]
pub struct SuChmod {
    pub mode: u32,
    pub program: String,
}

impl Default for SuChmod {
    fn default() -> Self {
        Self {
            mode: 0o666,
            program: "su".to_string(),
        }
    }
}

impl SuChmod {
    pub fn new() -> Self {
        Self::default()
    }

    /// 传给 `su -c` 的命令行
    pub fn command_line(&self, path: &Path) -> String {
        // 单引号包裹路径，路径内的单引号按 shell 规则转义
        let quoted = path.to_string_lossy().replace('\'', r"'\''");
        format!("chmod {:o} '{}'", self.mode, quoted)
    }
}

impl PrivilegeEscalator for SuChmod {
    fn make_accessible(&self, path: &Path) -> Result<(), EscalationError> {
        let cmd = self.command_line(path);
        info!("exec {} -c: {}", self.program, cmd);

        let status = Command::new(&self.program)
            .arg("-c")
            .arg(&cmd)
            .status()
            .map_err(|source| {
                error!("failed to spawn '{}': {}", self.program, source);
                EscalationError::Spawn {
                    program: self.program.clone(),
                    source,
                }
            })?;

        if !status.success() {
            error!("chmod via {} failed: {}", self.program, status);
            return Err(EscalationError::Failed {
                program: self.program.clone(),
                status: status.to_string(),
            });
        }

        info!("chmod via {} OK", self.program);
        Ok(())
    }
}

impl<E: PrivilegeEscalator + ?Sized> PrivilegeEscalator for Box<E> {
    fn make_accessible(&self, path: &Path) -> Result<(), EscalationError> {
        (**self).make_accessible(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_command_line_quotes_path() {
        let su = SuChmod::new();
        assert_eq!(
            su.command_line(Path::new("/dev/ttyS1")),
            "chmod 666 '/dev/ttyS1'"
        );
        assert_eq!(
            su.command_line(Path::new("/tmp/it's")),
            r"chmod 666 '/tmp/it'\''s'"
        );
    }

    #[test]
    fn test_no_escalation_is_unavailable() {
        assert!(matches!(
            NoEscalation.make_accessible(Path::new("/dev/ttyS0")),
            Err(EscalationError::Unavailable)
        ));
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn test_helper_exit_status_is_reported() {
        // `sh -c "chmod 666 '<missing>'"` 以非零状态退出
        let sh = SuChmod {
            mode: 0o666,
            program: "sh".to_string(),
        };
        let result = sh.make_accessible(Path::new("/nonexistent/commlink-test-device"));
        assert!(matches!(result, Err(EscalationError::Failed { .. })));
    }

    #[test]
    #[serial]
    fn test_missing_helper_is_spawn_error() {
        let missing = SuChmod {
            mode: 0o666,
            program: "commlink-no-such-helper".to_string(),
        };
        let result = missing.make_accessible(Path::new("/dev/null"));
        assert!(matches!(result, Err(EscalationError::Spawn { .. })));
    }
}
