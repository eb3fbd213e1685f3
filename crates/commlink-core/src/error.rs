//! 传输层错误类型定义

use std::io;
use thiserror::Error;

/// 传输层统一错误类型
///
/// 超时（`Timeout`）在核心内部是一个错误分支，但在边界处被编码为字面量 `0`，
/// 从不与负数错误码混淆。
#[derive(Error, Debug)]
pub enum LinkError {
    /// 调用参数不合法（空名称、长度越界、未知波特率、offset/length 越界等）
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// 经典 CAN 路径上请求了 FD / BRS
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// 打开设备被拒绝（提权重试后仍失败）
    #[error("Permission denied on '{path}': {}", describe_errno(.errno))]
    PermissionDenied { path: String, errno: i32 },

    /// readiness 等待超时
    #[error("Operation timeout")]
    Timeout,

    /// 其他系统调用失败，携带原始 errno
    #[error("{op} failed: {}", describe_errno(.errno))]
    Os { op: &'static str, errno: i32 },

    /// 句柄未知或已关闭
    #[error("Unknown or closed handle")]
    BadHandle,
}

fn describe_errno(errno: &i32) -> io::Error {
    io::Error::from_raw_os_error(*errno)
}

impl LinkError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn os(op: &'static str, errno: i32) -> Self {
        Self::Os { op, errno }
    }

    /// 从 `std::io::Error` 构造；没有 OS 错误码时按 `EIO` 处理
    pub fn from_io(op: &'static str, err: &io::Error) -> Self {
        Self::os(op, err.raw_os_error().unwrap_or(libc::EIO))
    }

    /// 原始 errno（仅 `Os` / `PermissionDenied` 携带）
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Os { errno, .. } | Self::PermissionDenied { errno, .. } => Some(*errno),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// 边界编码
    ///
    /// | 变体 | 返回值 |
    /// |------|--------|
    /// | `InvalidArgument` | `-EINVAL` |
    /// | `Unsupported` | `-ENOTSUP` |
    /// | `PermissionDenied` / `Os` | `-errno` |
    /// | `BadHandle` | `-EBADF` |
    /// | `Timeout` | `0` |
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) => -libc::EINVAL,
            Self::Unsupported(_) => -libc::ENOTSUP,
            Self::PermissionDenied { errno, .. } | Self::Os { errno, .. } => negative(*errno),
            Self::Timeout => 0,
            Self::BadHandle => -libc::EBADF,
        }
    }
}

// errno 为 0 时说明调用方没有拿到真实错误码，不能编码成 "成功"
fn negative(errno: i32) -> i32 {
    if errno > 0 { -errno } else { -libc::EIO }
}

/// 将数据操作的结果折叠为边界整数：字节数 / `0` 超时 / 负 errno
pub fn status_code(result: &Result<usize, LinkError>) -> i32 {
    match result {
        Ok(n) => i32::try_from(*n).unwrap_or(i32::MAX),
        Err(e) => e.code(),
    }
}
