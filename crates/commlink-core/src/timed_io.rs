//! 有界超时 I/O
//!
//! 每次数据操作都遵循同一个模式：
//!
//! 1. `poll(2)` 等待 fd 就绪，最长 `timeout`
//! 2. 就绪后至多一次 `read(2)` / `write(2)`
//!
//! 超时返回 `LinkError::Timeout`（边界编码为 `0`），poll 或系统调用失败
//! 返回携带 errno 的 `LinkError::Os`。这里没有重试，也没有后台线程；
//! 取消只能通过超时到期实现。

use crate::LinkError;
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use std::os::fd::{AsRawFd, BorrowedFd};
use std::time::Duration;
use tracing::{error, trace};

/// 等待的就绪方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Readable,
    Writable,
}

impl Readiness {
    fn poll_flags(self) -> PollFlags {
        match self {
            Readiness::Readable => PollFlags::POLLIN,
            Readiness::Writable => PollFlags::POLLOUT,
        }
    }
}

/// `Duration` → poll 毫秒超时（超过 `i32::MAX` 毫秒按上限截断）
fn poll_timeout(timeout: Duration) -> Result<PollTimeout, LinkError> {
    let ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
    PollTimeout::try_from(ms)
        .map_err(|e| LinkError::invalid(format!("invalid poll timeout {}ms: {}", ms, e)))
}

/// 等待 fd 就绪
///
/// # 返回值
/// - `Ok(())`: 已就绪
/// - `Err(LinkError::Timeout)`: 超时内未就绪
/// - `Err(LinkError::Os)`: poll 失败（包括 `EINTR`，不做内部重试）
pub fn wait_ready(fd: BorrowedFd<'_>, readiness: Readiness, timeout: Duration) -> Result<(), LinkError> {
    let mut fds = [PollFd::new(fd, readiness.poll_flags())];
    match poll(&mut fds, poll_timeout(timeout)?) {
        Ok(0) => {
            trace!(
                "fd {} not {:?} within {:?}",
                fd.as_raw_fd(),
                readiness,
                timeout
            );
            Err(LinkError::Timeout)
        },
        Ok(_) => Ok(()),
        Err(errno) => {
            error!("poll(fd={}, {:?}) failed: {}", fd.as_raw_fd(), readiness, errno);
            Err(LinkError::os("poll", errno as i32))
        },
    }
}

/// 等待可读后执行一次 `read(2)`，返回读到的字节数
pub fn read(fd: BorrowedFd<'_>, buf: &mut [u8], timeout: Duration) -> Result<usize, LinkError> {
    wait_ready(fd, Readiness::Readable, timeout)?;

    let n = unsafe { libc::read(fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
    if n < 0 {
        let errno = Errno::last();
        error!("read(fd={}) failed: {}", fd.as_raw_fd(), errno);
        return Err(LinkError::os("read", errno as i32));
    }
    Ok(n as usize)
}

/// 等待可写后执行一次 `write(2)`，返回系统调用报告的字节数
pub fn write(fd: BorrowedFd<'_>, data: &[u8], timeout: Duration) -> Result<usize, LinkError> {
    wait_ready(fd, Readiness::Writable, timeout)?;

    let n = unsafe { libc::write(fd.as_raw_fd(), data.as_ptr().cast(), data.len()) };
    if n < 0 {
        let errno = Errno::last();
        error!("write(fd={}) failed: {}", fd.as_raw_fd(), errno);
        return Err(LinkError::os("write", errno as i32));
    }
    Ok(n as usize)
}
