//! 串口传输
//!
//! 打开流程：
//!
//! ```text
//! Closed ─open()─▶ Opening ──ok──────────────────────────▶ Configuring ──ok──▶ Open
//!                     │                                      │
//!                     └─EACCES/EPERM─▶ make_accessible()      └─err──▶ Closed（fd 已关闭）
//!                                         └─▶ Opening' ─ok──▶ Configuring
//!                                                  └─err──▶ Closed（返回首次错误）
//! ```
//!
//! 提权重试最多一次；其它打开错误直接返回。

use crate::escalator::{NoEscalation, PrivilegeEscalator};
use crate::settings::{LineSettings, SerialConfig};
use crate::termios;
use commlink_core::{LinkError, LinkHandle, LinkTable, buffer_window, timed_io};
use nix::errno::Errno;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsFd, AsRawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, trace, warn};

/// 一个已打开并配置好的串口
#[derive(Debug)]
pub struct SerialLink {
    path: PathBuf,
    file: File,
    settings: LineSettings,
}

impl SerialLink {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &LineSettings {
        &self.settings
    }
}

/// 串口传输：链路表 + 权限恢复能力
pub struct SerialTransport {
    links: LinkTable<SerialLink>,
    escalator: Box<dyn PrivilegeEscalator>,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("links", &self.links)
            .finish_non_exhaustive()
    }
}

impl Default for SerialTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialTransport {
    /// 不提权的传输
    pub fn new() -> Self {
        Self::with_escalator(NoEscalation)
    }

    /// 注入权限恢复实现（例如 `SuChmod`）
    pub fn with_escalator(escalator: impl PrivilegeEscalator + 'static) -> Self {
        Self {
            links: LinkTable::new(),
            escalator: Box::new(escalator),
        }
    }

    /// 打开并配置串口
    ///
    /// # 错误
    /// - `LinkError::InvalidArgument`: 路径为空
    /// - `LinkError::PermissionDenied`: 权限被拒绝且恢复/重试失败（携带首次 errno）
    /// - `LinkError::Os`: 其它打开错误，或 termios 配置失败（此时 fd 已关闭）
    pub fn open(&mut self, path: impl AsRef<Path>, settings: LineSettings) -> Result<LinkHandle, LinkError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(LinkError::invalid("serial device path is empty"));
        }

        let file = self.open_device(path)?;
        clear_nonblocking(&file)?;
        // 失败时 file 随 drop 关闭，不留下半打开的链路
        termios::configure(&file, &settings)?;

        let handle = self.links.insert(SerialLink {
            path: path.to_path_buf(),
            file,
            settings,
        });
        info!(
            "Serial link opened: path='{}', {}, handle={}",
            path.display(),
            settings,
            handle.as_raw()
        );
        Ok(handle)
    }

    /// 按配置打开；参数在触碰设备前校验
    pub fn open_config(&mut self, config: &SerialConfig) -> Result<LinkHandle, LinkError> {
        let settings = LineSettings::try_from(config)?;
        self.open(&config.path, settings)
    }

    fn open_device(&self, path: &Path) -> Result<File, LinkError> {
        let first = match try_open(path) {
            Ok(file) => return Ok(file),
            Err(e) => e,
        };

        if first.kind() != io::ErrorKind::PermissionDenied {
            error!("open({}) failed: {}", path.display(), first);
            return Err(LinkError::from_io("open", &first));
        }

        let errno = first.raw_os_error().unwrap_or(libc::EACCES);
        let denied = || LinkError::PermissionDenied {
            path: path.display().to_string(),
            errno,
        };

        warn!(
            "open({}) denied: {}; trying to make it accessible",
            path.display(),
            first
        );
        if let Err(e) = self.escalator.make_accessible(path) {
            warn!("cannot make '{}' accessible: {}", path.display(), e);
            return Err(denied());
        }

        try_open(path).map_err(|retry| {
            error!("open({}) still failing after permission fix: {}", path.display(), retry);
            denied()
        })
    }

    /// 整体替换线路参数
    pub fn reconfigure(&mut self, handle: LinkHandle, settings: LineSettings) -> Result<(), LinkError> {
        let link = self.links.get_mut(handle)?;
        termios::configure(&link.file, &settings)?;
        link.settings = settings;
        info!("Serial link '{}' reconfigured: {}", link.path.display(), settings);
        Ok(())
    }

    /// 写入数据，返回系统调用报告的字节数
    ///
    /// 空数据为 `InvalidArgument`；超时内不可写返回 `LinkError::Timeout`。
    pub fn write(&self, handle: LinkHandle, data: &[u8], timeout: Duration) -> Result<usize, LinkError> {
        self.write_window(handle, data, 0, data.len(), timeout)
    }

    /// 写入 `buf[offset..offset + length]`
    pub fn write_window(
        &self,
        handle: LinkHandle,
        buf: &[u8],
        offset: usize,
        length: usize,
        timeout: Duration,
    ) -> Result<usize, LinkError> {
        let range = buffer_window(buf.len(), offset, length)?;
        let link = self.links.get(handle)?;

        let n = timed_io::write(link.file.as_fd(), &buf[range], timeout)?;
        trace!("Serial TX on '{}': {} bytes", link.path.display(), n);
        Ok(n)
    }

    /// 读取当前可用的数据（至多 `buf.len()` 字节）
    ///
    /// 超时内无数据返回 `LinkError::Timeout`。设备挂断时 readiness 立即成立，
    /// 返回 `Ok(0)`。
    pub fn read(&self, handle: LinkHandle, buf: &mut [u8], timeout: Duration) -> Result<usize, LinkError> {
        let len = buf.len();
        self.read_window(handle, buf, 0, len, timeout)
    }

    /// 读入 `buf[offset..offset + length]`
    pub fn read_window(
        &self,
        handle: LinkHandle,
        buf: &mut [u8],
        offset: usize,
        length: usize,
        timeout: Duration,
    ) -> Result<usize, LinkError> {
        let range = buffer_window(buf.len(), offset, length)?;
        let link = self.links.get(handle)?;

        let n = timed_io::read(link.file.as_fd(), &mut buf[range], timeout)?;
        trace!("Serial RX on '{}': {} bytes", link.path.display(), n);
        Ok(n)
    }

    /// 关闭链路（幂等），返回该句柄此前是否处于打开状态
    pub fn close(&mut self, handle: LinkHandle) -> bool {
        match self.links.remove(handle) {
            Some(link) => {
                info!(
                    "Serial link closed: path='{}', handle={}",
                    link.path.display(),
                    handle.as_raw()
                );
                true
            },
            None => {
                trace!("close on unknown serial handle {}", handle.as_raw());
                false
            },
        }
    }

    pub fn link(&self, handle: LinkHandle) -> Result<&SerialLink, LinkError> {
        self.links.get(handle)
    }

    pub fn is_open(&self, handle: LinkHandle) -> bool {
        self.links.contains(handle)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

fn try_open(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
        .open(path)
}

/// 打开时用 `O_NONBLOCK` 避免在调制解调器控制线上阻塞，之后的 I/O 改由 poll 控制
fn clear_nonblocking(file: &File) -> Result<(), LinkError> {
    let fd = file.as_raw_fd();
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        let errno = Errno::last();
        error!("fcntl(F_GETFL, fd={}) failed: {}", fd, errno);
        return Err(LinkError::os("fcntl(F_GETFL)", errno as i32));
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK) } < 0 {
        let errno = Errno::last();
        error!("fcntl(F_SETFL, fd={}) failed: {}", fd, errno);
        return Err(LinkError::os("fcntl(F_SETFL)", errno as i32));
    }
    Ok(())
}
