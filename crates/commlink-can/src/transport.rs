//! SocketCAN 传输
//!
//! `CanTransport` 持有一个句柄表，每个打开的链路独占一个 `CAN_RAW` socket：
//!
//! - `open`：启动接口 → 解析接口索引 → 创建并绑定 socket
//! - `write` / `read`：一次 `poll` 等待 + 一次 16 字节帧的 `write` / `read`
//! - `close`：从表中移除，socket 随 drop 关闭
//!
//! 同一句柄上的并发调用需要调用方串行化；不同句柄之间完全独立。

use crate::config::{CanConfig, CanFilter};
use crate::frame::{CAN_FRAME_LEN, CAN_MAX_DLEN, CanFlags, CanFrame, FrameHeader};
use crate::iface;
use commlink_core::{LinkError, LinkHandle, LinkTable, timed_io};
use nix::errno::Errno;
use socketcan::{CanSocket, Socket};
use std::os::fd::{AsRawFd, BorrowedFd};
use std::time::Duration;
use tracing::{error, info, trace, warn};

/// 内核 `CAN_RAW_FILTER` 允许的过滤器上限（本实现的约定）
pub const MAX_FILTERS: usize = 16;

/// 一个已打开的 CAN 链路
pub struct CanLink {
    interface: String,
    ifindex: u32,
    socket: CanSocket,
}

impl std::fmt::Debug for CanLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanLink")
            .field("interface", &self.interface)
            .field("ifindex", &self.ifindex)
            .field("fd", &self.socket.as_raw_fd())
            .finish()
    }
}

impl CanLink {
    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn ifindex(&self) -> u32 {
        self.ifindex
    }

    fn fd(&self) -> BorrowedFd<'_> {
        // socket 的生命周期覆盖返回的借用
        unsafe { BorrowedFd::borrow_raw(self.socket.as_raw_fd()) }
    }

    fn set_int_option(&self, name: libc::c_int, value: bool, label: &'static str) -> Result<(), LinkError> {
        let value: libc::c_int = value.into();
        set_raw_option(self.fd(), name, &value, label)
    }
}

fn set_raw_option<T>(
    fd: BorrowedFd<'_>,
    name: libc::c_int,
    value: &T,
    label: &'static str,
) -> Result<(), LinkError> {
    set_raw_option_slice(fd, name, std::slice::from_ref(value), label)
}

fn set_raw_option_slice<T>(
    fd: BorrowedFd<'_>,
    name: libc::c_int,
    values: &[T],
    label: &'static str,
) -> Result<(), LinkError> {
    let ret = unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            libc::SOL_CAN_RAW,
            name,
            values.as_ptr() as *const libc::c_void,
            std::mem::size_of_val(values) as libc::socklen_t,
        )
    };
    if ret < 0 {
        let errno = Errno::last();
        error!("setsockopt({}) failed: {}", label, errno);
        return Err(LinkError::os(label, errno as i32));
    }
    Ok(())
}

/// CAN 传输：链路表 + 帧收发
#[derive(Debug, Default)]
pub struct CanTransport {
    links: LinkTable<CanLink>,
}

impl CanTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 启动接口（需要 `CAP_NET_ADMIN`，接口已 UP 时除外）
    pub fn bring_up(&self, interface: &str) -> Result<(), LinkError> {
        iface::bring_up(interface)
    }

    /// 关闭接口
    pub fn bring_down(&self, interface: &str) -> Result<(), LinkError> {
        iface::bring_down(interface)
    }

    /// 打开链路
    ///
    /// 依次执行：接口名校验 → 启动接口 → 解析索引 → 创建并绑定 `CAN_RAW` socket。
    /// 任一步失败都直接返回，不会注册句柄；绑定失败时 socket 已在内部关闭。
    ///
    /// # 错误
    /// - `LinkError::InvalidArgument`: 接口名为空 / 过长
    /// - `LinkError::Os`: 启动接口、解析索引或 socket/bind 失败
    pub fn open(&mut self, interface: &str) -> Result<LinkHandle, LinkError> {
        iface::validate_name(interface)?;
        iface::bring_up(interface)?;
        let ifindex = iface::index(interface)?;

        let socket = CanSocket::open_iface(ifindex).map_err(|e| {
            error!("Failed to open CAN socket on '{}': {}", interface, e);
            LinkError::from_io("socket/bind(CAN_RAW)", &e)
        })?;

        let handle = self.links.insert(CanLink {
            interface: interface.to_string(),
            ifindex,
            socket,
        });
        info!(
            "CAN link opened: interface='{}', ifindex={}, handle={}",
            interface,
            ifindex,
            handle.as_raw()
        );
        Ok(handle)
    }

    /// 按配置打开链路并应用 socket 选项
    ///
    /// 选项设置失败时链路会被关闭，不留下半配置的句柄。
    pub fn open_with(&mut self, config: &CanConfig) -> Result<LinkHandle, LinkError> {
        let handle = self.open(&config.interface)?;
        if let Err(e) = self.apply_options(handle, config) {
            self.close(handle);
            return Err(e);
        }
        Ok(handle)
    }

    fn apply_options(&self, handle: LinkHandle, config: &CanConfig) -> Result<(), LinkError> {
        if let Some(enabled) = config.loopback {
            self.set_loopback(handle, enabled)?;
        }
        if let Some(enabled) = config.recv_own_msgs {
            self.set_recv_own_msgs(handle, enabled)?;
        }
        if !config.filters.is_empty() {
            self.set_filters(handle, &config.filters)?;
        }
        Ok(())
    }

    /// 发送一帧
    ///
    /// 参数检查先于任何系统调用：
    /// 1. `flags` 含 FD / BRS → `Unsupported`
    /// 2. payload 长度不在 `1..=8` → `InvalidArgument`
    ///
    /// 返回内核报告的写入字节数（完整帧结构，即 16），而不是 payload 长度。
    /// 超时内不可写返回 `LinkError::Timeout`。
    pub fn write(
        &self,
        handle: LinkHandle,
        id: u32,
        flags: CanFlags,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<usize, LinkError> {
        flags.ensure_classic()?;
        if payload.is_empty() || payload.len() > CAN_MAX_DLEN {
            return Err(LinkError::invalid(format!(
                "CAN payload length {} outside 1..={}",
                payload.len(),
                CAN_MAX_DLEN
            )));
        }

        let frame = CanFrame::new(id, flags, payload)?;
        self.send_frame(handle, &frame, timeout)
    }

    /// 发送一个已构造的帧（允许 0 字节 payload，例如 RTR 帧）
    pub fn send_frame(
        &self,
        handle: LinkHandle,
        frame: &CanFrame,
        timeout: Duration,
    ) -> Result<usize, LinkError> {
        let link = self.links.get(handle)?;
        let bytes = frame.encode();
        let written = timed_io::write(link.fd(), &bytes, timeout)?;

        trace!(
            "CAN TX on '{}': id=0x{:X}, flags={:?}, len={}, wrote {} bytes",
            link.interface,
            frame.id(),
            frame.flags(),
            frame.len(),
            written
        );
        Ok(written)
    }

    /// 接收一帧
    ///
    /// 超时内无数据返回 `LinkError::Timeout`；读到的字节数不足一帧返回 `Os(EIO)`。
    pub fn read(&self, handle: LinkHandle, timeout: Duration) -> Result<CanFrame, LinkError> {
        let link = self.links.get(handle)?;
        let mut bytes = [0u8; CAN_FRAME_LEN];
        let n = timed_io::read(link.fd(), &mut bytes, timeout)?;

        let frame = CanFrame::decode(&bytes[..n])?;
        trace!(
            "CAN RX on '{}': id=0x{:X}, flags={:?}, len={}",
            link.interface,
            frame.id(),
            frame.flags(),
            frame.len()
        );
        Ok(frame)
    }

    /// 接收一帧并把 payload 拷贝到调用方缓冲区
    ///
    /// 缓冲区放不下全部 payload 时只拷贝放得下的部分，返回的 `FrameHeader::len`
    /// 仍是帧声明的真实长度：`header.len > buf.len()` 即表示发生了截断。
    pub fn read_into(
        &self,
        handle: LinkHandle,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<FrameHeader, LinkError> {
        let frame = self.read(handle, timeout)?;
        let copied = frame.copy_payload_into(buf);
        if copied < frame.len() {
            trace!(
                "CAN RX payload truncated: frame len {}, buffer {}",
                frame.len(),
                buf.len()
            );
        }
        Ok(FrameHeader::from(&frame))
    }

    /// 关闭链路（幂等）
    ///
    /// 返回该句柄此前是否处于打开状态。
    pub fn close(&mut self, handle: LinkHandle) -> bool {
        match self.links.remove(handle) {
            Some(link) => {
                info!(
                    "CAN link closed: interface='{}', handle={}",
                    link.interface,
                    handle.as_raw()
                );
                true
            },
            None => {
                trace!("close on unknown CAN handle {}", handle.as_raw());
                false
            },
        }
    }

    /// `CAN_RAW_LOOPBACK`：本 socket 发送的帧是否回送给同一主机上的其他 socket
    pub fn set_loopback(&self, handle: LinkHandle, enabled: bool) -> Result<(), LinkError> {
        let link = self.links.get(handle)?;
        link.set_int_option(libc::CAN_RAW_LOOPBACK, enabled, "setsockopt(CAN_RAW_LOOPBACK)")?;
        trace!("CAN '{}' loopback={}", link.interface, enabled);
        Ok(())
    }

    /// `CAN_RAW_RECV_OWN_MSGS`：本 socket 是否接收自己发送的帧（需 loopback 开启）
    pub fn set_recv_own_msgs(&self, handle: LinkHandle, enabled: bool) -> Result<(), LinkError> {
        let link = self.links.get(handle)?;
        link.set_int_option(
            libc::CAN_RAW_RECV_OWN_MSGS,
            enabled,
            "setsockopt(CAN_RAW_RECV_OWN_MSGS)",
        )?;
        trace!("CAN '{}' recv_own_msgs={}", link.interface, enabled);
        Ok(())
    }

    /// 安装接收过滤器（替换原有过滤器）
    ///
    /// 空切片安装匹配所有帧的过滤器（`id=0, mask=0`），即恢复默认行为。
    ///
    /// # 错误
    /// - `LinkError::InvalidArgument`: 超过 `MAX_FILTERS` 个
    pub fn set_filters(&self, handle: LinkHandle, filters: &[CanFilter]) -> Result<(), LinkError> {
        if filters.len() > MAX_FILTERS {
            return Err(LinkError::invalid(format!(
                "{} CAN filters exceed the limit of {}",
                filters.len(),
                MAX_FILTERS
            )));
        }
        let link = self.links.get(handle)?;

        let accept_all = [CanFilter::accept_all()];
        let filters = if filters.is_empty() { &accept_all[..] } else { filters };
        let raw: Vec<libc::can_filter> = filters
            .iter()
            .map(|f| libc::can_filter {
                can_id: f.id,
                can_mask: f.mask,
            })
            .collect();

        set_raw_option_slice(link.fd(), libc::CAN_RAW_FILTER, &raw, "setsockopt(CAN_RAW_FILTER)")?;
        trace!("CAN '{}' installed {} filter(s)", link.interface, raw.len());
        Ok(())
    }

    /// 恢复为接收所有帧
    pub fn clear_filters(&self, handle: LinkHandle) -> Result<(), LinkError> {
        self.set_filters(handle, &[])
    }

    /// 查看链路信息
    pub fn link(&self, handle: LinkHandle) -> Result<&CanLink, LinkError> {
        self.links.get(handle)
    }

    pub fn is_open(&self, handle: LinkHandle) -> bool {
        self.links.contains(handle)
    }

    /// 当前打开的链路数
    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

impl Drop for CanTransport {
    fn drop(&mut self) {
        if !self.links.is_empty() {
            warn!(
                "CanTransport dropped with {} open link(s); closing them",
                self.links.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    /// 显式设置了 `COMMLINK_TEST_VCAN` 时返回 `(name, true)`
    fn test_interface() -> (String, bool) {
        match std::env::var("COMMLINK_TEST_VCAN") {
            Ok(name) => (name, true),
            Err(_) => ("vcan0".to_string(), false),
        }
    }

    /// 需要一个已启动的虚拟 CAN 接口（`ip link add dev vcan0 type vcan && ip link set up vcan0`）
    macro_rules! require_vcan {
        () => {{
            let (name, required) = test_interface();
            if !matches!(iface::is_up(&name), Ok(true)) {
                // 显式指定的接口必须可用
                if required {
                    panic!("COMMLINK_TEST_VCAN={} but the interface is not available or not UP", name);
                }
                eprintln!("Skipping test: {} interface not available or not UP", name);
                return;
            }
            name
        }};
    }

    const T: Duration = Duration::from_millis(100);

    fn forged_handle() -> LinkHandle {
        LinkHandle::from_raw(1).unwrap()
    }

    #[test]
    fn test_open_empty_name_is_invalid() {
        let mut transport = CanTransport::new();
        assert!(matches!(
            transport.open(""),
            Err(LinkError::InvalidArgument(_))
        ));
        assert!(transport.is_empty());
    }

    #[test]
    fn test_open_missing_interface_propagates_os_error() {
        let mut transport = CanTransport::new();
        let err = transport.open("nocan42").unwrap_err();
        assert_eq!(err.errno(), Some(libc::ENODEV));
        assert!(transport.is_empty());
    }

    #[test]
    fn test_write_rejects_fd_and_brs_before_anything_else() {
        let transport = CanTransport::new();
        for flags in [CanFlags::FD, CanFlags::BIT_RATE_SWITCH] {
            // 即使 payload 非法、句柄未知，也先报告 Unsupported
            let result = transport.write(forged_handle(), 0x1, flags, &[], Duration::ZERO);
            assert!(matches!(result, Err(LinkError::Unsupported(_))));
            assert_eq!(result.unwrap_err().code(), -libc::ENOTSUP);
        }
    }

    #[test]
    fn test_write_rejects_bad_payload_length() {
        let transport = CanTransport::new();
        for payload in [&[][..], &[0u8; 9][..]] {
            let result = transport.write(forged_handle(), 0x1, CanFlags::empty(), payload, T);
            assert!(matches!(result, Err(LinkError::InvalidArgument(_))));
        }
    }

    #[test]
    fn test_unknown_handle_is_bad_handle() {
        let transport = CanTransport::new();
        let result = transport.write(forged_handle(), 0x1, CanFlags::empty(), &[1], T);
        assert!(matches!(result, Err(LinkError::BadHandle)));
        assert!(matches!(
            transport.read(forged_handle(), T),
            Err(LinkError::BadHandle)
        ));
    }

    #[test]
    fn test_close_unknown_handle_is_noop() {
        let mut transport = CanTransport::new();
        assert!(!transport.close(forged_handle()));
        assert!(!transport.close(forged_handle()));
    }

    #[test]
    #[serial]
    fn test_vcan_self_loopback_round_trip() {
        let interface = require_vcan!();
        let mut transport = CanTransport::new();
        let mut config = CanConfig::new(&interface);
        config.recv_own_msgs = Some(true);
        let handle = transport.open_with(&config).unwrap();

        let written = transport
            .write(handle, 0x123, CanFlags::empty(), &[1, 2, 3], T)
            .unwrap();
        assert_eq!(written, CAN_FRAME_LEN);

        let frame = transport.read(handle, T).unwrap();
        assert_eq!(frame.id(), 0x123);
        assert_eq!(frame.flags(), CanFlags::empty());
        assert_eq!(frame.data(), &[1, 2, 3]);

        assert!(transport.close(handle));
    }

    #[test]
    #[serial]
    fn test_vcan_extended_rtr_between_two_links() {
        let interface = require_vcan!();
        let mut transport = CanTransport::new();
        let tx = transport.open(&interface).unwrap();
        let rx = transport.open(&interface).unwrap();
        assert_ne!(tx, rx);
        assert_eq!(transport.len(), 2);

        let flags = CanFlags::EXTENDED | CanFlags::REMOTE_REQUEST;
        transport.write(tx, 0x1ABC_DEF0, flags, &[0xAA], T).unwrap();

        let frame = transport.read(rx, T).unwrap();
        assert_eq!(frame.id(), 0x1ABC_DEF0);
        assert!(frame.is_extended());
        assert!(frame.is_remote());

        transport.close(tx);
        transport.close(rx);
        assert!(transport.is_empty());
    }

    #[test]
    #[serial]
    fn test_vcan_read_times_out_with_zero() {
        let interface = require_vcan!();
        let mut transport = CanTransport::new();
        let handle = transport.open(&interface).unwrap();
        // 只接收一个不会出现的 ID
        transport
            .set_filters(handle, &[CanFilter::new(0x7FE, 0x7FF)])
            .unwrap();

        let result = transport.read(handle, Duration::from_millis(20));
        assert!(matches!(result, Err(LinkError::Timeout)));
        assert_eq!(commlink_core::status_code(&result.map(|f| f.len())), 0);
        transport.close(handle);
    }

    #[test]
    #[serial]
    fn test_vcan_read_into_reports_true_length_on_truncation() {
        let interface = require_vcan!();
        let mut transport = CanTransport::new();
        let handle = transport.open(&interface).unwrap();
        transport.set_recv_own_msgs(handle, true).unwrap();

        transport
            .write(handle, 0x42, CanFlags::empty(), &[1, 2, 3, 4, 5, 6, 7, 8], T)
            .unwrap();

        let mut small = [0u8; 3];
        let header = transport.read_into(handle, &mut small, T).unwrap();
        assert_eq!(header.id, 0x42);
        assert_eq!(header.len, 8);
        assert_eq!(small, [1, 2, 3]);
        transport.close(handle);
    }

    #[test]
    #[serial]
    fn test_vcan_filter_limit() {
        let interface = require_vcan!();
        let mut transport = CanTransport::new();
        let handle = transport.open(&interface).unwrap();

        let too_many = vec![CanFilter::accept_all(); MAX_FILTERS + 1];
        assert!(matches!(
            transport.set_filters(handle, &too_many),
            Err(LinkError::InvalidArgument(_))
        ));
        assert!(transport.set_filters(handle, &too_many[..MAX_FILTERS]).is_ok());
        assert!(transport.clear_filters(handle).is_ok());
        transport.close(handle);
    }

    #[test]
    #[serial]
    fn test_vcan_close_is_idempotent_and_invalidates_handle() {
        let interface = require_vcan!();
        let mut transport = CanTransport::new();
        let handle = transport.open(&interface).unwrap();
        assert_eq!(transport.link(handle).unwrap().interface(), interface);
        assert!(transport.link(handle).unwrap().ifindex() > 0);

        assert!(transport.close(handle));
        assert!(!transport.close(handle));
        assert!(matches!(
            transport.write(handle, 0x1, CanFlags::empty(), &[1], T),
            Err(LinkError::BadHandle)
        ));

        // 新链路不会复用旧句柄
        let again = transport.open(&interface).unwrap();
        assert_ne!(again, handle);
        transport.close(again);
    }
}
