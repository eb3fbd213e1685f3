//! 整数句柄 / 负 errno 兼容接口
//!
//! 面向只能传递整数与字节数组的调用方（FFI 绑定、脚本桥接等）。
//! 所有方法都不返回 `Result`：
//!
//! | 返回值 | 含义 |
//! |--------|------|
//! | `> 0` | 句柄 / 字节数 / 帧长度 |
//! | `0` | 读写超时 |
//! | `< 0` | `-errno`；`-EINVAL` 参数非法，`-ENOTSUP` 请求 FD/BRS，`-EBADF` 句柄未知 |
//!
//! 超时参数为毫秒，负数视为非法参数。

use commlink_can::{CAN_MAX_DLEN, CanFlags, CanTransport};
use commlink_core::{LinkError, LinkHandle, checked_window, status_code};
use commlink_serial::{LineSettings, PrivilegeEscalator, SerialTransport};
use std::time::Duration;
use tracing::{trace, warn};

fn timeout_from_ms(timeout_ms: i32) -> Result<Duration, LinkError> {
    u64::try_from(timeout_ms)
        .map(Duration::from_millis)
        .map_err(|_| LinkError::invalid(format!("negative timeout {}ms", timeout_ms)))
}

fn handle_from_raw(handle: i64) -> Result<LinkHandle, LinkError> {
    LinkHandle::from_raw(handle).ok_or(LinkError::BadHandle)
}

fn unit_code(result: Result<(), LinkError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => e.code(),
    }
}

fn handle_code(result: Result<LinkHandle, LinkError>) -> i64 {
    match result {
        Ok(handle) => handle.as_raw(),
        Err(e) => i64::from(e.code()),
    }
}

/// CAN 兼容接口
#[derive(Debug, Default)]
pub struct NativeCan {
    transport: CanTransport,
}

impl NativeCan {
    pub fn new() -> Self {
        Self::default()
    }

    /// 启动接口：`0` 成功，负数失败
    ///
    /// `bitrate` 仅记录日志，由系统工具配置；`fd_mode = true` 返回 `-ENOTSUP`。
    pub fn bring_up(&self, if_name: &str, bitrate: i32, fd_mode: bool) -> i32 {
        trace!(
            "bring_up({}), bitrate={}, fd_mode={} (bitrate is not configured here)",
            if_name,
            bitrate,
            fd_mode
        );
        if fd_mode {
            return LinkError::Unsupported("CAN FD mode".to_string()).code();
        }
        unit_code(self.transport.bring_up(if_name))
    }

    pub fn bring_down(&self, if_name: &str) -> i32 {
        unit_code(self.transport.bring_down(if_name))
    }

    /// 打开链路：正数句柄，负数失败
    pub fn open(&mut self, if_name: &str) -> i64 {
        handle_code(self.transport.open(if_name))
    }

    /// 发送 `data[offset..offset + length]`，返回写入的帧字节数
    #[allow(clippy::too_many_arguments)]
    pub fn write(
        &self,
        handle: i64,
        frame_id: i32,
        flags: i32,
        data: &[u8],
        offset: i32,
        length: i32,
        timeout_ms: i32,
    ) -> i32 {
        status_code(&self.try_write(handle, frame_id, flags, data, offset, length, timeout_ms))
    }

    #[allow(clippy::too_many_arguments)]
    fn try_write(
        &self,
        handle: i64,
        frame_id: i32,
        flags: i32,
        data: &[u8],
        offset: i32,
        length: i32,
        timeout_ms: i32,
    ) -> Result<usize, LinkError> {
        let flags = CanFlags::from_bits_retain(flags as u32);
        flags.ensure_classic()?;
        if length <= 0 || length as usize > CAN_MAX_DLEN {
            return Err(LinkError::invalid(format!("CAN payload length {}", length)));
        }
        let range = checked_window(data.len(), offset, length)?;
        let timeout = timeout_from_ms(timeout_ms)?;
        let handle = handle_from_raw(handle)?;

        self.transport
            .write(handle, frame_id as u32, flags, &data[range], timeout)
    }

    /// 接收一帧
    ///
    /// `out_id` / `out_flags` 写入帧 ID 与标志位，payload 从 `data[offset]` 开始写入，
    /// 至多 `min(max_len, 8)` 字节且不超出 `data`。返回帧声明的真实长度（可能大于写入的字节数）。
    #[allow(clippy::too_many_arguments)]
    pub fn read(
        &self,
        handle: i64,
        out_id: &mut i32,
        out_flags: &mut i32,
        data: &mut [u8],
        offset: i32,
        max_len: i32,
        timeout_ms: i32,
    ) -> i32 {
        status_code(&self.try_read(handle, out_id, out_flags, data, offset, max_len, timeout_ms))
    }

    #[allow(clippy::too_many_arguments)]
    fn try_read(
        &self,
        handle: i64,
        out_id: &mut i32,
        out_flags: &mut i32,
        data: &mut [u8],
        offset: i32,
        max_len: i32,
        timeout_ms: i32,
    ) -> Result<usize, LinkError> {
        if max_len <= 0 {
            return Err(LinkError::invalid(format!("max_len {}", max_len)));
        }
        let offset = usize::try_from(offset)
            .ok()
            .filter(|&o| o < data.len())
            .ok_or_else(|| LinkError::invalid(format!("offset {} outside buffer", offset)))?;
        let end = data.len().min(offset + (max_len as usize).min(CAN_MAX_DLEN));
        let timeout = timeout_from_ms(timeout_ms)?;
        let handle = handle_from_raw(handle)?;

        let header = self.transport.read_into(handle, &mut data[offset..end], timeout)?;
        *out_id = header.id as i32;
        *out_flags = header.flags.bits() as i32;
        Ok(header.len)
    }

    /// 关闭链路；未知、已关闭或非正句柄什么都不做
    pub fn close(&mut self, handle: i64) {
        if let Some(handle) = LinkHandle::from_raw(handle) {
            self.transport.close(handle);
        }
    }

    pub fn transport(&self) -> &CanTransport {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut CanTransport {
        &mut self.transport
    }
}

/// 串口兼容接口
#[derive(Debug, Default)]
pub struct NativeSerial {
    transport: SerialTransport,
}

impl NativeSerial {
    /// 不提权
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_escalator(escalator: impl PrivilegeEscalator + 'static) -> Self {
        Self {
            transport: SerialTransport::with_escalator(escalator),
        }
    }

    /// 打开并配置串口：正数句柄，负数失败
    ///
    /// 参数（`parity`: 0 无 / 1 奇 / 2 偶）在打开设备之前校验。
    pub fn open(&mut self, path: &str, baud_rate: i32, data_bits: i32, stop_bits: i32, parity: i32) -> i64 {
        let result = LineSettings::from_raw(baud_rate, data_bits, stop_bits, parity)
            .and_then(|settings| self.transport.open(path, settings));
        if let Err(e) = &result {
            warn!("serial open({}) failed: {}", path, e);
        }
        handle_code(result)
    }

    /// 写入 `data[offset..offset + length]`
    pub fn write(&self, handle: i64, data: &[u8], offset: i32, length: i32, timeout_ms: i32) -> i32 {
        status_code(&self.try_write(handle, data, offset, length, timeout_ms))
    }

    fn try_write(
        &self,
        handle: i64,
        data: &[u8],
        offset: i32,
        length: i32,
        timeout_ms: i32,
    ) -> Result<usize, LinkError> {
        let range = checked_window(data.len(), offset, length)?;
        let timeout = timeout_from_ms(timeout_ms)?;
        let handle = handle_from_raw(handle)?;
        self.transport.write(handle, &data[range], timeout)
    }

    /// 读入 `buffer[offset..offset + length]`
    pub fn read(&self, handle: i64, buffer: &mut [u8], offset: i32, length: i32, timeout_ms: i32) -> i32 {
        status_code(&self.try_read(handle, buffer, offset, length, timeout_ms))
    }

    fn try_read(
        &self,
        handle: i64,
        buffer: &mut [u8],
        offset: i32,
        length: i32,
        timeout_ms: i32,
    ) -> Result<usize, LinkError> {
        let range = checked_window(buffer.len(), offset, length)?;
        let timeout = timeout_from_ms(timeout_ms)?;
        let handle = handle_from_raw(handle)?;
        self.transport.read(handle, &mut buffer[range], timeout)
    }

    pub fn close(&mut self, handle: i64) {
        if let Some(handle) = LinkHandle::from_raw(handle) {
            self.transport.close(handle);
        }
    }

    pub fn transport(&self) -> &SerialTransport {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut SerialTransport {
        &mut self.transport
    }
}
