//! Commlink SDK - CAN / 串口设备传输层
//!
//! 为应用提供有界超时、基于句柄的两种物理链路访问：
//!
//! - **CAN** (`can`): Linux SocketCAN 上的经典 CAN 帧收发
//! - **串口** (`serial`): termios 配置的字符设备读写，带一次性权限恢复
//! - **公共层** (`common`): 统一错误类型、超时 I/O、句柄表
//!
//! 两种传输的契约形状相同：`open` 得到句柄 → 带超时的 `write` / `read` → `close`。
//!
//! # 快速开始
//!
//! ```no_run
//! # #[cfg(target_os = "linux")]
//! # fn main() -> Result<(), commlink_sdk::LinkError> {
//! use commlink_sdk::{CanFlags, CanTransport};
//! use std::time::Duration;
//!
//! commlink_sdk::logging::init();
//!
//! let mut can = CanTransport::new();
//! let handle = can.open("can0")?;
//! can.write(handle, 0x123, CanFlags::empty(), &[1, 2, 3], Duration::from_millis(100))?;
//! can.close(handle);
//! # Ok(())
//! # }
//! # #[cfg(not(target_os = "linux"))]
//! # fn main() {}
//! ```
//!
//! 只能传递整数的调用方使用 [`compat`] 中的 `NativeCan` / `NativeSerial`。

pub use commlink_can as can;
pub use commlink_core as common;
pub use commlink_serial as serial;

pub mod logging;

#[cfg(target_os = "linux")]
pub mod compat;

// --- 常用类型 ---

pub use commlink_core::{LinkError, LinkHandle, status_code};

pub use commlink_can::{CanConfig, CanFilter, CanFlags, CanFrame, FrameHeader};
#[cfg(target_os = "linux")]
pub use commlink_can::CanTransport;

pub use commlink_serial::{
    DataBits, LineSettings, NoEscalation, Parity, PrivilegeEscalator, SerialBaud, SerialConfig,
    StopBits, SuChmod,
};
#[cfg(target_os = "linux")]
pub use commlink_serial::SerialTransport;

#[cfg(target_os = "linux")]
pub use compat::{NativeCan, NativeSerial};
