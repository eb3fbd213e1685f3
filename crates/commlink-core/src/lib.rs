//! # Commlink Core
//!
//! 设备传输层的公共部分（CAN 与串口共享）：
//!
//! - `error`: 统一错误类型 `LinkError` 及其在边界处的负 errno 编码
//! - `timed_io`: 有界超时的 readiness 等待 + 单次读写系统调用
//! - `handle`: 每个传输实现独占的句柄表（关闭后句柄失效，不会被静默复用）
//! - `window`: 调用方缓冲区 offset/length 校验
//!
//! ## 返回值约定
//!
//! 核心逻辑使用 `Result<_, LinkError>`；只有在兼容边界（`commlink-sdk::compat`）
//! 才折叠为整数：非负 = 成功计数，`0` = 超时，负数 = 错误。

pub mod error;
pub mod handle;
#[cfg(target_os = "linux")]
pub mod timed_io;
pub mod window;

pub use error::{LinkError, status_code};
pub use handle::{LinkHandle, LinkTable};
#[cfg(target_os = "linux")]
pub use timed_io::Readiness;
pub use window::{buffer_window, checked_window};
