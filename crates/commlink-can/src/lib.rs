//! # Commlink CAN
//!
//! 经典 CAN（CAN 2.0）传输层，基于 Linux SocketCAN。
//!
//! - [`frame`]：帧编解码与标志位，无硬件依赖，所有平台可用
//! - [`iface`]：接口 UP/DOWN 控制与索引解析（仅 Linux）
//! - [`CanTransport`]：句柄化的链路管理与有界超时收发（仅 Linux）
//!
//! ```no_run
//! # #[cfg(target_os = "linux")]
//! # fn main() -> Result<(), commlink_core::LinkError> {
//! use commlink_can::{CanFlags, CanTransport};
//! use std::time::Duration;
//!
//! let mut transport = CanTransport::new();
//! let handle = transport.open("can0")?;
//! transport.write(handle, 0x123, CanFlags::empty(), &[1, 2, 3], Duration::from_millis(100))?;
//! let frame = transport.read(handle, Duration::from_millis(100))?;
//! println!("0x{:X} {:02X?}", frame.id(), frame.data());
//! transport.close(handle);
//! # Ok(())
//! # }
//! # #[cfg(not(target_os = "linux"))]
//! # fn main() {}
//! ```

pub mod config;
pub mod frame;

#[cfg(target_os = "linux")]
pub mod iface;

#[cfg(target_os = "linux")]
mod transport;

pub use config::{CanConfig, CanFilter};
pub use frame::{
    CAN_EFF_FLAG, CAN_EFF_MASK, CAN_ERR_FLAG, CAN_FRAME_LEN, CAN_MAX_DLEN, CAN_RTR_FLAG,
    CAN_SFF_MASK, CanFlags, CanFrame, FrameHeader, decode_id, encode_id,
};

#[cfg(target_os = "linux")]
pub use transport::{CanLink, CanTransport, MAX_FILTERS};
