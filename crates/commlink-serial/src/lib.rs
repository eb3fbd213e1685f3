//! # Commlink Serial
//!
//! termios 串口传输：
//!
//! - [`settings`]：波特率 / 数据位 / 停止位 / 校验的封闭集合与校验（所有平台）
//! - [`escalator`]：权限被拒绝时的一次性恢复能力（所有平台）
//! - [`SerialTransport`]：句柄化的打开/配置、有界超时读写、关闭（仅 Linux）
//!
//! ```no_run
//! # #[cfg(target_os = "linux")]
//! # fn main() -> Result<(), commlink_core::LinkError> {
//! use commlink_serial::{LineSettings, SerialBaud, SerialTransport, SuChmod};
//! use std::time::Duration;
//!
//! let mut transport = SerialTransport::with_escalator(SuChmod::new());
//! let handle = transport.open("/dev/ttyS1", LineSettings::new(SerialBaud::B115200))?;
//! transport.write(handle, b"AT\r", Duration::from_millis(500))?;
//! let mut buf = [0u8; 64];
//! let n = transport.read(handle, &mut buf, Duration::from_millis(500))?;
//! println!("{:?}", &buf[..n]);
//! transport.close(handle);
//! # Ok(())
//! # }
//! # #[cfg(not(target_os = "linux"))]
//! # fn main() {}
//! ```

pub mod escalator;
pub mod settings;

#[cfg(target_os = "linux")]
pub mod termios;
#[cfg(target_os = "linux")]
mod transport;

pub use escalator::{EscalationError, NoEscalation, PrivilegeEscalator, SuChmod};
pub use settings::{DataBits, LineSettings, Parity, SerialBaud, SerialConfig, StopBits};

#[cfg(target_os = "linux")]
pub use transport::{SerialLink, SerialTransport};
