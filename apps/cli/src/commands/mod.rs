//! 命令定义和实现

pub mod config;

#[cfg(target_os = "linux")]
pub mod can;
#[cfg(target_os = "linux")]
pub mod serial;

pub use config::ConfigCommand;

#[cfg(target_os = "linux")]
pub use can::CanCommand;
#[cfg(target_os = "linux")]
pub use serial::SerialCommand;
