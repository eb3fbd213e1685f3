//! CAN 链路配置

use std::time::Duration;

/// 默认读写超时（毫秒）
pub const DEFAULT_TIMEOUT_MS: u64 = 500;

/// 内核接收过滤器（`struct can_filter`）
///
/// 当 `received_id & mask == id & mask` 时帧被接收。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CanFilter {
    pub id: u32,
    pub mask: u32,
}

impl CanFilter {
    pub const fn new(id: u32, mask: u32) -> Self {
        Self { id, mask }
    }

    /// 精确匹配一个标准帧 ID
    pub const fn exact_standard(id: u16) -> Self {
        Self {
            id: id as u32 & crate::CAN_SFF_MASK,
            mask: crate::CAN_SFF_MASK | crate::CAN_EFF_FLAG | crate::CAN_RTR_FLAG,
        }
    }

    /// 匹配所有帧（内核默认过滤器）
    pub const fn accept_all() -> Self {
        Self { id: 0, mask: 0 }
    }
}

/// CAN 链路配置
///
/// `loopback` / `recv_own_msgs` 为 `None` 时保持内核默认值（loopback 开，接收自身帧关）；
/// `filters` 为空时不修改内核过滤器。
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CanConfig {
    pub interface: String,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub loopback: Option<bool>,
    pub recv_own_msgs: Option<bool>,
    pub filters: Vec<CanFilter>,
}

impl Default for CanConfig {
    fn default() -> Self {
        Self {
            interface: "can0".to_string(),
            read_timeout_ms: DEFAULT_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_TIMEOUT_MS,
            loopback: None,
            recv_own_msgs: None,
            filters: Vec::new(),
        }
    }
}

impl CanConfig {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            ..Self::default()
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}
