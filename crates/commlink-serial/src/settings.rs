//! 串口线路参数
//!
//! 调用方传入的原始整数（波特率、数据位、停止位、校验）在这里被校验为
//! 封闭的枚举集合；任何不在集合内的值都是 `InvalidArgument`，不做就近取整或回退默认值。

use commlink_core::LinkError;
use std::fmt;
use std::time::Duration;

/// 支持的波特率（封闭集合，50 ~ 4,000,000）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, num_enum::TryFromPrimitive, num_enum::IntoPrimitive)]
#[repr(u32)]
pub enum SerialBaud {
    B50 = 50,
    B75 = 75,
    B110 = 110,
    B134 = 134,
    B150 = 150,
    B200 = 200,
    B300 = 300,
    B600 = 600,
    B1200 = 1200,
    B1800 = 1800,
    B2400 = 2400,
    B4800 = 4800,
    B9600 = 9600,
    B19200 = 19200,
    B38400 = 38400,
    B57600 = 57600,
    B115200 = 115_200,
    B230400 = 230_400,
    B460800 = 460_800,
    B500000 = 500_000,
    B576000 = 576_000,
    B921600 = 921_600,
    B1000000 = 1_000_000,
    B1152000 = 1_152_000,
    B1500000 = 1_500_000,
    B2000000 = 2_000_000,
    B2500000 = 2_500_000,
    B3000000 = 3_000_000,
    B3500000 = 3_500_000,
    B4000000 = 4_000_000,
}

impl SerialBaud {
    pub fn as_u32(self) -> u32 {
        self.into()
    }
}

impl TryFrom<i32> for SerialBaud {
    type Error = LinkError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        u32::try_from(value)
            .ok()
            .and_then(|v| SerialBaud::try_from(v).ok())
            .ok_or_else(|| LinkError::invalid(format!("unsupported baud rate {}", value)))
    }
}

impl fmt::Display for SerialBaud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

/// 数据位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, num_enum::TryFromPrimitive, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum DataBits {
    Five = 5,
    Six = 6,
    Seven = 7,
    #[default]
    Eight = 8,
}

/// 停止位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, num_enum::TryFromPrimitive, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum StopBits {
    #[default]
    One = 1,
    Two = 2,
}

/// 校验方式（边界整数：0 = 无，1 = 奇，2 = 偶）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, num_enum::TryFromPrimitive, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum Parity {
    #[default]
    None = 0,
    Odd = 1,
    Even = 2,
}

impl Parity {
    fn letter(self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        }
    }
}

/// 已校验的线路参数
///
/// 只能整体替换，不存在部分更新。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineSettings {
    pub baud: SerialBaud,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
}

impl Default for LineSettings {
    /// 9600 8N1
    fn default() -> Self {
        Self {
            baud: SerialBaud::B9600,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
        }
    }
}

impl LineSettings {
    pub fn new(baud: SerialBaud) -> Self {
        Self {
            baud,
            ..Self::default()
        }
    }

    /// 从边界整数构造
    ///
    /// # 错误
    /// `LinkError::InvalidArgument`：任一参数不在支持的集合内
    pub fn from_raw(baud: i32, data_bits: i32, stop_bits: i32, parity: i32) -> Result<Self, LinkError> {
        let baud = SerialBaud::try_from(baud)?;
        let data_bits = u8::try_from(data_bits)
            .ok()
            .and_then(|v| DataBits::try_from(v).ok())
            .ok_or_else(|| LinkError::invalid(format!("unsupported data bits {}", data_bits)))?;
        let stop_bits = u8::try_from(stop_bits)
            .ok()
            .and_then(|v| StopBits::try_from(v).ok())
            .ok_or_else(|| LinkError::invalid(format!("unsupported stop bits {}", stop_bits)))?;
        let parity = u8::try_from(parity)
            .ok()
            .and_then(|v| Parity::try_from(v).ok())
            .ok_or_else(|| LinkError::invalid(format!("unsupported parity {}", parity)))?;

        Ok(Self {
            baud,
            data_bits,
            stop_bits,
            parity,
        })
    }
}

impl fmt::Display for LineSettings {
    /// 例如 `115200 8N1`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}{}{}",
            self.baud,
            u8::from(self.data_bits),
            self.parity.letter(),
            u8::from(self.stop_bits)
        )
    }
}

/// 默认读写超时（毫秒）
pub const DEFAULT_TIMEOUT_MS: u64 = 500;

/// 串口配置（原始值，打开前通过 `TryFrom` 校验为 `LineSettings`）
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SerialConfig {
    pub path: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: u8,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: "/dev/ttyS0".to_string(),
            baud_rate: 9600,
            data_bits: 8,
            stop_bits: 1,
            parity: 0,
            read_timeout_ms: DEFAULT_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl SerialConfig {
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
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

impl TryFrom<&SerialConfig> for LineSettings {
    type Error = LinkError;

    fn try_from(config: &SerialConfig) -> Result<Self, Self::Error> {
        let baud = SerialBaud::try_from(config.baud_rate)
            .map_err(|_| LinkError::invalid(format!("unsupported baud rate {}", config.baud_rate)))?;
        let data_bits = DataBits::try_from(config.data_bits)
            .map_err(|_| LinkError::invalid(format!("unsupported data bits {}", config.data_bits)))?;
        let stop_bits = StopBits::try_from(config.stop_bits)
            .map_err(|_| LinkError::invalid(format!("unsupported stop bits {}", config.stop_bits)))?;
        let parity = Parity::try_from(config.parity)
            .map_err(|_| LinkError::invalid(format!("unsupported parity {}", config.parity)))?;

        Ok(Self {
            baud,
            data_bits,
            stop_bits,
            parity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_baud_rates() {
        assert_eq!(SerialBaud::try_from(9600u32).unwrap(), SerialBaud::B9600);
        assert_eq!(SerialBaud::try_from(4_000_000i32).unwrap(), SerialBaud::B4000000);
        assert_eq!(SerialBaud::B115200.as_u32(), 115_200);
    }

    #[test]
    fn test_unknown_baud_is_rejected_not_rounded() {
        for baud in [0, 9601, 14_400, 250_000, 4_000_001, -9600] {
            let result = SerialBaud::try_from(baud);
            assert!(
                matches!(result, Err(LinkError::InvalidArgument(_))),
                "baud {} should be rejected",
                baud
            );
        }
    }

    #[test]
    fn test_from_raw() {
        let settings = LineSettings::from_raw(115_200, 7, 2, 2).unwrap();
        assert_eq!(settings.baud, SerialBaud::B115200);
        assert_eq!(settings.data_bits, DataBits::Seven);
        assert_eq!(settings.stop_bits, StopBits::Two);
        assert_eq!(settings.parity, Parity::Even);
        assert_eq!(settings.to_string(), "115200 7E2");
    }

    #[test]
    fn test_from_raw_rejects_out_of_range_framing() {
        assert!(LineSettings::from_raw(9600, 4, 1, 0).is_err());
        assert!(LineSettings::from_raw(9600, 9, 1, 0).is_err());
        assert!(LineSettings::from_raw(9600, 8, 3, 0).is_err());
        assert!(LineSettings::from_raw(9600, 8, 1, 3).is_err());
        assert!(LineSettings::from_raw(9600, 8, 1, -1).is_err());
    }

    #[test]
    fn test_default_is_9600_8n1() {
        assert_eq!(LineSettings::default().to_string(), "9600 8N1");
        let from_config = LineSettings::try_from(&SerialConfig::default()).unwrap();
        assert_eq!(from_config, LineSettings::default());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SerialConfig::new("/dev/ttyUSB0", 921_600);
        config.parity = 1;
        let settings = LineSettings::try_from(&config).unwrap();
        assert_eq!(settings.baud, SerialBaud::B921600);
        assert_eq!(settings.parity, Parity::Odd);

        config.baud_rate = 12345;
        assert!(matches!(
            LineSettings::try_from(&config),
            Err(LinkError::InvalidArgument(_))
        ));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_config_serde_defaults() {
        let config: SerialConfig = serde_json::from_str(r#"{"path":"/dev/ttyACM0","baud_rate":115200}"#).unwrap();
        assert_eq!(config.data_bits, 8);
        assert_eq!(config.read_timeout(), Duration::from_millis(500));
    }
}
