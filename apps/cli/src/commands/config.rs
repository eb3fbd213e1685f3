//! 配置管理命令
//!
//! 默认链路参数保存在 `$XDG_CONFIG_HOME/commlink/config.toml`：
//!
//! ```toml
//! [can]
//! interface = "can0"
//! read_timeout_ms = 500
//!
//! [serial]
//! path = "/dev/ttyS1"
//! baud_rate = 115200
//! ```

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use commlink_sdk::{CanConfig, LineSettings, SerialConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 配置文件路径
fn config_dir() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("无法确定配置目录"))?;

    path.push("commlink");
    Ok(path)
}

pub fn config_file() -> Result<PathBuf> {
    let mut path = config_dir()?;
    path.push("config.toml");
    Ok(path)
}

/// CLI 配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub can: CanConfig,
    pub serial: SerialConfig,
}

impl CliConfig {
    /// 加载配置（文件不存在时返回默认值）
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("解析配置文件失败: {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&config_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("创建配置目录失败")?;
        }
        let content = toml::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, content).with_context(|| format!("写入配置文件失败: {}", path.display()))?;
        Ok(())
    }

    /// 设置一个配置项（`section.field`），取值无效时配置保持不变
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut next = self.clone();
        next.apply(key, value)?;
        if key.starts_with("serial.") {
            LineSettings::try_from(&next.serial).with_context(|| format!("'{}' 的取值无效", key))?;
        }
        *self = next;
        Ok(())
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "can.interface" => self.can.interface = value.to_string(),
            "can.read_timeout_ms" => self.can.read_timeout_ms = parse(key, value)?,
            "can.write_timeout_ms" => self.can.write_timeout_ms = parse(key, value)?,
            "can.loopback" => self.can.loopback = Some(parse(key, value)?),
            "can.recv_own_msgs" => self.can.recv_own_msgs = Some(parse(key, value)?),
            "serial.path" => self.serial.path = value.to_string(),
            "serial.baud_rate" => self.serial.baud_rate = parse(key, value)?,
            "serial.data_bits" => self.serial.data_bits = parse(key, value)?,
            "serial.stop_bits" => self.serial.stop_bits = parse(key, value)?,
            "serial.parity" => {
                self.serial.parity = match value {
                    "none" | "n" | "0" => 0,
                    "odd" | "o" | "1" => 1,
                    "even" | "e" | "2" => 2,
                    _ => bail!("无效的校验方式 '{}'（none / odd / even）", value),
                }
            },
            "serial.read_timeout_ms" => self.serial.read_timeout_ms = parse(key, value)?,
            "serial.write_timeout_ms" => self.serial.write_timeout_ms = parse(key, value)?,
            _ => bail!("未知配置项 '{}'", key),
        }
        Ok(())
    }

    /// 读取一个配置项；`all` 返回整个 TOML
    pub fn get(&self, key: &str) -> Result<String> {
        let value = match key {
            "all" => return toml::to_string_pretty(self).context("序列化配置失败"),
            "can.interface" => self.can.interface.clone(),
            "can.read_timeout_ms" => self.can.read_timeout_ms.to_string(),
            "can.write_timeout_ms" => self.can.write_timeout_ms.to_string(),
            "can.loopback" => option_string(self.can.loopback),
            "can.recv_own_msgs" => option_string(self.can.recv_own_msgs),
            "serial.path" => self.serial.path.clone(),
            "serial.baud_rate" => self.serial.baud_rate.to_string(),
            "serial.data_bits" => self.serial.data_bits.to_string(),
            "serial.stop_bits" => self.serial.stop_bits.to_string(),
            "serial.parity" => self.serial.parity.to_string(),
            "serial.read_timeout_ms" => self.serial.read_timeout_ms.to_string(),
            "serial.write_timeout_ms" => self.serial.write_timeout_ms.to_string(),
            _ => bail!("未知配置项 '{}'", key),
        };
        Ok(value)
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.parse().with_context(|| format!("'{}' 的取值 '{}' 无效", key, value))
}

fn option_string(value: Option<bool>) -> String {
    value.map_or_else(|| "(未设置)".to_string(), |v| v.to_string())
}

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 设置配置项（例如 `config set can.interface vcan0`）
    Set {
        /// 配置项名称（section.field）
        key: String,
        /// 取值
        value: String,
    },

    /// 获取配置项
    Get {
        /// 配置项名称
        #[arg(default_value = "all")]
        key: String,
    },

    /// 显示配置文件路径
    Path,
}

impl ConfigCommand {
    pub fn execute(self) -> Result<()> {
        match self {
            ConfigCommand::Set { key, value } => {
                let mut config = CliConfig::load()?;
                config.set(&key, &value)?;
                config.save()?;
                println!("✅ {} = {}", key, value);
            },

            ConfigCommand::Get { key } => {
                let config = CliConfig::load()?;
                println!("{}", config.get(&key)?);
            },

            ConfigCommand::Path => {
                println!("{}", config_file()?.display());
            },
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliConfig::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, CliConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = CliConfig::default();
        config.set("can.interface", "vcan0").unwrap();
        config.set("can.recv_own_msgs", "true").unwrap();
        config.set("serial.path", "/dev/ttyUSB0").unwrap();
        config.set("serial.baud_rate", "115200").unwrap();
        config.set("serial.parity", "even").unwrap();
        config.save_to(&path).unwrap();

        let loaded = CliConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.get("can.interface").unwrap(), "vcan0");
        assert_eq!(loaded.get("serial.parity").unwrap(), "2");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[serial]\npath = \"/dev/ttyS3\"\n").unwrap();

        let config = CliConfig::load_from(&path).unwrap();
        assert_eq!(config.serial.path, "/dev/ttyS3");
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.can, CanConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = CliConfig::default();
        assert!(config.set("serial.baud_rate", "12345").is_err());
        assert!(config.set("serial.data_bits", "9").is_err());
        assert!(config.set("serial.parity", "mark").is_err());
        assert!(config.set("can.read_timeout_ms", "-1").is_err());
        assert!(config.set("nope", "1").is_err());
        assert!(config.get("nope").is_err());
        assert_eq!(config, CliConfig::default());
    }
}
