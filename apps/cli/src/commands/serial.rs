//! 串口命令
//!
//! ```bash
//! commlink-cli serial send -p /dev/ttyUSB0 -b 115200 "hello"
//! commlink-cli serial send --hex "AA 55 01"
//! commlink-cli serial read --max 64 -t 1000
//! ```

use crate::commands::config::CliConfig;
use crate::utils::{format_hex, parse_hex_bytes};
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use commlink_sdk::{LinkError, LinkHandle, SerialConfig, SerialTransport, SuChmod};

/// 公共端口参数（覆盖配置文件）
#[derive(Args, Debug, Clone, Default)]
pub struct PortArgs {
    /// 设备路径（覆盖配置）
    #[arg(short, long)]
    pub path: Option<String>,

    /// 波特率（覆盖配置）
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// 读写超时（毫秒，覆盖配置）
    #[arg(short, long)]
    pub timeout_ms: Option<u64>,

    /// 权限不足时通过 `su` 修改设备权限后重试一次
    #[arg(long)]
    pub su: bool,
}

impl PortArgs {
    fn resolve(&self, mut config: SerialConfig) -> SerialConfig {
        if let Some(path) = &self.path {
            config.path = path.clone();
        }
        if let Some(baud) = self.baud {
            config.baud_rate = baud;
        }
        if let Some(ms) = self.timeout_ms {
            config.read_timeout_ms = ms;
            config.write_timeout_ms = ms;
        }
        config
    }

    fn transport(&self) -> SerialTransport {
        if self.su {
            SerialTransport::with_escalator(SuChmod::new())
        } else {
            SerialTransport::new()
        }
    }
}

/// 串口命令
#[derive(Subcommand, Debug)]
pub enum SerialCommand {
    /// 发送数据
    Send {
        /// 要发送的数据（默认按文本发送）
        data: String,

        /// 按十六进制解析数据
        #[arg(long)]
        hex: bool,

        #[command(flatten)]
        port: PortArgs,
    },

    /// 读取一次数据并以十六进制打印
    Read {
        /// 最多读取的字节数
        #[arg(short, long, default_value_t = 256)]
        max: usize,

        #[command(flatten)]
        port: PortArgs,
    },
}

impl SerialCommand {
    pub fn execute(self, config: &CliConfig) -> Result<()> {
        match self {
            SerialCommand::Send { data, hex, port } => {
                let payload = if hex {
                    parse_hex_bytes(&data)?
                } else {
                    data.into_bytes()
                };
                let serial = port.resolve(config.serial.clone());
                with_port(port.transport(), &serial, |transport, handle| {
                    let n = match transport.write(handle, &payload, serial.write_timeout()) {
                        Ok(n) => n,
                        Err(LinkError::Timeout) => {
                            anyhow::bail!("发送超时（{} ms）", serial.write_timeout_ms)
                        },
                        Err(e) => return Err(e).context("发送失败"),
                    };
                    println!("✅ 已发送 {}/{} 字节", n, payload.len());
                    Ok(())
                })
            },

            SerialCommand::Read { max, port } => {
                if max == 0 {
                    anyhow::bail!("--max 必须大于 0");
                }
                let serial = port.resolve(config.serial.clone());
                with_port(port.transport(), &serial, |transport, handle| {
                    let mut buf = vec![0u8; max];
                    match transport.read(handle, &mut buf, serial.read_timeout()) {
                        Ok(n) => println!("[{}]  {}", n, format_hex(&buf[..n])),
                        Err(LinkError::Timeout) => {
                            eprintln!("{} ms 内未收到数据", serial.read_timeout_ms)
                        },
                        Err(e) => return Err(e).context("接收失败"),
                    }
                    Ok(())
                })
            },
        }
    }
}

/// 打开端口，执行操作后关闭（无论成功与否）
fn with_port<F>(mut transport: SerialTransport, config: &SerialConfig, op: F) -> Result<()>
where
    F: FnOnce(&SerialTransport, LinkHandle) -> Result<()>,
{
    let handle = match transport.open_config(config) {
        Ok(handle) => handle,
        Err(e @ LinkError::PermissionDenied { .. }) => {
            return Err(e).with_context(|| format!("无权限打开 '{}'（可尝试 --su）", config.path));
        },
        Err(e) => return Err(e).with_context(|| format!("打开串口 '{}' 失败", config.path)),
    };

    let result = op(&transport, handle);
    transport.close(handle);
    result
}
