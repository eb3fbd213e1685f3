//! CAN 命令
//!
//! ```bash
//! commlink-cli can up can0
//! commlink-cli can send 0x123 "01 02 03"
//! commlink-cli can send --extended --rtr 0x18FF50E5 00
//! commlink-cli can dump --count 10
//! ```

use crate::commands::config::CliConfig;
use crate::utils::{format_hex, parse_can_id, parse_hex_bytes};
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use commlink_sdk::{CanConfig, CanFilter, CanFlags, CanTransport, LinkError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

/// 公共链路参数（覆盖配置文件）
#[derive(Args, Debug, Clone, Default)]
pub struct LinkArgs {
    /// CAN 接口（覆盖配置）
    #[arg(short, long)]
    pub interface: Option<String>,

    /// 读写超时（毫秒，覆盖配置）
    #[arg(short, long)]
    pub timeout_ms: Option<u64>,
}

impl LinkArgs {
    fn resolve(&self, mut config: CanConfig) -> CanConfig {
        if let Some(interface) = &self.interface {
            config.interface = interface.clone();
        }
        if let Some(ms) = self.timeout_ms {
            config.read_timeout_ms = ms;
            config.write_timeout_ms = ms;
        }
        config
    }
}

/// CAN 命令
#[derive(Subcommand, Debug)]
pub enum CanCommand {
    /// 启动接口（需要 CAP_NET_ADMIN）
    Up {
        /// 接口名称，默认取配置
        interface: Option<String>,
    },

    /// 关闭接口
    Down {
        /// 接口名称，默认取配置
        interface: Option<String>,
    },

    /// 发送一帧
    Send {
        /// 帧 ID（0x 前缀为十六进制）
        id: String,

        /// 十六进制数据（1-8 字节，例如 "01 02 03"）
        data: String,

        /// 扩展帧（29-bit ID）
        #[arg(short, long)]
        extended: bool,

        /// 远程帧
        #[arg(long)]
        rtr: bool,

        #[command(flatten)]
        link: LinkArgs,
    },

    /// 打印收到的帧
    Dump {
        /// 收到指定帧数后退出（默认一直运行，Ctrl-C 退出）
        #[arg(short, long)]
        count: Option<usize>,

        /// 只接收该 ID（标准帧）
        #[arg(long)]
        filter: Option<String>,

        #[command(flatten)]
        link: LinkArgs,
    },
}

impl CanCommand {
    pub fn execute(self, config: &CliConfig) -> Result<()> {
        let transport = CanTransport::new();
        match self {
            CanCommand::Up { interface } => {
                let interface = interface.unwrap_or_else(|| config.can.interface.clone());
                transport
                    .bring_up(&interface)
                    .with_context(|| format!("启动接口 '{}' 失败", interface))?;
                println!("✅ {} UP", interface);
                Ok(())
            },

            CanCommand::Down { interface } => {
                let interface = interface.unwrap_or_else(|| config.can.interface.clone());
                transport
                    .bring_down(&interface)
                    .with_context(|| format!("关闭接口 '{}' 失败", interface))?;
                println!("✅ {} DOWN", interface);
                Ok(())
            },

            CanCommand::Send {
                id,
                data,
                extended,
                rtr,
                link,
            } => {
                let mut flags = CanFlags::empty();
                flags.set(CanFlags::EXTENDED, extended);
                flags.set(CanFlags::REMOTE_REQUEST, rtr);
                send(transport, link.resolve(config.can.clone()), &id, &data, flags)
            },

            CanCommand::Dump {
                count,
                filter,
                link,
            } => {
                let mut can_config = link.resolve(config.can.clone());
                if let Some(filter) = filter {
                    let id = parse_can_id(&filter)?;
                    if id > commlink_sdk::can::CAN_SFF_MASK {
                        anyhow::bail!("过滤 ID 0x{:X} 超出标准帧范围", id);
                    }
                    can_config.filters = vec![CanFilter::exact_standard(id as u16)];
                }
                dump(transport, can_config, count)
            },
        }
    }
}

fn send(mut transport: CanTransport, config: CanConfig, id: &str, data: &str, flags: CanFlags) -> Result<()> {
    let id = parse_can_id(id)?;
    let payload = parse_hex_bytes(data)?;

    let handle = transport
        .open_with(&config)
        .with_context(|| format!("打开 CAN 接口 '{}' 失败", config.interface))?;

    let result = transport.write(handle, id, flags, &payload, config.write_timeout());
    transport.close(handle);

    match result {
        Ok(n) => {
            debug!("wrote {} bytes", n);
            println!("{}  {:>8X}   [{}]  {}", config.interface, id, payload.len(), format_hex(&payload));
            Ok(())
        },
        Err(LinkError::Timeout) => anyhow::bail!("发送超时（{} ms）", config.write_timeout_ms),
        Err(e) => Err(e).context("发送失败"),
    }
}

fn dump(mut transport: CanTransport, config: CanConfig, count: Option<usize>) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("设置 Ctrl-C 处理失败")?;

    let handle = transport
        .open_with(&config)
        .with_context(|| format!("打开 CAN 接口 '{}' 失败", config.interface))?;

    // 超时只用于周期性检查退出标志
    let poll_interval = config.read_timeout().min(Duration::from_millis(200));
    let mut received = 0usize;
    let mut result = Ok(());

    while running.load(Ordering::SeqCst) && count.is_none_or(|c| received < c) {
        match transport.read(handle, poll_interval) {
            Ok(frame) => {
                received += 1;
                let id = if frame.is_extended() {
                    format!("{:08X}", frame.id())
                } else {
                    format!("{:03X}", frame.id())
                };
                let rtr = if frame.is_remote() { "  remote request" } else { "" };
                println!(
                    "{}  {:>8}   [{}]  {}{}",
                    config.interface,
                    id,
                    frame.len(),
                    format_hex(frame.data()),
                    rtr
                );
            },
            Err(LinkError::Timeout) => continue,
            Err(e) => {
                result = Err(e).context("接收失败");
                break;
            },
        }
    }

    transport.close(handle);
    eprintln!("收到 {} 帧", received);
    result
}
