//! # Commlink CLI
//!
//! CAN / 串口链路的命令行调试工具。
//!
//! ```bash
//! # 配置默认接口
//! commlink-cli config set can.interface vcan0
//! commlink-cli config set serial.path /dev/ttyUSB0
//!
//! # CAN
//! commlink-cli can up
//! commlink-cli can send 0x123 "01 02 03"
//! commlink-cli can dump --count 10
//!
//! # 串口
//! commlink-cli serial send --hex "AA 55"
//! commlink-cli serial read --max 64
//! ```
//!
//! 日志级别通过 `RUST_LOG` 控制，例如 `RUST_LOG=commlink_can=trace`。

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod utils;

use commands::ConfigCommand;
#[cfg(target_os = "linux")]
use commands::{CanCommand, SerialCommand, config::CliConfig};

/// Commlink CLI - CAN / 串口命令行工具
#[derive(Parser, Debug)]
#[command(name = "commlink-cli")]
#[command(about = "Command-line interface for CAN and serial links", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// CAN 接口与帧收发
    #[cfg(target_os = "linux")]
    #[command(subcommand)]
    Can(CanCommand),

    /// 串口收发
    #[cfg(target_os = "linux")]
    #[command(subcommand)]
    Serial(SerialCommand),
}

fn main() -> Result<()> {
    commlink_sdk::logging::init_with_default("commlink_cli=info,commlink_can=info,commlink_serial=info");

    let cli = Cli::parse();

    match cli.command {
        Commands::Config(cmd) => cmd.execute(),

        #[cfg(target_os = "linux")]
        Commands::Can(cmd) => cmd.execute(&CliConfig::load()?),

        #[cfg(target_os = "linux")]
        Commands::Serial(cmd) => cmd.execute(&CliConfig::load()?),
    }
}
