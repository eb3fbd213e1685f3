//! 日志初始化
//!
//! 库本身只通过 `tracing` 宏输出；应用（或测试）调用一次 [`init`] 安装
//! fmt subscriber，过滤规则取自 `RUST_LOG`，未设置时使用默认指令。

use tracing_subscriber::EnvFilter;

/// 默认过滤指令
pub const DEFAULT_DIRECTIVE: &str = "info";

/// 安装全局 subscriber（`RUST_LOG` 优先，否则为 `info`）
///
/// 已经安装过时什么都不做，返回 `false`。
pub fn init() -> bool {
    init_with_default(DEFAULT_DIRECTIVE)
}

/// 以 `directive`（例如 `"commlink_can=trace"`）作为 `RUST_LOG` 缺省值安装 subscriber
pub fn init_with_default(directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    tracing_subscriber::fmt().with_env_filter(filter).try_init().is_ok()
}
