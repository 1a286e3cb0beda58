//! 日志订阅器安装。
//!
//! 库代码只通过 `tracing` 宏产出事件，是否以及如何输出由进程入口决定；
//! [`install_subscriber`] 是给二进制入口与集成测试用的便捷安装器。

use tracing::dispatcher;
use tracing_subscriber::EnvFilter;

use crate::error::{Result, XioError};

/// 安装全局 `fmt` 订阅器。
///
/// # 契约（What）
/// - `RUST_LOG` 存在且合法时优先于 `default_filter`；
/// - 进程内已有全局订阅器时返回 [`XioError::Config`]，不覆盖外部配置。
pub fn install_subscriber(default_filter: &str) -> Result<()> {
    if dispatcher::has_been_set() {
        return Err(XioError::Config(
            "a global tracing subscriber is already installed".to_owned(),
        ));
    }

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)
            .map_err(|err| XioError::Config(format!("invalid log filter `{default_filter}`: {err}")))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|err| XioError::Config(err.to_string()))
}
