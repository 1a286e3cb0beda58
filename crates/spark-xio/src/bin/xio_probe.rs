//! 打印当前进程解析出的默认后端与主机标识串。
//!
//! 用法：`xio_probe [config.toml]`，`SPARK_XIO_BACKEND` 可覆盖配置中的后端。

use anyhow::Context;
use spark_xio::{
    PlatformConfig, XioConfig, default_descriptor, observability, platform_deinit, platform_info,
    platform_info_with_id, platform_init, registry,
};

fn main() -> anyhow::Result<()> {
    let config = match std::env::args_os().nth(1) {
        Some(path) => XioConfig::load(&path)
            .with_context(|| format!("loading {}", path.to_string_lossy()))?,
        None => XioConfig::default(),
    }
    .apply_env()
    .context("applying environment overrides")?;

    observability::install_subscriber(&config.logging.filter)?;

    platform_init(&PlatformConfig::from_config(&config)).context("platform_init")?;
    let selection = registry::default_selection()?;
    let descriptor = default_descriptor()?;
    println!("backend: {} ({})", descriptor.name(), selection.kind());

    let identity = if config.identity.include_device_id {
        platform_info_with_id()
    } else {
        platform_info()
    };
    println!(
        "platform: {}",
        identity.as_deref().unwrap_or("<unavailable>")
    );

    platform_deinit().context("platform_deinit")?;
    Ok(())
}
