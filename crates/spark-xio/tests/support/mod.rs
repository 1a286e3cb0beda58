//! 集成测试共享的引导与等待工具。
#![allow(dead_code)]

use std::{future::Future, sync::Once, time::Duration};

use spark_xio::{PlatformConfig, platform_init};

/// 单个回调的最长等待时间，超时视为回调丢失。
pub const CALLBACK_DEADLINE: Duration = Duration::from_secs(5);

/// 每个测试二进制只初始化一次平台，之后不再 deinit。
pub fn ensure_platform() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        platform_init(&PlatformConfig::from_build()).expect("platform_init with build defaults");
    });
}

pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(CALLBACK_DEADLINE, future)
        .await
        .expect("callback did not arrive in time")
}
