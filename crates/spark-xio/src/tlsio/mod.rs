//! 内置后端描述符。
//!
//! - [`rustls`]：`tls-native` 启用时承担 Native 槽位，TCP + TLS 客户端；
//! - [`loopback`]：进程内回显后端，无网络依赖，用于契约测试与上层协议栈联调。

pub mod loopback;
#[cfg(feature = "tls-native")]
pub mod rustls;
