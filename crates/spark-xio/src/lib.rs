#![doc = r#"
# spark-xio

## 设计动机（Why）
- **后端可插拔**：上层协议栈只面向一套统一的异步 I/O 契约编程，安全传输库（OpenSSL、CycloneSSL、wolfSSL 或平台原生实现）在构建期与启动期选定；
- **平台引导集中化**：网络协议栈启动、安全库全局初始化与对应的逆序清理集中在 [`platform`] 模块完成，调用方只需配对调用一次；
- **主机标识**：为遥测与 User-Agent 提供 `(native; <产品> <主>.<次>; <架构>[; <设备 ID>])` 形式的稳定描述串。

## 核心契约（What）
- [`xio::IoInterface`]：后端描述符，暴露 create/destroy/open/close/send/set_option/retrieve_options 七个操作；
- [`xio::XioHandle`]：单条传输会话，内部维护 `NotOpen → Opening → Open → Closing` 状态机，所有完成通知以回调交付；
- [`registry`]：按 OpenSSL > CycloneSSL > wolfSSL > Native 的优先级解析默认后端，并在首次解析后冻结；
- [`platform`]：`platform_init` / `platform_deinit` 生命周期与就绪态查询；
- [`identity`]：处理器架构、操作系统版本与设备 ID 的探测链。

## 实现策略（How）
- 会话驱动基于 Tokio：每次 open 派生一个驱动任务，命令经无界队列按提交顺序串行执行；
- 内置 `rustls` + `tokio-rustls` 承担 Native 槽位，`loopback` 后端用于无网络的契约验证；
- 错误统一收敛到 [`error::XioError`]，日志统一走 `tracing`。

## 风险与考量（Trade-offs）
- OpenSSL / CycloneSSL / wolfSSL 槽位只登记构建意图，必须由外部 crate 在 `platform_init` 前注册描述符，否则启动即报 `BackendUnavailable`；
- 默认后端一经冻结便不可在进程内切换，测试需要不同后端时应使用独立进程。
"#]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod future;
pub mod identity;
pub mod observability;
pub mod options;
pub mod platform;
pub mod registry;
pub mod tlsio;
pub mod xio;

pub use config::XioConfig;
pub use error::{ErrorClass, Result, XioError};
pub use identity::{HostIdentityProbe, device_id, platform_info, platform_info_with_id};
pub use options::{OptionSet, OptionValue};
pub use platform::{
    PlatformConfig, PlatformPhase, is_platform_ready, platform_deinit, platform_init,
    platform_phase,
};
pub use registry::{BackendCatalog, BackendDescriptor, BackendFlags, BackendKind, default_descriptor};
pub use xio::{
    IoInterface, OpenCallbacks, OpenResult, SendResult, SessionParams, SessionState, XioHandle,
};
