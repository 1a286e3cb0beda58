use std::{borrow::Cow, fmt, io};

use thiserror::Error;

use crate::{registry::BackendKind, xio::SessionState};

/// 本 crate 的统一结果别名。
pub type Result<T, E = XioError> = core::result::Result<T, E>;

/// 错误的处置类别，供调用方决定重试、降级或直接放弃。
///
/// # 契约（What）
/// - `Fatal`：进程级前置条件不满足（协议栈、后端初始化、后端缺失），重试无意义；
/// - `Degraded`：可选能力缺失，主流程仍可继续；
/// - `Protocol`：调用方违反了生命周期或状态机约束；
/// - `Transient`：链路层面的瞬时故障，可在新会话中重试。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Fatal,
    Degraded,
    Protocol,
    Transient,
}

/// TLS 失败的细分类别，取自握手或记录层错误。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TlsFailure {
    /// 证书缺失、不受信任或已过期。
    Authentication,
    /// 报文被篡改、解密失败或对端违反协议。
    Integrity,
    /// 版本、套件或扩展协商不兼容。
    Incompatible,
    /// 本地资源（随机数、时钟、密钥一致性）不可用。
    Resource,
    Other,
}

impl fmt::Display for TlsFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TlsFailure::Authentication => "authentication",
            TlsFailure::Integrity => "integrity",
            TlsFailure::Incompatible => "incompatible",
            TlsFailure::Resource => "resource",
            TlsFailure::Other => "other",
        })
    }
}

/// spark-xio 全部失败路径的统一错误类型。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 平台引导、后端选择、会话状态机与后端 I/O 四类失败共用一个枚举，回调与同步返回值可以传递同一种错误；
/// - 每个变体都带稳定错误码（[`XioError::code`]），运维脚本无需解析人类可读文案。
///
/// ## 契约（What）
/// - 实现 `Clone`：同一个 I/O 错误既要交给发送完成回调，也要交给会话级错误回调；
/// - `Io` 只保留 [`io::ErrorKind`] 与渲染后的文案，不持有原始 `io::Error`（后者不可克隆）。
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum XioError {
    #[error("network stack startup failed: {message}")]
    NetworkStartup { message: String },
    #[error("backend `{backend}` global init failed: {message}")]
    BackendInit {
        backend: &'static str,
        message: String,
    },
    #[error("backend slot `{0}` is selected but no descriptor is registered")]
    BackendUnavailable(BackendKind),
    #[error("no secure-transport backend configured for this host")]
    NoBackendConfigured,
    #[error("default backend already frozen as `{frozen}`, refusing `{requested}`")]
    SelectionConflict {
        frozen: BackendKind,
        requested: BackendKind,
    },
    #[error("platform misuse: {0}")]
    PlatformMisuse(&'static str),
    #[error("platform is not initialized; call platform_init first")]
    PlatformNotReady,
    #[error("no tokio runtime available to drive the session")]
    NoRuntime,
    #[error("`{operation}` is not allowed while the session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("option `{name}` rejected: {reason}")]
    InvalidOption {
        name: String,
        reason: Cow<'static, str>,
    },
    #[error("{operation}: {message}")]
    Io {
        operation: &'static str,
        kind: io::ErrorKind,
        message: String,
    },
    #[error("{operation} ({failure}): {message}")]
    Tls {
        operation: &'static str,
        failure: TlsFailure,
        message: String,
    },
    #[error("peer closed the stream")]
    PeerClosed,
    #[error("session driver task is no longer running")]
    DriverStopped,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("formatting failed: {0}")]
    Format(String),
}

impl XioError {
    /// 把 `io::Error` 降为可克隆的 `Io` 变体。
    pub fn io(operation: &'static str, error: io::Error) -> Self {
        XioError::Io {
            operation,
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub fn invalid_option(name: impl Into<String>, reason: impl Into<Cow<'static, str>>) -> Self {
        XioError::InvalidOption {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_state(operation: &'static str, state: SessionState) -> Self {
        XioError::InvalidState { operation, state }
    }

    /// 稳定错误码，格式为 `spark.xio.<reason>`。
    pub fn code(&self) -> &'static str {
        match self {
            XioError::NetworkStartup { .. } => "spark.xio.network_startup_failed",
            XioError::BackendInit { .. } => "spark.xio.backend_init_failed",
            XioError::BackendUnavailable(_) => "spark.xio.backend_unavailable",
            XioError::NoBackendConfigured => "spark.xio.no_backend_configured",
            XioError::SelectionConflict { .. } => "spark.xio.selection_conflict",
            XioError::PlatformMisuse(_) => "spark.xio.platform_misuse",
            XioError::PlatformNotReady => "spark.xio.platform_not_ready",
            XioError::NoRuntime => "spark.xio.no_runtime",
            XioError::InvalidState { .. } => "spark.xio.invalid_state",
            XioError::InvalidArgument(_) => "spark.xio.invalid_argument",
            XioError::InvalidOption { .. } => "spark.xio.invalid_option",
            XioError::Io { .. } => "spark.xio.io_failed",
            XioError::Tls { .. } => "spark.xio.tls_failed",
            XioError::PeerClosed => "spark.xio.peer_closed",
            XioError::DriverStopped => "spark.xio.driver_stopped",
            XioError::Config(_) => "spark.xio.config_invalid",
            XioError::Format(_) => "spark.xio.format_failed",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            XioError::NetworkStartup { .. }
            | XioError::BackendInit { .. }
            | XioError::BackendUnavailable(_)
            | XioError::NoBackendConfigured
            | XioError::SelectionConflict { .. }
            | XioError::NoRuntime
            | XioError::Config(_) => ErrorClass::Fatal,
            XioError::Format(_) => ErrorClass::Degraded,
            XioError::PlatformMisuse(_)
            | XioError::PlatformNotReady
            | XioError::InvalidState { .. }
            | XioError::InvalidArgument(_)
            | XioError::InvalidOption { .. } => ErrorClass::Protocol,
            XioError::Tls {
                failure: TlsFailure::Authentication | TlsFailure::Integrity,
                ..
            } => ErrorClass::Fatal,
            XioError::Tls { .. }
            | XioError::Io { .. }
            | XioError::PeerClosed
            | XioError::DriverStopped => ErrorClass::Transient,
        }
    }
}
