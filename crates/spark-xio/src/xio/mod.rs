//! 统一异步 I/O 契约：后端描述符、会话状态与完成回调。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 每个安全传输后端只需提供"全局初始化 + 建链引擎"两类能力，会话状态机、命令排队与回调
//!   派发由 [`XioHandle`] 统一实现，避免每个后端各写一套容易出错的状态机；
//! - 上层持有 `&'static dyn IoInterface`（见 [`crate::registry::BackendDescriptor`]），
//!   编译期不依赖任何具体后端。
//!
//! ## 契约（What）
//! - 状态检查同步完成：非法调用立即返回 [`XioError::InvalidState`]，状态不变、回调不触发；
//! - 完成通知一律经回调交付，回调在驱动任务上执行，且执行期间不持有会话锁，回调内可以重入
//!   send/close；
//! - 同一会话的发送按提交顺序完成，关闭完成回调晚于此前所有已提交发送的完成回调。
//!
//! ## 风险与权衡（Trade-offs）
//! - 驱动任务依赖 Tokio 运行时；在运行时之外创建会话须通过 [`SessionParams::with_runtime`]
//!   显式提供句柄。

mod driver;
mod session;

use std::{fmt, sync::Arc};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    error::{Result, XioError},
    future::BoxFuture,
    options::{OptionSet, OptionValue},
};

pub use session::{DestroyRejected, SessionParams, XioHandle};

/// 会话生命周期状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    NotOpen,
    Opening,
    Open,
    Closing,
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// open 的最终结果。
#[derive(Clone, Debug)]
pub enum OpenResult {
    Ok,
    Error(XioError),
    /// 建链完成前会话被关闭。
    Cancelled,
}

impl OpenResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, OpenResult::Ok)
    }
}

/// 单次发送的最终结果。
#[derive(Clone, Debug)]
pub enum SendResult {
    Ok,
    Error(XioError),
    /// 会话在该发送被写出前进入了关闭或错误状态。
    Cancelled,
}

impl SendResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, SendResult::Ok)
    }
}

pub type OnOpenComplete = Box<dyn FnOnce(OpenResult) + Send + 'static>;
pub type OnBytesReceived = Box<dyn FnMut(&[u8]) + Send + 'static>;
pub type OnIoError = Box<dyn FnMut(&XioError) + Send + 'static>;
pub type OnSendComplete = Box<dyn FnOnce(SendResult) + Send + 'static>;
pub type OnCloseComplete = Box<dyn FnOnce() + Send + 'static>;

/// open 时一并注册的三个回调。
///
/// 调用方原先需要额外携带的上下文指针，在这里由闭包捕获。
pub struct OpenCallbacks {
    pub on_open_complete: OnOpenComplete,
    pub on_bytes_received: OnBytesReceived,
    pub on_io_error: OnIoError,
}

impl OpenCallbacks {
    pub fn new(
        on_open_complete: impl FnOnce(OpenResult) + Send + 'static,
        on_bytes_received: impl FnMut(&[u8]) + Send + 'static,
        on_io_error: impl FnMut(&XioError) + Send + 'static,
    ) -> Self {
        Self {
            on_open_complete: Box::new(on_open_complete),
            on_bytes_received: Box::new(on_bytes_received),
            on_io_error: Box::new(on_io_error),
        }
    }
}

impl fmt::Debug for OpenCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenCallbacks").finish_non_exhaustive()
    }
}

/// 后端建链后交回的双向字节流。
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub type XioStream = Box<dyn AsyncStream>;

/// 单个会话的后端引擎：负责选项校验与建链。
///
/// # 契约（What）
/// - `check_option` 只做校验，不保存状态；校验通过的选项由会话保存，并在 `connect` 时整体传入；
/// - `connect` 返回的 Future 必须是 `'static`，它会被移交给会话驱动任务执行。
pub trait TransportEngine: Send + Sync + 'static {
    fn check_option(&self, name: &str, value: &OptionValue) -> Result<()>;

    fn connect(&self, options: OptionSet) -> BoxFuture<'static, Result<XioStream>>;
}

/// 后端描述符：一组构成完整安全传输后端的操作。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 后端实现者只需提供 [`IoInterface::name`] 与 [`IoInterface::create_engine`]，
///   可选覆写 `global_init` / `global_deinit`；其余七个会话操作由默认实现委托给 [`XioHandle`]，
///   状态机语义在所有后端之间保持一致。
///
/// ## 契约（What）
/// - `global_init` 在 `platform_init` 中、网络协议栈启动之后调用，恰好一次；
/// - `global_deinit` 在 `platform_deinit` 中、网络协议栈关闭之前调用；
/// - 描述符以 `'static` 引用流通，不要求实现 `Clone`。
pub trait IoInterface: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn global_init(&self) -> Result<()> {
        Ok(())
    }

    fn global_deinit(&self) {}

    fn create_engine(&self, params: &SessionParams) -> Result<Arc<dyn TransportEngine>>;

    /// 创建 `NotOpen` 状态的会话；平台未就绪时返回 [`XioError::PlatformNotReady`]。
    fn create(&self, params: SessionParams) -> Result<XioHandle> {
        XioHandle::create(self, params)
    }

    /// 销毁会话；只允许在 `NotOpen` 状态进行，否则原样交还句柄。
    fn destroy(&self, handle: XioHandle) -> Result<(), DestroyRejected> {
        handle.destroy()
    }

    fn open(&self, handle: &XioHandle, callbacks: OpenCallbacks) -> Result<()> {
        handle.open(callbacks)
    }

    fn close(&self, handle: &XioHandle, on_close_complete: OnCloseComplete) -> Result<()> {
        handle.close(on_close_complete)
    }

    fn send(&self, handle: &XioHandle, buffer: Bytes, on_send_complete: OnSendComplete) -> Result<()> {
        handle.send(buffer, on_send_complete)
    }

    fn set_option(&self, handle: &XioHandle, name: &str, value: OptionValue) -> Result<()> {
        handle.set_option(name, value)
    }

    fn retrieve_options(&self, handle: &XioHandle) -> OptionSet {
        handle.retrieve_options()
    }
}

impl fmt::Debug for dyn IoInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IoInterface").field(&self.name()).finish()
    }
}
