use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use bytes::Bytes;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::{runtime::Handle, sync::mpsc};
use tracing::{debug, trace, warn};

use super::{
    IoInterface, OnCloseComplete, OnSendComplete, OpenCallbacks, SendResult, SessionState,
    TransportEngine, driver,
};
use crate::{
    error::{Result, XioError},
    options::{OptionSet, OptionValue},
    platform,
};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// 创建会话所需的参数。
#[derive(Clone, Debug)]
pub struct SessionParams {
    pub hostname: String,
    pub port: u16,
    /// 创建时即生效的初始选项，逐项经过后端校验。
    pub options: OptionSet,
    /// 驱动任务所在的运行时；缺省时取调用方当前所处的 Tokio 运行时。
    pub runtime: Option<Handle>,
}

impl SessionParams {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            options: OptionSet::new(),
            runtime: None,
        }
    }

    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.options.insert(name, value);
        self
    }

    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }
}

pub(super) enum Command {
    Send {
        buffer: Bytes,
        on_send_complete: OnSendComplete,
    },
    Close {
        on_close_complete: OnCloseComplete,
    },
}

pub(super) struct Inner {
    pub(super) state: SessionState,
    /// 当前驱动任务的命令入口；`None` 表示没有存活的驱动任务或已提交关闭。
    pub(super) commands: Option<mpsc::UnboundedSender<Command>>,
    options: OptionSet,
}

/// 会话句柄与驱动任务共享的状态。
pub(super) struct Shared {
    pub(super) inner: Mutex<Inner>,
}

impl Shared {
    pub(super) fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// 仅当当前状态为 `from` 时切换到 `to`，返回是否切换成功。
    pub(super) fn transition(&self, from: SessionState, to: SessionState) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == from {
            inner.state = to;
            true
        } else {
            false
        }
    }
}

/// 一条传输会话。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把"状态检查同步、I/O 完成异步"的契约落在一个类型里：open/send/close 在调用线程上
///   检查并推进状态，真正的建链与读写交给每次 open 派生出的驱动任务；
///
/// ## 逻辑（How）
/// - 状态与命令入口放在 `Arc<Mutex<Inner>>` 中，由句柄与驱动任务共享；
/// - send/close 经无界队列投递给驱动任务，驱动任务串行处理，天然保证发送完成顺序与
///   "关闭完成晚于已提交发送"；
/// - 句柄被丢弃时摘掉命令入口，驱动任务随之退出并释放底层连接。
///
/// ## 契约（What）
/// - 合法迁移：`NotOpen -open-> Opening`、`Opening -建链成功-> Open`、`Opening -建链失败-> Error`、
///   `Opening|Open|Error -close-> Closing -> NotOpen`、`Open -I/O 失败-> Error`；
/// - `destroy` 只在 `NotOpen` 合法，其余状态下原样交还句柄。
pub struct XioHandle {
    id: u64,
    backend: &'static str,
    shared: Arc<Shared>,
    engine: Arc<dyn TransportEngine>,
    runtime: Handle,
}

impl XioHandle {
    pub(super) fn create<I>(interface: &I, params: SessionParams) -> Result<Self>
    where
        I: IoInterface + ?Sized,
    {
        platform::ensure_ready()?;
        let runtime = match params.runtime.clone() {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| XioError::NoRuntime)?,
        };
        let engine = interface.create_engine(&params)?;
        for (name, value) in &params.options {
            engine.check_option(name, value)?;
        }

        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        debug!(
            session = id,
            backend = interface.name(),
            host = %params.hostname,
            port = params.port,
            "xio session created"
        );
        Ok(Self {
            id,
            backend: interface.name(),
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: SessionState::NotOpen,
                    commands: None,
                    options: params.options,
                }),
            }),
            engine,
            runtime,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// 发起建链。成功受理后状态为 `Opening`，结果经 `on_open_complete` 交付。
    pub fn open(&self, callbacks: OpenCallbacks) -> Result<()> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let options = {
            let mut inner = self.shared.inner.lock();
            if inner.state != SessionState::NotOpen {
                return Err(XioError::invalid_state("open", inner.state));
            }
            inner.state = SessionState::Opening;
            inner.commands = Some(sender);
            inner.options.clone()
        };

        debug!(session = self.id, backend = self.backend, "xio open requested");
        let connect = self.engine.connect(options);
        self.runtime.spawn(driver::drive(
            Arc::clone(&self.shared),
            self.id,
            connect,
            callbacks,
            receiver,
        ));
        Ok(())
    }

    /// 排队发送一段字节。只有 `Open` 状态受理，空缓冲区直接拒绝。
    pub fn send(
        &self,
        buffer: impl Into<Bytes>,
        on_send_complete: impl FnOnce(SendResult) + Send + 'static,
    ) -> Result<()> {
        let buffer = buffer.into();
        if buffer.is_empty() {
            return Err(XioError::InvalidArgument("send buffer must not be empty"));
        }
        let mut inner = self.shared.inner.lock();
        if inner.state != SessionState::Open {
            return Err(XioError::invalid_state("send", inner.state));
        }
        let Some(commands) = inner.commands.as_ref() else {
            return Err(XioError::invalid_state("send", inner.state));
        };
        let len = buffer.len();
        let queued = commands.send(Command::Send {
            buffer,
            on_send_complete: Box::new(on_send_complete),
        });
        if queued.is_ok() {
            trace!(session = self.id, len, "xio send queued");
            return Ok(());
        }

        // 驱动任务已退出：会话转入 Error 并摘掉命令入口，之后的 close 就地完成。
        inner.state = SessionState::Error;
        inner.commands = None;
        drop(inner);
        warn!(session = self.id, "xio driver gone, session moved to Error");
        Err(XioError::DriverStopped)
    }

    /// 发起关闭。`Opening`、`Open`、`Error` 状态下受理，状态立即变为 `Closing`。
    pub fn close(&self, on_close_complete: impl FnOnce() + Send + 'static) -> Result<()> {
        let on_close_complete: OnCloseComplete = Box::new(on_close_complete);
        let orphaned = {
            let mut inner = self.shared.inner.lock();
            match inner.state {
                SessionState::Opening | SessionState::Open | SessionState::Error => {}
                state => return Err(XioError::invalid_state("close", state)),
            }
            inner.state = SessionState::Closing;
            match inner.commands.take() {
                Some(commands) => match commands.send(Command::Close { on_close_complete }) {
                    Ok(()) => None,
                    Err(mpsc::error::SendError(command)) => Some(command),
                },
                None => Some(Command::Close { on_close_complete }),
            }
        };

        debug!(session = self.id, "xio close requested");
        // 驱动任务已不在（例如回调 panic 导致任务终止），就地完成关闭。
        if let Some(Command::Close { on_close_complete }) = orphaned {
            warn!(session = self.id, "xio driver gone, completing close inline");
            self.shared.inner.lock().state = SessionState::NotOpen;
            on_close_complete();
        }
        Ok(())
    }

    /// 校验并保存选项；任何状态下都可调用，下一次 open 生效。
    pub fn set_option(&self, name: &str, value: OptionValue) -> Result<()> {
        self.engine.check_option(name, &value)?;
        trace!(session = self.id, option = name, "xio option stored");
        self.shared.inner.lock().options.insert(name, value);
        Ok(())
    }

    pub fn retrieve_options(&self) -> OptionSet {
        self.shared.inner.lock().options.clone()
    }

    /// 释放会话。仅 `NotOpen` 状态合法。
    pub fn destroy(self) -> Result<(), DestroyRejected> {
        let state = self.state();
        if state != SessionState::NotOpen {
            return Err(DestroyRejected {
                error: XioError::invalid_state("destroy", state),
                handle: self,
            });
        }
        debug!(session = self.id, "xio session destroyed");
        Ok(())
    }
}

impl Drop for XioHandle {
    fn drop(&mut self) {
        // 摘掉命令入口后驱动任务会在下一次轮询队列时退出。
        self.shared.inner.lock().commands = None;
    }
}

impl fmt::Debug for XioHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XioHandle")
            .field("id", &self.id)
            .field("backend", &self.backend)
            .field("state", &self.state())
            .finish()
    }
}

/// `destroy` 被拒绝时交还的句柄。
#[derive(Debug, Error)]
#[error("{error}")]
pub struct DestroyRejected {
    pub handle: XioHandle,
    #[source]
    pub error: XioError,
}
