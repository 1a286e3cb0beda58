//! 会话驱动任务：每次 open 派生一个，负责建链、串行执行命令与读取对端数据。

use std::sync::Arc;

use bytes::Bytes;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, WriteHalf},
    sync::mpsc,
};
use tracing::{debug, trace, warn};

use super::{
    OnBytesReceived, OnCloseComplete, OnIoError, OnSendComplete, OpenCallbacks, OpenResult,
    SendResult, SessionState, XioStream,
    session::{Command, Shared},
};
use crate::{
    error::{Result, XioError},
    future::BoxFuture,
};

const READ_CHUNK: usize = 16 * 1024;

pub(super) async fn drive(
    shared: Arc<Shared>,
    session: u64,
    mut connect: BoxFuture<'static, Result<XioStream>>,
    callbacks: OpenCallbacks,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let OpenCallbacks {
        on_open_complete,
        on_bytes_received,
        on_io_error,
    } = callbacks;

    // Opening：close 优先于建链结果，保证"建链完成前关闭"一定报告 Cancelled。
    let outcome = loop {
        tokio::select! {
            biased;
            command = commands.recv() => match command {
                Some(Command::Send { on_send_complete, .. }) => {
                    on_send_complete(SendResult::Cancelled);
                }
                Some(Command::Close { on_close_complete }) => {
                    debug!(session, "xio open cancelled by close");
                    on_open_complete(OpenResult::Cancelled);
                    complete_close(&shared, session, on_close_complete);
                    return;
                }
                None => {
                    trace!(session, "xio handle dropped while opening");
                    return;
                }
            },
            outcome = &mut connect => break outcome,
        }
    };

    match outcome {
        Ok(stream) if shared.transition(SessionState::Opening, SessionState::Open) => {
            debug!(session, "xio open complete");
            on_open_complete(OpenResult::Ok);
            run_open(&shared, session, stream, on_bytes_received, on_io_error, &mut commands).await;
        }
        Ok(_) => {
            // close 已经把状态推进到 Closing，但命令尚未被取出。
            on_open_complete(OpenResult::Cancelled);
            drain_until_close(&shared, session, &mut commands).await;
        }
        Err(error) => {
            let reported = if shared.transition(SessionState::Opening, SessionState::Error) {
                warn!(session, code = error.code(), %error, "xio open failed");
                OpenResult::Error(error)
            } else {
                OpenResult::Cancelled
            };
            on_open_complete(reported);
            drain_until_close(&shared, session, &mut commands).await;
        }
    }
}

/// 已出队、正在写出的一次发送。写半边随 future 移入，完成时连同结果一起交还。
struct InFlightWrite {
    write: BoxFuture<'static, (WriteHalf<XioStream>, Result<()>)>,
    on_send_complete: OnSendComplete,
}

impl InFlightWrite {
    fn start(mut writer: WriteHalf<XioStream>, payload: Bytes, on_send_complete: OnSendComplete) -> Self {
        Self {
            write: Box::pin(async move {
                let result = write_payload(&mut writer, &payload).await;
                (writer, result)
            }),
            on_send_complete,
        }
    }
}

/// 等待在途写完成；没有在途写时永不就绪。
async fn finish_write(in_flight: &mut Option<InFlightWrite>) -> (WriteHalf<XioStream>, Result<()>) {
    match in_flight {
        Some(pending) => (&mut pending.write).await,
        None => std::future::pending().await,
    }
}

/// Open 阶段：读取与写出并行推进，写出期间对端回灌的数据照常交付。
///
/// 同一时刻至多一次在途写；在途期间不再出队命令，队列本身保证发送与关闭的顺序。
async fn run_open(
    shared: &Shared,
    session: u64,
    stream: XioStream,
    mut on_bytes_received: OnBytesReceived,
    mut on_io_error: OnIoError,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) {
    let (mut reader, writer) = tokio::io::split(stream);
    let mut writer = Some(writer);
    let mut in_flight: Option<InFlightWrite> = None;
    let mut buffer = vec![0u8; READ_CHUNK];

    loop {
        tokio::select! {
            biased;
            (half, result) = finish_write(&mut in_flight) => {
                writer = Some(half);
                let Some(InFlightWrite { on_send_complete, .. }) = in_flight.take() else {
                    continue;
                };
                match result {
                    Ok(()) => on_send_complete(SendResult::Ok),
                    Err(error) => {
                        on_send_complete(SendResult::Error(error.clone()));
                        fail(shared, session, &mut on_io_error, error);
                        break;
                    }
                }
            }
            command = commands.recv(), if in_flight.is_none() => match command {
                Some(Command::Send { buffer: payload, on_send_complete }) => {
                    if shared.state() != SessionState::Open {
                        on_send_complete(SendResult::Cancelled);
                        continue;
                    }
                    match writer.take() {
                        Some(half) => {
                            trace!(session, len = payload.len(), "xio write started");
                            in_flight = Some(InFlightWrite::start(half, payload, on_send_complete));
                        }
                        None => on_send_complete(SendResult::Cancelled),
                    }
                }
                Some(Command::Close { on_close_complete }) => {
                    if let Some(half) = writer.as_mut()
                        && let Err(error) = half.shutdown().await
                    {
                        debug!(session, %error, "xio shutdown on close failed");
                    }
                    complete_close(shared, session, on_close_complete);
                    return;
                }
                None => {
                    trace!(session, "xio handle dropped while open");
                    return;
                }
            },
            read = reader.read(&mut buffer) => match read {
                Ok(0) => {
                    fail(shared, session, &mut on_io_error, XioError::PeerClosed);
                    break;
                }
                Ok(len) => on_bytes_received(&buffer[..len]),
                Err(error) => {
                    fail(shared, session, &mut on_io_error, XioError::io("xio receive", error));
                    break;
                }
            },
        }
    }

    // 会话已进入 Error（或正被关闭），未写完的发送按取消交付。
    if let Some(InFlightWrite { on_send_complete, .. }) = in_flight.take() {
        on_send_complete(SendResult::Cancelled);
    }
    drop((reader, writer));
    drain_until_close(shared, session, commands).await;
}

async fn write_payload(writer: &mut WriteHalf<XioStream>, payload: &[u8]) -> Result<()> {
    writer
        .write_all(payload)
        .await
        .map_err(|error| XioError::io("xio send", error))?;
    writer
        .flush()
        .await
        .map_err(|error| XioError::io("xio flush", error))
}

/// `Open -> Error`；若 close 已抢先推进状态则只记日志，不再上报。
fn fail(shared: &Shared, session: u64, on_io_error: &mut OnIoError, error: XioError) {
    if shared.transition(SessionState::Open, SessionState::Error) {
        warn!(session, code = error.code(), %error, "xio session failed");
        on_io_error(&error);
    } else {
        debug!(session, %error, "xio I/O ended during close");
    }
}

/// 连接已不可用时的排空阶段：发送一律取消，直到收到 close 或句柄被丢弃。
async fn drain_until_close(
    shared: &Shared,
    session: u64,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            Command::Send {
                on_send_complete, ..
            } => on_send_complete(SendResult::Cancelled),
            Command::Close { on_close_complete } => {
                complete_close(shared, session, on_close_complete);
                return;
            }
        }
    }
    trace!(session, "xio handle dropped");
}

fn complete_close(shared: &Shared, session: u64, on_close_complete: OnCloseComplete) {
    {
        let mut inner = shared.inner.lock();
        inner.state = SessionState::NotOpen;
        inner.commands = None;
    }
    debug!(session, "xio close complete");
    on_close_complete();
}
