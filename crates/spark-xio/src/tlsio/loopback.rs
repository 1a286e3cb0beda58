//! 进程内回显后端。
//!
//! 建链得到一条 `tokio::io::duplex` 管道，对端由后台任务把收到的字节原样写回。
//! 两个选项用于编排建链时序：
//! - `loopback_connect_delay_ms`：建链前等待的毫秒数；
//! - `loopback_fail_connect`：为 `true` 时建链以 `ConnectionRefused` 失败。

use std::{io, sync::Arc, time::Duration};

use tokio::io::DuplexStream;
use tracing::trace;

use crate::{
    error::{Result, XioError},
    future::BoxFuture,
    options::{OptionSet, OptionValue, names},
    xio::{IoInterface, SessionParams, TransportEngine, XioStream},
};

const PIPE_CAPACITY: usize = 64 * 1024;

/// 回显后端描述符。
#[derive(Debug, Default)]
pub struct LoopbackIo;

/// 进程内唯一实例，可直接作为 [`crate::registry::BackendDescriptor`] 使用。
pub static LOOPBACK: LoopbackIo = LoopbackIo;

impl IoInterface for LoopbackIo {
    fn name(&self) -> &'static str {
        "loopback"
    }

    fn create_engine(&self, params: &SessionParams) -> Result<Arc<dyn TransportEngine>> {
        Ok(Arc::new(LoopbackEngine {
            endpoint: format!("{}:{}", params.hostname, params.port),
        }))
    }
}

struct LoopbackEngine {
    endpoint: String,
}

impl TransportEngine for LoopbackEngine {
    fn check_option(&self, name: &str, value: &OptionValue) -> Result<()> {
        match name {
            names::LOOPBACK_CONNECT_DELAY_MS => match value.as_integer() {
                Some(delay) if delay >= 0 => Ok(()),
                _ => Err(XioError::invalid_option(name, "expects a non-negative integer")),
            },
            names::LOOPBACK_FAIL_CONNECT => match value {
                OptionValue::Bool(_) => Ok(()),
                _ => Err(XioError::invalid_option(name, "expects a boolean")),
            },
            _ => Err(XioError::invalid_option(name, "not supported by the loopback backend")),
        }
    }

    fn connect(&self, options: OptionSet) -> BoxFuture<'static, Result<XioStream>> {
        let endpoint = self.endpoint.clone();
        Box::pin(async move {
            let delay = options
                .integer(names::LOOPBACK_CONNECT_DELAY_MS)
                .and_then(|delay| u64::try_from(delay).ok())
                .unwrap_or(0);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            if options.flag(names::LOOPBACK_FAIL_CONNECT).unwrap_or(false) {
                return Err(XioError::io(
                    "loopback connect",
                    io::Error::new(
                        io::ErrorKind::ConnectionRefused,
                        format!("{endpoint} refused by loopback_fail_connect"),
                    ),
                ));
            }

            let (local, peer) = tokio::io::duplex(PIPE_CAPACITY);
            tokio::spawn(echo(peer, endpoint));
            Ok(Box::new(local) as XioStream)
        })
    }
}

async fn echo(peer: DuplexStream, endpoint: String) {
    let (mut reader, mut writer) = tokio::io::split(peer);
    match tokio::io::copy(&mut reader, &mut writer).await {
        Ok(bytes) => trace!(%endpoint, bytes, "loopback echo finished"),
        Err(err) => trace!(%endpoint, %err, "loopback echo aborted"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> LoopbackEngine {
        LoopbackEngine {
            endpoint: "loopback:0".to_owned(),
        }
    }

    #[test]
    fn option_types_are_checked() {
        let engine = engine();
        assert!(engine
            .check_option(names::LOOPBACK_CONNECT_DELAY_MS, &OptionValue::Integer(5))
            .is_ok());
        assert!(engine
            .check_option(names::LOOPBACK_CONNECT_DELAY_MS, &OptionValue::Integer(-1))
            .is_err());
        assert!(engine
            .check_option(names::LOOPBACK_FAIL_CONNECT, &OptionValue::from("yes"))
            .is_err());
        assert!(matches!(
            engine.check_option(names::TRUSTED_CERTS, &OptionValue::from("pem")),
            Err(XioError::InvalidOption { .. })
        ));
    }

    #[tokio::test]
    async fn connect_echoes_bytes() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut stream = engine().connect(OptionSet::new()).await.expect("connects");
        stream.write_all(b"echo").await.expect("write");
        let mut buffer = [0u8; 4];
        stream.read_exact(&mut buffer).await.expect("read echo");
        assert_eq!(&buffer, b"echo");
    }

    #[tokio::test]
    async fn fail_option_refuses_connection() {
        let options: OptionSet = [(names::LOOPBACK_FAIL_CONNECT, true)].into_iter().collect();
        let error = match engine().connect(options).await {
            Ok(_) => panic!("connect should fail"),
            Err(error) => error,
        };
        assert!(matches!(
            error,
            XioError::Io {
                kind: io::ErrorKind::ConnectionRefused,
                ..
            }
        ));
    }
}
