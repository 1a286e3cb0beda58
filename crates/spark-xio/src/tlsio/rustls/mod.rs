//! 基于 `rustls` + `tokio-rustls` 的 TLS 客户端后端，承担 Native 槽位。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 纯 Rust 实现，无需链接系统安全库即可在 Windows / Linux / macOS 上提供一致的 TLS 客户端；
//! - 密码学提供者统一使用 `ring`，与 `tokio-rustls` 的特性开关保持一致。
//!
//! ## 逻辑（How）
//! - `global_init` 安装进程级默认 `CryptoProvider`；已被其他组件安装时沿用现有提供者；
//! - 每次建链按当时的选项快照构造 [`rustls::ClientConfig`]：`TrustedCerts` 提供根证书，
//!   `x509certificate` / `x509privatekey` 成对提供客户端身份，`tls_server_name` 覆盖 SNI；
//! - 建链顺序为 TCP connect → TLS 握手，两步的失败分别映射为 `Io` 与 `Tls` 错误。
//!
//! ## 契约（What）
//! - 选项在 `set_option` 时即完成 PEM 与名称校验，错误以 [`XioError::InvalidOption`] 同步返回；
//! - 不加载系统根证书。

mod config;
mod error;

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

use crate::{
    error::{Result, XioError},
    future::BoxFuture,
    options::{OptionSet, OptionValue, names},
    xio::{IoInterface, SessionParams, TransportEngine, XioStream},
};

/// rustls 后端描述符。
#[derive(Debug, Default)]
pub struct RustlsIo;

/// 进程内唯一实例。
pub static RUSTLS: RustlsIo = RustlsIo;

impl IoInterface for RustlsIo {
    fn name(&self) -> &'static str {
        "rustls"
    }

    fn global_init(&self) -> Result<()> {
        match rustls::crypto::ring::default_provider().install_default() {
            Ok(()) => info!("rustls ring crypto provider installed"),
            Err(_) => debug!("process-level crypto provider already installed, keeping it"),
        }
        Ok(())
    }

    fn global_deinit(&self) {
        // 进程级 CryptoProvider 无法卸载，保留到进程退出。
        debug!("rustls backend released");
    }

    fn create_engine(&self, params: &SessionParams) -> Result<Arc<dyn TransportEngine>> {
        if params.hostname.trim().is_empty() {
            return Err(XioError::InvalidArgument("hostname must not be empty"));
        }
        Ok(Arc::new(RustlsEngine {
            hostname: params.hostname.clone(),
            port: params.port,
        }))
    }
}

struct RustlsEngine {
    hostname: String,
    port: u16,
}

fn expect_text<'a>(name: &str, value: &'a OptionValue) -> Result<&'a str> {
    value
        .as_text()
        .ok_or_else(|| XioError::invalid_option(name, "expects PEM text"))
}

impl TransportEngine for RustlsEngine {
    fn check_option(&self, name: &str, value: &OptionValue) -> Result<()> {
        match name {
            names::TRUSTED_CERTS | names::X509_CERTIFICATE => {
                config::parse_certificates(name, expect_text(name, value)?).map(drop)
            }
            names::X509_PRIVATE_KEY => {
                config::parse_private_key(expect_text(name, value)?).map(drop)
            }
            names::TLS_SERVER_NAME => {
                config::parse_server_name(expect_text(name, value)?).map(drop)
            }
            _ => Err(XioError::invalid_option(name, "not supported by the rustls backend")),
        }
    }

    fn connect(&self, options: OptionSet) -> BoxFuture<'static, Result<XioStream>> {
        let hostname = self.hostname.clone();
        let port = self.port;
        Box::pin(async move {
            let client_config = config::client_config(&options)?;
            let server_name = config::server_name(&options, &hostname)?;

            let tcp = TcpStream::connect((hostname.as_str(), port))
                .await
                .map_err(|err| error::map_io_error(error::CONNECT, err))?;
            if let Err(err) = tcp.set_nodelay(true) {
                debug!(%err, "TCP_NODELAY unavailable");
            }

            let stream = TlsConnector::from(Arc::new(client_config))
                .connect(server_name, tcp)
                .await
                .map_err(error::map_handshake_error)?;
            let (_, session) = stream.get_ref();
            debug!(
                host = %hostname,
                port,
                version = ?session.protocol_version(),
                "tls handshake complete"
            );
            Ok(Box::new(stream) as XioStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_hostname_is_rejected() {
        let params = SessionParams::new("  ", 443);
        assert!(matches!(
            RUSTLS.create_engine(&params),
            Err(XioError::InvalidArgument(_))
        ));
    }

    #[test]
    fn options_are_validated_eagerly() {
        let engine = RUSTLS
            .create_engine(&SessionParams::new("example.com", 443))
            .expect("engine");
        assert!(engine
            .check_option(names::TLS_SERVER_NAME, &OptionValue::from("example.com"))
            .is_ok());
        assert!(engine
            .check_option(names::TRUSTED_CERTS, &OptionValue::from("garbage"))
            .is_err());
        assert!(engine
            .check_option(names::TRUSTED_CERTS, &OptionValue::Bool(true))
            .is_err());
        assert!(engine
            .check_option(names::LOOPBACK_FAIL_CONNECT, &OptionValue::Bool(true))
            .is_err());
    }

    #[test]
    fn global_init_tolerates_existing_provider() {
        assert!(RUSTLS.global_init().is_ok());
        assert!(RUSTLS.global_init().is_ok());
    }
}
