use std::io;

use rustls::{AlertDescription, Error as RustlsError};

use crate::error::{TlsFailure, XioError};

/// rustls 后端的错误映射。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把 `rustls`/IO 层错误统一归入 [`TlsFailure`]，调用方据此区分"证书不受信任"与"链路抖动"，
///   无需解析底层库文案。
///
/// ## 逻辑（How）
/// - `OperationKind` 描述一类操作（建链、握手、配置）的默认文案；
/// - `map_handshake_error` 先尝试从 `io::Error` 中取出嵌套的 `rustls::Error`，取不到则按普通 I/O 错误处理；
/// - `categorize` 与 `alert_to_failure` 负责细分类别。
///
/// ## 风险与权衡（Trade-offs）
/// - `rustls::Error::General` 等泛型错误归为 `Other`，避免误判为安全事件；
/// - 未穷举的 Alert 同样归为 `Other`，需要更精确分类时在此集中扩展。
#[derive(Clone, Copy)]
pub(crate) struct OperationKind {
    pub message: &'static str,
}

pub(crate) const CONNECT: OperationKind = OperationKind {
    message: "tls tcp connect",
};

pub(crate) const HANDSHAKE: OperationKind = OperationKind {
    message: "tls handshake",
};

pub(crate) const CONFIGURE: OperationKind = OperationKind {
    message: "tls client config",
};

pub(crate) fn map_io_error(kind: OperationKind, error: io::Error) -> XioError {
    XioError::io(kind.message, error)
}

/// 握手阶段的 `io::Error` 可能包裹 `rustls::Error`，优先按 TLS 语义分类。
pub(crate) fn map_handshake_error(error: io::Error) -> XioError {
    if let Some(source) = error.get_ref()
        && let Some(rustls_error) = source.downcast_ref::<RustlsError>()
    {
        return map_rustls_error(HANDSHAKE, rustls_error);
    }
    map_io_error(HANDSHAKE, error)
}

pub(crate) fn map_rustls_error(kind: OperationKind, error: &RustlsError) -> XioError {
    XioError::Tls {
        operation: kind.message,
        failure: categorize(error),
        message: error.to_string(),
    }
}

fn categorize(error: &RustlsError) -> TlsFailure {
    use RustlsError::*;
    match error {
        InappropriateMessage { .. }
        | InappropriateHandshakeMessage { .. }
        | InvalidEncryptedClientHello(_)
        | InvalidMessage(_)
        | PeerMisbehaved(_)
        | DecryptError
        | EncryptError
        | PeerSentOversizedRecord => TlsFailure::Integrity,
        NoCertificatesPresented
        | InvalidCertificate(_)
        | InvalidCertRevocationList(_)
        | UnsupportedNameType => TlsFailure::Authentication,
        PeerIncompatible(_) | NoApplicationProtocol => TlsFailure::Incompatible,
        FailedToGetCurrentTime
        | FailedToGetRandomBytes
        | BadMaxFragmentSize
        | InconsistentKeys(_) => TlsFailure::Resource,
        AlertReceived(alert) => alert_to_failure(alert),
        _ => TlsFailure::Other,
    }
}

fn alert_to_failure(alert: &AlertDescription) -> TlsFailure {
    use AlertDescription::*;
    match alert {
        BadCertificate
        | UnsupportedCertificate
        | CertificateRevoked
        | CertificateExpired
        | CertificateUnknown
        | UnknownCA
        | NoCertificate
        | CertificateUnobtainable
        | CertificateRequired
        | AccessDenied => TlsFailure::Authentication,
        ProtocolVersion
        | InsufficientSecurity
        | HandshakeFailure
        | MissingExtension
        | UnsupportedExtension
        | NoApplicationProtocol
        | UnrecognisedName => TlsFailure::Incompatible,
        DecodeError
        | DecryptError
        | DecryptionFailed
        | IllegalParameter
        | RecordOverflow
        | BadRecordMac
        | UnexpectedMessage => TlsFailure::Integrity,
        _ => TlsFailure::Other,
    }
}
