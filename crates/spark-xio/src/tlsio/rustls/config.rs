//! 由会话选项构造 rustls 客户端配置。

use std::sync::Arc;

use rustls::{ClientConfig, RootCertStore, crypto::ring};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName, pem::PemObject};

use super::error::{CONFIGURE, map_rustls_error};
use crate::{
    error::{Result, XioError},
    options::{OptionSet, names},
};

pub(crate) fn parse_certificates(name: &str, pem: &str) -> Result<Vec<CertificateDer<'static>>> {
    let certificates = CertificateDer::pem_slice_iter(pem.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| XioError::invalid_option(name, err.to_string()))?;
    if certificates.is_empty() {
        return Err(XioError::invalid_option(name, "no certificate found in PEM"));
    }
    Ok(certificates)
}

pub(crate) fn parse_private_key(pem: &str) -> Result<PrivateKeyDer<'static>> {
    PrivateKeyDer::from_pem_slice(pem.as_bytes())
        .map_err(|err| XioError::invalid_option(names::X509_PRIVATE_KEY, err.to_string()))
}

pub(crate) fn parse_server_name(name: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(name.to_owned())
        .map_err(|err| XioError::invalid_option(names::TLS_SERVER_NAME, err.to_string()))
}

/// `TrustedCerts` 之外不加载任何系统根证书；未配置时握手会因证书不受信任而失败。
fn root_store(options: &OptionSet) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    if let Some(pem) = options.text(names::TRUSTED_CERTS) {
        for certificate in parse_certificates(names::TRUSTED_CERTS, pem)? {
            roots
                .add(certificate)
                .map_err(|err| XioError::invalid_option(names::TRUSTED_CERTS, err.to_string()))?;
        }
    }
    Ok(roots)
}

pub(crate) fn client_config(options: &OptionSet) -> Result<ClientConfig> {
    let builder = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|err| map_rustls_error(CONFIGURE, &err))?
        .with_root_certificates(root_store(options)?);

    match (
        options.text(names::X509_CERTIFICATE),
        options.text(names::X509_PRIVATE_KEY),
    ) {
        (Some(chain), Some(key)) => builder
            .with_client_auth_cert(
                parse_certificates(names::X509_CERTIFICATE, chain)?,
                parse_private_key(key)?,
            )
            .map_err(|err| map_rustls_error(CONFIGURE, &err)),
        (None, None) => Ok(builder.with_no_client_auth()),
        (Some(_), None) => Err(XioError::invalid_option(
            names::X509_PRIVATE_KEY,
            "required when x509certificate is set",
        )),
        (None, Some(_)) => Err(XioError::invalid_option(
            names::X509_CERTIFICATE,
            "required when x509privatekey is set",
        )),
    }
}

/// `tls_server_name` 优先，否则使用建链主机名。
pub(crate) fn server_name(options: &OptionSet, hostname: &str) -> Result<ServerName<'static>> {
    parse_server_name(options.text(names::TLS_SERVER_NAME).unwrap_or(hostname))
}
