//! 会话选项：名称到取值的有序映射。
//!
//! 后端在 `set_option` 时校验名称与取值类型，校验通过的选项在下一次 open 时生效。

use std::collections::{BTreeMap, btree_map};

use serde::{Deserialize, Serialize};

/// 约定俗成的选项名称。
pub mod names {
    /// PEM 格式的受信任根证书集合。
    pub const TRUSTED_CERTS: &str = "TrustedCerts";
    /// PEM 格式的客户端证书链。
    pub const X509_CERTIFICATE: &str = "x509certificate";
    /// PEM 格式的客户端私钥。
    pub const X509_PRIVATE_KEY: &str = "x509privatekey";
    /// 覆盖用于 SNI 与证书校验的服务器名称。
    pub const TLS_SERVER_NAME: &str = "tls_server_name";
    /// loopback 后端：连接完成前的人为延迟（毫秒）。
    pub const LOOPBACK_CONNECT_DELAY_MS: &str = "loopback_connect_delay_ms";
    /// loopback 后端：为 `true` 时连接失败。
    pub const LOOPBACK_FAIL_CONNECT: &str = "loopback_fail_connect";
}

/// 单个选项的取值。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Integer(i64),
    Text(String),
    Bytes(Vec<u8>),
}

impl OptionValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            OptionValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            OptionValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            OptionValue::Bytes(value) => Some(value),
            OptionValue::Text(value) => Some(value.as_bytes()),
            _ => None,
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Integer(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Text(value.to_owned())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Text(value)
    }
}

impl From<Vec<u8>> for OptionValue {
    fn from(value: Vec<u8>) -> Self {
        OptionValue::Bytes(value)
    }
}

/// 一组已校验的会话选项，按名称有序存放。
///
/// `retrieve_options` 返回的就是它的快照，可以整体序列化后交给另一个会话复用。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionSet {
    entries: BTreeMap<String, OptionValue>,
}

impl OptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入选项，返回被覆盖的旧值。
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Option<OptionValue> {
        self.entries.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.entries.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<OptionValue> {
        self.entries.remove(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(OptionValue::as_text)
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(OptionValue::as_integer)
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(OptionValue::as_bool)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, OptionValue> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a OptionSet {
    type Item = (&'a String, &'a OptionValue);
    type IntoIter = btree_map::Iter<'a, String, OptionValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl<K: Into<String>, V: Into<OptionValue>> FromIterator<(K, V)> for OptionSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}
