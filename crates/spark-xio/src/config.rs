//! 启动配置：TOML 文件 + 环境变量覆盖。
//!
//! ```toml
//! [platform]
//! backend = "native"      # openssl | cyclonessl | wolfssl | native，缺省按构建 feature 解析
//!
//! [identity]
//! include_device_id = true
//!
//! [logging]
//! filter = "info,spark_xio=debug"
//! ```

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{Result, XioError},
    registry::BackendKind,
};

/// 覆盖 `[platform] backend` 的环境变量。
pub const BACKEND_ENV: &str = "SPARK_XIO_BACKEND";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct XioConfig {
    pub platform: PlatformSection,
    pub identity: IdentitySection,
    pub logging: LoggingSection,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlatformSection {
    /// 强制使用的后端槽位；`None` 时按构建 feature 解析。
    pub backend: Option<BackendKind>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentitySection {
    pub include_device_id: bool,
}

impl Default for IdentitySection {
    fn default() -> Self {
        Self {
            include_device_id: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// `EnvFilter` 语法；`RUST_LOG` 存在时以其为准。
    pub filter: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
        }
    }
}

impl XioConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|err| XioError::Config(err.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|err| XioError::Config(format!("read {}: {err}", path.display())))?;
        debug!(path = %path.display(), "xio config loaded");
        Self::from_toml_str(&text)
    }

    /// 应用 [`BACKEND_ENV`]。
    pub fn apply_env(self) -> Result<Self> {
        let raw = std::env::var(BACKEND_ENV).ok();
        self.with_backend_override(raw.as_deref())
    }

    /// 空白或缺省的覆盖值不生效；无法识别的后端名报配置错误。
    pub fn with_backend_override(mut self, raw: Option<&str>) -> Result<Self> {
        if let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) {
            self.platform.backend = Some(raw.parse()?);
        }
        Ok(self)
    }
}
