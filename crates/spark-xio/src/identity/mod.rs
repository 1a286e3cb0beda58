//! 主机标识：处理器架构、操作系统版本与设备 ID。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 为遥测与 User-Agent 提供稳定格式的主机描述串：
//!   `(native; <产品标签> <主版本>.<次版本>; <架构>[; <设备 ID>])`；
//! - 每类信息都有多种取得途径，按可靠程度排成 [`LookupChain`]，前者失败才尝试后者。
//!
//! ## 契约（What）
//! - 版本信息全部查询失败时记录 `error` 日志并返回 `None`，不输出半截字符串；
//! - 设备 ID 取不到时，带 ID 的版本退化为与不带 ID 的版本完全相同；
//! - 设备 ID 去除首尾空白，空值或长度达到 [`DEVICE_ID_CAPACITY`] 字节视为无效。

mod arch;
mod lookup;
mod system;

use std::fmt::{self, Write as _};

use tracing::error;

use crate::error::{Result, XioError};

pub use arch::ProcessorArchitecture;
pub use lookup::{FnLookup, HostLookup, LookupChain, Memoized, from_fn, memoized};
pub use system::{
    CimOperatingSystemLookup, FileLookup, IoregPlatformUuidLookup, KernelReleaseLookup,
    RegistryValueLookup, RegistryView, UnameLookup, VerCommandLookup,
};

/// 设备 ID 的容量上限（含终止位），有效 ID 的长度必须严格小于它。
pub const DEVICE_ID_CAPACITY: usize = 255;

/// 操作系统产品标签。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ProductTag {
    /// 详细查询得到的 Windows 产品类型编号，渲染为 `WindowsProduct:0x%08x`。
    WindowsProduct(u32),
    /// 只拿到旧式版本字时使用，渲染为 `WindowsProduct:Windows NT`。
    WindowsNt,
    /// 非 Windows 主机使用内核名，如 `Linux`、`Darwin`。
    Kernel(String),
}

impl fmt::Display for ProductTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProductTag::WindowsProduct(product) => write!(f, "WindowsProduct:0x{product:08x}"),
            ProductTag::WindowsNt => f.write_str("WindowsProduct:Windows NT"),
            ProductTag::Kernel(name) => f.write_str(name),
        }
    }
}

/// 产品标签与主次版本号。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OsVersion {
    pub tag: ProductTag,
    pub major: u32,
    pub minor: u32,
}

impl OsVersion {
    pub fn windows(product_type: u32, major: u32, minor: u32) -> Self {
        Self {
            tag: ProductTag::WindowsProduct(product_type),
            major,
            minor,
        }
    }

    /// 旧式版本字：低位字的低字节为主版本，高字节为次版本。
    pub fn from_legacy_word(word: u32) -> Self {
        let low = word & 0xFFFF;
        Self {
            tag: ProductTag::WindowsNt,
            major: low & 0xFF,
            minor: (low >> 8) & 0xFF,
        }
    }

    pub fn kernel(name: impl Into<String>, major: u32, minor: u32) -> Self {
        Self {
            tag: ProductTag::Kernel(name.into()),
            major,
            minor,
        }
    }
}

/// 去除首尾空白并校验长度。
pub fn normalize_device_id(raw: impl AsRef<str>) -> Option<String> {
    let trimmed = raw.as_ref().trim();
    (!trimmed.is_empty() && trimmed.len() < DEVICE_ID_CAPACITY).then(|| trimmed.to_owned())
}

/// 按固定格式拼装主机描述串。
pub fn format_identity(
    version: &OsVersion,
    architecture: ProcessorArchitecture,
    device_id: Option<&str>,
) -> Result<String> {
    let mut rendered = String::with_capacity(64);
    write!(
        rendered,
        "(native; {} {}.{}; {}",
        version.tag, version.major, version.minor, architecture
    )
    .map_err(|err| XioError::Format(err.to_string()))?;
    if let Some(device_id) = device_id {
        write!(rendered, "; {device_id}").map_err(|err| XioError::Format(err.to_string()))?;
    }
    rendered.push(')');
    Ok(rendered)
}

/// 主机标识探测器：架构 + 版本回退链 + 设备 ID 回退链。
pub struct HostIdentityProbe {
    architecture: ProcessorArchitecture,
    versions: LookupChain<OsVersion>,
    device_ids: LookupChain<String>,
}

impl HostIdentityProbe {
    pub fn new(
        architecture: ProcessorArchitecture,
        versions: LookupChain<OsVersion>,
        device_ids: LookupChain<String>,
    ) -> Self {
        Self {
            architecture,
            versions,
            device_ids,
        }
    }

    /// 当前主机的默认探测策略。
    pub fn system() -> Self {
        Self::new(
            ProcessorArchitecture::detect(),
            system::version_chain(),
            system::device_id_chain(),
        )
    }

    pub fn architecture(&self) -> ProcessorArchitecture {
        self.architecture
    }

    pub fn os_version(&self) -> Option<OsVersion> {
        self.versions.resolve()
    }

    pub fn device_id(&self) -> Option<String> {
        self.device_ids.resolve_with(normalize_device_id)
    }

    pub fn platform_info(&self) -> Option<String> {
        self.render(None)
    }

    pub fn platform_info_with_id(&self) -> Option<String> {
        let device_id = self.device_id();
        self.render(device_id.as_deref())
    }

    fn render(&self, device_id: Option<&str>) -> Option<String> {
        let Some(version) = self.os_version() else {
            error!("every OS version lookup failed; host identity unavailable");
            return None;
        };
        match format_identity(&version, self.architecture, device_id) {
            Ok(rendered) => Some(rendered),
            Err(err) => {
                error!(code = err.code(), %err, "host identity formatting failed");
                None
            }
        }
    }
}

/// 当前主机的设备 ID。
pub fn device_id() -> Option<String> {
    HostIdentityProbe::system().device_id()
}

/// 当前主机的描述串（不含设备 ID）。
pub fn platform_info() -> Option<String> {
    HostIdentityProbe::system().platform_info()
}

/// 当前主机的描述串，能取到设备 ID 时追加在末尾。
pub fn platform_info_with_id() -> Option<String> {
    HostIdentityProbe::system().platform_info_with_id()
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;

    #[test]
    fn legacy_word_uses_low_word_bytes() {
        let version = OsVersion::from_legacy_word(0x1DB1_0106);
        assert_eq!((version.major, version.minor), (6, 1));
        assert_eq!(version.tag.to_string(), "WindowsProduct:Windows NT");
    }

    #[test]
    fn kernel_tag_renders_its_name() {
        let rendered = format_identity(
            &OsVersion::kernel("Linux", 6, 8),
            ProcessorArchitecture::Amd64,
            Some("0123abcd"),
        )
        .expect("format succeeds");
        assert_eq!(rendered, "(native; Linux 6.8; x64; 0123abcd)");
    }

    #[test]
    fn device_id_normalization_bounds() {
        assert_eq!(normalize_device_id("  id-1 \n").as_deref(), Some("id-1"));
        assert_eq!(normalize_device_id("   "), None);
        assert!(normalize_device_id("a".repeat(DEVICE_ID_CAPACITY - 1)).is_some());
        assert_eq!(normalize_device_id("a".repeat(DEVICE_ID_CAPACITY)), None);
    }

    #[test]
    #[traced_test]
    fn exhausted_version_chain_logs_and_yields_none() {
        let probe = HostIdentityProbe::new(
            ProcessorArchitecture::Intel,
            LookupChain::new().then(from_fn("nothing", || None::<OsVersion>)),
            LookupChain::new(),
        );
        assert_eq!(probe.platform_info(), None);
        assert_eq!(probe.platform_info_with_id(), None);
        assert!(logs_contain("every OS version lookup failed"));
    }
}
