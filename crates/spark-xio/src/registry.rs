//! 后端描述符目录与默认后端选择。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 构建期通过 cargo feature 声明想要的安全传输后端，启动期再把描述符登记到对应槽位；
//!   二者共同决定进程的默认后端，上层代码只面对 [`BackendDescriptor`]；
//! - 选择结果在首次解析后冻结，之后每次 [`default_descriptor`] 都返回同一个描述符。
//!
//! ## 逻辑（How）
//! - 优先级固定为 OpenSSL > CycloneSSL > wolfSSL > Native：取第一个被 feature 选中的槽位；
//! - 该槽位必须已有描述符，否则报 [`XioError::BackendUnavailable`]，不会悄悄降级到低优先级槽位；
//! - 没有任何 feature 时，在具备原生后端的主机族（Windows / Unix）上回落到 Native 槽位，
//!   其余主机报 [`XioError::NoBackendConfigured`]。
//!
//! ## 风险与权衡（Trade-offs）
//! - 冻结使用 `OnceLock`，进程内不可撤销；`platform_deinit` 之后再次 `platform_init` 也必须
//!   解析出同一个后端，否则返回 [`XioError::SelectionConflict`]。

use std::{fmt, ptr, str::FromStr, sync::OnceLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::{Result, XioError},
    xio::IoInterface,
};

/// 后端描述符：进程内以 `'static` 引用共享。
pub type BackendDescriptor = &'static dyn IoInterface;

/// 当前主机族是否提供原生后端（无 feature 时的回落目标）。
pub const HOST_HAS_NATIVE_BACKEND: bool = cfg!(any(windows, unix));

/// 后端槽位。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    OpenSsl,
    CycloneSsl,
    WolfSsl,
    Native,
}

impl BackendKind {
    /// 解析顺序，靠前者优先。
    pub const PRIORITY: [BackendKind; 4] = [
        BackendKind::OpenSsl,
        BackendKind::CycloneSsl,
        BackendKind::WolfSsl,
        BackendKind::Native,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            BackendKind::OpenSsl => "openssl",
            BackendKind::CycloneSsl => "cyclonessl",
            BackendKind::WolfSsl => "wolfssl",
            BackendKind::Native => "native",
        }
    }

    const fn slot(self) -> usize {
        match self {
            BackendKind::OpenSsl => 0,
            BackendKind::CycloneSsl => 1,
            BackendKind::WolfSsl => 2,
            BackendKind::Native => 3,
        }
    }

    const fn bit(self) -> u8 {
        1 << self.slot()
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = XioError;

    fn from_str(raw: &str) -> Result<Self> {
        let wanted = raw.trim();
        BackendKind::PRIORITY
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| XioError::Config(format!("unknown backend `{wanted}`")))
    }
}

/// 构建期选中的后端集合。
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BackendFlags(u8);

impl BackendFlags {
    pub const EMPTY: Self = Self(0);

    pub const fn only(kind: BackendKind) -> Self {
        Self(kind.bit())
    }

    pub const fn with(self, kind: BackendKind) -> Self {
        Self(self.0 | kind.bit())
    }

    pub const fn contains(self, kind: BackendKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// 由 cargo feature 推导：`tls-openssl`、`tls-cyclonessl`、`tls-wolfssl`、`tls-native`。
    pub const fn from_build() -> Self {
        let mut flags = Self::EMPTY;
        if cfg!(feature = "tls-openssl") {
            flags = flags.with(BackendKind::OpenSsl);
        }
        if cfg!(feature = "tls-cyclonessl") {
            flags = flags.with(BackendKind::CycloneSsl);
        }
        if cfg!(feature = "tls-wolfssl") {
            flags = flags.with(BackendKind::WolfSsl);
        }
        if cfg!(feature = "tls-native") {
            flags = flags.with(BackendKind::Native);
        }
        flags
    }

    /// 按优先级顺序列出被选中的槽位。
    pub fn iter(self) -> impl Iterator<Item = BackendKind> {
        BackendKind::PRIORITY
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }
}

impl fmt::Debug for BackendFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<BackendKind> for BackendFlags {
    fn from_iter<I: IntoIterator<Item = BackendKind>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

/// 槽位到描述符的目录。
#[derive(Clone, Copy, Default)]
pub struct BackendCatalog {
    slots: [Option<BackendDescriptor>; 4],
}

impl BackendCatalog {
    pub const fn empty() -> Self {
        Self { slots: [None; 4] }
    }

    /// 内置后端：`tls-native` 启用时 Native 槽位由 rustls 承担。
    pub fn builtin() -> Self {
        #[cfg(feature = "tls-native")]
        {
            Self::empty().with_backend(BackendKind::Native, &crate::tlsio::rustls::RUSTLS)
        }
        #[cfg(not(feature = "tls-native"))]
        {
            Self::empty()
        }
    }

    /// 登记或替换某个槽位的描述符。
    pub fn with_backend(mut self, kind: BackendKind, descriptor: BackendDescriptor) -> Self {
        self.slots[kind.slot()] = Some(descriptor);
        self
    }

    pub fn get(&self, kind: BackendKind) -> Option<BackendDescriptor> {
        self.slots[kind.slot()]
    }

    /// 纯函数：给定 feature 集合解析默认后端，不产生任何副作用。
    pub fn resolve(&self, flags: BackendFlags) -> Result<BackendSelection> {
        let kind = match flags.iter().next() {
            Some(kind) => kind,
            None if HOST_HAS_NATIVE_BACKEND => BackendKind::Native,
            None => return Err(XioError::NoBackendConfigured),
        };
        let descriptor = self.get(kind).ok_or(XioError::BackendUnavailable(kind))?;
        debug!(kind = %kind, backend = descriptor.name(), ?flags, "backend resolved");
        Ok(BackendSelection { kind, descriptor })
    }
}

impl fmt::Debug for BackendCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                BackendKind::PRIORITY
                    .into_iter()
                    .filter_map(|kind| self.get(kind).map(|descriptor| (kind, descriptor.name()))),
            )
            .finish()
    }
}

/// 一次解析的结果：槽位与其描述符。
#[derive(Clone, Copy)]
pub struct BackendSelection {
    kind: BackendKind,
    descriptor: BackendDescriptor,
}

impl BackendSelection {
    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn descriptor(&self) -> BackendDescriptor {
        self.descriptor
    }

    /// 槽位相同且指向同一个描述符实例。
    pub fn same_as(&self, other: &BackendSelection) -> bool {
        self.kind == other.kind && ptr::addr_eq(self.descriptor, other.descriptor)
    }
}

impl fmt::Debug for BackendSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSelection")
            .field("kind", &self.kind)
            .field("backend", &self.descriptor.name())
            .finish()
    }
}

static FROZEN: OnceLock<BackendSelection> = OnceLock::new();

/// 进程默认后端的描述符。
///
/// 尚未冻结时按内置目录与构建 feature 解析并冻结；之后始终返回同一个引用。
pub fn default_descriptor() -> Result<BackendDescriptor> {
    default_selection().map(|selection| selection.descriptor())
}

/// 同 [`default_descriptor`]，额外给出槽位。
pub fn default_selection() -> Result<BackendSelection> {
    if let Some(selection) = FROZEN.get() {
        return Ok(*selection);
    }
    let selection = BackendCatalog::builtin().resolve(BackendFlags::from_build())?;
    freeze(selection)
}

/// 冻结选择；已冻结且与请求不同时报冲突。
pub(crate) fn freeze(selection: BackendSelection) -> Result<BackendSelection> {
    let mut installed = false;
    let frozen = *FROZEN.get_or_init(|| {
        installed = true;
        selection
    });
    if installed {
        info!(kind = %frozen.kind, backend = frozen.descriptor.name(), "default backend frozen");
    }
    if frozen.same_as(&selection) {
        Ok(frozen)
    } else {
        Err(XioError::SelectionConflict {
            frozen: frozen.kind,
            requested: selection.kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::xio::{SessionParams, TransportEngine};

    struct NamedBackend(&'static str);

    impl IoInterface for NamedBackend {
        fn name(&self) -> &'static str {
            self.0
        }

        fn create_engine(&self, _params: &SessionParams) -> Result<Arc<dyn TransportEngine>> {
            Err(XioError::InvalidArgument("test backend has no engine"))
        }
    }

    static OPENSSL: NamedBackend = NamedBackend("fake-openssl");
    static CYCLONE: NamedBackend = NamedBackend("fake-cyclone");
    static WOLF: NamedBackend = NamedBackend("fake-wolf");
    static NATIVE: NamedBackend = NamedBackend("fake-native");

    fn full_catalog() -> BackendCatalog {
        BackendCatalog::empty()
            .with_backend(BackendKind::OpenSsl, &OPENSSL)
            .with_backend(BackendKind::CycloneSsl, &CYCLONE)
            .with_backend(BackendKind::WolfSsl, &WOLF)
            .with_backend(BackendKind::Native, &NATIVE)
    }

    #[test]
    fn highest_priority_flag_wins_for_every_combination() {
        let catalog = full_catalog();
        for bits in 1u8..16 {
            let flags: BackendFlags = BackendKind::PRIORITY
                .into_iter()
                .filter(|kind| bits & kind.bit() != 0)
                .collect();
            let expected = BackendKind::PRIORITY
                .into_iter()
                .find(|kind| flags.contains(*kind))
                .expect("non-empty flags");
            let selection = catalog.resolve(flags).expect("every slot is registered");
            assert_eq!(selection.kind(), expected, "flags {flags:?}");
        }
    }

    #[test]
    fn openssl_and_native_resolves_to_openssl() {
        let flags = BackendFlags::only(BackendKind::Native).with(BackendKind::OpenSsl);
        let selection = full_catalog().resolve(flags).expect("resolvable");
        assert_eq!(selection.descriptor().name(), "fake-openssl");
    }

    #[test]
    fn selected_slot_without_descriptor_is_unavailable() {
        let catalog = BackendCatalog::empty().with_backend(BackendKind::Native, &NATIVE);
        let flags = BackendFlags::only(BackendKind::WolfSsl).with(BackendKind::Native);
        let error = catalog.resolve(flags).expect_err("wolfssl slot is empty");
        assert!(matches!(
            error,
            XioError::BackendUnavailable(BackendKind::WolfSsl)
        ));
    }

    #[test]
    fn empty_flags_fall_back_to_native_on_supported_hosts() {
        let result = full_catalog().resolve(BackendFlags::EMPTY);
        if HOST_HAS_NATIVE_BACKEND {
            assert_eq!(result.expect("native fallback").kind(), BackendKind::Native);
        } else {
            assert!(matches!(result, Err(XioError::NoBackendConfigured)));
        }
    }

    #[test]
    fn resolve_is_pure() {
        let catalog = full_catalog();
        let flags = BackendFlags::only(BackendKind::CycloneSsl);
        let first = catalog.resolve(flags).expect("resolvable");
        let second = catalog.resolve(flags).expect("resolvable");
        assert!(first.same_as(&second));
    }

    #[test]
    fn kind_names_parse_case_insensitively() {
        for kind in BackendKind::PRIORITY {
            assert_eq!(kind.name().to_uppercase().parse::<BackendKind>().ok(), Some(kind));
        }
        assert!(matches!(
            "schannel".parse::<BackendKind>(),
            Err(XioError::Config(_))
        ));
    }

    #[test]
    fn default_descriptor_is_stable() {
        let (Ok(first), Ok(second)) = (default_descriptor(), default_descriptor()) else {
            return;
        };
        assert!(ptr::addr_eq(first, second));
    }
}
