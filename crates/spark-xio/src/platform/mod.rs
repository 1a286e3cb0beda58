//! 平台引导：网络协议栈与默认后端的进程级初始化和清理。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 建立任何会话之前，协议栈与安全库都需要一次进程级初始化；集中在
//!   [`platform_init`] / [`platform_deinit`] 中完成，配对调用即可；
//! - 生命周期误用（重复 init、未 init 即 deinit）被检测并以 [`XioError::PlatformMisuse`]
//!   报告，而不是留下未定义行为。
//!
//! ## 逻辑（How）
//! - init：检查阶段 → 解析并冻结默认后端 → 启动协议栈 → 后端全局初始化（失败则回滚协议栈）→ `Ready`；
//! - deinit：`ShuttingDown` → 后端全局清理 → 关闭协议栈 → `Uninitialized`，严格逆序；
//! - 阶段保存在原子变量里，就绪查询无锁；init/deinit 本身由互斥锁串行化。
//!
//! ## 契约（What）
//! - 协议栈启动失败时不触碰后端；后端初始化失败时协议栈已被关闭；
//! - 仅 `Ready` 阶段可以创建会话。

mod network;

use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};

use parking_lot::Mutex;
use tracing::{error, info};

use crate::{
    config::XioConfig,
    error::{Result, XioError},
    registry::{self, BackendCatalog, BackendDescriptor, BackendFlags, BackendKind, BackendSelection},
};

pub use network::{NetworkStack, SystemNetworkStack};

/// 进程级平台阶段。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlatformPhase {
    Uninitialized,
    Ready,
    ShuttingDown,
}

impl PlatformPhase {
    const fn to_raw(self) -> u8 {
        match self {
            PlatformPhase::Uninitialized => 0,
            PlatformPhase::Ready => 1,
            PlatformPhase::ShuttingDown => 2,
        }
    }

    const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => PlatformPhase::Ready,
            2 => PlatformPhase::ShuttingDown,
            _ => PlatformPhase::Uninitialized,
        }
    }
}

/// `platform_init` 的输入：协议栈、后端目录与构建 feature。
#[derive(Clone)]
pub struct PlatformConfig {
    network: Arc<dyn NetworkStack>,
    catalog: BackendCatalog,
    flags: BackendFlags,
}

impl PlatformConfig {
    /// 系统协议栈 + 内置后端目录 + 编译期 feature。
    pub fn from_build() -> Self {
        Self {
            network: Arc::new(SystemNetworkStack),
            catalog: BackendCatalog::builtin(),
            flags: BackendFlags::from_build(),
        }
    }

    /// 在 [`PlatformConfig::from_build`] 基础上应用配置文件中的后端覆盖。
    pub fn from_config(config: &XioConfig) -> Self {
        let base = Self::from_build();
        match config.platform.backend {
            Some(kind) => base.with_flags(BackendFlags::only(kind)),
            None => base,
        }
    }

    pub fn with_network_stack(mut self, network: Arc<dyn NetworkStack>) -> Self {
        self.network = network;
        self
    }

    pub fn with_backend(mut self, kind: BackendKind, descriptor: BackendDescriptor) -> Self {
        self.catalog = self.catalog.with_backend(kind, descriptor);
        self
    }

    pub fn with_flags(mut self, flags: BackendFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn catalog(&self) -> &BackendCatalog {
        &self.catalog
    }

    pub fn flags(&self) -> BackendFlags {
        self.flags
    }

    pub fn resolve(&self) -> Result<BackendSelection> {
        self.catalog.resolve(self.flags)
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self::from_build()
    }
}

impl std::fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("network", &self.network.name())
            .field("catalog", &self.catalog)
            .field("flags", &self.flags)
            .finish()
    }
}

struct ActivePlatform {
    network: Arc<dyn NetworkStack>,
    selection: BackendSelection,
}

/// 引导状态机本体；全局实例见 [`BOOTSTRAP`]，测试可以构造独立实例。
pub(crate) struct Bootstrap {
    phase: AtomicU8,
    active: Mutex<Option<ActivePlatform>>,
}

impl Bootstrap {
    pub(crate) const fn new() -> Self {
        Self {
            phase: AtomicU8::new(PlatformPhase::Uninitialized.to_raw()),
            active: parking_lot::const_mutex(None),
        }
    }

    pub(crate) fn phase(&self) -> PlatformPhase {
        PlatformPhase::from_raw(self.phase.load(Ordering::Acquire))
    }

    fn set_phase(&self, phase: PlatformPhase) {
        self.phase.store(phase.to_raw(), Ordering::Release);
    }

    pub(crate) fn init(&self, network: Arc<dyn NetworkStack>, selection: BackendSelection) -> Result<()> {
        let mut active = self.active.lock();
        if self.phase() != PlatformPhase::Uninitialized || active.is_some() {
            return Err(XioError::PlatformMisuse(
                "platform_init called again without platform_deinit",
            ));
        }

        if let Err(err) = network.startup() {
            error!(network = network.name(), code = err.code(), %err, "network stack startup failed");
            return Err(err);
        }

        let backend = selection.descriptor();
        if let Err(err) = backend.global_init() {
            error!(backend = backend.name(), code = err.code(), %err, "backend global init failed");
            network.shutdown();
            return Err(err);
        }

        info!(
            network = network.name(),
            backend = backend.name(),
            kind = %selection.kind(),
            "platform initialized"
        );
        *active = Some(ActivePlatform { network, selection });
        self.set_phase(PlatformPhase::Ready);
        Ok(())
    }

    pub(crate) fn deinit(&self) -> Result<()> {
        let mut active = self.active.lock();
        let Some(platform) = active.take() else {
            return Err(XioError::PlatformMisuse(
                "platform_deinit called without a successful platform_init",
            ));
        };

        self.set_phase(PlatformPhase::ShuttingDown);
        let backend = platform.selection.descriptor();
        backend.global_deinit();
        platform.network.shutdown();
        self.set_phase(PlatformPhase::Uninitialized);
        info!(backend = backend.name(), "platform torn down");
        Ok(())
    }
}

static BOOTSTRAP: Bootstrap = Bootstrap::new();

/// 初始化网络协议栈与默认后端。
///
/// 默认后端在此冻结；同一进程内后续的 init 必须解析出同一个后端。
pub fn platform_init(config: &PlatformConfig) -> Result<()> {
    if BOOTSTRAP.phase() != PlatformPhase::Uninitialized {
        return Err(XioError::PlatformMisuse(
            "platform_init called again without platform_deinit",
        ));
    }
    let selection = registry::freeze(config.resolve()?)?;
    BOOTSTRAP.init(Arc::clone(&config.network), selection)
}

/// 逆序清理后端与网络协议栈。
pub fn platform_deinit() -> Result<()> {
    BOOTSTRAP.deinit()
}

pub fn platform_phase() -> PlatformPhase {
    BOOTSTRAP.phase()
}

pub fn is_platform_ready() -> bool {
    platform_phase() == PlatformPhase::Ready
}

pub(crate) fn ensure_ready() -> Result<()> {
    if is_platform_ready() {
        Ok(())
    } else {
        Err(XioError::PlatformNotReady)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::xio::{IoInterface, SessionParams, TransportEngine};

    type Journal = Arc<Mutex<Vec<&'static str>>>;

    struct FakeNetwork {
        journal: Journal,
        fail: bool,
    }

    impl NetworkStack for FakeNetwork {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn startup(&self) -> Result<()> {
            self.journal.lock().push("network.startup");
            if self.fail {
                Err(XioError::NetworkStartup {
                    message: "stack unavailable".into(),
                })
            } else {
                Ok(())
            }
        }

        fn shutdown(&self) {
            self.journal.lock().push("network.shutdown");
        }
    }

    struct FakeBackend {
        journal: Mutex<Option<Journal>>,
        fail: bool,
    }

    impl FakeBackend {
        const fn new(fail: bool) -> Self {
            Self {
                journal: parking_lot::const_mutex(None),
                fail,
            }
        }

        fn attach(&self, journal: &Journal) {
            *self.journal.lock() = Some(Arc::clone(journal));
        }

        fn record(&self, event: &'static str) {
            if let Some(journal) = self.journal.lock().as_ref() {
                journal.lock().push(event);
            }
        }
    }

    impl IoInterface for FakeBackend {
        fn name(&self) -> &'static str {
            "fake-backend"
        }

        fn global_init(&self) -> Result<()> {
            self.record("backend.init");
            if self.fail {
                Err(XioError::BackendInit {
                    backend: "fake-backend",
                    message: "no entropy".into(),
                })
            } else {
                Ok(())
            }
        }

        fn global_deinit(&self) {
            self.record("backend.deinit");
        }

        fn create_engine(&self, _params: &SessionParams) -> Result<Arc<dyn TransportEngine>> {
            Err(XioError::InvalidArgument("fake backend has no engine"))
        }
    }

    fn selection(backend: &'static FakeBackend) -> BackendSelection {
        BackendCatalog::empty()
            .with_backend(BackendKind::Native, backend)
            .resolve(BackendFlags::only(BackendKind::Native))
            .expect("native slot registered")
    }

    fn network(journal: &Journal, fail: bool) -> Arc<dyn NetworkStack> {
        Arc::new(FakeNetwork {
            journal: Arc::clone(journal),
            fail,
        })
    }

    #[test]
    fn init_and_deinit_run_in_strict_reverse_order() {
        static BACKEND: FakeBackend = FakeBackend::new(false);
        let journal = Journal::default();
        BACKEND.attach(&journal);
        let bootstrap = Bootstrap::new();

        bootstrap
            .init(network(&journal, false), selection(&BACKEND))
            .expect("init succeeds");
        assert_eq!(bootstrap.phase(), PlatformPhase::Ready);
        bootstrap.deinit().expect("deinit succeeds");
        assert_eq!(bootstrap.phase(), PlatformPhase::Uninitialized);

        assert_eq!(
            *journal.lock(),
            [
                "network.startup",
                "backend.init",
                "backend.deinit",
                "network.shutdown"
            ]
        );
    }

    #[test]
    fn network_failure_skips_backend_init() {
        static BACKEND: FakeBackend = FakeBackend::new(false);
        let journal = Journal::default();
        BACKEND.attach(&journal);
        let bootstrap = Bootstrap::new();

        let error = bootstrap
            .init(network(&journal, true), selection(&BACKEND))
            .expect_err("network startup fails");
        assert!(matches!(error, XioError::NetworkStartup { .. }));
        assert_eq!(*journal.lock(), ["network.startup"]);
        assert_eq!(bootstrap.phase(), PlatformPhase::Uninitialized);
    }

    #[test]
    fn backend_failure_rolls_back_network() {
        static BACKEND: FakeBackend = FakeBackend::new(true);
        let journal = Journal::default();
        BACKEND.attach(&journal);
        let bootstrap = Bootstrap::new();

        let error = bootstrap
            .init(network(&journal, false), selection(&BACKEND))
            .expect_err("backend init fails");
        assert!(matches!(error, XioError::BackendInit { .. }));
        assert_eq!(
            *journal.lock(),
            ["network.startup", "backend.init", "network.shutdown"]
        );
        assert_eq!(bootstrap.phase(), PlatformPhase::Uninitialized);
    }

    #[test]
    fn lifecycle_misuse_is_reported() {
        static BACKEND: FakeBackend = FakeBackend::new(false);
        let journal = Journal::default();
        BACKEND.attach(&journal);
        let bootstrap = Bootstrap::new();

        assert!(matches!(
            bootstrap.deinit(),
            Err(XioError::PlatformMisuse(_))
        ));
        bootstrap
            .init(network(&journal, false), selection(&BACKEND))
            .expect("first init succeeds");
        assert!(matches!(
            bootstrap.init(network(&journal, false), selection(&BACKEND)),
            Err(XioError::PlatformMisuse(_))
        ));
        bootstrap.deinit().expect("deinit succeeds");
        bootstrap
            .init(network(&journal, false), selection(&BACKEND))
            .expect("re-init after deinit succeeds");
        bootstrap.deinit().expect("second deinit succeeds");
    }

    #[test]
    fn config_override_pins_a_single_slot() {
        let mut config = XioConfig::default();
        config.platform.backend = Some(BackendKind::WolfSsl);
        let platform = PlatformConfig::from_config(&config);
        assert_eq!(platform.flags(), BackendFlags::only(BackendKind::WolfSsl));
        assert!(matches!(
            platform.resolve(),
            Err(XioError::BackendUnavailable(BackendKind::WolfSsl))
        ));
    }
}
