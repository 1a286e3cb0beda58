//! 平台引导生命周期测试
//!
//! - **核心目标 (Why)**：验证进程级 `platform_init` / `platform_deinit` 的配对语义、误用检测、
//!   会话创建门禁，以及默认后端冻结后的引用稳定性。
//! - **设计手法 (How)**：全局状态在测试间共享，所有用例经 `SERIAL` 串行执行，并在结束时恢复到
//!   `Uninitialized`；协议栈以计数替身注入，观察启动/关闭调用次数。
#![cfg(feature = "tls-native")]

use std::{
    ptr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use parking_lot::Mutex;
use spark_xio::{
    BackendKind, IoInterface, PlatformConfig, PlatformPhase, SessionParams, XioError,
    default_descriptor, is_platform_ready,
    platform::NetworkStack,
    platform_deinit, platform_init, platform_phase,
    registry::default_selection,
    tlsio::loopback::LOOPBACK,
};

static SERIAL: Mutex<()> = parking_lot::const_mutex(());

#[derive(Default)]
struct CountingNetwork {
    startups: AtomicUsize,
    shutdowns: AtomicUsize,
    fail: bool,
}

impl NetworkStack for CountingNetwork {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn startup(&self) -> spark_xio::Result<()> {
        self.startups.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(XioError::NetworkStartup {
                message: "simulated outage".to_owned(),
            })
        } else {
            Ok(())
        }
    }

    fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("current-thread runtime")
}

#[test]
fn init_deinit_cycle_gates_session_creation() {
    let _serial = SERIAL.lock();
    let runtime = runtime();
    let params = SessionParams::new("loopback", 1).with_runtime(runtime.handle().clone());

    assert!(!is_platform_ready());
    assert!(matches!(
        LOOPBACK.create(params.clone()),
        Err(XioError::PlatformNotReady)
    ));

    platform_init(&PlatformConfig::from_build()).expect("first init");
    assert_eq!(platform_phase(), PlatformPhase::Ready);
    let handle = LOOPBACK.create(params.clone()).expect("create while ready");
    handle.destroy().expect("destroy NotOpen session");

    platform_deinit().expect("deinit");
    assert_eq!(platform_phase(), PlatformPhase::Uninitialized);
    assert!(matches!(
        LOOPBACK.create(params),
        Err(XioError::PlatformNotReady)
    ));

    platform_init(&PlatformConfig::from_build()).expect("re-init");
    platform_deinit().expect("second deinit");
}

#[test]
fn lifecycle_misuse_is_detected() {
    let _serial = SERIAL.lock();

    assert!(matches!(platform_deinit(), Err(XioError::PlatformMisuse(_))));
    platform_init(&PlatformConfig::from_build()).expect("init");
    assert!(matches!(
        platform_init(&PlatformConfig::from_build()),
        Err(XioError::PlatformMisuse(_))
    ));
    assert!(is_platform_ready());
    platform_deinit().expect("deinit");
    assert!(matches!(platform_deinit(), Err(XioError::PlatformMisuse(_))));
}

#[test]
fn network_stack_is_started_and_stopped_once() {
    let _serial = SERIAL.lock();
    let network = Arc::new(CountingNetwork::default());
    let config = PlatformConfig::from_build().with_network_stack(network.clone());

    platform_init(&config).expect("init with counting stack");
    assert_eq!(network.startups.load(Ordering::SeqCst), 1);
    assert_eq!(network.shutdowns.load(Ordering::SeqCst), 0);
    platform_deinit().expect("deinit");
    assert_eq!(network.shutdowns.load(Ordering::SeqCst), 1);
}

#[test]
fn network_failure_leaves_platform_uninitialized() {
    let _serial = SERIAL.lock();
    let network = Arc::new(CountingNetwork {
        fail: true,
        ..CountingNetwork::default()
    });
    let config = PlatformConfig::from_build().with_network_stack(network.clone());

    let error = platform_init(&config).expect_err("network outage");
    assert!(matches!(error, XioError::NetworkStartup { .. }));
    assert_eq!(error.code(), "spark.xio.network_startup_failed");
    assert_eq!(platform_phase(), PlatformPhase::Uninitialized);
    assert_eq!(network.shutdowns.load(Ordering::SeqCst), 0);
}

#[test]
fn default_descriptor_is_frozen_and_stable() {
    let _serial = SERIAL.lock();
    let first = default_descriptor().expect("native backend available");
    let second = default_descriptor().expect("native backend available");
    assert!(ptr::addr_eq(first, second));
    assert_eq!(first.name(), "rustls");
    assert_eq!(
        default_selection().expect("frozen").kind(),
        BackendKind::Native
    );
}

#[test]
fn conflicting_selection_is_refused_after_freeze() {
    let _serial = SERIAL.lock();
    default_descriptor().expect("freeze builtin selection");

    let config = PlatformConfig::from_build().with_backend(BackendKind::Native, &LOOPBACK);
    assert!(matches!(
        platform_init(&config),
        Err(XioError::SelectionConflict {
            frozen: BackendKind::Native,
            requested: BackendKind::Native,
        })
    ));
    assert_eq!(platform_phase(), PlatformPhase::Uninitialized);

    let unavailable = PlatformConfig::from_build()
        .with_flags(spark_xio::BackendFlags::only(BackendKind::OpenSsl));
    assert!(matches!(
        platform_init(&unavailable),
        Err(XioError::BackendUnavailable(BackendKind::OpenSsl))
    ));
}
