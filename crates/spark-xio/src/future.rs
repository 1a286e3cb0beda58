use std::{future::Future, pin::Pin};

/// `BoxFuture` 是后端引擎返回连接结果时使用的对象安全 Future 包装。
///
/// # 契约说明（What）
/// - 约束 Future 为 `Send + 'a`，可安全地交给 Tokio 多线程调度器驱动。
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
