use std::sync::OnceLock;

use tracing::debug;

/// 单个主机信息查询策略。
///
/// 返回 `None` 表示本策略不可用，由 [`LookupChain`] 转向下一个策略。
pub trait HostLookup<T>: Send + Sync {
    fn name(&self) -> &str;

    fn lookup(&self) -> Option<T>;
}

/// 以闭包实现的查询策略，常用于测试注入。
pub struct FnLookup<F> {
    name: &'static str,
    lookup: F,
}

pub fn from_fn<T, F>(name: &'static str, lookup: F) -> FnLookup<F>
where
    F: Fn() -> Option<T> + Send + Sync,
{
    FnLookup { name, lookup }
}

impl<T, F> HostLookup<T> for FnLookup<F>
where
    F: Fn() -> Option<T> + Send + Sync,
{
    fn name(&self) -> &str {
        self.name
    }

    fn lookup(&self) -> Option<T> {
        (self.lookup)()
    }
}

/// 进程内只执行一次的策略：首次结果（包括失败）写入 `cell`，之后直接复用。
///
/// 用于需要启动外部进程、结果在进程生命周期内不变的查询。
pub struct Memoized<T: 'static, L> {
    cell: &'static OnceLock<Option<T>>,
    inner: L,
}

pub fn memoized<T, L>(cell: &'static OnceLock<Option<T>>, inner: L) -> Memoized<T, L>
where
    T: Clone + Send + Sync + 'static,
    L: HostLookup<T>,
{
    Memoized { cell, inner }
}

impl<T, L> HostLookup<T> for Memoized<T, L>
where
    T: Clone + Send + Sync + 'static,
    L: HostLookup<T>,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn lookup(&self) -> Option<T> {
        self.cell.get_or_init(|| self.inner.lookup()).clone()
    }
}

/// 有序的回退链：依次尝试，取第一个成功的结果。
pub struct LookupChain<T> {
    strategies: Vec<Box<dyn HostLookup<T>>>,
}

impl<T> LookupChain<T> {
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// 追加一个优先级更低的策略。
    pub fn then(mut self, strategy: impl HostLookup<T> + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn resolve(&self) -> Option<T> {
        self.resolve_with(Some)
    }

    /// 带校验的解析：`accept` 返回 `None` 视同该策略失败。
    pub fn resolve_with<U>(&self, mut accept: impl FnMut(T) -> Option<U>) -> Option<U> {
        for strategy in &self.strategies {
            match strategy.lookup().and_then(&mut accept) {
                Some(value) => return Some(value),
                None => debug!(strategy = strategy.name(), "host lookup fell through"),
            }
        }
        None
    }
}

impl<T> Default for LookupChain<T> {
    fn default() -> Self {
        Self::new()
    }
}
