// ============================================================================
// Offload - 串行化异步派发器
// ============================================================================
//
// 文件: src/core/dispatcher.rs
// 职责: 将函数包装为单飞异步入口，并在作用域结束时回收后台任务
// 边界:
//   - ✅ 每个入口一个单飞槽位
//   - ✅ 作用域退出时（含 panic）等待所有槽位
//   - ✅ 启动时探测派发策略（并发 / 同步降级）
//   - ❌ 不包含线程创建细节（见 task.rs）
//   - ❌ 不包含流水线深度大于一的调度
//   - ❌ 不包含配置读取
//
// ============================================================================

use crate::core::task::{self, Completion, TaskHandle};
use crate::error::Result;
use crate::models::config::DispatchMode;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::{debug, warn};

/// 强制派发模式的环境变量
pub const DISPATCH_ENV: &str = "OFFLOAD_DISPATCH";

/// 降级原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedReason {
    /// 环境变量要求同步执行
    Environment,
    /// 配置文件要求同步执行
    Configuration,
    /// 运行在 fork 出的后台子进程中
    ForkedChild,
}

/// 派发器降级为同步执行时给出的警告
///
/// 不是错误：同步执行保持结果正确，只失去并发。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DegradedModeWarning {
    pub reason: DegradedReason,
}

impl fmt::Display for DegradedModeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let why = match self.reason {
            DegradedReason::Environment => "forced by environment",
            DegradedReason::Configuration => "forced by configuration",
            DegradedReason::ForkedChild => "running inside a forked background process",
        };
        write!(f, "background dispatch degraded to synchronous execution ({})", why)
    }
}

/// 派发策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStrategy {
    /// 每次调用在新线程上执行
    Concurrent,
    /// 调用立即在当前线程执行，返回已完成的句柄
    Synchronous(DegradedModeWarning),
}

impl DispatchStrategy {
    /// 根据运行环境探测派发策略
    pub fn detect(mode: DispatchMode) -> Self {
        let env_mode = std::env::var(DISPATCH_ENV)
            .ok()
            .and_then(|v| v.parse::<DispatchMode>().ok());
        Self::probe(mode, env_mode, task::in_forked_child())
    }

    fn probe(config: DispatchMode, env: Option<DispatchMode>, forked_child: bool) -> Self {
        let degraded = |reason| Self::Synchronous(DegradedModeWarning { reason });

        if forked_child {
            return degraded(DegradedReason::ForkedChild);
        }
        match env {
            Some(DispatchMode::Synchronous) => return degraded(DegradedReason::Environment),
            Some(DispatchMode::Concurrent) => return Self::Concurrent,
            Some(DispatchMode::Auto) | None => {}
        }
        match config {
            DispatchMode::Synchronous => degraded(DegradedReason::Configuration),
            DispatchMode::Concurrent | DispatchMode::Auto => Self::Concurrent,
        }
    }

    /// 进程级派发策略，首次调用时探测并缓存
    ///
    /// fork 出的子进程继承了父进程的缓存，因此子进程中总是重新判定为同步。
    pub fn current() -> Self {
        static CURRENT: OnceLock<DispatchStrategy> = OnceLock::new();
        if task::in_forked_child() {
            return Self::probe(DispatchMode::Auto, None, true);
        }
        *CURRENT.get_or_init(|| {
            let strategy = Self::detect(crate::models::config::Config::get_dispatch_mode());
            if let Some(warning) = strategy.warning() {
                warn!("{}", warning);
            }
            strategy
        })
    }

    /// 是否处于降级模式
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Synchronous(_))
    }

    /// 降级警告
    pub fn warning(&self) -> Option<&DegradedModeWarning> {
        match self {
            Self::Synchronous(warning) => Some(warning),
            Self::Concurrent => None,
        }
    }
}

/// 单飞槽位：最多持有一个未完成的后台任务
#[derive(Default)]
struct AsyncSlot {
    current: Mutex<Option<Arc<dyn Completion>>>,
}

impl AsyncSlot {
    fn drain(&self) {
        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(previous) = previous {
            previous.wait();
        }
    }
}

/// 串行化异步派发器
///
/// 通过 [`Dispatcher::wrap`] 得到的入口借用派发器，不能活得比它久。派发器被丢弃时
/// （正常结束或 panic 展开）会等待所有槽位中的后台任务结束。
pub struct Dispatcher {
    strategy: DispatchStrategy,
    slots: Mutex<Vec<Arc<AsyncSlot>>>,
}

impl Dispatcher {
    /// 降级警告由 [`DispatchStrategy::current`] 在探测时输出一次，这里不重复
    pub fn new(strategy: DispatchStrategy) -> Self {
        Self {
            strategy,
            slots: Mutex::new(Vec::new()),
        }
    }

    pub fn strategy(&self) -> DispatchStrategy {
        self.strategy
    }

    /// 将函数包装为单飞异步入口
    pub fn wrap<A, R, F>(&self, name: impl Into<String>, f: F) -> AsyncFn<'_, A, R>
    where
        A: Send + 'static,
        R: Send + 'static,
        F: Fn(A) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        let slot = Arc::new(AsyncSlot::default());
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&slot));

        AsyncFn {
            name: name.into(),
            func: Arc::new(f),
            slot,
            strategy: self.strategy,
            calls: Mutex::new(0),
            _scope: PhantomData,
        }
    }

    /// 等待所有槽位中的后台任务结束
    pub fn join_all(&self) {
        let slots: Vec<Arc<AsyncSlot>> = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for slot in slots {
            slot.drain();
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.join_all();
    }
}

type SharedFn<A, R> = Arc<dyn Fn(A) -> anyhow::Result<R> + Send + Sync>;

/// 单飞异步入口
pub struct AsyncFn<'d, A, R> {
    name: String,
    func: SharedFn<A, R>,
    slot: Arc<AsyncSlot>,
    strategy: DispatchStrategy,
    calls: Mutex<usize>,
    _scope: PhantomData<&'d Dispatcher>,
}

impl<A, R> AsyncFn<'_, A, R>
where
    A: Send + 'static,
    R: Send + 'static,
{
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 调用入口
    ///
    /// 若本入口上一次调用尚未结束，先阻塞等待；随后在后台启动本次调用并立即返回句柄。
    /// 同步降级时直接在当前线程执行，返回已完成的句柄。
    pub fn call(&self, args: A) -> Result<TaskHandle<R>> {
        // 持有槽位锁直到新任务登记完成，同一入口的并发调用者也被串行化
        let mut current = self
            .slot
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = current.take() {
            if !previous.is_finished() {
                debug!(entry = %self.name, "waiting for previous invocation");
            }
            previous.wait();
        }

        let task_name = {
            let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
            *calls += 1;
            format!("{}#{}", self.name, *calls)
        };

        let func = Arc::clone(&self.func);
        let handle = match self.strategy {
            DispatchStrategy::Concurrent => task::spawn_named(task_name, move || func(args))?,
            DispatchStrategy::Synchronous(_) => {
                let outcome = task::run_guarded(&task_name, move || func(args));
                TaskHandle::completed(task_name, outcome)
            }
        };

        *current = Some(handle.completion());
        Ok(handle)
    }
}

/// 在派发器作用域中运行 `body`，作用域退出前等待所有后台调用结束
///
/// ```no_run
/// use offload::core::dispatcher::{call_in_background, DispatchStrategy};
///
/// let total = call_in_background(DispatchStrategy::Concurrent, |scope| {
///     let write_block = scope.wrap("write_block", |block: Vec<f64>| Ok(block.iter().sum::<f64>()));
///     let first = write_block.call(vec![1.0, 2.0])?;
///     let second = write_block.call(vec![3.0])?; // 等待 first 结束后才启动
///     Ok::<_, offload::OffloadError>(first.into_result()? + second.into_result()?)
/// });
/// ```
pub fn call_in_background<T, B>(strategy: DispatchStrategy, body: B) -> T
where
    B: FnOnce(&Dispatcher) -> T,
{
    let dispatcher = Dispatcher::new(strategy);
    let out = body(&dispatcher);
    dispatcher.join_all();
    out
}
