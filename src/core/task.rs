// ============================================================================
// Offload - 后台任务句柄
// ============================================================================
//
// 文件: src/core/task.rs
// 职责: 一次性后台线程/进程任务的启动与结果回收
// 边界:
//   - ✅ 线程任务启动与 join
//   - ✅ 进程任务启动（fork + 管道 + JSON 序列化）
//   - ✅ 结果缓存与幂等 join
//   - ✅ panic 与异常退出转换为 BackgroundTaskError
//   - ❌ 不包含线程池或任务队列
//   - ❌ 不包含取消与超时
//   - ❌ 不包含单飞调度逻辑
//
// ============================================================================

use crate::error::{BackgroundTaskError, OffloadError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{FromRawFd, OwnedFd};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

type Outcome<T> = std::result::Result<T, BackgroundTaskError>;

static TASK_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// 当前进程是否为 `spawn_process` fork 出的子进程
static FORKED_CHILD: AtomicBool = AtomicBool::new(false);

/// 当前进程是否运行在 `spawn_process` 的子进程中
pub fn in_forked_child() -> bool {
    FORKED_CHILD.load(Ordering::Relaxed)
}

fn next_task_name() -> String {
    format!("task-{}", TASK_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// 结果槽状态
enum Slot<T> {
    Pending,
    Ready(Outcome<T>),
    Taken,
}

/// 工作者与等待者共享的一次性结果通道（容量为一）
struct Shared<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T> Shared<T> {
    fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Pending),
            ready: Condvar::new(),
            worker: Mutex::new(None),
        }
    }

    fn completed(outcome: Outcome<T>) -> Self {
        Self {
            slot: Mutex::new(Slot::Ready(outcome)),
            ready: Condvar::new(),
            worker: Mutex::new(None),
        }
    }

    /// 写入结果，仅第一次写入生效
    fn fulfill(&self, outcome: Outcome<T>) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*slot, Slot::Pending) {
            *slot = Slot::Ready(outcome);
            self.ready.notify_all();
        }
    }

    /// 阻塞直到结果写入，并回收工作线程
    fn wait_done(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        while matches!(*slot, Slot::Pending) {
            slot = self
                .ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
        drop(slot);

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            // 工作线程内部已捕获 panic
            if worker.join().is_err() {
                warn!("background worker thread terminated abnormally after reporting");
            }
        }
    }

    fn take(&self, task: &str) -> Outcome<T> {
        self.wait_done();
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match std::mem::replace(&mut *slot, Slot::Taken) {
            Slot::Ready(outcome) => outcome,
            Slot::Pending | Slot::Taken => Err(BackgroundTaskError::NoResult {
                task: task.to_string(),
            }),
        }
    }

    fn is_done(&self) -> bool {
        !matches!(
            *self.slot.lock().unwrap_or_else(PoisonError::into_inner),
            Slot::Pending
        )
    }
}

/// 可等待的后台工作（类型擦除），供单飞槽位使用
pub(crate) trait Completion: Send + Sync {
    fn wait(&self);
    fn is_finished(&self) -> bool;
}

impl<T: Send> Completion for Shared<T> {
    fn wait(&self) {
        self.wait_done();
    }

    fn is_finished(&self) -> bool {
        self.is_done()
    }
}

/// 后台任务句柄
///
/// 状态：`Running → Completed(value) | Failed(error)`。第一次 `join` 阻塞并缓存结果，
/// 之后的 `join` 直接返回缓存。同一句柄的并发 join 需由调用方串行化（`&mut self` 已保证）。
pub struct TaskHandle<T> {
    name: String,
    shared: Arc<Shared<T>>,
    cached: Option<Outcome<T>>,
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl<T> TaskHandle<T> {
    /// 任务名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 任务是否已结束（成功或失败）
    pub fn is_finished(&self) -> bool {
        self.cached.is_some() || self.shared.is_done()
    }
}

impl<T: Send + 'static> TaskHandle<T> {
    /// 已完成的句柄（同步派发时使用）
    pub fn completed(name: impl Into<String>, outcome: Outcome<T>) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(Shared::completed(outcome)),
            cached: None,
        }
    }

    /// 阻塞等待任务结束，返回结果的引用
    ///
    /// 任务失败时返回 `BackgroundTaskError`；重复调用返回同一缓存结果。
    pub fn join(&mut self) -> std::result::Result<&T, BackgroundTaskError> {
        if self.cached.is_none() {
            debug!(task = %self.name, "joining background task");
            self.cached = Some(self.shared.take(&self.name));
        }
        match self.cached.as_ref() {
            Some(Ok(value)) => Ok(value),
            Some(Err(err)) => Err(err.clone()),
            None => Err(BackgroundTaskError::NoResult {
                task: self.name.clone(),
            }),
        }
    }

    /// 阻塞等待任务结束并取出结果
    pub fn into_result(mut self) -> std::result::Result<T, BackgroundTaskError> {
        match self.cached.take() {
            Some(outcome) => outcome,
            None => self.shared.take(&self.name),
        }
    }

    pub(crate) fn completion(&self) -> Arc<dyn Completion> {
        self.shared.clone()
    }
}

/// 将 panic 载荷转换为文本
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// 执行任务体，将返回错误与 panic 都转为 `BackgroundTaskError`
pub(crate) fn run_guarded<T, F>(name: &str, f: F) -> Outcome<T>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(BackgroundTaskError::Failed {
            task: name.to_string(),
            cause: Arc::new(err),
        }),
        Err(payload) => Err(BackgroundTaskError::Panicked {
            task: name.to_string(),
            message: panic_message(payload.as_ref()),
        }),
    }
}

/// 在新的操作系统线程上启动任务
pub fn spawn<T, F>(f: F) -> Result<TaskHandle<T>>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    spawn_named(next_task_name(), f)
}

/// 以命名参数启动任务，参数作为一个值移入线程
pub fn spawn_with<A, T, F>(name: impl Into<String>, args: A, f: F) -> Result<TaskHandle<T>>
where
    A: Send + 'static,
    T: Send + 'static,
    F: FnOnce(A) -> anyhow::Result<T> + Send + 'static,
{
    spawn_named(name, move || f(args))
}

/// 以指定名称在新线程上启动任务
pub fn spawn_named<T, F>(name: impl Into<String>, f: F) -> Result<TaskHandle<T>>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    let name = name.into();
    let shared = Arc::new(Shared::new());
    let worker_shared = Arc::clone(&shared);
    let worker_name = name.clone();

    let worker = thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            let outcome = run_guarded(&worker_name, f);
            worker_shared.fulfill(outcome);
        })
        .map_err(|e| OffloadError::acquire("background thread", e))?;

    *shared.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(worker);
    debug!(task = %name, "spawned background thread");

    Ok(TaskHandle {
        name,
        shared,
        cached: None,
    })
}

/// 子进程通过管道回传的报告
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
enum ProcessReport<T> {
    Ok(T),
    Failed(Vec<String>),
    Panicked(String),
}

impl<T> ProcessReport<T> {
    fn from_outcome(outcome: Outcome<T>) -> Self {
        match outcome {
            Ok(value) => Self::Ok(value),
            Err(BackgroundTaskError::Failed { cause, .. }) => {
                Self::Failed(cause.chain().map(|e| e.to_string()).collect())
            }
            Err(BackgroundTaskError::Panicked { message, .. }) => Self::Panicked(message),
            Err(other) => Self::Failed(vec![other.to_string()]),
        }
    }

    fn into_outcome(self, task: &str) -> Outcome<T> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::Failed(chain) => Err(BackgroundTaskError::Failed {
                task: task.to_string(),
                cause: Arc::new(rebuild_chain(chain)),
            }),
            Self::Panicked(message) => Err(BackgroundTaskError::Panicked {
                task: task.to_string(),
                message,
            }),
        }
    }
}

/// 由错误链文本重建 anyhow 错误（最外层上下文在前）
fn rebuild_chain(chain: Vec<String>) -> anyhow::Error {
    let mut iter = chain.into_iter().rev();
    let root = iter.next().unwrap_or_else(|| "unknown error".to_string());
    iter.fold(anyhow::anyhow!(root), |err, ctx| err.context(ctx))
}

/// 串行化 `pipe → fork → 关闭写端`，保证 fork 时进程中没有其他任务的结果写端
static FORK_LOCK: Mutex<()> = Mutex::new(());

/// 创建带 close-on-exec 的结果管道
fn os_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: fds 是两个 c_int 的有效缓冲区
    if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: pipe2 成功后两个描述符都由我们独占
    Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
}

/// 阻塞回收子进程，返回原始等待状态
fn wait_child(pid: libc::pid_t) -> io::Result<libc::c_int> {
    let mut status: libc::c_int = 0;
    // SAFETY: pid 是本进程 fork 出的子进程，只回收一次
    if unsafe { libc::waitpid(pid, &mut status, 0) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(status)
}

/// 在 fork 出的子进程中运行任务
///
/// 结果以 JSON 经管道回传，因此返回值必须可序列化。父进程中由一个回收线程
/// 读取管道并 `waitpid`，句柄的 join 语义与线程任务一致。
///
/// # Safety
///
/// 子进程只复制调用线程。若其他线程在 fork 时持有锁（包括分配器以外的任意锁），
/// 子进程中访问同一把锁会死锁。调用方需保证任务体不依赖这类锁。
pub unsafe fn spawn_process<T, F>(f: F) -> Result<TaskHandle<T>>
where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: FnOnce() -> anyhow::Result<T>,
{
    let name = next_task_name();
    let fork_guard = FORK_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    let (reader, writer) = os_pipe().map_err(|e| OffloadError::acquire("result pipe", e))?;
    let _ = io::stdout().flush();

    // SAFETY: 由调用方保证（见函数文档）
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(OffloadError::acquire(
            "background process",
            io::Error::last_os_error(),
        ));
    }

    if pid == 0 {
        // 子进程中的锁副本由本线程持有，释放后嵌套的 spawn_process 仍可用
        drop(fork_guard);
        drop(reader);
        FORKED_CHILD.store(true, Ordering::Relaxed);
        let report = ProcessReport::from_outcome(run_guarded(&name, f));
        let mut out = File::from(writer);
        let code = match serde_json::to_writer(&mut out, &report) {
            Ok(()) => 0,
            Err(_) => 1,
        };
        let _ = io::stdout().flush();
        drop(out);
        // SAFETY: 子进程直接退出，不运行父进程注册的析构与 atexit
        unsafe { libc::_exit(code) };
    }

    drop(writer);
    drop(fork_guard);
    debug!(task = %name, pid, "spawned background process");

    let shared = Arc::new(Shared::new());
    let reaper_shared = Arc::clone(&shared);
    let reaper_name = name.clone();
    let spawned = thread::Builder::new()
        .name(format!("{}-reaper", name))
        .spawn(move || {
            let outcome = reap_child(&reaper_name, pid, File::from(reader));
            reaper_shared.fulfill(outcome);
        });
    let reaper = match spawned {
        Ok(reaper) => reaper,
        Err(e) => {
            // 读端已随闭包关闭，子进程写结果失败后退出；在此回收避免僵尸进程
            if let Err(wait_err) = wait_child(pid) {
                warn!(task = %name, pid, error = %wait_err, "failed to reap abandoned child");
            }
            return Err(OffloadError::acquire("background reaper thread", e));
        }
    };
    *shared.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(reaper);

    Ok(TaskHandle {
        name,
        shared,
        cached: None,
    })
}

/// 读取子进程报告并回收子进程
fn reap_child<T: DeserializeOwned>(task: &str, pid: libc::pid_t, mut reader: File) -> Outcome<T> {
    let mut payload = Vec::new();
    let read = reader.read_to_end(&mut payload);

    let status = match wait_child(pid) {
        Ok(status) => status,
        Err(e) => {
            return Err(BackgroundTaskError::ProcessExited {
                task: task.to_string(),
                status: e.to_string(),
            })
        }
    };

    if libc::WIFSIGNALED(status) {
        return Err(BackgroundTaskError::ProcessExited {
            task: task.to_string(),
            status: format!("killed by signal {}", libc::WTERMSIG(status)),
        });
    }
    if libc::WIFEXITED(status) && libc::WEXITSTATUS(status) != 0 {
        return Err(BackgroundTaskError::ProcessExited {
            task: task.to_string(),
            status: format!("exit code {}", libc::WEXITSTATUS(status)),
        });
    }

    if let Err(e) = read {
        return Err(BackgroundTaskError::Payload {
            task: task.to_string(),
            message: e.to_string(),
        });
    }
    if payload.is_empty() {
        return Err(BackgroundTaskError::NoResult {
            task: task.to_string(),
        });
    }

    match serde_json::from_slice::<ProcessReport<T>>(&payload) {
        Ok(report) => report.into_outcome(task),
        Err(e) => Err(BackgroundTaskError::Payload {
            task: task.to_string(),
            message: e.to_string(),
        }),
    }
}
