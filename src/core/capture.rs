// ============================================================================
// Offload - 输出捕获
// ============================================================================
//
// 文件: src/core/capture.rs
// 职责: 进程级标准输出重定向的作用域管理
// 边界:
//   - ✅ 文件描述符复制、重定向与恢复
//   - ✅ 捕获到临时文件并读回文本
//   - ✅ 丢弃输出并切换到隔离的暂存工作目录
//   - ✅ 同一描述符同一时刻只允许一个会话（嵌套/并发直接拒绝）
//   - ❌ 不包含输出内容的解析
//   - ❌ 不包含暂存目录的配置读取
//
// ============================================================================

use crate::error::{OffloadError, Result};
use crate::models::config::Config;
use std::env;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::collections::HashSet;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, warn};

/// 正被会话占用的描述符
static BUSY_FDS: Mutex<Option<HashSet<RawFd>>> = Mutex::new(None);

fn with_busy_fds<R>(f: impl FnOnce(&mut HashSet<RawFd>) -> R) -> R {
    let mut busy = BUSY_FDS.lock().unwrap_or_else(PoisonError::into_inner);
    f(busy.get_or_insert_with(HashSet::new))
}

/// 描述符占用凭证，丢弃时释放
struct StreamLease {
    fd: RawFd,
}

impl StreamLease {
    fn acquire(fd: RawFd) -> Result<Self> {
        if !with_busy_fds(|busy| busy.insert(fd)) {
            return Err(OffloadError::StreamBusy);
        }
        Ok(Self { fd })
    }
}

impl Drop for StreamLease {
    fn drop(&mut self) {
        with_busy_fds(|busy| busy.remove(&self.fd));
    }
}

#[cfg(test)]
fn is_held(fd: RawFd) -> bool {
    with_busy_fds(|busy| busy.contains(&fd))
}

/// 刷新 Rust 与 C stdio 的输出缓冲
fn flush_all() {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
    // SAFETY: fflush(NULL) 刷新所有打开的 C 输出流
    unsafe {
        libc::fflush(std::ptr::null_mut());
    }
}

/// 一次描述符重定向：保存原描述符，恢复时写回
struct Redirection {
    target: RawFd,
    saved: Option<OwnedFd>,
}

impl Redirection {
    fn install(target: RawFd, sink: BorrowedFd<'_>) -> io::Result<Self> {
        flush_all();

        // 保存的原描述符带 close-on-exec，会话期间启动的子进程拿不到它
        // SAFETY: F_DUPFD_CLOEXEC 只读取描述符号，失败时返回 -1
        let saved = unsafe { libc::fcntl(target, libc::F_DUPFD_CLOEXEC, 0) };
        if saved < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: 复制成功返回的新描述符由我们独占
        let saved = unsafe { OwnedFd::from_raw_fd(saved) };

        // SAFETY: 两个描述符都有效；失败时 target 保持原状，saved 随丢弃关闭
        if unsafe { libc::dup2(sink.as_raw_fd(), target) } < 0 {
            return Err(io::Error::last_os_error());
        }

        debug!(fd = target, "output descriptor redirected");
        Ok(Self {
            target,
            saved: Some(saved),
        })
    }

    /// 恢复原描述符；只执行一次
    fn restore(&mut self) -> io::Result<()> {
        let Some(saved) = self.saved.take() else {
            return Ok(());
        };
        flush_all();
        // SAFETY: saved 是 install 时复制的有效描述符
        if unsafe { libc::dup2(saved.as_raw_fd(), self.target) } < 0 {
            return Err(io::Error::last_os_error());
        }
        debug!(fd = self.target, "output descriptor restored");
        Ok(())
    }
}

impl Drop for Redirection {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            warn!(fd = self.target, error = %e, "failed to restore output descriptor");
        }
    }
}

/// 工作目录切换，丢弃时切回
struct WorkdirGuard {
    previous: Option<PathBuf>,
}

impl WorkdirGuard {
    fn enter(dir: &Path) -> io::Result<Self> {
        let previous = env::current_dir()?;
        env::set_current_dir(dir)?;
        Ok(Self {
            previous: Some(previous),
        })
    }

    fn restore(&mut self) -> io::Result<()> {
        match self.previous.take() {
            Some(previous) => env::set_current_dir(previous),
            None => Ok(()),
        }
    }
}

impl Drop for WorkdirGuard {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            warn!(error = %e, "failed to restore working directory");
        }
    }
}

/// 输出重定向服务
///
/// 输出描述符是进程级单例资源，每个描述符同一时刻只有一个会话可以持有。
/// 同一描述符上的第二个会话在获取时直接返回 [`OffloadError::StreamBusy`]。
#[derive(Debug, Clone)]
pub struct OutputRedirector {
    scratch_dir: PathBuf,
    target_fd: RawFd,
}

impl OutputRedirector {
    /// 重定向标准输出，临时文件放在 `scratch_dir`
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            target_fd: libc::STDOUT_FILENO,
        }
    }

    /// 使用全局配置中的暂存目录
    pub fn from_config() -> Self {
        Self::new(Config::get_scratch_dir())
    }

    /// 改为重定向指定描述符
    pub fn with_target_fd(mut self, fd: RawFd) -> Self {
        self.target_fd = fd;
        self
    }

    /// 开始捕获：后续写入目标描述符的内容（Rust 与原生代码）都进入临时文件
    pub fn capture(&self) -> Result<CaptureSession> {
        let lease = StreamLease::acquire(self.target_fd)?;
        let file = tempfile::Builder::new()
            .prefix("offload-capture-")
            .tempfile_in(&self.scratch_dir)
            .map_err(|e| OffloadError::acquire("capture scratch file", e))?;
        let redirection = Redirection::install(self.target_fd, file.as_file().as_fd())
            .map_err(|e| OffloadError::acquire("output descriptor", e))?;

        Ok(CaptureSession {
            redirection,
            file,
            _lease: lease,
        })
    }

    /// 开始静默：输出丢弃，工作目录切换到一次性暂存目录
    pub fn silence(&self) -> Result<NullSession> {
        let lease = StreamLease::acquire(self.target_fd)?;
        let scratch = tempfile::Builder::new()
            .prefix("offload-quiet-")
            .tempdir_in(&self.scratch_dir)
            .map_err(|e| OffloadError::acquire("scratch directory", e))?;
        let sink = OpenOptions::new()
            .write(true)
            .open("/dev/null")
            .map_err(|e| OffloadError::acquire("null device", e))?;
        let workdir = WorkdirGuard::enter(scratch.path())
            .map_err(|e| OffloadError::acquire("scratch working directory", e))?;
        let redirection = Redirection::install(self.target_fd, sink.as_fd())
            .map_err(|e| OffloadError::acquire("output descriptor", e))?;

        Ok(NullSession {
            redirection,
            workdir,
            scratch: Some(scratch),
            _sink: sink,
            _lease: lease,
        })
    }
}

/// 捕获会话
///
/// 字段按释放顺序排列：先恢复描述符，再删除临时文件，最后释放占用标记。
pub struct CaptureSession {
    redirection: Redirection,
    file: NamedTempFile,
    _lease: StreamLease,
}

impl CaptureSession {
    /// 会话中途读取已捕获的内容
    pub fn read(&self) -> Result<String> {
        flush_all();
        read_text(self.file.path())
    }

    /// 结束会话：恢复描述符并返回捕获的全部文本
    ///
    /// 即使读取失败，描述符也已恢复、临时文件也会删除。
    pub fn finish(self) -> Result<CapturedOutput> {
        let CaptureSession {
            mut redirection,
            file,
            _lease,
        } = self;

        let restored = redirection.restore();
        let text = read_text(file.path());
        drop(file);

        restored.map_err(|e| OffloadError::release("output descriptor", e))?;
        Ok(CapturedOutput { text: text? })
    }
}

impl fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureSession")
            .field("fd", &self.redirection.target)
            .field("file", &self.file.path())
            .finish()
    }
}

fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| OffloadError::release("capture scratch file", e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// 会话结束后保留的捕获文本
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    text: String,
}

impl CapturedOutput {
    pub fn read(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl fmt::Display for CapturedOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// 静默会话
///
/// 释放顺序：恢复描述符、切回工作目录、删除暂存目录、关闭空设备、释放占用标记。
pub struct NullSession {
    redirection: Redirection,
    workdir: WorkdirGuard,
    scratch: Option<TempDir>,
    _sink: File,
    _lease: StreamLease,
}

impl NullSession {
    /// 会话期间的暂存工作目录
    pub fn scratch_path(&self) -> Option<&Path> {
        self.scratch.as_ref().map(|dir| dir.path())
    }

    /// 结束会话，报告第一个恢复失败
    pub fn finish(mut self) -> Result<()> {
        let restored = self
            .redirection
            .restore()
            .map_err(|e| OffloadError::release("output descriptor", e));
        let returned = self
            .workdir
            .restore()
            .map_err(|e| OffloadError::release("working directory", e));
        let removed = match self.scratch.take() {
            Some(dir) => dir
                .close()
                .map_err(|e| OffloadError::release("scratch directory", e)),
            None => Ok(()),
        };
        restored.and(returned).and(removed)
    }
}

impl fmt::Debug for NullSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NullSession")
            .field("fd", &self.redirection.target)
            .field("scratch", &self.scratch_path())
            .finish()
    }
}

/// 在捕获会话中运行 `body`，返回其结果与捕获的文本
///
/// `body` panic 时描述符照常恢复、临时文件照常删除。
pub fn capture_output<R>(
    redirector: &OutputRedirector,
    body: impl FnOnce() -> R,
) -> Result<(R, CapturedOutput)> {
    let session = redirector.capture()?;
    let out = body();
    let captured = session.finish()?;
    Ok((out, captured))
}

/// 在静默会话中运行 `body`
pub fn redirect_to_null<R>(redirector: &OutputRedirector, body: impl FnOnce() -> R) -> Result<R> {
    let session = redirector.silence()?;
    let out = body();
    session.finish()?;
    Ok(out)
}

/// 当前是否有会话占用任一输出描述符
pub fn is_redirected() -> bool {
    with_busy_fds(|busy| !busy.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    // 使用不存在的描述符号，不触碰真实的 stdout/stderr
    const FAKE_OUT: RawFd = 10_001;
    const FAKE_ERR: RawFd = 10_002;

    #[test]
    fn lease_is_exclusive_per_descriptor() {
        let first = StreamLease::acquire(FAKE_OUT).unwrap();
        assert!(matches!(
            StreamLease::acquire(FAKE_OUT),
            Err(OffloadError::StreamBusy)
        ));

        let other = StreamLease::acquire(FAKE_ERR).unwrap();
        assert!(is_held(FAKE_OUT) && is_held(FAKE_ERR));

        drop(first);
        assert!(!is_held(FAKE_OUT));
        assert!(is_held(FAKE_ERR));
        let again = StreamLease::acquire(FAKE_OUT).unwrap();
        drop(again);
        drop(other);
        assert!(!is_held(FAKE_OUT) && !is_held(FAKE_ERR));
    }

    #[test]
    fn saved_descriptor_is_close_on_exec() {
        let target = tempfile::tempfile().unwrap();
        let sink = tempfile::tempfile().unwrap();
        let mut redirection = Redirection::install(target.as_raw_fd(), sink.as_fd()).unwrap();

        let saved = redirection.saved.as_ref().unwrap().as_raw_fd();
        let flags = unsafe { libc::fcntl(saved, libc::F_GETFD) };
        assert!(flags & libc::FD_CLOEXEC != 0);

        redirection.restore().unwrap();
    }

    #[test]
    fn captured_output_accessors() {
        let out = CapturedOutput {
            text: "converged".to_string(),
        };
        assert_eq!(out.read(), "converged");
        assert_eq!(out.to_string(), "converged");
        assert_eq!(out.into_string(), "converged");
    }
}
