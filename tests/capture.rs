//! 输出捕获集成测试。
//!
//! fd 1 与工作目录是进程级资源，本文件中的测试通过 `FD_LOCK` 串行执行。

use offload::core::capture::{capture_output, is_redirected, redirect_to_null, OutputRedirector};
use offload::OffloadError;
use std::ffi::CString;
use std::fs;
use std::io::Write;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::path::Path;
use std::process::Command;
use std::sync::{Mutex, MutexGuard};
use tempfile::{NamedTempFile, TempDir};

static FD_LOCK: Mutex<()> = Mutex::new(());

fn lock() -> MutexGuard<'static, ()> {
    FD_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

fn managed_write(text: &str) {
    let mut out = std::io::stdout().lock();
    out.write_all(text.as_bytes()).unwrap();
    out.flush().unwrap();
}

fn native_write(text: &str) {
    let written = unsafe { libc::write(1, text.as_ptr().cast(), text.len()) };
    assert_eq!(written, text.len() as isize);
}

/// 经 C stdio 缓冲写出（不主动 fflush）
fn native_puts(text: &str) {
    let line = CString::new(text).unwrap();
    unsafe {
        libc::puts(line.as_ptr());
    }
}

fn is_empty_dir(dir: &Path) -> bool {
    fs::read_dir(dir).unwrap().next().is_none()
}

/// 把真实 stdout 临时指向一个文件，用来观察会话外的输出
struct RealStdout {
    saved: OwnedFd,
    file: NamedTempFile,
}

impl RealStdout {
    fn redirect() -> Self {
        std::io::stdout().flush().unwrap();
        let file = NamedTempFile::new().unwrap();
        let saved = unsafe { libc::dup(1) };
        assert!(saved >= 0);
        assert!(unsafe { libc::dup2(file.as_file().as_raw_fd(), 1) } >= 0);
        Self {
            saved: unsafe { OwnedFd::from_raw_fd(saved) },
            file,
        }
    }

    fn restore(self) -> String {
        std::io::stdout().flush().unwrap();
        unsafe {
            libc::fflush(std::ptr::null_mut());
        }
        assert!(unsafe { libc::dup2(self.saved.as_raw_fd(), 1) } >= 0);
        fs::read_to_string(self.file.path()).unwrap()
    }
}

#[test]
fn capture_collects_both_write_paths_in_order() {
    let _guard = lock();
    let scratch = TempDir::new().unwrap();
    let redirector = OutputRedirector::new(scratch.path());

    let real = RealStdout::redirect();
    let session = redirector.capture().unwrap();
    assert!(is_redirected());
    managed_write("alpha-managed\n");
    native_write("beta-native\n");
    native_puts("gamma-stdio");
    let captured = session.finish().unwrap();
    managed_write("sentinel-after\n");
    let real_text = real.restore();

    let text = captured.read();
    let alpha = text.find("alpha-managed").unwrap();
    let beta = text.find("beta-native").unwrap();
    let gamma = text.find("gamma-stdio").unwrap();
    assert!(alpha < beta && beta < gamma);
    assert!(!text.contains("sentinel-after"));

    assert!(real_text.contains("sentinel-after"));
    assert!(!real_text.contains("alpha-managed"));
    assert!(!real_text.contains("beta-native"));
    assert!(!real_text.contains("gamma-stdio"));

    assert!(!is_redirected());
    assert!(is_empty_dir(scratch.path()));
}

#[test]
fn capture_sees_child_process_output() {
    let _guard = lock();
    let scratch = TempDir::new().unwrap();
    let redirector = OutputRedirector::new(scratch.path());

    let (status, captured) = capture_output(&redirector, || {
        Command::new("sh").arg("-c").arg("echo from-child").status()
    })
    .unwrap();

    assert!(status.unwrap().success());
    assert!(captured.read().contains("from-child"));
}

#[test]
fn mid_session_read_returns_flushed_text() {
    let _guard = lock();
    let scratch = TempDir::new().unwrap();
    let redirector = OutputRedirector::new(scratch.path());

    let session = redirector.capture().unwrap();
    managed_write("first-part\n");
    let partial = session.read().unwrap();
    managed_write("second-part\n");
    let captured = session.finish().unwrap();

    assert!(partial.contains("first-part"));
    assert!(!partial.contains("second-part"));
    assert!(captured.read().contains("first-part"));
    assert!(captured.read().contains("second-part"));
}

#[test]
fn nested_sessions_are_rejected() {
    let _guard = lock();
    let scratch = TempDir::new().unwrap();
    let redirector = OutputRedirector::new(scratch.path());

    let outer = redirector.capture().unwrap();
    assert!(matches!(redirector.capture(), Err(OffloadError::StreamBusy)));
    assert!(matches!(redirector.silence(), Err(OffloadError::StreamBusy)));
    managed_write("outer-only\n");
    let captured = outer.finish().unwrap();
    assert!(captured.read().contains("outer-only"));

    // 释放后可以再次获取
    let again = redirector.capture().unwrap();
    again.finish().unwrap();
}

#[test]
fn acquisition_failure_leaves_stream_unredirected() {
    let _guard = lock();
    let scratch = TempDir::new().unwrap();
    let missing = scratch.path().join("does-not-exist");

    let broken = OutputRedirector::new(&missing);
    for _ in 0..2 {
        match broken.capture() {
            Err(OffloadError::ResourceAcquisition { resource, .. }) => {
                assert_eq!(resource, "capture scratch file")
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
        assert!(!is_redirected());
    }
    assert!(matches!(
        broken.silence(),
        Err(OffloadError::ResourceAcquisition { .. })
    ));

    // 修复条件后重新获取成功
    fs::create_dir(&missing).unwrap();
    let (_, captured) = capture_output(&broken, || managed_write("recovered\n")).unwrap();
    assert!(captured.read().contains("recovered"));
}

#[test]
fn panic_inside_capture_restores_stream() {
    let _guard = lock();
    let scratch = TempDir::new().unwrap();
    let redirector = OutputRedirector::new(scratch.path());

    let real = RealStdout::redirect();
    let result = std::panic::catch_unwind(|| {
        capture_output(&redirector, || {
            managed_write("lost-in-panic\n");
            panic!("solver diverged");
        })
    });
    managed_write("after-panic\n");
    let real_text = real.restore();

    assert!(result.is_err());
    assert!(!is_redirected());
    assert!(real_text.contains("after-panic"));
    assert!(!real_text.contains("lost-in-panic"));
    assert!(is_empty_dir(scratch.path()));
}

#[test]
fn quiet_discards_output_and_isolates_workdir() {
    let _guard = lock();
    let scratch = TempDir::new().unwrap();
    let redirector = OutputRedirector::new(scratch.path());
    let before = std::env::current_dir().unwrap();

    let real = RealStdout::redirect();
    let inside = redirect_to_null(&redirector, || {
        managed_write("noise\n");
        native_write("native-noise\n");
        fs::write("incidental.chk", b"scratch").unwrap();
        std::env::current_dir().unwrap()
    })
    .unwrap();
    managed_write("audible\n");
    let real_text = real.restore();

    assert!(inside.starts_with(fs::canonicalize(scratch.path()).unwrap()));
    assert_eq!(std::env::current_dir().unwrap(), before);
    assert!(!before.join("incidental.chk").exists());
    assert!(is_empty_dir(scratch.path()));

    assert!(real_text.contains("audible"));
    assert!(!real_text.contains("noise"));
}

#[test]
fn null_session_exposes_scratch_path() {
    let _guard = lock();
    let scratch = TempDir::new().unwrap();
    let redirector = OutputRedirector::new(scratch.path());

    let session = redirector.silence().unwrap();
    let path = session.scratch_path().unwrap().to_path_buf();
    assert!(path.is_dir());
    session.finish().unwrap();
    assert!(!path.exists());
}

#[test]
fn stderr_and_stdout_sessions_are_independent() {
    let _guard = lock();
    let scratch = TempDir::new().unwrap();
    let out = OutputRedirector::new(scratch.path());
    let err = OutputRedirector::new(scratch.path()).with_target_fd(libc::STDERR_FILENO);

    let real = RealStdout::redirect();
    let err_session = err.capture().unwrap();
    let out_session = out.capture().unwrap();
    assert!(matches!(err.capture(), Err(OffloadError::StreamBusy)));

    managed_write("to-stdout\n");
    let mut stderr = std::io::stderr().lock();
    stderr.write_all(b"to-stderr-managed\n").unwrap();
    stderr.flush().unwrap();
    drop(stderr);
    let written = unsafe { libc::write(2, b"to-stderr-native\n".as_ptr().cast(), 17) };
    assert_eq!(written, 17);

    let out_text = out_session.finish().unwrap().into_string();
    let err_text = err_session.finish().unwrap().into_string();
    real.restore();

    assert!(out_text.contains("to-stdout"));
    assert!(!out_text.contains("to-stderr"));
    assert!(err_text.contains("to-stderr-managed\nto-stderr-native\n"));
    assert!(!err_text.contains("to-stdout"));
    assert!(!is_redirected());
    assert!(is_empty_dir(scratch.path()));
}
