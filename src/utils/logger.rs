// ============================================================================
// Offload - 日志工具
// ============================================================================
//
// 文件: src/utils/logger.rs
// 职责: 日志初始化与面向用户的提示输出
// 边界:
//   - ✅ tracing 订阅器初始化
//   - ✅ 日志级别管理
//   - ✅ 用户提示输出（写入 stderr）
//   - ❌ 不应包含业务逻辑
//   - ❌ 不应写入 stdout（stdout 可能正被捕获）
//
// ============================================================================

use super::colors::Colors;
use super::constants::{APP_NAME, LOG_ENV};
use tracing_subscriber::EnvFilter;

/// 初始化 tracing 订阅器，日志写入 stderr
///
/// 过滤规则取自 `OFFLOAD_LOG`；未设置时 verbose 为 debug，否则为 warn。
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// 简单的提示输出工具
pub struct Logger;

impl Logger {
    pub fn info<S: AsRef<str>>(msg: S) {
        eprintln!("{} {}", Colors::info(&format!("[{}]", APP_NAME)), msg.as_ref());
    }

    pub fn error<S: AsRef<str>>(msg: S) {
        eprintln!("{} {}", Colors::error("[ERROR]"), msg.as_ref());
    }
}
