// ============================================================================
// Offload - 错误类型
// ============================================================================
//
// 文件: src/error.rs
// 职责: 库级错误分类定义
// 边界:
//   - ✅ 参数错误、后台任务错误、资源获取/释放错误
//   - ✅ 后台任务错误的原始原因保留
//   - ❌ 不应包含错误恢复或重试逻辑
//   - ❌ 不应包含日志输出
//
// ============================================================================

use std::io;
use std::sync::Arc;
use thiserror::Error;

/// 库级统一结果类型
pub type Result<T, E = OffloadError> = std::result::Result<T, E>;

/// 库级错误
#[derive(Debug, Error)]
pub enum OffloadError {
    /// 分块请求参数非法（任务数为 0、代价序列为空等）
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// 后台任务失败，在 join 时抛出
    #[error(transparent)]
    BackgroundTask(#[from] BackgroundTaskError),

    /// 文件描述符复制/重定向、临时文件或暂存目录创建失败
    #[error("failed to acquire {resource}: {source}")]
    ResourceAcquisition {
        resource: &'static str,
        #[source]
        source: io::Error,
    },

    /// 输出流已被另一个会话占用，不支持嵌套或并发捕获
    #[error("output stream is already redirected by another session")]
    StreamBusy,

    /// 恢复步骤已执行，但操作系统报告了失败
    #[error("failed to release {resource}: {source}")]
    ResourceRelease {
        resource: &'static str,
        #[source]
        source: io::Error,
    },
}

impl OffloadError {
    pub(crate) fn acquire(resource: &'static str, source: io::Error) -> Self {
        Self::ResourceAcquisition { resource, source }
    }

    pub(crate) fn release(resource: &'static str, source: io::Error) -> Self {
        Self::ResourceRelease { resource, source }
    }

    pub(crate) fn invalid<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

/// 后台任务错误
///
/// 可克隆，以便重复 join 时返回同一个缓存结果。
#[derive(Debug, Clone, Error)]
pub enum BackgroundTaskError {
    /// 任务返回了错误，`cause` 保留原始错误
    #[error("background task `{task}` failed: {cause:#}")]
    Failed {
        task: String,
        cause: Arc<anyhow::Error>,
    },

    /// 任务发生 panic
    #[error("background task `{task}` panicked: {message}")]
    Panicked { task: String, message: String },

    /// 工作线程/进程在写入结果前消失
    #[error("background task `{task}` exited without producing a result")]
    NoResult { task: String },

    /// 子进程异常退出
    #[error("background process `{task}` exited abnormally: {status}")]
    ProcessExited { task: String, status: String },

    /// 结果无法跨越序列化边界
    #[error("background task `{task}` returned an unreadable payload: {message}")]
    Payload { task: String, message: String },
}

impl BackgroundTaskError {
    /// 任务名
    pub fn task(&self) -> &str {
        match self {
            Self::Failed { task, .. }
            | Self::Panicked { task, .. }
            | Self::NoResult { task }
            | Self::ProcessExited { task, .. }
            | Self::Payload { task, .. } => task,
        }
    }

    /// 原始错误（仅 `Failed` 变体携带）
    pub fn cause(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Failed { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }

    /// 原始失败的文本内容
    pub fn message(&self) -> String {
        match self {
            Self::Failed { cause, .. } => format!("{:#}", cause),
            Self::Panicked { message, .. } | Self::Payload { message, .. } => message.clone(),
            Self::ProcessExited { status, .. } => status.clone(),
            Self::NoResult { .. } => String::new(),
        }
    }
}
