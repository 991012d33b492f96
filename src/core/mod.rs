// ============================================================================
// Offload - Core 核心模块
// ============================================================================
//
// 文件: src/core/mod.rs
// 职责: 核心模块入口和导出
// 边界:
//   - ✅ 核心子模块导出
//   - ✅ 常用类型重新导出
//   - ❌ 不应包含具体业务实现
//   - ❌ 不应包含 CLI 相关逻辑
//
// ============================================================================

pub mod capture;
pub mod dispatcher;
pub mod partition;
pub mod task;

// 重新导出常用类型
pub use capture::{
    capture_output, redirect_to_null, CaptureSession, CapturedOutput, NullSession,
    OutputRedirector,
};
pub use dispatcher::{
    call_in_background, AsyncFn, DegradedModeWarning, DegradedReason, DispatchStrategy, Dispatcher,
};
pub use partition::{
    balanced_partition, blocksize_partition, prange, square_mat_in_trilu_indices,
    triangular_range_partition, Cost,
};
pub use task::{in_forked_child, spawn, spawn_named, spawn_process, spawn_with, TaskHandle};
