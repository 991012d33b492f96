// ============================================================================
// Offload - 常量定义
// ============================================================================
//
// 文件: src/utils/constants.rs
// 职责: 应用程序常量定义
// 边界:
//   - ✅ 应用名称与环境变量名
//   - ❌ 不应包含动态配置
//
// ============================================================================

/// 应用名称常量
pub const APP_NAME: &str = "OFFLOAD";

/// 日志过滤环境变量
pub const LOG_ENV: &str = "OFFLOAD_LOG";

/// 分块命令传给子命令的环境变量
pub mod chunk_env {
    /// 分块起始行
    pub const START: &str = "OFFLOAD_CHUNK_START";
    /// 分块结束行（不含）
    pub const END: &str = "OFFLOAD_CHUNK_END";
    /// 分块序号
    pub const INDEX: &str = "OFFLOAD_CHUNK_INDEX";
}
