// ============================================================================
// Offload - 颜色工具
// ============================================================================
//
// 文件: src/utils/colors.rs
// 职责: 终端颜色输出
// 边界:
//   - ✅ 终端颜色代码定义
//   - ✅ 颜色输出格式化
//   - ❌ 不应包含业务逻辑
//
// ============================================================================

/// ANSI 颜色代码
pub mod ansi {
    /// 重置颜色
    pub const RESET: &str = "\x1b[0m";

    /// 前景色
    pub const RED: &str = "\x1b[31m";
    pub const CYAN: &str = "\x1b[36m";
}

/// 颜色工具函数
pub struct Colors;

impl Colors {
    /// 为文本添加颜色；设置 NO_COLOR 或 stderr 不是终端时原样返回
    pub fn colorize(text: &str, color: &str) -> String {
        if std::env::var_os("NO_COLOR").is_some() || !atty::is(atty::Stream::Stderr) {
            return text.to_string();
        }
        format!("{}{}{}", color, text, ansi::RESET)
    }

    /// 信息颜色 (青色)
    pub fn info(text: &str) -> String {
        Self::colorize(text, ansi::CYAN)
    }

    /// 错误颜色 (红色)
    pub fn error(text: &str) -> String {
        Self::colorize(text, ansi::RED)
    }
}
