// ============================================================================
// Offload - 中文翻译表
// ============================================================================
//
// 文件: src/i18n/zh_cn.rs
// 职责: 中文翻译内容定义
// 边界:
//   - ✅ 中文翻译字符串定义
//   - ❌ 不应包含翻译逻辑
//   - ❌ 不应包含其他语言翻译
//
// ============================================================================

/// 中文翻译表
pub const TRANSLATIONS: &[(&str, &str)] = &[
    // 分块相关
    ("partition.plan", "边界: {}"),
    ("partition.segment", "  分段 {}: {}..{}（代价 {}）"),
    ("partition.summary", "共 {} 个分段，覆盖 {} 项"),
    ("partition.invalid_costs", "代价列表无效: {}"),
    // 捕获相关
    ("capture.start", "正在捕获输出: {}"),
    ("capture.status", "命令退出状态 {}"),
    ("capture.header", "已捕获 {} 字节:"),
    ("quiet.start", "静默运行: {}"),
    ("quiet.done", "命令结束，退出状态 {}（输出已丢弃）"),
    // 分块派发相关
    ("chunks.start", "派发 {} 个分块，覆盖行 {}..{}"),
    ("chunks.chunk_done", "分块 {}..{} 退出状态 {}"),
    ("chunks.chunk_failed", "分块 {}..{} 失败: {}"),
    ("chunks.summary", "{}/{} 个分块成功"),
    ("chunks.failed", "{} 个分块失败"),
    // 派发相关
    // 错误信息
    ("error.empty_command", "未指定要执行的命令"),
    ("error.spawn_command", "无法启动命令: {}"),
];
