// ============================================================================
// Offload - English Translation Table
// ============================================================================
//
// 文件: src/i18n/en_us.rs
// 职责: English translation content definition
// 边界:
//   - ✅ English translation strings definition
//   - ❌ Should not contain translation logic
//   - ❌ Should not contain other language translations
//
// ============================================================================

/// English translation table
pub const TRANSLATIONS: &[(&str, &str)] = &[
    // Partition related
    ("partition.plan", "Boundaries: {}"),
    ("partition.segment", "  segment {}: {}..{} (cost {})"),
    ("partition.summary", "{} segments over {} items"),
    ("partition.invalid_costs", "Invalid cost list: {}"),
    // Capture related
    ("capture.start", "Capturing output of: {}"),
    ("capture.status", "Command exited with status {}"),
    ("capture.header", "Captured {} bytes:"),
    ("quiet.start", "Running quietly: {}"),
    ("quiet.done", "Command finished with status {} (output discarded)"),
    // Chunk dispatch related
    ("chunks.start", "Dispatching {} chunks over rows {}..{}"),
    ("chunks.chunk_done", "Chunk {}..{} exited with status {}"),
    ("chunks.chunk_failed", "Chunk {}..{} failed: {}"),
    ("chunks.summary", "{} of {} chunks succeeded"),
    ("chunks.failed", "{} chunks failed"),
    // Dispatch related
    // Error messages
    ("error.empty_command", "No command given"),
    ("error.spawn_command", "Failed to start command: {}"),
];
