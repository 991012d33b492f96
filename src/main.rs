// ============================================================================
// Offload - 程序入口
// ============================================================================
//
// 文件: src/main.rs
// 职责: 初始化配置与日志，进入 CLI
//
// ============================================================================

use offload::cli::run_cli;
use offload::models::config::Config;
use offload::utils::logger::Logger;

fn main() {
    if let Err(e) = Config::initialize() {
        Logger::error(format!("{:#}", e));
        std::process::exit(2);
    }

    match run_cli() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            Logger::error(format!("{:#}", e));
            std::process::exit(1);
        }
    }
}
