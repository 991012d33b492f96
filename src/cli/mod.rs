// ============================================================================
// Offload - CLI 模块
// ============================================================================
//
// 文件: src/cli/mod.rs
// 职责: CLI 命令行接口模块入口和路由
// 边界:
//   - ✅ CLI 结构定义和命令枚举
//   - ✅ 命令行参数解析配置
//   - ✅ 命令路由分发
//   - ❌ 不应包含具体命令实现逻辑
//   - ❌ 不应包含数据模型定义
//
// ============================================================================

pub mod capture;
pub mod chunks;
pub mod partition;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::models::config::{Config, DispatchMode, RuntimeArgs};
use crate::utils::logger::init_tracing;
use capture::{handle_capture, handle_quiet, CaptureArgs, QuietArgs};
use chunks::{handle_chunks, ChunksArgs};
use partition::{handle_partition, PartitionArgs};

/// Offload - background tasks, output capture and balanced partitioning
#[derive(Debug, Parser)]
#[command(name = "offload")]
#[command(about = "Offload work to background tasks, capture native output, partition skewed costs")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Global verbose mode
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Interface language (zh_cn, en_us)
    #[arg(short, long, global = true)]
    pub language: Option<String>,

    /// Scratch directory for capture files
    #[arg(long, global = true)]
    pub scratch_dir: Option<String>,

    /// Dispatch mode (auto, concurrent, synchronous)
    #[arg(long, global = true)]
    pub dispatch: Option<DispatchMode>,

    /// Commands
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compute partition plans
    Partition(PartitionArgs),
    /// Run a command with its stdout captured
    Capture(CaptureArgs),
    /// Run a command with output discarded inside a scratch directory
    Quiet(QuietArgs),
    /// Run a command once per triangular row chunk in background tasks
    Chunks(ChunksArgs),
}

/// 解析命令行并执行，返回进程退出码
pub fn run_cli() -> Result<i32> {
    let cli = Cli::parse();

    // Build runtime args to override config
    let runtime_args = build_runtime_args(&cli);
    // Merge runtime args to global config
    Config::merge_runtime_args(runtime_args)?;
    init_tracing(Config::get_verbose());

    match cli.command {
        Commands::Partition(args) => handle_partition(args),
        Commands::Capture(args) => handle_capture(args),
        Commands::Quiet(args) => handle_quiet(args),
        Commands::Chunks(args) => handle_chunks(args),
    }
}

/// Build runtime args from CLI arguments
fn build_runtime_args(cli: &Cli) -> RuntimeArgs {
    RuntimeArgs {
        verbose: if cli.verbose { Some(true) } else { None },
        language: cli.language.clone(),
        scratch_dir: cli.scratch_dir.clone(),
        dispatch_mode: cli.dispatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "offload",
            "partition",
            "tril",
            "--start",
            "0",
            "--stop",
            "90",
            "--dispatch",
            "sync",
            "-v",
        ])
        .unwrap();
        let args = build_runtime_args(&cli);
        assert_eq!(args.verbose, Some(true));
        assert_eq!(args.dispatch_mode, Some(DispatchMode::Synchronous));
        assert!(matches!(cli.command, Commands::Partition(_)));
    }

    #[test]
    fn capture_keeps_trailing_command_arguments() {
        let cli = Cli::try_parse_from(["offload", "capture", "--", "echo", "-n", "hi"]).unwrap();
        match cli.command {
            Commands::Capture(args) => assert_eq!(args.command, vec!["echo", "-n", "hi"]),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
