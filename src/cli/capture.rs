// ============================================================================
// Offload - CLI Capture / Quiet 命令
// ============================================================================
//
// 文件: src/cli/capture.rs
// 职责: 输出捕获与静默运行命令的 CLI 接口层
// 边界:
//   - ✅ 命令行参数定义和解析
//   - ✅ 在捕获/静默会话中启动子命令
//   - ❌ 不应包含描述符重定向细节
//
// ============================================================================

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::process::{Command, ExitStatus, Stdio};

use crate::core::capture::{capture_output, redirect_to_null, OutputRedirector};
use crate::utils::logger::Logger;
use crate::{t, tf};

/// 捕获命令
#[derive(Debug, Args)]
pub struct CaptureArgs {
    /// 以 JSON 输出捕获结果
    #[arg(long)]
    pub json: bool,

    /// 要执行的命令及参数
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub command: Vec<String>,
}

/// 静默运行命令
#[derive(Debug, Args)]
pub struct QuietArgs {
    /// 要执行的命令及参数
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub command: Vec<String>,
}

#[derive(Serialize)]
struct CaptureReport<'a> {
    command: &'a [String],
    exit_code: Option<i32>,
    output: &'a str,
}

/// 拆分程序名与参数
pub(crate) fn split_command(command: &[String]) -> Result<(&String, &[String])> {
    command
        .split_first()
        .ok_or_else(|| anyhow::anyhow!(t!("error.empty_command")))
}

fn run_inherited(program: &str, args: &[String]) -> std::io::Result<ExitStatus> {
    Command::new(program)
        .args(args)
        .stdout(Stdio::inherit())
        .status()
}

pub fn handle_capture(args: CaptureArgs) -> Result<i32> {
    let (program, rest) = split_command(&args.command)?;
    Logger::info(tf!("capture.start", args.command.join(" ")));

    let redirector = OutputRedirector::from_config();
    let (status, captured) = capture_output(&redirector, || run_inherited(program, rest))?;
    let status = status.with_context(|| tf!("error.spawn_command", program))?;

    if args.json {
        let report = CaptureReport {
            command: &args.command,
            exit_code: status.code(),
            output: captured.read(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        Logger::info(tf!("capture.status", status));
        Logger::info(tf!("capture.header", captured.read().len()));
        print!("{}", captured.read());
    }

    Ok(status.code().unwrap_or(1))
}

pub fn handle_quiet(args: QuietArgs) -> Result<i32> {
    let (program, rest) = split_command(&args.command)?;
    Logger::info(tf!("quiet.start", args.command.join(" ")));

    let redirector = OutputRedirector::from_config();
    let status = redirect_to_null(&redirector, || run_inherited(program, rest))?
        .with_context(|| tf!("error.spawn_command", program))?;

    Logger::info(tf!("quiet.done", status));
    Ok(status.code().unwrap_or(1))
}
