// ============================================================================
// Offload - CLI Chunks 命令
// ============================================================================
//
// 文件: src/cli/chunks.rs
// 职责: 按下三角行区间分块并行运行子命令
// 边界:
//   - ✅ 命令行参数定义和解析
//   - ✅ 每个分块一个后台任务，按顺序 join
//   - ✅ 通过单飞入口按顺序输出各分块结果
//   - ❌ 不应包含分块算法与线程管理细节
//
// ============================================================================

use anyhow::Result;
use clap::Args;
use std::io::Write;
use std::process::{Command, Stdio};

use super::capture::split_command;
use crate::core::dispatcher::{call_in_background, DispatchStrategy};
use crate::core::partition::{balanced_partition, triangular_range_partition};
use crate::core::task::{spawn_with, TaskHandle};
use crate::models::config::Config;
use crate::models::plan::{tri, RowRange};
use crate::utils::constants::chunk_env;
use crate::utils::logger::Logger;
use crate::tf;

/// 分块运行命令
#[derive(Debug, Args)]
pub struct ChunksArgs {
    /// 起始行
    #[arg(long, default_value_t = 0)]
    pub start: usize,

    /// 结束行（不含）
    #[arg(long)]
    pub stop: usize,

    /// 每块代价上限（默认取配置）
    #[arg(short = 'b', long, conflicts_with = "tasks")]
    pub blocksize: Option<f64>,

    /// 改为按任务数均衡分块
    #[arg(short = 'n', long)]
    pub tasks: Option<usize>,

    /// 每个分块执行的命令，分块范围通过环境变量传入
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub command: Vec<String>,
}

/// 单个分块的运行参数
struct ChunkJob {
    index: usize,
    range: RowRange,
    program: String,
    args: Vec<String>,
}

/// 单个分块的运行结果
struct ChunkReport {
    range: RowRange,
    code: Option<i32>,
    stdout: Vec<u8>,
}

/// 计算分块；均衡分块中的空分段被丢弃
pub fn plan_chunks(
    start: usize,
    stop: usize,
    blocksize: Option<f64>,
    tasks: Option<usize>,
) -> crate::Result<Vec<RowRange>> {
    match tasks {
        Some(tasks) if start < stop => {
            let base = tri(start);
            let cum: Vec<u64> = (start..=stop).map(|i| tri(i) - base).collect();
            let plan = balanced_partition(&cum, tasks)?.shifted(start);
            Ok(plan
                .segments()
                .map(RowRange::from)
                .filter(|r| !r.is_empty())
                .collect())
        }
        Some(_) => Ok(Vec::new()),
        None => triangular_range_partition(
            start,
            stop,
            blocksize.unwrap_or_else(Config::get_blocksize),
        ),
    }
}

fn run_chunk(job: ChunkJob) -> Result<ChunkReport> {
    let output = Command::new(&job.program)
        .args(&job.args)
        .env(chunk_env::START, job.range.start.to_string())
        .env(chunk_env::END, job.range.end.to_string())
        .env(chunk_env::INDEX, job.index.to_string())
        .stdin(Stdio::null())
        .stderr(Stdio::inherit())
        .output()
        .map_err(|e| anyhow::anyhow!(tf!("error.spawn_command", e)))?;

    Ok(ChunkReport {
        range: job.range,
        code: output.status.code(),
        stdout: output.stdout,
    })
}

pub fn handle_chunks(args: ChunksArgs) -> Result<i32> {
    let (program, rest) = split_command(&args.command)?;
    let ranges = plan_chunks(args.start, args.stop, args.blocksize, args.tasks)?;
    Logger::info(tf!("chunks.start", ranges.len(), args.start, args.stop));

    let handles: Vec<(RowRange, TaskHandle<ChunkReport>)> = ranges
        .iter()
        .enumerate()
        .map(|(index, &range)| {
            let job = ChunkJob {
                index,
                range,
                program: program.clone(),
                args: rest.to_vec(),
            };
            spawn_with(format!("chunk-{}", index), job, run_chunk).map(|h| (range, h))
        })
        .collect::<crate::Result<_>>()?;

    let strategy = DispatchStrategy::current();
    let total = handles.len();
    let failed = call_in_background(strategy, |scope| -> Result<usize> {
        // 单飞写出，保证各分块输出按顺序且互不交错
        let emit = scope.wrap("emit", |bytes: Vec<u8>| {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
            Ok(())
        });

        let mut failed = 0;
        let mut written = Vec::with_capacity(handles.len());
        for (range, handle) in handles {
            match handle.into_result() {
                Ok(report) => {
                    let code = report.code.map_or_else(|| "signal".to_string(), |c| c.to_string());
                    Logger::info(tf!("chunks.chunk_done", report.range.start, report.range.end, code));
                    if report.code != Some(0) {
                        failed += 1;
                    }
                    written.push(emit.call(report.stdout)?);
                }
                Err(e) => {
                    failed += 1;
                    Logger::error(tf!("chunks.chunk_failed", range.start, range.end, e));
                }
            }
        }
        for handle in written {
            handle.into_result()?;
        }
        Ok(failed)
    })?;

    Logger::info(tf!("chunks.summary", total - failed, total));
    if failed > 0 {
        Logger::error(tf!("chunks.failed", failed));
        return Ok(1);
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_chunks_drop_empty_segments() {
        let ranges = plan_chunks(0, 3, None, Some(8)).unwrap();
        assert!(ranges.iter().all(|r| !r.is_empty()));
        assert_eq!(ranges.first().unwrap().start, 0);
        assert_eq!(ranges.last().unwrap().end, 3);
        assert!(ranges.windows(2).all(|w| w[0].end == w[1].start));
    }

    #[test]
    fn blocksize_chunks_follow_triangular_partition() {
        let ranges = plan_chunks(0, 90, Some(300.0), None).unwrap();
        assert_eq!(ranges.len(), 16);
        assert_eq!(ranges[0], RowRange::new(0, 24));
    }

    #[test]
    fn empty_row_range_has_no_chunks() {
        assert!(plan_chunks(5, 5, None, Some(2)).unwrap().is_empty());
    }
}
