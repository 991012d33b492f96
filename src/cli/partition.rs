// ============================================================================
// Offload - CLI Partition 命令
// ============================================================================
//
// 文件: src/cli/partition.rs
// 职责: 分块方案计算命令的 CLI 接口层
// 边界:
//   - ✅ 命令行参数定义和解析
//   - ✅ 调用分块函数并输出方案
//   - ❌ 不应包含分块算法
//
// ============================================================================

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::core::partition::{
    balanced_partition, blocksize_partition, prange, triangular_range_partition,
};
use crate::models::config::Config;
use crate::models::plan::{PartitionPlan, RowRange};
use crate::tf;

/// 分块方案命令
#[derive(Debug, Args)]
pub struct PartitionArgs {
    /// 以 JSON 输出
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub mode: PartitionMode,
}

/// 代价输入：累积代价或逐项权重，二选一
#[derive(Debug, Args)]
pub struct CostInput {
    /// 累积代价序列（逗号分隔，首项通常为 0）
    #[arg(short = 'c', long, value_delimiter = ',', conflicts_with = "weights")]
    pub costs: Option<Vec<f64>>,

    /// 逐项权重（逗号分隔），自动求前缀和
    #[arg(short = 'w', long, value_delimiter = ',')]
    pub weights: Option<Vec<f64>>,
}

impl CostInput {
    fn cumulative(&self) -> Result<Vec<f64>> {
        match (&self.costs, &self.weights) {
            (Some(costs), _) => Ok(costs.clone()),
            (None, Some(weights)) => Ok(prefix_sums(weights)),
            (None, None) => anyhow::bail!(tf!("partition.invalid_costs", "--costs / --weights")),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum PartitionMode {
    /// 按任务数均衡分块
    Balanced {
        #[command(flatten)]
        input: CostInput,
        /// 任务数（默认取配置）
        #[arg(short = 'n', long)]
        tasks: Option<usize>,
    },
    /// 按块大小贪心分块
    Blocksize {
        #[command(flatten)]
        input: CostInput,
        /// 每块代价上限（默认取配置）
        #[arg(short = 'b', long)]
        blocksize: Option<f64>,
    },
    /// 下三角行区间分块
    Tril {
        #[arg(long)]
        start: usize,
        #[arg(long)]
        stop: usize,
        #[arg(short = 'b', long)]
        blocksize: Option<f64>,
    },
    /// 定步长分块
    Prange {
        #[arg(long)]
        start: usize,
        #[arg(long)]
        stop: usize,
        #[arg(long)]
        step: usize,
    },
}

/// 逐项权重的前缀和，首项为 0
pub fn prefix_sums(weights: &[f64]) -> Vec<f64> {
    std::iter::once(0.0)
        .chain(weights.iter().scan(0.0, |acc, w| {
            *acc += w;
            Some(*acc)
        }))
        .collect()
}

#[derive(Serialize)]
struct PlanReport<'a> {
    boundaries: &'a [usize],
    segments: Vec<SegmentReport>,
}

#[derive(Serialize)]
struct SegmentReport {
    start: usize,
    end: usize,
    cost: f64,
}

pub fn handle_partition(args: PartitionArgs) -> Result<i32> {
    match args.mode {
        PartitionMode::Balanced { input, tasks } => {
            let cum = input.cumulative()?;
            let tasks = tasks.unwrap_or_else(Config::get_default_tasks);
            let plan = balanced_partition(&cum, tasks)?;
            print_plan(&plan, &cum, args.json)?;
        }
        PartitionMode::Blocksize { input, blocksize } => {
            let cum = input.cumulative()?;
            let blocksize = blocksize.unwrap_or_else(Config::get_blocksize);
            let plan = blocksize_partition(&cum, blocksize)?;
            print_plan(&plan, &cum, args.json)?;
        }
        PartitionMode::Tril {
            start,
            stop,
            blocksize,
        } => {
            let blocksize = blocksize.unwrap_or_else(Config::get_blocksize);
            let ranges = triangular_range_partition(start, stop, blocksize)?;
            print_ranges(&ranges, args.json, |r| r.tril_cost() as f64)?;
        }
        PartitionMode::Prange { start, stop, step } => {
            let ranges = prange(start, stop, step)?;
            print_ranges(&ranges, args.json, |r| r.len() as f64)?;
        }
    }
    Ok(0)
}

fn print_plan(plan: &PartitionPlan, cum: &[f64], json: bool) -> Result<()> {
    let segments: Vec<SegmentReport> = plan
        .segments()
        .map(|(start, end)| SegmentReport {
            start,
            end,
            cost: cum[end] - cum[start],
        })
        .collect();

    if json {
        let report = PlanReport {
            boundaries: plan.boundaries(),
            segments,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", tf!("partition.plan", plan));
    print_segments(&segments);
    println!("{}", tf!("partition.summary", plan.len(), cum.len() - 1));
    Ok(())
}

fn print_ranges(ranges: &[RowRange], json: bool, cost: impl Fn(&RowRange) -> f64) -> Result<()> {
    let segments: Vec<SegmentReport> = ranges
        .iter()
        .map(|r| SegmentReport {
            start: r.start,
            end: r.end,
            cost: cost(r),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&segments)?);
        return Ok(());
    }

    print_segments(&segments);
    let items: usize = ranges.iter().map(RowRange::len).sum();
    println!("{}", tf!("partition.summary", ranges.len(), items));
    Ok(())
}

fn print_segments(segments: &[SegmentReport]) {
    for (i, seg) in segments.iter().enumerate() {
        println!("{}", tf!("partition.segment", i, seg.start, seg.end, seg.cost));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_sums_start_at_zero() {
        assert_eq!(prefix_sums(&[1.0, 2.0, 3.0]), vec![0.0, 1.0, 3.0, 6.0]);
        assert_eq!(prefix_sums(&[]), vec![0.0]);
    }

    #[test]
    fn cost_input_requires_one_source() {
        let input = CostInput {
            costs: None,
            weights: Some(vec![2.0, 2.0]),
        };
        assert_eq!(input.cumulative().unwrap(), vec![0.0, 2.0, 4.0]);

        let empty = CostInput {
            costs: None,
            weights: None,
        };
        assert!(empty.cumulative().is_err());
    }
}
